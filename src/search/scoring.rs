//! Hybrid score combination and filename boosting.

use regex::Regex;

pub const VECTOR_WEIGHT: f64 = 0.7;
pub const KEYWORD_WEIGHT: f64 = 0.3;
pub const FILENAME_BOOST: f64 = 1.3;

/// Postgres full-text ranks typically land in 0..3; squeeze into 0..1.
pub fn normalize_text_score(text_score: f64) -> f64 {
    (text_score / 3.0).min(1.0)
}

pub fn hybrid_score(vector_score: f64, keyword_score: f64) -> f64 {
    VECTOR_WEIGHT * vector_score + KEYWORD_WEIGHT * keyword_score
}

/// Multiply `base_score` by the boost factor when any query term occurs
/// in the file path on a word boundary (case-insensitive).
pub fn apply_filename_boost(query: &str, file_path: &str, base_score: f64) -> f64 {
    if filename_matches(query, file_path) {
        base_score * FILENAME_BOOST
    } else {
        base_score
    }
}

fn filename_matches(query: &str, file_path: &str) -> bool {
    let path = file_path.to_lowercase();
    query_terms(query).iter().any(|term| {
        let pattern = format!(r"\b{}\b", regex::escape(term));
        Regex::new(&pattern)
            .map(|re| re.is_match(&path))
            .unwrap_or(false)
    })
}

/// Lowercased alphanumeric query terms.
fn query_terms(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hybrid_is_weighted_seventy_thirty() {
        let score = hybrid_score(0.8, 0.5);
        assert!((score - (0.7 * 0.8 + 0.3 * 0.5)).abs() < 1e-9);
    }

    #[test]
    fn text_normalization_divides_by_three_and_caps() {
        assert!((normalize_text_score(1.5) - 0.5).abs() < 1e-9);
        assert_eq!(normalize_text_score(9.0), 1.0);
        assert_eq!(normalize_text_score(0.0), 0.0);
    }

    #[test]
    fn boost_requires_word_boundary_match() {
        let base = 0.5;
        assert!((apply_filename_boost("auth logic", "src/auth/token.py", base) - base * 1.3).abs() < 1e-9);
        // "auth" is a substring of "author" but not a word.
        assert_eq!(apply_filename_boost("auth", "src/author.py", base), base);
        assert_eq!(apply_filename_boost("cache", "src/auth/token.py", base), base);
    }

    #[test]
    fn boost_is_case_insensitive() {
        let base = 1.0;
        assert!((apply_filename_boost("Parser", "src/RDB/parser.ts", base) - 1.3).abs() < 1e-9);
    }
}
