//! Inclusion filters and language detection for fetched trees.

/// Directory fragments and special names that never become indexed files.
const IGNORED_PATH_PATTERNS: &[&str] = &[
    "node_modules/",
    "__pycache__/",
    ".pytest_cache/",
    ".mypy_cache/",
    "venv/",
    "env/",
    ".env/",
    "dist/",
    "build/",
    ".next/",
    ".nuxt/",
    "out/",
    "target/",
    "bin/",
    "obj/",
    ".git/",
    ".svn/",
    ".hg/",
    "vendor/",
    "bower_components/",
    "coverage/",
    ".cache/",
    "tmp/",
    "temp/",
    ".idea/",
    ".vscode/",
    ".DS_Store",
];

/// Binary and generated artifacts, by extension.
const IGNORED_EXTENSIONS: &[&str] = &[
    ".pyc", ".pyo", ".pyd",
    ".class", ".jar",
    ".o", ".so", ".dylib", ".dll",
    ".exe", ".bin",
    ".jpg", ".jpeg", ".png", ".gif", ".svg", ".ico",
    ".mp4", ".mov", ".avi",
    ".mp3", ".wav",
    ".pdf", ".doc", ".docx",
    ".zip", ".tar", ".gz", ".rar",
    ".woff", ".woff2", ".ttf", ".eot",
    ".lock",
];

/// Hidden files that are still worth indexing.
const DOTFILE_ALLOWLIST: &[&str] = &[
    ".env.example",
    ".gitignore",
    ".eslintrc.json",
    ".prettierrc",
    ".babelrc",
];

pub const MAX_FILE_SIZE: u64 = 100_000;

pub fn should_ignore_path(path: &str) -> bool {
    for pattern in IGNORED_PATH_PATTERNS {
        if path.contains(pattern) {
            return true;
        }
    }

    for ext in IGNORED_EXTENSIONS {
        if path.ends_with(ext) {
            return true;
        }
    }

    let filename = path.rsplit('/').next().unwrap_or(path);
    if filename.starts_with('.') && !DOTFILE_ALLOWLIST.contains(&filename) {
        return true;
    }

    false
}

/// Extension including the dot, or empty when the name has none.
pub fn file_extension(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => format!(".{ext}"),
        _ => String::new(),
    }
}

/// Extension → language. Unknown extensions yield `None`; such files are
/// stored but never parsed.
pub fn detect_language(filename: &str) -> Option<&'static str> {
    let language = match file_extension(filename).as_str() {
        ".py" => "python",
        ".js" => "javascript",
        ".ts" => "typescript",
        ".tsx" => "tsx",
        ".jsx" => "jsx",
        ".java" => "java",
        ".go" => "go",
        ".rs" => "rust",
        ".cpp" => "cpp",
        ".c" => "c",
        ".cs" => "csharp",
        ".rb" => "ruby",
        ".php" => "php",
        ".swift" => "swift",
        ".kt" => "kotlin",
        ".scala" => "scala",
        ".md" => "markdown",
        ".json" => "json",
        ".yaml" | ".yml" => "yaml",
        ".xml" => "xml",
        ".html" => "html",
        ".css" => "css",
        ".scss" => "scss",
        ".sql" => "sql",
        _ => return None,
    };
    Some(language)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denylisted_directories_are_ignored() {
        assert!(should_ignore_path("node_modules/react/index.js"));
        assert!(should_ignore_path("target/debug/build.rs"));
        assert!(should_ignore_path("a/b/__pycache__/mod.pyc"));
        assert!(!should_ignore_path("src/main.py"));
    }

    #[test]
    fn binary_extensions_are_ignored() {
        assert!(should_ignore_path("assets/logo.png"));
        assert!(should_ignore_path("Cargo.lock"));
        assert!(!should_ignore_path("src/lib.rs"));
    }

    #[test]
    fn dotfiles_respect_the_allowlist() {
        assert!(should_ignore_path(".github-ci.yml"));
        assert!(!should_ignore_path(".gitignore"));
        assert!(!should_ignore_path("config/.env.example"));
        assert!(should_ignore_path("config/.env"));
    }

    #[test]
    fn extension_and_language_detection() {
        assert_eq!(file_extension("main.py"), ".py");
        assert_eq!(file_extension("Makefile"), "");
        assert_eq!(detect_language("app.tsx"), Some("tsx"));
        assert_eq!(detect_language("notes.xyz"), None);
    }
}
