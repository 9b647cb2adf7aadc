//! Filtering of `<think>…</think>` reasoning regions from model output.
//!
//! Some models interleave internal reasoning with their answer. Persisted
//! summaries strip it after the fact; the streaming path filters it
//! on-the-fly with a per-stream state machine that holds back just enough
//! of the tail to catch a tag split across deltas.

use regex::Regex;

const OPEN_TAG: &str = "<think>";
const CLOSE_TAG: &str = "</think>";

/// Remove `<think>` blocks from a complete text and collapse the blank
/// lines left behind.
pub fn strip_thinking_content(text: &str) -> String {
    let tag_pattern = Regex::new(r"(?s)<think>.*?</think>").expect("valid regex");
    let cleaned = tag_pattern.replace_all(text, "");

    let blank_lines = Regex::new(r"\n\s*\n\s*\n+").expect("valid regex");
    blank_lines.replace_all(&cleaned, "\n\n").trim().to_string()
}

/// Streaming filter. Feed each content delta through [`ThinkFilter::push`]
/// and emit what it returns; call [`ThinkFilter::finish`] once the stream
/// ends to flush the held-back tail.
///
/// Two states: outside a think block the filter emits text but retains the
/// last `len("<think>") - 1` characters in case an opening tag straddles a
/// delta boundary; inside a block everything is dropped until the closing
/// tag appears.
#[derive(Debug, Default)]
pub struct ThinkFilter {
    buffer: String,
    inside_think: bool,
}

impl ThinkFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: &str) -> String {
        self.buffer.push_str(delta);
        let mut emitted = String::new();

        loop {
            if !self.inside_think {
                if let Some(start) = self.buffer.find(OPEN_TAG) {
                    emitted.push_str(&self.buffer[..start]);
                    self.buffer.drain(..start + OPEN_TAG.len());
                    self.inside_think = true;
                } else {
                    // Hold back a potential tag prefix at the tail.
                    let holdback = OPEN_TAG.len() - 1;
                    if self.buffer.len() > holdback {
                        let cut = floor_char_boundary(&self.buffer, self.buffer.len() - holdback);
                        emitted.push_str(&self.buffer[..cut]);
                        self.buffer.drain(..cut);
                    }
                    break;
                }
            } else if let Some(end) = self.buffer.find(CLOSE_TAG) {
                self.buffer.drain(..end + CLOSE_TAG.len());
                self.inside_think = false;
            } else {
                // Still inside the block; keep only a possible partial
                // closing tag.
                let holdback = CLOSE_TAG.len() - 1;
                if self.buffer.len() > holdback {
                    let cut = floor_char_boundary(&self.buffer, self.buffer.len() - holdback);
                    self.buffer.drain(..cut);
                }
                break;
            }
        }

        emitted
    }

    /// Flush whatever is still held back. Text inside an unterminated
    /// think block stays dropped.
    pub fn finish(&mut self) -> String {
        if self.inside_think {
            self.buffer.clear();
            return String::new();
        }
        std::mem::take(&mut self.buffer)
    }
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_stream(deltas: &[&str]) -> String {
        let mut filter = ThinkFilter::new();
        let mut out = String::new();
        for delta in deltas {
            out.push_str(&filter.push(delta));
        }
        out.push_str(&filter.finish());
        out
    }

    #[test]
    fn strips_whole_blocks_from_complete_text() {
        let text = "Answer.\n<think>hidden\nreasoning</think>\n\n\nMore.";
        assert_eq!(strip_thinking_content(text), "Answer.\n\nMore.");
    }

    #[test]
    fn passes_through_untagged_stream() {
        assert_eq!(run_stream(&["Hello, ", "world", "!"]), "Hello, world!");
    }

    #[test]
    fn drops_block_within_one_delta() {
        assert_eq!(
            run_stream(&["before <think>secret</think> after"]),
            "before  after"
        );
    }

    #[test]
    fn handles_open_tag_split_across_deltas() {
        assert_eq!(
            run_stream(&["visible <thi", "nk>hidden</think>done"]),
            "visible done"
        );
    }

    #[test]
    fn handles_close_tag_split_across_deltas() {
        assert_eq!(
            run_stream(&["<think>hidden</th", "ink>visible"]),
            "visible"
        );
    }

    #[test]
    fn character_by_character_stream() {
        let text = "a<think>zzz</think>b";
        let deltas: Vec<String> = text.chars().map(String::from).collect();
        let refs: Vec<&str> = deltas.iter().map(String::as_str).collect();
        assert_eq!(run_stream(&refs), "ab");
    }

    #[test]
    fn unterminated_block_is_dropped() {
        assert_eq!(run_stream(&["ok <think>never closed"]), "ok ");
    }

    #[test]
    fn multiple_blocks_in_one_stream() {
        assert_eq!(
            run_stream(&["a<think>1</think>", "b<think>2</think>c"]),
            "abc"
        );
    }
}
