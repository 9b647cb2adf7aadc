//! LLM-backed analysis: per-file summaries and the repository overview.

pub mod overview;
pub mod summary;

pub use overview::OverviewGenerator;
pub use summary::Summarizer;
