//! Persistence for each collection. All updates are document-level,
//! keyed by id or `(repo_id, path)`; there are no cross-table
//! transactions. Concurrent pipeline stages write disjoint columns of
//! the same file row, so last-writer-wins per column is acceptable.

mod conversations;
mod files;
mod repositories;
mod sessions;
mod tasks;

pub use conversations::{ConversationStore, MessageStore};
pub use files::{FileMeta, FileStore, OverviewFile, SummaryInput};
pub use repositories::RepositoryStore;
pub use sessions::SessionStore;
pub use tasks::TaskStore;
