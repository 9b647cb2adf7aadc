//! GitHub source fetching: URL parsing, repository metadata, recursive
//! file trees, and raw file contents, plus the inclusion filters that
//! decide which blobs become indexed files.

pub mod api;
pub mod filter;
pub mod tree;

pub use api::{parse_github_url, GitHubClient, RepoMetadata};
