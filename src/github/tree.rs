//! Conversions between GitHub's flat tree listing and the nested tree
//! stored on the repository document.

use std::collections::BTreeMap;

use crate::github::api::ApiTree;
use crate::github::filter;
use crate::models::{FileTree, TreeFile, TreeNode};

/// Build the nested tree from a flat listing, applying the inclusion
/// filters: only blobs, no denylisted paths, nothing over the size cap.
pub fn build_nested_tree(api_tree: &ApiTree) -> FileTree {
    let mut tree = FileTree::new();

    for item in &api_tree.tree {
        if item.item_type != "blob" {
            continue;
        }
        if filter::should_ignore_path(&item.path) {
            continue;
        }
        let size = item.size.unwrap_or(0);
        if size > filter::MAX_FILE_SIZE {
            continue;
        }

        insert_path(
            &mut tree,
            &item.path,
            size,
            item.url.clone().unwrap_or_default(),
        );
    }

    tree
}

fn insert_path(tree: &mut FileTree, path: &str, size: u64, url: String) {
    let parts: Vec<&str> = path.split('/').collect();
    let mut current = tree;

    for (i, part) in parts.iter().enumerate() {
        if i == parts.len() - 1 {
            current.insert(
                part.to_string(),
                TreeNode::File {
                    path: path.to_string(),
                    size,
                    url,
                },
            );
            return;
        }

        let entry = current
            .entry(part.to_string())
            .or_insert_with(|| TreeNode::Folder {
                children: BTreeMap::new(),
            });
        current = match entry {
            TreeNode::Folder { children } => children,
            // A file and a folder sharing a name cannot happen in a git
            // tree; bail out rather than clobber the file node.
            TreeNode::File { .. } => return,
        };
    }
}

/// Flatten the nested tree back into the file list the parse stage walks.
pub fn extract_files(tree: &FileTree) -> Vec<TreeFile> {
    let mut files = Vec::new();
    collect(tree, &mut files);
    files
}

fn collect(tree: &FileTree, out: &mut Vec<TreeFile>) {
    for node in tree.values() {
        match node {
            TreeNode::File { path, size, url } => out.push(TreeFile {
                path: path.clone(),
                size: *size,
                url: url.clone(),
            }),
            TreeNode::Folder { children } => collect(children, out),
        }
    }
}

pub fn count_files(tree: &FileTree) -> i64 {
    tree.values()
        .map(|node| match node {
            TreeNode::File { .. } => 1,
            TreeNode::Folder { children } => count_files(children),
        })
        .sum()
}

/// File counts per detected language, capitalized for display
/// (`{"Python": 12, "Typescript": 4}`).
pub fn languages_breakdown(tree: &FileTree) -> BTreeMap<String, i64> {
    let mut breakdown = BTreeMap::new();
    visit_languages(tree, &mut breakdown);
    breakdown
}

fn visit_languages(tree: &FileTree, breakdown: &mut BTreeMap<String, i64>) {
    for (name, node) in tree {
        match node {
            TreeNode::File { .. } => {
                if let Some(language) = filter::detect_language(name) {
                    let mut display = String::with_capacity(language.len());
                    let mut chars = language.chars();
                    if let Some(first) = chars.next() {
                        display.extend(first.to_uppercase());
                        display.push_str(chars.as_str());
                    }
                    *breakdown.entry(display).or_insert(0) += 1;
                }
            }
            TreeNode::Folder { children } => visit_languages(children, breakdown),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::api::ApiTreeItem;

    fn item(path: &str, item_type: &str, size: u64) -> ApiTreeItem {
        ApiTreeItem {
            path: path.to_string(),
            item_type: item_type.to_string(),
            size: Some(size),
            url: Some(format!("https://example.test/{path}")),
        }
    }

    fn sample_tree() -> ApiTree {
        ApiTree {
            tree: vec![
                item("src", "tree", 0),
                item("src/main.py", "blob", 120),
                item("src/util.py", "blob", 80),
                item("README.md", "blob", 40),
                item("node_modules/x/index.js", "blob", 10),
                item("assets/logo.png", "blob", 10),
                item("big/file.py", "blob", filter::MAX_FILE_SIZE + 1),
            ],
        }
    }

    #[test]
    fn filters_and_nests_blobs() {
        let tree = build_nested_tree(&sample_tree());
        assert_eq!(count_files(&tree), 3);
        assert!(tree.contains_key("README.md"));
        assert!(!tree.contains_key("node_modules"));
        assert!(!tree.contains_key("assets"));
        assert!(!tree.contains_key("big"));

        match tree.get("src").unwrap() {
            TreeNode::Folder { children } => {
                match children.get("main.py").unwrap() {
                    TreeNode::File { path, .. } => assert_eq!(path, "src/main.py"),
                    _ => panic!("expected a file node"),
                }
            }
            _ => panic!("expected a folder node"),
        }
    }

    #[test]
    fn flatten_round_trips_leaf_paths() {
        let tree = build_nested_tree(&sample_tree());
        let mut paths: Vec<String> =
            extract_files(&tree).into_iter().map(|f| f.path).collect();
        paths.sort();
        assert_eq!(paths, vec!["README.md", "src/main.py", "src/util.py"]);
    }

    #[test]
    fn breakdown_counts_by_language() {
        let tree = build_nested_tree(&sample_tree());
        let breakdown = languages_breakdown(&tree);
        assert_eq!(breakdown.get("Python"), Some(&2));
        assert_eq!(breakdown.get("Markdown"), Some(&1));
    }
}
