//! Recursive tree assembly with a file-count cap.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::constants::traversal;
use crate::error::ServiceResult;
use crate::path::{relative_display, validate_existing_path};
use crate::walk::{EntryKind, FileEntry, WalkOptions, WalkSummary, walk};

use super::{FsService, ensure_directory};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TreeRequest {
    pub path: String,
    #[serde(default)]
    pub include_hidden: bool,
    pub max_depth: Option<usize>,
    /// Cap on entries gathered before the hierarchy is assembled.
    pub max_files: Option<usize>,
    pub timeout_ms: Option<u64>,
}

/// One node in the assembled hierarchy; directories carry children.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub name: String,
    pub kind: EntryKind,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeResponse {
    pub path: String,
    pub root: TreeNode,
    pub summary: WalkSummary,
}

impl FsService {
    pub async fn tree(
        &self,
        request: TreeRequest,
        cancel: Option<CancellationToken>,
    ) -> ServiceResult<TreeResponse> {
        let (signal, _guard) = self.signal_for(request.timeout_ms, cancel);
        let resolved = validate_existing_path(self.roots(), &request.path, &signal).await?;
        ensure_directory(&resolved)?;

        let options = WalkOptions {
            include_hidden: request.include_hidden,
            max_depth: request.max_depth.unwrap_or(traversal::MAX_DEPTH),
            max_results: request.max_files.unwrap_or(traversal::MAX_ENTRIES),
            ..WalkOptions::default()
        }
        .clamped();

        let outcome = walk(&resolved.resolved, &options, &signal).await?;
        let display = relative_display(self.roots(), &resolved.resolved);
        let root_name = resolved
            .resolved
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| display.clone());

        Ok(TreeResponse {
            path: display,
            root: assemble(root_name, &outcome.entries),
            summary: outcome.summary,
        })
    }
}

/// Fold flat walk entries into a nested tree, keyed by path segments.
fn assemble(root_name: String, entries: &[FileEntry]) -> TreeNode {
    #[derive(Default)]
    struct Builder {
        kind: Option<EntryKind>,
        children: BTreeMap<String, Builder>,
    }

    let mut root = Builder::default();
    for entry in entries {
        let mut node = &mut root;
        for segment in entry.relative_path.split('/') {
            node = node.children.entry(segment.to_string()).or_default();
        }
        node.kind = Some(entry.kind);
    }

    fn finish(name: String, builder: Builder) -> TreeNode {
        let children = builder
            .children
            .into_iter()
            .map(|(name, child)| finish(name, child))
            .collect();
        TreeNode {
            name,
            // Intermediate nodes only exist because something lies below them.
            kind: builder.kind.unwrap_or(EntryKind::Directory),
            children,
        }
    }

    let mut node = finish(root_name, root);
    node.kind = EntryKind::Directory;
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::testutil::service_at;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn hierarchy_mirrors_the_directory_structure() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/util")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "x").unwrap();
        std::fs::write(dir.path().join("src/util/io.rs"), "x").unwrap();
        std::fs::write(dir.path().join("README.md"), "x").unwrap();

        let service = service_at(dir.path());
        let response = service
            .tree(
                TreeRequest {
                    path: dir.path().to_str().unwrap().to_string(),
                    include_hidden: false,
                    max_depth: None,
                    max_files: None,
                    timeout_ms: None,
                },
                None,
            )
            .await
            .unwrap();

        let root = &response.root;
        assert_eq!(root.kind, EntryKind::Directory);
        let names: Vec<&str> = root.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["README.md", "src"]);

        let src = root.children.iter().find(|c| c.name == "src").unwrap();
        let src_names: Vec<&str> = src.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(src_names, vec!["lib.rs", "util"]);

        let util = src.children.iter().find(|c| c.name == "util").unwrap();
        assert_eq!(util.children.len(), 1);
        assert_eq!(util.children[0].name, "io.rs");
        assert_eq!(util.children[0].kind, EntryKind::File);
    }

    #[tokio::test]
    async fn max_depth_prunes_deep_branches() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b/c")).unwrap();
        std::fs::write(dir.path().join("a/b/c/deep.txt"), "x").unwrap();

        let service = service_at(dir.path());
        let response = service
            .tree(
                TreeRequest {
                    path: dir.path().to_str().unwrap().to_string(),
                    include_hidden: false,
                    max_depth: Some(2),
                    max_files: None,
                    timeout_ms: None,
                },
                None,
            )
            .await
            .unwrap();

        let a = &response.root.children[0];
        let b = &a.children[0];
        assert!(b.children.is_empty());
    }
}
