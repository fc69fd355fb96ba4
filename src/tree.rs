//! Directory tree built from the flat entry names of an archive.
//!
//! A ZIP archive stores `photos/sub/b.png` as one name; browsing needs the
//! nesting back. [`build_tree`] folds the names into a [`DirectoryTree`]
//! whose children keep the order in which they were first seen.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// File extensions shown as images (lowercase, without the dot)
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];

/// One child of a directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeNode {
    File,
    Directory(Arc<DirectoryTree>),
}

impl TreeNode {
    pub fn is_dir(&self) -> bool {
        matches!(self, TreeNode::Directory(_))
    }

    pub fn as_dir(&self) -> Option<&DirectoryTree> {
        match self {
            TreeNode::Directory(tree) => Some(&**tree),
            TreeNode::File => None,
        }
    }
}

/// One directory level: name to node, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryTree {
    children: Vec<(String, TreeNode)>,
    /// Position of each name in `children`
    index: HashMap<String, usize>,
}

impl DirectoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn get(&self, name: &str) -> Option<&TreeNode> {
        self.index.get(name).map(|&i| &self.children[i].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TreeNode)> {
        self.children.iter().map(|(name, node)| (name.as_str(), node))
    }

    /// Children ordered by name
    pub fn sorted(&self) -> Vec<(&str, &TreeNode)> {
        let mut children: Vec<_> = self.iter().collect();
        children.sort_by(|a, b| a.0.cmp(b.0));
        children
    }

    fn push(&mut self, name: &str, node: TreeNode) -> usize {
        let position = self.children.len();
        self.children.push((name.to_string(), node));
        self.index.insert(name.to_string(), position);
        position
    }

    /// Subdirectory `name`, created if needed.
    ///
    /// A file of the same name is promoted to a directory: an archive that
    /// stores both `a` and `a/b` can only be browsed as a directory.
    fn directory_mut(&mut self, name: &str) -> &mut DirectoryTree {
        let position = match self.index.get(name) {
            Some(&position) => position,
            None => self.push(name, TreeNode::Directory(Arc::default())),
        };

        let node = &mut self.children[position].1;
        if !node.is_dir() {
            *node = TreeNode::Directory(Arc::default());
        }
        match node {
            // Unshared while the tree is being built, so this never copies
            TreeNode::Directory(tree) => Arc::make_mut(tree),
            TreeNode::File => unreachable!("node was just promoted to a directory"),
        }
    }

    /// Add a file leaf unless something named `name` already exists.
    fn insert_file(&mut self, name: &str) {
        if !self.index.contains_key(name) {
            self.push(name, TreeNode::File);
        }
    }

    /// Like [`descend`](Self::descend), but hands out a shared handle to
    /// the subdirectory instead of a borrow.
    pub fn descend_shared(self: &Arc<Self>, path: &str) -> Option<Arc<DirectoryTree>> {
        let mut dir = Arc::clone(self);
        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            let next = match dir.get(segment)? {
                TreeNode::Directory(sub) => Arc::clone(sub),
                TreeNode::File => return None,
            };
            dir = next;
        }
        Some(dir)
    }

/// Walk `path` (slash separated) from this directory.
    pub fn descend(&self, path: &str) -> Option<&DirectoryTree> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(self, |dir, segment| dir.get(segment)?.as_dir())
    }
}

/// Build the tree for a sequence of stored entry names.
///
/// Names whose any segment is an OS metadata name are skipped entirely.
/// A name ending in `/` makes sure its directory exists even when empty.
pub fn build_tree<I, S>(names: I) -> DirectoryTree
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut root = DirectoryTree::new();

    for name in names {
        let name = name.as_ref();
        let segments: Vec<&str> = name.split('/').filter(|s| !s.is_empty()).collect();

        let Some((last, parents)) = segments.split_last() else {
            continue;
        };
        if segments.iter().any(|segment| is_system_file(segment)) {
            continue;
        }

        let dir = parents
            .iter()
            .fold(&mut root, |dir, segment| dir.directory_mut(segment));

        if name.ends_with('/') {
            dir.directory_mut(last);
        } else {
            dir.insert_file(last);
        }
    }

    root
}

/// Whether a file or directory name is OS metadata that should never be
/// shown (macOS resource forks and `__MACOSX`, `Thumbs.db`, `desktop.ini`,
/// `.DS_Store`).
pub fn is_system_file(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.starts_with("._")
        || lower.contains("__macosx")
        || lower == "thumbs.db"
        || lower == "desktop.ini"
        || lower.starts_with(".ds_store")
}

/// Lowercase extension including the dot (`".jpg"`), or `""` if none.
pub fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

pub fn is_image(name: &str) -> bool {
    let ext = extension_of(name);
    IMAGE_EXTENSIONS
        .iter()
        .any(|candidate| ext.strip_prefix('.') == Some(*candidate))
}
