//! Read-only queries over the cached directory tree of a loaded archive.
//!
//! Nothing here touches the archive itself; an archive that has not been
//! unlocked (or loaded) answers every query with "not found" / nothing.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::registry::ArchiveRegistry;
use crate::tree::{DirectoryTree, TreeNode, extension_of, is_image};

/// What a search should return
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchKind {
    #[default]
    All,
    Images,
    Folders,
    Files,
}

impl SearchKind {
    fn accepts(self, is_folder: bool, is_image: bool) -> bool {
        match self {
            SearchKind::All => true,
            SearchKind::Images => is_image,
            SearchKind::Folders => is_folder,
            SearchKind::Files => !is_folder,
        }
    }
}

impl FromStr for SearchKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(SearchKind::All),
            "images" => Ok(SearchKind::Images),
            "folders" => Ok(SearchKind::Folders),
            "files" => Ok(SearchKind::Files),
            other => Err(format!(
                "unknown search type '{}' (expected all, images, folders or files)",
                other
            )),
        }
    }
}

/// One search hit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub name: String,
    /// Slash-joined path from the archive root
    pub path: String,
    pub is_folder: bool,
    pub is_image: bool,
    /// Containing directory, `/` for the root
    pub directory: String,
    /// Lowercase extension with the dot; empty for folders
    pub extension: String,
}

/// One child of a listed directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirItem {
    pub name: String,
    pub is_folder: bool,
    pub is_image: bool,
    pub extension: String,
    /// For a folder, its first image (recursively); for an image, itself
    pub preview_image: Option<String>,
}

impl DirItem {
    pub fn kind(&self) -> &'static str {
        if self.is_folder {
            "folder"
        } else if self.is_image {
            "image"
        } else {
            "file"
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortBy {
    #[default]
    Name,
    Type,
    /// ZIP listings carry no trustworthy dates; sorts like `Name`
    Date,
}

impl FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(SortBy::Name),
            "type" => Ok(SortBy::Type),
            "date" => Ok(SortBy::Date),
            other => Err(format!("unknown sort key '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!("unknown sort order '{}'", other)),
        }
    }
}

impl fmt::Display for SearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SearchKind::All => "all",
            SearchKind::Images => "images",
            SearchKind::Folders => "folders",
            SearchKind::Files => "files",
        })
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

fn trim_path(path: &str) -> &str {
    path.trim_matches('/')
}

/// First image under `tree`, depth first, each level in name order.
///
/// At every level the children are visited in sorted order: a file is
/// tested when reached, a subdirectory is searched when reached. The path
/// returned is relative to `tree`.
pub fn first_image(tree: &DirectoryTree) -> Option<String> {
    tree.sorted().into_iter().find_map(|(name, node)| match node {
        TreeNode::File => is_image(name).then(|| name.to_string()),
        TreeNode::Directory(sub) => first_image(sub).map(|path| join(name, &path)),
    })
}

/// Case-insensitive substring search over the whole of `tree`.
///
/// Folders are searched whether or not they matched themselves. An empty
/// (or blank) query matches nothing.
pub fn search_tree(tree: &DirectoryTree, query: &str, kind: SearchKind) -> Vec<SearchResult> {
    let query = query.trim().to_lowercase();
    let mut results = Vec::new();
    if !query.is_empty() {
        search_level(tree, "", &query, kind, &mut results);
    }
    results
}

fn search_level(
    tree: &DirectoryTree,
    current: &str,
    query: &str,
    kind: SearchKind,
    results: &mut Vec<SearchResult>,
) {
    for (name, node) in tree.iter() {
        let path = join(current, name);
        let is_folder = node.is_dir();

        if name.to_lowercase().contains(query) {
            let is_image = !is_folder && is_image(name);
            if kind.accepts(is_folder, is_image) {
                results.push(SearchResult {
                    name: name.to_string(),
                    path: path.clone(),
                    is_folder,
                    is_image,
                    directory: if current.is_empty() {
                        "/".to_string()
                    } else {
                        current.to_string()
                    },
                    extension: if is_folder {
                        String::new()
                    } else {
                        extension_of(name)
                    },
                });
            }
        }

        if let TreeNode::Directory(sub) = node {
            search_level(sub, &path, query, kind, results);
        }
    }
}

/// Items of one directory in tree order, with previews resolved.
pub fn list_items(tree: &DirectoryTree, path: &str) -> Vec<DirItem> {
    let path = trim_path(path);
    tree.iter()
        .map(|(name, node)| match node {
            TreeNode::Directory(sub) => DirItem {
                name: name.to_string(),
                is_folder: true,
                is_image: false,
                extension: String::new(),
                preview_image: first_image(sub).map(|image| join(&join(path, name), &image)),
            },
            TreeNode::File => {
                let image = is_image(name);
                DirItem {
                    name: name.to_string(),
                    is_folder: false,
                    is_image: image,
                    extension: extension_of(name),
                    preview_image: image.then(|| join(path, name)),
                }
            }
        })
        .collect()
}

/// Sort listed items, folders first; `Desc` reverses the whole ordering.
pub fn sort_items(items: &mut [DirItem], by: SortBy, order: SortOrder) {
    items.sort_by(|a, b| {
        let ordering = a.is_folder.cmp(&b.is_folder).reverse().then_with(|| match by {
            SortBy::Type => a
                .extension
                .cmp(&b.extension)
                .then_with(|| compare_names(a, b)),
            SortBy::Name | SortBy::Date => compare_names(a, b),
        });
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}

fn compare_names(a: &DirItem, b: &DirItem) -> Ordering {
    a.name.to_lowercase().cmp(&b.name.to_lowercase())
}

impl ArchiveRegistry {
    /// Directory at `path` (slash separated, empty for the root).
    ///
    /// `None` if the archive is unknown or not loaded, if any segment is
    /// missing, or if the path names a file. The directory is shared with
    /// the cached tree, not copied.
    pub fn get_subtree(&self, id: &str, path: &str) -> Option<Arc<DirectoryTree>> {
        self.loaded_tree(id)?.descend_shared(path)
    }

    /// Path (from the archive root) of the first image in `folder`,
    /// searching subfolders too.
    pub fn first_image_preview(&self, id: &str, folder: &str) -> Option<String> {
        let tree = self.loaded_tree(id)?;
        let folder = trim_path(folder);
        let image = first_image(tree.descend(folder)?)?;
        Some(join(folder, &image))
    }

    pub fn search(&self, id: &str, query: &str, kind: SearchKind) -> Vec<SearchResult> {
        match self.loaded_tree(id) {
            Some(tree) => search_tree(&tree, query, kind),
            None => Vec::new(),
        }
    }

    /// Items of the directory at `path`, in archive order.
    pub fn list_dir(&self, id: &str, path: &str) -> Option<Vec<DirItem>> {
        let tree = self.loaded_tree(id)?;
        Some(list_items(tree.descend(path)?, path))
    }

    /// Sorted names of the images directly inside `dir`.
    pub fn list_images(&self, id: &str, dir: &str) -> Vec<String> {
        let Some(tree) = self.loaded_tree(id) else {
            return Vec::new();
        };
        let Some(dir) = tree.descend(dir) else {
            return Vec::new();
        };
        dir.sorted()
            .into_iter()
            .filter(|(name, node)| !node.is_dir() && is_image(name))
            .map(|(name, _)| name.to_string())
            .collect()
    }
}
