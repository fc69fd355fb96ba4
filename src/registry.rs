//! Registry of every archive the process knows about.
//!
//! Archives are discovered once at startup (a file, a directory scan, a URL,
//! or a text manifest of URLs), fingerprinted, and probed for encryption.
//! Their directory tree is only built when first unlocked or browsed.
//!
//! The registry is shared by all request handlers. Its lock is never held
//! across I/O: operations copy what they need, do the slow part unlocked,
//! and commit the result afterwards. Two concurrent unlocks of the same
//! archive both commit; the last one wins, and both built the same tree.

use md5::{Digest, Md5};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::UNIX_EPOCH;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{ArchiveError, Result};
use crate::source::{ArchiveLocation, ArchiveSource, is_url, open_source};
use crate::tree::{DirectoryTree, build_tree};

/// Hex characters kept from the fingerprint digest
const ID_LEN: usize = 12;

/// File extensions picked up when scanning a directory
const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "iso"];

/// One registered archive
pub struct ArchiveEntry {
    pub id: String,
    pub location: ArchiveLocation,
    pub name: String,
    /// Probed once at registration
    pub requires_password: bool,
    password: Option<String>,
    tree: Arc<DirectoryTree>,
    /// Handle kept from the last successful unlock. Content reads never use
    /// it; it only records that the archive has been opened.
    handle: Option<Arc<dyn ArchiveSource>>,
}

impl ArchiveEntry {
    pub fn is_remote(&self) -> bool {
        self.location.is_remote()
    }

    pub fn is_loaded(&self) -> bool {
        self.handle.is_some()
    }

    fn info(&self) -> ArchiveInfo {
        ArchiveInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            location: self.location.clone(),
            is_remote: self.is_remote(),
            requires_password: self.requires_password,
            is_loaded: self.is_loaded(),
            has_password: self.password.is_some(),
        }
    }
}

/// Read-only snapshot of a registered archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveInfo {
    pub id: String,
    pub name: String,
    pub location: ArchiveLocation,
    pub is_remote: bool,
    pub requires_password: bool,
    pub is_loaded: bool,
    pub has_password: bool,
}

impl ArchiveInfo {
    /// Browsing must go through a password prompt first
    pub fn needs_unlock(&self) -> bool {
        self.requires_password && !self.is_loaded
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, ArchiveEntry>,
    /// IDs in registration order
    order: Vec<String>,
}

/// Process-wide archive registry
#[derive(Default)]
pub struct ArchiveRegistry {
    inner: RwLock<Inner>,
}

impl ArchiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Discover and register every archive named by `inputs`.
    ///
    /// Returns the IDs of everything registered, in discovery order.
    pub async fn initialize<S: AsRef<str>>(&self, inputs: &[S]) -> Vec<String> {
        let mut ids = Vec::new();
        for input in inputs {
            let locations = discover(input.as_ref());
            ids.extend(self.register_all(&locations).await);
        }
        ids
    }

    /// Register each location, probing whether it needs a password.
    ///
    /// A location that cannot be fingerprinted (local file gone) is skipped.
    /// One that cannot be opened is still registered; opening it later will
    /// fail again and the caller sees that failure.
    pub async fn register_all(&self, locations: &[ArchiveLocation]) -> Vec<String> {
        let mut ids = Vec::with_capacity(locations.len());

        for location in locations {
            let id = match fingerprint(location) {
                Ok(id) => id,
                Err(e) => {
                    warn!(%location, "skipping archive: {}", e);
                    continue;
                }
            };

            if self.read().entries.contains_key(&id) {
                debug!(%location, %id, "archive already registered");
                ids.push(id);
                continue;
            }

            let name = display_name(location, &id);
            let requires_password = probe_requires_password(location).await;

            let entry = ArchiveEntry {
                id: id.clone(),
                location: location.clone(),
                name,
                requires_password,
                password: None,
                tree: Arc::new(DirectoryTree::new()),
                handle: None,
            };

            info!(
                %id,
                name = %entry.name,
                remote = entry.is_remote(),
                requires_password,
                "registered archive"
            );

            {
                let mut inner = self.write();
                if !inner.entries.contains_key(&id) {
                    inner.order.push(id.clone());
                    inner.entries.insert(id.clone(), entry);
                }
            }

            ids.push(id);
        }

        ids
    }

    /// Open the archive, apply `password` (or the remembered one), and
    /// prove it works by decoding the first file.
    ///
    /// On success the tree is rebuilt and the password remembered. On any
    /// failure nothing about the entry changes.
    pub async fn unlock(&self, id: &str, password: Option<&str>) -> bool {
        let Some((location, remembered)) = self.open_params(id) else {
            return false;
        };

        let password = password.filter(|p| !p.is_empty()).map(str::to_string);
        let effective = password.as_deref().or(remembered.as_deref());

        let source = match open_validated(&location, effective).await {
            Ok(source) => source,
            Err(e) => {
                warn!(%id, %location, "unlock failed: {}", e);
                return false;
            }
        };

        let tree = build_tree(source.entry_names());

        let mut inner = self.write();
        let Some(entry) = inner.entries.get_mut(id) else {
            return false;
        };
        entry.tree = Arc::new(tree);
        entry.handle = Some(Arc::from(source));
        if password.is_some() {
            entry.password = password;
        }
        debug!(%id, entries = entry.tree.len(), "archive unlocked");

        true
    }

    /// Make sure the tree is built, opening with the remembered password.
    pub async fn ensure_loaded(&self, id: &str) -> bool {
        let loaded = self.read().entries.get(id).map(ArchiveEntry::is_loaded);
        match loaded {
            Some(true) => true,
            Some(false) => self.unlock(id, None).await,
            None => false,
        }
    }

    pub fn info(&self, id: &str) -> Option<ArchiveInfo> {
        self.read().entries.get(id).map(ArchiveEntry::info)
    }

    /// Every archive in registration order
    pub fn archives(&self) -> Vec<ArchiveInfo> {
        let inner = self.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.entries.get(id))
            .map(ArchiveEntry::info)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// What a fresh open needs: location and remembered password
    pub(crate) fn open_params(&self, id: &str) -> Option<(ArchiveLocation, Option<String>)> {
        self.read()
            .entries
            .get(id)
            .map(|entry| (entry.location.clone(), entry.password.clone()))
    }

    /// The tree of a loaded archive
    pub(crate) fn loaded_tree(&self, id: &str) -> Option<Arc<DirectoryTree>> {
        self.read()
            .entries
            .get(id)
            .filter(|entry| entry.is_loaded())
            .map(|entry| Arc::clone(&entry.tree))
    }
}

/// Open `location`, apply `password`, and decode the first file entry.
async fn open_validated(
    location: &ArchiveLocation,
    password: Option<&str>,
) -> Result<Box<dyn ArchiveSource>> {
    let mut source = open_source(location).await?;
    if let Some(password) = password {
        source.set_password(password);
    }

    let first_file = source.entry_names().into_iter().find(|n| !n.ends_with('/'));
    if let Some(name) = first_file {
        source.read_entry(&name).await?;
    }

    Ok(source)
}

/// Try to decode the first file without a password.
///
/// Only a failure in the archive bytes (bad password, corrupt or
/// unsupported data) counts as "password required". An archive that cannot
/// be reached at all is reported as not needing one; the real error comes
/// back when it is first opened for browsing.
async fn probe_requires_password(location: &ArchiveLocation) -> bool {
    match open_validated(location, None).await {
        Ok(_) => false,
        Err(e) if e.is_decode_failure() => {
            debug!(%location, "password required: {}", e);
            true
        }
        Err(e) => {
            warn!(%location, "could not probe archive: {}", e);
            false
        }
    }
}

/// Resolve one input into archive locations.
///
/// - an `http(s)` URL is returned as is;
/// - a `.txt` file whose lines are URLs is a manifest of remote archives
///   (blank lines and `#` comments skipped); without any URL line it is
///   treated as an archive itself;
/// - any other existing file is an archive;
/// - a directory is scanned recursively for `.zip` and `.iso` files,
///   sorted by path.
pub fn discover(input: &str) -> Vec<ArchiveLocation> {
    let input = normalize_input(input);

    if is_url(&input) {
        return vec![ArchiveLocation::Remote(input)];
    }

    let path = Path::new(&input);

    if path.is_file() && has_extension(path, &["txt"]) {
        let urls = read_url_manifest(path);
        if !urls.is_empty() {
            return urls.into_iter().map(ArchiveLocation::Remote).collect();
        }
    }

    if path.is_file() {
        vec![ArchiveLocation::Local(path.to_path_buf())]
    } else if path.is_dir() {
        scan_directory(path)
    } else {
        warn!(%input, "no archive at this location");
        Vec::new()
    }
}

fn normalize_input(input: &str) -> String {
    let input = input.trim().replace('"', "");
    if cfg!(windows) {
        input.replace('\\', "/")
    } else {
        input
    }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| extensions.contains(&ext.as_str()))
}

fn read_url_manifest(path: &Path) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter(|line| is_url(line))
            .map(str::to_string)
            .collect(),
        Err(e) => {
            warn!(path = %path.display(), "cannot read URL manifest: {}", e);
            Vec::new()
        }
    }
}

fn scan_directory(dir: &Path) -> Vec<ArchiveLocation> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("skipping unreadable path during scan: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| has_extension(entry.path(), ARCHIVE_EXTENSIONS))
        .map(|entry| ArchiveLocation::Local(entry.into_path()))
        .collect()
}

/// Stable archive ID: first 12 hex digits of an MD5 over the URL, or over
/// path, size and modification time for a local file.
pub fn fingerprint(location: &ArchiveLocation) -> Result<String> {
    let input = match location {
        ArchiveLocation::Remote(url) => url.clone(),
        ArchiveLocation::Local(path) => {
            let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ArchiveError::NotFound(path.display().to_string()),
                _ => ArchiveError::Io(e),
            })?;
            let mtime = metadata
                .modified()?
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or_default();
            format!("{}_{}_{}", path.display(), metadata.len(), mtime)
        }
    };

    let digest = Md5::digest(input.as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(ID_LEN);
    Ok(id)
}

/// Basename for a local file; last URL path segment for a remote one,
/// or a name made up from the ID when the URL has no path.
pub fn display_name(location: &ArchiveLocation, id: &str) -> String {
    match location {
        ArchiveLocation::Local(path) => path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string()),
        ArchiveLocation::Remote(url) => url::Url::parse(url)
            .ok()
            .and_then(|url| {
                url.path_segments()
                    .and_then(|mut segments| segments.next_back().map(str::to_string))
            })
            .filter(|segment| !segment.is_empty())
            .unwrap_or_else(|| format!("remote_zip_{}.zip", id)),
    }
}
