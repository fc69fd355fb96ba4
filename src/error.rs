//! Error type shared by the I/O, ZIP and registry layers.

use thiserror::Error;

/// Errors raised while locating, opening or decoding an archive.
///
/// The variants follow how a caller is expected to react:
///
/// - [`NotFound`](ArchiveError::NotFound): unknown archive ID, path absent
///   from the tree, or entry absent from the archive (a 404).
/// - [`Decryption`](ArchiveError::Decryption): missing or wrong password,
///   the caller should ask for one.
/// - [`Format`](ArchiveError::Format) and
///   [`Unsupported`](ArchiveError::Unsupported): the bytes could not be
///   decoded.
/// - [`Io`](ArchiveError::Io) and [`Transport`](ArchiveError::Transport):
///   disk or network failure, worth retrying later.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("invalid archive: {0}")]
    Format(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(String),
}

impl ArchiveError {
    /// True for failures that come from the archive bytes themselves
    /// (bad password, corrupt data, unknown method) rather than from
    /// reaching the archive.
    pub fn is_decode_failure(&self) -> bool {
        matches!(
            self,
            ArchiveError::Decryption(_) | ArchiveError::Format(_) | ArchiveError::Unsupported(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ArchiveError::NotFound(_))
    }
}

impl From<reqwest::Error> for ArchiveError {
    fn from(err: reqwest::Error) -> Self {
        ArchiveError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
