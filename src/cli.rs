use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::lookup::{SearchKind, SortBy};
use crate::thumbnail::DEFAULT_SIZE;

#[derive(Parser, Debug)]
#[command(name = "zipbrowse")]
#[command(version)]
#[command(about = "Browse local or remote (HTTP Range) ZIP archives", long_about = None)]
#[command(after_help = "Examples:\n  \
  zipbrowse archives ~/zips list.txt                  show every archive found\n  \
  zipbrowse ls photos.zip vacation --sort type        list one folder\n  \
  zipbrowse search -P secret locked.zip beach         search an encrypted archive\n  \
  zipbrowse cat https://example.com/a.zip readme.txt  print one entry from a remote ZIP")]
pub struct Cli {
    /// Less output (errors only)
    #[arg(short = 'q', long, global = true, action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// More output (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// The archive a browsing command works on
#[derive(Args, Debug, Clone)]
pub struct ArchiveArgs {
    /// ZIP file path or HTTP(S) URL
    #[arg(value_name = "ARCHIVE")]
    pub archive: String,

    /// Password for encrypted archives
    #[arg(short = 'P', long, value_name = "PASSWORD")]
    pub password: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List archives found in files, directories, URLs or .txt manifests
    Archives {
        #[arg(value_name = "SOURCES", required = true)]
        sources: Vec<String>,
    },

    /// List one directory of an archive
    Ls {
        #[command(flatten)]
        target: ArchiveArgs,

        /// Directory inside the archive (default: root)
        #[arg(value_name = "PATH", default_value = "")]
        path: String,

        /// Sort key: name, type or date
        #[arg(long, default_value = "name")]
        sort: SortBy,

        /// Reverse the order
        #[arg(long)]
        desc: bool,
    },

    /// Case-insensitive substring search over every name in an archive
    Search {
        #[command(flatten)]
        target: ArchiveArgs,

        #[arg(value_name = "QUERY")]
        query: String,

        /// Result filter: all, images, folders or files
        #[arg(short = 't', long = "type", default_value_t = SearchKind::All)]
        kind: SearchKind,
    },

    /// Print the first image inside a folder
    Preview {
        #[command(flatten)]
        target: ArchiveArgs,

        #[arg(value_name = "FOLDER", default_value = "")]
        folder: String,
    },

    /// List the images directly inside a folder
    Images {
        #[command(flatten)]
        target: ArchiveArgs,

        #[arg(value_name = "FOLDER", default_value = "")]
        folder: String,
    },

    /// Write the bytes of one entry to stdout or a file
    Cat {
        #[command(flatten)]
        target: ArchiveArgs,

        #[arg(value_name = "ENTRY")]
        entry: String,

        /// Output file instead of stdout
        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Render a JPEG thumbnail of an image entry
    Thumb {
        #[command(flatten)]
        target: ArchiveArgs,

        #[arg(value_name = "ENTRY")]
        entry: String,

        /// Bounding box edge in pixels (80, 100, 150, 200 or 250)
        #[arg(short = 's', long, default_value_t = DEFAULT_SIZE)]
        size: u32,

        /// Output file instead of stdout
        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Manage the user store
    User {
        /// User store file (default: $ZIPBROWSE_USERS_FILE or ~/.zipbrowse/users.json)
        #[arg(long, global = true, value_name = "FILE")]
        users_file: Option<PathBuf>,

        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum UserAction {
    /// Add a user
    Create {
        username: String,
        password: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        admin: bool,
    },

    /// Show every user
    List,

    /// Remove a user
    Delete { username: String },

    /// Set a new password
    Passwd { username: String, password: String },

    /// Enable or disable a user
    SetActive {
        username: String,
        #[arg(action = clap::ArgAction::Set)]
        active: bool,
    },

    /// Check a username and password
    Verify { username: String, password: String },
}
