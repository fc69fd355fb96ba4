//! Command-line front end for the archive browser.
//!
//! Every browsing command registers the one archive it was given, unlocks
//! it when a password is supplied, and answers from the same registry
//! operations a long-running server would use.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::Path;
use tokio::io::AsyncWriteExt;

use zipbrowse::cli::{ArchiveArgs, Cli, Command, UserAction};
use zipbrowse::config::Config;
use zipbrowse::lookup::{SortOrder, sort_items};
use zipbrowse::users::{CredentialStore, JsonUserStore, UserUpdate};
use zipbrowse::{ArchiveLocation, ArchiveRegistry, logging};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(logging::level_for(cli.quiet, cli.verbose));

    match cli.command {
        Command::Archives { sources } => list_archives(&sources).await,
        Command::Ls { target, path, sort, desc } => {
            let (registry, id) = open_archive(&target).await?;
            let mut items = registry
                .list_dir(&id, &path)
                .with_context(|| format!("no directory '{}' in {}", path, target.archive))?;
            let order = if desc { SortOrder::Desc } else { SortOrder::Asc };
            sort_items(&mut items, sort, order);

            for item in items {
                match &item.preview_image {
                    Some(preview) if item.is_folder => {
                        println!("{:<6}  {}/  (preview: {})", item.kind(), item.name, preview)
                    }
                    _ if item.is_folder => println!("{:<6}  {}/", item.kind(), item.name),
                    _ => println!("{:<6}  {}", item.kind(), item.name),
                }
            }
            Ok(())
        }
        Command::Search { target, query, kind } => {
            let (registry, id) = open_archive(&target).await?;
            let results = registry.search(&id, &query, kind);
            for result in &results {
                let suffix = if result.is_folder { "/" } else { "" };
                println!("{}{}", result.path, suffix);
            }
            tracing::info!(count = results.len(), %kind, "search finished");
            Ok(())
        }
        Command::Preview { target, folder } => {
            let (registry, id) = open_archive(&target).await?;
            let preview = registry
                .first_image_preview(&id, &folder)
                .with_context(|| format!("no image under '{}'", folder))?;
            println!("{}", preview);
            Ok(())
        }
        Command::Images { target, folder } => {
            let (registry, id) = open_archive(&target).await?;
            for image in registry.list_images(&id, &folder) {
                println!("{}", image);
            }
            Ok(())
        }
        Command::Cat { target, entry, output } => {
            let (registry, id) = open_archive(&target).await?;
            let data = registry
                .read_entry(&id, &entry)
                .await
                .with_context(|| format!("cannot read '{}'", entry))?;
            write_output(&data, output.as_deref()).await
        }
        Command::Thumb { target, entry, size, output } => {
            let (registry, id) = open_archive(&target).await?;
            let data = registry
                .read_thumbnail(&id, &entry, size)
                .await
                .with_context(|| format!("cannot make a thumbnail of '{}'", entry))?;
            write_output(&data, output.as_deref()).await
        }
        Command::User { users_file, action } => manage_users(Config::resolve(users_file), action),
    }
}

/// Register the single archive named by `target` and make its tree available.
async fn open_archive(target: &ArchiveArgs) -> Result<(ArchiveRegistry, String)> {
    let location = ArchiveLocation::parse(&target.archive);
    let registry = ArchiveRegistry::new();

    let id = registry
        .register_all(std::slice::from_ref(&location))
        .await
        .into_iter()
        .next()
        .with_context(|| format!("no archive at {}", location))?;
    let info = registry.info(&id).context("archive vanished from the registry")?;

    let password = target.password.as_deref().filter(|p| !p.is_empty());
    let loaded = match password {
        Some(password) => registry.unlock(&id, Some(password)).await,
        None if info.requires_password => {
            bail!("{} is password protected; pass --password", info.name)
        }
        None => registry.ensure_loaded(&id).await,
    };

    if !loaded {
        if password.is_some() && info.requires_password {
            bail!("wrong password for {}", info.name);
        }
        bail!("cannot open {}", location);
    }

    Ok((registry, id))
}

async fn list_archives(sources: &[String]) -> Result<()> {
    let registry = ArchiveRegistry::new();
    let ids = registry.initialize(sources).await;
    if ids.is_empty() {
        bail!("no archives found");
    }

    for archive in registry.archives() {
        let lock = if archive.requires_password { "locked" } else { "open" };
        let place = if archive.is_remote { "remote" } else { "local" };
        println!(
            "{}  {:<6}  {:<6}  {}  ({})",
            archive.id, lock, place, archive.name, archive.location
        );
    }
    Ok(())
}

async fn write_output(data: &[u8], output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            tokio::fs::write(path, data)
                .await
                .with_context(|| format!("cannot write {}", path.display()))?;
            tracing::info!(path = %path.display(), size = %format_size(data.len() as u64), "written");
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(data).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

fn manage_users(config: Config, action: UserAction) -> Result<()> {
    let store = JsonUserStore::open(&config.users_file)
        .with_context(|| format!("cannot open user store {}", config.users_file.display()))?;

    match action {
        UserAction::Create { username, password, email, admin } => {
            let user = store.create_user(&username, &password, email.as_deref(), admin)?;
            println!("created {}{}", user.username, if user.is_admin { " (admin)" } else { "" });
        }
        UserAction::List => {
            for user in store.list_users()? {
                let last_login = user
                    .last_login
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{:<20}  {:<5}  {:<8}  last login {}  {}",
                    user.username,
                    if user.is_admin { "admin" } else { "user" },
                    if user.active { "active" } else { "disabled" },
                    last_login,
                    user.email
                );
            }
        }
        UserAction::Delete { username } => {
            store.delete_user(&username)?;
            println!("deleted {}", username);
        }
        UserAction::Passwd { username, password } => {
            store.set_password(&username, &password)?;
            println!("password updated for {}", username);
        }
        UserAction::SetActive { username, active } => {
            let update = UserUpdate { active: Some(active), ..Default::default() };
            store.update_user(&username, update)?;
            println!("{} is now {}", username, if active { "active" } else { "disabled" });
        }
        UserAction::Verify { username, password } => {
            if !store.validate_credentials(&username, &password) {
                bail!("invalid credentials for {}", username);
            }
            println!("credentials valid for {}", username);
        }
    }
    Ok(())
}

/// Format a byte size into a human-readable string.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
