mod common;

use common::{PASSWORD, sample_files, write_zip, write_zipcrypto_zip};
use std::sync::Arc;
use image::ImageFormat;
use zipbrowse::{ArchiveError, ArchiveLocation, ArchiveRegistry, SearchKind, TreeNode};

async fn loaded_sample() -> (tempfile::TempDir, ArchiveRegistry, String) {
    let dir = tempfile::tempdir().unwrap();
    let path = write_zip(dir.path(), "sample.zip", &sample_files(), None);
    let registry = ArchiveRegistry::new();
    let ids = registry.initialize(&[path.to_string_lossy()]).await;
    assert_eq!(ids.len(), 1);
    let id = ids.into_iter().next().unwrap();
    assert!(registry.ensure_loaded(&id).await);
    (dir, registry, id)
}

fn child_names(registry: &ArchiveRegistry, id: &str, path: &str) -> Vec<String> {
    registry
        .get_subtree(id, path)
        .unwrap()
        .iter()
        .map(|(name, _)| name.to_string())
        .collect()
}

#[tokio::test]
async fn sample_archive_is_browsable_without_metadata_entries() {
    let (_dir, registry, id) = loaded_sample().await;

    let info = registry.info(&id).unwrap();
    assert_eq!(info.name, "sample.zip");
    assert_eq!(info.id.len(), 12);
    assert!(!info.requires_password);
    assert!(!info.needs_unlock());

    assert_eq!(child_names(&registry, &id, ""), ["photos", "readme.txt"]);
    assert_eq!(child_names(&registry, &id, "photos"), ["a.jpg", "sub"]);
    assert_eq!(child_names(&registry, &id, "photos/sub"), ["b.png"]);
    assert!(registry.get_subtree(&id, "__MACOSX").is_none());
    assert!(registry.get_subtree(&id, "photos/missing").is_none());
    assert!(registry.get_subtree(&id, "readme.txt").is_none());
    assert!(registry.get_subtree("000000000000", "").is_none());
}

#[tokio::test]
async fn previews_and_image_listings() {
    let (_dir, registry, id) = loaded_sample().await;

    assert_eq!(registry.first_image_preview(&id, "photos").as_deref(), Some("photos/a.jpg"));
    assert_eq!(registry.first_image_preview(&id, "").as_deref(), Some("photos/a.jpg"));
    assert_eq!(
        registry.first_image_preview(&id, "photos/sub").as_deref(),
        Some("photos/sub/b.png")
    );
    assert_eq!(registry.first_image_preview(&id, "nowhere"), None);

    assert_eq!(registry.list_images(&id, "photos"), ["a.jpg"]);
    assert!(registry.list_images(&id, "").is_empty());

    let root = registry.list_dir(&id, "").unwrap();
    let photos = root.iter().find(|item| item.name == "photos").unwrap();
    assert!(photos.is_folder);
    assert_eq!(photos.preview_image.as_deref(), Some("photos/a.jpg"));
}

#[tokio::test]
async fn search_kinds_are_subsets_of_all() {
    let (_dir, registry, id) = loaded_sample().await;

    let all = registry.search(&id, "A", SearchKind::All);
    let paths: Vec<_> = all.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(paths, ["photos/a.jpg", "readme.txt"]);

    for kind in [SearchKind::Images, SearchKind::Folders, SearchKind::Files] {
        for hit in registry.search(&id, "a", kind) {
            assert!(all.contains(&hit), "{kind}: {} not in all", hit.path);
        }
    }

    let images = registry.search(&id, "b", SearchKind::Images);
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].directory, "photos/sub");
    assert_eq!(images[0].extension, ".png");

    assert!(registry.search(&id, "", SearchKind::All).is_empty());
    assert!(registry.search(&id, "   ", SearchKind::All).is_empty());
}

#[tokio::test]
async fn registering_twice_keeps_one_entry() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_zip(dir.path(), "sample.zip", &sample_files(), None);
    let location = ArchiveLocation::Local(path);

    let registry = ArchiveRegistry::new();
    let first = registry.register_all(&[location.clone()]).await;
    let second = registry.register_all(&[location]).await;
    assert_eq!(first, second);
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn directory_scan_registers_archives_in_path_order() {
    let dir = tempfile::tempdir().unwrap();
    write_zip(dir.path(), "b.zip", &sample_files(), None);
    write_zip(dir.path(), "nested/a.ZIP", &sample_files(), None);
    std::fs::write(dir.path().join("notes.txt"), "not an archive").unwrap();

    let registry = ArchiveRegistry::new();
    let ids = registry.initialize(&[dir.path().to_string_lossy()]).await;
    assert_eq!(ids.len(), 2);

    let names: Vec<_> = registry.archives().into_iter().map(|a| a.name).collect();
    assert_eq!(names, ["b.zip", "a.ZIP"]);
}

#[tokio::test]
async fn wrong_password_on_plain_archive_still_unlocks() {
    let (_dir, registry, id) = loaded_sample().await;
    assert!(registry.unlock(&id, Some("not needed")).await);
    assert_eq!(registry.read_entry(&id, "readme.txt").await.unwrap(), b"hello from the archive\n");
}

#[tokio::test]
async fn encrypted_archive_stays_closed_until_unlocked() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_zip(dir.path(), "locked.zip", &sample_files(), Some(PASSWORD));

    let registry = ArchiveRegistry::new();
    let id = registry.initialize(&[path.to_string_lossy()]).await.remove(0);

    let info = registry.info(&id).unwrap();
    assert!(info.requires_password);
    assert!(info.needs_unlock());
    assert!(registry.get_subtree(&id, "").is_none());
    assert!(registry.search(&id, "a", SearchKind::All).is_empty());
    assert!(!registry.ensure_loaded(&id).await);

    let err = registry.read_entry(&id, "readme.txt").await.unwrap_err();
    assert!(matches!(err, ArchiveError::Decryption(_)), "{err}");

    assert!(!registry.unlock(&id, Some("wrong")).await);
    assert!(!registry.unlock(&id, Some("")).await);
    assert!(registry.get_subtree(&id, "").is_none());

    assert!(registry.unlock(&id, Some(PASSWORD)).await);
    let info = registry.info(&id).unwrap();
    assert!(info.is_loaded && info.has_password && !info.needs_unlock());
    assert!(registry.get_subtree(&id, "photos").is_some());

    // remembered password is used for reads and later unlocks
    assert_eq!(registry.read_entry(&id, "/readme.txt").await.unwrap(), b"hello from the archive\n");
    assert!(registry.unlock(&id, None).await);
}

#[tokio::test]
async fn zipcrypto_archive_unlocks_with_its_password() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_zipcrypto_zip(dir.path(), "legacy.zip", &sample_files(), PASSWORD);

    let registry = ArchiveRegistry::new();
    let id = registry.initialize(&[path.to_string_lossy()]).await.remove(0);
    assert!(registry.info(&id).unwrap().requires_password);
    assert!(!registry.ensure_loaded(&id).await);

    let err = registry.read_entry(&id, "readme.txt").await.unwrap_err();
    assert!(matches!(err, ArchiveError::Decryption(_)), "{err}");

    assert!(!registry.unlock(&id, Some("wrong")).await);
    assert!(registry.unlock(&id, Some(PASSWORD)).await);
    assert_eq!(child_names(&registry, &id, ""), ["photos", "readme.txt"]);
    assert_eq!(registry.read_entry(&id, "readme.txt").await.unwrap(), b"hello from the archive\n");

    let jpeg = registry.read_entry(&id, "photos/a.jpg").await.unwrap();
    assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);
}

#[tokio::test]
async fn subtrees_are_shared_with_the_cache() {
    let (_dir, registry, id) = loaded_sample().await;
    let first = registry.get_subtree(&id, "photos").unwrap();
    let second = registry.get_subtree(&id, "/photos/").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(first.get("sub").unwrap().is_dir());
}

#[tokio::test]
async fn reads_report_missing_entries_and_archives() {
    let (_dir, registry, id) = loaded_sample().await;

    assert!(registry.read_entry(&id, "photos/zzz.jpg").await.unwrap_err().is_not_found());
    assert!(registry.read_entry("ffffffffffff", "readme.txt").await.unwrap_err().is_not_found());
    assert!(registry.open_fresh_handle("ffffffffffff").await.is_none());

    let handle = registry.open_fresh_handle(&id).await.unwrap();
    assert!(handle.entry_names().contains(&"readme.txt".to_string()));
}

#[tokio::test]
async fn concurrent_local_reads_do_not_interfere() {
    let (_dir, registry, id) = loaded_sample().await;
    let (a, b, c) = tokio::join!(
        registry.read_entry(&id, "photos/a.jpg"),
        registry.read_entry(&id, "photos/sub/b.png"),
        registry.read_entry(&id, "readme.txt"),
    );
    assert_eq!(image::guess_format(&a.unwrap()).unwrap(), ImageFormat::Jpeg);
    assert_eq!(image::guess_format(&b.unwrap()).unwrap(), ImageFormat::Png);
    assert_eq!(c.unwrap(), b"hello from the archive\n");
}

#[tokio::test]
async fn thumbnails_fit_the_requested_box() {
    let (_dir, registry, id) = loaded_sample().await;

    let thumb = registry.read_thumbnail(&id, "photos/a.jpg", 150).await.unwrap();
    let img = image::load_from_memory_with_format(&thumb, ImageFormat::Jpeg).unwrap();
    assert_eq!((img.width(), img.height()), (150, 75));

    // unsupported size falls back to the default box
    let thumb = registry.read_thumbnail(&id, "photos/a.jpg", 999).await.unwrap();
    let img = image::load_from_memory(&thumb).unwrap();
    assert_eq!(img.width(), 100);

    let thumb = registry.read_thumbnail(&id, "photos/sub/b.png", 100).await.unwrap();
    let img = image::load_from_memory(&thumb).unwrap();
    assert_eq!((img.width(), img.height()), (30, 60));

    assert!(registry.read_thumbnail(&id, "readme.txt", 100).await.unwrap_err().is_not_found());
    assert!(registry.read_thumbnail(&id, "__MACOSX/._a.jpg", 100).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn empty_directories_are_listed() {
    let dir = tempfile::tempdir().unwrap();
    let files = vec![("empty/".to_string(), Vec::new()), ("top.txt".to_string(), b"x".to_vec())];
    let path = write_zip(dir.path(), "dirs.zip", &files, None);

    let registry = ArchiveRegistry::new();
    let id = registry.initialize(&[path.to_string_lossy()]).await.remove(0);
    assert!(registry.ensure_loaded(&id).await);

    let root = registry.get_subtree(&id, "").unwrap();
    assert_eq!(root.get("empty"), Some(&TreeNode::Directory(Default::default())));
    assert!(registry.list_dir(&id, "empty").unwrap().is_empty());
}
