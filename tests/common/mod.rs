//! Fixtures shared by the integration tests: archive builders and a
//! minimal HTTP/1.1 server that answers HEAD and ranged GET requests.

#![allow(dead_code)]

use image::{ImageFormat, Rgb, RgbImage};
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use zip::unstable::write::FileOptionsExt;
use zip::write::{FileOptions, SimpleFileOptions};
use zip::{AesMode, ZipWriter};

pub const PASSWORD: &str = "open sesame";

/// Encoded test image, `width` x `height`, in `format`
pub fn image_bytes(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x * 7) as u8, (y * 5) as u8, 90]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).unwrap();
    out.into_inner()
}

/// The layout most tests browse
pub fn sample_files() -> Vec<(String, Vec<u8>)> {
    vec![
        ("photos/a.jpg".into(), image_bytes(400, 200, ImageFormat::Jpeg)),
        ("photos/sub/b.png".into(), image_bytes(30, 60, ImageFormat::Png)),
        ("readme.txt".into(), b"hello from the archive\n".to_vec()),
        ("__MACOSX/._a.jpg".into(), vec![0u8; 16]),
    ]
}

/// ZIP bytes holding `files`, AES-256 encrypted when a password is given.
/// Names ending in `/` become directory entries.
pub fn zip_bytes(files: &[(String, Vec<u8>)], password: Option<&str>) -> Vec<u8> {
    match password {
        Some(password) => build_zip(
            files,
            SimpleFileOptions::default().with_aes_encryption(AesMode::Aes256, password),
        ),
        None => build_zip(files, SimpleFileOptions::default()),
    }
}

/// ZIP bytes holding `files` under legacy PKWARE encryption
pub fn zipcrypto_zip_bytes(files: &[(String, Vec<u8>)], password: &str) -> Vec<u8> {
    build_zip(
        files,
        SimpleFileOptions::default().with_deprecated_encryption(password.as_bytes()),
    )
}

fn build_zip(files: &[(String, Vec<u8>)], options: FileOptions<'_, ()>) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in files {
        if name.ends_with('/') {
            writer
                .add_directory(name.clone(), SimpleFileOptions::default())
                .unwrap();
        } else {
            writer.start_file(name.clone(), options.clone()).unwrap();
            writer.write_all(data).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

pub fn write_zip(dir: &Path, name: &str, files: &[(String, Vec<u8>)], password: Option<&str>) -> PathBuf {
    write_file(dir, name, &zip_bytes(files, password))
}

pub fn write_zipcrypto_zip(dir: &Path, name: &str, files: &[(String, Vec<u8>)], password: &str) -> PathBuf {
    write_file(dir, name, &zipcrypto_zip_bytes(files, password))
}

fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Serves a fixed set of files over plain HTTP on a loopback port.
pub struct RangeServer {
    base: String,
    heads: Arc<AtomicUsize>,
    gets: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl RangeServer {
    pub async fn start(files: Vec<(String, Vec<u8>)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let files: Arc<HashMap<String, Vec<u8>>> = Arc::new(files.into_iter().collect());
        let heads = Arc::new(AtomicUsize::new(0));
        let gets = Arc::new(AtomicUsize::new(0));

        let task = {
            let heads = Arc::clone(&heads);
            let gets = Arc::clone(&gets);
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        break;
                    };
                    let files = Arc::clone(&files);
                    let heads = Arc::clone(&heads);
                    let gets = Arc::clone(&gets);
                    tokio::spawn(async move {
                        let _ = respond(stream, &files, &heads, &gets).await;
                    });
                }
            })
        };

        Self { base, heads, gets, task }
    }

    pub fn url(&self, name: &str) -> String {
        format!("{}/{}", self.base, name)
    }

    /// HEAD requests answered so far; one per opened handle
    pub fn head_requests(&self) -> usize {
        self.heads.load(Ordering::SeqCst)
    }

    pub fn get_requests(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

impl Drop for RangeServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn respond(
    mut stream: TcpStream,
    files: &HashMap<String, Vec<u8>>,
    heads: &AtomicUsize,
    gets: &AtomicUsize,
) -> std::io::Result<()> {
    let mut request = Vec::new();
    let mut chunk = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&chunk[..n]);
    }

    let text = String::from_utf8_lossy(&request);
    let mut lines = text.lines();
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().trim_start_matches('/').to_string();
    let range = lines.find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case("range")
            .then(|| value.trim().to_string())
    });

    let Some(body) = files.get(&path) else {
        stream
            .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
            .await?;
        return stream.shutdown().await;
    };

    match method.as_str() {
        "HEAD" => {
            heads.fetch_add(1, Ordering::SeqCst);
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nAccept-Ranges: bytes\r\nConnection: close\r\n\r\n",
                body.len()
            );
            stream.write_all(head.as_bytes()).await?;
        }
        "GET" => {
            gets.fetch_add(1, Ordering::SeqCst);
            let (start, end) = range
                .as_deref()
                .and_then(parse_range)
                .unwrap_or((0, body.len().saturating_sub(1)));
            let end = end.min(body.len().saturating_sub(1));
            let slice = body.get(start..=end).unwrap_or_default();
            let head = format!(
                "HTTP/1.1 206 Partial Content\r\nContent-Length: {}\r\nContent-Range: bytes {}-{}/{}\r\nConnection: close\r\n\r\n",
                slice.len(),
                start,
                end,
                body.len()
            );
            stream.write_all(head.as_bytes()).await?;
            stream.write_all(slice).await?;
        }
        _ => {
            stream
                .write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await?;
        }
    }
    stream.shutdown().await
}

fn parse_range(value: &str) -> Option<(usize, usize)> {
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    Some((start.trim().parse().ok()?, end.trim().parse().ok()?))
}
