use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::info;
use url::Url;

use crate::error::{DetectionError, Result};

const FALLBACK_FILENAME: &str = "image.jpg";

/// Default download cache: `<user cache>/eggcount/downloads`, or `./downloads`.
pub fn default_download_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("eggcount").join("downloads"))
        .unwrap_or_else(|| PathBuf::from("downloads"))
}

/// Resolve an image reference to a readable local path.
///
/// `http`/`https` URLs are downloaded once into `download_dir` and reused
/// afterwards; anything else is taken as a local path.
pub fn resolve_reference(reference: &str, download_dir: &Path) -> Result<PathBuf> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(DetectionError::EmptyReference);
    }
    match Url::parse(reference) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => fetch_cached(&url, download_dir),
        _ => Ok(PathBuf::from(reference)),
    }
}

/// Cache file name for a URL: the last path segment, or a fixed fallback.
pub fn cache_filename(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !matches!(*name, "" | "." | ".."))
        .map(sanitize)
        .unwrap_or_else(|| FALLBACK_FILENAME.to_string())
}

// keep the cache inside `download_dir` whatever the URL contains
fn sanitize(name: &str) -> String {
    name.replace(['/', '\\'], "_")
}

fn fetch_cached(url: &Url, download_dir: &Path) -> Result<PathBuf> {
    let cache_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| DetectionError::Cache { path, source }
    };

    fs::create_dir_all(download_dir).map_err(cache_err(download_dir))?;
    let local = download_dir.join(cache_filename(url));
    if local.exists() {
        return Ok(local);
    }

    info!(url = %url, path = %local.display(), "downloading image");
    let response = ureq::get(url.as_str())
        .call()
        .map_err(|e| DetectionError::Download {
            url: url.to_string(),
            source: Box::new(e),
        })?;

    // one temp file per request; it is removed on drop if anything below fails
    let mut partial = NamedTempFile::new_in(download_dir).map_err(cache_err(download_dir))?;
    io::copy(&mut response.into_reader(), partial.as_file_mut()).map_err(cache_err(partial.path()))?;
    match partial.persist_noclobber(&local) {
        Ok(_) => Ok(local),
        // a concurrent request for the same URL finished first
        Err(_) if local.exists() => Ok(local),
        Err(e) => Err(cache_err(&local)(e.error)),
    }
}
