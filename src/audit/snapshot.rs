//! Offline page snapshots for isolated audits
//!
//! A snapshot is a self-contained local copy of a rendered page: its HTML
//! with stylesheets combined into one local file and images mirrored next
//! to it. Auditing the snapshot instead of the live page keeps the analysis
//! reproducible and stops third-party widgets from interfering with the
//! rule engine.

use scraper::{Html, Selector};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Failed to create snapshot directory: {0}")]
    Io(#[from] std::io::Error),
}

/// A built snapshot; the backing directory is removed on drop
pub struct Snapshot {
    dir: TempDir,
    index: PathBuf,
}

impl Snapshot {
    /// `file://` URL of the snapshot's entry document
    pub fn index_url(&self) -> String {
        format!("file://{}", self.index.display())
    }

    #[cfg(test)]
    pub fn dir_path(&self) -> &std::path::Path {
        self.dir.path()
    }
}

/// Builds an offline snapshot of a rendered page
///
/// Stylesheets referenced by `<link rel="stylesheet">` are downloaded and
/// concatenated into a single local file; `<img>` sources are mirrored into
/// an assets directory. References are rewritten in the HTML text by
/// replacing the original attribute values. Asset downloads are best-effort:
/// a failed or denylisted asset keeps its original reference, which the
/// renderer simply fails to load offline. The snapshot is staged under
/// `staging` when given, otherwise under the system temp directory.
pub async fn build_snapshot(
    html: &str,
    base_url: &Url,
    denylist: &[String],
    staging: Option<&Path>,
    client: &reqwest::Client,
) -> Result<Snapshot, SnapshotError> {
    let dir = match staging {
        Some(parent) => TempDir::new_in(parent)?,
        None => TempDir::new()?,
    };
    let assets_dir = dir.path().join("assets");
    std::fs::create_dir_all(&assets_dir)?;

    let (stylesheet_refs, image_refs) = collect_asset_refs(html, base_url);

    let mut rewritten = html.to_string();

    let mut combined_css = String::new();
    for (attr_value, absolute) in &stylesheet_refs {
        if denied(absolute, denylist) {
            continue;
        }
        match fetch_text(client, absolute).await {
            Ok(css) => {
                combined_css.push_str(&css);
                combined_css.push('\n');
                rewritten = rewritten.replace(attr_value, "assets/styles.css");
            }
            Err(e) => tracing::debug!("Skipping stylesheet {}: {}", absolute, e),
        }
    }
    if !combined_css.is_empty() {
        std::fs::write(assets_dir.join("styles.css"), combined_css)?;
    }

    for (index, (attr_value, absolute)) in image_refs.iter().enumerate() {
        if denied(absolute, denylist) {
            continue;
        }
        match fetch_bytes(client, absolute).await {
            Ok(bytes) => {
                let name = format!("img_{}{}", index, extension_of(absolute));
                std::fs::write(assets_dir.join(&name), bytes)?;
                rewritten = rewritten.replace(attr_value, &format!("assets/{}", name));
            }
            Err(e) => tracing::debug!("Skipping image {}: {}", absolute, e),
        }
    }

    let index = dir.path().join("index.html");
    std::fs::write(&index, rewritten)?;

    Ok(Snapshot { dir, index })
}

/// Collects (attribute value, absolute URL) pairs for stylesheets and images
fn collect_asset_refs(html: &str, base_url: &Url) -> (Vec<(String, String)>, Vec<(String, String)>) {
    let document = Html::parse_document(html);
    let mut stylesheets = Vec::new();
    let mut images = Vec::new();

    if let Ok(selector) = Selector::parse("link[rel='stylesheet'][href]") {
        for element in document.select(&selector) {
            if let Some(href) = element.value().attr("href") {
                if let Some(absolute) = resolve_asset(href, base_url) {
                    stylesheets.push((href.to_string(), absolute));
                }
            }
        }
    }

    if let Ok(selector) = Selector::parse("img[src]") {
        for element in document.select(&selector) {
            if let Some(src) = element.value().attr("src") {
                if let Some(absolute) = resolve_asset(src, base_url) {
                    images.push((src.to_string(), absolute));
                }
            }
        }
    }

    (stylesheets, images)
}

fn resolve_asset(reference: &str, base_url: &Url) -> Option<String> {
    let reference = reference.trim();
    if reference.is_empty() || reference.starts_with("data:") {
        return None;
    }

    let absolute = base_url.join(reference).ok()?;
    if absolute.scheme() == "http" || absolute.scheme() == "https" {
        Some(absolute.to_string())
    } else {
        None
    }
}

fn denied(url: &str, denylist: &[String]) -> bool {
    denylist.iter().any(|entry| url.contains(entry.as_str()))
}

fn extension_of(url: &str) -> String {
    let path = url.split(&['?', '#'][..]).next().unwrap_or(url);
    match path.rsplit_once('.') {
        Some((_, ext)) if ext.len() <= 4 && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            format!(".{}", ext)
        }
        _ => ".bin".to_string(),
    }
}

async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String, reqwest::Error> {
    client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await
}

async fn fetch_bytes(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, reqwest::Error> {
    Ok(client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?
        .to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/page").unwrap()
    }

    #[test]
    fn test_collect_asset_refs() {
        let html = r#"<html><head>
            <link rel="stylesheet" href="/main.css">
            <link rel="icon" href="/favicon.ico">
        </head><body>
            <img src="logo.png">
            <img src="data:image/png;base64,AAAA">
        </body></html>"#;

        let (stylesheets, images) = collect_asset_refs(html, &base());
        assert_eq!(
            stylesheets,
            vec![("/main.css".to_string(), "https://example.com/main.css".to_string())]
        );
        assert_eq!(
            images,
            vec![("logo.png".to_string(), "https://example.com/logo.png".to_string())]
        );
    }

    #[test]
    fn test_denylist_matches_substring() {
        let denylist = vec!["googletagmanager.com".to_string()];
        assert!(denied("https://www.googletagmanager.com/gtm.js", &denylist));
        assert!(!denied("https://example.com/app.js", &denylist));
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("https://x.test/a/logo.png?v=2"), ".png");
        assert_eq!(extension_of("https://x.test/a/photo.jpeg"), ".jpeg");
        assert_eq!(extension_of("https://x.test/dynamic-image"), ".bin");
    }

    #[tokio::test]
    async fn test_snapshot_without_assets_writes_index() {
        let client = reqwest::Client::new();
        let html = "<html><body><p>Hello</p></body></html>";
        let snapshot = build_snapshot(html, &base(), &[], None, &client)
            .await
            .unwrap();

        let index = snapshot.dir_path().join("index.html");
        assert_eq!(std::fs::read_to_string(index).unwrap(), html);
        assert!(snapshot.index_url().starts_with("file://"));
    }

    #[tokio::test]
    async fn test_snapshot_directory_removed_on_drop() {
        let client = reqwest::Client::new();
        let snapshot = build_snapshot("<html></html>", &base(), &[], None, &client)
            .await
            .unwrap();
        let path = snapshot.dir_path().to_path_buf();
        assert!(path.exists());

        drop(snapshot);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_missing_staging_directory_fails() {
        let client = reqwest::Client::new();
        let missing = Path::new("/nonexistent/lens-staging");
        let result = build_snapshot("<html></html>", &base(), &[], Some(missing), &client).await;
        assert!(result.is_err());
    }
}
