//! Turning media references into local files.
//!
//! `http://` and `https://` references are downloaded into the job
//! workspace. `file://` references and plain paths are used where they are,
//! after checking they exist.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use inlay_common::config::AcquisitionSettings;
use inlay_common::error::{InlayError, InlayResult};
use reqwest::Client;
use tokio::task::JoinSet;

/// Where a reference points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaRef {
    Remote(String),
    Local(PathBuf),
}

impl MediaRef {
    pub fn parse(reference: &str) -> Self {
        let trimmed = reference.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::Remote(trimmed.to_string())
        } else if let Some(path) = trimmed.strip_prefix("file://") {
            Self::Local(PathBuf::from(path))
        } else {
            Self::Local(PathBuf::from(trimmed))
        }
    }
}

/// One item of a batch acquisition.
#[derive(Debug, Clone)]
pub struct AcquireRequest {
    /// Key the result is returned under.
    pub key: String,
    pub reference: String,
    /// File stem used when the reference has to be downloaded.
    pub name: String,
}

impl AcquireRequest {
    pub fn new(key: impl Into<String>, reference: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
            reference: reference.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Fetches media for a job.
#[derive(Debug, Clone)]
pub struct Acquirer {
    client: Client,
}

impl Acquirer {
    pub fn new(settings: &AcquisitionSettings) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client with timeout: {e}");
                Client::new()
            });
        Self { client }
    }

    /// Resolve one reference to a local file.
    ///
    /// Remote files are written to `dest_dir/<name>.<ext>`, with the
    /// extension taken from the URL path (`mp4` when it has none).
    pub async fn acquire(
        &self,
        reference: &str,
        dest_dir: &Path,
        name: &str,
    ) -> InlayResult<PathBuf> {
        match MediaRef::parse(reference) {
            MediaRef::Local(path) => match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_file() => {
                    tracing::debug!(path = %path.display(), "Using local media in place");
                    Ok(path)
                }
                Ok(_) => Err(InlayError::acquisition(reference, "not a regular file")),
                Err(e) => Err(InlayError::acquisition(reference, e.to_string())),
            },
            MediaRef::Remote(url) => {
                let dest = dest_dir.join(format!("{}.{}", sanitize(name), url_extension(&url)));
                self.download(&url, &dest).await?;
                Ok(dest)
            }
        }
    }

    async fn download(&self, url: &str, dest: &Path) -> InlayResult<()> {
        let started = std::time::Instant::now();
        let data = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| InlayError::acquisition(url, format!("request failed: {e}")))?
            .error_for_status()
            .map_err(|e| InlayError::acquisition(url, format!("HTTP error: {e}")))?
            .bytes()
            .await
            .map_err(|e| InlayError::acquisition(url, format!("failed to read body: {e}")))?;

        tokio::fs::write(dest, &data).await.map_err(|e| {
            InlayError::acquisition(url, format!("failed to write {}: {e}", dest.display()))
        })?;

        tracing::info!(
            url,
            bytes = data.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "Downloaded media"
        );
        Ok(())
    }

    /// Acquire every request concurrently. Any failure fails the batch and
    /// aborts the remaining downloads.
    ///
    /// Download names are made unique within the batch, so requests whose
    /// names only differ in characters `sanitize` replaces still land in
    /// separate files.
    pub async fn acquire_all(
        &self,
        requests: Vec<AcquireRequest>,
        dest_dir: &Path,
    ) -> InlayResult<BTreeMap<String, PathBuf>> {
        let mut taken = HashSet::new();
        let mut tasks = JoinSet::new();
        for request in requests {
            let name = unique_name(&request.name, &mut taken);
            if name != request.name {
                tracing::debug!(key = %request.key, name = %name, "Renamed download");
            }
            let acquirer = self.clone();
            let dest_dir = dest_dir.to_path_buf();
            tasks.spawn(async move {
                let path = acquirer
                    .acquire(&request.reference, &dest_dir, &name)
                    .await?;
                Ok::<_, InlayError>((request.key, path))
            });
        }

        let mut acquired = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            let result = joined
                .map_err(|e| InlayError::render(format!("acquisition task panicked: {e}")))
                .and_then(|r| r);
            match result {
                Ok((key, path)) => {
                    acquired.insert(key, path);
                }
                Err(err) => {
                    tasks.abort_all();
                    return Err(err);
                }
            }
        }
        Ok(acquired)
    }
}

fn url_extension(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/')
        .next()
        .and_then(|segment| segment.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| {
            !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .unwrap_or_else(|| "mp4".to_string())
}

/// Sanitized `name`, suffixed with a counter until no earlier name in the
/// batch matches it. Compared case-insensitively.
fn unique_name(name: &str, taken: &mut HashSet<String>) -> String {
    let base = sanitize(name);
    let mut candidate = base.clone();
    let mut n = 1;
    while !taken.insert(candidate.to_ascii_lowercase()) {
        candidate = format!("{base}_{n}");
        n += 1;
    }
    candidate
}

fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "media".to_string()
    } else {
        cleaned
    }
}
