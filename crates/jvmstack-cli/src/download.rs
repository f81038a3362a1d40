use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use jvmstack_core::{DesiredState, DesiredStateSource, FileDesiredState};
use jvmstack_installer::Downloader;
use reqwest::blocking::Client;

use crate::render::{format_download_size, TerminalRenderer};

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("jvmstack/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")
}

/// Blocking HTTP downloader. Bytes land in a `.part` sibling that is renamed
/// over the destination only once the body was read completely.
pub(crate) struct HttpDownloader {
    client: Client,
    renderer: TerminalRenderer,
}

impl HttpDownloader {
    pub(crate) fn new(timeout: Duration, renderer: TerminalRenderer) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            renderer,
        })
    }

    fn download_to(&self, url: &str, out_path: &Path) -> Result<u64> {
        let mut response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("request failed: {url}"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("download failed with status {status}: {url}"));
        }

        let progress = self
            .renderer
            .start_download_progress(artifact_label(url), response.content_length());
        let mut file = File::create(out_path)
            .with_context(|| format!("failed to create {}", out_path.display()))?;
        let mut buffer = vec![0_u8; 64 * 1024];
        let mut written = 0_u64;
        loop {
            let read = match response.read(&mut buffer) {
                Ok(read) => read,
                Err(err) => {
                    if let Some(progress) = &progress {
                        progress.abandon();
                    }
                    return Err(err).with_context(|| format!("failed reading body of {url}"));
                }
            };
            if read == 0 {
                break;
            }
            file.write_all(&buffer[..read])
                .with_context(|| format!("failed to write {}", out_path.display()))?;
            written += read as u64;
            if let Some(progress) = &progress {
                progress.set_position(written);
            }
        }
        file.flush()
            .with_context(|| format!("failed to flush {}", out_path.display()))?;
        if let Some(progress) = progress {
            progress.finish_and_clear();
        }
        Ok(written)
    }
}

impl Downloader for HttpDownloader {
    fn download(&self, url: &str, destination: &Path) -> Result<()> {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let part_path = part_path(destination);
        tracing::info!(url, "downloading artifact");

        let written = match self.download_to(url, &part_path) {
            Ok(written) => written,
            Err(err) => {
                let _ = fs::remove_file(&part_path);
                return Err(err);
            }
        };

        if destination.exists() {
            fs::remove_file(destination)
                .with_context(|| format!("failed to replace {}", destination.display()))?;
        }
        fs::rename(&part_path, destination).with_context(|| {
            format!(
                "failed to move downloaded artifact into place: {}",
                destination.display()
            )
        })?;
        tracing::debug!(url, size = %format_download_size(written), "download complete");
        Ok(())
    }
}

pub(crate) fn part_path(destination: &Path) -> PathBuf {
    destination.with_file_name(format!(
        "{}.part",
        destination
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or("artifact")
    ))
}

fn artifact_label(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or(url)
}

/// Descriptor served over HTTP(S). A `.toml` path is parsed as TOML,
/// anything else as JSON.
pub(crate) struct UrlDesiredState {
    url: String,
    client: Client,
}

impl UrlDesiredState {
    pub(crate) fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            url: url.into(),
            client: build_client(timeout)?,
        })
    }
}

impl DesiredStateSource for UrlDesiredState {
    fn load(&self) -> Result<DesiredState> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .with_context(|| format!("failed to fetch desired state descriptor: {}", self.url))?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!(
                "failed to fetch desired state descriptor: {} (status {status})",
                self.url
            ));
        }
        let body = response
            .text()
            .with_context(|| format!("failed reading desired state descriptor: {}", self.url))?;
        let parsed = if is_toml_location(&self.url) {
            DesiredState::from_toml_str(&body)
        } else {
            DesiredState::from_json_str(&body)
        };
        parsed.with_context(|| format!("invalid descriptor: {}", self.url))
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

fn is_toml_location(url: &str) -> bool {
    url.split(['?', '#'])
        .next()
        .is_some_and(|path| path.ends_with(".toml"))
}

/// Picks the descriptor source for `location`: HTTP(S) URLs are fetched,
/// anything else (optionally `file://`-prefixed) is read from disk.
pub(crate) fn desired_state_source(
    location: &str,
    timeout: Duration,
) -> Result<Box<dyn DesiredStateSource>> {
    let location = location.trim();
    if location.starts_with("https://") || location.starts_with("http://") {
        return Ok(Box::new(UrlDesiredState::new(location, timeout)?));
    }
    let path = location.strip_prefix("file://").unwrap_or(location);
    Ok(Box::new(FileDesiredState::new(path)))
}
