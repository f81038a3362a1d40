use anyhow::{anyhow, Context, Result};
use jvmstack_core::ArchiveType;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::fs_utils::{list_dir_names, run_command};

/// Downloads and unpacks a distribution archive into a staging directory and
/// returns the directory holding the unpacked payload.
pub trait ArtifactFetcher {
    fn fetch(&self, url: &str, staging_dir: &Path) -> Result<PathBuf>;
}

/// Transfers the bytes behind a URL into a local file.
pub trait Downloader {
    fn download(&self, url: &str, destination: &Path) -> Result<()>;
}

/// Fetcher that downloads with `D` (or copies local sources) and unpacks
/// with the host's `tar`/`unzip`.
#[derive(Debug, Clone)]
pub struct ArchiveFetcher<D> {
    downloader: D,
}

impl<D: Downloader> ArchiveFetcher<D> {
    pub fn new(downloader: D) -> Self {
        Self { downloader }
    }
}

impl<D: Downloader> ArtifactFetcher for ArchiveFetcher<D> {
    fn fetch(&self, url: &str, staging_dir: &Path) -> Result<PathBuf> {
        let archive_type = ArchiveType::infer_from_url(url)
            .ok_or_else(|| anyhow!("unsupported archive type for artifact: {url}"))?;
        fs::create_dir_all(staging_dir)
            .with_context(|| format!("failed to create {}", staging_dir.display()))?;

        let archive_path = staging_dir.join(format!("artifact.{}", archive_type.as_str()));
        match local_source_path(url) {
            Some(source) => {
                fs::copy(&source, &archive_path).with_context(|| {
                    format!(
                        "failed to copy local artifact {} to {}",
                        source.display(),
                        archive_path.display()
                    )
                })?;
            }
            None => self.downloader.download(url, &archive_path)?,
        }

        let raw_dir = staging_dir.join("raw");
        fs::create_dir_all(&raw_dir)
            .with_context(|| format!("failed to create {}", raw_dir.display()))?;
        extract_archive(&archive_path, &raw_dir, archive_type)?;
        payload_root(&raw_dir)
    }
}

fn local_source_path(url: &str) -> Option<PathBuf> {
    if let Some(path) = url.strip_prefix("file://") {
        return Some(PathBuf::from(path));
    }
    let path = Path::new(url);
    if path.is_absolute() {
        return Some(path.to_path_buf());
    }
    None
}

/// Distribution archives wrap their content in a single top-level directory
/// (`jdk-17.0.2/`, `apache-tomcat-10.1.19/`); that directory is the payload.
pub fn payload_root(raw_dir: &Path) -> Result<PathBuf> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(raw_dir)
        .with_context(|| format!("failed to read extracted payload: {}", raw_dir.display()))?
    {
        entries.push(entry?.path());
    }

    if entries.is_empty() {
        return Err(anyhow!(
            "artifact extracted no files into {}",
            raw_dir.display()
        ));
    }

    let dirs = list_dir_names(raw_dir)?;
    if entries.len() == 1 && dirs.len() == 1 {
        return Ok(raw_dir.join(&dirs[0]));
    }
    Ok(raw_dir.to_path_buf())
}

pub fn extract_archive(archive_path: &Path, dst: &Path, archive_type: ArchiveType) -> Result<()> {
    match archive_type {
        ArchiveType::Zip => extract_zip(archive_path, dst),
        ArchiveType::TarGz | ArchiveType::TarXz | ArchiveType::Tar => extract_tar(archive_path, dst),
    }
}

fn extract_tar(archive_path: &Path, dst: &Path) -> Result<()> {
    run_command(
        Command::new("tar")
            .arg("-xf")
            .arg(archive_path)
            .arg("-C")
            .arg(dst),
        "failed to extract tar archive",
    )
}

fn extract_zip(archive_path: &Path, dst: &Path) -> Result<()> {
    let mut unzip_command = Command::new("unzip");
    unzip_command.arg("-q").arg(archive_path).arg("-d").arg(dst);
    if run_command(
        &mut unzip_command,
        "failed to extract zip archive with unzip",
    )
    .is_ok()
    {
        return Ok(());
    }

    run_command(
        Command::new("tar")
            .arg("-xf")
            .arg(archive_path)
            .arg("-C")
            .arg(dst),
        "failed to extract zip archive with tar fallback",
    )
}
