use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{HostLayout, TransactionJournalEntry, TransactionMetadata};

const METADATA_VERSION: u32 = 1;

static TXID_SEQ: AtomicU64 = AtomicU64::new(0);

pub fn current_unix_timestamp() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system time is before unix epoch")?
        .as_secs())
}

/// Journal of one host-wide operation. Holding it means holding the active
/// marker; `finish` releases it.
#[derive(Debug)]
pub struct OperationJournal<'a> {
    layout: &'a HostLayout,
    metadata: TransactionMetadata,
    next_seq: u64,
}

impl<'a> OperationJournal<'a> {
    /// Claims the active marker and writes the `applying` metadata. Fails if
    /// another operation holds the marker.
    pub fn begin(layout: &'a HostLayout, operation: &str) -> Result<Self> {
        let started_at_unix = current_unix_timestamp()?;
        let txid = format!(
            "tx-{started_at_unix}-{}-{}",
            std::process::id(),
            TXID_SEQ.fetch_add(1, Ordering::Relaxed)
        );
        let journal = Self {
            layout,
            metadata: TransactionMetadata {
                version: METADATA_VERSION,
                txid,
                operation: operation.to_string(),
                status: "applying".to_string(),
                started_at_unix,
            },
            next_seq: 1,
        };

        journal.claim_marker()?;
        if let Err(err) = journal.write_metadata() {
            let _ = journal.release_marker();
            return Err(err);
        }
        tracing::info!(txid = %journal.txid(), operation, "operation started");
        Ok(journal)
    }

    /// Txid recorded in the active marker, if an operation holds it.
    pub fn active_txid(layout: &HostLayout) -> Result<Option<String>> {
        let path = layout.transaction_active_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read active marker: {}", path.display()));
            }
        };
        let txid = raw.trim();
        Ok((!txid.is_empty()).then(|| txid.to_string()))
    }

    pub fn txid(&self) -> &str {
        &self.metadata.txid
    }

    pub fn record(&mut self, step: &str, state: &str, path: Option<String>) -> Result<()> {
        let entry = TransactionJournalEntry {
            seq: self.next_seq,
            step: step.to_string(),
            state: state.to_string(),
            path,
        };
        let line = serde_json::to_string(&entry).context("failed to serialize journal entry")?;
        let journal_path = self.layout.transaction_journal_path(self.txid());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&journal_path)
            .with_context(|| {
                format!("failed to open transaction journal: {}", journal_path.display())
            })?;
        writeln!(file, "{line}").with_context(|| {
            format!("failed to append transaction journal: {}", journal_path.display())
        })?;
        self.next_seq += 1;
        Ok(())
    }

    /// `record` for steps taken after the host already changed. A journal
    /// failure is logged and must not abort the operation.
    pub fn note(&mut self, step: &str, state: &str, path: Option<String>) {
        if let Err(err) = self.record(step, state, path) {
            tracing::warn!(txid = %self.txid(), step, error = %format!("{err:#}"), "failed to append journal entry");
        }
    }

    /// Records the terminal status and releases the active marker.
    pub fn finish(mut self, status: &str) -> Result<()> {
        self.metadata.status = status.to_string();
        let status_result = self.write_metadata();
        self.release_marker()?;
        status_result?;
        tracing::info!(txid = %self.txid(), status, "operation finished");
        Ok(())
    }

    fn claim_marker(&self) -> Result<()> {
        let path = self.layout.transaction_active_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                let holder = Self::active_txid(self.layout)
                    .ok()
                    .flatten()
                    .map(|txid| format!(" (txid={txid})"))
                    .unwrap_or_default();
                return Err(anyhow!(
                    "active marker already exists{holder}: {}",
                    path.display()
                ));
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to claim active marker: {}", path.display()));
            }
        };
        writeln!(file, "{}", self.txid())
            .with_context(|| format!("failed to write active marker: {}", path.display()))
    }

    fn release_marker(&self) -> Result<()> {
        let path = self.layout.transaction_active_path();
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to release active marker: {}", path.display()))
            }
        }
    }

    fn write_metadata(&self) -> Result<()> {
        let path = self.layout.transaction_metadata_path(self.txid());
        let payload = serde_json::to_string_pretty(&self.metadata)
            .context("failed to serialize transaction metadata")?;
        fs::write(&path, format!("{payload}\n")).with_context(|| {
            format!("failed to write transaction metadata: {}", path.display())
        })
    }
}

pub fn read_transaction_metadata(
    layout: &HostLayout,
    txid: &str,
) -> Result<Option<TransactionMetadata>> {
    let path = layout.transaction_metadata_path(txid);
    match read_optional(&path)? {
        Some(raw) => parse_json(&path, &raw).map(Some),
        None => Ok(None),
    }
}

pub fn read_transaction_journal(
    layout: &HostLayout,
    txid: &str,
) -> Result<Vec<TransactionJournalEntry>> {
    let path = layout.transaction_journal_path(txid);
    let Some(raw) = read_optional(&path)? else {
        return Ok(Vec::new());
    };
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| parse_json(&path, line))
        .collect()
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}

fn parse_json<T: DeserializeOwned>(path: &Path, raw: &str) -> Result<T> {
    serde_json::from_str(raw).with_context(|| format!("invalid entry in {}", path.display()))
}
