//! Append-only JSON Lines store with rotation.
//!
//! The active file always lives at the configured path. On rotation it is
//! renamed to `<stem>-<YYYYmmdd-HHMMSS>-<seq>.<ext>` next to it and a fresh
//! active file is opened. Rotated files beyond `max_files` are removed,
//! oldest first.

use crate::error::AuditError;
use crate::traits::{AuditConfig, AuditLogger, AuditStats};
use crate::types::AuditEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// When to start a new file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationPolicy {
    /// Once the active file reaches this many bytes
    Size(u64),
    /// On the first write of a new UTC day
    Daily,
    Never,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self::Size(10 * 1024 * 1024)
    }
}

#[derive(Debug, Clone)]
pub struct RotationConfig {
    pub policy: RotationPolicy,
    /// Rotated files to keep (the active file is not counted)
    pub max_files: usize,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            policy: RotationPolicy::default(),
            max_files: 10,
        }
    }
}

impl RotationConfig {
    pub fn new(policy: RotationPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    pub fn with_max_files(mut self, max: usize) -> Self {
        self.max_files = max;
        self
    }
}

struct ActiveFile {
    file: File,
    bytes_written: u64,
    opened_at: DateTime<Utc>,
}

#[derive(Default)]
struct Counters {
    total_events: AtomicU64,
    failed_events: AtomicU64,
    bytes_written: AtomicU64,
    rotations: AtomicU64,
}

/// Audit logger writing one JSON event per line.
pub struct JsonlAuditLogger {
    path: PathBuf,
    active: Mutex<ActiveFile>,
    config: AuditConfig,
    rotation: RotationConfig,
    counters: Counters,
    sequence: AtomicU64,
}

impl JsonlAuditLogger {
    pub async fn new(
        path: impl Into<PathBuf>,
        config: AuditConfig,
        rotation: RotationConfig,
    ) -> Result<Self, AuditError> {
        let path = path.into();
        if path.file_name().is_none() {
            return Err(AuditError::config(format!(
                "audit path {:?} has no file name",
                path
            )));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = open_append(&path).await?;
        let existing = file.metadata().await?.len();

        Ok(Self {
            path,
            active: Mutex::new(ActiveFile {
                file,
                bytes_written: existing,
                opened_at: Utc::now(),
            }),
            config,
            rotation,
            counters: Counters::default(),
            sequence: AtomicU64::new(0),
        })
    }

    /// Default config, size rotation at 10MB.
    pub async fn with_path(path: impl Into<PathBuf>) -> Result<Self, AuditError> {
        Self::new(path, AuditConfig::default(), RotationConfig::default()).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rotations(&self) -> u64 {
        self.counters.rotations.load(Ordering::Relaxed)
    }

    /// Events currently in the active file
    pub async fn read_active(&self) -> Result<Vec<AuditEvent>, AuditError> {
        let _guard = self.active.lock().await;
        read_events(&self.path).await
    }

    fn needs_rotation(&self, active: &ActiveFile, now: DateTime<Utc>) -> bool {
        match self.rotation.policy {
            RotationPolicy::Size(max) => active.bytes_written >= max,
            RotationPolicy::Daily => active.opened_at.date_naive() != now.date_naive(),
            RotationPolicy::Never => false,
        }
    }

    fn rotated_name(&self, now: DateTime<Utc>) -> PathBuf {
        let (stem, ext) = stem_and_ext(&self.path);
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.dir().join(format!(
            "{}-{}-{:04}.{}",
            stem,
            now.format("%Y%m%d-%H%M%S"),
            seq,
            ext
        ))
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        }
    }

    async fn rotate(&self, active: &mut ActiveFile, now: DateTime<Utc>) -> Result<(), AuditError> {
        active.file.flush().await?;

        let target = self.rotated_name(now);
        tokio::fs::rename(&self.path, &target)
            .await
            .map_err(|e| AuditError::rotation(format!("rename to {:?}: {}", target, e)))?;

        active.file = open_append(&self.path).await?;
        active.bytes_written = 0;
        active.opened_at = now;
        self.counters.rotations.fetch_add(1, Ordering::Relaxed);
        tracing::info!(rotated = ?target, "Audit log rotated");

        self.prune().await
    }

    async fn prune(&self) -> Result<(), AuditError> {
        let (stem, ext) = stem_and_ext(&self.path);
        let prefix = format!("{}-", stem);
        let suffix = format!(".{}", ext);

        let mut rotated = Vec::new();
        let mut dir = tokio::fs::read_dir(self.dir()).await?;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(&prefix) && name.ends_with(&suffix) {
                rotated.push((name, entry.path()));
            }
        }

        // timestamp then sequence, so lexical order is age order
        rotated.sort();
        let excess = rotated.len().saturating_sub(self.rotation.max_files);
        for (_, path) in rotated.into_iter().take(excess) {
            tracing::debug!(path = ?path, "Removing old audit log");
            tokio::fs::remove_file(&path).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl AuditLogger for JsonlAuditLogger {
    async fn log(&self, event: AuditEvent) -> Result<(), AuditError> {
        if !self.config.should_log(event.level) {
            return Ok(());
        }
        let event = if self.config.redact_sensitive {
            event.redacted(&self.config.redact_fields)
        } else {
            event
        };

        let mut line = serde_json::to_string(&event)?;
        line.push('\n');

        let mut active = self.active.lock().await;
        let now = Utc::now();
        if self.needs_rotation(&active, now) {
            self.rotate(&mut active, now).await?;
        }

        match active.file.write_all(line.as_bytes()).await {
            Ok(()) => {
                let len = line.len() as u64;
                active.bytes_written += len;
                self.counters.total_events.fetch_add(1, Ordering::Relaxed);
                self.counters.bytes_written.fetch_add(len, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.counters.failed_events.fetch_add(1, Ordering::Relaxed);
                Err(AuditError::Io(e))
            }
        }
    }

    async fn flush(&self) -> Result<(), AuditError> {
        let mut active = self.active.lock().await;
        active.file.flush().await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "jsonl"
    }

    async fn health_check(&self) -> Result<(), AuditError> {
        tokio::fs::metadata(&self.path).await?;
        Ok(())
    }

    async fn stats(&self) -> AuditStats {
        AuditStats {
            total_events: self.counters.total_events.load(Ordering::Relaxed),
            failed_events: self.counters.failed_events.load(Ordering::Relaxed),
            bytes_written: self.counters.bytes_written.load(Ordering::Relaxed),
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for JsonlAuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlAuditLogger")
            .field("path", &self.path)
            .field("config", &self.config)
            .field("rotation", &self.rotation)
            .finish()
    }
}

async fn open_append(path: &Path) -> Result<File, AuditError> {
    Ok(OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?)
}

fn stem_and_ext(path: &Path) -> (String, String) {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("audit")
        .to_string();
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("jsonl")
        .to_string();
    (stem, ext)
}

/// Parse a JSON Lines audit file; blank lines are skipped
pub async fn read_events(path: &Path) -> Result<Vec<AuditEvent>, AuditError> {
    let content = tokio::fs::read_to_string(path).await?;
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(AuditError::from))
        .collect()
}
