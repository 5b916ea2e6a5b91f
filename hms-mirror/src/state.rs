//! Retry file maintenance
//!
//! The whole [`Conversion`] is written to a retry file on a fixed interval while
//! a stage runs, plus synchronously at the checkpoints the engine picks. A
//! `--retry` run reloads it and lets the phase states decide what runs again.
//!
//! The retry file is identified by the SHA-256 of the canonical config path, so
//! every config gets its own file regardless of when the run started.

use crate::mirror::{Conversion, SharedConversion};
use crate::{Error, Result};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, Span};

pub struct StateMaintenance {
    retry_file: PathBuf,
    interval: Duration,
    span: Span,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    snapshot_task: Mutex<Option<JoinHandle<()>>>,
}

impl StateMaintenance {
    pub fn new(config_path: &Path, retry_dir: &Path, interval: Duration, span: Span) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            retry_file: Self::retry_file_for(config_path, retry_dir),
            interval,
            span,
            shutdown_tx,
            shutdown_rx,
            snapshot_task: Mutex::new(None),
        }
    }

    /// `<retry_dir>/<sha256(canonical config path)>.retry.yaml`
    pub fn retry_file_for(config_path: &Path, retry_dir: &Path) -> PathBuf {
        let canonical =
            std::fs::canonicalize(config_path).unwrap_or_else(|_| config_path.to_path_buf());
        let digest = Sha256::digest(canonical.to_string_lossy().as_bytes());
        retry_dir.join(format!("{}.retry.yaml", hex::encode(digest)))
    }

    pub fn retry_file(&self) -> &Path {
        &self.retry_file
    }

    /// Snapshot the conversion now.
    pub fn save_state(&self, conversion: &SharedConversion) -> Result<()> {
        write_snapshot(&self.retry_file, conversion)?;
        tracing::debug!(parent: &self.span, path = %self.retry_file.display(), "Saved retry state");
        Ok(())
    }

    /// Remove the retry file; a missing file is fine.
    pub fn delete_state(&self) -> Result<()> {
        if self.retry_file.exists() {
            std::fs::remove_file(&self.retry_file)?;
            tracing::info!(parent: &self.span, path = %self.retry_file.display(), "Removed retry state");
        }
        Ok(())
    }

    /// Restore the conversion saved by an earlier run of the same config.
    ///
    /// A missing or unreadable file is fatal for a retry run.
    pub fn load_retry(&self) -> Result<Conversion> {
        let path = self.retry_file.display();
        if !self.retry_file.exists() {
            return Err(Error::Retry(format!("Could NOT locate 'retry' file: {}", path)));
        }
        let content = std::fs::read_to_string(&self.retry_file)
            .map_err(|e| Error::Retry(format!("Could NOT read 'retry' file: {}: {}", path, e)))?;
        let conversion: Conversion = serde_yaml::from_str(&content)
            .map_err(|e| Error::Retry(format!("Could NOT read 'retry' file: {}: {}", path, e)))?;
        tracing::info!(
            parent: &self.span,
            path = %path,
            tables = conversion.table_count(),
            "Loaded retry state"
        );
        Ok(conversion)
    }

    /// Start the background snapshot loop. Write failures are logged and skipped.
    pub fn start(&self, conversion: SharedConversion) {
        let retry_file = self.retry_file.clone();
        let period = self.interval;
        let mut shutdown_rx = self.shutdown_rx.clone();

        tracing::info!(
            parent: &self.span,
            interval_ms = period.as_millis() as u64,
            "State maintenance started"
        );

        let task = async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately; nothing has changed yet.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = write_snapshot(&retry_file, &conversion) {
                            tracing::warn!(error = %e, "Retry snapshot failed");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            tracing::info!("State maintenance shutting down");
                            break;
                        }
                    }
                }
            }
        }
        .instrument(self.span.clone());

        *self.snapshot_task.lock() = Some(tokio::spawn(task));
    }

    /// Signal the loop to stop and wait for it.
    pub async fn stop(&self) {
        self.shutdown_tx.send_replace(true);
        let task = self.snapshot_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(parent: &self.span, error = %e, "State maintenance task failed");
            }
        }
    }
}

/// Serialize under a read lock, then write tmp + rename so readers never see a partial file.
fn write_snapshot(path: &Path, conversion: &SharedConversion) -> Result<()> {
    let yaml = serde_yaml::to_string(&*conversion.read())?;
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let tmp_path = path.with_extension("yaml.tmp");
    std::fs::write(&tmp_path, &yaml)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::mirror::PhaseState;
    use tempfile::TempDir;

    fn maintenance(temp: &TempDir, interval: Duration) -> StateMaintenance {
        let config_path = temp.path().join("default.yaml");
        std::fs::write(&config_path, "databases: [sales]\n").unwrap();
        StateMaintenance::new(&config_path, &temp.path().join("retry"), interval, Span::none())
    }

    fn conversion() -> SharedConversion {
        let mut conversion = Conversion::new(Config::default());
        let db = conversion.add_database("sales");
        db.add_table("orders").phase_state = PhaseState::Success;
        db.add_table("customers").phase_state = PhaseState::Error;
        conversion.into_shared()
    }

    #[test]
    fn test_retry_file_is_stable_per_config() {
        let temp = TempDir::new().unwrap();
        let retry_dir = temp.path().join("retry");
        let a = temp.path().join("a.yaml");
        let b = temp.path().join("b.yaml");
        std::fs::write(&a, "").unwrap();
        std::fs::write(&b, "").unwrap();

        let first = StateMaintenance::retry_file_for(&a, &retry_dir);
        assert_eq!(first, StateMaintenance::retry_file_for(&a, &retry_dir));
        assert_ne!(first, StateMaintenance::retry_file_for(&b, &retry_dir));
        assert!(first.starts_with(&retry_dir));

        // 64 hex chars + ".retry.yaml"
        let name = first.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(name.len(), 64 + ".retry.yaml".len());
    }

    #[test]
    fn test_save_load_delete() {
        let temp = TempDir::new().unwrap();
        let state = maintenance(&temp, Duration::from_secs(5));
        let shared = conversion();

        state.save_state(&shared).unwrap();
        let restored = state.load_retry().unwrap();
        assert_eq!(restored, *shared.read());

        state.delete_state().unwrap();
        assert!(!state.retry_file().exists());
        state.delete_state().unwrap();
    }

    #[test]
    fn test_missing_retry_file_is_fatal() {
        let temp = TempDir::new().unwrap();
        let state = maintenance(&temp, Duration::from_secs(5));
        let err = state.load_retry().unwrap_err();
        assert!(matches!(err, Error::Retry(_)));
        assert!(err.to_string().contains("Could NOT locate"));
    }

    #[test]
    fn test_corrupt_retry_file_is_fatal() {
        let temp = TempDir::new().unwrap();
        let state = maintenance(&temp, Duration::from_secs(5));
        std::fs::create_dir_all(state.retry_file().parent().unwrap()).unwrap();
        std::fs::write(state.retry_file(), "databases: [[[").unwrap();
        assert!(matches!(state.load_retry(), Err(Error::Retry(_))));
    }

    #[tokio::test]
    async fn test_background_loop_snapshots_until_stopped() {
        let temp = TempDir::new().unwrap();
        let state = maintenance(&temp, Duration::from_millis(20));
        let shared = conversion();

        state.start(shared.clone());
        tokio::time::sleep(Duration::from_millis(120)).await;
        state.stop().await;

        assert!(state.retry_file().exists());
        assert_eq!(state.load_retry().unwrap(), *shared.read());

        // No writes after stop
        std::fs::remove_file(state.retry_file()).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!state.retry_file().exists());
    }
}
