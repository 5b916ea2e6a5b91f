//! Run orchestration
//!
//! fresh run:  validate -> setup -> save -> snapshots on -> stage -> final save -> report
//! `--retry`:  load retry file -> validate -> snapshots on -> stage -> final save -> report

use crate::config::Config;
use crate::feature::FeatureSet;
use crate::mirror::Conversion;
use crate::replication::{DataTransfer, MetastoreCatalog, SchemaReplicator};
use crate::report;
use crate::setup;
use crate::stage::{StageContext, StageRunner, StageSummary, StageTask};
use crate::state::StateMaintenance;
use crate::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{field, Instrument, Span};

/// What a completed run hands back
#[derive(Debug)]
pub struct RunOutcome {
    pub conversion: Conversion,
    pub summary: StageSummary,
    pub report: String,
    /// Set when the report was written to disk
    pub report_file: Option<PathBuf>,
    pub retry_file: PathBuf,
}

pub struct Engine {
    config: Config,
    config_path: PathBuf,
    retry: bool,
    report_file: Option<PathBuf>,
    catalog: Arc<dyn MetastoreCatalog>,
    replicator: Arc<dyn SchemaReplicator>,
    transfer: Arc<dyn DataTransfer>,
    features: FeatureSet,
    shutdown: watch::Receiver<bool>,
    span: Span,
}

impl Engine {
    pub fn new(
        config: Config,
        config_path: impl Into<PathBuf>,
        catalog: Arc<dyn MetastoreCatalog>,
        replicator: Arc<dyn SchemaReplicator>,
        transfer: Arc<dyn DataTransfer>,
    ) -> Self {
        // Never flips unless a caller supplies its own signal.
        let (_tx, shutdown) = watch::channel(false);
        Self {
            config,
            config_path: config_path.into(),
            retry: false,
            report_file: None,
            catalog,
            replicator,
            transfer,
            features: FeatureSet::standard(),
            shutdown,
            span: Span::none(),
        }
    }

    /// Resume from the retry file of this config instead of collecting.
    pub fn with_retry(mut self, retry: bool) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_report_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_file = Some(path.into());
        self
    }

    pub fn with_features(mut self, features: FeatureSet) -> Self {
        self.features = features;
        self
    }

    /// Tasks that haven't dispatched when this flips to `true` end in `ERROR`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Parent span for everything the run logs.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn retry_file(&self) -> PathBuf {
        StateMaintenance::retry_file_for(&self.config_path, &self.config.state.retry_dir)
    }

    pub async fn run(self) -> Result<RunOutcome> {
        let span = tracing::info_span!(
            parent: &self.span,
            "hms_mirror",
            stage = field::Empty,
            retry = self.retry
        );
        self.run_inner().instrument(span).await
    }

    async fn run_inner(self) -> Result<RunOutcome> {
        let started = Instant::now();
        let state = StateMaintenance::new(
            &self.config_path,
            &self.config.state.retry_dir,
            Duration::from_millis(self.config.state.snapshot_interval_ms),
            Span::current(),
        );

        let conversion = if self.retry {
            // The persisted conversion carries the config it ran with; it wins.
            state.load_retry()?
        } else {
            self.config.validate()?;
            Conversion::new(self.config.clone())
        };
        let config = Arc::new(conversion.config.clone());
        config.validate()?;
        let task = StageTask::for_config(&config)?;
        Span::current().record("stage", field::display(task.stage()));

        if config.execute {
            tracing::info!("EXECUTE mode: actions will be run against the clusters");
        } else {
            tracing::info!(
                "EXECUTE has NOT been set. No ACTIONS will be performed, statements are recorded in the report"
            );
        }

        let shared = conversion.into_shared();

        if !self.retry {
            match setup::collect(&shared, self.catalog.as_ref(), &config).await {
                Ok(tables) => {
                    tracing::info!(tables, catalog = self.catalog.name(), "Setup collected tables");
                    if let Err(e) = state.save_state(&shared) {
                        tracing::warn!(error = %e, "Could not save state after setup");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Setup failed");
                    if let Err(del) = state.delete_state() {
                        tracing::warn!(error = %del, "Could not remove retry file");
                    }
                    return Err(e);
                }
            }
        }

        state.start(shared.clone());

        let context = Arc::new(StageContext {
            config: config.clone(),
            replicator: self.replicator.clone(),
            transfer: self.transfer.clone(),
            features: self.features.clone(),
            shutdown: self.shutdown.clone(),
        });
        let runner = StageRunner::new(task, context, Span::current());
        let summary = runner.run(&shared).await;

        state.stop().await;
        if let Err(e) = state.save_state(&shared) {
            tracing::warn!(error = %e, "Could not save final state");
        }

        let conversion = shared.read().clone();
        let report = report::render_markdown(&conversion);
        let report_file = match &self.report_file {
            Some(path) => match write_report(path, &report) {
                Ok(()) => {
                    tracing::info!(path = %path.display(), "Status report written");
                    Some(path.clone())
                }
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Could not write report");
                    None
                }
            },
            None => None,
        };

        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "HMS-Mirror: completed"
        );

        Ok(RunOutcome {
            conversion,
            summary,
            report,
            report_file,
            retry_file: state.retry_file().to_path_buf(),
        })
    }
}

fn write_report(path: &Path, report: &str) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, report)?;
    Ok(())
}
