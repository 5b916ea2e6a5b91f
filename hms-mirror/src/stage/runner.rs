use super::{StageContext, StageTask, WorkerPool};
use crate::mirror::{PhaseState, Scheduling, SharedConversion, TableMirror};
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, Span};

/// Counts for one pass of a stage over the conversion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageSummary {
    /// Tasks handed to the pool
    pub submitted: usize,
    /// Previously successful tables left alone
    pub skipped: usize,
    /// Tables failing the stage precondition; never reach the pool
    pub rejected: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub panicked: usize,
    pub elapsed_ms: u64,
}

/// Drives one stage across every table of a conversion.
pub struct StageRunner {
    task: StageTask,
    context: Arc<StageContext>,
    span: Span,
}

impl StageRunner {
    pub fn new(task: StageTask, context: Arc<StageContext>, span: Span) -> Self {
        Self {
            task,
            context,
            span,
        }
    }

    pub fn task(&self) -> StageTask {
        self.task
    }

    /// Schedule every eligible table and wait for all of them.
    ///
    /// Table failures are recorded on the tables; this never returns early.
    pub async fn run(&self, conversion: &SharedConversion) -> StageSummary {
        self.run_stage(conversion)
            .instrument(self.span.clone())
            .await
    }

    async fn run_stage(&self, conversion: &SharedConversion) -> StageSummary {
        let stage = self.task.stage();
        let started = Instant::now();
        let mut summary = StageSummary::default();

        let eligible = self.claim_eligible(conversion, &mut summary);

        let mut pool = WorkerPool::new(stage.to_string(), self.context.config.concurrency(stage));
        tracing::info!(
            tables = eligible.len(),
            concurrency = pool.size(),
            strategy = %self.task.strategy_name(),
            "{}-STAGE: starting",
            stage
        );

        for table in eligible {
            let key = (table.db_name.clone(), table.name.clone());
            let span = tracing::info_span!("table", db = %table.db_name, table = %table.name);
            let work = self
                .task
                .execute(table, self.context.clone(), conversion.clone())
                .instrument(span);
            pool.submit(key, work);
        }
        summary.submitted = pool.len();

        for ((db, table), result) in pool.drain().await {
            match result {
                Ok(PhaseState::Success) => summary.succeeded += 1,
                Ok(_) => summary.failed += 1,
                Err(e) => {
                    summary.panicked += 1;
                    tracing::error!(db = %db, table = %table, error = %e, "Task panicked");
                    if let Some(tbl) = conversion.write().table_mut(&db, &table) {
                        tbl.fail(format!("Task panicked: {}", e));
                    }
                }
            }
        }

        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        let overview = conversion.read().to_string();
        tracing::info!(
            submitted = summary.submitted,
            skipped = summary.skipped,
            rejected = summary.rejected,
            succeeded = summary.succeeded,
            failed = summary.failed + summary.panicked,
            elapsed_ms = summary.elapsed_ms,
            "{}-STAGE: completed\n{}",
            stage,
            overview
        );
        summary
    }

    /// Walk databases then tables in name order and decide each table's fate.
    ///
    /// Skips and rejections are applied in place. Tables to run are returned as
    /// owned copies; each task writes its copy back when it claims and finishes.
    fn claim_eligible(
        &self,
        conversion: &SharedConversion,
        summary: &mut StageSummary,
    ) -> Vec<TableMirror> {
        let mut conversion = conversion.write();
        let mut eligible = Vec::new();

        for db in conversion.databases.values_mut() {
            for table in db.table_mirrors.values_mut() {
                match table.phase_state.scheduling() {
                    Scheduling::SkipPastSuccess => {
                        tracing::debug!(
                            db = %table.db_name,
                            table = %table.name,
                            "Successful in previous run, skipping and marking RETRY_SKIPPED_PAST_SUCCESS"
                        );
                        table.phase_state = PhaseState::RetrySkippedPastSuccess;
                        summary.skipped += 1;
                    }
                    Scheduling::AlreadySkipped => {
                        tracing::debug!(
                            db = %table.db_name,
                            table = %table.name,
                            "Successful in previous run, skipping"
                        );
                        summary.skipped += 1;
                    }
                    Scheduling::Run => match self.task.precondition(table) {
                        Some(reason) => {
                            tracing::info!(db = %table.db_name, table = %table.name, reason, "Rejected");
                            if !table.issues.iter().any(|issue| issue == reason) {
                                table.add_issue(reason);
                            }
                            table.phase_state = PhaseState::Error;
                            summary.rejected += 1;
                        }
                        None => eligible.push(table.clone()),
                    },
                }
            }
        }
        eligible
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::feature::FeatureSet;
    use crate::mirror::Conversion;
    use crate::replication::SqlReplicator;
    use crate::replication::DisconnectedPools;
    use crate::stage::{MetadataStrategy, Stage};
    use tokio::sync::watch;

    fn context(config: Config, shutdown: watch::Receiver<bool>) -> Arc<StageContext> {
        let config = Arc::new(config);
        let replicator = Arc::new(SqlReplicator::new(Arc::new(DisconnectedPools)));
        Arc::new(StageContext {
            config,
            replicator: replicator.clone(),
            transfer: replicator,
            features: FeatureSet::standard(),
            shutdown,
        })
    }

    fn conversion(config: &Config) -> SharedConversion {
        let mut conversion = Conversion::new(config.clone());
        let db = conversion.add_database("sales");
        for name in ["customers", "orders"] {
            db.add_table(name).lower.definition = vec![
                format!("CREATE EXTERNAL TABLE `{}`(", name),
                "  `id` bigint)".into(),
                "LOCATION".into(),
                format!("  'hdfs://lower:8020/warehouse/sales/{}'", name),
            ];
        }
        conversion.into_shared()
    }

    fn metadata_config() -> Config {
        Config {
            stage: Some(Stage::Metadata),
            databases: vec!["sales".into()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_dry_run_metadata_succeeds() {
        let config = metadata_config();
        let shared = conversion(&config);
        let (_tx, rx) = watch::channel(false);
        let runner = StageRunner::new(
            StageTask::Metadata(MetadataStrategy::Direct),
            context(config, rx),
            Span::none(),
        );

        let summary = runner.run(&shared).await;
        assert_eq!(summary.submitted, 2);
        assert_eq!(summary.succeeded, 2);

        let conversion = shared.read();
        for table in conversion.tables() {
            assert_eq!(table.phase_state, PhaseState::Success);
            assert!(!table.actions.is_empty());
        }
    }

    #[tokio::test]
    async fn test_cancelled_run_errors_without_dispatch() {
        let config = metadata_config();
        let shared = conversion(&config);
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let runner = StageRunner::new(
            StageTask::Metadata(MetadataStrategy::Direct),
            context(config, rx),
            Span::none(),
        );

        let summary = runner.run(&shared).await;
        assert_eq!(summary.failed, 2);
        let conversion = shared.read();
        for table in conversion.tables() {
            assert_eq!(table.phase_state, PhaseState::Error);
            assert!(table.actions.is_empty());
            assert!(table.issues[0].contains("Cancelled"));
        }
    }

    #[tokio::test]
    async fn test_rejection_not_duplicated_on_rerun() {
        let config = metadata_config();
        let shared = conversion(&config);
        shared
            .write()
            .table_mut("sales", "orders")
            .unwrap()
            .lower
            .definition
            .extend(["TBLPROPERTIES (".to_string(), "  'transactional'='true')".to_string()]);

        let (_tx, rx) = watch::channel(false);
        let runner = StageRunner::new(
            StageTask::Metadata(MetadataStrategy::Direct),
            context(config, rx),
            Span::none(),
        );
        assert_eq!(runner.run(&shared).await.rejected, 1);
        assert_eq!(runner.run(&shared).await.rejected, 1);

        let conversion = shared.read();
        let orders = conversion.table("sales", "orders").unwrap();
        assert_eq!(orders.phase_state, PhaseState::Error);
        assert_eq!(orders.issues.len(), 1);
    }
}
