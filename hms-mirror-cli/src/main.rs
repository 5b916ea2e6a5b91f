use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser};
use hms_mirror::config::{default_config_path, default_home_dir, expand_tilde, ReplicationStrategy};
use hms_mirror::replication::{DdlDirectoryCatalog, DisconnectedPools, SqlReplicator};
use hms_mirror::{Config, Engine, MetadataStrategy, Stage, StorageStrategy};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "hms-mirror")]
#[command(about = "Migrate Hive metastore tables between LOWER and UPPER clusters")]
#[command(version)]
#[command(group(ArgGroup::new("stage").required(true).args(["metadata", "storage"])))]
struct Args {
    /// Config file. Default: ~/.hms-mirror/cfg/default.yaml
    #[arg(long = "config", visible_alias = "cfg", env = "HMS_MIRROR_CONFIG")]
    config: Option<PathBuf>,

    /// Run the METADATA stage with strategy DIRECT (default) | TRANSITION
    #[arg(short = 'm', long, value_name = "STRATEGY", num_args = 0..=1)]
    metadata: Option<Option<MetadataStrategy>>,

    /// Run the STORAGE stage with strategy SQL | EXPORT_IMPORT | HYBRID (default) | DISTCP
    #[arg(short = 's', long, value_name = "STRATEGY", num_args = 0..=1)]
    storage: Option<Option<StorageStrategy>>,

    /// Comma separated list of databases
    #[arg(long = "database", visible_alias = "db", value_delimiter = ',')]
    databases: Vec<String>,

    /// Select databases by regex instead of listing them
    #[arg(long = "db-regex", value_name = "REGEX")]
    db_regex: Option<String>,

    /// Only tables whose name matches this regex
    #[arg(long = "table-filter", visible_alias = "tf", value_name = "REGEX")]
    table_filter: Option<String>,

    /// Prefix added to database names on UPPER
    #[arg(long = "db-prefix", value_name = "PREFIX")]
    db_prefix: Option<String>,

    /// Retry the last incomplete run for this config
    #[arg(short = 'r', long)]
    retry: bool,

    /// Execute the statements. Without this the run is a dry-run.
    #[arg(short = 'e', long)]
    execute: bool,

    /// Skip the backup confirmations asked before an --execute run
    #[arg(long)]
    accept: bool,

    /// Report file. Default: ~/.hms-mirror/reports/hms-mirror-<stage>-<timestamp>.md
    #[arg(short = 'f', long = "output-file", value_name = "FILE")]
    output_file: Option<PathBuf>,

    /// Both clusters use the same storage; locations are not translated
    #[arg(long = "share-storage", visible_alias = "ss")]
    share_storage: bool,

    /// UPPER owns the data ('external.table.purge'='true'). METADATA stage with shared storage.
    #[arg(short = 'c', long)]
    commit: bool,

    /// UPPER is a read-only DR target; ownership is not moved. METADATA stage only.
    #[arg(long = "disaster-recovery", visible_alias = "dr")]
    disaster_recovery: bool,

    /// Migrate ACID tables. STORAGE stage with EXPORT_IMPORT or HYBRID only.
    #[arg(short = 'a', long)]
    acid: bool,

    /// OVERWRITE | SYNCHRONIZE (default)
    #[arg(long = "replication-strategy", visible_alias = "rs", value_name = "STRATEGY")]
    replication_strategy: Option<ReplicationStrategy>,

    /// Directory of captured definitions (<dir>/<lower|upper>/<db>/<table>.sql)
    #[arg(long = "catalog-dir", value_name = "DIR")]
    catalog_dir: Option<PathBuf>,

    /// Log output format: pretty | json
    #[arg(long = "log-format", value_name = "FORMAT")]
    log_format: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(strategy) = self.metadata {
            config.stage = Some(Stage::Metadata);
            if let Some(strategy) = strategy {
                config.metadata.strategy = strategy;
            }
        } else if let Some(strategy) = self.storage {
            config.stage = Some(Stage::Storage);
            if let Some(strategy) = strategy {
                config.storage.strategy = strategy;
            }
        }

        if !self.databases.is_empty() {
            config.databases = self.databases.clone();
        }
        if let Some(regex) = &self.db_regex {
            config.db_regex = Some(regex.clone());
        }
        if let Some(regex) = &self.table_filter {
            config.tbl_regex = Some(regex.clone());
        }
        if let Some(prefix) = &self.db_prefix {
            config.db_prefix = Some(prefix.clone());
        }
        if let Some(strategy) = self.replication_strategy {
            config.replication_strategy = strategy;
        }
        if let Some(format) = &self.log_format {
            config.logging.format = format.clone();
        }

        config.share_storage |= self.share_storage;
        config.commit_to_upper |= self.commit;
        config.metadata.disaster_recovery |= self.disaster_recovery;
        config.storage.migrate_acid |= self.acid;
        config.execute = self.execute;
    }
}

fn init_tracing(level: &str, format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    if format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// The same three affirmations the tool has always asked for before touching clusters.
fn confirm_execute() -> Result<()> {
    let prompts = [
        "I have made backups of both the 'Hive Metastore' in the LOWER and UPPER clusters",
        "I have taken 'Filesystem' Snapshots/Backups of the target 'Hive Databases' on the LOWER and UPPER clusters",
        "'Filesystem' TRASH has been configured on my system",
    ];
    let stdin = std::io::stdin();
    for prompt in prompts {
        print!("{} (TRUE to proceed): ", prompt);
        std::io::stdout().flush()?;
        let mut response = String::new();
        stdin.read_line(&mut response)?;
        if !response.trim().eq_ignore_ascii_case("true") {
            bail!("You must affirm to proceed.");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => expand_tilde(path)?,
        None => default_config_path(),
    };
    let mut config = Config::load(&config_path)?;
    args.apply(&mut config);

    init_tracing(&config.logging.level, &config.logging.format);
    tracing::info!("===================================================");
    tracing::info!("Running: hms-mirror v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("===================================================");
    tracing::info!(config = %config_path.display(), "Using config");

    config.validate()?;
    if config.execute && !args.accept {
        confirm_execute()?;
    }

    let stage = config.stage.context("Stage (METADATA|STORAGE) has not been specified")?;
    let report_file = match &args.output_file {
        Some(path) => expand_tilde(path)?,
        None => default_home_dir().join("reports").join(format!(
            "hms-mirror-{}-{}.md",
            stage,
            chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
        )),
    };
    let catalog_dir = match &args.catalog_dir {
        Some(dir) => expand_tilde(dir)?,
        None => default_home_dir().join("catalog"),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; tables not yet dispatched will be marked ERROR");
            shutdown_tx.send_replace(true);
        }
    });

    let replicator = Arc::new(SqlReplicator::new(Arc::new(DisconnectedPools)));
    let outcome = Engine::new(
        config,
        &config_path,
        Arc::new(DdlDirectoryCatalog::new(catalog_dir)),
        replicator.clone(),
        replicator,
    )
    .with_retry(args.retry)
    .with_report_file(report_file)
    .with_shutdown(shutdown_rx)
    .with_span(tracing::Span::current())
    .run()
    .await
    .context("hms-mirror run failed")?;

    println!("{}", outcome.conversion);
    for (state, count) in outcome.conversion.phase_counts() {
        println!("\t{:<27}: {}", state.to_string(), count);
    }
    if let Some(path) = &outcome.report_file {
        println!("Status report: {}", path.display());
    }
    println!("Retry file: {}", outcome.retry_file.display());

    Ok(())
}
