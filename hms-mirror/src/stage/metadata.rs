use super::{MetadataStrategy, StageContext};
use crate::mirror::TableMirror;
use crate::Result;

pub(super) const ACID_NOT_SUPPORTED: &str = "ACID Table not supported for METADATA phase";

pub(super) fn precondition(table: &TableMirror) -> Option<&'static str> {
    if table.is_transactional() {
        Some(ACID_NOT_SUPPORTED)
    } else {
        None
    }
}

/// Replicate one table's schema to UPPER.
///
/// The LOWER definition is copied and run through the feature pipeline first;
/// the replicator only ever sees the corrected copy.
pub(super) async fn dispatch(
    strategy: MetadataStrategy,
    table: &mut TableMirror,
    context: &StageContext,
) -> Result<()> {
    for feature in table.prepare_replay(&context.features) {
        tracing::debug!(feature, "Schema feature applied");
    }

    let config = context.config.as_ref();
    let replicator = &context.replicator;
    match strategy {
        MetadataStrategy::Direct => replicator.build_upper_schema(table, config).await,
        MetadataStrategy::Transition => {
            let transfer_db = config.transfer_database(&table.db_name);
            tracing::debug!(transfer_db = %transfer_db, "Using transfer schema");
            replicator.build_transfer_schema(table, config).await?;
            replicator.export_schema(table, config).await?;
            replicator.import_transfer_schema(table, config).await
        }
    }
}
