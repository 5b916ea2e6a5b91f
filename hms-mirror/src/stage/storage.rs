use super::{StageContext, StorageStrategy};
use crate::mirror::TableMirror;
use crate::Result;

/// Move one table's data with the configured strategy.
pub(super) async fn dispatch(
    strategy: StorageStrategy,
    table: &mut TableMirror,
    context: &StageContext,
) -> Result<()> {
    table.prepare_replay(&context.features);

    let config = context.config.as_ref();
    let transfer = &context.transfer;
    match strategy {
        StorageStrategy::Sql => transfer.sql(table, config).await,
        StorageStrategy::ExportImport => transfer.export_import(table, config).await,
        StorageStrategy::Hybrid => transfer.hybrid(table, config).await,
        StorageStrategy::Distcp => transfer.distcp(table, config).await,
    }
}
