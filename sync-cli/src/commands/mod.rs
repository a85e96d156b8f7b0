//! CLI command implementations.

pub mod records;
pub mod sync;

use crate::adapter::DryRunAdapter;
use crate::config::Config;
use crate::remote::FileRemote;
use anyhow::{Context, Result};
use hearth_sync_client::{SyncEngine, TracingSink};
use hearth_sync_store::SqliteStateStore;
use hearth_sync_types::{Record, RecordKind};
use std::path::PathBuf;
use std::sync::Arc;

/// Everything a command needs to build the engine.
#[derive(Debug)]
pub struct CommandContext {
    /// Data directory.
    pub data_dir: PathBuf,
    /// Loaded configuration.
    pub config: Config,
    /// Remote and provider unreachable.
    pub offline: bool,
}

/// Build and start an engine over the data directory.
pub async fn open_engine(ctx: &CommandContext) -> Result<Arc<SyncEngine>> {
    let db_path = ctx.config.database_path(&ctx.data_dir);
    let state = SqliteStateStore::new(&db_path)
        .await
        .with_context(|| format!("Failed to open state database {}", db_path.display()))?;
    let remote = FileRemote::new(&ctx.config.remote_path(&ctx.data_dir)).offline(ctx.offline);
    let adapter = DryRunAdapter::new(!ctx.offline);

    let engine = Arc::new(SyncEngine::new(
        ctx.config.sync_config(),
        Arc::new(state),
        Arc::new(remote),
        Arc::new(adapter),
        Arc::new(TracingSink),
    ));
    engine.start().await;
    Ok(engine)
}

/// Short label for a record kind.
pub fn kind_label(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Note => "note",
        RecordKind::Task => "task",
        RecordKind::Event => "event",
    }
}

/// One line describing a record.
pub fn format_record(record: &Record) -> String {
    let mut line = format!(
        "{}  {:<5}  {}",
        record.id,
        kind_label(record.kind),
        record.title().unwrap_or("(untitled)")
    );
    if record.unsynced {
        line.push_str("  [unsynced]");
    }
    if let Some(external_id) = &record.external_id {
        line.push_str(&format!("  [ext: {}]", external_id));
    }
    if let Some(error) = &record.sync_error {
        line.push_str(&format!("  [error: {}]", error));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_sync_types::{OwnerId, RecordId};
    use serde_json::json;

    #[test]
    fn format_record_shows_sync_flags() {
        let mut record = Record::new(OwnerId::new("me"), RecordKind::Task, json!({ "title": "Buy milk" }));
        record.id = RecordId::from("r1");
        record.sync_error = Some("503".into());

        let line = format_record(&record);

        assert!(line.starts_with("r1  task   Buy milk"));
        assert!(line.contains("[unsynced]"));
        assert!(line.contains("[error: 503]"));
        assert!(!line.contains("[ext:"));
    }

    #[test]
    fn untitled_records_are_labelled() {
        let record = Record::new(OwnerId::new("me"), RecordKind::Note, json!({}));
        assert!(format_record(&record).contains("(untitled)"));
    }
}
