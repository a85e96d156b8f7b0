//! Record commands: add, edit, delete, list.

use super::{format_record, open_engine, CommandContext};
use anyhow::Result;
use hearth_sync_types::{OwnerId, Record, RecordId, RecordKind};

/// Create a record.
pub async fn add(
    ctx: &CommandContext,
    title: &str,
    kind: RecordKind,
    remind_at: Option<i64>,
) -> Result<()> {
    let engine = open_engine(ctx).await?;

    let mut record = Record::new(
        OwnerId::new(ctx.config.sync.owner.clone()),
        kind,
        serde_json::json!({ "title": title }),
    );
    record.remind_at = remind_at;
    let saved = engine.save(record).await;
    engine.shutdown();

    println!("{}", saved.id);
    Ok(())
}

/// Change a record's title.
pub async fn edit(ctx: &CommandContext, id: &str, title: &str) -> Result<()> {
    let engine = open_engine(ctx).await?;
    let id = RecordId::from(id);

    let Some(mut record) = engine.record(&id) else {
        engine.shutdown();
        anyhow::bail!("No record with id {}", id);
    };
    match record.payload.as_object_mut() {
        Some(fields) => {
            fields.insert("title".into(), title.into());
        }
        None => record.payload = serde_json::json!({ "title": title }),
    }
    let saved = engine.save(record).await;
    engine.shutdown();

    println!("{}", format_record(&saved));
    Ok(())
}

/// Delete a record.
pub async fn delete(ctx: &CommandContext, id: &str) -> Result<()> {
    let engine = open_engine(ctx).await?;
    let id = RecordId::from(id);

    let removed = engine.delete(&id).await;
    engine.shutdown();

    if !removed {
        anyhow::bail!("No record with id {}", id);
    }
    println!("Deleted {}", id);
    Ok(())
}

/// Print the local view.
pub async fn list(ctx: &CommandContext) -> Result<()> {
    let engine = open_engine(ctx).await?;
    let records = engine.records();
    engine.shutdown();

    if records.is_empty() {
        println!("No records");
        return Ok(());
    }
    for record in &records {
        println!("{}", format_record(record));
    }
    Ok(())
}
