//! Upload of raw basecaller tables for one stored file.
//!
//! Event and 2D alignment tables are sharded by the last digit of the
//! channel and written from the run's worker pool. Model tables are written
//! once per run from the scheduler thread.

use crate::alignment::pool::{fan_out, Task, TaskFailure};
use crate::extract::{Strand, TelemetryPayload};
use crate::session::RunSession;
use crate::storage::schema::{
    caller_table_name, twod_alignment_table_name, EVENT_COLUMNS, MODEL_DATA, MODEL_LIST,
};
use crate::storage::traits::StoreConnection;
use crate::storage::value::{Row, Value};
use crate::telemetry::models::{model_data_rows, model_list_row, SelectedModels};
use crate::Result;

const TWOD_ALIGNMENT_COLUMNS: [&str; 3] = ["template", "complement", "kmer"];

/// Rows with `basename_id` first and exactly `columns` after it, so a
/// batch insert sees one column set
pub fn shaped_rows(basename_id: i64, rows: &[Row], columns: &[&str]) -> Vec<Row> {
    rows.iter()
        .map(|r| {
            let mut shaped = Row::with_capacity(columns.len() + 1);
            shaped.insert("basename_id".into(), basename_id.into());
            for &column in columns {
                shaped.insert(column.into(), r.get(column).cloned().unwrap_or(Value::Null));
            }
            shaped
        })
        .collect()
}

/// One batched insert per table, as pool tasks
pub fn upload_tasks(payload: &TelemetryPayload, basename_id: i64) -> Vec<Task<'static>> {
    let shard = payload.channel_shard;
    let mut tasks = Vec::new();

    for (strand, events) in &payload.events {
        if events.is_empty() || *strand == Strand::TwoD {
            continue;
        }
        let table = caller_table_name(strand.table(), shard);
        let rows = shaped_rows(basename_id, events, &EVENT_COLUMNS);
        tasks.push(batch_task(table, rows));
    }

    if let Some(alignment) = payload.twod_alignment.as_ref().filter(|a| !a.is_empty()) {
        let table = twod_alignment_table_name(shard);
        let rows = shaped_rows(basename_id, alignment, &TWOD_ALIGNMENT_COLUMNS);
        tasks.push(batch_task(table, rows));
    }

    tasks
}

fn batch_task(table: String, rows: Vec<Row>) -> Task<'static> {
    Task::new(table.clone(), move |conn: &mut dyn StoreConnection| {
        let written = conn.insert_batch(&table, &rows)?;
        tracing::trace!("{} rows into {}", written, table);
        Ok(())
    })
}

/// Insert the `model_list` row and any model table this run has not seen
pub fn store_models(
    session: &mut RunSession,
    basename_id: i64,
    payload: &TelemetryPayload,
) -> Result<usize> {
    let selected = SelectedModels {
        template: payload.template_model.clone(),
        complement: payload.complement_model.clone(),
    };
    if let Some(row) = model_list_row(basename_id, &selected) {
        session.conn.insert(MODEL_LIST, &row)?;
    }

    let mut uploaded = 0;
    for (model, rows) in &payload.models {
        if session.models.contains(model) {
            continue;
        }
        session.conn.insert_batch(MODEL_DATA, &model_data_rows(model, rows))?;
        session.models.insert(model.clone());
        tracing::debug!("Uploaded model {} to {}", model, session.name);
        uploaded += 1;
    }
    Ok(uploaded)
}

/// Upload everything in a file's telemetry payload and wait for the pool
pub fn upload_telemetry(
    session: &mut RunSession,
    basename_id: i64,
    payload: &TelemetryPayload,
) -> Result<Vec<TaskFailure>> {
    store_models(session, basename_id, payload)?;
    let tasks = upload_tasks(payload, basename_id);
    Ok(fan_out(&mut session.pool, tasks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::{run_tables, TableOptions};
    use crate::storage::sqlite::SqliteConnection;
    use crate::storage::value::row;
    use pretty_assertions::assert_eq;

    fn payload() -> TelemetryPayload {
        TelemetryPayload {
            channel_shard: 7,
            events: vec![
                (
                    Strand::Template,
                    vec![
                        row([("mean", 51.2.into()), ("start", 10.0.into()), ("move", 1.into())]),
                        row([("mean", 49.8.into()), ("start", 10.1.into()), ("move", 0.into())]),
                    ],
                ),
                (Strand::Complement, Vec::new()),
            ],
            twod_alignment: Some(vec![row([
                ("template", 0.into()),
                ("complement", 3.into()),
                ("kmer", "ACGTA".into()),
            ])]),
            template_model: Some("r7.3_template.model".to_string()),
            complement_model: None,
            models: vec![(
                "r7.3_template.model".to_string(),
                vec![row([("kmer", "AAAAA".into()), ("level_mean", 52.1.into())])],
            )],
        }
    }

    #[test]
    fn test_rows_share_one_column_set() {
        let rows = shaped_rows(9, &payload().events[0].1, &EVENT_COLUMNS);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), EVENT_COLUMNS.len() + 1);
        assert!(rows[0].keys().eq(rows[1].keys()));
        assert_eq!(rows[1]["basename_id"], Value::Integer(9));
        assert_eq!(rows[1]["p_A"], Value::Null);
    }

    #[test]
    fn test_tasks_target_the_channel_shard() {
        let tasks = upload_tasks(&payload(), 1);
        let labels: Vec<&str> = tasks.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["caller_basecalled_template_7", "caller_basecalled_2d_alignment_7"]
        );
    }

    #[test]
    fn test_tasks_write_batches() {
        let mut conn = SqliteConnection::open_in_memory().unwrap();
        for table in run_tables(TableOptions {
            telemetry: true,
            ..TableOptions::default()
        }) {
            conn.create_table(&table).unwrap();
        }
        let mut pool: Vec<Box<dyn StoreConnection>> = vec![Box::new(conn)];

        let failures = fan_out(&mut pool, upload_tasks(&payload(), 3));
        assert!(failures.is_empty());

        let conn = pool[0].as_mut();
        let events = conn.select("caller_basecalled_template_7", &Row::new()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["move"], Value::Integer(1));
        let aligned = conn
            .select("caller_basecalled_2d_alignment_7", &row([("basename_id", 3.into())]))
            .unwrap();
        assert_eq!(aligned[0]["kmer"], Value::from("ACGTA"));
    }
}
