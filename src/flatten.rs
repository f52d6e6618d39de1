use anyhow::Context as _;
use serde::Deserialize as _;
use serde_json::Value;

use crate::formats::{FlatRow, JobRecord, scalar_text};
use crate::sanitize::clean_text;

#[derive(Debug, Default)]
pub struct Flattened {
    pub rows: Vec<FlatRow>,
    pub skipped: usize,
}

/// Flattens every record in order. Records that fail are logged and skipped.
pub fn flatten_all(records: &[Value]) -> Flattened {
    let mut out = Flattened {
        rows: Vec::with_capacity(records.len()),
        skipped: 0,
    };

    for (idx, value) in records.iter().enumerate() {
        match flatten_record(value) {
            Ok(row) => out.rows.push(row),
            Err(err) => {
                tracing::warn!(
                    job = %record_label(value),
                    index = idx,
                    "skipping job that could not be flattened: {err:#}"
                );
                out.skipped += 1;
            }
        }
    }

    out
}

/// Text an explicit `null` renders as in `title` and `description_raw`.
pub const NULL_TEXT: &str = "None";

pub fn flatten_record(value: &Value) -> anyhow::Result<FlatRow> {
    // Derived struct decoding also accepts arrays; records must be objects.
    let Some(object) = value.as_object() else {
        anyhow::bail!("job record is not a JSON object");
    };
    if let Some(info) = object.get("job_information")
        && !info.is_object()
    {
        anyhow::bail!("job_information is not a JSON object");
    }

    let record = JobRecord::deserialize(value).context("decode job record")?;
    let info = record.job_information;

    let description = info.description.as_ref();
    Ok(FlatRow {
        id: scalar_text(&record.id),
        board_token: scalar_text(&record.board_token),
        source: nullable_text(record.source.as_ref()),
        apply_url: scalar_text(&record.apply_url),
        source_and_board_token: nullable_text(record.source_and_board_token.as_ref()),
        title: clean_text(&display_text(info.title.as_ref())),
        description_clean: clean_text(&nullable_text(description).unwrap_or_default()),
        description_raw: clean_text(&display_text(description)),
        viewed_count: info.viewed_by_users.len() as u64,
        applied_count: info.applied_from_users.len() as u64,
        saved_count: info.saved_from_users.len() as u64,
        hidden_count: info.hidden_from_users.len() as u64,
    })
}

/// Missing renders as empty text; an explicit `null` stays `None`.
fn nullable_text(field: Option<&Value>) -> Option<String> {
    match field {
        None => Some(String::new()),
        Some(Value::Null) => None,
        Some(value) => Some(scalar_text(value)),
    }
}

fn display_text(field: Option<&Value>) -> String {
    nullable_text(field).unwrap_or_else(|| NULL_TEXT.to_owned())
}

/// Identifier used when reporting a record, `unknown` when it has none.
pub fn record_label(value: &Value) -> String {
    match value.get("id") {
        Some(Value::Null) | None => "unknown".to_owned(),
        Some(id) => scalar_text(id),
    }
}
