use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// One upstream job-listing entry as returned by the search API.
///
/// Only the fields the exporter reads are modelled; everything else in the
/// upstream object is ignored. `Option<Value>` fields are `None` when the key
/// is missing and `Some(Value::Null)` when it is an explicit `null`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JobRecord {
    pub id: Value,
    pub board_token: Value,
    #[serde(deserialize_with = "present")]
    pub source: Option<Value>,
    pub apply_url: Value,
    #[serde(deserialize_with = "present")]
    pub source_and_board_token: Option<Value>,
    pub job_information: JobInformation,
}

/// Engagement lists must be arrays when present; `null` is rejected.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JobInformation {
    #[serde(deserialize_with = "present")]
    pub title: Option<Value>,
    #[serde(deserialize_with = "present")]
    pub description: Option<Value>,
    #[serde(rename = "viewedByUsers")]
    pub viewed_by_users: Vec<IgnoredAny>,
    #[serde(rename = "appliedFromUsers")]
    pub applied_from_users: Vec<IgnoredAny>,
    #[serde(rename = "savedFromUsers")]
    pub saved_from_users: Vec<IgnoredAny>,
    #[serde(rename = "hiddenFromUsers")]
    pub hidden_from_users: Vec<IgnoredAny>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Tabular projection of a [`JobRecord`]. Field order is column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatRow {
    pub id: String,
    pub board_token: String,
    /// `None` when upstream sent an explicit `null`; excluded from counts.
    pub source: Option<String>,
    pub apply_url: String,
    pub source_and_board_token: Option<String>,
    pub title: String,
    pub description_clean: String,
    pub description_raw: String,
    pub viewed_count: u64,
    pub applied_count: u64,
    pub saved_count: u64,
    pub hidden_count: u64,
}

impl FlatRow {
    pub const COLUMNS: [&'static str; 12] = [
        "id",
        "board_token",
        "source",
        "apply_url",
        "source_and_board_token",
        "title",
        "description_clean",
        "description_raw",
        "viewed_count",
        "applied_count",
        "saved_count",
        "hidden_count",
    ];
}

/// Renders a scalar JSON value the way it should appear in a text cell.
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
