//! Wire-level types shared by the environment, the HTTP server and clients.
//!
//! These types define the stable contract between a command-issuing caller and
//! the document-backed environment. They carry no engine state and must
//! serialize identically across runs.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Untyped parameter mapping as it arrives on the wire.
pub type Parameters = Map<String, Value>;

/// A single command issued against the live document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub command: String,
    /// Never absent: omitted or `null` parameters become an empty mapping.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub parameters: Parameters,
}

impl Action {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            parameters: Parameters::new(),
        }
    }

    /// Add one parameter (builder style).
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Parameters, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Parameters>::deserialize(deserializer)?.unwrap_or_default())
}

/// A scalar cell value: numbers stay numbers, everything else is text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Coerce an arbitrary JSON value for writing.
    ///
    /// Numbers are written numerically; every other value is written as its string
    /// form. `null` writes an empty string.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Number(n) => n
                .as_f64()
                .map(CellValue::Number)
                .unwrap_or_else(|| CellValue::Text(n.to_string())),
            Value::String(s) => CellValue::Text(s.clone()),
            Value::Null => CellValue::Text(String::new()),
            other => CellValue::Text(other.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            CellValue::Number(_) => None,
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

/// Command-dependent payload of an observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObservationData {
    Scalar(CellValue),
    Grid(Vec<Vec<CellValue>>),
    Map(BTreeMap<String, Value>),
}

/// Structured result of processing one action.
///
/// `reward` and `done` travel at the top level of a [`StepResponse`], so they are
/// skipped when the observation itself is serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub result: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ObservationData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_sheet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet_names: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub metadata: Map<String, Value>,
    #[serde(skip)]
    pub reward: Option<f64>,
    #[serde(skip)]
    pub done: bool,
}

impl Observation {
    pub fn success(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            success: true,
            data: None,
            current_sheet: None,
            sheet_names: None,
            error_message: None,
            file_path: None,
            metadata: Map::new(),
            reward: None,
            done: false,
        }
    }

    /// A failed observation; `error_message` is always present on failure.
    pub fn failure(result: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(error_message.into()),
            ..Self::success(result)
        }
    }

    pub fn with_data(mut self, data: ObservationData) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_current_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.current_sheet = Some(sheet.into());
        self
    }

    pub fn with_sheet_names(mut self, names: Vec<String>) -> Self {
        self.sheet_names = Some(names);
        self
    }

    pub fn with_file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Payload of the form `{"exported_file": <path>}`.
    pub fn with_exported_file(self, path: &str) -> Self {
        let mut map = BTreeMap::new();
        map.insert("exported_file".to_string(), Value::String(path.to_string()));
        self.with_data(ObservationData::Map(map))
    }
}

/// Response shape for `reset`, `step` and `close` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResponse {
    pub observation: Observation,
    #[serde(default)]
    pub reward: Option<f64>,
    #[serde(default)]
    pub done: bool,
}

impl From<Observation> for StepResponse {
    fn from(observation: Observation) -> Self {
        Self {
            reward: observation.reward,
            done: observation.done,
            observation,
        }
    }
}

impl StepResponse {
    /// Fold the top-level `reward`/`done` back onto the observation.
    pub fn into_observation(self) -> Observation {
        let mut observation = self.observation;
        observation.reward = self.reward;
        observation.done = self.done;
        observation
    }
}

/// Answer to a state query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeState {
    pub episode_id: String,
    pub step_count: u64,
    /// Number of resets performed by this environment instance.
    #[serde(default)]
    pub resets: u64,
}
