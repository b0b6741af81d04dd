//! Statement-related data models.
//!
//! This module defines the parameter values callers bind when issuing
//! statements on a participant, and the statement plan format the CLI reads.

use serde::{Deserialize, Serialize};

/// A parameter value for parameterized statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Binary data, written in JSON as `{"base64": "..."}` so it is not
    /// mistaken for a plain string
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
        }
    }
}

/// Binary data as a one-key `{"base64": ...}` object.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Encoded {
        base64: String,
    }

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        Encoded {
            base64: STANDARD.encode(bytes),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = Encoded::deserialize(deserializer)?;
        STANDARD
            .decode(&encoded.base64)
            .map_err(serde::de::Error::custom)
    }
}

/// One statement to run on a named participant before the scope decides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedStatement {
    /// Profile ID of the participant that runs the statement
    pub participant: String,
    pub sql: String,
    #[serde(default)]
    pub params: Vec<QueryParam>,
}

impl PlannedStatement {
    /// Create a statement without parameters.
    pub fn new(participant: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            participant: participant.into(),
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Add a parameter to this statement.
    pub fn with_param(mut self, param: QueryParam) -> Self {
        self.params.push(param);
        self
    }
}
