//! Persisted JSON envelope for job payloads.
//!
//! Every job variant serializes to this uniform shape; the `payload` column
//! holds nothing else. Variant-specific parameters live under `metadata`,
//! whose required keys and types are enumerated per codec.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Typed failure of the codec layer. The lease loop must tell a poisoned
/// payload apart from a store failure, so these do not fold into `anyhow`.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unknown payload type: {0}")]
    UnknownPayloadType(String),

    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("envelope field {field}: {reason}")]
    Envelope { field: &'static str, reason: String },

    #[error("metadata key {key}: {reason}")]
    Metadata { key: &'static str, reason: String },

    #[error("codec for {expected} fed a different variant")]
    VariantMismatch { expected: &'static str },
}

impl CodecError {
    pub fn metadata(key: &'static str, reason: impl Into<String>) -> Self {
        CodecError::Metadata {
            key,
            reason: reason.into(),
        }
    }

    pub fn envelope(field: &'static str, reason: impl Into<String>) -> Self {
        CodecError::Envelope {
            field,
            reason: reason.into(),
        }
    }
}

/// The uniform envelope persisted in the `payload` column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub id: String,
    pub priority: i16,
    pub url: String,
    #[serde(default)]
    pub url_params: HashMap<String, String>,
    pub max_retries: i32,
    pub job_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl JobEnvelope {
    /// Parse an envelope out of the stored JSONB value.
    ///
    /// Some historical rows were written double-encoded: the column holds a
    /// JSON string whose content is itself the envelope JSON. Unwrap that
    /// first, then unmarshal.
    pub fn from_payload(payload: &Value) -> Result<Self, CodecError> {
        if let Value::String(inner) = payload {
            return Ok(serde_json::from_str(inner)?);
        }
        Ok(serde_json::from_value(payload.clone())?)
    }

    pub fn to_value(&self) -> Result<Value, CodecError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Best-effort tenant extraction, for notification payloads where a
    /// decode failure must not block anything.
    pub fn tenant_hints(&self) -> (String, String) {
        let get = |key: &str| {
            self.metadata
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        (get("owner_id"), get("organization_id"))
    }

    // ------------------------------------------------------------------
    // Metadata accessors. Missing or mistyped required keys are decode
    // failures.
    // ------------------------------------------------------------------

    pub fn meta_str(&self, key: &'static str) -> Result<String, CodecError> {
        self.metadata
            .get(key)
            .ok_or_else(|| CodecError::metadata(key, "missing"))?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| CodecError::metadata(key, "not a string"))
    }

    pub fn meta_bool(&self, key: &'static str) -> Result<bool, CodecError> {
        self.metadata
            .get(key)
            .ok_or_else(|| CodecError::metadata(key, "missing"))?
            .as_bool()
            .ok_or_else(|| CodecError::metadata(key, "not a boolean"))
    }

    /// Booleans added to the contract after rows were already written
    /// default to false instead of failing the decode.
    pub fn meta_bool_or_default(&self, key: &'static str) -> bool {
        self.metadata
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or_default()
    }

    /// Numeric metadata arrives as a JSON number and is coerced to `i32`
    /// with an explicit range check. Fractional values are rejected.
    pub fn meta_int(&self, key: &'static str) -> Result<i32, CodecError> {
        let value = self
            .metadata
            .get(key)
            .ok_or_else(|| CodecError::metadata(key, "missing"))?;

        let as_i64 = if let Some(i) = value.as_i64() {
            i
        } else if let Some(f) = value.as_f64() {
            if f.fract() != 0.0 {
                return Err(CodecError::metadata(key, "not an integer"));
            }
            f as i64
        } else {
            return Err(CodecError::metadata(key, "not a number"));
        };

        i32::try_from(as_i64).map_err(|_| CodecError::metadata(key, "out of range for i32"))
    }

    /// Nested records round-trip via re-marshal/unmarshal, so a record that
    /// was stored as a generic JSON object comes back typed.
    pub fn meta_object<T: DeserializeOwned>(&self, key: &'static str) -> Result<T, CodecError> {
        let value = self
            .metadata
            .get(key)
            .ok_or_else(|| CodecError::metadata(key, "missing"))?;
        if !value.is_object() {
            return Err(CodecError::metadata(key, "not an object"));
        }
        serde_json::from_value(value.clone())
            .map_err(|e| CodecError::metadata(key, e.to_string()))
    }

    /// Like [`meta_object`](Self::meta_object) but tolerates an absent key.
    pub fn meta_object_opt<T: DeserializeOwned>(
        &self,
        key: &'static str,
    ) -> Result<Option<T>, CodecError> {
        match self.metadata.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) if value.is_object() => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| CodecError::metadata(key, e.to_string())),
            Some(_) => Err(CodecError::metadata(key, "not an object")),
        }
    }
}
