//! Opaque user data carried in heartbeats
//!
//! The cluster never looks inside this payload. It is kept as the raw JSON
//! text it arrived as and written back out verbatim.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;

use crate::error::{Error, Result};

/// Raw JSON payload owned by the host application
#[derive(Clone, PartialEq, Eq)]
pub struct UserData(String);

impl UserData {
    /// The empty object, used when a node has never set any data
    pub fn empty() -> Self {
        Self("{}".to_string())
    }

    /// Accept raw JSON text, rejecting invalid JSON or payloads over `limit` bytes
    pub fn from_json(text: &str, limit: usize) -> Result<Self> {
        let raw = RawValue::from_string(text.trim().to_string())?;
        let data = Self(raw.get().to_string());
        data.check_size(limit)?;
        Ok(data)
    }

    /// Serialize a structured value into user data
    pub fn from_value(value: &serde_json::Value, limit: usize) -> Result<Self> {
        let data = Self(serde_json::to_string(value)?);
        data.check_size(limit)?;
        Ok(data)
    }

    /// Fail with `PayloadTooLarge` when the payload exceeds `limit` bytes
    pub fn check_size(&self, limit: usize) -> Result<()> {
        if self.0.len() > limit {
            return Err(Error::PayloadTooLarge {
                size: self.0.len(),
                limit,
            });
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0 == "{}"
    }
}

impl Default for UserData {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for UserData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UserData({})", self.0)
    }
}

impl Serialize for UserData {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let raw = RawValue::from_string(self.0.clone()).map_err(serde::ser::Error::custom)?;
        raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for UserData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw: Box<RawValue> = Deserialize::deserialize(deserializer)?;
        Ok(Self(raw.get().to_string()))
    }
}
