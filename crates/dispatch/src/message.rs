use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DispatchError;

/// Envelope version written by this build.
pub const PROTOCOL_VERSION: u16 = 1;

/// Envelope carried in the second frame of every dispatch request and reply.
///
/// The payload is MessagePack-encoded separately so the server can route on
/// `topic` before it knows the payload type. A reply reuses the request's
/// `correlation_id`, which is how the client matches it to the waiting caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub topic: String,

    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,

    pub timestamp: DateTime<Utc>,

    pub correlation_id: Uuid,

    #[serde(default = "default_version")]
    pub version: u16,
}

fn default_version() -> u16 {
    PROTOCOL_VERSION
}

impl Message {
    /// New request with a fresh correlation id.
    pub fn new<T: Serialize>(topic: impl Into<String>, payload: &T) -> Result<Self, DispatchError> {
        Self::with_correlation(topic, payload, Uuid::new_v4())
    }

    pub fn with_correlation<T: Serialize>(
        topic: impl Into<String>,
        payload: &T,
        correlation_id: Uuid,
    ) -> Result<Self, DispatchError> {
        Ok(Self {
            topic: topic.into(),
            payload: rmp_serde::to_vec(payload)?,
            timestamp: Utc::now(),
            correlation_id,
            version: PROTOCOL_VERSION,
        })
    }

    /// Reply to this message on `topic`, keeping the correlation id.
    pub fn reply<T: Serialize>(
        &self,
        topic: impl Into<String>,
        payload: &T,
    ) -> Result<Self, DispatchError> {
        Self::with_correlation(topic, payload, self.correlation_id)
    }

    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, DispatchError> {
        Ok(rmp_serde::from_slice(&self.payload)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, DispatchError> {
        Ok(rmp_serde::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DispatchError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

/// `Vec<u8>` as a MessagePack bin instead of an array of integers.
mod serde_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let bytes: &[u8] = Deserialize::deserialize(d)?;
        Ok(bytes.to_vec())
    }
}
