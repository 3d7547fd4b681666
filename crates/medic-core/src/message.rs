//! The structured message carried inside every envelope.
//!
//! A message is a flat JSON map. Addressing and threading live in `@`/`~`
//! decorators; everything else is the protocol body.

use crate::{Did, Error, Result, VerKey};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Thread decorator tying a reply to the message it answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub thid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "@type")]
    pub type_: String,
    #[serde(rename = "@id", default)]
    pub id: String,
    #[serde(rename = "@sendTo", default, skip_serializing_if = "Option::is_none")]
    pub send_to: Option<String>,
    #[serde(rename = "@from", default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(rename = "~thread", default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<Thread>,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl Message {
    /// Build a message with a fresh id. `body` must serialize to a JSON object.
    pub fn new<T: Serialize>(type_: &str, body: &T) -> Result<Self> {
        let body = match serde_json::to_value(body).map_err(|e| Error::Encoding(e.to_string()))? {
            Value::Object(map) => map,
            other => {
                return Err(Error::Encoding(format!(
                    "message body must be an object, got {other}"
                )))
            }
        };
        Ok(Self {
            type_: type_.to_string(),
            id: uuid::Uuid::now_v7().to_string(),
            send_to: None,
            from: None,
            thread: None,
            body,
        })
    }

    pub fn with_send_to(mut self, to: impl Into<String>) -> Self {
        self.send_to = Some(to.into());
        self
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn with_thread(mut self, thid: impl Into<String>) -> Self {
        self.thread = Some(Thread { thid: thid.into() });
        self
    }

    /// Decode the body into a typed payload.
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.body.clone()))
            .map_err(|e| Error::Decoding(format!("{}: {}", self.type_, e)))
    }

    pub fn thid(&self) -> Option<&str> {
        self.thread.as_ref().map(|t| t.thid.as_str())
    }
}

/// Sender and recipient resolution attached by the envelope codec.
///
/// Keys are always present for an opened envelope; identifiers are absent
/// when the key does not belong to a known party.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageContext {
    pub from_key: Option<VerKey>,
    pub to_key: Option<VerKey>,
    pub from_did: Option<Did>,
    pub to_did: Option<Did>,
}
