//! Versioned save state cursor.
//!
//! A save state is a JSON document of the form
//!
//! ```json
//! { "version": 3, "items": [ ... ] }
//! ```
//!
//! where `items` is a flat sequence written and read back in the same
//! order. Components describe their state once, in a single `do_state`
//! function that calls [`StateWrapper::do_value`] on each field: when the
//! wrapper is writing the field is appended, when it is reading the field is
//! overwritten in place. Named markers ([`StateWrapper::do_marker`]) delimit
//! sections so a misaligned stream is detected instead of silently
//! misinterpreted.
//!
//! The first error is latched. Every later call becomes a no-op, and the
//! caller picks the error up with [`StateWrapper::status`] or
//! [`StateWrapper::finish`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Save state stream errors
#[derive(Debug, Error)]
pub enum StateError {
    #[error("state stream ended unexpectedly at item {position}")]
    UnexpectedEnd { position: usize },
    #[error("failed to decode state item {position}: {source}")]
    Decode {
        position: usize,
        source: serde_json::Error,
    },
    #[error("failed to encode state item {position}: {source}")]
    Encode {
        position: usize,
        source: serde_json::Error,
    },
    #[error("expected marker '{expected}', found {found}")]
    MarkerMismatch { expected: String, found: String },
    #[error("malformed state document")]
    MalformedDocument,
    #[error("unsupported state version {version} (supported {min}..={max})")]
    UnsupportedVersion { version: u32, min: u32, max: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Read,
    Write,
}

/// Sequential reader/writer over a versioned state document
#[derive(Debug)]
pub struct StateWrapper {
    mode: Mode,
    version: u32,
    items: Vec<Value>,
    /// Next item to read (read mode only)
    position: usize,
    error: Option<StateError>,
}

#[derive(Serialize, Deserialize)]
struct Marker {
    marker: String,
}

impl StateWrapper {
    /// Start writing a new document with the given format version
    pub fn writer(version: u32) -> Self {
        Self {
            mode: Mode::Write,
            version,
            items: Vec::new(),
            position: 0,
            error: None,
        }
    }

    /// Start reading an existing document
    pub fn reader(document: &Value) -> Result<Self, StateError> {
        let version = document
            .get("version")
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .ok_or(StateError::MalformedDocument)?;
        let items = document
            .get("items")
            .and_then(Value::as_array)
            .ok_or(StateError::MalformedDocument)?
            .clone();

        Ok(Self {
            mode: Mode::Read,
            version,
            items,
            position: 0,
            error: None,
        })
    }

    pub fn is_reading(&self) -> bool {
        self.mode == Mode::Read
    }

    pub fn is_writing(&self) -> bool {
        self.mode == Mode::Write
    }

    /// Format version of the document being read or written
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error(&self) -> Option<&StateError> {
        self.error.as_ref()
    }

    /// Number of items not consumed yet (read mode)
    pub fn remaining(&self) -> usize {
        self.items.len().saturating_sub(self.position)
    }

    /// Reject documents outside `min..=max`, latching the error.
    pub fn require_version(&mut self, min: u32, max: u32) -> bool {
        if self.error.is_some() {
            return false;
        }
        if self.version < min || self.version > max {
            self.error = Some(StateError::UnsupportedVersion {
                version: self.version,
                min,
                max,
            });
            return false;
        }
        true
    }

    /// Write `value`, or overwrite it with the next item when reading.
    pub fn do_value<T>(&mut self, value: &mut T)
    where
        T: Serialize + DeserializeOwned,
    {
        if self.error.is_some() {
            return;
        }

        match self.mode {
            Mode::Write => match serde_json::to_value(&*value) {
                Ok(item) => self.items.push(item),
                Err(source) => {
                    self.error = Some(StateError::Encode {
                        position: self.items.len(),
                        source,
                    })
                }
            },
            Mode::Read => {
                let Some(item) = self.items.get(self.position) else {
                    self.error = Some(StateError::UnexpectedEnd {
                        position: self.position,
                    });
                    return;
                };
                match T::deserialize(item) {
                    Ok(decoded) => {
                        *value = decoded;
                        self.position += 1;
                    }
                    Err(source) => {
                        self.error = Some(StateError::Decode {
                            position: self.position,
                            source,
                        })
                    }
                }
            }
        }
    }

    /// Write a named section marker, or verify it when reading.
    ///
    /// Returns false (and latches an error) if the stream is not positioned
    /// at the expected marker.
    pub fn do_marker(&mut self, name: &str) -> bool {
        if self.error.is_some() {
            return false;
        }

        match self.mode {
            Mode::Write => {
                self.items.push(json!({ "marker": name }));
                true
            }
            Mode::Read => {
                let found = match self.items.get(self.position) {
                    None => {
                        self.error = Some(StateError::UnexpectedEnd {
                            position: self.position,
                        });
                        return false;
                    }
                    Some(item) => Marker::deserialize(item).ok().map(|m| m.marker),
                };

                if found.as_deref() == Some(name) {
                    self.position += 1;
                    true
                } else {
                    self.error = Some(StateError::MarkerMismatch {
                        expected: name.to_string(),
                        found: found.unwrap_or_else(|| "<data>".to_string()),
                    });
                    false
                }
            }
        }
    }

    /// Take the latched error, if any
    pub fn status(&mut self) -> Result<(), StateError> {
        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Finish writing and produce the document
    pub fn finish(mut self) -> Result<Value, StateError> {
        self.status()?;
        Ok(json!({
            "version": self.version,
            "items": self.items,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    enum Phase {
        Idle,
        Busy,
    }

    fn write_sample() -> Value {
        let mut sw = StateWrapper::writer(2);
        let mut a: u16 = 0x1234;
        let mut phase = Phase::Busy;
        let mut flags = [true, false];
        sw.do_value(&mut a);
        assert!(sw.do_marker("Section"));
        sw.do_value(&mut phase);
        sw.do_value(&mut flags);
        sw.finish().expect("write")
    }

    #[test]
    fn test_write_then_read_in_order() {
        let doc = write_sample();
        assert_eq!(doc["version"], 2);
        assert_eq!(doc["items"].as_array().map(Vec::len), Some(4));

        let mut sw = StateWrapper::reader(&doc).expect("reader");
        assert!(sw.is_reading());
        let mut a: u16 = 0;
        let mut phase = Phase::Idle;
        let mut flags = [false, false];
        sw.do_value(&mut a);
        assert!(sw.do_marker("Section"));
        sw.do_value(&mut phase);
        sw.do_value(&mut flags);
        assert!(sw.status().is_ok());
        assert_eq!(a, 0x1234);
        assert_eq!(phase, Phase::Busy);
        assert_eq!(flags, [true, false]);
        assert_eq!(sw.remaining(), 0);
    }

    #[test]
    fn test_marker_mismatch_latches_error() {
        let doc = write_sample();
        let mut sw = StateWrapper::reader(&doc).expect("reader");
        let mut a: u16 = 0;
        sw.do_value(&mut a);
        assert!(!sw.do_marker("Other"));
        assert!(sw.has_error());

        // Later reads are no-ops once an error is latched
        let mut phase = Phase::Idle;
        sw.do_value(&mut phase);
        assert_eq!(phase, Phase::Idle);
        assert!(matches!(sw.status(), Err(StateError::MarkerMismatch { .. })));
    }

    #[test]
    fn test_truncated_stream_reports_unexpected_end() {
        let mut doc = write_sample();
        doc["items"].as_array_mut().expect("items").truncate(2);

        let mut sw = StateWrapper::reader(&doc).expect("reader");
        let mut a: u16 = 0;
        let mut phase = Phase::Idle;
        sw.do_value(&mut a);
        sw.do_marker("Section");
        sw.do_value(&mut phase);
        assert!(matches!(
            sw.status(),
            Err(StateError::UnexpectedEnd { position: 2 })
        ));
    }

    #[test]
    fn test_type_mismatch_reports_decode_error() {
        let doc = write_sample();
        let mut sw = StateWrapper::reader(&doc).expect("reader");
        let mut wrong = Phase::Idle;
        sw.do_value(&mut wrong);
        assert!(matches!(
            sw.status(),
            Err(StateError::Decode { position: 0, .. })
        ));
    }

    #[test]
    fn test_malformed_document() {
        assert!(matches!(
            StateWrapper::reader(&json!({ "items": [] })),
            Err(StateError::MalformedDocument)
        ));
        assert!(matches!(
            StateWrapper::reader(&json!({ "version": 1 })),
            Err(StateError::MalformedDocument)
        ));
    }

    #[test]
    fn test_require_version() {
        let doc = json!({ "version": 7, "items": [] });
        let mut sw = StateWrapper::reader(&doc).expect("reader");
        assert!(!sw.require_version(1, 3));
        assert!(matches!(
            sw.status(),
            Err(StateError::UnsupportedVersion { version: 7, min: 1, max: 3 })
        ));
    }
}
