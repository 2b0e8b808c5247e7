//! Stream message parsing, generalized from the teacher's single-namespace
//! `InitData`/`Update` to carry both flags and segments (spec.md §3/§6) —
//! the teacher's `InitData` had a commented-out `segments` field; this
//! turns it on and extends the patch/delete path dispatch to match.

use crate::models::{FeatureFlag, Segment};
use eventsource_client::Event;
use serde::Deserialize;
use std::{
    collections::HashMap,
    convert::{TryFrom, TryInto},
    path::PathBuf,
};
use tracing::{trace, warn};

#[derive(Debug, thiserror::Error)]
pub enum MessageParseError {
    #[error("Failed to parse put data: {0}")]
    ParsePut(serde_json::Error),

    #[error("Missing the data field")]
    MissingData,

    #[error("Missing payload on eventsource item")]
    MissingEventPayload,

    #[error(transparent)]
    ParsePatch(#[from] FromPatchDataError),

    #[error("Unable to parse event payload: {0}")]
    ParsePayload(serde_json::Error),
}

/// Parsed message from the stream.
#[allow(clippy::large_enum_variant)]
#[derive(Debug)]
pub enum Message {
    Put(InitData),
    Patch(Update),
    Delete(Update),
    Unknown,
}

impl TryFrom<Event> for Message {
    type Error = MessageParseError;

    fn try_from(event: Event) -> Result<Self, Self::Error> {
        let name = &event.event_type;
        trace!(%name, "reading SSE event");

        let event_data = event
            .field("data")
            .ok_or(MessageParseError::MissingEventPayload)?;
        let payload: MessagePayload =
            serde_json::from_slice(event_data).map_err(MessageParseError::ParsePayload)?;

        match name.as_str() {
            "put" => {
                let data = payload.data.ok_or(MessageParseError::MissingData)?;
                let init_data: InitData =
                    serde_json::from_value(data).map_err(MessageParseError::ParsePut)?;
                trace!(
                    num_flags = init_data.flags.len(),
                    num_segments = init_data.segments.len(),
                    "parsed init data"
                );
                Ok(Self::Put(init_data))
            }
            "patch" | "delete" => {
                let update: Update = payload.try_into()?;
                trace!(?update, "parsed update");
                Ok(match name.as_str() {
                    "patch" => Self::Patch(update),
                    "delete" => Self::Delete(update),
                    _ => unreachable!(),
                })
            }
            _ => {
                warn!(%name, "unknown event type");
                Ok(Message::Unknown)
            }
        }
    }
}

/// Data used to initially populate a [Store](crate::store::Store).
#[derive(Debug, Default, Deserialize)]
pub struct InitData {
    #[serde(default)]
    pub flags: HashMap<String, FeatureFlag>,
    #[serde(default)]
    pub segments: HashMap<String, Segment>,
}

/// Update payload, as parsed straight from JSON.
#[derive(Debug, Deserialize)]
struct MessagePayload {
    path: PathBuf,
    data: Option<serde_json::Value>,
    version: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum FromPatchDataError {
    #[error("Update path is unknown")]
    UnknownPath,

    #[error("Missing record name")]
    MissingRecordName,

    #[error("Failed to read record payload")]
    InvalidPayload(#[from] serde_json::Error),
}

/// Describes the change of a single record (add, update, or delete),
/// parsed from a stream-relative path such as `/flags/<key>` or
/// `/segments/<key>`.
#[derive(Debug)]
pub enum Update {
    Flag {
        key: String,
        data: Option<FeatureFlag>,
        version: Option<u64>,
    },
    Segment {
        key: String,
        data: Option<Segment>,
        version: Option<u64>,
    },
    /// Any record type we don't recognize (unknown namespace).
    Unknown,
}

impl TryFrom<MessagePayload> for Update {
    type Error = FromPatchDataError;

    fn try_from(pl: MessagePayload) -> Result<Self, Self::Error> {
        let mut segments = pl
            .path
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .skip_while(|s| *s == "/");

        let first = segments.next().ok_or(FromPatchDataError::UnknownPath)?;
        match first {
            "flags" => {
                let key = segments
                    .next()
                    .ok_or(FromPatchDataError::MissingRecordName)?
                    .to_string();
                let data = pl.data.map(serde_json::from_value).transpose()?;
                Ok(Self::Flag {
                    key,
                    data,
                    version: pl.version,
                })
            }
            "segments" => {
                let key = segments
                    .next()
                    .ok_or(FromPatchDataError::MissingRecordName)?
                    .to_string();
                let data = pl.data.map(serde_json::from_value).transpose()?;
                Ok(Self::Segment {
                    key,
                    data,
                    version: pl.version,
                })
            }
            _ => Ok(Self::Unknown),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_for_flag_path_parses() {
        let payload = MessagePayload {
            path: PathBuf::from("/flags/my-flag"),
            data: Some(serde_json::json!({
                "key": "my-flag", "version": 2, "on": true, "salt": "s", "sel": "",
                "offVariation": 0, "variations": [false, true],
                "fallthrough": {"variation": 1}
            })),
            version: Some(2),
        };
        let update: Update = payload.try_into().unwrap();
        match update {
            Update::Flag { key, version, data } => {
                assert_eq!(key, "my-flag");
                assert_eq!(version, Some(2));
                assert!(data.is_some());
            }
            _ => panic!("expected a flag update"),
        }
    }

    #[test]
    fn patch_for_segment_path_parses() {
        let payload = MessagePayload {
            path: PathBuf::from("/segments/my-segment"),
            data: None,
            version: Some(5),
        };
        let update: Update = payload.try_into().unwrap();
        assert!(matches!(update, Update::Segment { key, version: Some(5), data: None } if key == "my-segment"));
    }

    #[test]
    fn unknown_path_namespace_is_unknown_update() {
        let payload = MessagePayload {
            path: PathBuf::from("/something-else/foo"),
            data: None,
            version: None,
        };
        let update: Update = payload.try_into().unwrap();
        assert!(matches!(update, Update::Unknown));
    }

    #[test]
    fn missing_record_name_errors() {
        let payload = MessagePayload {
            path: PathBuf::from("/flags"),
            data: None,
            version: None,
        };
        let result: Result<Update, _> = payload.try_into();
        assert!(matches!(result, Err(FromPatchDataError::MissingRecordName)));
    }

    #[test]
    fn init_data_defaults_to_empty() {
        let init: InitData = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(init.flags.is_empty());
        assert!(init.segments.is_empty());
    }
}
