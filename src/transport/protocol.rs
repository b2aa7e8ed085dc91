use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::activity::{entities::ActivitySegment, interval_log::LogError};

/// The two shapes the producer sends. Arrays are snapshots, single objects are deltas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransportMessage {
    Snapshot(Vec<ActivitySegment>),
    Delta(ActivitySegment),
}

/// Anything that makes the current session untrustworthy. The session is dropped and a fresh
/// snapshot is awaited after reconnecting.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unexpected {0} frame")]
    UnexpectedFrame(&'static str),
    #[error("session {0} sent a delta before its snapshot")]
    DeltaBeforeSnapshot(u64),
    #[error(transparent)]
    OutOfOrder(#[from] LogError),
}

/// Ordered notifications from the transport task. Every event carries the id of the session it
/// belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected {
        session: u64,
    },
    Message {
        session: u64,
        message: TransportMessage,
    },
    Disconnected {
        session: u64,
    },
}

pub fn parse_message(text: &str) -> Result<TransportMessage, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

/// First message sent on every connection.
pub fn hello() -> String {
    json!({
        "type": "hello",
        "client": concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::{hello, parse_message, ProtocolError, TransportMessage};

    #[test]
    fn arrays_are_snapshots() {
        let message = parse_message(
            r#"[{"starttime":"2024-04-05T12:00:00Z","endtime":"2024-04-05T12:01:00Z","app":"Chrome","url":"https://a.com","title":"A"},
                {"starttime":"2024-04-05T12:01:00Z","endtime":null,"app":"Slack","url":null,"title":"general"}]"#,
        )
        .unwrap();

        let TransportMessage::Snapshot(segments) = message else {
            panic!("expected snapshot, got {message:?}");
        };
        assert_eq!(segments.len(), 2);
        assert!(segments[1].is_open());
        assert_eq!(parse_message("[]").unwrap(), TransportMessage::Snapshot(vec![]));
    }

    #[test]
    fn objects_are_deltas() {
        let message = parse_message(
            r#"{"app":"","title":"","url":null,"starttime":"2024-04-05T12:05:00.123+00:00"}"#,
        )
        .unwrap();

        let TransportMessage::Delta(segment) = message else {
            panic!("expected delta, got {message:?}");
        };
        assert!(segment.is_idle());
    }

    #[test]
    fn malformed_messages() {
        for text in [
            "{not json",
            r#"{"app":"Chrome"}"#,
            r#"{"app":"Chrome","title":"","starttime":"yesterday"}"#,
            r#"[{"app":"Chrome","title":""}]"#,
            "42",
        ] {
            assert!(
                matches!(parse_message(text), Err(ProtocolError::Malformed(_))),
                "{text}"
            );
        }
    }

    #[test]
    fn hello_names_client() {
        let value: serde_json::Value = serde_json::from_str(&hello()).unwrap();
        assert_eq!(value["type"], "hello");
        assert!(value["client"].as_str().unwrap().starts_with("timeviewer/"));
    }
}
