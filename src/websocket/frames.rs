//! Inbound frame parsing for the messaging socket.
//!
//! Frames are JSON objects selected by an `action` field. A frame with no
//! `action` is treated as a send, which keeps older clients working.

use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct SendFrame {
    pub to_type: String,
    pub to_id: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub from_name: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
}

impl SendFrame {
    /// A send needs a recipient and either text or a media reference.
    fn is_complete(&self) -> bool {
        let has_body = self.text.as_deref().is_some_and(|t| !t.trim().is_empty())
            || self.media_url.as_deref().is_some_and(|u| !u.is_empty());
        !self.to_type.is_empty() && !self.to_id.is_empty() && has_body
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EditFrame {
    pub message_id: String,
    pub new_text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteFrame {
    pub message_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReactFrame {
    pub message_id: String,
    pub reaction: String,
}

#[derive(Debug, Clone)]
pub enum InboundFrame {
    Send(SendFrame),
    Edit(EditFrame),
    Delete(DeleteFrame),
    React(ReactFrame),
    RemoveReact(ReactFrame),
    /// Client reply to a server ping. Accepted on any socket, never answered.
    Pong,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    InvalidJson,
    UnknownAction,
    MissingFields { action: &'static str },
}

impl FrameError {
    /// Error payload written back to the client. Field lists match what
    /// existing clients already display.
    pub fn to_payload(&self) -> Value {
        match self {
            FrameError::InvalidJson => json!({ "error": "Invalid JSON" }),
            FrameError::UnknownAction => json!({ "error": "Unknown action" }),
            FrameError::MissingFields { action } => match *action {
                "send" => json!({
                    "error": "Missing required fields",
                    "required": ["to_type", "to_id", "text or media_url"],
                }),
                "edit" => json!({ "error": "Missing fields for edit" }),
                "delete" => json!({ "error": "Missing message_id" }),
                other => json!({ "error": format!("Missing fields for {other}") }),
            },
        }
    }
}

impl InboundFrame {
    pub fn parse(raw: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(raw).map_err(|_| FrameError::InvalidJson)?;
        if !value.is_object() {
            return Err(FrameError::InvalidJson);
        }

        let action = match value.get("action") {
            None => {
                // Heartbeat replies come tagged with "type", not "action".
                if value.get("type").and_then(Value::as_str) == Some("pong") {
                    return Ok(InboundFrame::Pong);
                }
                "send"
            }
            Some(Value::String(s)) => s.as_str(),
            Some(_) => return Err(FrameError::UnknownAction),
        };

        match action {
            "send" => {
                let frame: SendFrame = serde_json::from_value(value)
                    .map_err(|_| FrameError::MissingFields { action: "send" })?;
                if !frame.is_complete() {
                    return Err(FrameError::MissingFields { action: "send" });
                }
                Ok(InboundFrame::Send(frame))
            }
            "edit" => {
                let frame: EditFrame = serde_json::from_value(value)
                    .map_err(|_| FrameError::MissingFields { action: "edit" })?;
                if frame.message_id.is_empty() || frame.new_text.is_empty() {
                    return Err(FrameError::MissingFields { action: "edit" });
                }
                Ok(InboundFrame::Edit(frame))
            }
            "delete" => {
                let frame: DeleteFrame = serde_json::from_value(value)
                    .map_err(|_| FrameError::MissingFields { action: "delete" })?;
                if frame.message_id.is_empty() {
                    return Err(FrameError::MissingFields { action: "delete" });
                }
                Ok(InboundFrame::Delete(frame))
            }
            "react" => parse_react(value, "react").map(InboundFrame::React),
            "remove_react" => parse_react(value, "remove_react").map(InboundFrame::RemoveReact),
            "pong" => Ok(InboundFrame::Pong),
            _ => Err(FrameError::UnknownAction),
        }
    }
}

fn parse_react(value: Value, action: &'static str) -> Result<ReactFrame, FrameError> {
    let frame: ReactFrame =
        serde_json::from_value(value).map_err(|_| FrameError::MissingFields { action })?;
    if frame.message_id.is_empty() || frame.reaction.is_empty() {
        return Err(FrameError::MissingFields { action });
    }
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_object_defaults_to_send() {
        let frame = InboundFrame::parse(
            r#"{"to_type":"customers","to_id":"7","text":"hello"}"#,
        )
        .unwrap();
        match frame {
            InboundFrame::Send(f) => {
                assert_eq!(f.to_type, "customers");
                assert_eq!(f.to_id, "7");
                assert_eq!(f.text.as_deref(), Some("hello"));
            }
            other => panic!("expected send, got {other:?}"),
        }
    }

    #[test]
    fn media_only_send_is_accepted() {
        let frame = InboundFrame::parse(
            r#"{"to_type":"customers","to_id":"7","media_type":"image","media_url":"https://cdn/x.png"}"#,
        )
        .unwrap();
        assert!(matches!(frame, InboundFrame::Send(_)));
    }

    #[test]
    fn send_without_body_reports_required_fields() {
        let err = InboundFrame::parse(r#"{"to_type":"customers","to_id":"7"}"#).unwrap_err();
        assert_eq!(err, FrameError::MissingFields { action: "send" });
        let payload = err.to_payload();
        assert_eq!(payload["error"], "Missing required fields");
        assert_eq!(payload["required"][2], "text or media_url");
    }

    #[test]
    fn whitespace_text_does_not_count_as_a_body() {
        let err = InboundFrame::parse(
            r#"{"to_type":"customers","to_id":"7","text":"   "}"#,
        )
        .unwrap_err();
        assert_eq!(err, FrameError::MissingFields { action: "send" });
    }

    #[test]
    fn edit_and_delete_frames_parse() {
        let edit = InboundFrame::parse(r#"{"action":"edit","message_id":"m1","new_text":"fixed"}"#)
            .unwrap();
        assert!(matches!(edit, InboundFrame::Edit(_)));

        let del = InboundFrame::parse(r#"{"action":"delete","message_id":"m1"}"#).unwrap();
        assert!(matches!(del, InboundFrame::Delete(_)));
    }

    #[test]
    fn delete_without_id_uses_the_short_error() {
        let err = InboundFrame::parse(r#"{"action":"delete"}"#).unwrap_err();
        assert_eq!(err.to_payload()["error"], "Missing message_id");
    }

    #[test]
    fn empty_strings_count_as_missing() {
        let err = InboundFrame::parse(r#"{"action":"edit","message_id":"m1","new_text":""}"#)
            .unwrap_err();
        assert_eq!(err, FrameError::MissingFields { action: "edit" });

        let err = InboundFrame::parse(r#"{"action":"delete","message_id":""}"#).unwrap_err();
        assert_eq!(err, FrameError::MissingFields { action: "delete" });

        let err = InboundFrame::parse(r#"{"action":"react","message_id":"m1","reaction":""}"#)
            .unwrap_err();
        assert_eq!(err, FrameError::MissingFields { action: "react" });
    }

    #[test]
    fn react_frames_parse_both_directions() {
        let react =
            InboundFrame::parse(r#"{"action":"react","message_id":"m1","reaction":"👍"}"#).unwrap();
        assert!(matches!(react, InboundFrame::React(_)));

        let unreact =
            InboundFrame::parse(r#"{"action":"remove_react","message_id":"m1","reaction":"👍"}"#)
                .unwrap();
        assert!(matches!(unreact, InboundFrame::RemoveReact(_)));

        let err = InboundFrame::parse(r#"{"action":"react","message_id":"m1"}"#).unwrap_err();
        assert_eq!(err.to_payload()["error"], "Missing fields for react");
    }

    #[test]
    fn unknown_action_is_rejected() {
        let err = InboundFrame::parse(r#"{"action":"subscribe"}"#).unwrap_err();
        assert_eq!(err, FrameError::UnknownAction);
        assert_eq!(err.to_payload()["error"], "Unknown action");
    }

    #[test]
    fn pong_is_recognized_by_type_or_action() {
        assert!(matches!(
            InboundFrame::parse(r#"{"type":"pong","timestamp":"x"}"#).unwrap(),
            InboundFrame::Pong
        ));
        assert!(matches!(
            InboundFrame::parse(r#"{"action":"pong"}"#).unwrap(),
            InboundFrame::Pong
        ));
    }

    #[test]
    fn malformed_json_is_invalid() {
        assert_eq!(
            InboundFrame::parse("not json").unwrap_err(),
            FrameError::InvalidJson
        );
        assert_eq!(
            InboundFrame::parse("[1,2,3]").unwrap_err(),
            FrameError::InvalidJson
        );
    }
}
