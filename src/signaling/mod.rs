//! Signaling wire types — parse inbound call notifications.
//!
//! Notifications are pushed over the WebSocket channel with at-least-once
//! delivery; everything here is tolerant of duplicates, unknown fields and
//! wrapper envelopes. Dedup and ordering live in [`reconciler`].

pub mod channel;
pub mod reconciler;

use serde::Deserialize;

use crate::error::SignalingError;

/// A raw push notification as delivered by the signaling gateway.
///
/// All fields are optional at the wire level; the reconciler decides which
/// are required for a given event type.
#[derive(Debug, Clone, Deserialize)]
pub struct PushNotification {
    #[serde(rename = "eventType")]
    pub event_type: Option<String>,
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
    #[serde(rename = "conversationId")]
    pub conversation_id: Option<String>,
    #[serde(rename = "callerId")]
    pub caller_id: Option<String>,
    #[serde(rename = "callerDisplayName")]
    pub caller_display_name: Option<String>,
    #[serde(rename = "participantId")]
    pub participant_id: Option<String>,
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
    #[serde(rename = "callKind")]
    pub call_kind: Option<String>,
}

/// Try to parse a push notification from gateway JSON.
///
/// The notification may be the frame body itself or nested under a `body`
/// field (either as an object or a stringified JSON payload), depending on
/// which gateway hop delivered it.
pub fn parse_notification(json_str: &str) -> Result<PushNotification, SignalingError> {
    let v: serde_json::Value =
        serde_json::from_str(json_str).map_err(|e| SignalingError::Malformed(e.to_string()))?;

    if v.get("eventType").is_some() {
        return serde_json::from_value(v).map_err(|e| SignalingError::Malformed(e.to_string()));
    }

    if let Some(body) = v.get("body") {
        if let Some(body_str) = body.as_str() {
            return parse_notification(body_str);
        }
        if body.get("eventType").is_some() {
            return serde_json::from_value(body.clone())
                .map_err(|e| SignalingError::Malformed(e.to_string()));
        }
    }

    Err(SignalingError::MissingField("eventType"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_top_level_notification() {
        let n = parse_notification(r#"{"eventType":"peerAccepted","sessionId":"s-1"}"#).unwrap();
        assert_eq!(n.event_type.as_deref(), Some("peerAccepted"));
        assert_eq!(n.session_id.as_deref(), Some("s-1"));
    }

    #[test]
    fn parses_nested_body_object() {
        let n = parse_notification(
            r#"{"id":7,"body":{"eventType":"peerDeclined","sessionId":"s-2"}}"#,
        )
        .unwrap();
        assert_eq!(n.event_type.as_deref(), Some("peerDeclined"));
    }

    #[test]
    fn parses_stringified_body() {
        let n = parse_notification(
            r#"{"body":"{\"eventType\":\"sessionExpired\",\"sessionId\":\"s-3\"}"}"#,
        )
        .unwrap();
        assert_eq!(n.event_type.as_deref(), Some("sessionExpired"));
        assert_eq!(n.session_id.as_deref(), Some("s-3"));
    }

    #[test]
    fn rejects_garbage_and_missing_event_type() {
        assert!(parse_notification("not json").is_err());
        assert!(parse_notification(r#"{"hello":"world"}"#).is_err());
    }
}
