//! Signaling event reconciler — dedupe and session filtering.
//!
//! Converts raw, possibly duplicated, possibly out-of-order push
//! notifications into the state machine's canonical event vocabulary.
//! Anything that cannot be normalized, matched to the tracked session, or
//! that was already delivered within the dedup window is logged and
//! dropped; the reconciliation loop itself never fails.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;

use crate::call::events::SessionInput;
use crate::call::{CallKind, CallSnapshot};
use crate::error::SignalingError;
use crate::signaling::{parse_notification, PushNotification};

/// Covers at-least-once redelivery from the push gateway.
const DEDUP_WINDOW: Duration = Duration::from_secs(30);

pub struct Reconciler {
    queue: UnboundedSender<SessionInput>,
    snapshot: watch::Receiver<CallSnapshot>,
    seen: HashMap<(String, &'static str), Instant>,
    window: Duration,
}

impl Reconciler {
    pub fn new(queue: UnboundedSender<SessionInput>, snapshot: watch::Receiver<CallSnapshot>) -> Self {
        Self {
            queue,
            snapshot,
            seen: HashMap::new(),
            window: DEDUP_WINDOW,
        }
    }

    /// Ingest a raw frame from the push channel. Malformed payloads are
    /// swallowed after logging.
    pub fn ingest_raw(&mut self, payload: &str) {
        match parse_notification(payload) {
            Ok(n) => self.ingest(n),
            Err(e) => tracing::warn!("Dropping unparseable notification: {}", e),
        }
    }

    /// Ingest an already-parsed notification.
    pub fn ingest(&mut self, notification: PushNotification) {
        let input = match self.normalize(notification) {
            Ok(input) => input,
            Err(e) => {
                tracing::warn!("Dropping malformed notification: {}", e);
                return;
            }
        };
        if self.admit(&input) {
            let _ = self.queue.send(input);
        }
    }

    /// Map a wire notification onto the canonical vocabulary.
    fn normalize(&self, n: PushNotification) -> Result<SessionInput, SignalingError> {
        let event_type = n
            .event_type
            .ok_or(SignalingError::MissingField("eventType"))?;
        let session_id = n
            .session_id
            .ok_or(SignalingError::MissingField("sessionId"))?;

        let input = match event_type.as_str() {
            "inboundInvite" => SessionInput::InboundInvite {
                session_id,
                conversation_id: n
                    .conversation_id
                    .ok_or(SignalingError::MissingField("conversationId"))?,
                caller_id: n.caller_id.ok_or(SignalingError::MissingField("callerId"))?,
                caller_display_name: n.caller_display_name.unwrap_or_default(),
                kind: match n.call_kind.as_deref() {
                    Some("group") => CallKind::Group,
                    _ => CallKind::Direct,
                },
            },
            "peerAccepted" => SessionInput::PeerAccepted { session_id },
            "peerDeclined" => SessionInput::PeerDeclined { session_id },
            "peerCancelled" => SessionInput::PeerCancelled { session_id },
            "peerEndedForAll" => SessionInput::PeerEndedForAll { session_id },
            "sessionExpired" => SessionInput::SessionExpired { session_id },
            "participantJoined" => SessionInput::ParticipantJoined {
                session_id,
                participant_id: n
                    .participant_id
                    .ok_or(SignalingError::MissingField("participantId"))?,
                display_name: n.display_name.unwrap_or_default(),
            },
            "participantLeft" => SessionInput::ParticipantLeft {
                session_id,
                participant_id: n
                    .participant_id
                    .ok_or(SignalingError::MissingField("participantId"))?,
            },
            other => return Err(SignalingError::UnknownEventType(other.to_string())),
        };
        Ok(input)
    }

    /// Session filtering plus duplicate suppression.
    ///
    /// Roster upserts are exempt from the dedup window: they fold
    /// idempotently downstream and distinct participants share an event
    /// type.
    fn admit(&mut self, input: &SessionInput) -> bool {
        match input {
            SessionInput::InboundInvite { session_id, .. } => {
                let state = self.snapshot.borrow().state();
                if !state.is_idle_equivalent() {
                    tracing::debug!(
                        "Dropping invite for {} while in state {:?}",
                        session_id,
                        state
                    );
                    return false;
                }
                self.first_delivery(session_id, "inboundInvite")
            }
            SessionInput::PeerAccepted { session_id } => {
                self.tracked(session_id) && self.first_delivery(session_id, "peerAccepted")
            }
            SessionInput::PeerDeclined { session_id } => {
                self.tracked(session_id) && self.first_delivery(session_id, "peerDeclined")
            }
            SessionInput::PeerCancelled { session_id } => {
                self.tracked(session_id) && self.first_delivery(session_id, "peerCancelled")
            }
            SessionInput::PeerEndedForAll { session_id } => {
                self.tracked(session_id) && self.first_delivery(session_id, "peerEndedForAll")
            }
            SessionInput::SessionExpired { session_id } => {
                self.tracked(session_id) && self.first_delivery(session_id, "sessionExpired")
            }
            SessionInput::ParticipantJoined { session_id, .. }
            | SessionInput::ParticipantLeft { session_id, .. } => self.tracked(session_id),
            // Non-signaling inputs never pass through the reconciler.
            _ => true,
        }
    }

    /// Whether the notification belongs to the currently tracked session.
    fn tracked(&self, session_id: &str) -> bool {
        let snap = self.snapshot.borrow();
        let matches = snap.session_id() == Some(session_id) && !snap.state().is_terminal();
        if !matches {
            tracing::debug!("Dropping stale notification for session {}", session_id);
        }
        matches
    }

    fn first_delivery(&mut self, session_id: &str, kind: &'static str) -> bool {
        let now = Instant::now();
        let window = self.window;
        self.seen.retain(|_, t| now.duration_since(*t) < window);

        let key = (session_id.to_string(), kind);
        if self.seen.contains_key(&key) {
            tracing::debug!("Dropping duplicate {} for session {}", kind, session_id);
            return false;
        }
        self.seen.insert(key, now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;
    use tokio::sync::mpsc;

    use crate::call::{CallSession, CallState};

    fn snapshot(session_id: Option<&str>, state: CallState) -> CallSnapshot {
        CallSnapshot {
            session: session_id.map(|sid| CallSession {
                session_id: sid.to_string(),
                conversation_id: "conv".into(),
                kind: CallKind::Direct,
                initiator_id: "me".into(),
                state,
                participants: StdHashMap::new(),
                end_reason: None,
            }),
            ..Default::default()
        }
    }

    fn reconciler(
        snap: CallSnapshot,
    ) -> (
        Reconciler,
        mpsc::UnboundedReceiver<SessionInput>,
        watch::Sender<CallSnapshot>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (snap_tx, snap_rx) = watch::channel(snap);
        (Reconciler::new(tx, snap_rx), rx, snap_tx)
    }

    #[test]
    fn duplicate_peer_accepted_is_delivered_once() {
        let (mut rec, mut rx, _snap) =
            reconciler(snapshot(Some("s-1"), CallState::OutgoingRinging));

        let frame = r#"{"eventType":"peerAccepted","sessionId":"s-1"}"#;
        rec.ingest_raw(frame);
        rec.ingest_raw(frame);

        assert!(matches!(
            rx.try_recv().unwrap(),
            SessionInput::PeerAccepted { .. }
        ));
        assert!(rx.try_recv().is_err(), "duplicate leaked through");
    }

    #[test]
    fn events_for_other_sessions_are_dropped() {
        let (mut rec, mut rx, _snap) =
            reconciler(snapshot(Some("s-1"), CallState::Connected));

        rec.ingest_raw(r#"{"eventType":"peerEndedForAll","sessionId":"ancient-call"}"#);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn events_for_terminal_sessions_are_dropped() {
        let (mut rec, mut rx, _snap) = reconciler(snapshot(Some("s-1"), CallState::Ended));

        rec.ingest_raw(r#"{"eventType":"peerAccepted","sessionId":"s-1"}"#);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn invite_is_dropped_while_busy() {
        let (mut rec, mut rx, _snap) =
            reconciler(snapshot(Some("s-1"), CallState::Connected));

        rec.ingest_raw(
            r#"{"eventType":"inboundInvite","sessionId":"s-2","conversationId":"c","callerId":"bob"}"#,
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn invite_passes_when_idle_or_terminal() {
        for snap in [snapshot(None, CallState::Idle), snapshot(Some("old"), CallState::Ended)] {
            let (mut rec, mut rx, _s) = reconciler(snap);
            rec.ingest_raw(
                r#"{"eventType":"inboundInvite","sessionId":"s-9","conversationId":"c","callerId":"bob","callerDisplayName":"Bob"}"#,
            );
            match rx.try_recv().unwrap() {
                SessionInput::InboundInvite {
                    session_id,
                    caller_id,
                    ..
                } => {
                    assert_eq!(session_id, "s-9");
                    assert_eq!(caller_id, "bob");
                }
                other => panic!("unexpected input: {:?}", other),
            }
        }
    }

    #[test]
    fn malformed_payloads_are_swallowed() {
        let (mut rec, mut rx, _snap) = reconciler(snapshot(None, CallState::Idle));

        rec.ingest_raw("garbage");
        rec.ingest_raw(r#"{"eventType":"peerAccepted"}"#); // no sessionId
        rec.ingest_raw(r#"{"eventType":"somethingNew","sessionId":"s"}"#);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn roster_events_are_not_deduplicated() {
        let (mut rec, mut rx, _snap) =
            reconciler(snapshot(Some("s-1"), CallState::Connected));

        rec.ingest_raw(
            r#"{"eventType":"participantJoined","sessionId":"s-1","participantId":"p1","displayName":"P1"}"#,
        );
        rec.ingest_raw(
            r#"{"eventType":"participantJoined","sessionId":"s-1","participantId":"p2","displayName":"P2"}"#,
        );
        // Redelivery of the same join is forwarded too; the fold downstream
        // is idempotent.
        rec.ingest_raw(
            r#"{"eventType":"participantJoined","sessionId":"s-1","participantId":"p1","displayName":"P1"}"#,
        );

        let mut joins = 0;
        while let Ok(input) = rx.try_recv() {
            assert!(matches!(input, SessionInput::ParticipantJoined { .. }));
            joins += 1;
        }
        assert_eq!(joins, 3);
    }
}
