//! Call session data model and lifecycle orchestration.
//!
//! The state machine in [`machine`] is the single authoritative owner of
//! the active [`CallSession`]; everything else either enqueues events or
//! reads published snapshots.

pub mod call_test;
pub mod events;
pub mod handle;
pub mod machine;
pub mod moderation;

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::media::devices::DeviceSelection;

pub type ParticipantId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Direct,
    Group,
}

/// Call lifecycle states.
///
/// `Idle`, `Ended` and `Failed` are idle-equivalent: a new call may start
/// from any of them. `Ending` is a transient teardown state the machine
/// passes through on its way to `Ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    OutgoingRinging,
    IncomingRinging,
    Connecting,
    Connected,
    Ending,
    Ended,
    Failed,
}

impl CallState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Ended | CallState::Failed)
    }

    /// Whether a new outgoing or incoming call may start from this state.
    pub fn is_idle_equivalent(&self) -> bool {
        matches!(self, CallState::Idle) || self.is_terminal()
    }

}

/// Why a call reached a terminal state. Set only in `Ended`/`Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    EndedByUser,
    EndedByHost,
    ConnectionLost,
    Declined,
    Missed,
    Failed,
}

impl EndReason {
    /// Human-readable description, the single channel through which the UI
    /// learns of failure.
    pub fn describe(&self) -> &'static str {
        match self {
            EndReason::EndedByUser => "call ended",
            EndReason::EndedByHost => "call ended by host",
            EndReason::ConnectionLost => "connection lost",
            EndReason::Declined => "call declined",
            EndReason::Missed => "call missed",
            EndReason::Failed => "could not connect",
        }
    }
}

/// Per-participant publish/subscribe state as last reported by the engine.
///
/// `mic_enabled`/`cam_enabled` reflect observed publish state, not desired
/// state; desired state lives in [`DeviceSelection`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantTrackState {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub mic_enabled: bool,
    pub cam_enabled: bool,
    pub is_speaking: bool,
    pub is_admin: bool,
}

/// Outstanding invite while a call is ringing. Owned exclusively by the
/// state machine and destroyed on any transition out of the ringing states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInvite {
    pub peer_id: ParticipantId,
    pub peer_display_name: String,
    pub expires_at: DateTime<Utc>,
}

/// The single active call as seen by one client.
#[derive(Debug, Clone)]
pub struct CallSession {
    pub session_id: String,
    pub conversation_id: String,
    pub kind: CallKind,
    pub initiator_id: ParticipantId,
    pub state: CallState,
    pub participants: HashMap<ParticipantId, ParticipantTrackState>,
    pub end_reason: Option<EndReason>,
}

/// Read-only view published to the UI layer after every processing tick.
#[derive(Debug, Clone, Default)]
pub struct CallSnapshot {
    /// The current session, retained in its terminal state until a new
    /// call starts. `None` means the client has never been in a call.
    pub session: Option<CallSession>,
    pub pending_invite: Option<PendingInvite>,
    /// Current desired device state (re-applied after each reconnect).
    pub devices: DeviceSelection,
    /// Most recent user-visible notice (rejected call attempt, permission
    /// failure). Informational only; never blocks the lifecycle.
    pub notice: Option<String>,
}

impl CallSnapshot {
    pub fn state(&self) -> CallState {
        self.session
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(CallState::Idle)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.session_id.as_str())
    }
}
