//! Canonical event vocabulary consumed by the call state machine.
//!
//! Every producer (user commands, the signaling reconciler, engine
//! callbacks, completions of spawned async work) funnels into one ordered
//! queue of these inputs. The machine task is the only consumer.

use crate::backend::{CallTicket, EngineCredentials};
use crate::call::moderation::ModerationAction;
use crate::call::{CallKind, ParticipantId};
use crate::error::{BackendError, MediaConnectionError};
use crate::media::{DeviceKind, EngineEvent};

#[derive(Debug)]
pub enum SessionInput {
    // -- direct user commands --
    UserInitiatesCall {
        conversation_id: String,
        peer_id: ParticipantId,
        peer_display_name: String,
        kind: CallKind,
    },
    UserAccepts,
    UserDeclines,
    UserHangsUp,
    UserSetsCamera {
        enabled: bool,
    },
    UserSetsMicrophone {
        enabled: bool,
    },
    UserSetsScreenShare {
        enabled: bool,
    },
    UserSelectsDevice {
        kind: DeviceKind,
        device_id: String,
    },

    // -- normalized signaling events (post-reconciler) --
    InboundInvite {
        session_id: String,
        conversation_id: String,
        caller_id: ParticipantId,
        caller_display_name: String,
        kind: CallKind,
    },
    PeerAccepted {
        session_id: String,
    },
    PeerDeclined {
        session_id: String,
    },
    PeerCancelled {
        session_id: String,
    },
    PeerEndedForAll {
        session_id: String,
    },
    SessionExpired {
        session_id: String,
    },
    ParticipantJoined {
        session_id: String,
        participant_id: ParticipantId,
        display_name: String,
    },
    ParticipantLeft {
        session_id: String,
        participant_id: ParticipantId,
    },

    // -- media engine callbacks --
    Engine(EngineEvent),

    // -- completions of spawned async work --
    /// The backend answered (or failed) our outgoing start-call request.
    OutboundCallPlaced {
        result: Result<CallTicket, BackendError>,
    },
    /// The backend answered (or failed) our join request for an accepted
    /// incoming call.
    JoinCredentials {
        session_id: String,
        result: Result<EngineCredentials, BackendError>,
    },
    /// A reconnect-manager connect attempt succeeded.
    MediaConnected {
        session_id: String,
    },
    /// A reconnect-manager connect attempt failed.
    MediaConnectFailed {
        session_id: String,
        error: MediaConnectionError,
    },
    /// The ring timer elapsed. `invite_seq` guards against stale fires
    /// after the invite was already resolved.
    RingTimeout {
        invite_seq: u64,
    },
    /// Applying device intent to the engine was denied for one device.
    PermissionDenied {
        device: DeviceKind,
    },

    // -- moderation (enqueued only after backend confirmation) --
    ModerationConfirmed {
        session_id: String,
        action: ModerationAction,
        participant_id: ParticipantId,
    },
    /// The admin's own end-for-all request was confirmed by the backend.
    HostEndedCall {
        session_id: String,
    },
}
