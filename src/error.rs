//! Error taxonomy for the call orchestrator.
//!
//! Errors that do not change the authoritative call state (signaling noise,
//! permission issues) are absorbed where they occur. Errors that do change
//! state are folded into a terminal session state with an `EndReason`; the
//! UI learns of failure through the session snapshot, not a separate
//! exception surface.

use thiserror::Error;

use crate::media::DeviceKind;

/// A malformed or unexpected signaling notification. Logged and discarded,
/// never surfaced to the user.
#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("malformed signaling payload: {0}")]
    Malformed(String),
    #[error("notification missing required field '{0}'")]
    MissingField(&'static str),
    #[error("unknown event type '{0}'")]
    UnknownEventType(String),
}

/// A media-engine connect or reconnect attempt failed. Retried with bounded
/// backoff; surfaced to the user only after retries are exhausted.
#[derive(Debug, Clone, Error)]
pub enum MediaConnectionError {
    #[error("engine rejected credentials")]
    BadToken,
    #[error("engine server unreachable: {0}")]
    Unreachable(String),
    #[error("engine rejected connection: {0}")]
    Rejected(String),
    #[error("connect attempt timed out")]
    Timeout,
}

/// Local device access denied or device unavailable. Surfaced immediately;
/// the call continues without the affected device.
#[derive(Debug, Clone, Error)]
pub enum PermissionError {
    #[error("access to {0} denied")]
    Denied(DeviceKind),
    #[error("{0} is unavailable or busy")]
    Unavailable(DeviceKind),
}

impl PermissionError {
    pub fn device(&self) -> DeviceKind {
        match self {
            PermissionError::Denied(d) | PermissionError::Unavailable(d) => *d,
        }
    }
}

/// A request to the call session backend failed.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("HTTP {status} from {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },
    #[error("unexpected response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// A non-admin attempted a moderation command, or the target is not a valid
/// moderation target. Rejected before any backend call is made.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("no active call")]
    NoActiveCall,
    #[error("caller is not an admin of this call")]
    NotAdmin,
    #[error("participant {0} is an admin and cannot be moderated")]
    TargetIsAdmin(String),
    #[error("participant {0} is not in this call")]
    UnknownTarget(String),
}

/// An admin command was rejected or failed. Surfaced to the admin only;
/// session state is left unchanged.
#[derive(Debug, Error)]
pub enum ModerationError {
    #[error(transparent)]
    Unauthorized(#[from] AuthorizationError),
    #[error("moderation request failed: {0}")]
    Backend(#[from] BackendError),
}
