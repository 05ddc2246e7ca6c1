//! Local device selection — the user's desired capture state.
//!
//! This is client-local configuration, not part of the call session. It
//! survives reconnect attempts within the same call and is re-applied to
//! the engine after every (re)connect, because a freshly established
//! session may publish tracks before user intent is applied.

use serde::{Deserialize, Serialize};

/// Desired device state, as opposed to the engine's last-known publish
/// state which lives in `ParticipantTrackState`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSelection {
    pub selected_camera_id: Option<String>,
    pub selected_microphone_id: Option<String>,
    pub selected_speaker_id: Option<String>,
    pub camera_enabled: bool,
    pub microphone_enabled: bool,
}

impl DeviceSelection {
    /// Default for a fresh call: microphone on, camera off.
    pub fn fresh_call() -> Self {
        Self {
            microphone_enabled: true,
            ..Self::default()
        }
    }
}
