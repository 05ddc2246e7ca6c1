//! Media engine boundary — the transport layer is a black box.
//!
//! The orchestrator only ever talks to the engine through [`MediaEngine`]
//! and observes it through [`EngineEvent`]s. No other component holds a
//! reference to an engine-specific track object.

pub mod devices;
pub mod loopback;
pub mod reconnect;
pub mod tracks;

use std::fmt;

use async_trait::async_trait;

use crate::error::{MediaConnectionError, PermissionError};

/// A single published audio or video stream belonging to one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
    ScreenShare,
}

/// Local capture/playback device categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Camera,
    Microphone,
    Speaker,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceKind::Camera => "camera",
            DeviceKind::Microphone => "microphone",
            DeviceKind::Speaker => "speaker",
        };
        f.write_str(s)
    }
}

/// A device as reported by the engine's enumeration.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub id: String,
    pub label: String,
}

/// Events the engine pushes while a session is connected.
///
/// These are forwarded into the orchestrator's single event queue; the
/// engine never mutates call state directly.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// The media session is established.
    Connected,
    /// The media session dropped. `transient` distinguishes a reconnect-
    /// eligible drop from a server-initiated final shutdown.
    Disconnected { transient: bool },
    /// A remote participant's engine connection appeared.
    ParticipantConnected {
        participant_id: String,
        display_name: String,
    },
    /// A remote participant's engine connection went away.
    ParticipantDisconnected { participant_id: String },
    TrackPublished {
        participant_id: String,
        kind: TrackKind,
    },
    TrackUnpublished {
        participant_id: String,
        kind: TrackKind,
    },
    TrackMuted {
        participant_id: String,
        kind: TrackKind,
    },
    TrackUnmuted {
        participant_id: String,
        kind: TrackKind,
    },
    /// Audio-level callback: the participant started or stopped speaking.
    SpeakingChanged {
        participant_id: String,
        speaking: bool,
    },
}

/// The media engine contract.
///
/// Implementations are expected to push [`EngineEvent`]s through the sender
/// they were constructed with. All methods must be safe to call in any
/// connection state; `disconnect` on an unconnected engine is a no-op.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Establish the media session against the engine server.
    async fn connect(&self, server_url: &str, token: &str) -> Result<(), MediaConnectionError>;

    /// Tear down the media session. Idempotent.
    async fn disconnect(&self);

    async fn set_camera_enabled(&self, enabled: bool) -> Result<(), PermissionError>;

    async fn set_microphone_enabled(&self, enabled: bool) -> Result<(), PermissionError>;

    async fn set_screen_share_enabled(&self, enabled: bool) -> Result<(), PermissionError>;

    /// Enumerate devices of the given kind.
    fn list_devices(&self, kind: DeviceKind) -> Vec<DeviceInfo>;

    /// Switch to a different device. The engine tears down and republishes
    /// the affected track; live tracks are never mutated in place.
    async fn select_device(&self, kind: DeviceKind, device_id: &str) -> Result<(), PermissionError>;
}
