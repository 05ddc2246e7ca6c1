//! Loopback media engine — a self-contained engine for test calls.
//!
//! Mirrors the local participant's publish state back as a remote "echo"
//! participant, so the whole invite → connect → tracks → hang-up pipeline
//! can be exercised without a media server. Used by the `call-test`
//! subcommand and as a stand-in until a transport engine is wired up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::error::{MediaConnectionError, PermissionError};
use crate::media::{DeviceInfo, DeviceKind, EngineEvent, MediaEngine, TrackKind};

pub const ECHO_PARTICIPANT_ID: &str = "echo";

pub struct LoopbackEngine {
    events: UnboundedSender<EngineEvent>,
    local_participant_id: String,
    connected: AtomicBool,
}

impl LoopbackEngine {
    pub fn new(local_participant_id: impl Into<String>) -> (Arc<Self>, UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                events: tx,
                local_participant_id: local_participant_id.into(),
                connected: AtomicBool::new(false),
            }),
            rx,
        )
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    /// Publish-state change for the local participant, echoed back by the
    /// fake remote peer.
    fn emit_tracks(&self, kind: TrackKind, enabled: bool) {
        if !self.connected.load(Ordering::SeqCst) {
            return;
        }
        for pid in [self.local_participant_id.as_str(), ECHO_PARTICIPANT_ID] {
            let event = if enabled {
                EngineEvent::TrackPublished {
                    participant_id: pid.to_string(),
                    kind,
                }
            } else {
                EngineEvent::TrackUnpublished {
                    participant_id: pid.to_string(),
                    kind,
                }
            };
            self.emit(event);
        }
    }
}

#[async_trait]
impl MediaEngine for LoopbackEngine {
    async fn connect(&self, server_url: &str, token: &str) -> Result<(), MediaConnectionError> {
        if token.is_empty() {
            return Err(MediaConnectionError::BadToken);
        }
        tracing::info!("Loopback engine connected to {}", server_url);
        self.connected.store(true, Ordering::SeqCst);
        self.emit(EngineEvent::ParticipantConnected {
            participant_id: ECHO_PARTICIPANT_ID.to_string(),
            display_name: "Echo".to_string(),
        });
        self.emit(EngineEvent::TrackPublished {
            participant_id: ECHO_PARTICIPANT_ID.to_string(),
            kind: TrackKind::Audio,
        });
        Ok(())
    }

    async fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            tracing::info!("Loopback engine disconnected");
        }
    }

    async fn set_camera_enabled(&self, enabled: bool) -> Result<(), PermissionError> {
        self.emit_tracks(TrackKind::Video, enabled);
        Ok(())
    }

    async fn set_microphone_enabled(&self, enabled: bool) -> Result<(), PermissionError> {
        self.emit_tracks(TrackKind::Audio, enabled);
        Ok(())
    }

    async fn set_screen_share_enabled(&self, enabled: bool) -> Result<(), PermissionError> {
        self.emit_tracks(TrackKind::ScreenShare, enabled);
        Ok(())
    }

    fn list_devices(&self, kind: DeviceKind) -> Vec<DeviceInfo> {
        let (id, label) = match kind {
            DeviceKind::Camera => ("loopback-cam", "Loopback camera"),
            DeviceKind::Microphone => ("loopback-mic", "Loopback microphone"),
            DeviceKind::Speaker => ("loopback-spk", "Loopback speaker"),
        };
        vec![DeviceInfo {
            id: id.to_string(),
            label: label.to_string(),
        }]
    }

    async fn select_device(
        &self,
        kind: DeviceKind,
        device_id: &str,
    ) -> Result<(), PermissionError> {
        tracing::info!("Loopback engine selected {} {}", kind, device_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn connect_surfaces_echo_participant() {
        let (engine, mut rx) = LoopbackEngine::new("me");
        assert_ok!(engine.connect("wss://loop", "tok").await);

        assert!(matches!(
            rx.try_recv().unwrap(),
            EngineEvent::ParticipantConnected { .. }
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            EngineEvent::TrackPublished {
                kind: TrackKind::Audio,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn camera_toggle_is_echoed_for_both_sides() {
        let (engine, mut rx) = LoopbackEngine::new("me");
        engine.connect("wss://loop", "tok").await.unwrap();
        while rx.try_recv().is_ok() {}

        engine.set_camera_enabled(true).await.unwrap();
        let mut published = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if let EngineEvent::TrackPublished {
                participant_id,
                kind: TrackKind::Video,
            } = ev
            {
                published.push(participant_id);
            }
        }
        assert_eq!(published, vec!["me".to_string(), ECHO_PARTICIPANT_ID.to_string()]);
    }

    #[tokio::test]
    async fn track_events_require_connection() {
        let (engine, mut rx) = LoopbackEngine::new("me");
        engine.set_camera_enabled(true).await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
