//! Command surface for the UI layer.
//!
//! A `CallHandle` is the only way the rest of the application talks to the
//! call orchestrator: commands are enqueued onto the state machine's queue,
//! state is observed through read-only snapshots. The handle is cheap to
//! clone and safe to hand to UI tasks.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;

use crate::call::events::SessionInput;
use crate::call::moderation::ModerationController;
use crate::call::{CallKind, CallSnapshot};
use crate::media::DeviceKind;

#[derive(Clone)]
pub struct CallHandle {
    pub(crate) tx: UnboundedSender<SessionInput>,
    snapshot_rx: watch::Receiver<CallSnapshot>,
    moderation: Arc<ModerationController>,
}

impl CallHandle {
    pub(crate) fn new(
        tx: UnboundedSender<SessionInput>,
        snapshot_rx: watch::Receiver<CallSnapshot>,
        moderation: Arc<ModerationController>,
    ) -> Self {
        Self {
            tx,
            snapshot_rx,
            moderation,
        }
    }

    /// Current session snapshot.
    pub fn snapshot(&self) -> CallSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Subscribe to snapshot updates (one per processing tick).
    pub fn subscribe(&self) -> watch::Receiver<CallSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Admin-only operations against the live session.
    pub fn moderation(&self) -> &ModerationController {
        &self.moderation
    }

    pub fn initiate_call(
        &self,
        conversation_id: &str,
        peer_id: &str,
        peer_display_name: &str,
        kind: CallKind,
    ) {
        self.send(SessionInput::UserInitiatesCall {
            conversation_id: conversation_id.to_string(),
            peer_id: peer_id.to_string(),
            peer_display_name: peer_display_name.to_string(),
            kind,
        });
    }

    pub fn accept_call(&self) {
        self.send(SessionInput::UserAccepts);
    }

    pub fn decline_call(&self) {
        self.send(SessionInput::UserDeclines);
    }

    /// Hang up, cancel an outgoing ring, or decline an incoming one.
    /// Idempotent: safe to call at any time, in any state.
    pub fn hang_up(&self) {
        self.send(SessionInput::UserHangsUp);
    }

    pub fn set_camera_enabled(&self, enabled: bool) {
        self.send(SessionInput::UserSetsCamera { enabled });
    }

    pub fn set_microphone_enabled(&self, enabled: bool) {
        self.send(SessionInput::UserSetsMicrophone { enabled });
    }

    pub fn set_screen_share_enabled(&self, enabled: bool) {
        self.send(SessionInput::UserSetsScreenShare { enabled });
    }

    pub fn select_device(&self, kind: DeviceKind, device_id: &str) {
        self.send(SessionInput::UserSelectsDevice {
            kind,
            device_id: device_id.to_string(),
        });
    }

    fn send(&self, input: SessionInput) {
        // The machine task outlives every handle except during shutdown,
        // where dropped commands are harmless.
        if self.tx.send(input).is_err() {
            tracing::debug!("Call command dropped: state machine is gone");
        }
    }
}
