//! Call session state machine — the single authoritative lifecycle owner.
//!
//! One tokio task owns the active [`CallSession`] and consumes a single
//! ordered queue of [`SessionInput`]s fed by every producer: user commands,
//! the signaling reconciler, engine callbacks, and completions of spawned
//! async work (backend requests, ring timers, connect attempts). Blocking
//! work never happens on this task; it is spawned and its outcome re-enters
//! the queue as an ordinary event.
//!
//! Lifecycle: `Idle → OutgoingRinging | IncomingRinging → Connecting →
//! Connected → Ending → Ended | Failed`. Any event not listed for the
//! current state is an idempotent no-op.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::backend::{CallBackend, EngineCredentials};
use crate::call::events::SessionInput;
use crate::call::handle::CallHandle;
use crate::call::moderation::{ModerationAction, ModerationController};
use crate::call::{
    CallKind, CallSession, CallSnapshot, CallState, EndReason, ParticipantTrackState,
    PendingInvite,
};
use crate::media::devices::DeviceSelection;
use crate::media::reconnect::{ReconnectManager, DEFAULT_MAX_RETRIES};
use crate::media::tracks::TrackOrchestrator;
use crate::media::{DeviceKind, EngineEvent, MediaEngine};

/// Maximum time a call may stay in a ringing state before it is missed.
pub const RING_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Debug, Clone)]
pub struct MachineConfig {
    pub ring_timeout: Duration,
    pub max_retries: u32,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            ring_timeout: RING_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Who this client is inside a call.
#[derive(Debug, Clone)]
pub struct LocalIdentity {
    pub participant_id: String,
    pub display_name: String,
}

/// Spawn the state machine task and all event plumbing.
///
/// `engine_events` is the stream the engine implementation was constructed
/// with; it is forwarded into the machine's queue so engine callbacks are
/// serialized with everything else.
pub fn spawn(
    cfg: MachineConfig,
    backend: Arc<dyn CallBackend>,
    engine: Arc<dyn MediaEngine>,
    mut engine_events: UnboundedReceiver<EngineEvent>,
    identity: LocalIdentity,
    devices: DeviceSelection,
) -> CallHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let (snapshot_tx, snapshot_rx) = watch::channel(CallSnapshot {
        devices: devices.clone(),
        ..CallSnapshot::default()
    });

    let moderation = Arc::new(ModerationController::new(
        backend.clone(),
        tx.clone(),
        snapshot_rx.clone(),
        identity.participant_id.clone(),
    ));

    // Engine callbacks enter the same serialized queue as everything else.
    let engine_tx = tx.clone();
    tokio::spawn(async move {
        while let Some(ev) = engine_events.recv().await {
            if engine_tx.send(SessionInput::Engine(ev)).is_err() {
                break;
            }
        }
    });

    let machine = StateMachine::new(cfg, backend, engine, identity, devices, tx.clone(), snapshot_tx);
    tokio::spawn(machine.run(rx));

    CallHandle::new(tx, snapshot_rx, moderation)
}

pub(crate) struct StateMachine {
    cfg: MachineConfig,
    backend: Arc<dyn CallBackend>,
    engine: Arc<dyn MediaEngine>,
    local: LocalIdentity,

    session: Option<CallSession>,
    pending_invite: Option<PendingInvite>,
    creds: Option<EngineCredentials>,
    devices: DeviceSelection,
    default_devices: DeviceSelection,
    notice: Option<String>,

    tracks: TrackOrchestrator,
    reconnect: ReconnectManager,
    ring_cancel: Option<CancellationToken>,
    /// Generation counter for ring timers: a timeout fire carrying a stale
    /// sequence number is ignored.
    invite_seq: u64,
    retry_count: u32,
    /// Whether we already told the backend we left this session.
    leave_sent: bool,

    tx: UnboundedSender<SessionInput>,
    snapshot_tx: watch::Sender<CallSnapshot>,
}

impl StateMachine {
    pub(crate) fn new(
        cfg: MachineConfig,
        backend: Arc<dyn CallBackend>,
        engine: Arc<dyn MediaEngine>,
        local: LocalIdentity,
        devices: DeviceSelection,
        tx: UnboundedSender<SessionInput>,
        snapshot_tx: watch::Sender<CallSnapshot>,
    ) -> Self {
        let reconnect = ReconnectManager::new(engine.clone(), tx.clone());
        Self {
            cfg,
            backend,
            engine,
            local,
            session: None,
            pending_invite: None,
            creds: None,
            default_devices: devices.clone(),
            devices,
            notice: None,
            tracks: TrackOrchestrator::new(),
            reconnect,
            ring_cancel: None,
            invite_seq: 0,
            retry_count: 0,
            leave_sent: false,
            tx,
            snapshot_tx,
        }
    }

    /// Event loop. Drains every immediately-ready input before publishing a
    /// snapshot, so a burst (e.g. track unpublish + republish in the same
    /// delivery) can never leak an intermediate frame to the UI.
    pub(crate) async fn run(mut self, mut rx: UnboundedReceiver<SessionInput>) {
        self.publish();
        while let Some(input) = rx.recv().await {
            self.apply(input).await;
            while let Ok(more) = rx.try_recv() {
                self.apply(more).await;
            }
            self.publish();
        }
        tracing::debug!("Session queue closed, state machine exiting");
    }

    fn state(&self) -> CallState {
        self.session
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(CallState::Idle)
    }

    fn session_matches(&self, session_id: &str) -> bool {
        self.session
            .as_ref()
            .map(|s| s.session_id == session_id)
            .unwrap_or(false)
    }

    pub(crate) fn publish(&self) {
        self.snapshot_tx.send_replace(CallSnapshot {
            session: self.session.clone(),
            pending_invite: self.pending_invite.clone(),
            devices: self.devices.clone(),
            notice: self.notice.clone(),
        });
    }

    pub(crate) async fn apply(&mut self, input: SessionInput) {
        match input {
            SessionInput::UserInitiatesCall {
                conversation_id,
                peer_id,
                peer_display_name,
                kind,
            } => self.on_user_initiates(conversation_id, peer_id, peer_display_name, kind),
            SessionInput::InboundInvite {
                session_id,
                conversation_id,
                caller_id,
                caller_display_name,
                kind,
            } => self.on_inbound_invite(session_id, conversation_id, caller_id, caller_display_name, kind),
            SessionInput::OutboundCallPlaced { result } => self.on_outbound_placed(result),
            SessionInput::PeerAccepted { session_id } => self.on_peer_accepted(&session_id),
            SessionInput::UserAccepts => self.on_user_accepts(),
            SessionInput::UserDeclines => self.on_user_declines(),
            SessionInput::UserHangsUp => self.on_user_hangs_up(),
            SessionInput::PeerDeclined { session_id } => {
                if self.state() == CallState::OutgoingRinging && self.session_matches(&session_id) {
                    self.finish(EndReason::Declined, false);
                }
            }
            SessionInput::PeerCancelled { session_id } => {
                if self.state() == CallState::IncomingRinging && self.session_matches(&session_id) {
                    self.finish(EndReason::Missed, false);
                }
            }
            SessionInput::PeerEndedForAll { session_id } => {
                if self.session_matches(&session_id) && !self.state().is_terminal() {
                    self.finish(EndReason::EndedByHost, false);
                }
            }
            SessionInput::SessionExpired { session_id } => {
                if self.session_matches(&session_id) && !self.state().is_terminal() {
                    tracing::warn!("Session {} expired or invalid server-side", session_id);
                    self.finish(EndReason::ConnectionLost, false);
                }
            }
            SessionInput::HostEndedCall { session_id } => {
                if self.session_matches(&session_id) && !self.state().is_terminal() {
                    self.finish(EndReason::EndedByHost, false);
                }
            }
            SessionInput::RingTimeout { invite_seq } => self.on_ring_timeout(invite_seq),
            SessionInput::JoinCredentials { session_id, result } => {
                self.on_join_credentials(&session_id, result)
            }
            SessionInput::MediaConnected { session_id } => self.on_media_connected(&session_id),
            SessionInput::MediaConnectFailed { session_id, error } => {
                self.on_media_connect_failed(&session_id, error)
            }
            SessionInput::Engine(ev) => self.on_engine_event(ev),
            SessionInput::ParticipantJoined {
                session_id,
                participant_id,
                display_name,
            } => {
                if self.session_matches(&session_id) && !self.state().is_terminal() {
                    self.upsert_participant(&participant_id, Some(display_name));
                }
            }
            SessionInput::ParticipantLeft {
                session_id,
                participant_id,
            } => {
                if self.session_matches(&session_id) && !self.state().is_terminal() {
                    self.remove_participant(&participant_id);
                }
            }
            SessionInput::PermissionDenied { device } => {
                match device {
                    DeviceKind::Camera => self.devices.camera_enabled = false,
                    DeviceKind::Microphone => self.devices.microphone_enabled = false,
                    DeviceKind::Speaker => {}
                }
                self.notice = Some(format!("{} unavailable, continuing without it", device));
            }
            SessionInput::UserSetsCamera { enabled } => {
                self.devices.camera_enabled = enabled;
                self.apply_device_toggle(DeviceKind::Camera, enabled);
            }
            SessionInput::UserSetsMicrophone { enabled } => {
                self.devices.microphone_enabled = enabled;
                self.apply_device_toggle(DeviceKind::Microphone, enabled);
            }
            SessionInput::UserSetsScreenShare { enabled } => {
                // Screen share has no persisted desired-state flag; the
                // toggle is applied directly.
                if self.state() == CallState::Connected {
                    let engine = self.engine.clone();
                    let tx = self.tx.clone();
                    tokio::spawn(async move {
                        if let Err(e) = engine.set_screen_share_enabled(enabled).await {
                            tracing::warn!("Screen share toggle failed: {}", e);
                            let _ = tx.send(SessionInput::PermissionDenied { device: e.device() });
                        }
                    });
                }
            }
            SessionInput::UserSelectsDevice { kind, device_id } => {
                self.on_user_selects_device(kind, device_id)
            }
            SessionInput::ModerationConfirmed {
                session_id,
                action,
                participant_id,
            } => {
                if self.session_matches(&session_id) && !self.state().is_terminal() {
                    self.apply_moderation(action, &participant_id);
                }
            }
        }
    }

    // -- call setup ------------------------------------------------------

    fn on_user_initiates(
        &mut self,
        conversation_id: String,
        peer_id: String,
        peer_display_name: String,
        kind: CallKind,
    ) {
        if !self.state().is_idle_equivalent() {
            tracing::warn!(
                "Rejecting call initiation while in state {:?}",
                self.state()
            );
            self.notice = Some("Already in a call, hang up first".to_string());
            return;
        }

        let session_id = format!("pending-{}", uuid::Uuid::new_v4());
        let mut session = CallSession {
            session_id,
            conversation_id: conversation_id.clone(),
            kind,
            initiator_id: self.local.participant_id.clone(),
            state: CallState::OutgoingRinging,
            participants: Default::default(),
            end_reason: None,
        };
        session.participants.insert(
            self.local.participant_id.clone(),
            ParticipantTrackState {
                participant_id: self.local.participant_id.clone(),
                display_name: self.local.display_name.clone(),
                is_admin: true,
                ..Default::default()
            },
        );
        self.session = Some(session);
        self.pending_invite = Some(PendingInvite {
            peer_id,
            peer_display_name,
            expires_at: Utc::now()
                + chrono::Duration::from_std(self.cfg.ring_timeout)
                    .unwrap_or_else(|_| chrono::Duration::seconds(45)),
        });
        self.leave_sent = false;
        self.notice = None;
        self.start_ring_timer();

        let backend = self.backend.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = backend.start_call(&conversation_id).await;
            let _ = tx.send(SessionInput::OutboundCallPlaced { result });
        });
    }

    fn on_outbound_placed(
        &mut self,
        result: Result<crate::backend::CallTicket, crate::error::BackendError>,
    ) {
        match result {
            Ok(ticket) => {
                if self.state() != CallState::OutgoingRinging {
                    // The user already cancelled; retract the server-side
                    // call so the peer does not keep ringing.
                    tracing::info!("Call {} placed after cancel, retracting", ticket.session_id);
                    let backend = self.backend.clone();
                    tokio::spawn(async move {
                        if let Err(e) = backend.leave_call(&ticket.session_id).await {
                            tracing::warn!("Retract of {} failed: {}", ticket.session_id, e);
                        }
                    });
                    return;
                }
                self.creds = Some(ticket.credentials());
                if let Some(session) = self.session.as_mut() {
                    session.session_id = ticket.session_id;
                }
            }
            Err(e) => {
                tracing::warn!("Placing call failed: {}", e);
                if self.state() == CallState::OutgoingRinging {
                    self.finish(EndReason::Failed, false);
                }
            }
        }
    }

    fn on_inbound_invite(
        &mut self,
        session_id: String,
        conversation_id: String,
        caller_id: String,
        caller_display_name: String,
        kind: CallKind,
    ) {
        if !self.state().is_idle_equivalent() {
            // The reconciler filters these; a late race is simply dropped.
            tracing::debug!("Ignoring invite for {} while busy", session_id);
            return;
        }

        let mut session = CallSession {
            session_id,
            conversation_id,
            kind,
            initiator_id: caller_id.clone(),
            state: CallState::IncomingRinging,
            participants: Default::default(),
            end_reason: None,
        };
        session.participants.insert(
            caller_id.clone(),
            ParticipantTrackState {
                participant_id: caller_id.clone(),
                display_name: caller_display_name.clone(),
                is_admin: true,
                ..Default::default()
            },
        );
        self.session = Some(session);
        self.pending_invite = Some(PendingInvite {
            peer_id: caller_id,
            peer_display_name: caller_display_name,
            expires_at: Utc::now()
                + chrono::Duration::from_std(self.cfg.ring_timeout)
                    .unwrap_or_else(|_| chrono::Duration::seconds(45)),
        });
        self.leave_sent = false;
        self.notice = None;
        self.start_ring_timer();
    }

    fn on_peer_accepted(&mut self, session_id: &str) {
        if self.state() != CallState::OutgoingRinging || !self.session_matches(session_id) {
            return;
        }
        self.clear_invite();
        self.set_state(CallState::Connecting);
        self.retry_count = 0;

        match self.creds.clone() {
            Some(creds) => {
                let sid = session_id.to_string();
                self.reconnect.spawn_attempt(sid, creds, 0);
            }
            None => self.spawn_join(session_id.to_string()),
        }
    }

    fn on_user_accepts(&mut self) {
        if self.state() != CallState::IncomingRinging {
            return;
        }
        self.clear_invite();
        self.set_state(CallState::Connecting);
        self.retry_count = 0;
        let session_id = self
            .session
            .as_ref()
            .map(|s| s.session_id.clone())
            .unwrap_or_default();
        self.spawn_join(session_id);
    }

    fn spawn_join(&self, session_id: String) {
        let backend = self.backend.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = backend.join_call(&session_id).await;
            let _ = tx.send(SessionInput::JoinCredentials { session_id, result });
        });
    }

    fn on_join_credentials(
        &mut self,
        session_id: &str,
        result: Result<EngineCredentials, crate::error::BackendError>,
    ) {
        if self.state() != CallState::Connecting || !self.session_matches(session_id) {
            return;
        }
        match result {
            Ok(creds) => {
                self.creds = Some(creds.clone());
                self.reconnect
                    .spawn_attempt(session_id.to_string(), creds, self.retry_count);
            }
            Err(e) => {
                tracing::warn!("Joining call {} failed: {}", session_id, e);
                self.finish(EndReason::Failed, false);
            }
        }
    }

    // -- connection lifecycle -------------------------------------------

    fn on_media_connected(&mut self, session_id: &str) {
        if self.state() != CallState::Connecting || !self.session_matches(session_id) {
            return;
        }
        self.set_state(CallState::Connected);
        self.retry_count = 0;
        let local_id = self.local.participant_id.clone();
        let local_name = self.local.display_name.clone();
        self.upsert_participant(&local_id, Some(local_name));
        tracing::info!("Media connected for session {}", session_id);

        // Enforce the user's device intent rather than trusting whatever
        // the engine defaulted to: a freshly (re)established session may
        // publish tracks before intent is applied.
        let engine = self.engine.clone();
        let selection = self.devices.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            for err in TrackOrchestrator::enforce_device_intent(engine.as_ref(), &selection).await {
                let _ = tx.send(SessionInput::PermissionDenied { device: err.device() });
            }
        });
    }

    fn on_media_connect_failed(
        &mut self,
        session_id: &str,
        error: crate::error::MediaConnectionError,
    ) {
        if self.state() != CallState::Connecting || !self.session_matches(session_id) {
            return;
        }
        self.retry_count += 1;
        if self.retry_count >= self.cfg.max_retries {
            tracing::warn!(
                "Media connect failed after {} attempts: {}",
                self.retry_count,
                error
            );
            self.finish(EndReason::Failed, false);
            return;
        }
        tracing::info!(
            "Media connect failed (attempt {}/{}): {}, retrying",
            self.retry_count,
            self.cfg.max_retries,
            error
        );
        match self.creds.clone() {
            Some(creds) => {
                self.reconnect
                    .spawn_attempt(session_id.to_string(), creds, self.retry_count)
            }
            None => self.finish(EndReason::Failed, false),
        }
    }

    fn on_engine_event(&mut self, ev: EngineEvent) {
        let Some(session_id) = self.session.as_ref().map(|s| s.session_id.clone()) else {
            return;
        };
        match ev {
            EngineEvent::Connected => self.on_media_connected(&session_id),
            EngineEvent::Disconnected { transient: true } => {
                if self.state() == CallState::Connected {
                    tracing::warn!("Transient media disconnect, reconnecting");
                    // Participants are preserved optimistically across the
                    // reconnect attempt.
                    self.set_state(CallState::Connecting);
                    self.retry_count = 0;
                    match self.creds.clone() {
                        Some(creds) => self.reconnect.spawn_attempt(session_id, creds, 0),
                        None => self.spawn_join(session_id),
                    }
                }
            }
            EngineEvent::Disconnected { transient: false } => {
                if !self.state().is_terminal() && self.state() != CallState::Idle {
                    self.finish(EndReason::ConnectionLost, false);
                }
            }
            EngineEvent::ParticipantConnected {
                participant_id,
                display_name,
            } => {
                if !self.state().is_terminal() {
                    self.upsert_participant(&participant_id, Some(display_name));
                }
            }
            EngineEvent::ParticipantDisconnected { participant_id } => {
                if !self.state().is_terminal() && participant_id != self.local.participant_id {
                    self.remove_participant(&participant_id);
                }
            }
            ref track_event => {
                let mut changed = false;
                if let Some(session) = self.session.as_mut() {
                    if !session.state.is_terminal() {
                        changed = self.tracks.apply(&mut session.participants, track_event);
                    }
                }
                if changed {
                    self.fix_admin_flags();
                }
            }
        }
    }

    // -- termination -----------------------------------------------------

    fn on_user_hangs_up(&mut self) {
        match self.state() {
            CallState::OutgoingRinging => self.finish(EndReason::EndedByUser, true),
            CallState::IncomingRinging => self.finish(EndReason::Declined, true),
            CallState::Connecting | CallState::Connected => {
                self.finish(EndReason::EndedByUser, true)
            }
            // Hanging up twice, or after the call already ended
            // server-side, is a no-op.
            CallState::Idle | CallState::Ending | CallState::Ended | CallState::Failed => {}
        }
    }

    fn on_user_declines(&mut self) {
        if self.state() == CallState::IncomingRinging {
            self.finish(EndReason::Declined, true);
        }
    }

    fn on_ring_timeout(&mut self, invite_seq: u64) {
        if invite_seq != self.invite_seq {
            // A timer that fired after cancellation.
            return;
        }
        match self.state() {
            CallState::OutgoingRinging => {
                tracing::info!("Outgoing call not answered within ring timeout");
                self.finish(EndReason::Missed, true);
            }
            CallState::IncomingRinging => {
                tracing::info!("Incoming call not answered within ring timeout");
                self.finish(EndReason::Missed, false);
            }
            _ => {}
        }
    }

    /// Tear the call down into its terminal state.
    ///
    /// Passes through `Ending` within the same processing tick: all pending
    /// side effects (ring timer, reconnect attempt) are cancelled
    /// synchronously, engine disconnect and the backend leave run as
    /// fire-and-forget tasks.
    fn finish(&mut self, reason: EndReason, notify_backend: bool) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.state.is_terminal() {
            return;
        }
        session.state = CallState::Ending;

        self.invite_seq += 1;
        if let Some(token) = self.ring_cancel.take() {
            token.cancel();
        }
        self.pending_invite = None;
        self.reconnect.cancel();

        let engine = self.engine.clone();
        tokio::spawn(async move {
            engine.disconnect().await;
        });

        let has_backend_session = !session.session_id.starts_with("pending-");
        if notify_backend && !self.leave_sent && has_backend_session {
            self.leave_sent = true;
            let backend = self.backend.clone();
            let sid = session.session_id.clone();
            tokio::spawn(async move {
                if let Err(e) = backend.leave_call(&sid).await {
                    tracing::warn!("Leaving call {} failed: {}", sid, e);
                }
            });
        }

        self.tracks.clear();
        session.participants.clear();
        session.end_reason = Some(reason);
        session.state = if reason == EndReason::Failed {
            CallState::Failed
        } else {
            CallState::Ended
        };
        self.creds = None;
        self.retry_count = 0;
        self.devices = self.default_devices.clone();
        tracing::info!("Call ended: {}", reason.describe());
    }

    // -- roster ----------------------------------------------------------

    fn upsert_participant(&mut self, participant_id: &str, display_name: Option<String>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let initiator = session.initiator_id.clone();
        let entry = session
            .participants
            .entry(participant_id.to_string())
            .or_insert_with(|| ParticipantTrackState {
                participant_id: participant_id.to_string(),
                ..Default::default()
            });
        if let Some(name) = display_name {
            if !name.is_empty() {
                entry.display_name = name;
            }
        }
        entry.is_admin = entry.is_admin || entry.participant_id == initiator;
    }

    fn remove_participant(&mut self, participant_id: &str) {
        if let Some(session) = self.session.as_mut() {
            session.participants.remove(participant_id);
        }
        self.tracks.remove_participant(participant_id);
    }

    /// Track events may create roster entries before the join notification
    /// arrives; make sure the initiator keeps its admin bit.
    fn fix_admin_flags(&mut self) {
        if let Some(session) = self.session.as_mut() {
            let initiator = session.initiator_id.clone();
            if let Some(p) = session.participants.get_mut(&initiator) {
                p.is_admin = true;
            }
        }
    }

    // -- devices ---------------------------------------------------------

    fn apply_device_toggle(&mut self, kind: DeviceKind, enabled: bool) {
        if self.state() != CallState::Connected {
            return;
        }
        let engine = self.engine.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = match kind {
                DeviceKind::Camera => engine.set_camera_enabled(enabled).await,
                DeviceKind::Microphone => engine.set_microphone_enabled(enabled).await,
                DeviceKind::Speaker => Ok(()),
            };
            if let Err(e) = result {
                tracing::warn!("Device toggle failed: {}", e);
                let _ = tx.send(SessionInput::PermissionDenied { device: e.device() });
            }
        });
    }

    fn on_user_selects_device(&mut self, kind: DeviceKind, device_id: String) {
        match kind {
            DeviceKind::Camera => self.devices.selected_camera_id = Some(device_id.clone()),
            DeviceKind::Microphone => {
                self.devices.selected_microphone_id = Some(device_id.clone())
            }
            DeviceKind::Speaker => self.devices.selected_speaker_id = Some(device_id.clone()),
        }
        if self.state() == CallState::Connected {
            // The engine tears down and republishes the affected track.
            let engine = self.engine.clone();
            let tx = self.tx.clone();
            tokio::spawn(async move {
                if let Err(e) = engine.select_device(kind, &device_id).await {
                    tracing::warn!("Switching {} failed: {}", kind, e);
                    let _ = tx.send(SessionInput::PermissionDenied { device: e.device() });
                }
            });
        }
    }

    fn apply_moderation(&mut self, action: ModerationAction, participant_id: &str) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match action {
            ModerationAction::MuteMicrophone => {
                if let Some(p) = session.participants.get_mut(participant_id) {
                    p.mic_enabled = false;
                }
            }
            ModerationAction::StopVideo => {
                if let Some(p) = session.participants.get_mut(participant_id) {
                    p.cam_enabled = false;
                }
            }
            ModerationAction::Remove => {
                session.participants.remove(participant_id);
                self.tracks.remove_participant(participant_id);
            }
        }
    }

    // -- timers ----------------------------------------------------------

    fn start_ring_timer(&mut self) {
        self.invite_seq += 1;
        let seq = self.invite_seq;
        let token = CancellationToken::new();
        self.ring_cancel = Some(token.clone());
        let tx = self.tx.clone();
        let timeout = self.cfg.ring_timeout;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = time::sleep(timeout) => {
                    let _ = tx.send(SessionInput::RingTimeout { invite_seq: seq });
                }
            }
        });
    }

    fn clear_invite(&mut self) {
        self.invite_seq += 1;
        if let Some(token) = self.ring_cancel.take() {
            token.cancel();
        }
        self.pending_invite = None;
    }

    fn set_state(&mut self, state: CallState) {
        if let Some(session) = self.session.as_mut() {
            tracing::debug!("Call state {:?} -> {:?}", session.state, state);
            session.state = state;
        }
    }
}
