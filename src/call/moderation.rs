//! Moderation controller — admin-only actions against the live session.
//!
//! Every operation is authorized locally first (caller must be an admin of
//! the current call, targets must not themselves be admins) and then sent
//! to the backend. Local state is updated only after the backend confirms,
//! so the admin never sees a moderation effect that did not actually take
//! hold. Failures leave session state untouched.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;

use crate::backend::CallBackend;
use crate::call::events::SessionInput;
use crate::call::{CallSnapshot, CallState};
use crate::error::{AuthorizationError, ModerationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationAction {
    MuteMicrophone,
    StopVideo,
    Remove,
}

pub struct ModerationController {
    backend: Arc<dyn CallBackend>,
    queue: UnboundedSender<SessionInput>,
    snapshot: watch::Receiver<CallSnapshot>,
    local_participant_id: String,
}

impl ModerationController {
    pub(crate) fn new(
        backend: Arc<dyn CallBackend>,
        queue: UnboundedSender<SessionInput>,
        snapshot: watch::Receiver<CallSnapshot>,
        local_participant_id: String,
    ) -> Self {
        Self {
            backend,
            queue,
            snapshot,
            local_participant_id,
        }
    }

    /// Check that the local participant may moderate `target` (or the whole
    /// call, if `target` is `None`). Runs before any backend call.
    pub fn authorize(&self, target: Option<&str>) -> Result<String, AuthorizationError> {
        let snap = self.snapshot.borrow();
        let session = snap
            .session
            .as_ref()
            .filter(|s| !s.state.is_terminal() && s.state != CallState::Idle)
            .ok_or(AuthorizationError::NoActiveCall)?;

        let caller = session
            .participants
            .get(&self.local_participant_id)
            .ok_or(AuthorizationError::NotAdmin)?;
        if !caller.is_admin {
            return Err(AuthorizationError::NotAdmin);
        }

        if let Some(target_id) = target {
            let target_state = session
                .participants
                .get(target_id)
                .ok_or_else(|| AuthorizationError::UnknownTarget(target_id.to_string()))?;
            if target_state.is_admin {
                return Err(AuthorizationError::TargetIsAdmin(target_id.to_string()));
            }
        }

        Ok(session.session_id.clone())
    }

    pub async fn mute_participant_microphone(
        &self,
        participant_id: &str,
    ) -> Result<(), ModerationError> {
        self.execute(ModerationAction::MuteMicrophone, participant_id)
            .await
    }

    pub async fn stop_participant_video(
        &self,
        participant_id: &str,
    ) -> Result<(), ModerationError> {
        self.execute(ModerationAction::StopVideo, participant_id)
            .await
    }

    pub async fn remove_participant(&self, participant_id: &str) -> Result<(), ModerationError> {
        self.execute(ModerationAction::Remove, participant_id).await
    }

    /// End the call for every participant. The admin's own client moves to
    /// its terminal state as soon as the backend confirms; it does not
    /// wait for the `PeerEndedForAll` push to make the round trip.
    pub async fn end_for_all(&self) -> Result<(), ModerationError> {
        let session_id = self.authorize(None)?;
        self.backend.end_for_all(&session_id).await?;
        let _ = self.queue.send(SessionInput::HostEndedCall { session_id });
        Ok(())
    }

    async fn execute(
        &self,
        action: ModerationAction,
        participant_id: &str,
    ) -> Result<(), ModerationError> {
        let session_id = self.authorize(Some(participant_id))?;

        match action {
            ModerationAction::MuteMicrophone => {
                self.backend
                    .mute_participant(&session_id, participant_id)
                    .await?
            }
            ModerationAction::StopVideo => {
                self.backend
                    .stop_participant_video(&session_id, participant_id)
                    .await?
            }
            ModerationAction::Remove => {
                self.backend
                    .remove_participant(&session_id, participant_id)
                    .await?
            }
        }

        tracing::info!(
            "Moderation {:?} confirmed for {} in {}",
            action,
            participant_id,
            session_id
        );
        let _ = self.queue.send(SessionInput::ModerationConfirmed {
            session_id,
            action,
            participant_id: participant_id.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::mpsc;

    use crate::backend::{CallTicket, EngineCredentials};
    use crate::call::{CallKind, CallSession, ParticipantTrackState};
    use crate::error::BackendError;

    struct RecordingBackend {
        calls: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl CallBackend for RecordingBackend {
        async fn start_call(&self, _c: &str) -> Result<CallTicket, BackendError> {
            unimplemented!("not exercised")
        }

        async fn join_call(&self, _s: &str) -> Result<EngineCredentials, BackendError> {
            unimplemented!("not exercised")
        }

        async fn leave_call(&self, _s: &str) -> Result<(), BackendError> {
            Ok(())
        }

        async fn end_for_all(&self, _s: &str) -> Result<(), BackendError> {
            self.record()
        }

        async fn mute_participant(&self, _s: &str, _p: &str) -> Result<(), BackendError> {
            self.record()
        }

        async fn stop_participant_video(&self, _s: &str, _p: &str) -> Result<(), BackendError> {
            self.record()
        }

        async fn remove_participant(&self, _s: &str, _p: &str) -> Result<(), BackendError> {
            self.record()
        }
    }

    impl RecordingBackend {
        fn record(&self) -> Result<(), BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(BackendError::Status {
                    status: 500,
                    url: "test".into(),
                    body: "boom".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn participant(id: &str, admin: bool) -> ParticipantTrackState {
        ParticipantTrackState {
            participant_id: id.to_string(),
            display_name: id.to_string(),
            is_admin: admin,
            ..Default::default()
        }
    }

    fn snapshot_with(me_admin: bool) -> CallSnapshot {
        let mut participants = HashMap::new();
        participants.insert("me".to_string(), participant("me", me_admin));
        participants.insert("bob".to_string(), participant("bob", false));
        participants.insert("host".to_string(), participant("host", true));
        CallSnapshot {
            session: Some(CallSession {
                session_id: "s-1".into(),
                conversation_id: "conv".into(),
                kind: CallKind::Group,
                initiator_id: "host".into(),
                state: CallState::Connected,
                participants,
                end_reason: None,
            }),
            ..Default::default()
        }
    }

    fn controller(me_admin: bool, fail: bool) -> (ModerationController, mpsc::UnboundedReceiver<SessionInput>, Arc<RecordingBackend>) {
        let backend = Arc::new(RecordingBackend {
            calls: AtomicU32::new(0),
            fail,
        });
        let (tx, rx) = mpsc::unbounded_channel();
        let (_snap_tx, snap_rx) = watch::channel(snapshot_with(me_admin));
        let ctl = ModerationController::new(backend.clone(), tx, snap_rx, "me".into());
        (ctl, rx, backend)
    }

    #[tokio::test]
    async fn admin_mute_confirms_then_enqueues_update() {
        let (ctl, mut rx, backend) = controller(true, false);

        ctl.mute_participant_microphone("bob").await.unwrap();

        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        match rx.try_recv().unwrap() {
            SessionInput::ModerationConfirmed {
                session_id,
                action,
                participant_id,
            } => {
                assert_eq!(session_id, "s-1");
                assert_eq!(action, ModerationAction::MuteMicrophone);
                assert_eq!(participant_id, "bob");
            }
            other => panic!("unexpected input: {:?}", other),
        }
    }

    #[tokio::test]
    async fn scenario_d_non_admin_is_rejected_before_backend() {
        let (ctl, mut rx, backend) = controller(false, false);

        let err = ctl.end_for_all().await.unwrap_err();
        assert!(matches!(
            err,
            ModerationError::Unauthorized(AuthorizationError::NotAdmin)
        ));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert!(rx.try_recv().is_err(), "no state change may be enqueued");
    }

    #[tokio::test]
    async fn scenario_d_admin_end_for_all_enqueues_host_end() {
        let (ctl, mut rx, backend) = controller(true, false);

        ctl.end_for_all().await.unwrap();

        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            rx.try_recv().unwrap(),
            SessionInput::HostEndedCall { .. }
        ));
    }

    #[tokio::test]
    async fn admins_cannot_moderate_each_other() {
        let (ctl, mut rx, backend) = controller(true, false);

        let err = ctl.remove_participant("host").await.unwrap_err();
        assert!(matches!(
            err,
            ModerationError::Unauthorized(AuthorizationError::TargetIsAdmin(_))
        ));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn backend_failure_leaves_state_unchanged() {
        let (ctl, mut rx, backend) = controller(true, true);

        let err = ctl.stop_participant_video("bob").await.unwrap_err();
        assert!(matches!(err, ModerationError::Backend(_)));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        // The confirm event is what mutates local state; none may be sent.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn moderation_requires_an_active_call() {
        let backend = Arc::new(RecordingBackend {
            calls: AtomicU32::new(0),
            fail: false,
        });
        let (tx, _rx) = mpsc::unbounded_channel();
        let (_snap_tx, snap_rx) = watch::channel(CallSnapshot::default());
        let ctl = ModerationController::new(backend, tx, snap_rx, "me".into());

        let err = ctl.mute_participant_microphone("bob").await.unwrap_err();
        assert!(matches!(
            err,
            ModerationError::Unauthorized(AuthorizationError::NoActiveCall)
        ));
    }
}
