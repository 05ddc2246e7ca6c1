//! Media track orchestrator — folds engine track events into the roster.
//!
//! Maintains the 1:1 mapping between "the engine says participant X has an
//! active, unmuted track" and the rendered output surface for X. The fold
//! is idempotent: repeated identical events produce no visible change, so
//! at-least-once engine callbacks cannot cause flicker.
//!
//! The orchestrator never mutates `ParticipantTrackState` on its own: the
//! state machine task invokes [`TrackOrchestrator::apply`] while processing
//! events, preserving the single-writer discipline. The orchestrator owns
//! only the render attachments and the per-track publication bookkeeping.

use std::collections::HashMap;

use crate::call::{ParticipantId, ParticipantTrackState};
use crate::error::PermissionError;
use crate::media::devices::DeviceSelection;
use crate::media::{EngineEvent, MediaEngine, TrackKind};

/// What the UI should render for one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutput {
    /// At least one video publication is present, subscribed, and unmuted.
    Video,
    /// No live video; render the avatar placeholder.
    Placeholder,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Publication {
    published: bool,
    muted: bool,
}

impl Publication {
    fn live(&self) -> bool {
        self.published && !self.muted
    }
}

#[derive(Default)]
pub struct TrackOrchestrator {
    publications: HashMap<ParticipantId, HashMap<TrackKind, Publication>>,
    attachments: HashMap<ParticipantId, RenderOutput>,
}

impl TrackOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one engine track event into `participants`.
    ///
    /// Returns `true` if any participant's visible state changed, `false`
    /// for redundant events. Connection-level engine events are not
    /// handled here; the state machine routes those itself.
    pub fn apply(
        &mut self,
        participants: &mut HashMap<ParticipantId, ParticipantTrackState>,
        event: &EngineEvent,
    ) -> bool {
        match event {
            EngineEvent::TrackPublished { participant_id, kind } => {
                self.set_publication(participants, participant_id, *kind, |p| {
                    p.published = true;
                })
            }
            EngineEvent::TrackUnpublished { participant_id, kind } => {
                self.set_publication(participants, participant_id, *kind, |p| {
                    p.published = false;
                    p.muted = false;
                })
            }
            EngineEvent::TrackMuted { participant_id, kind } => {
                self.set_publication(participants, participant_id, *kind, |p| {
                    p.muted = true;
                })
            }
            EngineEvent::TrackUnmuted { participant_id, kind } => {
                self.set_publication(participants, participant_id, *kind, |p| {
                    p.muted = false;
                })
            }
            EngineEvent::SpeakingChanged {
                participant_id,
                speaking,
            } => {
                let entry = Self::roster_entry(participants, participant_id);
                if entry.is_speaking == *speaking {
                    return false;
                }
                entry.is_speaking = *speaking;
                true
            }
            _ => false,
        }
    }

    /// The rendered surface for one participant.
    pub fn render_output(&self, participant_id: &str) -> RenderOutput {
        self.attachments
            .get(participant_id)
            .copied()
            .unwrap_or(RenderOutput::Placeholder)
    }

    /// Drop all state for a participant who left the call.
    pub fn remove_participant(&mut self, participant_id: &str) {
        self.publications.remove(participant_id);
        self.attachments.remove(participant_id);
    }

    /// Detach everything; the call ended.
    pub fn clear(&mut self) {
        self.publications.clear();
        self.attachments.clear();
    }

    /// Re-apply the user's desired device state to the engine.
    ///
    /// Called after every (re)connect: a newly established session may
    /// publish tracks before user intent is applied, so the engine is told
    /// explicitly rather than trusted to default correctly. Denied devices
    /// are reported back and left disabled; the call continues.
    pub async fn enforce_device_intent(
        engine: &dyn MediaEngine,
        selection: &DeviceSelection,
    ) -> Vec<PermissionError> {
        let mut denied = Vec::new();

        if let Err(e) = engine.set_microphone_enabled(selection.microphone_enabled).await {
            tracing::warn!("Could not apply microphone intent: {}", e);
            denied.push(e);
        }
        if let Err(e) = engine.set_camera_enabled(selection.camera_enabled).await {
            tracing::warn!("Could not apply camera intent: {}", e);
            denied.push(e);
        }

        denied
    }

    fn set_publication(
        &mut self,
        participants: &mut HashMap<ParticipantId, ParticipantTrackState>,
        participant_id: &str,
        kind: TrackKind,
        update: impl FnOnce(&mut Publication),
    ) -> bool {
        let pubs = self.publications.entry(participant_id.to_string()).or_default();
        let slot = pubs.entry(kind).or_default();
        let before = *slot;
        update(slot);
        let after = *slot;

        // Recompute derived state even on no-op updates so a roster entry
        // exists for participants whose tracks arrive before the join
        // notification.
        let entry = Self::roster_entry(participants, participant_id);
        let cam = pubs
            .get(&TrackKind::Video)
            .map(Publication::live)
            .unwrap_or(false);
        let mic = pubs
            .get(&TrackKind::Audio)
            .map(Publication::live)
            .unwrap_or(false);

        let changed = before != after || entry.cam_enabled != cam || entry.mic_enabled != mic;
        entry.cam_enabled = cam;
        entry.mic_enabled = mic;

        let output = if cam {
            RenderOutput::Video
        } else {
            RenderOutput::Placeholder
        };
        self.attachments.insert(participant_id.to_string(), output);

        changed
    }

    fn roster_entry<'a>(
        participants: &'a mut HashMap<ParticipantId, ParticipantTrackState>,
        participant_id: &str,
    ) -> &'a mut ParticipantTrackState {
        participants
            .entry(participant_id.to_string())
            .or_insert_with(|| ParticipantTrackState {
                participant_id: participant_id.to_string(),
                ..Default::default()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn published(pid: &str, kind: TrackKind) -> EngineEvent {
        EngineEvent::TrackPublished {
            participant_id: pid.into(),
            kind,
        }
    }

    fn unpublished(pid: &str, kind: TrackKind) -> EngineEvent {
        EngineEvent::TrackUnpublished {
            participant_id: pid.into(),
            kind,
        }
    }

    fn muted(pid: &str, kind: TrackKind) -> EngineEvent {
        EngineEvent::TrackMuted {
            participant_id: pid.into(),
            kind,
        }
    }

    fn unmuted(pid: &str, kind: TrackKind) -> EngineEvent {
        EngineEvent::TrackUnmuted {
            participant_id: pid.into(),
            kind,
        }
    }

    #[test]
    fn video_requires_published_and_unmuted() {
        let mut orch = TrackOrchestrator::new();
        let mut roster = HashMap::new();

        orch.apply(&mut roster, &published("p1", TrackKind::Video));
        assert!(roster["p1"].cam_enabled);
        assert_eq!(orch.render_output("p1"), RenderOutput::Video);

        orch.apply(&mut roster, &muted("p1", TrackKind::Video));
        assert!(!roster["p1"].cam_enabled);
        assert_eq!(orch.render_output("p1"), RenderOutput::Placeholder);

        orch.apply(&mut roster, &unmuted("p1", TrackKind::Video));
        assert!(roster["p1"].cam_enabled);
    }

    #[test]
    fn repeated_events_are_idempotent() {
        let mut orch = TrackOrchestrator::new();
        let mut roster = HashMap::new();

        assert!(orch.apply(&mut roster, &published("p1", TrackKind::Audio)));
        assert!(!orch.apply(&mut roster, &published("p1", TrackKind::Audio)));
        assert!(roster["p1"].mic_enabled);

        assert!(orch.apply(&mut roster, &unpublished("p1", TrackKind::Audio)));
        assert!(!orch.apply(&mut roster, &unpublished("p1", TrackKind::Audio)));
        assert!(!roster["p1"].mic_enabled);
    }

    #[test]
    fn converges_regardless_of_interleaving() {
        // Any interleaving ending in published+unmuted must converge to
        // cam_enabled=true; any ending in unpublished must converge to false.
        let sequences: Vec<Vec<EngineEvent>> = vec![
            vec![
                published("p", TrackKind::Video),
                muted("p", TrackKind::Video),
                unmuted("p", TrackKind::Video),
            ],
            vec![
                published("p", TrackKind::Video),
                unpublished("p", TrackKind::Video),
                published("p", TrackKind::Video),
            ],
            vec![
                muted("p", TrackKind::Video),
                published("p", TrackKind::Video),
                unmuted("p", TrackKind::Video),
            ],
        ];

        for seq in &sequences {
            let mut orch = TrackOrchestrator::new();
            let mut roster = HashMap::new();
            for ev in seq {
                orch.apply(&mut roster, ev);
            }
            assert!(roster["p"].cam_enabled, "sequence {:?}", seq);
        }

        let mut orch = TrackOrchestrator::new();
        let mut roster = HashMap::new();
        for ev in [
            published("p", TrackKind::Video),
            muted("p", TrackKind::Video),
            unpublished("p", TrackKind::Video),
        ] {
            orch.apply(&mut roster, &ev);
        }
        assert!(!roster["p"].cam_enabled);
        assert_eq!(orch.render_output("p"), RenderOutput::Placeholder);
    }

    #[test]
    fn unpublish_clears_stale_mute() {
        let mut orch = TrackOrchestrator::new();
        let mut roster = HashMap::new();

        orch.apply(&mut roster, &published("p", TrackKind::Video));
        orch.apply(&mut roster, &muted("p", TrackKind::Video));
        orch.apply(&mut roster, &unpublished("p", TrackKind::Video));
        // A fresh publish must not inherit the old mute flag.
        orch.apply(&mut roster, &published("p", TrackKind::Video));
        assert!(roster["p"].cam_enabled);
    }

    #[test]
    fn speaking_is_transient_and_idempotent() {
        let mut orch = TrackOrchestrator::new();
        let mut roster = HashMap::new();

        let speaking = EngineEvent::SpeakingChanged {
            participant_id: "p".into(),
            speaking: true,
        };
        assert!(orch.apply(&mut roster, &speaking));
        assert!(!orch.apply(&mut roster, &speaking));
        assert!(roster["p"].is_speaking);

        let silent = EngineEvent::SpeakingChanged {
            participant_id: "p".into(),
            speaking: false,
        };
        assert!(orch.apply(&mut roster, &silent));
        assert!(!roster["p"].is_speaking);
    }
}
