//! Playback backend that turns step triggers into engine notes

use std::sync::Arc;

use crossbeam_channel::Sender;
use stepcode_core::{AudioBackend, DrumHit, Pitch, TrackId};
use tracing::{debug, warn};

use crate::audio_engine::{EngineCommand, EngineState, ScheduledNote};
use crate::instruments::NoteEvent;

/// Master volume range in dB
pub const MIN_VOLUME_DB: f64 = -40.0;
pub const MAX_VOLUME_DB: f64 = 0.0;

/// [`AudioBackend`] for [`crate::AudioEngine`]
#[derive(Clone)]
pub struct EngineBackend {
    commands: Sender<EngineCommand>,
    state: Arc<EngineState>,
}

impl std::fmt::Debug for EngineBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBackend")
            .field("queued", &self.commands.len())
            .finish()
    }
}

impl EngineBackend {
    pub(crate) fn new(commands: Sender<EngineCommand>, state: Arc<EngineState>) -> Self {
        Self { commands, state }
    }

    fn send(&self, command: EngineCommand) {
        if self.commands.send(command).is_err() {
            warn!("Audio engine gone, dropping {:?}", command);
        }
    }

    fn schedule(&self, track: TrackId, note: NoteEvent, time: f64) {
        let frame = self.state.frame_at(time);
        self.send(EngineCommand::Schedule(ScheduledNote { frame, track, note }));
    }
}

impl AudioBackend for EngineBackend {
    fn trigger_percussion(&mut self, hit: &str, time: f64) {
        let Some(hit) = DrumHit::from_name(hit) else {
            debug!(hit, "Unknown drum hit, skipped");
            return;
        };
        self.schedule(TrackId::Drums, NoteEvent::Hit(hit), time);
    }

    fn trigger_melodic(&mut self, track: TrackId, pitch: &str, duration: f64, time: f64) {
        let Some(parsed) = Pitch::parse(pitch) else {
            debug!(%track, pitch, "Unparseable pitch, skipped");
            return;
        };
        let duration_frames = (duration.max(0.0) * self.state.sample_rate() as f64).round() as u32;
        let note = NoteEvent::Tone { frequency: parsed.frequency(), duration_frames };
        self.schedule(track, note, time);
    }

    fn set_master_volume(&mut self, db: f64) {
        if db.is_nan() {
            warn!("Ignoring NaN volume");
            return;
        }
        let clamped = db.clamp(MIN_VOLUME_DB, MAX_VOLUME_DB);
        if clamped != db {
            warn!(requested = db, applied = clamped, "Volume out of range");
        }
        let db = clamped;
        let gain = fundsp::hacker::db_amp(db as f32);
        self.state.set_master_gain(gain);
        debug!(db, gain, "Master volume");
    }

    fn cancel_after(&mut self, time: f64) {
        self.send(EngineCommand::CancelAfter(self.state.frame_at(time)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AudioEngine;

    fn queued(engine_rx: &crossbeam_channel::Receiver<EngineCommand>) -> Vec<EngineCommand> {
        engine_rx.try_iter().collect()
    }

    fn rig() -> (EngineBackend, crossbeam_channel::Receiver<EngineCommand>, Arc<EngineState>) {
        let engine = AudioEngine::new();
        let state = engine.state();
        let (tx, rx) = crossbeam_channel::unbounded();
        (EngineBackend::new(tx, state.clone()), rx, state)
    }

    #[test]
    fn test_percussion_schedules_frame() {
        let (mut backend, rx, _) = rig();
        backend.trigger_percussion("hihat", 0.5);
        assert_eq!(
            queued(&rx),
            vec![EngineCommand::Schedule(ScheduledNote {
                frame: 22_050,
                track: TrackId::Drums,
                note: NoteEvent::Hit(DrumHit::HiHat),
            })]
        );
    }

    #[test]
    fn test_unknown_tokens_make_no_sound() {
        let (mut backend, rx, _) = rig();
        backend.trigger_percussion("banana", 0.0);
        backend.trigger_percussion("Kick", 0.0);
        backend.trigger_melodic(TrackId::Bass, "H2", 0.25, 0.0);
        backend.trigger_melodic(TrackId::Synth, "C9", 0.25, 0.0);
        assert!(queued(&rx).is_empty());
    }

    #[test]
    fn test_melodic_carries_pitch_and_length() {
        let (mut backend, rx, _) = rig();
        backend.trigger_melodic(TrackId::Synth, "a4", 0.25, 1.0);
        let commands = queued(&rx);
        let [EngineCommand::Schedule(note)] = commands.as_slice() else {
            panic!("expected one note, got {:?}", commands);
        };
        assert_eq!(note.frame, 44_100);
        assert_eq!(note.track, TrackId::Synth);
        assert_eq!(note.note, NoteEvent::Tone { frequency: 440.0, duration_frames: 11_025 });
    }

    #[test]
    fn test_volume_is_clamped() {
        let (mut backend, _, state) = rig();
        backend.set_master_volume(12.0);
        assert_eq!(state.master_gain(), 1.0);
        backend.set_master_volume(-100.0);
        assert!((state.master_gain() - 0.01).abs() < 1e-4);
    }

    #[test]
    fn test_cancel_after_uses_frames() {
        let (mut backend, rx, _) = rig();
        backend.cancel_after(0.25);
        assert_eq!(queued(&rx), vec![EngineCommand::CancelAfter(11_025)]);
    }
}
