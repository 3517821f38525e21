//! Per-step playback dispatch

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::pattern::{PatternSet, StepToken, WrapPolicy};
use crate::track::TrackId;

/// Sound output the dispatcher drives. Rests never reach it.
pub trait AudioBackend {
    /// Fire a drum hit at an absolute audio time
    fn trigger_percussion(&mut self, hit: &str, time: f64);
    /// Play a pitch on a melodic track for `duration` seconds
    fn trigger_melodic(&mut self, track: TrackId, pitch: &str, duration: f64, time: f64);
    /// Master output level in decibels
    fn set_master_volume(&mut self, db: f64);
    /// Drop every event scheduled after `time` that has not sounded yet
    fn cancel_after(&mut self, _time: f64) {}
}

/// Maps a step of a pattern set onto backend triggers
#[derive(Debug, Clone, Copy, Default)]
pub struct Dispatcher {
    policy: WrapPolicy,
}

impl Dispatcher {
    pub fn new(policy: WrapPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> WrapPolicy {
        self.policy
    }

    /// Trigger every non-rest token at `step`; returns the number of triggers
    pub fn dispatch(
        &self,
        step: usize,
        time: f64,
        patterns: &PatternSet,
        note_duration: f64,
        backend: &mut dyn AudioBackend,
    ) -> usize {
        let mut fired = 0;
        for (track, pattern) in patterns.iter() {
            let Some(StepToken::Play(token)) = pattern.token_at(step, self.policy) else {
                continue;
            };
            trace!(%track, step, token = %token, time, "Trigger");
            if track.is_percussion() {
                backend.trigger_percussion(token, time);
            } else {
                backend.trigger_melodic(track, token, note_duration, time);
            }
            fired += 1;
        }
        fired
    }
}

/// A backend call captured by [`RecordingBackend`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BackendCall {
    Percussion { hit: String, time: f64 },
    Melodic { track: TrackId, pitch: String, duration: f64, time: f64 },
    MasterVolume(f64),
    CancelAfter(f64),
}

impl BackendCall {
    /// Scheduled time of a trigger call
    pub fn trigger_time(&self) -> Option<f64> {
        match self {
            Self::Percussion { time, .. } | Self::Melodic { time, .. } => Some(*time),
            Self::MasterVolume(_) | Self::CancelAfter(_) => None,
        }
    }
}

/// Backend that records calls instead of making sound
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    pub calls: Vec<BackendCall>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only the note/hit triggers, in call order
    pub fn triggers(&self) -> impl Iterator<Item = &BackendCall> {
        self.calls.iter().filter(|call| call.trigger_time().is_some())
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

impl AudioBackend for RecordingBackend {
    fn trigger_percussion(&mut self, hit: &str, time: f64) {
        self.calls.push(BackendCall::Percussion { hit: hit.to_string(), time });
    }

    fn trigger_melodic(&mut self, track: TrackId, pitch: &str, duration: f64, time: f64) {
        self.calls.push(BackendCall::Melodic { track, pitch: pitch.to_string(), duration, time });
    }

    fn set_master_volume(&mut self, db: f64) {
        self.calls.push(BackendCall::MasterVolume(db));
    }

    fn cancel_after(&mut self, time: f64) {
        self.calls.push(BackendCall::CancelAfter(time));
    }
}
