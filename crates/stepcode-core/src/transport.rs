//! Transport state and tempo

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Sequencer playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransportState {
    #[default]
    Stopped,
    Running,
    Paused,
}

/// Status reported to display sinks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportStatus {
    Playing,
    Paused,
    Stopped,
    /// Start requested, audio context still activating
    WaitingForAudio,
}

impl From<TransportState> for TransportStatus {
    fn from(state: TransportState) -> Self {
        match state {
            TransportState::Stopped => Self::Stopped,
            TransportState::Running => Self::Playing,
            TransportState::Paused => Self::Paused,
        }
    }
}

/// Tempo in beats per minute, always within [`Tempo::MIN`]..=[`Tempo::MAX`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tempo(f64);

impl Tempo {
    pub const MIN: f64 = 60.0;
    pub const MAX: f64 = 200.0;

    /// Clamp into range; out-of-range requests are logged, never rejected
    pub fn new(bpm: f64) -> Self {
        if !bpm.is_finite() {
            warn!(bpm, "Ignoring non-finite tempo");
            return Self::default();
        }
        let clamped = bpm.clamp(Self::MIN, Self::MAX);
        if clamped != bpm {
            warn!(requested = bpm, applied = clamped, "Tempo out of range");
        }
        Self(clamped)
    }

    pub fn bpm(self) -> f64 {
        self.0
    }

    /// Seconds per step when a beat is split into `steps_per_beat` steps
    pub fn step_duration(self, steps_per_beat: u32) -> f64 {
        60.0 / self.0 / steps_per_beat.max(1) as f64
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self(120.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tempo_clamps() {
        assert_eq!(Tempo::new(30.0).bpm(), 60.0);
        assert_eq!(Tempo::new(500.0).bpm(), 200.0);
        assert_eq!(Tempo::new(128.0).bpm(), 128.0);
        assert_eq!(Tempo::new(f64::NAN).bpm(), 120.0);
    }

    #[test]
    fn test_eighth_note_duration() {
        // 120 BPM: beat = 0.5s, eighth = 0.25s
        assert_eq!(Tempo::new(120.0).step_duration(2), 0.25);
        assert_eq!(Tempo::new(60.0).step_duration(2), 0.5);
        assert_eq!(Tempo::new(60.0).step_duration(4), 0.25);
    }
}
