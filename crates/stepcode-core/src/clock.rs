//! Audio clock abstraction and absolute tick timing

use crate::error::{Result, StepcodeError};

/// Host audio clock the sequencer is locked to
pub trait AudioClock {
    /// Current audio time in seconds
    fn now(&self) -> f64;
    /// Whether the audio context has been activated
    fn is_active(&self) -> bool;
    /// One-time activation gate; must succeed before the first start
    fn activate(&mut self) -> Result<()>;
}

/// Maps tick numbers to absolute audio times.
///
/// A tick's time is always `anchor_time + (tick - anchor_tick) * step_duration`,
/// so long loops never accumulate per-step rounding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepClock {
    anchor_time: f64,
    anchor_tick: u64,
    step_duration: f64,
}

impl StepClock {
    /// Clock whose tick `tick` falls at `time`
    pub fn anchored(tick: u64, time: f64, step_duration: f64) -> Self {
        Self { anchor_time: time, anchor_tick: tick, step_duration }
    }

    pub fn time_of(&self, tick: u64) -> f64 {
        let offset = tick.saturating_sub(self.anchor_tick);
        self.anchor_time + offset as f64 * self.step_duration
    }

    pub fn step_duration(&self) -> f64 {
        self.step_duration
    }

    /// Keep `tick` where it is and space every later tick by `step_duration`
    pub fn retempo(&mut self, tick: u64, step_duration: f64) {
        let time = self.time_of(tick);
        *self = Self::anchored(tick, time, step_duration);
    }
}

/// Clock advanced by hand; used for offline runs and tests
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: f64,
    active: bool,
    refuse_activation: Option<String>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clock whose activation always fails with `reason`
    pub fn refusing(reason: impl Into<String>) -> Self {
        Self { refuse_activation: Some(reason.into()), ..Self::default() }
    }

    pub fn set(&mut self, now: f64) {
        self.now = now;
    }

    pub fn advance(&mut self, secs: f64) {
        self.now += secs;
    }
}

impl AudioClock for ManualClock {
    fn now(&self) -> f64 {
        self.now
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn activate(&mut self) -> Result<()> {
        if let Some(reason) = &self.refuse_activation {
            return Err(StepcodeError::AudioInactive(reason.clone()));
        }
        self.active = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_of_is_absolute() {
        let clock = StepClock::anchored(0, 1.0, 0.25);
        assert_eq!(clock.time_of(0), 1.0);
        assert_eq!(clock.time_of(4), 2.0);
        // One hour of eighths at 120 BPM lands exactly on the grid
        assert_eq!(clock.time_of(14_400), 3601.0);
    }

    #[test]
    fn test_no_drift_against_accumulation() {
        let step = 60.0 / 133.0 / 2.0;
        let clock = StepClock::anchored(0, 0.0, step);
        let ticks = 100_000u64;
        assert_eq!(clock.time_of(ticks), ticks as f64 * step);
    }

    #[test]
    fn test_retempo_keeps_anchor_tick() {
        let mut clock = StepClock::anchored(0, 0.0, 0.25);
        clock.retempo(3, 0.5);
        assert_eq!(clock.time_of(3), 0.75);
        assert_eq!(clock.time_of(4), 1.25);
        assert_eq!(clock.step_duration(), 0.5);
    }

    #[test]
    fn test_manual_clock_activation() {
        let mut clock = ManualClock::new();
        assert!(!clock.is_active());
        clock.activate().unwrap();
        assert!(clock.is_active());

        let mut refusing = ManualClock::refusing("no device");
        assert_eq!(refusing.activate(), Err(StepcodeError::AudioInactive("no device".into())));
        assert!(!refusing.is_active());
    }
}
