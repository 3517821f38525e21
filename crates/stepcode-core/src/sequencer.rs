//! Step sequencer: transport loop, tempo and live pattern swap
//!
//! The sequencer is driven by its host: `poll` is called periodically with the
//! current audio-clock time, and every tick that falls inside the lookahead
//! window is dispatched with its precomputed absolute time. Ticks are never
//! scheduled relative to each other; see [`StepClock`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::{AudioClock, StepClock};
use crate::compiler::compile;
use crate::dispatcher::{AudioBackend, Dispatcher};
use crate::display::DisplaySink;
use crate::error::{Result, StepcodeError};
use crate::pattern::{PatternSet, WrapPolicy};
use crate::transport::{Tempo, TransportState, TransportStatus};

/// Sequencer tuning, loadable from the app config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Steps per beat; 2 means one step per eighth note
    pub steps_per_beat: u32,
    /// How far ahead of the audio clock ticks are dispatched
    pub lookahead_secs: f64,
    /// How often the host should call `poll`
    pub poll_interval_ms: u64,
    pub wrap_policy: WrapPolicy,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            steps_per_beat: 2,
            lookahead_secs: 0.1,
            poll_interval_ms: 25,
            wrap_policy: WrapPolicy::Silent,
        }
    }
}

impl SequencerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// The running loop: timing grid plus the next tick not yet dispatched
#[derive(Debug)]
struct LoopHandle {
    id: u64,
    clock: StepClock,
    next_tick: u64,
    next_step: usize,
    /// Snapshot captured when the loop was scheduled
    patterns: Arc<PatternSet>,
    last_dispatched: Option<u64>,
}

impl LoopHandle {
    fn next_time(&self) -> f64 {
        self.clock.time_of(self.next_tick)
    }
}

/// A dispatched tick whose display notification is still pending
#[derive(Debug)]
struct StepNotice {
    loop_id: u64,
    time: f64,
    step: usize,
    patterns: Arc<PatternSet>,
}

/// Owns the transport state and the active pattern set
pub struct Sequencer {
    config: SequencerConfig,
    dispatcher: Dispatcher,
    state: TransportState,
    step: usize,
    tempo: Tempo,
    patterns: Arc<PatternSet>,
    staged: Option<Arc<PatternSet>>,
    handle: Option<LoopHandle>,
    next_loop_id: u64,
    notices: VecDeque<StepNotice>,
    sinks: Vec<Box<dyn DisplaySink>>,
}

impl std::fmt::Debug for Sequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequencer")
            .field("state", &self.state)
            .field("step", &self.step)
            .field("tempo", &self.tempo)
            .field("cycle_length", &self.patterns.cycle_length())
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new(SequencerConfig::default())
    }
}

impl Sequencer {
    pub fn new(config: SequencerConfig) -> Self {
        Self {
            dispatcher: Dispatcher::new(config.wrap_policy),
            config,
            state: TransportState::Stopped,
            step: 0,
            tempo: Tempo::default(),
            patterns: Arc::new(PatternSet::new()),
            staged: None,
            handle: None,
            next_loop_id: 0,
            notices: VecDeque::new(),
            sinks: Vec::new(),
        }
    }

    /// Register a display observer
    pub fn subscribe(&mut self, sink: Box<dyn DisplaySink>) {
        self.sinks.push(sink);
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    /// Next step to sound
    pub fn current_step(&self) -> usize {
        self.step
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    /// Pattern set currently playing (or last played)
    pub fn patterns(&self) -> &Arc<PatternSet> {
        &self.patterns
    }

    /// Edit waiting for the next start or resume
    pub fn staged_patterns(&self) -> Option<&Arc<PatternSet>> {
        self.staged.as_ref()
    }

    pub fn step_duration(&self) -> f64 {
        self.tempo.step_duration(self.config.steps_per_beat)
    }

    /// Compile `text` and install it; returns the compiled set
    pub fn submit_text(&mut self, text: &str, now: f64) -> Arc<PatternSet> {
        let patterns = Arc::new(compile(text));
        self.replace_patterns(patterns.clone(), now);
        patterns
    }

    /// Swap in a new pattern set. Live while running, staged otherwise.
    pub fn replace_patterns(&mut self, patterns: Arc<PatternSet>, now: f64) {
        for sink in &mut self.sinks {
            sink.on_pattern_set_changed(&patterns);
        }

        if self.state != TransportState::Running {
            debug!(state = ?self.state, cycle = patterns.cycle_length(), "Staging pattern set");
            self.staged = Some(patterns);
            return;
        }

        // The new loop takes over the old loop's next undispatched slot
        let slot = self
            .handle
            .as_ref()
            .map_or(now, |handle| handle.next_time().max(now));

        self.patterns = patterns;
        self.staged = None;
        self.handle = None;
        self.step = 0;

        if self.patterns.cycle_length() == 0 {
            debug!("Empty pattern set while running, loop idles");
            return;
        }

        self.install_loop(slot);
        debug!(slot, cycle = self.patterns.cycle_length(), "Live pattern swap");
    }

    /// Start from step 0. Waits on the audio activation gate first.
    pub fn start(&mut self, clock: &mut dyn AudioClock) -> Result<()> {
        if self.state != TransportState::Stopped {
            debug!(state = ?self.state, "Start ignored");
            return Ok(());
        }

        if let Some(staged) = self.staged.take() {
            self.patterns = staged;
        }

        if self.patterns.cycle_length() == 0 {
            warn!("Nothing to play");
            self.emit_status(TransportStatus::Stopped);
            return Err(StepcodeError::NothingToPlay);
        }

        if !clock.is_active() {
            self.emit_status(TransportStatus::WaitingForAudio);
            if let Err(e) = clock.activate() {
                warn!("Audio activation failed: {}", e);
                self.emit_status(TransportStatus::Stopped);
                return Err(e);
            }
        }

        self.step = 0;
        self.state = TransportState::Running;
        self.install_loop(clock.now());
        info!(bpm = self.tempo.bpm(), cycle = self.patterns.cycle_length(), "Transport started");
        self.emit_status(TransportStatus::Playing);
        Ok(())
    }

    /// Pause, keeping the step that would have sounded next
    pub fn pause(&mut self, now: f64, backend: &mut dyn AudioBackend) {
        if self.state != TransportState::Running {
            debug!(state = ?self.state, "Pause ignored");
            return;
        }

        self.step = self.void_pending(now, backend);
        self.state = TransportState::Paused;
        info!(step = self.step, "Transport paused");
        self.emit_status(TransportStatus::Paused);
    }

    /// Resume from the paused step, tempo-locked from `now`
    pub fn resume(&mut self, now: f64) -> Result<()> {
        if self.state != TransportState::Paused {
            debug!(state = ?self.state, "Resume ignored");
            return Ok(());
        }

        if let Some(staged) = self.staged.take() {
            self.patterns = staged;
            self.step = 0;
        }

        let cycle = self.patterns.cycle_length();
        if cycle == 0 {
            warn!("Nothing to play, staying paused");
            return Err(StepcodeError::NothingToPlay);
        }

        self.step %= cycle;
        self.state = TransportState::Running;
        self.install_loop(now);
        info!(step = self.step, "Transport resumed");
        self.emit_status(TransportStatus::Playing);
        Ok(())
    }

    /// Stop from any state and rewind to step 0
    pub fn stop(&mut self, now: f64, backend: &mut dyn AudioBackend) {
        self.void_pending(now, backend);
        self.step = 0;
        self.state = TransportState::Stopped;
        info!("Transport stopped");
        self.emit_status(TransportStatus::Stopped);
    }

    /// Change tempo. Ticks already dispatched keep their times.
    pub fn set_tempo(&mut self, bpm: f64) {
        self.tempo = Tempo::new(bpm);
        let duration = self.step_duration();

        if let Some(handle) = &mut self.handle {
            let pivot = handle.last_dispatched.unwrap_or(handle.next_tick);
            handle.clock.retempo(pivot, duration);
            debug!(bpm = self.tempo.bpm(), next = handle.next_time(), "Tempo changed");
        }
    }

    /// Dispatch ticks inside the lookahead window and deliver due notifications
    pub fn poll(&mut self, now: f64, backend: &mut dyn AudioBackend) {
        if self.state == TransportState::Running {
            let horizon = now + self.config.lookahead_secs;

            if let Some(handle) = &mut self.handle {
                Self::skip_missed(handle, now - self.config.lookahead_secs);
            }

            while let Some(handle) = &mut self.handle {
                let time = handle.next_time();
                if time >= horizon {
                    break;
                }

                let step = handle.next_step;
                self.dispatcher
                    .dispatch(step, time, &handle.patterns, handle.clock.step_duration(), backend);
                self.notices.push_back(StepNotice {
                    loop_id: handle.id,
                    time,
                    step,
                    patterns: handle.patterns.clone(),
                });

                handle.last_dispatched = Some(handle.next_tick);
                handle.next_tick += 1;
                handle.next_step = (step + 1) % handle.patterns.cycle_length();
                self.step = handle.next_step;
            }
        }

        self.deliver_notices(now);
    }

    /// Move past ticks that are already older than `deadline`, keeping the grid
    fn skip_missed(handle: &mut LoopHandle, deadline: f64) {
        let step_duration = handle.clock.step_duration();
        let late = deadline - handle.next_time();
        if late <= 0.0 || step_duration <= 0.0 {
            return;
        }

        let mut skipped = (late / step_duration).ceil() as u64;
        while handle.clock.time_of(handle.next_tick + skipped) < deadline {
            skipped += 1;
        }
        while skipped > 0 && handle.clock.time_of(handle.next_tick + skipped - 1) >= deadline {
            skipped -= 1;
        }
        if skipped == 0 {
            return;
        }

        let cycle = handle.patterns.cycle_length();
        handle.next_tick += skipped;
        handle.next_step = (handle.next_step + (skipped % cycle as u64) as usize) % cycle;
        debug!(loop_id = handle.id, skipped, next = handle.next_time(), "Skipped missed ticks");
    }

    fn install_loop(&mut self, time: f64) {
        let id = self.next_loop_id;
        self.next_loop_id += 1;
        self.handle = Some(LoopHandle {
            id,
            clock: StepClock::anchored(0, time, self.step_duration()),
            next_tick: 0,
            next_step: self.step,
            patterns: self.patterns.clone(),
            last_dispatched: None,
        });
        debug!(loop_id = id, time, step = self.step, "Loop scheduled");
    }

    /// Drop the loop and every tick not yet heard; returns the first voided step
    fn void_pending(&mut self, now: f64, backend: &mut dyn AudioBackend) -> usize {
        self.deliver_notices(now);

        // Ticks voided from a swapped-out loop do not count
        let resume_step = match self.handle.take() {
            Some(handle) => {
                debug!(loop_id = handle.id, voided = self.notices.len(), "Loop released");
                self.notices
                    .iter()
                    .find(|notice| notice.loop_id == handle.id)
                    .map_or(handle.next_step, |notice| notice.step)
            }
            None => self.step,
        };
        self.notices.clear();
        backend.cancel_after(now);
        resume_step
    }

    fn deliver_notices(&mut self, now: f64) {
        while self.notices.front().is_some_and(|notice| notice.time <= now) {
            let Some(notice) = self.notices.pop_front() else { break };
            for sink in &mut self.sinks {
                sink.on_step_advance(notice.step, &notice.patterns);
            }
        }
    }

    fn emit_status(&mut self, status: TransportStatus) {
        for sink in &mut self.sinks {
            sink.on_transport_status(status);
        }
    }
}
