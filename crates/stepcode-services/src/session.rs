//! Live session: runs the sequencer on its own thread against an audio output

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryIter};
use stepcode_core::{
    AudioBackend, AudioClock, DisplayEvent, DisplaySink, PatternSet, Sequencer, SequencerConfig,
    StepcodeError, TransportStatus,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::audio_engine::{AudioEngine, EngineState};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to spawn session thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Session thread has exited")]
    Disconnected,
}

/// Requests from the editor and transport controls
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    Start,
    Pause,
    Resume,
    Stop,
    SetTempo(f64),
    SetVolume(f64),
    SubmitText(String),
    Shutdown,
}

/// Everything the session reports back to the UI
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Display(DisplayEvent),
    /// A start or resume was refused
    Rejected(StepcodeError),
}

/// Forwards sequencer notifications onto the session event channel
struct ChannelSink(Sender<SessionEvent>);

impl ChannelSink {
    fn forward(&self, event: DisplayEvent) {
        let _ = self.0.send(SessionEvent::Display(event));
    }
}

impl DisplaySink for ChannelSink {
    fn on_step_advance(&mut self, step: usize, patterns: &Arc<PatternSet>) {
        self.forward(DisplayEvent::StepAdvance { step, patterns: patterns.clone() });
    }

    fn on_pattern_set_changed(&mut self, patterns: &Arc<PatternSet>) {
        self.forward(DisplayEvent::PatternSetChanged(patterns.clone()));
    }

    fn on_transport_status(&mut self, status: TransportStatus) {
        self.forward(DisplayEvent::TransportStatus(status));
    }
}

/// Clock and backend the session thread plays through
pub struct SessionOutput {
    pub clock: Box<dyn AudioClock>,
    pub backend: Box<dyn AudioBackend>,
}

/// Handle to a running session thread
pub struct LiveSession {
    commands: Sender<ControlCommand>,
    events: Receiver<SessionEvent>,
    engine_state: Option<Arc<EngineState>>,
    thread: Option<JoinHandle<()>>,
}

impl LiveSession {
    /// Session on the default output device; the device opens on first start
    pub fn spawn(config: SequencerConfig, volume_db: f64) -> Result<Self, SessionError> {
        let (state_tx, state_rx) = bounded(1);
        let mut session = Self::spawn_with(config, move || {
            let engine = AudioEngine::new();
            let _ = state_tx.send(engine.state());
            let backend = engine.backend();
            SessionOutput { clock: Box::new(engine), backend: Box::new(backend) }
        })?;
        session.engine_state = state_rx.recv().ok();
        session.send(ControlCommand::SetVolume(volume_db))?;
        Ok(session)
    }

    /// Session on a custom output, built on the session thread
    pub fn spawn_with<F>(config: SequencerConfig, make_output: F) -> Result<Self, SessionError>
    where
        F: FnOnce() -> SessionOutput + Send + 'static,
    {
        let (commands_tx, commands_rx) = unbounded();
        let (events_tx, events_rx) = unbounded();

        let thread = thread::Builder::new()
            .name("stepcode-session".into())
            .spawn(move || {
                let output = make_output();
                Self::run(config, output, commands_rx, events_tx);
            })?;

        Ok(Self {
            commands: commands_tx,
            events: events_rx,
            engine_state: None,
            thread: Some(thread),
        })
    }

    fn run(
        config: SequencerConfig,
        output: SessionOutput,
        commands: Receiver<ControlCommand>,
        events: Sender<SessionEvent>,
    ) {
        let SessionOutput { mut clock, mut backend } = output;
        let poll_interval = config.poll_interval();
        let mut sequencer = Sequencer::new(config);
        sequencer.subscribe(Box::new(ChannelSink(events.clone())));
        info!(poll_ms = poll_interval.as_millis() as u64, "Session thread running");

        loop {
            match commands.recv_timeout(poll_interval) {
                Ok(ControlCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                    sequencer.stop(clock.now(), backend.as_mut());
                    break;
                }
                Ok(command) => {
                    if let Err(e) = Self::apply(&mut sequencer, command, clock.as_mut(), backend.as_mut()) {
                        warn!("Command refused: {}", e);
                        let _ = events.send(SessionEvent::Rejected(e));
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
            }

            sequencer.poll(clock.now(), backend.as_mut());
        }

        info!("Session thread exiting");
    }

    fn apply(
        sequencer: &mut Sequencer,
        command: ControlCommand,
        clock: &mut dyn AudioClock,
        backend: &mut dyn AudioBackend,
    ) -> stepcode_core::Result<()> {
        debug!(?command, "Session command");
        match command {
            ControlCommand::Start => sequencer.start(clock)?,
            ControlCommand::Pause => sequencer.pause(clock.now(), backend),
            ControlCommand::Resume => sequencer.resume(clock.now())?,
            ControlCommand::Stop => sequencer.stop(clock.now(), backend),
            ControlCommand::SetTempo(bpm) => sequencer.set_tempo(bpm),
            ControlCommand::SetVolume(db) => backend.set_master_volume(db),
            ControlCommand::SubmitText(text) => {
                sequencer.submit_text(&text, clock.now());
            }
            ControlCommand::Shutdown => {}
        }
        Ok(())
    }

    pub fn send(&self, command: ControlCommand) -> Result<(), SessionError> {
        self.commands.send(command).map_err(|_| SessionError::Disconnected)
    }

    pub fn start(&self) -> Result<(), SessionError> {
        self.send(ControlCommand::Start)
    }

    pub fn pause(&self) -> Result<(), SessionError> {
        self.send(ControlCommand::Pause)
    }

    pub fn resume(&self) -> Result<(), SessionError> {
        self.send(ControlCommand::Resume)
    }

    pub fn stop(&self) -> Result<(), SessionError> {
        self.send(ControlCommand::Stop)
    }

    pub fn set_tempo(&self, bpm: f64) -> Result<(), SessionError> {
        self.send(ControlCommand::SetTempo(bpm))
    }

    pub fn set_volume(&self, db: f64) -> Result<(), SessionError> {
        self.send(ControlCommand::SetVolume(db))
    }

    pub fn submit_text(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.send(ControlCommand::SubmitText(text.into()))
    }

    /// Events received so far, without blocking
    pub fn events(&self) -> TryIter<'_, SessionEvent> {
        self.events.try_iter()
    }

    pub fn recv_event_timeout(&self, timeout: Duration) -> Option<SessionEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    /// Output meters; `None` for custom outputs
    pub fn engine_state(&self) -> Option<&Arc<EngineState>> {
        self.engine_state.as_ref()
    }

    /// Stop playback and join the session thread
    pub fn shutdown(mut self) {
        self.join();
    }

    fn join(&mut self) {
        let Some(thread) = self.thread.take() else { return };
        let _ = self.commands.send(ControlCommand::Shutdown);
        if thread.join().is_err() {
            warn!("Session thread panicked");
        }
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Instant;

    use stepcode_core::{BackendCall, RecordingBackend, TrackId};

    const WAIT: Duration = Duration::from_secs(2);

    /// Wall-clock time since creation, shareable with the test body
    #[derive(Clone)]
    struct WallClock {
        origin: Instant,
        active: bool,
    }

    impl AudioClock for WallClock {
        fn now(&self) -> f64 {
            self.origin.elapsed().as_secs_f64()
        }

        fn is_active(&self) -> bool {
            self.active
        }

        fn activate(&mut self) -> stepcode_core::Result<()> {
            self.active = true;
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct SharedBackend(Arc<Mutex<RecordingBackend>>);

    impl SharedBackend {
        fn calls(&self) -> Vec<BackendCall> {
            self.0.lock().map(|b| b.calls.clone()).unwrap_or_default()
        }
    }

    impl AudioBackend for SharedBackend {
        fn trigger_percussion(&mut self, hit: &str, time: f64) {
            if let Ok(mut b) = self.0.lock() {
                b.trigger_percussion(hit, time);
            }
        }

        fn trigger_melodic(&mut self, track: TrackId, pitch: &str, duration: f64, time: f64) {
            if let Ok(mut b) = self.0.lock() {
                b.trigger_melodic(track, pitch, duration, time);
            }
        }

        fn set_master_volume(&mut self, db: f64) {
            if let Ok(mut b) = self.0.lock() {
                b.set_master_volume(db);
            }
        }

        fn cancel_after(&mut self, time: f64) {
            if let Ok(mut b) = self.0.lock() {
                b.cancel_after(time);
            }
        }
    }

    fn session() -> (LiveSession, SharedBackend) {
        let backend = SharedBackend::default();
        let output_backend = backend.clone();
        let session = LiveSession::spawn_with(SequencerConfig::default(), move || SessionOutput {
            clock: Box::new(WallClock { origin: Instant::now(), active: false }),
            backend: Box::new(output_backend),
        })
        .unwrap();
        (session, backend)
    }

    fn wait_for<F>(session: &LiveSession, mut matches: F) -> Option<SessionEvent>
    where
        F: FnMut(&SessionEvent) -> bool,
    {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            let Some(event) = session.recv_event_timeout(Duration::from_millis(50)) else {
                continue;
            };
            if matches(&event) {
                return Some(event);
            }
        }
        None
    }

    fn is_status(event: &SessionEvent, status: TransportStatus) -> bool {
        *event == SessionEvent::Display(DisplayEvent::TransportStatus(status))
    }

    #[test]
    fn test_start_without_patterns_is_rejected() {
        let (session, _) = session();
        session.start().unwrap();
        let event = wait_for(&session, |e| matches!(e, SessionEvent::Rejected(_)));
        assert_eq!(event, Some(SessionEvent::Rejected(StepcodeError::NothingToPlay)));
    }

    #[test]
    fn test_session_plays_and_highlights_steps() {
        let (session, backend) = session();
        session.submit_text("drums: kick snare").unwrap();
        session.set_tempo(200.0).unwrap();
        session.start().unwrap();

        assert!(wait_for(&session, |e| is_status(e, TransportStatus::Playing)).is_some());
        let advanced = wait_for(&session, |e| {
            matches!(e, SessionEvent::Display(DisplayEvent::StepAdvance { step: 1, .. }))
        });
        assert!(advanced.is_some());

        session.stop().unwrap();
        assert!(wait_for(&session, |e| is_status(e, TransportStatus::Stopped)).is_some());

        let hits: Vec<String> = backend
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::Percussion { hit, .. } => Some(hit),
                _ => None,
            })
            .collect();
        assert_eq!(hits[..2], ["kick".to_string(), "snare".to_string()]);
        session.shutdown();
    }

    #[test]
    fn test_volume_reaches_backend() {
        let (session, backend) = session();
        session.set_volume(-6.0).unwrap();
        session.submit_text("bass: C2").unwrap();
        // Round-trip through the thread
        assert!(wait_for(&session, |e| {
            matches!(e, SessionEvent::Display(DisplayEvent::PatternSetChanged(_)))
        })
        .is_some());
        assert!(backend.calls().contains(&BackendCall::MasterVolume(-6.0)));
    }

    #[test]
    fn test_send_after_shutdown_fails() {
        let (session, _) = session();
        let commands = session.commands.clone();
        session.shutdown();
        assert!(commands.send(ControlCommand::Start).is_err());
    }
}
