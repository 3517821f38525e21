//! Audio engine: sample-accurate note scheduling on the output stream

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use stepcode_core::{AudioClock, StepcodeError, TrackId};
use thiserror::Error;
use tracing::{debug, info, trace};

use crate::audio_io::{AudioOutputError, RealtimeOutputStream};
use crate::engine_backend::EngineBackend;
use crate::instruments::{AudioInstrument, DrumKit, MonoSynth, NoteEvent, SynthPreset, MAX_BLOCK_SIZE};

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

#[derive(Debug, Error)]
pub enum AudioEngineError {
    #[error("Audio output error: {0}")]
    Output(#[from] AudioOutputError),
    #[error("Engine already running")]
    AlreadyRunning,
    #[error("Engine not running")]
    NotRunning,
}

/// State shared between the control thread and the audio callback
pub struct EngineState {
    /// Frames rendered since the stream opened; the audio clock
    pub frames_rendered: AtomicU64,
    pub sample_rate: AtomicU32,
    pub running: AtomicBool,
    master_gain_raw: AtomicU32,
    peak_raw: AtomicU32,
}

impl EngineState {
    fn new() -> Self {
        Self {
            frames_rendered: AtomicU64::new(0),
            sample_rate: AtomicU32::new(DEFAULT_SAMPLE_RATE),
            running: AtomicBool::new(false),
            master_gain_raw: AtomicU32::new(1.0f32.to_bits()),
            peak_raw: AtomicU32::new(0),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::SeqCst)
    }

    /// Audio clock time in seconds
    pub fn now(&self) -> f64 {
        self.frames_rendered.load(Ordering::SeqCst) as f64 / self.sample_rate() as f64
    }

    /// Absolute frame for an audio clock time
    pub fn frame_at(&self, time: f64) -> u64 {
        (time.max(0.0) * self.sample_rate() as f64).round() as u64
    }

    pub fn master_gain(&self) -> f32 {
        f32::from_bits(self.master_gain_raw.load(Ordering::Relaxed))
    }

    pub fn set_master_gain(&self, gain: f32) {
        self.master_gain_raw.store(gain.to_bits(), Ordering::Relaxed);
    }

    /// Peak of the last rendered block, after master gain
    pub fn peak(&self) -> f32 {
        f32::from_bits(self.peak_raw.load(Ordering::Relaxed))
    }
}

/// A note bound to an absolute output frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledNote {
    pub frame: u64,
    pub track: TrackId,
    pub note: NoteEvent,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineCommand {
    Schedule(ScheduledNote),
    /// Drop queued notes later than this frame
    CancelAfter(u64),
}

/// Owned by the audio callback
pub(crate) struct Renderer {
    state: Arc<EngineState>,
    commands: Receiver<EngineCommand>,
    queue: Vec<ScheduledNote>,
    drums: DrumKit,
    bass: MonoSynth,
    synth: MonoSynth,
    mix: Vec<f32>,
    sample_rate: u32,
}

impl Renderer {
    fn new(state: Arc<EngineState>, commands: Receiver<EngineCommand>) -> Self {
        let sample_rate = state.sample_rate();
        let rate = sample_rate as f32;
        Self {
            state,
            commands,
            queue: Vec::new(),
            drums: DrumKit::new(rate),
            bass: MonoSynth::new(SynthPreset::bass(), rate),
            synth: MonoSynth::new(SynthPreset::lead(), rate),
            mix: vec![0.0; MAX_BLOCK_SIZE],
            sample_rate,
        }
    }

    fn instrument(&mut self, track: TrackId) -> &mut dyn AudioInstrument {
        match track {
            TrackId::Drums => &mut self.drums,
            TrackId::Bass => &mut self.bass,
            TrackId::Synth => &mut self.synth,
        }
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                EngineCommand::Schedule(note) => self.queue.push(note),
                EngineCommand::CancelAfter(frame) => {
                    let before = self.queue.len();
                    self.queue.retain(|note| note.frame <= frame);
                    trace!(frame, dropped = before - self.queue.len(), "Cancelled queued notes");
                }
            }
        }
    }

    /// Fill an interleaved buffer; called from the audio thread
    pub(crate) fn render(&mut self, buffer: &mut [f32], sample_rate: u32, channels: u16) {
        if sample_rate != self.sample_rate {
            self.sample_rate = sample_rate;
            for track in TrackId::ALL {
                self.instrument(track).set_sample_rate(sample_rate as f32);
            }
        }

        self.drain_commands();

        let channels = channels.max(1) as usize;
        let gain = self.state.master_gain();
        let mut peak = 0.0f32;

        for chunk in buffer.chunks_mut(MAX_BLOCK_SIZE * channels) {
            let frames = chunk.len() / channels;
            let block_start = self.state.frames_rendered.load(Ordering::SeqCst);
            let block_end = block_start + frames as u64;

            // Notes already in the past play at the top of the block
            let mut index = 0;
            while index < self.queue.len() {
                if self.queue[index].frame >= block_end {
                    index += 1;
                    continue;
                }
                let note = self.queue.swap_remove(index);
                let offset = note.frame.saturating_sub(block_start) as u32;
                self.instrument(note.track).queue_note(note.note, offset);
            }

            self.mix[..frames].fill(0.0);
            for track in TrackId::ALL {
                let out = match track {
                    TrackId::Drums => self.drums.process(frames),
                    TrackId::Bass => self.bass.process(frames),
                    TrackId::Synth => self.synth.process(frames),
                };
                for (sum, sample) in self.mix.iter_mut().zip(out) {
                    *sum += sample;
                }
            }

            for (frame, sample) in chunk.chunks_mut(channels).zip(&self.mix) {
                let out = sample * gain;
                peak = peak.max(out.abs());
                frame.fill(out);
            }

            self.state.frames_rendered.store(block_end, Ordering::SeqCst);
        }

        self.state.peak_raw.store(peak.to_bits(), Ordering::Relaxed);
    }
}

/// Output engine for the live session
pub struct AudioEngine {
    state: Arc<EngineState>,
    stream: Option<RealtimeOutputStream>,
    commands_tx: Sender<EngineCommand>,
    commands_rx: Receiver<EngineCommand>,
}

impl Default for AudioEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEngine {
    pub fn new() -> Self {
        let (commands_tx, commands_rx) = unbounded();
        Self {
            state: Arc::new(EngineState::new()),
            stream: None,
            commands_tx,
            commands_rx,
        }
    }

    /// Shared state for meters and the clock
    pub fn state(&self) -> Arc<EngineState> {
        self.state.clone()
    }

    /// Playback backend feeding this engine
    pub fn backend(&self) -> EngineBackend {
        EngineBackend::new(self.commands_tx.clone(), self.state.clone())
    }

    pub(crate) fn renderer(&self) -> Renderer {
        Renderer::new(self.state.clone(), self.commands_rx.clone())
    }

    /// Open the output stream; the audio clock starts at zero
    pub fn start(&mut self) -> Result<(), AudioEngineError> {
        if self.stream.is_some() {
            return Err(AudioEngineError::AlreadyRunning);
        }

        let info = crate::audio_io::default_output_info()?;
        self.state.sample_rate.store(info.sample_rate, Ordering::SeqCst);
        self.state.frames_rendered.store(0, Ordering::SeqCst);

        let mut renderer = self.renderer();
        let stream = RealtimeOutputStream::start(move |buffer, sample_rate, channels| {
            renderer.render(buffer, sample_rate, channels);
        })?;

        // The stream may have settled on a different rate than the query
        self.state.sample_rate.store(stream.info().sample_rate, Ordering::SeqCst);
        self.state.running.store(true, Ordering::SeqCst);
        self.stream = Some(stream);
        info!(device = %info.name, sample_rate = info.sample_rate, "Audio engine started");
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), AudioEngineError> {
        let stream = self.stream.take().ok_or(AudioEngineError::NotRunning)?;
        stream.stop();
        self.state.running.store(false, Ordering::SeqCst);
        info!("Audio engine stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }
}

impl AudioClock for AudioEngine {
    fn now(&self) -> f64 {
        self.state.now()
    }

    fn is_active(&self) -> bool {
        self.is_running()
    }

    fn activate(&mut self) -> stepcode_core::Result<()> {
        debug!("Activating audio output");
        self.start().map_err(|e| StepcodeError::AudioInactive(e.to_string()))
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepcode_core::{AudioBackend, DrumHit};

    fn first_sound(buffer: &[f32], channels: usize) -> Option<usize> {
        buffer.chunks(channels).position(|frame| frame[0] != 0.0)
    }

    #[test]
    fn test_note_lands_on_its_frame() {
        let engine = AudioEngine::new();
        let mut backend = engine.backend();
        let mut renderer = engine.renderer();

        // 0.01s at 44.1kHz
        backend.trigger_percussion("kick", 0.01);
        let mut buffer = vec![0.0f32; 1024 * 2];
        renderer.render(&mut buffer, DEFAULT_SAMPLE_RATE, 2);

        assert_eq!(first_sound(&buffer, 2), Some(441));
        assert_eq!(engine.state().frames_rendered.load(Ordering::SeqCst), 1024);
        assert!((engine.state().now() - 1024.0 / 44_100.0).abs() < 1e-12);
    }

    #[test]
    fn test_note_in_later_block_waits() {
        let engine = AudioEngine::new();
        let mut backend = engine.backend();
        let mut renderer = engine.renderer();

        backend.trigger_melodic(TrackId::Bass, "C2", 0.25, 0.05);
        let mut buffer = vec![0.0f32; 1024];
        renderer.render(&mut buffer, DEFAULT_SAMPLE_RATE, 1);
        assert_eq!(first_sound(&buffer, 1), None);

        renderer.render(&mut buffer, DEFAULT_SAMPLE_RATE, 1);
        renderer.render(&mut buffer, DEFAULT_SAMPLE_RATE, 1);
        // Frame 2205 is 157 frames into the third block
        assert_eq!(first_sound(&buffer, 1), Some(2205 - 2048));
    }

    #[test]
    fn test_cancel_after_drops_future_notes() {
        let engine = AudioEngine::new();
        let mut backend = engine.backend();
        let mut renderer = engine.renderer();

        backend.trigger_percussion("snare", 0.5);
        backend.cancel_after(0.2);
        let mut buffer = vec![0.0f32; 4096];
        for _ in 0..8 {
            renderer.render(&mut buffer, DEFAULT_SAMPLE_RATE, 1);
            assert_eq!(first_sound(&buffer, 1), None);
        }
        assert!(renderer.queue.is_empty());
    }

    #[test]
    fn test_late_note_plays_immediately() {
        let engine = AudioEngine::new();
        let mut backend = engine.backend();
        let mut renderer = engine.renderer();

        let mut buffer = vec![0.0f32; 512];
        renderer.render(&mut buffer, DEFAULT_SAMPLE_RATE, 1);
        backend.trigger_percussion("clap", 0.0);
        renderer.render(&mut buffer, DEFAULT_SAMPLE_RATE, 1);
        assert_eq!(first_sound(&buffer, 1), Some(0));
    }

    #[test]
    fn test_master_volume_scales_output() {
        let engine = AudioEngine::new();
        let mut backend = engine.backend();

        let mut loud = vec![0.0f32; 2048];
        let mut renderer = engine.renderer();
        backend.trigger_melodic(TrackId::Synth, "A4", 1.0, 0.0);
        renderer.render(&mut loud, DEFAULT_SAMPLE_RATE, 1);
        let loud_peak = engine.state().peak();
        assert!(loud_peak > 0.0);

        let quiet_engine = AudioEngine::new();
        let mut quiet_backend = quiet_engine.backend();
        let mut quiet_renderer = quiet_engine.renderer();
        quiet_backend.set_master_volume(-20.0);
        quiet_backend.trigger_melodic(TrackId::Synth, "A4", 1.0, 0.0);
        let mut quiet = vec![0.0f32; 2048];
        quiet_renderer.render(&mut quiet, DEFAULT_SAMPLE_RATE, 1);

        let ratio = quiet_engine.state().peak() / loud_peak;
        assert!(ratio < 0.2, "ratio {}", ratio);
    }

    #[test]
    fn test_sample_rate_change_reaches_instruments() {
        let engine = AudioEngine::new();
        let mut renderer = engine.renderer();
        let mut buffer = vec![0.0f32; 256];
        renderer.render(&mut buffer, 48_000, 1);
        assert_eq!(renderer.sample_rate, 48_000);
        renderer.drums.queue_note(NoteEvent::Hit(DrumHit::Kick), 0);
        assert!(renderer.drums.process(64).iter().any(|s| *s != 0.0));
    }

    #[test]
    fn test_stop_without_start_fails() {
        let mut engine = AudioEngine::new();
        assert!(matches!(engine.stop(), Err(AudioEngineError::NotRunning)));
        assert!(!engine.is_active());
    }
}
