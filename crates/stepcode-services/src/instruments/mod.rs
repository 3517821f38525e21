//! Built-in voices for the three tracks

pub mod drum_kit;
pub mod mono_synth;

pub use drum_kit::{DrumKit, DrumKitParams};
pub use mono_synth::{MonoSynth, SynthPreset, Waveform};

use stepcode_core::DrumHit;

/// Largest block an instrument renders in one call
pub const MAX_BLOCK_SIZE: usize = 4096;

/// A sound request routed to an instrument
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoteEvent {
    Hit(DrumHit),
    Tone { frequency: f64, duration_frames: u32 },
}

/// Sound generator driven by sample-accurate note events
pub trait AudioInstrument: Send {
    fn name(&self) -> &str;
    /// Queue an event `sample_offset` frames into the next block
    fn queue_note(&mut self, note: NoteEvent, sample_offset: u32);
    /// Silence every voice and drop queued events
    fn all_notes_off(&mut self);
    /// Render the next `num_frames` mono frames
    fn process(&mut self, num_frames: usize) -> &[f32];
    fn set_sample_rate(&mut self, sample_rate: f32);
}
