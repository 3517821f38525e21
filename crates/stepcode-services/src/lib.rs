//! stepcode-services: Audio engine, built-in instruments and the live session

pub mod audio_engine;
pub mod audio_io;
pub mod engine_backend;
pub mod instruments;
pub mod session;

pub use audio_engine::{AudioEngine, AudioEngineError, EngineCommand, EngineState, ScheduledNote};
pub use audio_io::{default_output_info, AudioOutputError, OutputDeviceInfo, RealtimeOutputStream};
pub use engine_backend::{EngineBackend, MAX_VOLUME_DB, MIN_VOLUME_DB};
pub use instruments::{AudioInstrument, DrumKit, MonoSynth, NoteEvent, SynthPreset};
pub use session::{ControlCommand, LiveSession, SessionError, SessionEvent, SessionOutput};
