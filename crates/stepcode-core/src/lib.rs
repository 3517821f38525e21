//! stepcode-core: Pattern compiler, step sequencer and playback dispatch

pub mod clock;
pub mod compiler;
pub mod dispatcher;
pub mod display;
mod error;
pub mod pattern;
pub mod sequencer;
mod track;
mod transport;

pub use clock::{AudioClock, ManualClock, StepClock};
pub use compiler::{check, compile, is_valid_token, Diagnostic, DiagnosticKind};
pub use dispatcher::{AudioBackend, BackendCall, Dispatcher, RecordingBackend};
pub use display::{DisplayEvent, DisplaySink};
pub use error::{Result, StepcodeError};
pub use pattern::{Pattern, PatternSet, StepToken, WrapPolicy, REST};
pub use sequencer::{Sequencer, SequencerConfig};
pub use track::{Accidental, DrumHit, Pitch, TrackId};
pub use transport::{Tempo, TransportState, TransportStatus};
