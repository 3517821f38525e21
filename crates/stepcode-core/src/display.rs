//! Notifications for step highlighting and status display

use std::sync::Arc;
use std::sync::mpsc::Sender;

use tracing::trace;

use crate::pattern::PatternSet;
use crate::transport::TransportStatus;

/// Observer of sequencer progress; registered with `Sequencer::subscribe`
pub trait DisplaySink: Send {
    /// A tick's audio time has been reached
    fn on_step_advance(&mut self, step: usize, patterns: &Arc<PatternSet>);
    /// New text compiled
    fn on_pattern_set_changed(&mut self, patterns: &Arc<PatternSet>);
    fn on_transport_status(&mut self, status: TransportStatus);
}

/// Owned form of a sink notification, for sending across threads
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayEvent {
    StepAdvance { step: usize, patterns: Arc<PatternSet> },
    PatternSetChanged(Arc<PatternSet>),
    TransportStatus(TransportStatus),
}

impl DisplayEvent {
    /// Replay this event onto a sink
    pub fn deliver(self, sink: &mut dyn DisplaySink) {
        match self {
            Self::StepAdvance { step, patterns } => sink.on_step_advance(step, &patterns),
            Self::PatternSetChanged(patterns) => sink.on_pattern_set_changed(&patterns),
            Self::TransportStatus(status) => sink.on_transport_status(status),
        }
    }
}

impl DisplaySink for Sender<DisplayEvent> {
    fn on_step_advance(&mut self, step: usize, patterns: &Arc<PatternSet>) {
        forward(self, DisplayEvent::StepAdvance { step, patterns: patterns.clone() });
    }

    fn on_pattern_set_changed(&mut self, patterns: &Arc<PatternSet>) {
        forward(self, DisplayEvent::PatternSetChanged(patterns.clone()));
    }

    fn on_transport_status(&mut self, status: TransportStatus) {
        forward(self, DisplayEvent::TransportStatus(status));
    }
}

/// Send to the observer; a closed receiver only loses the notification
fn forward(tx: &Sender<DisplayEvent>, event: DisplayEvent) -> bool {
    match tx.send(event) {
        Ok(()) => true,
        Err(e) => {
            trace!(event = ?e.0, "Display observer disconnected");
            false
        }
    }
}
