//! Text to pattern-set compiler
//!
//! One line per track: `name: token token ...`. Lines starting with `//`
//! are comments. Compilation never fails; lines that do not fit are skipped
//! and only reported by [`check`].

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pattern::{Pattern, PatternSet, REST};
use crate::track::{DrumHit, Pitch, TrackId};

const COMMENT: &str = "//";

/// Classification of a single source line
enum Line<'a> {
    Skip,
    Malformed,
    UnknownTrack(&'a str),
    Track(TrackId, &'a str),
}

fn classify(line: &str) -> Line<'_> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(COMMENT) {
        return Line::Skip;
    }

    let Some((name, body)) = line.split_once(':') else {
        return Line::Malformed;
    };

    let name = name.trim_end();
    match TrackId::from_name(name) {
        Some(track) => Line::Track(track, body),
        None => Line::UnknownTrack(name),
    }
}

/// Compile pattern text. Last line for a track wins.
pub fn compile(text: &str) -> PatternSet {
    let mut set = PatternSet::new();
    for line in text.lines() {
        if let Line::Track(track, body) = classify(line) {
            set.insert(track, Pattern::from_tokens(body.split_whitespace()));
        }
    }
    set
}

/// Advisory grammar check for a token on a track
pub fn is_valid_token(token: &str, track: TrackId) -> bool {
    if token == REST {
        return true;
    }
    match track {
        TrackId::Drums => DrumHit::from_name(token).is_some(),
        TrackId::Bass | TrackId::Synth => Pitch::parse(token).is_some(),
    }
}

/// Something in the source the compiler silently skipped or let through
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// Line is not `name: tokens`
    Malformed,
    UnknownTrack(String),
    InvalidToken { track: TrackId, token: String },
    /// A later line for the same track replaced this one
    Overridden { track: TrackId, by_line: usize },
}

/// Advisory warning tied to a 1-based source line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub line: usize,
    pub kind: DiagnosticKind,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: ", self.line)?;
        match &self.kind {
            DiagnosticKind::Malformed => write!(f, "expected `track: tokens`"),
            DiagnosticKind::UnknownTrack(name) => write!(f, "unknown track '{}'", name),
            DiagnosticKind::InvalidToken { track, token } => {
                write!(f, "'{}' is not playable on {}", token, track)
            }
            DiagnosticKind::Overridden { track, by_line } => {
                write!(f, "{} is replaced by line {}", track, by_line)
            }
        }
    }
}

/// Collect advisory diagnostics, in line order
pub fn check(text: &str) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let mut last_line: HashMap<TrackId, usize> = HashMap::new();

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        match classify(line) {
            Line::Skip => {}
            Line::Malformed => diagnostics.push(Diagnostic { line: line_no, kind: DiagnosticKind::Malformed }),
            Line::UnknownTrack(name) => diagnostics.push(Diagnostic {
                line: line_no,
                kind: DiagnosticKind::UnknownTrack(name.to_string()),
            }),
            Line::Track(track, body) => {
                if let Some(previous) = last_line.insert(track, line_no) {
                    diagnostics.push(Diagnostic {
                        line: previous,
                        kind: DiagnosticKind::Overridden { track, by_line: line_no },
                    });
                }
                for token in body.split_whitespace().filter(|t| !is_valid_token(t, track)) {
                    diagnostics.push(Diagnostic {
                        line: line_no,
                        kind: DiagnosticKind::InvalidToken { track, token: token.to_string() },
                    });
                }
            }
        }
    }

    diagnostics.sort_by_key(|d| d.line);
    diagnostics
}
