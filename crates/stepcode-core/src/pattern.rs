//! Patterns and pattern sets compiled from text

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::track::TrackId;

/// Reserved rest symbol
pub const REST: &str = "-";

/// One step of a pattern: an explicit rest or a playable token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepToken {
    Rest,
    /// Token text as written; validity is checked separately
    Play(String),
}

impl StepToken {
    pub fn parse(token: &str) -> Self {
        if token == REST {
            Self::Rest
        } else {
            Self::Play(token.to_string())
        }
    }

    pub fn is_rest(&self) -> bool {
        matches!(self, Self::Rest)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Rest => REST,
            Self::Play(token) => token,
        }
    }
}

impl fmt::Display for StepToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a pattern shorter than the cycle behaves past its own end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WrapPolicy {
    /// Steps past the pattern's end are silent
    #[default]
    Silent,
    /// Steps wrap modulo the pattern's own length
    Loop,
}

/// Ordered step tokens for one track
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pattern {
    steps: Vec<StepToken>,
}

impl Pattern {
    pub fn new(steps: Vec<StepToken>) -> Self {
        Self { steps }
    }

    pub fn from_tokens<'a>(tokens: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(tokens.into_iter().map(StepToken::parse).collect())
    }

    pub fn steps(&self) -> &[StepToken] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Token sounding at a cycle step under the given policy
    pub fn token_at(&self, step: usize, policy: WrapPolicy) -> Option<&StepToken> {
        if self.steps.is_empty() {
            return None;
        }
        match policy {
            WrapPolicy::Silent => self.steps.get(step),
            WrapPolicy::Loop => self.steps.get(step % self.steps.len()),
        }
    }
}

/// Patterns keyed by track; a missing key means the text had no line for it
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PatternSet {
    tracks: BTreeMap<TrackId, Pattern>,
}

impl PatternSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the pattern for a track, returning the previous one
    pub fn insert(&mut self, track: TrackId, pattern: Pattern) -> Option<Pattern> {
        self.tracks.insert(track, pattern)
    }

    pub fn get(&self, track: TrackId) -> Option<&Pattern> {
        self.tracks.get(&track)
    }

    pub fn contains(&self, track: TrackId) -> bool {
        self.tracks.contains_key(&track)
    }

    /// Tracks in channel order
    pub fn iter(&self) -> impl Iterator<Item = (TrackId, &Pattern)> {
        self.tracks.iter().map(|(track, pattern)| (*track, pattern))
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Loop length: longest pattern, 0 when there is nothing to play
    pub fn cycle_length(&self) -> usize {
        self.tracks.values().map(Pattern::len).max().unwrap_or(0)
    }
}
