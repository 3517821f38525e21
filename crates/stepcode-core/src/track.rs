//! Track channels and the per-track token grammar

use std::fmt;

use serde::{Deserialize, Serialize};

/// Instrument channel a pattern line is written for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackId {
    /// Percussion channel
    Drums,
    Bass,
    /// Lead channel
    Synth,
}

impl TrackId {
    pub const ALL: [TrackId; 3] = [TrackId::Drums, TrackId::Bass, TrackId::Synth];

    /// Name used in pattern text
    pub fn name(self) -> &'static str {
        match self {
            Self::Drums => "drums",
            Self::Bass => "bass",
            Self::Synth => "synth",
        }
    }

    /// Case-insensitive lookup of a track name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|track| track.name().eq_ignore_ascii_case(name))
    }

    pub fn is_percussion(self) -> bool {
        self == Self::Drums
    }

    pub fn is_melodic(self) -> bool {
        !self.is_percussion()
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Drum hit vocabulary for the percussion channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DrumHit {
    Kick,
    Snare,
    Clap,
    HiHat,
    OpenHat,
    Tom,
    Rim,
    Cowbell,
    Crash,
}

impl DrumHit {
    pub const ALL: [DrumHit; 9] = [
        DrumHit::Kick,
        DrumHit::Snare,
        DrumHit::Clap,
        DrumHit::HiHat,
        DrumHit::OpenHat,
        DrumHit::Tom,
        DrumHit::Rim,
        DrumHit::Cowbell,
        DrumHit::Crash,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Kick => "kick",
            Self::Snare => "snare",
            Self::Clap => "clap",
            Self::HiHat => "hihat",
            Self::OpenHat => "openhat",
            Self::Tom => "tom",
            Self::Rim => "rim",
            Self::Cowbell => "cowbell",
            Self::Crash => "crash",
        }
    }

    /// Hit names are matched exactly, like the rest symbol
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|hit| hit.name() == name)
    }
}

/// Chromatic modifier of a pitch letter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Accidental {
    Natural,
    Sharp,
    Flat,
}

/// Pitch descriptor: letter A-G, optional `#`/`b`, octave 0-8
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pitch {
    pub letter: char,
    pub accidental: Accidental,
    pub octave: u8,
}

impl Pitch {
    pub fn parse(token: &str) -> Option<Self> {
        let mut chars = token.chars();
        let letter = chars.next()?.to_ascii_uppercase();
        if !('A'..='G').contains(&letter) {
            return None;
        }

        let rest = chars.as_str();
        let (accidental, octave) = match rest.as_bytes() {
            [b'#', digit] => (Accidental::Sharp, *digit),
            [b'b', digit] => (Accidental::Flat, *digit),
            [digit] => (Accidental::Natural, *digit),
            _ => return None,
        };

        if !(b'0'..=b'8').contains(&octave) {
            return None;
        }

        Some(Self { letter, accidental, octave: octave - b'0' })
    }

    /// MIDI note number, C4 = 60
    pub fn midi_note(&self) -> u8 {
        let semitone: i16 = match self.letter {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            _ => 11,
        };
        let shift = match self.accidental {
            Accidental::Natural => 0,
            Accidental::Sharp => 1,
            Accidental::Flat => -1,
        };
        // Cb0 (11) to B#8 (120)
        ((self.octave as i16 + 1) * 12 + semitone + shift) as u8
    }

    /// Equal-tempered frequency in Hz, A4 = 440
    pub fn frequency(&self) -> f64 {
        440.0 * 2f64.powf((self.midi_note() as f64 - 69.0) / 12.0)
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let modifier = match self.accidental {
            Accidental::Natural => "",
            Accidental::Sharp => "#",
            Accidental::Flat => "b",
        };
        write!(f, "{}{}{}", self.letter, modifier, self.octave)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_names_case_insensitive() {
        assert_eq!(TrackId::from_name("DRUMS"), Some(TrackId::Drums));
        assert_eq!(TrackId::from_name("Bass"), Some(TrackId::Bass));
        assert_eq!(TrackId::from_name("synth"), Some(TrackId::Synth));
        assert_eq!(TrackId::from_name("piano"), None);
    }

    #[test]
    fn test_pitch_parse() {
        let pitch = Pitch::parse("C#4").unwrap();
        assert_eq!(pitch.letter, 'C');
        assert_eq!(pitch.accidental, Accidental::Sharp);
        assert_eq!(pitch.octave, 4);

        assert!(Pitch::parse("H4").is_none());
        assert!(Pitch::parse("C9").is_none());
        assert!(Pitch::parse("C").is_none());
        assert!(Pitch::parse("C##4").is_none());
        assert!(Pitch::parse("").is_none());
    }

    #[test]
    fn test_pitch_midi_note() {
        assert_eq!(Pitch::parse("C4").unwrap().midi_note(), 60);
        assert_eq!(Pitch::parse("A4").unwrap().midi_note(), 69);
        assert_eq!(Pitch::parse("Bb3").unwrap().midi_note(), 58);
        assert_eq!(Pitch::parse("C2").unwrap().midi_note(), 36);
        assert_eq!(Pitch::parse("Cb0").unwrap().midi_note(), 11);
        assert!((Pitch::parse("A4").unwrap().frequency() - 440.0).abs() < 1e-9);
    }

    #[test]
    fn test_drum_hits() {
        assert_eq!(DrumHit::from_name("kick"), Some(DrumHit::Kick));
        assert_eq!(DrumHit::from_name("hihat"), Some(DrumHit::HiHat));
        assert_eq!(DrumHit::from_name("cymbal"), None);
    }
}
