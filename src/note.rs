// Cauldron
// Copyright (C) 2021  Wesley Merkel
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Pitches and note lengths.
//!
//! Voices and instruments describe what they play using scientific pitch notation (`"C4"`,
//! `"F#2"`, `"Bb3"`) and note values written the way most sequencers write them (`"16n"` for a
//! sixteenth note, `"4n"` for a quarter note). This module parses both and converts them into the
//! frequencies and durations that the synthesis server understands.
//!
//! # Examples
//!
//! ```
//! use cauldron::note::{NoteValue, Pitch};
//! use std::time::Duration;
//!
//! let a4: Pitch = "A4".parse()?;
//! assert_eq!(a4.midi(), 69);
//! assert_eq!(a4.hz(), 440.0);
//!
//! let eighth: NoteValue = "8n".parse()?;
//! assert_eq!(eighth.duration_at(120.0), Duration::from_millis(250));
//! # Ok::<(), cauldron::note::Error>(())
//! ```

use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fmt, str::FromStr, time::Duration};
use thiserror::Error;

/// A specialized [`Result`] type for parsing pitches and note values.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned when parsing pitches and note values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("invalid pitch {0:?}, expected a note name and octave such as \"C#4\"")]
    InvalidPitch(String),
    #[error("invalid note value {0:?}, expected one of 1n, 2n, 4n, 8n, 16n, 32n")]
    InvalidNoteValue(String),
}

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// A pitch in twelve-tone equal temperament, stored as a MIDI note number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pitch {
    midi: i32,
}

impl Pitch {
    /// Creates a pitch from a MIDI note number. Middle C is `60`.
    pub const fn from_midi(midi: i32) -> Pitch {
        Pitch { midi }
    }

    /// Returns the MIDI note number of this pitch.
    pub fn midi(self) -> i32 {
        self.midi
    }

    /// Returns the frequency of this pitch in hertz, with A4 tuned to 440 Hz.
    pub fn hz(self) -> f32 {
        let exp = (self.midi - 69) as f32 / 12.0;
        440.0 * 2f32.powf(exp)
    }

    /// Returns this pitch moved by the given number of semitones.
    pub fn transpose(self, semitones: i32) -> Pitch {
        Pitch {
            midi: self.midi + semitones,
        }
    }

    /// Returns the octave number in scientific pitch notation.
    pub fn octave(self) -> i32 {
        self.midi.div_euclid(12) - 1
    }

    fn pitch_class(self) -> usize {
        self.midi.rem_euclid(12) as usize
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", NOTE_NAMES[self.pitch_class()], self.octave())
    }
}

impl FromStr for Pitch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Pitch> {
        let invalid = || Error::InvalidPitch(s.to_owned());

        let mut chars = s.chars();
        let letter = chars.next().ok_or_else(invalid)?;
        let base = match letter.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(invalid()),
        };

        let rest = chars.as_str();
        let (accidental, octave) = if let Some(octave) = rest.strip_prefix('#') {
            (1, octave)
        } else if let Some(octave) = rest.strip_prefix('b') {
            (-1, octave)
        } else {
            (0, rest)
        };

        let octave: i32 = octave.parse().map_err(|_| invalid())?;
        if !(-1..=9).contains(&octave) {
            return Err(invalid());
        }

        Ok(Pitch {
            midi: (octave + 1) * 12 + base + accidental,
        })
    }
}

impl TryFrom<String> for Pitch {
    type Error = Error;

    fn try_from(s: String) -> Result<Pitch> {
        s.parse()
    }
}

impl From<Pitch> for String {
    fn from(pitch: Pitch) -> String {
        pitch.to_string()
    }
}

/// A musical note length relative to a whole note.
///
/// Note values double as the transport's subdivision: a transport ticking in sixteenth notes
/// ticks four times per beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NoteValue {
    Whole,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
    ThirtySecond,
}

impl NoteValue {
    /// The number of these notes that fit in one whole note.
    fn denominator(self) -> u32 {
        match self {
            NoteValue::Whole => 1,
            NoteValue::Half => 2,
            NoteValue::Quarter => 4,
            NoteValue::Eighth => 8,
            NoteValue::Sixteenth => 16,
            NoteValue::ThirtySecond => 32,
        }
    }

    /// Returns the length of this note in beats, where one beat is a quarter note.
    pub fn beats(self) -> f64 {
        4.0 / f64::from(self.denominator())
    }

    /// Returns how many of these notes fit in one beat.
    pub fn per_beat(self) -> f64 {
        f64::from(self.denominator()) / 4.0
    }

    /// Returns the length of this note at the given tempo, in beats per minute.
    ///
    /// The caller is responsible for passing a positive, finite tempo.
    pub fn duration_at(self, bpm: f64) -> Duration {
        Duration::from_secs_f64(60.0 / bpm * self.beats())
    }
}

impl Default for NoteValue {
    fn default() -> NoteValue {
        NoteValue::Sixteenth
    }
}

impl fmt::Display for NoteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}n", self.denominator())
    }
}

impl FromStr for NoteValue {
    type Err = Error;

    fn from_str(s: &str) -> Result<NoteValue> {
        Ok(match s {
            "1n" | "whole" => NoteValue::Whole,
            "2n" | "half" => NoteValue::Half,
            "4n" | "quarter" => NoteValue::Quarter,
            "8n" | "eighth" => NoteValue::Eighth,
            "16n" | "sixteenth" => NoteValue::Sixteenth,
            "32n" | "thirty_second" => NoteValue::ThirtySecond,
            _ => return Err(Error::InvalidNoteValue(s.to_owned())),
        })
    }
}

impl TryFrom<String> for NoteValue {
    type Error = Error;

    fn try_from(s: String) -> Result<NoteValue> {
        s.parse()
    }
}

impl From<NoteValue> for String {
    fn from(value: NoteValue) -> String {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_natural_sharp_and_flat_pitches() {
        assert_eq!(Ok(60), "C4".parse::<Pitch>().map(Pitch::midi));
        assert_eq!(Ok(61), "C#4".parse::<Pitch>().map(Pitch::midi));
        assert_eq!(Ok(70), "Bb4".parse::<Pitch>().map(Pitch::midi));
        assert_eq!(Ok(24), "C1".parse::<Pitch>().map(Pitch::midi));
        assert_eq!(Ok(0), "C-1".parse::<Pitch>().map(Pitch::midi));
    }

    #[test]
    fn rejects_malformed_pitches() {
        for input in &["", "H4", "C", "C#", "C##4", "C10", "4C"] {
            assert_eq!(
                Err(Error::InvalidPitch((*input).to_owned())),
                input.parse::<Pitch>()
            );
        }
    }

    #[test]
    fn pitch_frequencies_follow_equal_temperament() {
        assert_eq!(440.0, Pitch::from_midi(69).hz());
        assert_eq!(880.0, Pitch::from_midi(81).hz());
        assert!((Pitch::from_midi(60).hz() - 261.63).abs() < 0.01);
    }

    #[test]
    fn pitches_display_with_sharps() {
        assert_eq!("A#3", Pitch::from_midi(58).to_string());
        assert_eq!("E2", "E2".parse::<Pitch>().unwrap().to_string());
        assert_eq!("C#4", "Db4".parse::<Pitch>().unwrap().to_string());
    }

    #[test]
    fn transposing_crosses_octaves() {
        let e2: Pitch = "E2".parse().unwrap();
        assert_eq!("G2", e2.transpose(3).to_string());
        assert_eq!("E3", e2.transpose(12).to_string());
    }

    #[test]
    fn note_value_lengths() {
        assert_eq!(4.0, NoteValue::Whole.beats());
        assert_eq!(0.25, NoteValue::Sixteenth.beats());
        assert_eq!(4.0, NoteValue::Sixteenth.per_beat());
        assert_eq!(
            Duration::from_millis(125),
            NoteValue::Sixteenth.duration_at(120.0)
        );
        assert_eq!(Duration::from_secs(1), NoteValue::Quarter.duration_at(60.0));
    }

    #[test]
    fn note_values_round_trip_through_strings() {
        assert_eq!(Ok(NoteValue::Eighth), "8n".parse());
        assert_eq!("16n", NoteValue::Sixteenth.to_string());
        assert_eq!(
            Err(Error::InvalidNoteValue("3n".to_owned())),
            "3n".parse::<NoteValue>()
        );
    }
}
