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

//! Playable instruments: a one-octave piano and a six-string guitar.
//!
//! Each instrument owns a [`VoiceGateway`] with a single voice of its own, and plays it at
//! different pitches. Like the drum kit, an instrument must be unlocked with `ensure_ready` before
//! it makes a sound.
//!
//! # Examples
//!
//! ```no_run
//! use cauldron::{
//!     instrument::{Chord, Guitar},
//!     server::Server,
//! };
//! use std::time::SystemTime;
//!
//! let guitar = Guitar::new(Server::connect("127.0.0.1:57110")?)?;
//! guitar.ensure_ready()?;
//! guitar.strum(Chord::Am, SystemTime::now())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::{
    gateway::{self, Synthesizer, TriggerRequest, VoiceGateway},
    note::{NoteValue, Pitch},
    voice::{self, Kit, Shape, VoiceId, VoicePatch},
};
use std::{
    fmt,
    str::FromStr,
    sync::atomic::{AtomicBool, AtomicU8, Ordering},
    time::{Duration, SystemTime},
};
use thiserror::Error;

/// A specialized [`Result`] type for instrument operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned by instruments.
#[derive(Debug, Error)]
pub enum Error {
    #[error("string {0} does not exist, strings are numbered 0 to 5 from low to high")]
    InvalidString(usize),
    #[error("fret {0} is past the end of the neck")]
    InvalidFret(u8),
    #[error("{setting} must be between 0 and 100, got {value}")]
    InvalidSetting { setting: &'static str, value: u8 },
    #[error("unknown chord {0:?}")]
    UnknownChord(String),
    #[error(transparent)]
    Voice(#[from] voice::Error),
    #[error(transparent)]
    Gateway(#[from] gateway::Error),
}

const VOICE: VoiceId = VoiceId(0);

/// One key of the piano.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PianoKey {
    /// The computer keyboard key that plays this piano key.
    pub key: char,
    pub pitch: Pitch,
    pub black: bool,
}

const fn white(key: char, midi: i32) -> PianoKey {
    PianoKey {
        key,
        pitch: Pitch::from_midi(midi),
        black: false,
    }
}

const fn black(key: char, midi: i32) -> PianoKey {
    PianoKey {
        key,
        pitch: Pitch::from_midi(midi),
        black: true,
    }
}

/// The white keys C4 to C5 on the home row, and the black keys between them on the row above.
pub static PIANO_KEYS: [PianoKey; 13] = [
    white('a', 60),
    white('s', 62),
    white('d', 64),
    white('f', 65),
    white('g', 67),
    white('h', 69),
    white('j', 71),
    white('k', 72),
    black('w', 61),
    black('e', 63),
    black('t', 66),
    black('y', 68),
    black('u', 70),
];

/// A sine piano covering one octave from middle C.
pub struct Piano<S> {
    gateway: VoiceGateway<S>,
}

impl<S: Synthesizer> Piano<S> {
    pub fn new(synth: S) -> Result<Piano<S>> {
        let kit = Kit::new(vec![Piano::<S>::patch()])?;
        Ok(Piano {
            gateway: VoiceGateway::new(kit, synth),
        })
    }

    /// The piano's voice: a quiet sine that fades out over half a second.
    pub fn patch() -> VoicePatch {
        VoicePatch::new("piano", Shape::Sine)
            .envelope(0.005, 0.5, 0.0, 0.01)
            .level(0.3)
    }

    /// Looks up the piano key played by a computer keyboard key. Case insensitive.
    pub fn key(key: char) -> Option<&'static PianoKey> {
        let key = key.to_ascii_lowercase();
        PIANO_KEYS.iter().find(|piano_key| piano_key.key == key)
    }

    pub fn ensure_ready(&self) -> Result<()> {
        Ok(self.gateway.ensure_ready()?)
    }

    /// Plays a piano key now.
    pub fn play(&self, key: &PianoKey) -> Result<()> {
        self.gateway
            .trigger(TriggerRequest::now(VOICE).pitch(key.pitch))?;
        Ok(())
    }

    /// Plays the piano key bound to a computer keyboard key, if there is one.
    pub fn press(&self, key: char) -> Result<Option<&'static PianoKey>> {
        match Piano::<S>::key(key) {
            Some(piano_key) => {
                self.play(piano_key)?;
                Ok(Some(piano_key))
            }
            None => Ok(None),
        }
    }

    pub fn dispose(&self) -> Result<()> {
        Ok(self.gateway.dispose()?)
    }
}

/// Open string pitches in standard tuning, from low E to high E.
pub const STRINGS: [Pitch; 6] = [
    Pitch::from_midi(40),
    Pitch::from_midi(45),
    Pitch::from_midi(50),
    Pitch::from_midi(55),
    Pitch::from_midi(59),
    Pitch::from_midi(64),
];

/// The number of frets on the neck.
pub const FRET_COUNT: u8 = 12;

/// The chords the guitar knows how to strum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Chord {
    C,
    D,
    E,
    G,
    Am,
    Em,
    F,
    Dm,
}

impl Chord {
    pub const ALL: [Chord; 8] = [
        Chord::C,
        Chord::D,
        Chord::E,
        Chord::G,
        Chord::Am,
        Chord::Em,
        Chord::F,
        Chord::Dm,
    ];

    /// The fret held on each string, low to high. `None` leaves the string unplayed.
    pub fn frets(self) -> [Option<u8>; 6] {
        match self {
            Chord::C => [None, Some(3), Some(2), Some(0), Some(1), Some(0)],
            Chord::D => [None, None, Some(0), Some(2), Some(3), Some(2)],
            Chord::E => [Some(0), Some(2), Some(2), Some(1), Some(0), Some(0)],
            Chord::G => [Some(3), Some(2), Some(0), Some(0), Some(0), Some(3)],
            Chord::Am => [None, Some(0), Some(2), Some(2), Some(1), Some(0)],
            Chord::Em => [Some(0), Some(2), Some(2), Some(0), Some(0), Some(0)],
            Chord::F => [Some(1), Some(3), Some(3), Some(2), Some(1), Some(1)],
            Chord::Dm => [None, None, Some(0), Some(2), Some(3), Some(1)],
        }
    }

    /// The chord bound to a computer keyboard key. Only the first six chords have keys.
    pub fn for_key(key: char) -> Option<Chord> {
        match key.to_ascii_lowercase() {
            'q' => Some(Chord::C),
            'w' => Some(Chord::D),
            'e' => Some(Chord::E),
            'r' => Some(Chord::G),
            't' => Some(Chord::Am),
            'y' => Some(Chord::Em),
            _ => None,
        }
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl FromStr for Chord {
    type Err = Error;

    fn from_str(s: &str) -> Result<Chord> {
        Chord::ALL
            .iter()
            .copied()
            .find(|chord| chord.to_string() == s)
            .ok_or_else(|| Error::UnknownChord(s.to_owned()))
    }
}

/// A plucked six-string guitar.
///
/// Volume, strum speed and sustain can be changed while playing from any thread.
pub struct Guitar<S> {
    gateway: VoiceGateway<S>,
    volume: AtomicU8,
    strum_speed: AtomicU8,
    sustain: AtomicBool,
}

impl<S: Synthesizer> Guitar<S> {
    /// Creates a guitar at volume 75, strum speed 50, with sustain on.
    pub fn new(synth: S) -> Result<Guitar<S>> {
        let kit = Kit::new(vec![Guitar::<S>::patch()])?;
        Ok(Guitar {
            gateway: VoiceGateway::new(kit, synth),
            volume: AtomicU8::new(75),
            strum_speed: AtomicU8::new(50),
            sustain: AtomicBool::new(true),
        })
    }

    /// The guitar's voice: a bright triangle with a fast attack and a long decay.
    pub fn patch() -> VoicePatch {
        VoicePatch::new("guitar", Shape::Triangle)
            .envelope(0.002, 0.6, 0.25, 0.8)
            .level(1.0)
    }

    /// Returns the pitch of a string held at a fret. Fret `0` is the open string.
    pub fn note(string: usize, fret: u8) -> Result<Pitch> {
        let open = STRINGS.get(string).ok_or(Error::InvalidString(string))?;
        if fret > FRET_COUNT {
            return Err(Error::InvalidFret(fret));
        }
        Ok(open.transpose(i32::from(fret)))
    }

    pub fn ensure_ready(&self) -> Result<()> {
        Ok(self.gateway.ensure_ready()?)
    }

    /// Sets the volume from `0` (-24 dB) to `100` (0 dB).
    pub fn set_volume(&self, volume: u8) -> Result<()> {
        Guitar::<S>::check("volume", volume)?;
        self.volume.store(volume, Ordering::Relaxed);
        Ok(())
    }

    /// Sets how quickly a strum crosses the strings, from `0` to `100`.
    pub fn set_strum_speed(&self, speed: u8) -> Result<()> {
        Guitar::<S>::check("strum speed", speed)?;
        self.strum_speed.store(speed, Ordering::Relaxed);
        Ok(())
    }

    /// With sustain on, notes ring for a half note instead of an eighth.
    pub fn set_sustain(&self, sustain: bool) {
        self.sustain.store(sustain, Ordering::Relaxed);
    }

    fn check(setting: &'static str, value: u8) -> Result<()> {
        if value <= 100 {
            Ok(())
        } else {
            Err(Error::InvalidSetting { setting, value })
        }
    }

    /// The linear gain for the current volume.
    pub fn gain(&self) -> f32 {
        let volume = f32::from(self.volume.load(Ordering::Relaxed));
        let db = volume / 100.0 * 24.0 - 24.0;
        10f32.powf(db / 20.0)
    }

    /// The time between neighbouring strings in a strum.
    pub fn strum_delay(&self) -> Duration {
        let speed = u64::from(self.strum_speed.load(Ordering::Relaxed));
        Duration::from_millis(150 - speed)
    }

    fn length(&self) -> NoteValue {
        if self.sustain.load(Ordering::Relaxed) {
            NoteValue::Half
        } else {
            NoteValue::Eighth
        }
    }

    /// Plays one string at a fret. With no `time`, the note plays now.
    pub fn pluck(&self, string: usize, fret: u8, time: Option<SystemTime>) -> Result<Pitch> {
        let pitch = Guitar::<S>::note(string, fret)?;
        let request = TriggerRequest {
            time,
            ..TriggerRequest::now(VOICE)
        };
        self.gateway.trigger(
            request
                .pitch(pitch)
                .length(self.length())
                .velocity(self.gain()),
        )?;
        Ok(pitch)
    }

    /// Strums a chord from the low string to the high string, starting at `start`.
    ///
    /// Each string is scheduled [`strum_delay`](Guitar::strum_delay) after the one below it,
    /// counting strings that are skipped. Returns the pitches played, in order.
    pub fn strum(&self, chord: Chord, start: SystemTime) -> Result<Vec<Pitch>> {
        let delay = self.strum_delay();
        let mut pitches = Vec::new();
        for (string, fret) in chord.frets().iter().enumerate() {
            if let Some(fret) = *fret {
                let time = start + delay * string as u32;
                pitches.push(self.pluck(string, fret, Some(time))?);
            }
        }
        log::debug!("strummed {}: {:?}", chord, pitches);
        Ok(pitches)
    }

    /// Plays the open string or chord bound to a computer keyboard key.
    ///
    /// Keys `1` to `6` pluck the open strings from low to high; `q w e r t y` strum the first six
    /// chords. Returns `false` if the key is not bound.
    pub fn press(&self, key: char) -> Result<bool> {
        if let Some(string) = key.to_digit(10).filter(|d| (1..=6).contains(d)) {
            self.pluck(string as usize - 1, 0, None)?;
            return Ok(true);
        }
        match Chord::for_key(key) {
            Some(chord) => {
                self.strum(chord, SystemTime::now())?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn dispose(&self) -> Result<()> {
        Ok(self.gateway.dispose()?)
    }
}
