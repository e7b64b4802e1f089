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

//! Voices and the kits that hold them.
//!
//! A voice is one triggerable sound, such as a kick drum or a hi-hat. Each voice is described by
//! a [`VoicePatch`]: a fixed set of synthesis parameters that is validated when the patch is
//! created and compiled into a SuperCollider [synth definition](crate::synthdef) when the session
//! starts. A [`Kit`] is the immutable, ordered set of voices that a session plays. Voices are
//! referred to by their position in the kit using [`VoiceId`].
//!
//! # Examples
//!
//! ```
//! use cauldron::voice::{Kit, Shape, VoicePatch};
//!
//! let kick = VoicePatch::new("kick", Shape::Sine)
//!     .envelope(0.001, 0.4, 0.01, 1.4)
//!     .pitch("C1".parse()?)
//!     .key('1');
//! let kit = Kit::new(vec![kick])?;
//!
//! let id = kit.voice_id("kick").unwrap();
//! assert_eq!(kit.voice_for_key('1'), Some(id));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::{
    note::{NoteValue, Pitch},
    synthdef::{DoneAction, Env, Rate, SynthDef},
};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, convert::TryFrom, fmt};
use thiserror::Error;

/// A specialized [`Result`] type for voice validation.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned when a patch or kit is invalid.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("voice name {0:?} must be 1 to 64 ASCII letters, digits, '-' or '_'")]
    InvalidName(String),
    #[error("voice {voice:?}: {parameter} must be {expected}, got {value}")]
    InvalidParameter {
        voice: String,
        parameter: &'static str,
        expected: &'static str,
        value: f32,
    },
    #[error("kit contains more than one voice named {0:?}")]
    DuplicateName(String),
    #[error("key {key:?} is bound to both {first:?} and {second:?}")]
    DuplicateKey {
        key: char,
        first: String,
        second: String,
    },
    #[error("a kit must contain at least one voice")]
    EmptyKit,
}

/// Identifies a voice by its position in a [`Kit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VoiceId(pub usize);

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The sound source of a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    Sine,
    Square,
    Sawtooth,
    Triangle,
    WhiteNoise,
    PinkNoise,
}

impl Shape {
    /// Returns whether this shape ignores pitch.
    pub fn is_noise(self) -> bool {
        matches!(self, Shape::WhiteNoise | Shape::PinkNoise)
    }
}

/// The synthesis parameters of one voice.
///
/// Envelope times are in seconds. The sustain level is held from the end of the decay until the
/// note's length has passed, then the release begins. `detune` is in cents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoicePatch {
    pub name: String,
    pub shape: Shape,
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
    #[serde(default)]
    pub detune: f32,
    #[serde(default = "default_pitch")]
    pub pitch: Pitch,
    #[serde(default = "default_length")]
    pub length: NoteValue,
    #[serde(default = "default_level")]
    pub level: f32,
    #[serde(default)]
    pub key: Option<char>,
}

fn default_pitch() -> Pitch {
    Pitch::from_midi(60)
}

fn default_length() -> NoteValue {
    NoteValue::Eighth
}

fn default_level() -> f32 {
    0.8
}

impl VoicePatch {
    /// Creates a patch with a short percussive envelope, playing middle C for an eighth note.
    pub fn new(name: impl Into<String>, shape: Shape) -> VoicePatch {
        VoicePatch {
            name: name.into(),
            shape,
            attack: 0.001,
            decay: 0.2,
            sustain: 0.0,
            release: 0.2,
            detune: 0.0,
            pitch: default_pitch(),
            length: default_length(),
            level: default_level(),
            key: None,
        }
    }

    /// Sets the attack, decay, sustain and release of the envelope.
    pub fn envelope(mut self, attack: f32, decay: f32, sustain: f32, release: f32) -> VoicePatch {
        self.attack = attack;
        self.decay = decay;
        self.sustain = sustain;
        self.release = release;
        self
    }

    /// Sets the pitch played when the voice is triggered.
    pub fn pitch(mut self, pitch: Pitch) -> VoicePatch {
        self.pitch = pitch;
        self
    }

    /// Sets how long the voice is held before it is released.
    pub fn length(mut self, length: NoteValue) -> VoicePatch {
        self.length = length;
        self
    }

    /// Sets the detune in cents.
    pub fn detune(mut self, cents: f32) -> VoicePatch {
        self.detune = cents;
        self
    }

    /// Sets the output level, between `0` and `1`.
    pub fn level(mut self, level: f32) -> VoicePatch {
        self.level = level;
        self
    }

    /// Binds a keyboard key that plays this voice.
    pub fn key(mut self, key: char) -> VoicePatch {
        self.key = Some(key.to_ascii_lowercase());
        self
    }

    /// Checks that every parameter is in range.
    pub fn validate(&self) -> Result<()> {
        let name_ok = !self.name.is_empty()
            && self.name.len() <= 64
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !name_ok {
            return Err(Error::InvalidName(self.name.clone()));
        }

        let time = "a finite number of seconds, zero or more";
        self.check("attack", self.attack, time, |v| v >= 0.0)?;
        self.check("decay", self.decay, time, |v| v >= 0.0)?;
        self.check("release", self.release, time, |v| v >= 0.0)?;
        self.check("sustain", self.sustain, "between 0 and 1", |v| {
            (0.0..=1.0).contains(&v)
        })?;
        self.check("level", self.level, "between 0 and 1", |v| {
            (0.0..=1.0).contains(&v)
        })?;
        self.check("detune", self.detune, "between -1200 and 1200 cents", |v| {
            (-1200.0..=1200.0).contains(&v)
        })?;
        Ok(())
    }

    fn check(
        &self,
        parameter: &'static str,
        value: f32,
        expected: &'static str,
        ok: impl Fn(f32) -> bool,
    ) -> Result<()> {
        if value.is_finite() && ok(value) {
            Ok(())
        } else {
            Err(Error::InvalidParameter {
                voice: self.name.clone(),
                parameter,
                expected,
                value,
            })
        }
    }

    /// The name of the synth definition that plays this voice.
    pub fn synth_def_name(&self) -> String {
        format!("cauldron-{}", self.name)
    }

    /// Compiles the patch into a synth definition.
    ///
    /// The definition takes three parameters: `freq` in hertz, `amp` as a linear gain and `hold`,
    /// the number of seconds the sustain level is held. Each synth frees itself when its envelope
    /// finishes, so every trigger is an independent sound.
    pub fn synth_def(&self) -> SynthDef {
        let detune_ratio = 2f32.powf(self.detune / 1200.0);
        SynthDef::new(self.synth_def_name(), |graph| {
            let freq = graph.param("freq", self.pitch.hz());
            let amp = graph.param("amp", self.level);
            let hold = graph.param("hold", 0.0);

            let freq = if detune_ratio == 1.0 {
                freq
            } else {
                graph.mul(freq, detune_ratio)
            };
            let source = match self.shape {
                Shape::Sine => graph.sin_osc(Rate::Audio, freq),
                Shape::Square => graph.pulse(Rate::Audio, freq, 0.5),
                Shape::Sawtooth => graph.saw(Rate::Audio, freq),
                Shape::Triangle => graph.lf_tri(Rate::Audio, freq),
                Shape::WhiteNoise => graph.white_noise(Rate::Audio),
                Shape::PinkNoise => graph.pink_noise(Rate::Audio),
            };

            let env = Env::new(0.0, -4.0)
                .segment(1.0, self.attack)
                .segment(self.sustain, self.decay)
                .segment(self.sustain, hold)
                .segment(0.0, self.release);
            let env = graph.env_gen(Rate::Control, env, amp, DoneAction::FreeSelf);
            let signal = graph.mul(source, env);
            graph.out(0, &[signal, signal]);
        })
    }
}

/// The ordered set of voices played by a session.
///
/// A kit is immutable once built. Serializes as a list of patches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<VoicePatch>", into = "Vec<VoicePatch>")]
pub struct Kit {
    voices: Vec<VoicePatch>,
}

impl Kit {
    /// Builds a kit, validating every patch.
    ///
    /// # Errors
    ///
    /// Returns an error if the kit is empty, if any patch is invalid, or if two voices share a
    /// name or a key.
    pub fn new(voices: Vec<VoicePatch>) -> Result<Kit> {
        if voices.is_empty() {
            return Err(Error::EmptyKit);
        }
        let mut names = HashSet::new();
        for voice in &voices {
            voice.validate()?;
            if !names.insert(voice.name.as_str()) {
                return Err(Error::DuplicateName(voice.name.clone()));
            }
        }
        for (i, first) in voices.iter().enumerate() {
            for second in &voices[i + 1..] {
                if let (Some(key), Some(other)) = (first.key, second.key) {
                    if key == other {
                        return Err(Error::DuplicateKey {
                            key,
                            first: first.name.clone(),
                            second: second.name.clone(),
                        });
                    }
                }
            }
        }
        Ok(Kit { voices })
    }

    /// Returns the number of voices in the kit.
    pub fn len(&self) -> usize {
        self.voices.len()
    }

    /// Always false; kits cannot be empty.
    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Returns the patch for a voice, or `None` if the kit has no such voice.
    pub fn get(&self, voice: VoiceId) -> Option<&VoicePatch> {
        self.voices.get(voice.0)
    }

    /// Looks up a voice by name.
    pub fn voice_id(&self, name: &str) -> Option<VoiceId> {
        self.voices
            .iter()
            .position(|voice| voice.name == name)
            .map(VoiceId)
    }

    /// Looks up the voice bound to a keyboard key. Keys are case insensitive.
    pub fn voice_for_key(&self, key: char) -> Option<VoiceId> {
        let key = key.to_ascii_lowercase();
        self.voices
            .iter()
            .position(|voice| voice.key == Some(key))
            .map(VoiceId)
    }

    /// Iterates over the voices in order.
    pub fn iter(&self) -> impl Iterator<Item = (VoiceId, &VoicePatch)> {
        self.voices
            .iter()
            .enumerate()
            .map(|(index, voice)| (VoiceId(index), voice))
    }

    /// Compiles every voice into a synth definition.
    pub fn synth_defs(&self) -> Vec<SynthDef> {
        self.voices.iter().map(VoicePatch::synth_def).collect()
    }

    /// The sixteen pad drum kit.
    pub fn drums() -> Kit {
        use Shape::*;
        use NoteValue::{Eighth, Quarter, Sixteenth};

        let pad = |name: &str, shape, pitch: i32, length, key, adsr: [f32; 4]| {
            VoicePatch::new(name, shape)
                .envelope(adsr[0], adsr[1], adsr[2], adsr[3])
                .pitch(Pitch::from_midi(pitch))
                .length(length)
                .key(key)
        };

        let voices = vec![
            pad("kick", Sine, 24, Eighth, '1', [0.001, 0.4, 0.01, 1.4]),
            pad("snare", WhiteNoise, 60, Eighth, '2', [0.001, 0.2, 0.0, 0.2]),
            pad("hihat", Square, 84, Sixteenth, '3', [0.001, 0.1, 0.0, 0.01]).detune(11.0),
            pad("openhat", Square, 84, Eighth, '4', [0.001, 0.3, 0.0, 0.1]).detune(11.0),
            pad("clap", PinkNoise, 60, Eighth, 'q', [0.005, 0.1, 0.0, 0.1]),
            pad("tom1", Sine, 43, Eighth, 'w', [0.01, 0.4, 0.01, 0.4]),
            pad("tom2", Sine, 38, Eighth, 'e', [0.01, 0.4, 0.01, 0.4]),
            pad("tom3", Sine, 33, Eighth, 'r', [0.01, 0.4, 0.01, 0.4]),
            pad("crash", Square, 84, Quarter, 'a', [0.001, 1.0, 0.0, 0.3]).detune(23.0),
            pad("ride", Square, 84, Eighth, 's', [0.001, 0.4, 0.0, 0.2]).detune(7.0),
            pad("perc1", Triangle, 60, Eighth, 'd', [0.001, 0.2, 0.0, 0.3]),
            pad("perc2", Triangle, 55, Eighth, 'f', [0.001, 0.2, 0.0, 0.3]),
            pad("fx1", Square, 72, Sixteenth, 'z', [0.01, 0.1, 0.1, 0.1]),
            pad("fx2", Sawtooth, 64, Sixteenth, 'x', [0.01, 0.2, 0.1, 0.2]),
            pad("fx3", Triangle, 67, Eighth, 'c', [0.05, 0.3, 0.2, 0.3]),
            pad("fx4", Sine, 60, Sixteenth, 'v', [0.01, 0.2, 0.0, 0.2]),
        ];
        Kit { voices }
    }
}

impl Default for Kit {
    fn default() -> Kit {
        Kit::drums()
    }
}

impl TryFrom<Vec<VoicePatch>> for Kit {
    type Error = Error;

    fn try_from(voices: Vec<VoicePatch>) -> Result<Kit> {
        Kit::new(voices)
    }
}

impl From<Kit> for Vec<VoicePatch> {
    fn from(kit: Kit) -> Vec<VoicePatch> {
        kit.voices
    }
}
