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

//! Turns "play this voice" into sound.
//!
//! The [`VoiceGateway`] is the only place that talks to the synthesis backend. It owns the
//! [`Kit`], checks every [`TriggerRequest`] against it, and forwards valid requests to a
//! [`Synthesizer`]. The production synthesizer is the SuperCollider [`Server`]; tests substitute a
//! recording double.
//!
//! Before the first trigger, the backend has to be unlocked with
//! [`VoiceGateway::ensure_ready`]. For SuperCollider this registers the client and loads one synth
//! definition per voice. The handshake runs once; later calls return immediately.

use crate::{
    note::{NoteValue, Pitch},
    server::{Bundle, Control, Notify, NotifySetting, Server, SynthDefRecv, SynthNew},
    synthdef::encoder::encode_synth_defs,
    transport::Tempo,
    voice::{Kit, VoiceId, VoicePatch},
};
use std::{sync::Mutex, time::SystemTime};
use thiserror::Error;

/// A boxed error returned by [`Synthesizer`] implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A specialized [`Result`] type for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned by [`VoiceGateway`] operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown voice {0}")]
    UnknownVoice(VoiceId),
    #[error("the synthesizer is not ready, call ensure_ready first")]
    NotReady,
    #[error("velocity must be between 0 and 1, got {0}")]
    InvalidVelocity(f32),
    #[error("synthesizer failed: {0}")]
    Synthesis(#[source] BoxError),
}

/// One sound to be produced by a [`Synthesizer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Strike {
    /// When the sound should start. `None` means as soon as possible.
    pub time: Option<SystemTime>,
    /// The oscillator frequency in hertz, before the voice's detune.
    pub frequency: f32,
    /// Linear gain, the voice's level scaled by the request's velocity.
    pub amplitude: f32,
    /// Seconds to hold the sustain level before releasing.
    pub hold: f32,
}

/// A backend that can play the voices of a kit.
pub trait Synthesizer: Send {
    /// Prepares the backend to play `kit`. Called once, before the first [`play`](Self::play).
    fn unlock(&mut self, kit: &Kit) -> std::result::Result<(), BoxError>;

    /// Starts one independent instance of a voice. Must not wait for the sound to finish.
    fn play(&mut self, voice: &VoicePatch, strike: &Strike) -> std::result::Result<(), BoxError>;

    /// Stops every sound and discards anything scheduled.
    fn silence(&mut self) -> std::result::Result<(), BoxError>;
}

/// A request to play one voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerRequest {
    pub voice: VoiceId,
    /// Between `0` and `1`. Defaults to `1`.
    pub velocity: Option<f32>,
    /// When the sound should be heard. Defaults to now.
    pub time: Option<SystemTime>,
    /// Overrides the voice's pitch.
    pub pitch: Option<Pitch>,
    /// Overrides how long the voice is held.
    pub length: Option<NoteValue>,
}

impl TriggerRequest {
    /// A request to play `voice` immediately at full velocity.
    pub fn now(voice: VoiceId) -> TriggerRequest {
        TriggerRequest {
            voice,
            velocity: None,
            time: None,
            pitch: None,
            length: None,
        }
    }

    /// A request to play `voice` at `time`.
    pub fn at(voice: VoiceId, time: SystemTime) -> TriggerRequest {
        TriggerRequest {
            time: Some(time),
            ..TriggerRequest::now(voice)
        }
    }

    pub fn velocity(mut self, velocity: f32) -> TriggerRequest {
        self.velocity = Some(velocity);
        self
    }

    pub fn pitch(mut self, pitch: Pitch) -> TriggerRequest {
        self.pitch = Some(pitch);
        self
    }

    pub fn length(mut self, length: NoteValue) -> TriggerRequest {
        self.length = Some(length);
        self
    }
}

/// Validates trigger requests and forwards them to a [`Synthesizer`].
///
/// Triggers from several threads are serialized on an internal lock. Each trigger is a
/// fire-and-forget send, so the lock is held only briefly.
pub struct VoiceGateway<S> {
    kit: Kit,
    inner: Mutex<Inner<S>>,
}

struct Inner<S> {
    synth: S,
    ready: bool,
    tempo: Tempo,
}

impl<S: Synthesizer> VoiceGateway<S> {
    pub fn new(kit: Kit, synth: S) -> VoiceGateway<S> {
        VoiceGateway {
            kit,
            inner: Mutex::new(Inner {
                synth,
                ready: false,
                tempo: Tempo::default(),
            }),
        }
    }

    /// The voices this gateway can play.
    pub fn kit(&self) -> &Kit {
        &self.kit
    }

    /// Returns whether the unlock handshake has completed.
    pub fn is_ready(&self) -> bool {
        self.inner.lock().unwrap().ready
    }

    /// Performs the unlock handshake if it has not succeeded yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Synthesis`] if the handshake fails. The gateway stays not ready and the
    /// handshake is retried on the next call.
    pub fn ensure_ready(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.ready {
            return Ok(());
        }
        inner.synth.unlock(&self.kit).map_err(Error::Synthesis)?;
        inner.ready = true;
        log::info!("synthesizer ready with {} voices", self.kit.len());
        Ok(())
    }

    /// Plays a voice.
    ///
    /// # Errors
    ///
    /// Requests are checked in this order: [`Error::UnknownVoice`] if the voice is not in the kit,
    /// [`Error::InvalidVelocity`] if the velocity is out of range, and [`Error::NotReady`] if
    /// [`ensure_ready`](VoiceGateway::ensure_ready) has not succeeded. None of these reach the
    /// synthesizer.
    pub fn trigger(&self, request: TriggerRequest) -> Result<()> {
        let voice = self
            .kit
            .get(request.voice)
            .ok_or(Error::UnknownVoice(request.voice))?;
        let velocity = request.velocity.unwrap_or(1.0);
        if !(0.0..=1.0).contains(&velocity) {
            return Err(Error::InvalidVelocity(velocity));
        }

        let mut inner = self.inner.lock().unwrap();
        if !inner.ready {
            return Err(Error::NotReady);
        }
        let length = request.length.unwrap_or(voice.length);
        let sounding = length.duration_at(inner.tempo.bpm()).as_secs_f32();
        let strike = Strike {
            time: request.time,
            frequency: request.pitch.unwrap_or(voice.pitch).hz(),
            amplitude: voice.level * velocity,
            hold: (sounding - voice.attack - voice.decay).max(0.0),
        };
        inner
            .synth
            .play(voice, &strike)
            .map_err(Error::Synthesis)
    }

    /// Sets the tempo used to turn note lengths into seconds.
    pub fn set_tempo(&self, tempo: Tempo) {
        self.inner.lock().unwrap().tempo = tempo;
    }

    /// Silences the synthesizer and returns the gateway to its not-ready state.
    pub fn dispose(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.ready {
            return Ok(());
        }
        inner.ready = false;
        inner.synth.silence().map_err(Error::Synthesis)
    }
}

impl<S> std::fmt::Debug for VoiceGateway<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceGateway")
            .field("voices", &self.kit.len())
            .finish()
    }
}

impl Synthesizer for Server {
    fn unlock(&mut self, kit: &Kit) -> std::result::Result<(), BoxError> {
        match self.send_sync(Notify::new(NotifySetting::Start)) {
            Ok(_) => {}
            // The server refuses a second registration from the same address.
            Err(err) if err.is_rejected() => log::warn!("{}", err),
            Err(err) => return Err(err.into()),
        }
        // One definition per message keeps each packet well under the UDP size limit.
        for synth_def in kit.synth_defs() {
            self.send_sync(SynthDefRecv::new(encode_synth_defs(&[synth_def])))?;
        }
        Ok(())
    }

    fn play(&mut self, voice: &VoicePatch, strike: &Strike) -> std::result::Result<(), BoxError> {
        let synth = SynthNew::new(voice.synth_def_name(), 0).controls(vec![
            Control::new("freq", strike.frequency),
            Control::new("amp", strike.amplitude),
            Control::new("hold", strike.hold),
        ]);
        match strike.time {
            Some(time) => self.send(Bundle::new(time, vec![synth]))?,
            None => self.send(synth)?,
        }
        Ok(())
    }

    fn silence(&mut self) -> std::result::Result<(), BoxError> {
        self.reset()?;
        match self.send_sync(Notify::new(NotifySetting::Stop)) {
            Ok(_) => Ok(()),
            Err(err) if err.is_rejected() => {
                log::warn!("{}", err);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::Shape;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[derive(Debug, Default)]
    struct Calls {
        unlocks: usize,
        plays: Vec<(String, Strike)>,
        silences: usize,
    }

    struct Recorder {
        calls: Arc<Mutex<Calls>>,
        fail_unlock: bool,
    }

    impl Synthesizer for Recorder {
        fn unlock(&mut self, _kit: &Kit) -> std::result::Result<(), BoxError> {
            if self.fail_unlock {
                return Err("unreachable".into());
            }
            self.calls.lock().unwrap().unlocks += 1;
            Ok(())
        }

        fn play(
            &mut self,
            voice: &VoicePatch,
            strike: &Strike,
        ) -> std::result::Result<(), BoxError> {
            let mut calls = self.calls.lock().unwrap();
            calls.plays.push((voice.name.clone(), *strike));
            Ok(())
        }

        fn silence(&mut self) -> std::result::Result<(), BoxError> {
            self.calls.lock().unwrap().silences += 1;
            Ok(())
        }
    }

    fn gateway() -> (VoiceGateway<Recorder>, Arc<Mutex<Calls>>) {
        let kit = Kit::new(vec![
            VoicePatch::new("kick", Shape::Sine)
                .envelope(0.01, 0.1, 0.5, 0.2)
                .pitch(Pitch::from_midi(69))
                .length(NoteValue::Quarter)
                .level(0.5),
            VoicePatch::new("snare", Shape::WhiteNoise),
        ])
        .unwrap();
        let calls = Arc::new(Mutex::new(Calls::default()));
        let synth = Recorder {
            calls: Arc::clone(&calls),
            fail_unlock: false,
        };
        (VoiceGateway::new(kit, synth), calls)
    }

    #[test]
    fn ensure_ready_unlocks_once() {
        let (gateway, calls) = gateway();
        gateway.ensure_ready().unwrap();
        gateway.ensure_ready().unwrap();
        assert_eq!(1, calls.lock().unwrap().unlocks);
        assert!(gateway.is_ready());
    }

    #[test]
    fn failed_unlocks_are_retried() {
        let (mut gateway, calls) = gateway();
        gateway.inner.get_mut().unwrap().synth.fail_unlock = true;
        assert!(matches!(gateway.ensure_ready(), Err(Error::Synthesis(_))));
        assert!(!gateway.is_ready());

        gateway.inner.get_mut().unwrap().synth.fail_unlock = false;
        gateway.ensure_ready().unwrap();
        assert_eq!(1, calls.lock().unwrap().unlocks);
    }

    #[test]
    fn triggers_before_unlocking_are_refused() {
        let (gateway, calls) = gateway();
        assert!(matches!(
            gateway.trigger(TriggerRequest::now(VoiceId(0))),
            Err(Error::NotReady)
        ));
        assert!(calls.lock().unwrap().plays.is_empty());
    }

    #[test]
    fn unknown_voices_produce_no_sound() {
        let (gateway, calls) = gateway();
        gateway.ensure_ready().unwrap();
        assert!(matches!(
            gateway.trigger(TriggerRequest::now(VoiceId(2))),
            Err(Error::UnknownVoice(VoiceId(2)))
        ));
        assert!(calls.lock().unwrap().plays.is_empty());
    }

    #[test]
    fn velocity_must_be_in_range() {
        let (gateway, calls) = gateway();
        gateway.ensure_ready().unwrap();
        for &velocity in &[-0.1, 1.5, f32::NAN] {
            assert!(matches!(
                gateway.trigger(TriggerRequest::now(VoiceId(0)).velocity(velocity)),
                Err(Error::InvalidVelocity(_))
            ));
        }
        assert!(calls.lock().unwrap().plays.is_empty());
    }

    #[test]
    fn strikes_scale_level_and_hold_for_the_note_length() {
        let (gateway, calls) = gateway();
        gateway.ensure_ready().unwrap();
        gateway.set_tempo(Tempo::from_bpm(60.0).unwrap());

        let time = SystemTime::UNIX_EPOCH;
        gateway
            .trigger(TriggerRequest::at(VoiceId(0), time).velocity(0.5))
            .unwrap();
        gateway
            .trigger(
                TriggerRequest::now(VoiceId(0))
                    .pitch(Pitch::from_midi(81))
                    .length(NoteValue::ThirtySecond),
            )
            .unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(2, calls.plays.len());
        let (name, first) = &calls.plays[0];
        assert_eq!("kick", name);
        assert_eq!(Some(time), first.time);
        assert_eq!(440.0, first.frequency);
        assert_eq!(0.25, first.amplitude);
        assert!((first.hold - 0.89).abs() < 1e-6);

        let (_, second) = &calls.plays[1];
        assert_eq!(None, second.time);
        assert_eq!(880.0, second.frequency);
        assert_eq!(0.5, second.amplitude);
        assert!((second.hold - 0.015).abs() < 1e-6);
    }

    #[test]
    fn dispose_silences_and_requires_a_new_unlock() {
        let (gateway, calls) = gateway();
        gateway.dispose().unwrap();
        assert_eq!(0, calls.lock().unwrap().silences);

        gateway.ensure_ready().unwrap();
        gateway.dispose().unwrap();
        assert!(!gateway.is_ready());
        gateway.ensure_ready().unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(1, calls.silences);
        assert_eq!(2, calls.unlocks);
    }
}
