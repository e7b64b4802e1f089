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

//! The drum machine, assembled.
//!
//! An [`AudioSession`] wires a [`PatternStore`], a [`TransportClock`], a [`Sequencer`] and a
//! [`VoiceGateway`] together from a [`Config`]. Nothing is global: every component the session
//! uses is created in [`init`](AudioSession::init) and torn down in
//! [`dispose`](AudioSession::dispose).
//!
//! # Examples
//!
//! ```no_run
//! use cauldron::{config::Config, session::AudioSession};
//! use std::{thread, time::Duration};
//!
//! let session = AudioSession::connect(&Config::from_env())?;
//! session.toggle_step(0, 0)?;
//! session.toggle_step(1, 4)?;
//! session.start()?;
//! thread::sleep(Duration::from_secs(4));
//! session.dispose()?;
//! # Ok::<(), cauldron::Error>(())
//! ```

use crate::{
    config::Config,
    gateway::{Synthesizer, VoiceGateway},
    pattern::{Pattern, PatternChange, PatternStore},
    sequencer::Sequencer,
    server::Server,
    transport::{Subdivision, Tempo, TransportClock, TransportState},
    voice::{Kit, VoiceId},
    Result,
};
use std::sync::Arc;

/// A running drum machine.
pub struct AudioSession<S> {
    pattern: PatternStore,
    gateway: Arc<VoiceGateway<S>>,
    sequencer: Sequencer<S>,
    clock: TransportClock,
    subdivision: Subdivision,
}

impl AudioSession<Server> {
    /// Connects to the SuperCollider server named in the configuration.
    ///
    /// The server is not contacted until [`ensure_ready`](AudioSession::ensure_ready).
    pub fn connect(config: &Config) -> Result<AudioSession<Server>> {
        config.validate()?;
        let server = Server::connect(config.server_address.as_str())?;
        AudioSession::init(config, server)
    }
}

impl<S: Synthesizer + 'static> AudioSession<S> {
    /// Builds a stopped session playing the configured kit through `synth`.
    ///
    /// The pattern has one row per voice and starts empty.
    pub fn init(config: &Config, synth: S) -> Result<AudioSession<S>> {
        config.validate()?;
        let tempo = Tempo::from_bpm(config.tempo_bpm)?;
        let pattern = PatternStore::new(Pattern::new(config.kit.len(), config.step_count));

        let gateway = Arc::new(VoiceGateway::new(config.kit.clone(), synth));
        gateway.set_tempo(tempo);

        let clock = TransportClock::new(config.step_count)?
            .ahead_by(config.ahead_by())
            .subdivision(config.subdivision);
        clock.set_tempo(tempo.bpm())?;
        let sequencer = Sequencer::new(pattern.clone(), Arc::clone(&gateway));
        sequencer.attach(&clock);

        log::info!(
            "session ready: {} voices, {} steps, {} bpm",
            config.kit.len(),
            config.step_count,
            tempo.bpm()
        );
        Ok(AudioSession {
            pattern,
            gateway,
            sequencer,
            clock,
            subdivision: config.subdivision,
        })
    }

    /// Unlocks the synthesizer. Cheap after the first success.
    pub fn ensure_ready(&self) -> Result<()> {
        Ok(self.gateway.ensure_ready()?)
    }

    pub fn pattern(&self) -> &PatternStore {
        &self.pattern
    }

    /// Flips one cell of the pattern and returns its new value.
    ///
    /// Takes effect from the next tick.
    pub fn toggle_step(&self, voice_index: usize, step_index: usize) -> Result<bool> {
        Ok(self.pattern.toggle_step(voice_index, step_index)?)
    }

    /// Observes every change to the pattern.
    pub fn on_pattern_change(&self, observer: impl FnMut(PatternChange) + Send + 'static) {
        self.pattern.on_pattern_change(observer);
    }

    /// Unlocks the synthesizer if needed, then starts the transport at the current tempo.
    ///
    /// Does nothing if the transport is running.
    pub fn start(&self) -> Result<()> {
        self.ensure_ready()?;
        let tempo_bpm = self.clock.state().tempo_bpm;
        self.clock.start(tempo_bpm, self.subdivision)?;
        Ok(())
    }

    /// Stops the transport and returns the current step to `0`.
    ///
    /// Sounds already sent keep playing out.
    pub fn stop(&self) {
        self.clock.stop();
        self.sequencer.reset();
    }

    /// Changes the tempo of the transport and of note lengths.
    pub fn set_tempo(&self, bpm: f64) -> Result<()> {
        let tempo = Tempo::from_bpm(bpm)?;
        self.clock.set_tempo(bpm)?;
        self.gateway.set_tempo(tempo);
        Ok(())
    }

    /// Plays a voice now, as a pad press.
    pub fn hit(&self, voice: VoiceId) -> Result<()> {
        self.ensure_ready()?;
        Ok(self.sequencer.trigger_voice_now(voice)?)
    }

    /// Plays the voice bound to a keyboard key, if there is one.
    pub fn hit_key(&self, key: char) -> Result<Option<VoiceId>> {
        match self.kit().voice_for_key(key) {
            Some(voice) => {
                self.hit(voice)?;
                Ok(Some(voice))
            }
            None => Ok(None),
        }
    }

    pub fn transport(&self) -> TransportState {
        self.clock.state()
    }

    /// The step whose sounds were most recently sent, for highlighting.
    pub fn current_step(&self) -> usize {
        self.sequencer.current_step()
    }

    pub fn gateway(&self) -> &Arc<VoiceGateway<S>> {
        &self.gateway
    }

    pub fn kit(&self) -> &Kit {
        self.gateway.kit()
    }

    /// Stops the transport and silences everything still sounding.
    pub fn dispose(self) -> Result<()> {
        self.stop();
        self.gateway.dispose()?;
        log::info!("session disposed");
        Ok(())
    }
}

impl<S> std::fmt::Debug for AudioSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSession")
            .field("pattern", &self.pattern)
            .field("clock", &self.clock)
            .field("subdivision", &self.subdivision)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        gateway::{self, BoxError, Strike},
        voice::{Shape, VoicePatch},
    };
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Calls {
        unlocks: usize,
        plays: Vec<String>,
        silences: usize,
    }

    struct Recorder(Arc<Mutex<Calls>>);

    impl Synthesizer for Recorder {
        fn unlock(&mut self, _kit: &Kit) -> std::result::Result<(), BoxError> {
            self.0.lock().unwrap().unlocks += 1;
            Ok(())
        }

        fn play(&mut self, voice: &VoicePatch, _: &Strike) -> std::result::Result<(), BoxError> {
            self.0.lock().unwrap().plays.push(voice.name.clone());
            Ok(())
        }

        fn silence(&mut self) -> std::result::Result<(), BoxError> {
            self.0.lock().unwrap().silences += 1;
            Ok(())
        }
    }

    fn session(config: &Config) -> (AudioSession<Recorder>, Arc<Mutex<Calls>>) {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let session = AudioSession::init(config, Recorder(Arc::clone(&calls))).unwrap();
        (session, calls)
    }

    #[test]
    fn patterns_are_sized_by_the_kit_and_step_count() {
        let config = Config {
            step_count: 8,
            ..Config::default()
        };
        let (session, _) = session(&config);
        assert_eq!((16, 8), session.pattern().dimensions());
        assert_eq!(120.0, session.transport().tempo_bpm);
        assert!(!session.transport().running);
    }

    #[test]
    fn invalid_configurations_are_refused() {
        let config = Config {
            tempo_bpm: 0.0,
            ..Config::default()
        };
        let calls = Arc::new(Mutex::new(Calls::default()));
        assert!(matches!(
            AudioSession::init(&config, Recorder(calls)),
            Err(crate::Error::Config(_))
        ));
    }

    #[test]
    fn pad_hits_unlock_once_and_play_by_key() {
        let (session, calls) = session(&Config::default());
        assert_eq!(Some(VoiceId(0)), session.hit_key('1').unwrap());
        assert_eq!(Some(VoiceId(5)), session.hit_key('W').unwrap());
        assert_eq!(None, session.hit_key('9').unwrap());
        assert!(matches!(
            session.hit(VoiceId(16)),
            Err(crate::Error::Gateway(gateway::Error::UnknownVoice(VoiceId(16))))
        ));

        let calls = calls.lock().unwrap();
        assert_eq!(1, calls.unlocks);
        assert_eq!(vec!["kick", "tom1"], calls.plays);
    }

    #[test]
    fn tempo_changes_reach_the_transport() {
        let config = Config {
            kit: Kit::new(vec![VoicePatch::new("beep", Shape::Sine)]).unwrap(),
            ..Config::default()
        };
        let (session, _) = session(&config);
        session.set_tempo(90.0).unwrap();
        assert_eq!(90.0, session.transport().tempo_bpm);
        assert!(session.set_tempo(-1.0).is_err());
        assert_eq!(90.0, session.transport().tempo_bpm);
    }

    #[test]
    fn tempo_checks_use_the_configured_subdivision() {
        let config = Config {
            tempo_bpm: 60_000.0,
            subdivision: Subdivision::Quarter,
            ..Config::default()
        };
        let (session, _) = session(&config);
        assert!(matches!(
            session.set_tempo(120_000.0),
            Err(crate::Error::Transport(_))
        ));
        assert_eq!(60_000.0, session.transport().tempo_bpm);
    }

    #[test]
    fn dispose_stops_and_silences() {
        let (session, calls) = session(&Config::default());
        session.start().unwrap();
        assert!(session.transport().running);
        session.dispose().unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(1, calls.unlocks);
        assert_eq!(1, calls.silences);
    }
}
