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

//! Plays the pattern on every tick of the transport.
//!
//! The [`Sequencer`] is the consumer registered with
//! [`TransportClock::on_tick`](crate::transport::TransportClock::on_tick). For each tick it reads
//! the tick's column from the [`PatternStore`] and asks the [`VoiceGateway`] to play every active
//! voice at the tick's logical time, in voice order. Only after every trigger has been issued does
//! it publish the tick's step as [`current_step`](Sequencer::current_step), so a step is never
//! highlighted before its sound has been sent.

use crate::{
    gateway::{self, Synthesizer, VoiceGateway},
    pattern::{self, PatternStore},
    transport::{Tick, TransportClock},
    voice::VoiceId,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use thiserror::Error;

pub use crate::gateway::TriggerRequest;

/// A specialized [`Result`] type for dispatching ticks.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned by [`Sequencer::dispatch`].
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Pattern(#[from] pattern::Error),
    #[error(transparent)]
    Gateway(#[from] gateway::Error),
}

/// Dispatches the pattern's active voices on each tick.
pub struct Sequencer<S> {
    pattern: PatternStore,
    gateway: Arc<VoiceGateway<S>>,
    current_step: Arc<AtomicUsize>,
}

impl<S> Clone for Sequencer<S> {
    fn clone(&self) -> Sequencer<S> {
        Sequencer {
            pattern: self.pattern.clone(),
            gateway: Arc::clone(&self.gateway),
            current_step: Arc::clone(&self.current_step),
        }
    }
}

impl<S: Synthesizer + 'static> Sequencer<S> {
    pub fn new(pattern: PatternStore, gateway: Arc<VoiceGateway<S>>) -> Sequencer<S> {
        Sequencer {
            pattern,
            gateway,
            current_step: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Triggers every voice active at the tick's step.
    ///
    /// A voice that fails to trigger is logged and skipped; the remaining voices are still played.
    /// Returns the first failure.
    pub fn dispatch(&self, tick: Tick) -> Result<()> {
        let result = self.trigger_step(tick);
        self.current_step.store(tick.step, Ordering::SeqCst);
        result
    }

    fn trigger_step(&self, tick: Tick) -> Result<()> {
        let voices = self.pattern.active_voices_at_step(tick.step).map_err(|err| {
            log::warn!("step {}: {}", tick.step, err);
            err
        })?;

        let mut first_error = None;
        for voice in voices {
            if let Err(err) = self.gateway.trigger(TriggerRequest::at(voice, tick.time)) {
                log::warn!("step {}: voice {}: {}", tick.step, voice, err);
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Plays a voice immediately, outside of the pattern.
    ///
    /// Does not touch the pattern or the current step.
    pub fn trigger_voice_now(&self, voice: VoiceId) -> gateway::Result<()> {
        self.gateway.trigger(TriggerRequest::now(voice))
    }

    /// The step whose triggers were most recently dispatched.
    pub fn current_step(&self) -> usize {
        self.current_step.load(Ordering::SeqCst)
    }

    /// Returns the current step to `0`, for when the transport stops.
    pub fn reset(&self) {
        self.current_step.store(0, Ordering::SeqCst);
    }

    /// Registers this sequencer as the consumer of the clock's ticks.
    pub fn attach(&self, clock: &TransportClock) {
        let sequencer = self.clone();
        clock.on_tick(move |tick| {
            // Failures are logged by dispatch and must not stop the transport.
            let _ = sequencer.dispatch(tick);
        });
    }

    pub fn pattern(&self) -> &PatternStore {
        &self.pattern
    }

    pub fn gateway(&self) -> &Arc<VoiceGateway<S>> {
        &self.gateway
    }
}

impl<S> std::fmt::Debug for Sequencer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequencer")
            .field("pattern", &self.pattern)
            .field("current_step", &self.current_step.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        gateway::{BoxError, Strike},
        pattern::Pattern,
        voice::{Kit, Shape, VoicePatch},
    };
    use pretty_assertions::assert_eq;
    use std::{
        sync::Mutex,
        time::{Duration, SystemTime},
    };

    type Plays = Arc<Mutex<Vec<(String, Option<SystemTime>)>>>;

    struct Capture(Plays);

    impl Synthesizer for Capture {
        fn unlock(&mut self, _kit: &Kit) -> std::result::Result<(), BoxError> {
            Ok(())
        }

        fn play(
            &mut self,
            voice: &VoicePatch,
            strike: &Strike,
        ) -> std::result::Result<(), BoxError> {
            self.0.lock().unwrap().push((voice.name.clone(), strike.time));
            Ok(())
        }

        fn silence(&mut self) -> std::result::Result<(), BoxError> {
            Ok(())
        }
    }

    fn sequencer(voice_count: usize, step_count: usize) -> (Sequencer<Capture>, Plays) {
        let kit = Kit::new(vec![
            VoicePatch::new("kick", Shape::Sine),
            VoicePatch::new("hat", Shape::Square),
        ])
        .unwrap();
        let plays = Plays::default();
        let gateway = Arc::new(VoiceGateway::new(kit, Capture(Arc::clone(&plays))));
        gateway.ensure_ready().unwrap();
        let pattern = PatternStore::new(Pattern::new(voice_count, step_count));
        (Sequencer::new(pattern, gateway), plays)
    }

    fn tick(step: usize) -> Tick {
        Tick {
            step,
            time: SystemTime::UNIX_EPOCH + Duration::from_millis(step as u64 * 125),
        }
    }

    #[test]
    fn one_cycle_triggers_active_cells_in_order() {
        let (sequencer, plays) = sequencer(2, 4);
        sequencer.pattern().toggle_step(0, 0).unwrap();
        sequencer.pattern().toggle_step(0, 2).unwrap();
        sequencer.pattern().toggle_step(1, 3).unwrap();

        for step in 0..4 {
            sequencer.dispatch(tick(step)).unwrap();
            assert_eq!(step, sequencer.current_step());
        }

        assert_eq!(
            vec![
                ("kick".to_owned(), Some(tick(0).time)),
                ("kick".to_owned(), Some(tick(2).time)),
                ("hat".to_owned(), Some(tick(3).time)),
            ],
            *plays.lock().unwrap()
        );
    }

    #[test]
    fn both_voices_on_one_step_play_in_voice_order() {
        let (sequencer, plays) = sequencer(2, 4);
        sequencer.pattern().toggle_step(1, 1).unwrap();
        sequencer.pattern().toggle_step(0, 1).unwrap();
        sequencer.dispatch(tick(1)).unwrap();

        let names = plays
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect::<Vec<_>>();
        assert_eq!(vec!["kick", "hat"], names);
    }

    #[test]
    fn edits_between_ticks_apply_from_the_next_tick() {
        let (sequencer, plays) = sequencer(2, 4);
        sequencer.pattern().toggle_step(0, 0).unwrap();
        sequencer.dispatch(tick(0)).unwrap();

        sequencer.pattern().toggle_step(1, 1).unwrap();
        sequencer.pattern().toggle_step(0, 0).unwrap();
        sequencer.dispatch(tick(1)).unwrap();

        assert_eq!(
            vec![
                ("kick".to_owned(), Some(tick(0).time)),
                ("hat".to_owned(), Some(tick(1).time)),
            ],
            *plays.lock().unwrap()
        );

        // The next cycle sees the removed cell.
        sequencer.dispatch(tick(0)).unwrap();
        assert_eq!(2, plays.lock().unwrap().len());
    }

    #[test]
    fn a_failing_voice_does_not_block_the_others() {
        // The pattern has a row for a voice the kit does not contain.
        let (sequencer, plays) = sequencer(3, 4);
        sequencer.pattern().toggle_step(2, 0).unwrap();
        sequencer.pattern().toggle_step(0, 0).unwrap();

        let err = sequencer.dispatch(tick(0)).unwrap_err();
        assert!(matches!(
            err,
            Error::Gateway(gateway::Error::UnknownVoice(VoiceId(2)))
        ));
        assert_eq!(1, plays.lock().unwrap().len());
    }

    #[test]
    fn steps_beyond_the_pattern_are_reported() {
        let (sequencer, plays) = sequencer(2, 4);
        assert!(matches!(
            sequencer.dispatch(tick(4)),
            Err(Error::Pattern(pattern::Error::IndexOutOfRange { .. }))
        ));
        assert!(plays.lock().unwrap().is_empty());
    }

    #[test]
    fn live_triggers_bypass_the_pattern() {
        let (sequencer, plays) = sequencer(2, 4);
        sequencer.dispatch(tick(3)).unwrap();
        sequencer.trigger_voice_now(VoiceId(1)).unwrap();
        sequencer.trigger_voice_now(VoiceId(1)).unwrap();

        assert_eq!(3, sequencer.current_step());
        assert_eq!(
            vec![("hat".to_owned(), None), ("hat".to_owned(), None)],
            *plays.lock().unwrap()
        );
        assert!(sequencer.trigger_voice_now(VoiceId(5)).is_err());
    }
}
