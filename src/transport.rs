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

//! An ahead-of-time clock that ticks once per step of a pattern.
//!
//! A [`TransportClock`] runs a dedicated thread that produces one [`Tick`] per musical
//! subdivision and hands it to a single consumer registered with [`TransportClock::on_tick`].
//! The clock knows nothing about patterns; it only counts steps.
//!
//! # Logical Time
//!
//! Every tick carries a logical `time`: the moment its sound should be heard. Logical time
//! advances by exactly one tick interval per tick and is never affected by fluctuations in system
//! performance. Ticks are dispatched [`ahead_by`](TransportClock::ahead_by) before their logical
//! time, which leaves room for the consumer to send timestamped OSC bundles to the SuperCollider
//! server before they need to be played. The actual moment a tick is dispatched will vary by
//! fractions of a millisecond, which is of no consequence as long as bundles arrive early.
//!
//! # Examples
//!
//! ```no_run
//! use cauldron::transport::{Subdivision, TransportClock};
//! use std::{thread, time::Duration};
//!
//! let clock = TransportClock::new(16)?;
//! clock.on_tick(|tick| println!("step {}", tick.step));
//! clock.start(120.0, Subdivision::Sixteenth)?;
//! thread::sleep(Duration::from_secs(2));
//! clock.stop();
//! # cauldron::transport::Result::Ok(())
//! ```

use serde::Serialize;
use std::{
    io,
    sync::{
        atomic::Ordering,
        mpsc::{self, Sender},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::{Duration, SystemTime},
};
use thiserror::Error;

mod timeline;
mod worker;

use timeline::Timeline;
use worker::{Command, Shared};

pub use crate::note::NoteValue as Subdivision;

/// The shortest time allowed between two ticks.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// A specialized [`Result`] type for transport operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned by [`TransportClock`] operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("tempo must be a positive, finite number of beats per minute, got {0}")]
    InvalidTempo(f64),
    #[error("a transport needs at least one step")]
    NoSteps,
    #[error("failed to spawn the transport thread: {0}")]
    Spawn(#[source] io::Error),
}

/// A musical tempo.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct Tempo {
    bpm: f64,
}

impl Default for Tempo {
    /// Returns a tempo of 120 BPM (beats per minute).
    fn default() -> Tempo {
        Tempo { bpm: 120.0 }
    }
}

impl Tempo {
    /// Create a tempo from a BPM (beats per minute).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTempo`] if `bpm` is not finite, zero, negative, or so slow that a
    /// single beat would not fit in a [`Duration`].
    ///
    /// # Examples
    ///
    /// ```
    /// use cauldron::transport::{Subdivision, Tempo};
    /// use std::time::Duration;
    ///
    /// let tempo = Tempo::from_bpm(120.0)?;
    /// assert_eq!(tempo.tick_interval(Subdivision::Sixteenth), Duration::from_millis(125));
    /// assert!(Tempo::from_bpm(0.0).is_err());
    /// # cauldron::transport::Result::Ok(())
    /// ```
    pub fn from_bpm(bpm: f64) -> Result<Tempo> {
        if bpm.is_finite() && bpm > 0.0 && 240.0 / bpm < f64::from(u32::MAX) {
            Ok(Tempo { bpm })
        } else {
            Err(Error::InvalidTempo(bpm))
        }
    }

    /// Returns the tempo in beats per minute.
    pub fn bpm(self) -> f64 {
        self.bpm
    }

    /// Returns the time between two ticks at the given subdivision.
    pub fn tick_interval(self, subdivision: Subdivision) -> Duration {
        Duration::from_secs_f64(60.0 / self.bpm / subdivision.per_beat())
    }

    /// Returns the tick interval, or [`Error::InvalidTempo`] if it is shorter than
    /// [`MIN_TICK_INTERVAL`].
    pub fn checked_tick_interval(self, subdivision: Subdivision) -> Result<Duration> {
        let interval = self.tick_interval(subdivision);
        if interval < MIN_TICK_INTERVAL {
            return Err(Error::InvalidTempo(self.bpm));
        }
        Ok(interval)
    }
}

/// One firing of the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// The step this tick plays, in `0..step_count`.
    pub step: usize,
    /// The logical time at which this step should be heard.
    pub time: SystemTime,
}

/// A snapshot of the transport.
///
/// `current_step` is the step of the most recent tick, and is `0` while the transport is stopped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TransportState {
    pub tempo_bpm: f64,
    pub subdivision: Subdivision,
    pub running: bool,
    pub current_step: usize,
}

/// Produces a steady stream of ticks at a tempo.
///
/// The clock owns its thread. Dropping the clock stops it.
pub struct TransportClock {
    step_count: usize,
    ahead_by: Duration,
    shared: Arc<Shared>,
    control: Mutex<Control>,
}

struct Control {
    tempo: Tempo,
    subdivision: Subdivision,
    worker: Option<Worker>,
}

struct Worker {
    commands: Sender<Command>,
    thread: JoinHandle<()>,
}

impl TransportClock {
    /// Creates a stopped clock that counts `step_count` steps per cycle.
    pub fn new(step_count: usize) -> Result<TransportClock> {
        if step_count == 0 {
            return Err(Error::NoSteps);
        }
        Ok(TransportClock {
            step_count,
            ahead_by: Duration::from_millis(50),
            shared: Arc::new(Shared::new()),
            control: Mutex::new(Control {
                tempo: Tempo::default(),
                subdivision: Subdivision::default(),
                worker: None,
            }),
        })
    }

    /// Dispatch ticks in advance of their logical time.
    ///
    /// Bundles sent to SuperCollider with a tick's time must arrive before that time to be played
    /// on the beat, so each tick is handed to the consumer this long before it is due. The first
    /// tick after [`start`](TransportClock::start) is due twice this long after `start` is called.
    ///
    /// Defaults to 50 milliseconds.
    pub fn ahead_by(mut self, ahead_by: Duration) -> TransportClock {
        self.ahead_by = ahead_by;
        self
    }

    /// Sets the subdivision used to check tempo changes made before the clock is started.
    ///
    /// [`start`](TransportClock::start) replaces it with its own. Defaults to sixteenth notes.
    pub fn subdivision(mut self, subdivision: Subdivision) -> TransportClock {
        self.control.get_mut().unwrap().subdivision = subdivision;
        self
    }

    /// Registers the consumer of ticks, replacing any previous one.
    ///
    /// The callback runs on the clock's thread. It may call [`stop`](TransportClock::stop) and
    /// [`state`](TransportClock::state), but must not call `on_tick` itself.
    pub fn on_tick(&self, on_tick: impl FnMut(Tick) + Send + 'static) {
        *self.shared.on_tick.lock().unwrap() = Some(Box::new(on_tick));
    }

    /// Starts ticking at the given tempo.
    ///
    /// Does nothing if the clock is already running; the running tempo is left untouched.
    pub fn start(&self, bpm: f64, subdivision: Subdivision) -> Result<()> {
        let tempo = Tempo::from_bpm(bpm)?;
        let interval = tempo.checked_tick_interval(subdivision)?;
        let mut control = self.control.lock().unwrap();
        if control.worker.is_some() {
            return Ok(());
        }

        let first_tick = SystemTime::now() + self.ahead_by * 2;
        let timeline = Timeline::new(self.step_count, first_tick, interval);
        let (commands, receiver) = mpsc::channel();
        let thread = thread::Builder::new()
            .name("cauldron-transport".to_owned())
            .spawn({
                let ahead_by = self.ahead_by;
                let shared = Arc::clone(&self.shared);
                move || worker::run(timeline, ahead_by, receiver, shared)
            })
            .map_err(Error::Spawn)?;

        self.shared.current_step.store(0, Ordering::SeqCst);
        control.tempo = tempo;
        control.subdivision = subdivision;
        control.worker = Some(Worker { commands, thread });
        log::info!("transport started at {} bpm, one step per {}", bpm, subdivision);
        Ok(())
    }

    /// Changes the tempo.
    ///
    /// The tick whose logical time is already fixed keeps it; every tick after that is spaced by
    /// the new interval.
    pub fn set_tempo(&self, bpm: f64) -> Result<()> {
        let tempo = Tempo::from_bpm(bpm)?;
        let mut control = self.control.lock().unwrap();
        let interval = tempo.checked_tick_interval(control.subdivision)?;
        control.tempo = tempo;
        if let Some(worker) = &control.worker {
            // A closed channel means the worker is already on its way out.
            let _ = worker.commands.send(Command::SetInterval(interval));
        }
        log::debug!("transport tempo set to {} bpm", bpm);
        Ok(())
    }

    /// Stops the clock and resets the current step to `0`.
    ///
    /// No tick is dispatched after this returns, unless it is called from the tick callback, in
    /// which case the tick in progress is the last. Stopping a stopped clock does nothing.
    pub fn stop(&self) {
        let worker = self.control.lock().unwrap().worker.take();
        if let Some(Worker { commands, thread }) = worker {
            let _ = commands.send(Command::Stop);
            if thread.thread().id() != thread::current().id() && thread.join().is_err() {
                log::warn!("transport thread panicked");
            }
            self.shared.current_step.store(0, Ordering::SeqCst);
            log::info!("transport stopped");
        }
    }

    /// Returns whether the clock is running.
    pub fn is_running(&self) -> bool {
        self.control.lock().unwrap().worker.is_some()
    }

    /// Returns the number of steps in one cycle.
    pub fn step_count(&self) -> usize {
        self.step_count
    }

    /// Returns a snapshot of the transport.
    pub fn state(&self) -> TransportState {
        let control = self.control.lock().unwrap();
        TransportState {
            tempo_bpm: control.tempo.bpm(),
            subdivision: control.subdivision,
            running: control.worker.is_some(),
            current_step: self.shared.current_step.load(Ordering::SeqCst),
        }
    }
}

impl Drop for TransportClock {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for TransportClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportClock")
            .field("step_count", &self.step_count)
            .field("ahead_by", &self.ahead_by)
            .field("state", &self.state())
            .finish()
    }
}
