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

//! A step sequencer and drum machine that plays through
//! [SuperCollider](https://supercollider.github.io/).
//!
//! # Introduction
//!
//! Cauldron keeps a grid of steps, one row per drum voice, and walks through it at a tempo. Every
//! active cell of the current step becomes a synth on **scsynth**, SuperCollider's real-time
//! audio server. Each step is sent ahead of time inside a timestamped OSC bundle, so the server
//! plays it on the beat no matter how busy the program sending it is.
//!
//! The crate is organised around the path a step takes from the grid to the speakers:
//!
//!  * [`pattern`] - The grid of steps and a shared [`PatternStore`](pattern::PatternStore) that
//!    can be edited while the sequencer plays it.
//!
//!  * [`transport`] - A [`TransportClock`](transport::TransportClock) that ticks once per step
//!    on its own thread, in advance of each step's logical time.
//!
//!  * [`sequencer`] - Turns each tick into trigger requests for the step's active voices.
//!
//!  * [`gateway`] - Checks trigger requests against the kit and forwards them to a
//!    [`Synthesizer`](gateway::Synthesizer), normally the SuperCollider
//!    [`Server`](server::Server).
//!
//!  * [`voice`] - Voice patches and the [`Kit`](voice::Kit) of voices a session plays. Each patch
//!    is compiled into a synth definition with the [`synthdef`] module.
//!
//!  * [`server`] - Communication with scsynth over OSC.
//!
//!  * [`session`] - An [`AudioSession`](session::AudioSession) that assembles all of the above
//!    from a [`Config`](config::Config).
//!
//! The [`instrument`] module adds a playable piano and guitar, and [`recorder`] records from a
//! host provided capture device.
//!
//! # Examples
//!
//! A SuperCollider server must be started outside of this program and be listening on the
//! configured UDP port.
//!
//! ```no_run
//! use cauldron::{config::Config, session::AudioSession};
//! use std::{thread::sleep, time::Duration};
//!
//! fn main() -> cauldron::Result<()> {
//!     let session = AudioSession::connect(&Config::default())?;
//!
//!     // Four on the floor, with a snare on two and four.
//!     for step in (0..16).step_by(4) {
//!         session.toggle_step(0, step)?;
//!     }
//!     session.toggle_step(1, 4)?;
//!     session.toggle_step(1, 12)?;
//!
//!     session.start()?;
//!     sleep(Duration::from_secs(4));
//!     session.set_tempo(140.0)?;
//!     sleep(Duration::from_secs(4));
//!     session.dispose()
//! }
//! ```
//!
//! # Logging
//!
//! Cauldron logs through the [`log`](https://docs.rs/log) facade and never installs a logger.
//! Every OSC packet is logged at the debug level, and failures on background threads, which have
//! nowhere else to go, are logged as warnings.

pub mod config;
pub mod gateway;
pub mod instrument;
pub mod note;
pub mod pattern;
pub mod recorder;
pub mod sequencer;
pub mod server;
pub mod session;
pub mod synthdef;
pub mod transport;
pub mod voice;

use thiserror::Error;

/// A specialized [`Result`] type for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Any error produced by this crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] config::Error),
    #[error(transparent)]
    Server(#[from] server::Error),
    #[error(transparent)]
    Transport(#[from] transport::Error),
    #[error(transparent)]
    Pattern(#[from] pattern::Error),
    #[error(transparent)]
    Gateway(#[from] gateway::Error),
    #[error(transparent)]
    Sequencer(#[from] sequencer::Error),
    #[error(transparent)]
    Voice(#[from] voice::Error),
    #[error(transparent)]
    Note(#[from] note::Error),
    #[error(transparent)]
    Instrument(#[from] instrument::Error),
    #[error(transparent)]
    Recorder(#[from] recorder::Error),
}
