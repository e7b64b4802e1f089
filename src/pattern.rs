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

//! The step grid played by the sequencer.
//!
//! A [`Pattern`] is a fixed size grid of booleans with one row per voice and one column per step.
//! A cell that is `true` means "play this voice on this step". Patterns know nothing about time;
//! the [`transport`](crate::transport) decides when each step happens and the
//! [`sequencer`](crate::sequencer) reads the matching column.
//!
//! # Examples
//!
//! ```
//! use cauldron::{pattern::Pattern, voice::VoiceId};
//!
//! let mut pattern = Pattern::new(2, 4);
//! pattern.toggle_step(0, 0)?;
//! pattern.toggle_step(0, 2)?;
//! pattern.toggle_step(1, 2)?;
//!
//! assert_eq!(pattern.active_voices_at_step(2)?, vec![VoiceId(0), VoiceId(1)]);
//! assert!(pattern.active_voices_at_step(1)?.is_empty());
//! # Ok::<(), cauldron::pattern::Error>(())
//! ```
//!
//! # Sharing Patterns
//!
//! While the sequencer is playing, the transport thread reads the pattern on every tick and the
//! application edits it in between. [`PatternStore`] wraps a pattern for this: it is cheap to
//! clone, every clone refers to the same grid, and edits take effect on the next tick that reads
//! the grid.

use crate::voice::VoiceId;
use serde::{Deserialize, Serialize};
use std::{
    convert::TryFrom,
    fmt,
    sync::{Arc, Mutex, RwLock},
};
use thiserror::Error;

/// A specialized [`Result`] type for pattern operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned by [`Pattern`] and [`PatternStore`] operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("{axis} index {index} is out of range, the pattern has {len} {axis}s")]
    IndexOutOfRange { axis: Axis, index: usize, len: usize },
    #[error("pattern row {row} has {found} steps, expected {expected}")]
    RaggedRow {
        row: usize,
        found: usize,
        expected: usize,
    },
}

/// Identifies which coordinate of a pattern was out of range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Voice,
    Step,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Voice => write!(f, "voice"),
            Axis::Step => write!(f, "step"),
        }
    }
}

/// A grid of voices by steps.
///
/// Every cell is always defined. Serializes as a list of rows, one per voice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<bool>>", into = "Vec<Vec<bool>>")]
pub struct Pattern {
    voice_count: usize,
    step_count: usize,
    cells: Vec<bool>,
}

impl Pattern {
    /// Creates a pattern with every cell turned off.
    pub fn new(voice_count: usize, step_count: usize) -> Pattern {
        Pattern {
            voice_count,
            step_count,
            cells: vec![false; voice_count * step_count],
        }
    }

    /// Returns the number of voices (rows) in the pattern.
    pub fn voice_count(&self) -> usize {
        self.voice_count
    }

    /// Returns the number of steps (columns) in the pattern.
    pub fn step_count(&self) -> usize {
        self.step_count
    }

    /// Returns whether the voice plays on the step.
    pub fn is_active(&self, voice_index: usize, step_index: usize) -> Result<bool> {
        Ok(self.cells[self.index(voice_index, step_index)?])
    }

    /// Flips exactly one cell and returns its new value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if either index is outside of the grid, in which case
    /// the pattern is left untouched.
    pub fn toggle_step(&mut self, voice_index: usize, step_index: usize) -> Result<bool> {
        let index = self.index(voice_index, step_index)?;
        self.cells[index] = !self.cells[index];
        Ok(self.cells[index])
    }

    /// Sets one cell to the given value.
    pub fn set_step(&mut self, voice_index: usize, step_index: usize, active: bool) -> Result<()> {
        let index = self.index(voice_index, step_index)?;
        self.cells[index] = active;
        Ok(())
    }

    /// Returns every voice that plays on the step, in voice index order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `step_index` is outside of the grid.
    pub fn active_voices_at_step(&self, step_index: usize) -> Result<Vec<VoiceId>> {
        self.check_step(step_index)?;
        Ok((0..self.voice_count)
            .filter(|voice_index| self.cells[voice_index * self.step_count + step_index])
            .map(VoiceId)
            .collect())
    }

    /// Turns every cell off.
    pub fn clear(&mut self) {
        self.cells.iter_mut().for_each(|cell| *cell = false);
    }

    fn index(&self, voice_index: usize, step_index: usize) -> Result<usize> {
        if voice_index >= self.voice_count {
            return Err(Error::IndexOutOfRange {
                axis: Axis::Voice,
                index: voice_index,
                len: self.voice_count,
            });
        }
        self.check_step(step_index)?;
        Ok(voice_index * self.step_count + step_index)
    }

    fn check_step(&self, step_index: usize) -> Result<()> {
        if step_index >= self.step_count {
            return Err(Error::IndexOutOfRange {
                axis: Axis::Step,
                index: step_index,
                len: self.step_count,
            });
        }
        Ok(())
    }
}

impl TryFrom<Vec<Vec<bool>>> for Pattern {
    type Error = Error;

    fn try_from(rows: Vec<Vec<bool>>) -> Result<Pattern> {
        let step_count = rows.first().map(Vec::len).unwrap_or(0);
        for (row, steps) in rows.iter().enumerate() {
            if steps.len() != step_count {
                return Err(Error::RaggedRow {
                    row,
                    found: steps.len(),
                    expected: step_count,
                });
            }
        }
        Ok(Pattern {
            voice_count: rows.len(),
            step_count,
            cells: rows.into_iter().flatten().collect(),
        })
    }
}

impl From<Pattern> for Vec<Vec<bool>> {
    fn from(pattern: Pattern) -> Vec<Vec<bool>> {
        if pattern.step_count == 0 {
            return vec![Vec::new(); pattern.voice_count];
        }
        pattern
            .cells
            .chunks(pattern.step_count)
            .map(<[bool]>::to_vec)
            .collect()
    }
}

/// A change made to a [`PatternStore`].
///
/// Passed to the observers registered with [`PatternStore::on_pattern_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternChange {
    /// A single cell was set.
    Step {
        voice: VoiceId,
        step: usize,
        active: bool,
    },
    /// Every cell was turned off.
    Cleared,
}

type Observer = Box<dyn FnMut(PatternChange) + Send>;

/// A shared, observable [`Pattern`].
///
/// Clones refer to the same pattern. See [the module level documentation](self).
#[derive(Clone)]
pub struct PatternStore(Arc<StoreInner>);

struct StoreInner {
    pattern: RwLock<Pattern>,
    observers: Mutex<Vec<Observer>>,
}

impl fmt::Debug for PatternStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let observers_len = self.0.observers.lock().unwrap().len();
        f.debug_struct("PatternStore")
            .field("pattern", &*self.0.pattern.read().unwrap())
            .field("observers", &observers_len)
            .finish()
    }
}

impl PatternStore {
    /// Wraps a pattern for sharing.
    pub fn new(pattern: Pattern) -> PatternStore {
        PatternStore(Arc::new(StoreInner {
            pattern: RwLock::new(pattern),
            observers: Mutex::new(Vec::new()),
        }))
    }

    /// Returns a copy of the current pattern.
    pub fn snapshot(&self) -> Pattern {
        self.0.pattern.read().unwrap().clone()
    }

    /// Returns the number of voices and steps in the pattern.
    pub fn dimensions(&self) -> (usize, usize) {
        let pattern = self.0.pattern.read().unwrap();
        (pattern.voice_count(), pattern.step_count())
    }

    /// Flips one cell and returns its new value. See [`Pattern::toggle_step`].
    pub fn toggle_step(&self, voice_index: usize, step_index: usize) -> Result<bool> {
        let active = self
            .0
            .pattern
            .write()
            .unwrap()
            .toggle_step(voice_index, step_index)?;
        self.notify(PatternChange::Step {
            voice: VoiceId(voice_index),
            step: step_index,
            active,
        });
        Ok(active)
    }

    /// Sets one cell. See [`Pattern::set_step`].
    pub fn set_step(&self, voice_index: usize, step_index: usize, active: bool) -> Result<()> {
        self.0
            .pattern
            .write()
            .unwrap()
            .set_step(voice_index, step_index, active)?;
        self.notify(PatternChange::Step {
            voice: VoiceId(voice_index),
            step: step_index,
            active,
        });
        Ok(())
    }

    /// Turns every cell off.
    pub fn clear(&self) {
        self.0.pattern.write().unwrap().clear();
        self.notify(PatternChange::Cleared);
    }

    /// Returns every voice that plays on the step. See [`Pattern::active_voices_at_step`].
    pub fn active_voices_at_step(&self, step_index: usize) -> Result<Vec<VoiceId>> {
        self.0
            .pattern
            .read()
            .unwrap()
            .active_voices_at_step(step_index)
    }

    /// Registers a function that is called after every change to the pattern.
    ///
    /// Observers are called on the thread that made the change, after the change is visible to
    /// readers. Observers must not edit the store they observe.
    pub fn on_pattern_change(&self, observer: impl FnMut(PatternChange) + Send + 'static) {
        self.0.observers.lock().unwrap().push(Box::new(observer));
    }

    fn notify(&self, change: PatternChange) {
        for observer in self.0.observers.lock().unwrap().iter_mut() {
            observer(change);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::mpsc;

    #[test]
    fn new_patterns_are_empty() {
        let pattern = Pattern::new(8, 16);
        for step in 0..16 {
            assert_eq!(Ok(vec![]), pattern.active_voices_at_step(step));
        }
    }

    #[test]
    fn toggling_twice_restores_the_grid() {
        let mut pattern = Pattern::new(3, 5);
        pattern.set_step(2, 4, true).unwrap();
        let original = pattern.clone();

        for voice in 0..3 {
            for step in 0..5 {
                pattern.toggle_step(voice, step).unwrap();
                assert_ne!(original, pattern);
                pattern.toggle_step(voice, step).unwrap();
                assert_eq!(original, pattern);
            }
        }
    }

    #[test]
    fn toggle_flips_exactly_one_cell() {
        let mut pattern = Pattern::new(2, 2);
        assert_eq!(Ok(true), pattern.toggle_step(1, 0));
        assert_eq!(
            vec![vec![false, false], vec![true, false]],
            Vec::<Vec<bool>>::from(pattern)
        );
    }

    #[test]
    fn out_of_range_indices_are_rejected() {
        let mut pattern = Pattern::new(2, 4);
        assert_eq!(
            Err(Error::IndexOutOfRange {
                axis: Axis::Voice,
                index: 2,
                len: 2
            }),
            pattern.toggle_step(2, 0)
        );
        assert_eq!(
            Err(Error::IndexOutOfRange {
                axis: Axis::Step,
                index: 4,
                len: 4
            }),
            pattern.toggle_step(0, 4)
        );
        assert_eq!(
            Err(Error::IndexOutOfRange {
                axis: Axis::Step,
                index: 9,
                len: 4
            }),
            pattern.active_voices_at_step(9)
        );
        assert_eq!(Pattern::new(2, 4), pattern);
    }

    #[test]
    fn active_voices_are_in_voice_order() {
        let mut pattern = Pattern::new(4, 2);
        pattern.set_step(3, 1, true).unwrap();
        pattern.set_step(0, 1, true).unwrap();
        pattern.set_step(2, 1, true).unwrap();
        assert_eq!(
            Ok(vec![VoiceId(0), VoiceId(2), VoiceId(3)]),
            pattern.active_voices_at_step(1)
        );
    }

    #[test]
    fn patterns_deserialize_from_rows() {
        let pattern: Pattern = serde_json::from_str("[[true,false,false],[false,false,true]]")
            .expect("valid pattern");
        assert_eq!(2, pattern.voice_count());
        assert_eq!(3, pattern.step_count());
        assert_eq!(Ok(vec![VoiceId(1)]), pattern.active_voices_at_step(2));

        let ragged = serde_json::from_str::<Pattern>("[[true,false],[false]]");
        assert!(ragged.is_err());
    }

    #[test]
    fn store_notifies_observers_of_changes() {
        let store = PatternStore::new(Pattern::new(2, 4));
        let (sender, receiver) = mpsc::channel();
        store.on_pattern_change(move |change| sender.send(change).unwrap());

        store.toggle_step(1, 3).unwrap();
        store.clear();
        assert!(store.toggle_step(5, 0).is_err());

        assert_eq!(
            vec![
                PatternChange::Step {
                    voice: VoiceId(1),
                    step: 3,
                    active: true
                },
                PatternChange::Cleared,
            ],
            receiver.try_iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn store_clones_share_the_grid() {
        let store = PatternStore::new(Pattern::new(2, 4));
        let reader = store.clone();
        store.set_step(0, 1, true).unwrap();
        assert_eq!(Ok(vec![VoiceId(0)]), reader.active_voices_at_step(1));
        assert_eq!((2, 4), reader.dimensions());
    }
}
