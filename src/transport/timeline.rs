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

use super::Tick;
use std::time::{Duration, SystemTime};

/// The logical-time sequence of ticks produced by a running transport.
///
/// Logical time only advances by exactly one interval per tick, so it never drifts with the
/// performance of the thread that walks it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Timeline {
    step_count: usize,
    next_step: usize,
    next_time: SystemTime,
    interval: Duration,
}

impl Timeline {
    pub(crate) fn new(step_count: usize, first_time: SystemTime, interval: Duration) -> Timeline {
        Timeline {
            step_count,
            next_step: 0,
            next_time: first_time,
            interval,
        }
    }

    /// The logical time of the next tick. This time is fixed once the previous tick is taken.
    pub(crate) fn peek_time(&self) -> SystemTime {
        self.next_time
    }

    /// Takes the next tick and schedules the one after it using the current interval.
    pub(crate) fn next_tick(&mut self) -> Tick {
        let tick = Tick {
            step: self.next_step,
            time: self.next_time,
        };
        self.next_step = (self.next_step + 1) % self.step_count;
        self.next_time += self.interval;
        tick
    }

    /// Changes the spacing of ticks that have not been scheduled yet.
    pub(crate) fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn steps_wrap_around_the_pattern() {
        let start = SystemTime::UNIX_EPOCH;
        let mut timeline = Timeline::new(4, start, ms(100));
        let ticks = (0..6).map(|_| timeline.next_tick()).collect::<Vec<_>>();
        assert_eq!(
            vec![
                Tick { step: 0, time: start },
                Tick { step: 1, time: start + ms(100) },
                Tick { step: 2, time: start + ms(200) },
                Tick { step: 3, time: start + ms(300) },
                Tick { step: 0, time: start + ms(400) },
                Tick { step: 1, time: start + ms(500) },
            ],
            ticks
        );
    }

    #[test]
    fn interval_changes_leave_the_pending_tick_alone() {
        let start = SystemTime::UNIX_EPOCH;
        let mut timeline = Timeline::new(16, start, ms(125));
        timeline.next_tick();
        timeline.set_interval(ms(250));
        assert_eq!(start + ms(125), timeline.peek_time());
        timeline.next_tick();
        assert_eq!(start + ms(375), timeline.peek_time());
    }

    #[test]
    fn tempo_changes_keep_the_ticks_per_cycle() {
        let mut timeline = Timeline::new(16, SystemTime::UNIX_EPOCH, ms(125));
        let mut steps = Vec::new();
        for i in 0..16 {
            if i == 5 {
                timeline.set_interval(ms(60));
            }
            steps.push(timeline.next_tick().step);
        }
        assert_eq!((0..16).collect::<Vec<_>>(), steps);
    }
}
