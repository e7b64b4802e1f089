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

use super::{timeline::Timeline, Tick};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc::{Receiver, RecvTimeoutError},
        Arc, Mutex,
    },
    time::{Duration, SystemTime},
};

pub(crate) type TickCallback = Box<dyn FnMut(Tick) + Send>;

/// State shared between a transport and its clock thread.
pub(crate) struct Shared {
    pub(crate) current_step: AtomicUsize,
    pub(crate) on_tick: Mutex<Option<TickCallback>>,
}

impl Shared {
    pub(crate) fn new() -> Shared {
        Shared {
            current_step: AtomicUsize::new(0),
            on_tick: Mutex::new(None),
        }
    }
}

#[derive(Debug)]
pub(crate) enum Command {
    SetInterval(Duration),
    Stop,
}

/// Runs the clock until it receives [`Command::Stop`] or its transport is dropped.
///
/// Each tick is dispatched `ahead_by` before its logical time. Commands are only read between
/// ticks, so a tick is never interrupted part way through its dispatch.
pub(crate) fn run(
    mut timeline: Timeline,
    ahead_by: Duration,
    commands: Receiver<Command>,
    shared: Arc<Shared>,
) {
    loop {
        let logical_time = timeline.peek_time();
        let dispatch_at = logical_time.checked_sub(ahead_by).unwrap_or(logical_time);

        loop {
            let delay = dispatch_at
                .duration_since(SystemTime::now())
                .unwrap_or_default();
            match commands.recv_timeout(delay) {
                Ok(Command::SetInterval(interval)) => timeline.set_interval(interval),
                Ok(Command::Stop) | Err(RecvTimeoutError::Disconnected) => return,
                Err(RecvTimeoutError::Timeout) => break,
            }
        }

        let tick = timeline.next_tick();
        log::trace!("tick: step {} at {:?}", tick.step, tick.time);
        if let Ok(late_by) = SystemTime::now().duration_since(tick.time) {
            log::warn!("step {} dispatched {:?} after it was due", tick.step, late_by);
        }
        shared.current_step.store(tick.step, Ordering::SeqCst);
        if let Some(on_tick) = shared.on_tick.lock().unwrap().as_mut() {
            on_tick(tick);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::{sync::mpsc, thread};

    #[test]
    fn stops_when_the_transport_goes_away() {
        let shared = Arc::new(Shared::new());
        let (sender, receiver) = mpsc::channel();
        let start = SystemTime::now() + Duration::from_secs(60);
        let timeline = Timeline::new(4, start, Duration::from_millis(100));

        let worker = thread::spawn({
            let shared = Arc::clone(&shared);
            move || run(timeline, Duration::from_millis(10), receiver, shared)
        });
        drop(sender);
        worker.join().unwrap();
        assert_eq!(0, shared.current_step.load(Ordering::SeqCst));
    }

    #[test]
    fn late_ticks_are_dispatched_immediately_and_in_order() {
        let shared = Arc::new(Shared::new());
        let (ticks_sender, ticks) = mpsc::channel();
        *shared.on_tick.lock().unwrap() = Some(Box::new(move |tick: Tick| {
            let _ = ticks_sender.send(tick.step);
        }));

        let (sender, receiver) = mpsc::channel();
        let start = SystemTime::now() - Duration::from_secs(1);
        let timeline = Timeline::new(3, start, Duration::from_millis(1));
        let worker = thread::spawn({
            let shared = Arc::clone(&shared);
            move || run(timeline, Duration::from_millis(0), receiver, shared)
        });

        let steps = ticks.iter().take(5).collect::<Vec<_>>();
        sender.send(Command::Stop).unwrap();
        worker.join().unwrap();
        assert_eq!(vec![0, 1, 2, 0, 1], steps);
    }
}
