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

//! Records what the session plays.
//!
//! Capturing audio is left to the host: a [`CaptureService`] hands out [`CaptureStream`]s, which
//! encode audio until they are finished. The [`Recorder`] drives a stream through its lifecycle,
//! keeps track of how long it has been recording, and turns the finished stream into a
//! [`Download`].
//!
//! ```text
//!           start            pause
//!   Idle ----------> Recording -----> Paused
//!    ^                 |   ^            |
//!    |      stop       |   |  resume    |
//!    +-----------------+   +------------+
//!    ^                                  |
//!    +---------------- stop ------------+
//! ```

use std::{
    fs, io,
    path::{Path, PathBuf},
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};
use thiserror::Error;

/// A boxed error returned by capture implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A specialized [`Result`] type for recording.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned by the [`Recorder`] and capture implementations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("permission to capture audio was denied")]
    PermissionDenied,
    #[error("no capture device is available: {0}")]
    DeviceUnavailable(String),
    #[error("not recording")]
    NotRecording,
    #[error("already recording")]
    AlreadyRecording,
    #[error("there is no recording to export")]
    NothingToExport,
    #[error("capture failed: {0}")]
    Capture(#[source] BoxError),
    #[error("writing {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The MIME type of exported recordings.
pub const MIME_TYPE: &str = "audio/webm";

/// What the recorder asks the capture service for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub audio: bool,
    pub channel_count: Option<u16>,
    pub sample_rate: Option<u32>,
}

impl Default for CaptureConstraints {
    fn default() -> CaptureConstraints {
        CaptureConstraints {
            audio: true,
            channel_count: None,
            sample_rate: None,
        }
    }
}

/// Grants access to an audio capture device.
pub trait CaptureService {
    type Stream: CaptureStream;

    /// Acquires a stream. Fails with [`Error::PermissionDenied`] or [`Error::DeviceUnavailable`]
    /// when the device cannot be used.
    fn request_capture(&mut self, constraints: &CaptureConstraints) -> Result<Self::Stream>;
}

/// An acquired capture device that encodes what it hears.
pub trait CaptureStream {
    fn start(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    fn resume(&mut self) -> Result<()>;

    /// Stops encoding and returns the encoded chunks in order.
    fn finish(&mut self) -> Result<Vec<Vec<u8>>>;

    /// Gives the device back. Called exactly once for every acquired stream.
    fn release(&mut self);
}

/// A finished recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudio {
    pub bytes: Vec<u8>,
    pub duration: Duration,
}

/// A recording ready to be saved under its suggested file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub file_name: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

impl Download {
    /// Names the recording after the time it was exported.
    pub fn new(audio: &EncodedAudio, exported_at: SystemTime) -> Download {
        let millis = exported_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Download {
            file_name: format!("recording-{}.webm", millis),
            mime_type: MIME_TYPE,
            bytes: audio.bytes.clone(),
        }
    }

    /// Writes the recording into `dir` and returns the path written.
    pub fn save_to(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let path = dir.as_ref().join(&self.file_name);
        fs::write(&path, &self.bytes).map_err(|source| Error::Write {
            path: path.clone(),
            source,
        })?;
        log::info!("saved recording to {}", path.display());
        Ok(path)
    }
}

enum State<S> {
    Idle,
    Recording {
        stream: S,
        since: Instant,
        banked: Duration,
    },
    Paused {
        stream: S,
        banked: Duration,
    },
}

/// Records from a [`CaptureService`], one recording at a time.
pub struct Recorder<C: CaptureService> {
    service: C,
    constraints: CaptureConstraints,
    state: State<C::Stream>,
    last_elapsed: Duration,
    recording: Option<EncodedAudio>,
}

impl<C: CaptureService> Recorder<C> {
    pub fn new(service: C) -> Recorder<C> {
        Recorder::with_constraints(service, CaptureConstraints::default())
    }

    pub fn with_constraints(service: C, constraints: CaptureConstraints) -> Recorder<C> {
        Recorder {
            service,
            constraints,
            state: State::Idle,
            last_elapsed: Duration::from_secs(0),
            recording: None,
        }
    }

    /// Acquires a stream and starts recording.
    ///
    /// # Errors
    ///
    /// If the stream cannot be acquired or fails to start, it is released and the recorder stays
    /// idle. A previous recording is kept until the new one is stopped.
    pub fn start(&mut self) -> Result<()> {
        if !matches!(self.state, State::Idle) {
            return Err(Error::AlreadyRecording);
        }
        let mut stream = self.service.request_capture(&self.constraints)?;
        if let Err(err) = stream.start() {
            stream.release();
            return Err(err);
        }
        self.state = State::Recording {
            stream,
            since: Instant::now(),
            banked: Duration::from_secs(0),
        };
        self.last_elapsed = Duration::from_secs(0);
        log::info!("recording started");
        Ok(())
    }

    /// Pauses recording. Pausing a paused recorder does nothing.
    pub fn pause(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => Err(Error::NotRecording),
            State::Recording {
                mut stream,
                since,
                banked,
            } => {
                let result = stream.pause();
                self.state = match result {
                    Ok(()) => State::Paused {
                        stream,
                        banked: banked + since.elapsed(),
                    },
                    Err(_) => State::Recording {
                        stream,
                        since,
                        banked,
                    },
                };
                result
            }
            paused => {
                self.state = paused;
                Ok(())
            }
        }
    }

    /// Resumes a paused recording. Resuming while recording does nothing.
    pub fn resume(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => Err(Error::NotRecording),
            State::Paused { mut stream, banked } => {
                let result = stream.resume();
                self.state = match result {
                    Ok(()) => State::Recording {
                        stream,
                        since: Instant::now(),
                        banked,
                    },
                    Err(_) => State::Paused { stream, banked },
                };
                result
            }
            recording => {
                self.state = recording;
                Ok(())
            }
        }
    }

    /// Stops recording, releases the stream and keeps what was recorded.
    ///
    /// The recorder is idle afterwards even if the stream fails to finish.
    pub fn stop(&mut self) -> Result<&EncodedAudio> {
        let elapsed = self.elapsed();
        let mut stream = match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => return Err(Error::NotRecording),
            State::Recording { stream, .. } | State::Paused { stream, .. } => stream,
        };
        let chunks = stream.finish();
        stream.release();
        self.last_elapsed = elapsed;

        let audio = EncodedAudio {
            bytes: chunks?.concat(),
            duration: elapsed,
        };
        log::info!(
            "recording stopped after {} ({} bytes)",
            format_elapsed(elapsed),
            audio.bytes.len()
        );
        Ok(self.recording.insert(audio))
    }

    /// Discards the finished recording and resets the elapsed time.
    pub fn clear(&mut self) {
        self.recording = None;
        if matches!(self.state, State::Idle) {
            self.last_elapsed = Duration::from_secs(0);
        }
    }

    /// Time spent recording, not counting pauses.
    pub fn elapsed(&self) -> Duration {
        match &self.state {
            State::Idle => self.last_elapsed,
            State::Recording { since, banked, .. } => *banked + since.elapsed(),
            State::Paused { banked, .. } => *banked,
        }
    }

    pub fn is_recording(&self) -> bool {
        !matches!(self.state, State::Idle)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.state, State::Paused { .. })
    }

    /// The last finished recording.
    pub fn recording(&self) -> Option<&EncodedAudio> {
        self.recording.as_ref()
    }

    /// Packages the last finished recording for saving.
    pub fn export(&self) -> Result<Download> {
        let audio = self.recording.as_ref().ok_or(Error::NothingToExport)?;
        Ok(Download::new(audio, SystemTime::now()))
    }
}

impl<C: CaptureService> Drop for Recorder<C> {
    fn drop(&mut self) {
        match &mut self.state {
            State::Idle => {}
            State::Recording { stream, .. } | State::Paused { stream, .. } => stream.release(),
        }
    }
}

/// Formats a duration as `mm:ss`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::{cell::RefCell, rc::Rc, thread};
    use tempdir::TempDir;

    #[derive(Debug, Default)]
    struct Events {
        log: Vec<&'static str>,
        deny: bool,
        fail_start: bool,
    }

    struct FakeService(Rc<RefCell<Events>>);

    struct FakeStream(Rc<RefCell<Events>>);

    impl CaptureService for FakeService {
        type Stream = FakeStream;

        fn request_capture(&mut self, constraints: &CaptureConstraints) -> Result<FakeStream> {
            assert!(constraints.audio);
            if self.0.borrow().deny {
                return Err(Error::PermissionDenied);
            }
            self.0.borrow_mut().log.push("acquire");
            Ok(FakeStream(Rc::clone(&self.0)))
        }
    }

    impl CaptureStream for FakeStream {
        fn start(&mut self) -> Result<()> {
            let mut events = self.0.borrow_mut();
            if events.fail_start {
                return Err(Error::DeviceUnavailable("busy".to_owned()));
            }
            events.log.push("start");
            Ok(())
        }

        fn pause(&mut self) -> Result<()> {
            self.0.borrow_mut().log.push("pause");
            Ok(())
        }

        fn resume(&mut self) -> Result<()> {
            self.0.borrow_mut().log.push("resume");
            Ok(())
        }

        fn finish(&mut self) -> Result<Vec<Vec<u8>>> {
            self.0.borrow_mut().log.push("finish");
            Ok(vec![vec![0x1a, 0x45], vec![0xdf, 0xa3]])
        }

        fn release(&mut self) {
            self.0.borrow_mut().log.push("release");
        }
    }

    fn recorder() -> (Recorder<FakeService>, Rc<RefCell<Events>>) {
        let events = Rc::new(RefCell::new(Events::default()));
        (Recorder::new(FakeService(Rc::clone(&events))), events)
    }

    #[test]
    fn records_pauses_and_exports() {
        let (mut recorder, events) = recorder();
        recorder.start().unwrap();
        assert!(matches!(recorder.start(), Err(Error::AlreadyRecording)));
        recorder.pause().unwrap();
        recorder.pause().unwrap();
        assert!(recorder.is_paused());
        recorder.resume().unwrap();

        let audio = recorder.stop().unwrap().clone();
        assert_eq!(vec![0x1a, 0x45, 0xdf, 0xa3], audio.bytes);
        assert!(!recorder.is_recording());
        assert_eq!(
            vec!["acquire", "start", "pause", "resume", "finish", "release"],
            events.borrow().log
        );

        let download = recorder.export().unwrap();
        assert!(download.file_name.starts_with("recording-"));
        assert!(download.file_name.ends_with(".webm"));
        assert_eq!("audio/webm", download.mime_type);
        assert_eq!(audio.bytes, download.bytes);
    }

    #[test]
    fn paused_time_is_not_counted() {
        let (mut recorder, _) = recorder();
        recorder.start().unwrap();
        thread::sleep(Duration::from_millis(20));
        recorder.pause().unwrap();
        let paused_at = recorder.elapsed();
        assert!(paused_at >= Duration::from_millis(20));

        thread::sleep(Duration::from_millis(20));
        assert_eq!(paused_at, recorder.elapsed());

        let audio = recorder.stop().unwrap();
        assert_eq!(paused_at, audio.duration);
        assert_eq!(paused_at, recorder.elapsed());

        recorder.clear();
        assert_eq!(Duration::from_secs(0), recorder.elapsed());
        assert!(matches!(recorder.export(), Err(Error::NothingToExport)));
    }

    #[test]
    fn failed_starts_release_the_stream_and_stay_idle() {
        let (mut recorder, events) = recorder();
        events.borrow_mut().fail_start = true;
        assert!(matches!(recorder.start(), Err(Error::DeviceUnavailable(_))));
        assert!(!recorder.is_recording());
        assert_eq!(vec!["acquire", "release"], events.borrow().log);

        events.borrow_mut().deny = true;
        assert!(matches!(recorder.start(), Err(Error::PermissionDenied)));
        assert!(!recorder.is_recording());
    }

    #[test]
    fn idle_recorders_refuse_transport_controls() {
        let (mut recorder, _) = recorder();
        assert!(matches!(recorder.pause(), Err(Error::NotRecording)));
        assert!(matches!(recorder.resume(), Err(Error::NotRecording)));
        assert!(matches!(recorder.stop(), Err(Error::NotRecording)));
    }

    #[test]
    fn dropping_a_recorder_releases_its_stream() {
        let (mut recorder, events) = recorder();
        recorder.start().unwrap();
        drop(recorder);
        assert_eq!(Some(&"release"), events.borrow().log.last());
    }

    #[test]
    fn downloads_are_named_after_the_export_time() {
        let audio = EncodedAudio {
            bytes: b"webm".to_vec(),
            duration: Duration::from_secs(3),
        };
        let download = Download::new(&audio, UNIX_EPOCH + Duration::from_millis(1_620_000_000_123));
        assert_eq!("recording-1620000000123.webm", download.file_name);

        let dir = TempDir::new("cauldron-recorder").unwrap();
        let path = download.save_to(dir.path()).unwrap();
        assert_eq!(b"webm".to_vec(), fs::read(path).unwrap());
    }

    #[test]
    fn elapsed_time_reads_as_minutes_and_seconds() {
        assert_eq!("00:00", format_elapsed(Duration::from_millis(999)));
        assert_eq!("02:05", format_elapsed(Duration::from_secs(125)));
    }
}
