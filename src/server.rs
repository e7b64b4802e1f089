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

//! Talks to a SuperCollider synthesis server.
//!
//! Every sound Cauldron makes is rendered by an externally running `scsynth`. This module is the
//! client side of that conversation: OSC messages over UDP.
//!
//! * [`Server`] - One connection. Sends commands and hands the server's replies to whoever is
//!   waiting for them.
//! * [`Command`] - Anything that can be sent. The commands a drum machine needs are here:
//!   [`Notify`], [`Sync`], [`ClearSched`], [`SynthDefRecv`], [`SynthNew`] and [`GroupFreeAll`].
//! * [`AsyncCommand`] - Commands the server finishes in the background and then acknowledges.
//!   [`Server::send_sync`] sends one and waits for its acknowledgement.
//! * [`Bundle`] - Commands stamped with the time they should run. The server holds bundles until
//!   then and runs them sample accurately, which is how sequenced steps land on the beat.
//!
//! Commands take their required fields in `new` and everything else through builder methods:
//!
//! ```
//! # use cauldron::server::{AddAction, Control, SynthNew};
//! let hat = SynthNew::new("cauldron-hihat", 0)
//!     .add_action(AddAction::TailOfGroup)
//!     .controls(vec![Control::new("freq", 1046.5_f32), Control::new("amp", 0.5_f32)]);
//! ```

mod command;
mod private;
mod reply;

pub use command::{
    AddAction, AsyncCommand, Bundle, ClearSched, Command, Control, ControlValue, GroupFreeAll,
    Notify, NotifySetting, Sync, SynthDefRecv, SynthNew,
};
pub use reply::Reply;

use rosc::{decoder::decode, encoder::encode, OscError, OscPacket};
use std::{
    collections::HashMap,
    error, fmt, io,
    net::{ToSocketAddrs, UdpSocket},
    sync::{
        atomic::{AtomicI32, AtomicU64, Ordering},
        mpsc::{self, RecvTimeoutError},
        Arc, Mutex, Weak,
    },
    thread,
    time::{Duration, Instant},
};

/// How long [`Server::send_sync`] waits for an acknowledgement.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

// How often the reader thread checks whether every handle to the server has been dropped.
const READER_POLL: Duration = Duration::from_millis(250);

/// A connection to one SuperCollider server.
///
/// Clones share the connection and may be used from any thread.
#[derive(Clone)]
pub struct Server(Arc<Connection>);

struct Connection {
    socket: UdpSocket,
    listeners: Mutex<HashMap<u64, mpsc::Sender<Reply>>>,
    next_listener: AtomicU64,
    // Sync IDs only have to be unique within this client.
    next_sync: AtomicI32,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.0.listeners.lock().unwrap().len();
        f.debug_struct("Server")
            .field("peer", &self.0.socket.peer_addr().ok())
            .field("listeners", &listeners)
            .finish()
    }
}

impl Server {
    /// Opens a UDP socket aimed at `server_address`.
    ///
    /// Nothing is sent, so this succeeds whether or not a server is listening. A missing server
    /// shows up as a timeout on the first [`send_sync`](Server::send_sync).
    ///
    /// A reader thread delivers replies until every clone of the returned `Server` is dropped.
    pub fn connect<A: ToSocketAddrs>(server_address: A) -> Result<Server> {
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(ErrorKind::Bind)?;
        socket.connect(server_address).map_err(ErrorKind::Connect)?;
        let reader = socket.try_clone().map_err(ErrorKind::Bind)?;
        reader
            .set_read_timeout(Some(READER_POLL))
            .map_err(ErrorKind::Bind)?;

        let connection = Arc::new(Connection {
            socket,
            listeners: Mutex::new(HashMap::new()),
            next_listener: AtomicU64::new(0),
            next_sync: AtomicI32::new(0),
        });
        let weak = Arc::downgrade(&connection);
        thread::Builder::new()
            .name("cauldron-osc-recv".to_owned())
            .spawn(move || read_replies(reader, weak))
            .map_err(ErrorKind::Spawn)?;

        log::info!("connected to scsynth at {:?}", connection.socket.peer_addr().ok());
        Ok(Server(connection))
    }

    /// Starts collecting replies. Replies stop being collected when the returned handle is
    /// dropped.
    pub fn subscribe(&self) -> Replies {
        let id = self.0.next_listener.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel();
        self.0.listeners.lock().unwrap().insert(id, sender);
        Replies {
            id,
            receiver,
            connection: Arc::clone(&self.0),
        }
    }

    /// Sends a command without waiting for the server to act on it.
    pub fn send(&self, command: impl Command) -> Result<()> {
        log::debug!("send: {:?}", command);
        let bytes = encode(&command.into_packet().0).map_err(ErrorKind::Encode)?;
        self.0.socket.send(&bytes).map_err(ErrorKind::Send)?;
        Ok(())
    }

    /// Sends an asynchronous command and blocks until the server acknowledges it.
    ///
    /// # Errors
    ///
    /// Fails if the command cannot be sent, if the server answers with a [`Reply::Fail`] naming
    /// the command, or if nothing answers within [`REPLY_TIMEOUT`].
    pub fn send_sync(&self, command: impl AsyncCommand) -> Result<Reply> {
        let matcher = command.reply_matcher();
        // Subscribe first so a fast reply cannot slip past.
        let replies = self.subscribe();
        self.send(command)?;

        let deadline = Instant::now() + REPLY_TIMEOUT;
        loop {
            let reply = replies
                .recv_until(deadline)
                .ok_or(ErrorKind::Timeout(matcher.command()))?;
            if matcher.matches(&reply) {
                return Ok(reply);
            }
            match reply {
                Reply::Fail { command, error } if command == matcher.command() => {
                    return Err(ErrorKind::Rejected { command, error }.into());
                }
                _ => {}
            }
        }
    }

    /// Frees every synth and drops every bundle that has not played yet.
    pub fn reset(&self) -> Result<()> {
        self.send(GroupFreeAll::new(vec![0]))?;
        self.send(ClearSched::new())?;
        self.sync()
    }

    /// Blocks until the server has finished every asynchronous command sent before this one.
    pub fn sync(&self) -> Result<()> {
        let id = self.0.next_sync.fetch_add(1, Ordering::Relaxed);
        self.send_sync(Sync::new(id))?;
        Ok(())
    }
}

fn read_replies(socket: UdpSocket, connection: Weak<Connection>) {
    let mut buffer = vec![0_u8; 65536];
    loop {
        let received = socket.recv(&mut buffer);
        let connection = match connection.upgrade() {
            Some(connection) => connection,
            None => return,
        };
        let len = match received {
            Ok(len) => len,
            Err(err)
                if err.kind() == io::ErrorKind::WouldBlock
                    || err.kind() == io::ErrorKind::TimedOut =>
            {
                continue
            }
            Err(err) => {
                log::error!("receiving from scsynth: {}", err);
                continue;
            }
        };

        let message = match decode(&buffer[..len]) {
            Ok(OscPacket::Message(message)) => message,
            Ok(OscPacket::Bundle(bundle)) => {
                log::error!("scsynth sent a bundle, which it never should: {:?}", bundle);
                continue;
            }
            Err(err) => {
                log::error!("decoding a packet from scsynth: {:?}", err);
                continue;
            }
        };
        log::debug!("recv: {:?}", message);

        if let Some(reply) = Reply::parse(&message) {
            connection
                .listeners
                .lock()
                .unwrap()
                .retain(|_, listener| listener.send(reply.clone()).is_ok());
        }
    }
}

/// Replies collected since [`Server::subscribe`] was called.
pub struct Replies {
    id: u64,
    receiver: mpsc::Receiver<Reply>,
    connection: Arc<Connection>,
}

impl Replies {
    /// Waits for the next reply until `deadline`. Returns `None` once the deadline passes.
    pub fn recv_until(&self, deadline: Instant) -> Option<Reply> {
        let timeout = deadline.saturating_duration_since(Instant::now());
        match self.receiver.recv_timeout(timeout) {
            Ok(reply) => Some(reply),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Replies that have already arrived.
    pub fn try_iter(&self) -> impl Iterator<Item = Reply> + '_ {
        self.receiver.try_iter()
    }
}

impl Drop for Replies {
    fn drop(&mut self) {
        self.connection.listeners.lock().unwrap().remove(&self.id);
    }
}

impl fmt::Debug for Replies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Replies").field("id", &self.id).finish()
    }
}

/// A specialized [`Result`] type for server operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned by [`Server`].
#[derive(Debug)]
pub struct Error(ErrorKind);

impl Error {
    /// Returns true if the server got the command and refused it.
    pub fn is_rejected(&self) -> bool {
        matches!(self.0, ErrorKind::Rejected { .. })
    }

    /// Returns true if no acknowledgement arrived in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self.0, ErrorKind::Timeout(_))
    }
}

#[derive(Debug)]
enum ErrorKind {
    Bind(io::Error),
    Connect(io::Error),
    Spawn(io::Error),
    Send(io::Error),
    Encode(OscError),
    Timeout(&'static str),
    Rejected { command: String, error: String },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error(kind)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            ErrorKind::Bind(_) => write!(f, "opening a UDP socket"),
            ErrorKind::Connect(_) => write!(f, "aiming the UDP socket at scsynth"),
            ErrorKind::Spawn(_) => write!(f, "starting the reply reader thread"),
            ErrorKind::Send(_) => write!(f, "sending to scsynth"),
            ErrorKind::Encode(err) => write!(f, "encoding an OSC packet: {:?}", err),
            ErrorKind::Timeout(command) => write!(
                f,
                "scsynth did not acknowledge {} within {:?}, is it running?",
                command, REPLY_TIMEOUT
            ),
            ErrorKind::Rejected { command, error } => {
                write!(f, "scsynth refused {}: {}", command, error)
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.0 {
            ErrorKind::Bind(err)
            | ErrorKind::Connect(err)
            | ErrorKind::Spawn(err)
            | ErrorKind::Send(err) => Some(err),
            _ => None,
        }
    }
}
