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

//! Plumbing shared by the command structs. These types appear in public trait signatures but are
//! hidden from the documentation.

use super::{Command, Reply};
use rosc::{OscMessage, OscPacket, OscType};

/// Recognizes the reply that completes an asynchronous command.
pub struct ReplyMatcher {
    command: &'static str,
    is_completion: Box<dyn Fn(&Reply) -> bool + Send>,
}

impl ReplyMatcher {
    /// `command` is the address the server names in a [`Reply::Fail`] for this command.
    pub fn new<F>(command: &'static str, is_completion: F) -> ReplyMatcher
    where
        F: Fn(&Reply) -> bool + Send + 'static,
    {
        ReplyMatcher {
            command,
            is_completion: Box::new(is_completion),
        }
    }

    pub fn command(&self) -> &'static str {
        self.command
    }

    pub fn matches(&self, reply: &Reply) -> bool {
        (self.is_completion)(reply)
    }
}

#[derive(Debug)]
pub struct Packet(pub OscPacket);

impl Command for Packet {
    fn into_packet(self) -> Packet {
        self
    }
}

/// Builds an OSC message one argument at a time.
pub struct Message(OscMessage);

impl Message {
    pub fn addr(addr: &str) -> Message {
        Message(OscMessage {
            addr: addr.to_owned(),
            args: Vec::new(),
        })
    }

    pub fn arg(mut self, arg: impl Into<OscType>) -> Message {
        self.0.args.push(arg.into());
        self
    }

    pub fn args<T: Into<OscType>>(mut self, args: impl IntoIterator<Item = T>) -> Message {
        self.0.args.extend(args.into_iter().map(T::into));
        self
    }

    pub fn into_packet(self) -> Packet {
        Packet(OscPacket::Message(self.0))
    }
}
