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

use rosc::{OscMessage, OscType};

/// A message scsynth sends back to the client.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Reply {
    /// An asynchronous command finished and had nothing to report.
    Done,
    /// [`Notify`](super::Notify) finished. `client_id` identifies this client to the server.
    NotifyDone { client_id: i32 },
    /// Every asynchronous command before the [`Sync`](super::Sync) with this ID has finished.
    Synced { id: i32 },
    /// [`SynthDefRecv`](super::SynthDefRecv) finished loading.
    SynthDefRecvDone,
    /// The server refused a command.
    Fail {
        /// The address of the refused command, such as `/d_recv`.
        command: String,
        error: String,
    },
}

impl Reply {
    /// Recognizes a reply, or returns `None` for messages this client does not care about.
    pub(super) fn parse(message: &OscMessage) -> Option<Reply> {
        use OscType::{Int, String as Str};

        let reply = match (message.addr.as_str(), message.args.as_slice()) {
            ("/done", []) => Reply::Done,
            ("/done", [Str(command), Int(client_id), ..]) if command == "/notify" => {
                Reply::NotifyDone {
                    client_id: *client_id,
                }
            }
            ("/done", [Str(command)]) if command == "/d_recv" => Reply::SynthDefRecvDone,
            ("/synced", [Int(id)]) => Reply::Synced { id: *id },
            ("/fail", [Str(command), Str(error), ..]) => Reply::Fail {
                command: command.clone(),
                error: error.clone(),
            },
            _ => {
                log::debug!("ignoring {} from scsynth", message.addr);
                return None;
            }
        };
        Some(reply)
    }
}
