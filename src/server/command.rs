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

use super::{
    private::{Message, Packet, ReplyMatcher},
    Reply,
};
use rosc::{OscBundle, OscPacket, OscTime, OscType};
use std::{
    fmt,
    time::{Duration, SystemTime},
};

/// Something that can be sent to scsynth.
///
/// Sealed: only the commands in this module implement it.
pub trait Command: fmt::Debug {
    #[doc(hidden)]
    fn into_packet(self) -> Packet;
}

/// A command that scsynth finishes in the background and acknowledges with a [`Reply`].
pub trait AsyncCommand: Command {
    #[doc(hidden)]
    fn reply_matcher(&self) -> ReplyMatcher;
}

/// Commands to be run together at a point in time.
///
/// A bundle whose time has already passed runs as soon as it arrives.
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle(pub(super) OscBundle);

impl Bundle {
    pub fn new<C: Command>(time: SystemTime, commands: impl IntoIterator<Item = C>) -> Bundle {
        let content = commands
            .into_iter()
            .map(|command| command.into_packet().0)
            .collect();
        Bundle(OscBundle {
            timetag: ntp_time_tag(time),
            content,
        })
    }
}

impl Command for Bundle {
    #[doc(hidden)]
    fn into_packet(self) -> Packet {
        Packet(OscPacket::Bundle(self.0))
    }
}

// OSC time tags count seconds since 1900 in 32.32 fixed point.
fn ntp_time_tag(time: SystemTime) -> OscTime {
    const SECONDS_1900_TO_1970: u64 = 2_208_988_800;

    let since_1970 = time
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    let since_1900 = since_1970 + Duration::from_secs(SECONDS_1900_TO_1970);
    let fraction = (u64::from(since_1900.subsec_nanos()) << 32) / 1_000_000_000;
    (since_1900.as_secs() as u32, fraction as u32).into()
}

/// Where [`SynthNew`] puts the new synth relative to its target group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddAction {
    /// First in the group.
    HeadOfGroup = 0,
    /// Last in the group.
    TailOfGroup = 1,
}

impl Default for AddAction {
    fn default() -> AddAction {
        AddAction::HeadOfGroup
    }
}

/// The starting value of one of a synth's named parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Control {
    name: String,
    value: ControlValue,
}

impl Control {
    pub fn new(name: impl Into<String>, value: impl Into<ControlValue>) -> Control {
        Control {
            name: name.into(),
            value: value.into(),
        }
    }

    fn push_onto(self, message: Message) -> Message {
        let value = match self.value {
            ControlValue::Int(n) => OscType::Int(n),
            ControlValue::Float(x) => OscType::Float(x),
        };
        message.arg(self.name).arg(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlValue {
    Int(i32),
    Float(f32),
}

impl From<i32> for ControlValue {
    fn from(n: i32) -> ControlValue {
        ControlValue::Int(n)
    }
}

impl From<f32> for ControlValue {
    fn from(x: f32) -> ControlValue {
        ControlValue::Float(x)
    }
}

/// `/notify`: asks scsynth to register this client, or to forget it.
///
/// Acknowledged with [`Reply::NotifyDone`].
#[derive(Debug, Clone, PartialEq)]
pub struct Notify {
    setting: NotifySetting,
}

impl Notify {
    pub fn new(setting: NotifySetting) -> Notify {
        Notify { setting }
    }
}

impl Command for Notify {
    #[doc(hidden)]
    fn into_packet(self) -> Packet {
        Message::addr("/notify")
            .arg(self.setting as i32)
            .into_packet()
    }
}

impl AsyncCommand for Notify {
    #[doc(hidden)]
    fn reply_matcher(&self) -> ReplyMatcher {
        ReplyMatcher::new("/notify", |reply| matches!(reply, Reply::NotifyDone { .. }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifySetting {
    Start = 1,
    Stop = 0,
}

/// `/sync`: acknowledged with [`Reply::Synced`] once every asynchronous command sent before it has
/// finished.
#[derive(Debug, Clone, PartialEq)]
pub struct Sync {
    id: i32,
}

impl Sync {
    /// `id` is echoed back in the acknowledgement.
    pub fn new(id: i32) -> Sync {
        Sync { id }
    }
}

impl Command for Sync {
    #[doc(hidden)]
    fn into_packet(self) -> Packet {
        Message::addr("/sync").arg(self.id).into_packet()
    }
}

impl AsyncCommand for Sync {
    #[doc(hidden)]
    fn reply_matcher(&self) -> ReplyMatcher {
        let expected = self.id;
        ReplyMatcher::new("/sync", move |reply| {
            matches!(reply, Reply::Synced { id } if *id == expected)
        })
    }
}

/// `/clearSched`: drops every bundle that is waiting for its time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClearSched;

impl ClearSched {
    pub fn new() -> ClearSched {
        ClearSched
    }
}

impl Command for ClearSched {
    #[doc(hidden)]
    fn into_packet(self) -> Packet {
        Message::addr("/clearSched").into_packet()
    }
}

/// `/d_recv`: loads encoded synth definitions, replacing any with the same name.
///
/// Acknowledged with [`Reply::SynthDefRecvDone`].
#[derive(Debug, Clone, PartialEq)]
pub struct SynthDefRecv {
    data: Vec<u8>,
}

impl SynthDefRecv {
    /// `data` comes from [`encode_synth_defs`](crate::synthdef::encoder::encode_synth_defs).
    pub fn new(data: Vec<u8>) -> SynthDefRecv {
        SynthDefRecv { data }
    }
}

impl Command for SynthDefRecv {
    #[doc(hidden)]
    fn into_packet(self) -> Packet {
        Message::addr("/d_recv").arg(self.data).into_packet()
    }
}

impl AsyncCommand for SynthDefRecv {
    #[doc(hidden)]
    fn reply_matcher(&self) -> ReplyMatcher {
        ReplyMatcher::new("/d_recv", |reply| matches!(reply, Reply::SynthDefRecvDone))
    }
}

/// `/s_new`: starts a synth from a loaded definition.
///
/// The server chooses the node ID, so the synth cannot be addressed afterwards. Drum voices free
/// themselves when their envelope ends.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthNew {
    synth_def: String,
    target: i32,
    add_action: AddAction,
    controls: Vec<Control>,
}

impl SynthNew {
    /// Starts `synth_def` in the group `target`.
    pub fn new(synth_def: impl Into<String>, target: i32) -> SynthNew {
        SynthNew {
            synth_def: synth_def.into(),
            target,
            add_action: AddAction::default(),
            controls: Vec::new(),
        }
    }

    pub fn controls(mut self, controls: impl IntoIterator<Item = Control>) -> SynthNew {
        self.controls = controls.into_iter().collect();
        self
    }

    pub fn add_action(mut self, add_action: AddAction) -> SynthNew {
        self.add_action = add_action;
        self
    }
}

impl Command for SynthNew {
    #[doc(hidden)]
    fn into_packet(self) -> Packet {
        const SERVER_ASSIGNED_ID: i32 = -1;

        let message = Message::addr("/s_new")
            .arg(self.synth_def)
            .arg(SERVER_ASSIGNED_ID)
            .arg(self.add_action as i32)
            .arg(self.target);
        self.controls
            .into_iter()
            .fold(message, |message, control| control.push_onto(message))
            .into_packet()
    }
}

/// `/g_freeAll`: frees every node in the given groups.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupFreeAll {
    groups: Vec<i32>,
}

impl GroupFreeAll {
    pub fn new(groups: impl IntoIterator<Item = i32>) -> GroupFreeAll {
        GroupFreeAll {
            groups: groups.into_iter().collect(),
        }
    }
}

impl Command for GroupFreeAll {
    #[doc(hidden)]
    fn into_packet(self) -> Packet {
        Message::addr("/g_freeAll").args(self.groups).into_packet()
    }
}
