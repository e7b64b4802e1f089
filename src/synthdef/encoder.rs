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

//! Serializes synth definitions into the format accepted by SuperCollider.

use super::{Graph, Input, Rate, SynthDef};

/// Encodes a set of synth definitions into the [SynthDef2 file format].
///
/// The result can be sent to the server with
/// [`SynthDefRecv`](crate::server::SynthDefRecv).
///
/// [SynthDef2 file format]: https://doc.sccode.org/Reference/Synth-Definition-File-Format.html
pub fn encode_synth_defs(synth_defs: &[SynthDef]) -> Vec<u8> {
    let mut out = Writer::default();
    out.bytes(b"SCgf");
    out.i32(2);
    out.i16(synth_defs.len() as i16);
    for synth_def in synth_defs {
        encode_graph(&mut out, &synth_def.name, &synth_def.graph);
    }
    out.0
}

fn encode_graph(out: &mut Writer, name: &str, graph: &Graph) {
    // Parameters are read through a Control UGen that must come first in the graph, so every
    // UGen index shifts by one when it is present.
    let has_control = !graph.params.is_empty();
    let offset = if has_control { 1 } else { 0 };

    let mut constants: Vec<f32> = Vec::new();
    let mut constant_index = |value: f32| match constants
        .iter()
        .position(|c| c.to_bits() == value.to_bits())
    {
        Some(index) => index,
        None => {
            constants.push(value);
            constants.len() - 1
        }
    };

    let mut ugens = Writer::default();
    let ugen_count = graph.ugens.len() + offset;
    if has_control {
        ugens.pstring("Control");
        ugens.i8(Rate::Control as i8);
        ugens.i32(0);
        ugens.i32(graph.params.len() as i32);
        ugens.i16(0);
        for _ in &graph.params {
            ugens.i8(Rate::Control as i8);
        }
    }
    for ugen in &graph.ugens {
        ugens.pstring(ugen.name);
        ugens.i8(ugen.rate as i8);
        ugens.i32(ugen.inputs.len() as i32);
        ugens.i32(ugen.outputs.len() as i32);
        ugens.i16(ugen.special_index);
        for input in &ugen.inputs {
            let (source, index) = match *input {
                Input::Const(value) => (-1, constant_index(value)),
                Input::Param(index) => (0, index),
                Input::UGen { index, output } => ((index + offset) as i32, output),
            };
            ugens.i32(source);
            ugens.i32(index as i32);
        }
        for rate in &ugen.outputs {
            ugens.i8(*rate as i8);
        }
    }

    out.pstring(name);
    out.i32(constants.len() as i32);
    for constant in &constants {
        out.f32(*constant);
    }
    out.i32(graph.params.len() as i32);
    for (_, initial_value) in &graph.params {
        out.f32(*initial_value);
    }
    out.i32(graph.params.len() as i32);
    for (index, (param_name, _)) in graph.params.iter().enumerate() {
        out.pstring(param_name);
        out.i32(index as i32);
    }
    out.i32(ugen_count as i32);
    out.bytes(&ugens.0);
    // No variants.
    out.i16(0);
}

#[derive(Default)]
struct Writer(Vec<u8>);

impl Writer {
    fn bytes(&mut self, bytes: &[u8]) {
        self.0.extend_from_slice(bytes);
    }

    fn i8(&mut self, n: i8) {
        self.bytes(&n.to_be_bytes());
    }

    fn i16(&mut self, n: i16) {
        self.bytes(&n.to_be_bytes());
    }

    fn i32(&mut self, n: i32) {
        self.bytes(&n.to_be_bytes());
    }

    fn f32(&mut self, n: f32) {
        self.bytes(&n.to_be_bytes());
    }

    // Names longer than 255 bytes are truncated; voice names are validated well below that.
    fn pstring(&mut self, s: &str) {
        let bytes = &s.as_bytes()[..s.len().min(255)];
        self.0.push(bytes.len() as u8);
        self.bytes(bytes);
    }
}
