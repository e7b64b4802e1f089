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

//! Synth definitions for the voices of a kit.
//!
//! Synth definitions are used by SuperCollider to create new synths. They are directed acyclic
//! graphs of UGens, the primitives offered by SuperCollider that generate and process sound. This
//! module provides a small graph builder covering the UGens that drum and instrument voices need
//! and an [`encoder`] that serializes finished definitions for the server.
//!
//! # Examples
//!
//! ```
//! use cauldron::synthdef::{encoder::encode_synth_defs, Rate, SynthDef};
//!
//! let synthdef = SynthDef::new("beep", |graph| {
//!     let freq = graph.param("freq", 440.0);
//!     let osc = graph.sin_osc(Rate::Audio, freq);
//!     let quiet = graph.mul(osc, 0.2);
//!     graph.out(0, &[quiet, quiet]);
//! });
//!
//! let bytes = encode_synth_defs(&[synthdef]);
//! assert_eq!(&bytes[..4], b"SCgf");
//! ```

pub mod encoder;

/// A named synth definition.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthDef {
    name: String,
    graph: Graph,
}

impl SynthDef {
    /// Creates a new synth definition by building its UGen graph with `build`.
    ///
    /// The order in which `build` declares parameters determines their indices, so parameters
    /// should be declared before any UGens that use them.
    pub fn new(name: impl Into<String>, build: impl FnOnce(&mut Graph)) -> SynthDef {
        let mut graph = Graph::default();
        build(&mut graph);
        SynthDef {
            name: name.into(),
            graph,
        }
    }

    /// Returns the name of the synth definition.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the names of the parameters in index order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.graph.params.iter().map(|(name, _)| name.as_str())
    }

    /// Returns the names of the UGens in the graph, in evaluation order.
    pub fn ugen_names(&self) -> impl Iterator<Item = &str> {
        self.graph.ugens.iter().map(|ugen| ugen.name)
    }
}

/// The rate at which a UGen calculates its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rate {
    /// Calculated once, when the synth starts.
    Scalar = 0,
    /// Calculated once per control block.
    Control = 1,
    /// Calculated for every sample.
    Audio = 2,
}

/// An action to invoke when a UGen is finished playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneAction {
    /// Do nothing when the UGen is finished.
    None = 0,
    /// Pause the enclosing synth, but do not free it.
    PauseSelf = 1,
    /// Free the enclosing synth.
    FreeSelf = 2,
}

/// A value flowing through a UGen graph.
///
/// Constants are baked into the synth definition, parameters can be set when a synth is created,
/// and UGen outputs connect one UGen to another.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Input {
    Const(f32),
    Param(usize),
    UGen { index: usize, output: usize },
}

impl From<f32> for Input {
    fn from(value: f32) -> Input {
        Input::Const(value)
    }
}

impl From<f64> for Input {
    fn from(value: f64) -> Input {
        Input::Const(value as f32)
    }
}

impl From<i32> for Input {
    fn from(value: i32) -> Input {
        Input::Const(value as f32)
    }
}

impl From<DoneAction> for Input {
    fn from(action: DoneAction) -> Input {
        Input::Const(action as i32 as f32)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct UGen {
    pub name: &'static str,
    pub rate: Rate,
    pub special_index: i16,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Rate>,
}

/// The segments of an envelope.
///
/// An envelope starts at `initial_level` and moves through each segment in turn, reaching the
/// segment's level after the segment's time. Times may be parameters so that a single synth
/// definition can play notes of different lengths.
#[derive(Debug, Clone, PartialEq)]
pub struct Env {
    initial_level: Input,
    segments: Vec<Segment>,
    curve: f32,
}

#[derive(Debug, Clone, PartialEq)]
struct Segment {
    level: Input,
    time: Input,
}

impl Env {
    /// Creates an envelope whose segments all use the given curvature. `0` is linear, negative
    /// values curve the segments down.
    pub fn new(initial_level: impl Into<Input>, curve: f32) -> Env {
        Env {
            initial_level: initial_level.into(),
            segments: Vec::new(),
            curve,
        }
    }

    /// Adds a segment that reaches `level` after `time` seconds.
    pub fn segment(mut self, level: impl Into<Input>, time: impl Into<Input>) -> Env {
        self.segments.push(Segment {
            level: level.into(),
            time: time.into(),
        });
        self
    }

    // Layout read by EnvGen: initial level, segment count, release node, loop node, then
    // (level, time, shape, curve) for each segment.
    fn into_inputs(self) -> Vec<Input> {
        const NO_NODE: f32 = -99.0;
        const CURVE_SHAPE: f32 = 5.0;

        let mut inputs = vec![
            self.initial_level,
            Input::Const(self.segments.len() as f32),
            Input::Const(NO_NODE),
            Input::Const(NO_NODE),
        ];
        for segment in self.segments {
            inputs.extend_from_slice(&[
                segment.level,
                segment.time,
                Input::Const(CURVE_SHAPE),
                Input::Const(self.curve),
            ]);
        }
        inputs
    }
}

/// A UGen graph under construction.
///
/// Passed to the closure given to [`SynthDef::new`]. Each method adds a UGen to the graph and
/// returns its output, which can be used as the input of UGens added later.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    pub(crate) params: Vec<(String, f32)>,
    pub(crate) ugens: Vec<UGen>,
}

impl Graph {
    /// Declares a named parameter with an initial value.
    pub fn param(&mut self, name: impl Into<String>, initial_value: f32) -> Input {
        self.params.push((name.into(), initial_value));
        Input::Param(self.params.len() - 1)
    }

    /// A sine wave oscillator.
    pub fn sin_osc(&mut self, rate: Rate, freq: impl Into<Input>) -> Input {
        self.add("SinOsc", rate, vec![freq.into(), Input::Const(0.0)])
    }

    /// A band limited pulse wave with a duty cycle of `width`.
    pub fn pulse(&mut self, rate: Rate, freq: impl Into<Input>, width: impl Into<Input>) -> Input {
        self.add("Pulse", rate, vec![freq.into(), width.into()])
    }

    /// A band limited sawtooth wave.
    pub fn saw(&mut self, rate: Rate, freq: impl Into<Input>) -> Input {
        self.add("Saw", rate, vec![freq.into()])
    }

    /// A triangle wave oscillator.
    pub fn lf_tri(&mut self, rate: Rate, freq: impl Into<Input>) -> Input {
        self.add("LFTri", rate, vec![freq.into(), Input::Const(0.0)])
    }

    /// White noise.
    pub fn white_noise(&mut self, rate: Rate) -> Input {
        self.add("WhiteNoise", rate, vec![])
    }

    /// Pink noise, whose spectrum falls off by 3dB per octave.
    pub fn pink_noise(&mut self, rate: Rate) -> Input {
        self.add("PinkNoise", rate, vec![])
    }

    /// An envelope generator that runs `env` once, scaled by `level_scale`, then performs
    /// `done_action`.
    pub fn env_gen(
        &mut self,
        rate: Rate,
        env: Env,
        level_scale: impl Into<Input>,
        done_action: DoneAction,
    ) -> Input {
        let mut inputs = vec![
            Input::Const(1.0),
            level_scale.into(),
            Input::Const(0.0),
            Input::Const(1.0),
            done_action.into(),
        ];
        inputs.extend(env.into_inputs());
        self.add("EnvGen", rate, inputs)
    }

    /// Multiplies two signals.
    pub fn mul(&mut self, lhs: impl Into<Input>, rhs: impl Into<Input>) -> Input {
        self.binary_op(2, lhs.into(), rhs.into())
    }

    /// Writes the channels to consecutive buses starting at `bus`.
    pub fn out(&mut self, bus: impl Into<Input>, channels: &[Input]) {
        let mut inputs = vec![bus.into()];
        inputs.extend_from_slice(channels);
        self.push(UGen {
            name: "Out",
            rate: Rate::Audio,
            special_index: 0,
            inputs,
            outputs: vec![],
        });
    }

    fn binary_op(&mut self, special_index: i16, lhs: Input, rhs: Input) -> Input {
        let rate = self.rate_of(lhs).max(self.rate_of(rhs));
        self.push(UGen {
            name: "BinaryOpUGen",
            rate,
            special_index,
            inputs: vec![lhs, rhs],
            outputs: vec![rate],
        })
    }

    fn add(&mut self, name: &'static str, rate: Rate, inputs: Vec<Input>) -> Input {
        self.push(UGen {
            name,
            rate,
            special_index: 0,
            inputs,
            outputs: vec![rate],
        })
    }

    fn push(&mut self, ugen: UGen) -> Input {
        self.ugens.push(ugen);
        Input::UGen {
            index: self.ugens.len() - 1,
            output: 0,
        }
    }

    fn rate_of(&self, input: Input) -> Rate {
        match input {
            Input::Const(_) => Rate::Scalar,
            Input::Param(_) => Rate::Control,
            Input::UGen { index, output } => self.ugens[index].outputs[output],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn binary_ops_take_the_fastest_input_rate() {
        let synthdef = SynthDef::new("rates", |graph| {
            let amp = graph.param("amp", 1.0);
            let scaled = graph.mul(amp, 0.5);
            let osc = graph.sin_osc(Rate::Audio, 440.0);
            let out = graph.mul(osc, scaled);
            graph.out(0, &[out]);
        });

        let rates = synthdef
            .graph
            .ugens
            .iter()
            .map(|ugen| (ugen.name, ugen.rate))
            .collect::<Vec<_>>();
        assert_eq!(
            vec![
                ("BinaryOpUGen", Rate::Control),
                ("SinOsc", Rate::Audio),
                ("BinaryOpUGen", Rate::Audio),
                ("Out", Rate::Audio),
            ],
            rates
        );
    }

    #[test]
    fn envelopes_are_flattened_into_env_gen_inputs() {
        let synthdef = SynthDef::new("env", |graph| {
            let hold = graph.param("hold", 0.1);
            let env = Env::new(0.0, -4.0).segment(1.0, 0.01).segment(0.0, hold);
            graph.env_gen(Rate::Control, env, 1.0, DoneAction::FreeSelf);
        });

        let env_gen = &synthdef.graph.ugens[0];
        assert_eq!("EnvGen", env_gen.name);
        assert_eq!(
            vec![
                Input::Const(1.0),
                Input::Const(1.0),
                Input::Const(0.0),
                Input::Const(1.0),
                Input::Const(2.0),
                Input::Const(0.0),
                Input::Const(2.0),
                Input::Const(-99.0),
                Input::Const(-99.0),
                Input::Const(1.0),
                Input::Const(0.01),
                Input::Const(5.0),
                Input::Const(-4.0),
                Input::Const(0.0),
                Input::Param(0),
                Input::Const(5.0),
                Input::Const(-4.0),
            ],
            env_gen.inputs
        );
    }

    #[test]
    fn parameters_keep_declaration_order() {
        let synthdef = SynthDef::new("params", |graph| {
            graph.param("freq", 440.0);
            graph.param("amp", 0.5);
        });
        assert_eq!(
            vec!["freq", "amp"],
            synthdef.param_names().collect::<Vec<_>>()
        );
    }
}
