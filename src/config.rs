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

//! Session configuration.
//!
//! A [`Config`] is read from a JSON file. Every field is optional and falls back to its default,
//! so an empty object is a complete configuration:
//!
//! ```json
//! {
//!     "server_address": "127.0.0.1:57110",
//!     "ahead_by_ms": 50,
//!     "tempo_bpm": 120,
//!     "subdivision": "16n",
//!     "step_count": 16,
//!     "kit": [
//!         {"name": "kick", "shape": "sine", "attack": 0.001, "decay": 0.4,
//!          "sustain": 0.01, "release": 1.4, "pitch": "C1", "length": "8n", "key": "1"}
//!     ]
//! }
//! ```
//!
//! The `CAULDRON_SERVER` environment variable, when set, replaces `server_address`.

use crate::{
    transport::{self, Subdivision, Tempo},
    voice::Kit,
};
use serde::{Deserialize, Serialize};
use std::{
    env, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

/// The environment variable that overrides [`Config::server_address`].
pub const SERVER_ENV_VAR: &str = "CAULDRON_SERVER";

/// The longest look-ahead a configuration may ask for.
pub const MAX_AHEAD_BY_MS: u64 = 1000;

/// A specialized [`Result`] type for loading configuration.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned when configuration cannot be loaded.
#[derive(Debug, Error)]
pub enum Error {
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("parsing configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("server_address must not be empty")]
    MissingServerAddress,
    #[error("step_count must be at least 1")]
    NoSteps,
    #[error("ahead_by_ms must be at most 1000, got {0}")]
    AheadByTooLarge(u64),
    #[error(transparent)]
    Tempo(#[from] transport::Error),
}

/// Settings for an [`AudioSession`](crate::session::AudioSession).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The UDP address of the SuperCollider server.
    pub server_address: String,
    /// How far ahead of their logical time ticks are dispatched.
    pub ahead_by_ms: u64,
    pub tempo_bpm: f64,
    pub subdivision: Subdivision,
    pub step_count: usize,
    pub kit: Kit,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            server_address: "127.0.0.1:57110".to_owned(),
            ahead_by_ms: 50,
            tempo_bpm: 120.0,
            subdivision: Subdivision::Sixteenth,
            step_count: 16,
            kit: Kit::default(),
        }
    }
}

impl Config {
    /// Loads and validates a configuration file, then applies the environment override.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_owned(),
            source,
        })?;
        let config = Config::from_json(&json)?.with_server_override(env::var(SERVER_ENV_VAR).ok());
        config.validate()?;
        log::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parses a configuration without validating it or reading the environment.
    pub fn from_json(json: &str) -> Result<Config> {
        Ok(serde_json::from_str(json)?)
    }

    /// The default configuration with the environment override applied.
    pub fn from_env() -> Config {
        Config::default().with_server_override(env::var(SERVER_ENV_VAR).ok())
    }

    /// Replaces the server address if `address` is non-empty.
    pub fn with_server_override(mut self, address: Option<String>) -> Config {
        if let Some(address) = address.filter(|address| !address.trim().is_empty()) {
            self.server_address = address;
        }
        self
    }

    /// Checks the settings that cannot be checked while parsing.
    ///
    /// Kits are validated as they are built, so a `Config` never holds an invalid kit.
    pub fn validate(&self) -> Result<()> {
        if self.server_address.trim().is_empty() {
            return Err(Error::MissingServerAddress);
        }
        if self.step_count == 0 {
            return Err(Error::NoSteps);
        }
        if self.ahead_by_ms > MAX_AHEAD_BY_MS {
            return Err(Error::AheadByTooLarge(self.ahead_by_ms));
        }
        Tempo::from_bpm(self.tempo_bpm)?.checked_tick_interval(self.subdivision)?;
        Ok(())
    }

    /// [`ahead_by_ms`](Config::ahead_by_ms) as a [`Duration`].
    pub fn ahead_by(&self) -> Duration {
        Duration::from_millis(self.ahead_by_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::VoiceId;
    use pretty_assertions::assert_eq;
    use tempdir::TempDir;

    #[test]
    fn an_empty_object_is_the_default() {
        assert_eq!(Config::default(), Config::from_json("{}").unwrap());
    }

    #[test]
    fn loads_partial_files() {
        let dir = TempDir::new("cauldron-config").unwrap();
        let path = dir.path().join("cauldron.json");
        fs::write(
            &path,
            r#"{
                "tempo_bpm": 90,
                "subdivision": "8n",
                "step_count": 8,
                "kit": [
                    {"name": "clap", "shape": "pink_noise", "attack": 0.005, "decay": 0.1,
                     "sustain": 0, "release": 0.1, "key": "c"}
                ]
            }"#,
        )
        .unwrap();

        let config = Config::from_path(&path).unwrap();
        assert_eq!(90.0, config.tempo_bpm);
        assert_eq!(Subdivision::Eighth, config.subdivision);
        assert_eq!(8, config.step_count);
        assert_eq!(50, config.ahead_by_ms);
        assert_eq!(1, config.kit.len());
        assert_eq!(Some(VoiceId(0)), config.kit.voice_for_key('c'));
    }

    #[test]
    fn reports_missing_and_malformed_files() {
        let dir = TempDir::new("cauldron-config").unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(
            Config::from_path(&missing),
            Err(Error::Read { path, .. }) if path == missing
        ));

        let malformed = dir.path().join("malformed.json");
        fs::write(&malformed, r#"{"step_count": "many"}"#).unwrap();
        assert!(matches!(Config::from_path(&malformed), Err(Error::Parse(_))));

        let bad_kit = dir.path().join("bad_kit.json");
        fs::write(&bad_kit, r#"{"kit": []}"#).unwrap();
        assert!(matches!(Config::from_path(&bad_kit), Err(Error::Parse(_))));
    }

    #[test]
    fn validation_rejects_unusable_settings() {
        let config = Config {
            step_count: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::NoSteps)));

        let config = Config {
            tempo_bpm: -10.0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::Tempo(transport::Error::InvalidTempo(_)))
        ));

        let config = Config {
            tempo_bpm: 1e12,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::Tempo(transport::Error::InvalidTempo(_)))
        ));

        let config = Config {
            ahead_by_ms: 60 * 60 * 1000,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::AheadByTooLarge(3_600_000))
        ));
        let config = Config {
            ahead_by_ms: MAX_AHEAD_BY_MS,
            ..Config::default()
        };
        config.validate().unwrap();

        let config = Config {
            server_address: " ".to_owned(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::MissingServerAddress)));
    }

    #[test]
    fn non_empty_overrides_replace_the_server_address() {
        let config = Config::default().with_server_override(Some("10.0.0.2:57110".to_owned()));
        assert_eq!("10.0.0.2:57110", config.server_address);

        let config = Config::default().with_server_override(Some(String::new()));
        assert_eq!("127.0.0.1:57110", config.server_address);

        let config = Config::default().with_server_override(None);
        assert_eq!("127.0.0.1:57110", config.server_address);
    }
}
