//! Run configuration and parsing of the externally supplied settings.

use crate::random::RandomEngine;
use murk_utils::errors::ConfigError;
use serde::{Deserialize, Serialize};

/// Configuration for one obfuscation run.
///
/// The `enable_*` flags are the defaults consulted by the per-function gate; function attribute
/// tokens can still force a pass on or off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObfuscationConfig {
    /// Seed of the run's random engine.
    pub seed: u32,
    pub enable_sub: bool,
    pub enable_bcf: bool,
    pub enable_fla: bool,
    /// Number of substitution rounds.
    pub sub_loop: u32,
}

impl Default for ObfuscationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            enable_sub: false,
            enable_bcf: false,
            enable_fla: false,
            sub_loop: 1,
        }
    }
}

impl ObfuscationConfig {
    /// Builds a configuration from raw host settings. A missing seed is drawn from the operating
    /// system; a missing loop count defaults to one round.
    pub fn from_settings(
        seed: Option<&str>,
        sub_loop: Option<&str>,
        enable_sub: bool,
        enable_bcf: bool,
        enable_fla: bool,
    ) -> Result<Self, ConfigError> {
        let seed = match seed {
            Some(raw) => parse_seed(raw)?,
            None => RandomEngine::entropy_seed(),
        };
        let sub_loop = sub_loop.map(parse_sub_loop).transpose()?.unwrap_or(1);
        Ok(Self {
            seed,
            enable_sub,
            enable_bcf,
            enable_fla,
            sub_loop,
        })
    }
}

/// Parses a seed given as exactly eight hex digits, optionally prefixed with `0x`.
pub fn parse_seed(raw: &str) -> Result<u32, ConfigError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    if digits.len() != 8 {
        return Err(ConfigError::MalformedSeed(raw.to_owned()));
    }
    let mut bytes = [0u8; 4];
    hex::decode_to_slice(digits, &mut bytes)?;
    Ok(u32::from_be_bytes(bytes))
}

/// Parses a substitution loop count given in decimal.
pub fn parse_sub_loop(raw: &str) -> Result<u32, ConfigError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ConfigError::MalformedSubLoop(raw.to_owned()));
    }
    raw.parse()
        .map_err(|_| ConfigError::MalformedSubLoop(raw.to_owned()))
}
