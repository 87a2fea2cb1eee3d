//! engine configuration
//!
//! loaded from toml; every field has a default so an empty file is valid.
//!
//! ```toml
//! custody = "escrow.custody"     # name or 64 hex chars
//! max_proof_len = 256
//! duplicate_commitments = "overwrite"
//! reject_claimed = true
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Principal;
use crate::MAX_PROOF_LEN;

/// name the default custody account is derived from
pub const DEFAULT_CUSTODY: &str = "escrow.custody";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to encode config: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// what `create_transaction` does when `(sender, hash)` already has a record
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// replace the existing record (plain key-value semantics)
    #[default]
    Overwrite,
    /// fail with `DuplicateCommitment`
    Reject,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// account holding locked funds between create and claim
    #[serde(with = "principal_str")]
    pub custody: Principal,
    /// proofs longer than this are rejected before reaching the verifier
    pub max_proof_len: usize,
    pub duplicate_commitments: DuplicatePolicy,
    /// refuse to pay out a commitment that is already claimed, even with a
    /// fresh nullifier
    pub reject_claimed: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            custody: Principal::named(DEFAULT_CUSTODY),
            max_proof_len: MAX_PROOF_LEN,
            duplicate_commitments: DuplicatePolicy::Overwrite,
            reject_claimed: true,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_proof_len == 0 {
            return Err(ConfigError::Invalid(
                "max_proof_len must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// principals in config files may be names or hex
mod principal_str {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    use crate::types::Principal;

    pub fn serialize<S: Serializer>(p: &Principal, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(p)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Principal, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(D::Error::custom)
    }
}
