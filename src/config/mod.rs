// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! TOML configuration and key material
//!
//! The file uses PascalCase keys; binary keys are hex encoded. Everything
//! except `Psk` is optional at load time. Commands check for the keys they
//! need and name the missing one.

pub mod keygen;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::crypto::{derive_key_id, parse_signing_key, parse_verifying_key};

pub const DEFAULT_CONFIG_FILE: &str = ".fabstir-clipboard.toml";
pub const DEFAULT_LISTEN: &str = "0.0.0.0:8075";
pub const DEFAULT_CONNECT: &str = "127.0.0.1:8075";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_DATA_TIMEOUT_SECS: u64 = 3600;
pub const DEFAULT_TTL_SECS: u64 = 7 * 24 * 60 * 60;
pub const DEFAULT_MAX_CLIENTS: usize = 10;
pub const DEFAULT_MAX_PULLERS: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unable to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{key} is not valid hex: {source}")]
    InvalidHex {
        key: &'static str,
        #[source]
        source: hex::FromHexError,
    },

    #[error("{key} must be {expected} bytes, got {actual}")]
    InvalidLength {
        key: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{key} is not a valid key: {reason}")]
    InvalidKey { key: &'static str, reason: String },

    #[error("{0} is missing from the configuration")]
    Missing(&'static str),

    #[error("Unable to locate the home directory")]
    NoHomeDirectory,
}

/// On-disk representation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ConfigFile {
    pub listen: Option<String>,
    pub connect: Option<String>,
    pub psk: Option<String>,
    pub sign_pk: Option<String>,
    pub sign_sk: Option<String>,
    pub encrypt_sk: Option<String>,
    #[serde(rename = "EncryptSkID")]
    pub encrypt_sk_id: Option<u64>,
    pub timeout: Option<u64>,
    pub data_timeout: Option<u64>,
    #[serde(rename = "TTL")]
    pub ttl: Option<u64>,
    pub max_clients: Option<usize>,
    pub max_len: Option<u64>,
    pub max_stream_bytes: Option<u64>,
    pub max_stream_duration: Option<u64>,
    pub max_pullers: Option<usize>,
}

/// Decoded keys, immutable for the life of the process
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    pub psk: [u8; 32],
    pub sign_pk: Option<VerifyingKey>,
    pub sign_sk: Option<SigningKey>,
    pub encrypt_sk: Option<[u8; 32]>,
    pub encrypt_sk_id: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub connect: String,
    pub keys: KeyMaterial,
    pub timeout: Duration,
    pub data_timeout: Duration,
    pub ttl: Duration,
    pub max_clients: usize,
    /// Largest accepted stored payload, 0 for no limit
    pub max_len: u64,
    /// Per-push byte budget, 0 for no limit
    pub max_stream_bytes: u64,
    /// Per-push duration budget, zero for no limit
    pub max_stream_duration: Duration,
    pub max_pullers: usize,
}

impl Config {
    /// `~/.fabstir-clipboard.toml`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(DEFAULT_CONFIG_FILE))
            .ok_or(ConfigError::NoHomeDirectory)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(contents)?;
        Self::from_file(file)
    }

    pub fn from_file(file: ConfigFile) -> Result<Self, ConfigError> {
        let psk = decode_key32("Psk", file.psk.as_deref().ok_or(ConfigError::Missing("Psk"))?)?;
        let sign_pk = file
            .sign_pk
            .as_deref()
            .map(|hex| {
                let bytes = decode_hex("SignPk", hex)?;
                parse_verifying_key(&bytes).map_err(|e| ConfigError::InvalidKey {
                    key: "SignPk",
                    reason: e.to_string(),
                })
            })
            .transpose()?;
        let sign_sk = file
            .sign_sk
            .as_deref()
            .map(|hex| {
                let bytes = decode_hex("SignSk", hex)?;
                parse_signing_key(&bytes).map_err(|e| ConfigError::InvalidKey {
                    key: "SignSk",
                    reason: e.to_string(),
                })
            })
            .transpose()?;
        let encrypt_sk = file
            .encrypt_sk
            .as_deref()
            .map(|hex| decode_key32("EncryptSk", hex))
            .transpose()?;
        let encrypt_sk_id = file
            .encrypt_sk_id
            .or_else(|| encrypt_sk.as_ref().map(derive_key_id))
            .unwrap_or(0);

        Ok(Self {
            listen: file.listen.unwrap_or_else(|| DEFAULT_LISTEN.to_string()),
            connect: file.connect.unwrap_or_else(|| DEFAULT_CONNECT.to_string()),
            keys: KeyMaterial {
                psk,
                sign_pk,
                sign_sk,
                encrypt_sk,
                encrypt_sk_id,
            },
            timeout: Duration::from_secs(file.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            data_timeout: Duration::from_secs(
                file.data_timeout.unwrap_or(DEFAULT_DATA_TIMEOUT_SECS),
            ),
            ttl: Duration::from_secs(file.ttl.unwrap_or(DEFAULT_TTL_SECS)),
            max_clients: file.max_clients.unwrap_or(DEFAULT_MAX_CLIENTS),
            max_len: file.max_len.unwrap_or(0),
            max_stream_bytes: file.max_stream_bytes.unwrap_or(0),
            max_stream_duration: Duration::from_secs(file.max_stream_duration.unwrap_or(0)),
            max_pullers: file.max_pullers.unwrap_or(DEFAULT_MAX_PULLERS),
        })
    }

    pub fn require_sign_pk(&self) -> Result<VerifyingKey, ConfigError> {
        self.keys.sign_pk.ok_or(ConfigError::Missing("SignPk"))
    }
}

fn decode_hex(key: &'static str, value: &str) -> Result<Vec<u8>, ConfigError> {
    hex::decode(value.trim()).map_err(|source| ConfigError::InvalidHex { key, source })
}

fn decode_key32(key: &'static str, value: &str) -> Result<[u8; 32], ConfigError> {
    let bytes = decode_hex(key, value)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| ConfigError::InvalidLength {
            key,
            expected: 32,
            actual: bytes.len(),
        })
}
