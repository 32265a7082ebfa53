// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Key generation for client, server and hybrid configurations
//!
//! Keys come from the OS RNG, or from a password stretched with
//! PBKDF2-HMAC-SHA256 so every machine derives the same keys from it.

use ed25519_dalek::SigningKey;
use pbkdf2::pbkdf2_hmac;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;

use super::ConfigFile;
use crate::crypto::derive_key_id;

const PASSWORD_SALT: &[u8] = b"fabstir-clipboard genkeys";
pub const PASSWORD_ITERATIONS: u32 = 100_000;

/// psk ‖ encrypt_sk ‖ signing seed
const KEY_POOL_SIZE: usize = 96;

pub struct GeneratedKeys {
    pub psk: [u8; 32],
    pub encrypt_sk: [u8; 32],
    pub sign_sk: SigningKey,
}

impl GeneratedKeys {
    pub fn random() -> Self {
        let mut pool = [0u8; KEY_POOL_SIZE];
        OsRng.fill_bytes(&mut pool);
        Self::from_pool(&pool)
    }

    pub fn from_password(password: &str) -> Self {
        let mut pool = [0u8; KEY_POOL_SIZE];
        pbkdf2_hmac::<Sha256>(
            password.as_bytes(),
            PASSWORD_SALT,
            PASSWORD_ITERATIONS,
            &mut pool,
        );
        Self::from_pool(&pool)
    }

    fn from_pool(pool: &[u8; KEY_POOL_SIZE]) -> Self {
        let mut psk = [0u8; 32];
        let mut encrypt_sk = [0u8; 32];
        let mut seed = [0u8; 32];
        psk.copy_from_slice(&pool[..32]);
        encrypt_sk.copy_from_slice(&pool[32..64]);
        seed.copy_from_slice(&pool[64..]);
        Self {
            psk,
            encrypt_sk,
            sign_sk: SigningKey::from_bytes(&seed),
        }
    }

    pub fn encrypt_sk_id(&self) -> u64 {
        derive_key_id(&self.encrypt_sk)
    }

    fn client_file(&self, connect: &str) -> ConfigFile {
        ConfigFile {
            connect: Some(connect.to_string()),
            psk: Some(hex::encode(self.psk)),
            sign_pk: Some(hex::encode(self.sign_sk.verifying_key().as_bytes())),
            sign_sk: Some(hex::encode(self.sign_sk.to_bytes())),
            encrypt_sk: Some(hex::encode(self.encrypt_sk)),
            ..ConfigFile::default()
        }
    }

    fn server_file(&self, listen: &str) -> ConfigFile {
        ConfigFile {
            listen: Some(listen.to_string()),
            psk: Some(hex::encode(self.psk)),
            sign_pk: Some(hex::encode(self.sign_sk.verifying_key().as_bytes())),
            ..ConfigFile::default()
        }
    }

    fn hybrid_file(&self, listen: &str, connect: &str) -> ConfigFile {
        ConfigFile {
            listen: Some(listen.to_string()),
            ..self.client_file(connect)
        }
    }

    /// The three configuration snippets `genkeys` prints
    pub fn render(&self, config_path: &str, listen: &str, connect: &str) -> Result<String, toml::ser::Error> {
        Ok(format!(
            "\n--- Create a file named {} with only the lines relevant to your configuration ---\n\n\
             # Configuration for a client\n\n{}\n\
             # Configuration for a server\n\n{}\n\
             # Hybrid configuration\n\n{}",
            config_path,
            toml::to_string(&self.client_file(connect))?,
            toml::to_string(&self.server_file(listen))?,
            toml::to_string(&self.hybrid_file(listen, connect))?,
        ))
    }
}
