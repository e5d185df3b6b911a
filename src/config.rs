use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use thiserror::Error;

use crate::crypto::SecretKey;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("OBSCURA_MASTER_KEY must be standard base64 of 32 bytes")]
    InvalidMasterKey,
    #[error("no usable state directory; set OBSCURA_STATE_DIR")]
    NoStateDir,
}

/// Runtime configuration, loaded from the environment. In debug builds a
/// `.env` file in the working directory is honored first.
///
/// - `OBSCURA_ENDPOINT`: control-plane base URL.
/// - `OBSCURA_TOKEN`: API auth token.
/// - `OBSCURA_MASTER_KEY`: base64 32-byte master key (derived from the
///   account credentials by the login tooling; opaque here).
/// - `OBSCURA_STATE_DIR`: overrides the default state directory.
#[derive(Clone)]
pub struct Config {
    pub endpoint: String,
    pub token: String,
    pub master_key: SecretKey,
    pub state_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        #[cfg(debug_assertions)]
        if dotenvy::dotenv().is_ok() {
            tracing::debug!("loaded .env file");
        }

        let endpoint = std::env::var("OBSCURA_ENDPOINT")
            .map_err(|_| ConfigError::Missing("OBSCURA_ENDPOINT"))?;
        let token =
            std::env::var("OBSCURA_TOKEN").map_err(|_| ConfigError::Missing("OBSCURA_TOKEN"))?;

        let master_key_b64 = std::env::var("OBSCURA_MASTER_KEY")
            .map_err(|_| ConfigError::Missing("OBSCURA_MASTER_KEY"))?;
        let master_key_bytes = BASE64
            .decode(master_key_b64.trim())
            .map_err(|_| ConfigError::InvalidMasterKey)?;
        let master_key =
            SecretKey::from_bytes(&master_key_bytes).map_err(|_| ConfigError::InvalidMasterKey)?;

        let state_dir = match std::env::var("OBSCURA_STATE_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => dirs::data_local_dir()
                .map(|base| base.join("obscura"))
                .ok_or(ConfigError::NoStateDir)?,
        };

        Ok(Config {
            endpoint,
            token,
            master_key,
            state_dir,
        })
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("endpoint", &self.endpoint)
            .field("token", &"<redacted>")
            .field("master_key", &self.master_key)
            .field("state_dir", &self.state_dir)
            .finish()
    }
}
