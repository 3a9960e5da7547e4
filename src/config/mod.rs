//! Process configuration loaded once from an XDG config file (spec.md
//! §6 "Configuration", SPEC_FULL.md §4.7), threaded explicitly into
//! node and channel construction instead of living behind a global.

use std::path::PathBuf;

use directories::ProjectDirs;
use libp2p::Multiaddr;
use serde::Deserialize;

use crate::channel::DEFAULT_PAYLOAD_SIZE;
use crate::error::{Error, ErrorKind, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub bootstrap_peers: Vec<Multiaddr>,
    pub payload_size: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bootstrap_peers: Vec::new(),
            payload_size: DEFAULT_PAYLOAD_SIZE,
        }
    }
}

/// On-disk representation. Unknown keys are ignored; every field is
/// optional so a partially-specified file still parses.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawConfig {
    #[serde(rename = "BootstrapPeers")]
    bootstrap_peers: Vec<String>,
    #[serde(rename = "PayloadSize")]
    payload_size: Option<u16>,
}

impl Config {
    /// Loads `${XDG_CONFIG_HOME}/p2pxfer/config.json`. A missing file
    /// is not an error: it yields `Config::default()`.
    pub fn load() -> Result<Config> {
        let Some(path) = config_path() else {
            return Ok(Config::default());
        };
        Self::load_from(&path)
    }

    fn load_from(path: &PathBuf) -> Result<Config> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Config::default()),
            Err(e) => return Err(Error::wrapped(ErrorKind::Io, e.to_string())),
        };
        let raw: RawConfig = serde_json::from_str(&contents)
            .map_err(|e| Error::wrapped(ErrorKind::Validation, e.to_string()))?;

        let bootstrap_peers = raw
            .bootstrap_peers
            .iter()
            .map(|s| {
                s.parse::<Multiaddr>()
                    .map_err(|e| Error::wrapped(ErrorKind::Validation, e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Config {
            bootstrap_peers,
            payload_size: raw.payload_size.unwrap_or(DEFAULT_PAYLOAD_SIZE),
        })
    }
}

fn config_path() -> Option<PathBuf> {
    let dirs = ProjectDirs::from("", "", "p2pxfer")?;
    Some(dirs.config_dir().join("config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_uses_standard_payload_size() {
        let config = Config::default();
        assert_eq!(config.payload_size, DEFAULT_PAYLOAD_SIZE);
        assert!(config.bootstrap_peers.is_empty());
    }

    #[test]
    fn missing_file_yields_default() {
        let path = PathBuf::from("/nonexistent/p2pxfer-config-test/config.json");
        let config = Config::load_from(&path).expect("missing file is not an error");
        assert_eq!(config.payload_size, DEFAULT_PAYLOAD_SIZE);
    }

    #[test]
    fn parses_bootstrap_peers_and_payload_size() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"BootstrapPeers": ["/ip4/1.2.3.4/tcp/4001/p2p/12D3KooWAJjbRkp8FPF5f3aQntxLyDhHqVeYHJi25a2TT2G9dTMP"], "PayloadSize": 4096, "Unused": true}"#,
        )
        .expect("write config");
        let config = Config::load_from(&path).expect("parse config");
        assert_eq!(config.payload_size, 4096);
        assert_eq!(config.bootstrap_peers.len(), 1);
    }
}
