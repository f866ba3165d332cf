use std::{fs::File, io::BufReader, net::SocketAddr, path::Path};

use serde::Deserialize;

use crate::Error;

/// Configuration of networked multi-party transport.
#[derive(Clone, Debug, Deserialize)]
pub struct NetworkConfig {
    /// Parties in order of their IDs, starting with party 1.
    pub parties: Vec<NetworkPartyConfig>,
}

/// Details about party in networked multiparty protocol.
#[derive(Clone, Debug, Deserialize)]
pub struct NetworkPartyConfig {
    pub address: SocketAddr,
}

impl NetworkConfig {
    /// Load configuration from JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = File::open(path)?;
        let config: NetworkConfig = serde_json::from_reader(BufReader::new(file))?;
        if config.parties.is_empty() {
            return Err(Error::Config("network has no parties".into()));
        }
        Ok(config)
    }

    pub fn num_parties(&self) -> usize {
        self.parties.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load() {
        let path =
            std::env::temp_dir().join(format!("spdz_network_config_{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{"parties": [{"address": "127.0.0.1:9001"}, {"address": "127.0.0.1:9002"}]}"#,
        )
        .unwrap();
        let config = NetworkConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.num_parties(), 2);
        assert_eq!(config.parties[1].address.port(), 9002);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            NetworkConfig::load("/nonexistent/network.json"),
            Err(Error::Io(_))
        ));
    }
}
