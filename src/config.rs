use serde::Deserialize;
use std::fs;

use crate::chain::Network;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub api: APIConfig,
    pub db: DBConfig,
    pub scanner: ScannerConfig,
    pub notifier: NotifierConfig,
    pub networks: NetworksConfig,
}

#[derive(Deserialize, Clone, Debug)]
pub struct APIConfig {
    pub listen_address: String,
    pub port: i32,
    pub cors_domain: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DBConfig {
    pub dsn: String,
    pub automigrate: bool,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ScannerConfig {
    /// First height to index when the store holds nothing for a network.
    pub starting_height: i64,
    /// Upper bound on heights fetched per scan pass.
    pub scan_window: i64,
    /// Sleep when the highest pending block has caught up with the tip.
    pub backpressure_sleep_secs: u64,
}

#[derive(Deserialize, Clone, Debug)]
pub struct NotifierConfig {
    pub subscriber_url: String,
    pub starting_height: i64,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
}

#[derive(Deserialize, Clone, Debug)]
pub struct NetworksConfig {
    pub polkadot: Option<NetworkConfig>,
    pub kusama: Option<NetworkConfig>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct NetworkConfig {
    /// Substrate API Sidecar base URL for this network.
    pub sidecar_url: String,
    pub request_timeout_secs: u64,
}

impl NetworksConfig {
    pub fn get(&self, network: Network) -> Option<&NetworkConfig> {
        match network {
            Network::Polkadot => self.polkadot.as_ref(),
            Network::Kusama => self.kusama.as_ref(),
        }
    }

    pub fn enabled(&self) -> Vec<Network> {
        let mut nets = Vec::new();
        if self.polkadot.is_some() {
            nets.push(Network::Polkadot);
        }
        if self.kusama.is_some() {
            nets.push(Network::Kusama);
        }
        nets
    }
}

pub fn read_config(path: &str) -> anyhow::Result<Config> {
    let contents = fs::read_to_string(path)?;

    let config: Config = toml::from_str(&contents)?;
    Ok(config)
}
