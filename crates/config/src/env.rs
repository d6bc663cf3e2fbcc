//! Loads the environment-sourced half of the configuration — the settings
//! spec.md calls out as required at process start of the serving binary
//! rather than belonging in the TOML document: they identify *this* process
//! on the network and can't sensibly ship a default in a shared file.

use crate::error::ConfigError;
use crate::PeerAddress;
use std::str::FromStr;

pub fn required(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnv { name: name.to_string() })
}

pub fn required_parsed<T>(name: &str) -> Result<T, ConfigError>
where
    T: FromStr,
{
    let raw = required(name)?;
    raw.parse().map_err(|_| ConfigError::InvalidEnv {
        name: name.to_string(),
        value: raw.clone(),
        reason: format!("expected a value parseable as {}", std::any::type_name::<T>()),
    })
}

/// Parses `id=address,id=address,...` into peer addresses. Used for the
/// public peer map passed to the hash ring and router.
pub fn required_peer_map(name: &str) -> Result<Vec<PeerAddress>, ConfigError> {
    let raw = required(name)?;
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry.split_once('=').map(|(id, address)| PeerAddress { id: id.to_string(), address: address.to_string() }).ok_or_else(|| {
                ConfigError::InvalidEnv {
                    name: name.to_string(),
                    value: entry.to_string(),
                    reason: "expected id=address".to_string(),
                }
            })
        })
        .collect()
}

/// Optional comma-separated list; absent or empty yields no entries.
pub fn optional_list(name: &str) -> Vec<String> {
    std::env::var(name)
        .ok()
        .map(|raw| raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect())
        .unwrap_or_default()
}
