//! Sync HTTP [`RemoteClient`] built on `ureq`, talking to the peer's
//! `/api/string` surface (§6.1). A blocking client keeps the router inside
//! the rest of the workspace's thread-based concurrency model rather than
//! pulling in an async runtime.

use crate::RemoteClient;
use anyhow::{anyhow, Result};
use std::time::Duration;

pub struct HttpRemoteClient {
    timeout: Duration,
}

impl HttpRemoteClient {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for HttpRemoteClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl RemoteClient for HttpRemoteClient {
    fn put(&self, addr: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let key = String::from_utf8_lossy(key).into_owned();
        let value = String::from_utf8_lossy(value).into_owned();
        let response = ureq::put(&format!("http://{addr}/api/string"))
            .timeout(self.timeout)
            .send_form(&[("key", key.as_str()), ("value", value.as_str())]);
        match response {
            Ok(_) => Ok(()),
            Err(e) => Err(anyhow!("remote put to {addr} failed: {e}")),
        }
    }

    fn delete(&self, addr: &str, key: &[u8]) -> Result<()> {
        let key = String::from_utf8_lossy(key).into_owned();
        let url = format!("http://{addr}/api?key={key}");
        match ureq::delete(&url).timeout(self.timeout).call() {
            Ok(_) => Ok(()),
            Err(e) => Err(anyhow!("remote delete at {addr} failed: {e}")),
        }
    }

    fn get(&self, addr: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let key_str = String::from_utf8_lossy(key).into_owned();
        let url = format!("http://{addr}/api/string?key={key_str}");
        match ureq::get(&url).timeout(self.timeout).call() {
            Ok(response) => {
                let body: serde_json::Value = response
                    .into_json()
                    .map_err(|e| anyhow!("malformed response from {addr}: {e}"))?;
                let value = body
                    .get("value")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| anyhow!("response from {addr} missing value field"))?;
                Ok(Some(value.as_bytes().to_vec()))
            }
            Err(ureq::Error::Status(404, _)) => Ok(None),
            Err(e) => Err(anyhow!("remote get from {addr} failed: {e}")),
        }
    }
}
