//! Bridges the storage engine to the two capability traits `router` and
//! `raft` depend on instead of the concrete engine type, keeping those
//! crates free of a compile-time dependency on `engine`.

use anyhow::Result;
use engine::Engine;
use raft::{ApplySink, Command};
use router::LocalKv;
use std::sync::Arc;

pub struct EngineLocalKv(pub Arc<Engine>);

impl LocalKv for EngineLocalKv {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.0.put_string(key.to_vec(), value.to_vec())?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.0.delete(key.to_vec())?;
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.0.get_string(key)?.map(|(_seq, value)| value))
    }
}

pub struct EngineApplySink(pub Arc<Engine>);

impl ApplySink for EngineApplySink {
    fn apply(&self, command: &Command) -> Result<()> {
        match command {
            Command::Put { key, value } => {
                self.0.put_string(key.clone(), value.clone())?;
            }
            Command::Delete { key } => {
                self.0.delete(key.clone())?;
            }
        }
        Ok(())
    }
}
