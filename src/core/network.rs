//! Host directory for the network rendezvous variant
//!
//! A connection may register at most one network record, update it while it
//! lives, and loses it on disconnect. Registration state is an explicit sum
//! type rather than optional-field presence, so "unregistered" cannot be
//! confused with an empty record.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use log::debug;
use serde_json::{Map, Value};

use crate::core::message::{NetworkRecord, SocketId};
use crate::error::{Result, SignalHubError};

/// Whether a connection currently owns a network record.
#[derive(Debug, Clone, PartialEq)]
pub enum Registration {
    Unregistered,
    Registered(NetworkRecord),
}

/// Keys the server owns; client-supplied values for these are dropped.
const RESERVED_KEYS: [&str; 3] = ["id", "host", "registered_at"];

pub struct NetworkDirectory {
    hosts: RwLock<HashMap<SocketId, NetworkRecord>>,
}

impl NetworkDirectory {
    pub fn new() -> Self {
        Self {
            hosts: RwLock::new(HashMap::new()),
        }
    }

    /// Register a network owned by `owner`. Fails if the sender already
    /// owns a record.
    pub fn register(&self, owner: &str, mut fields: Map<String, Value>) -> Result<NetworkRecord> {
        let mut hosts = self.write();
        if hosts.contains_key(owner) {
            return Err(SignalHubError::HostExists);
        }

        for key in RESERVED_KEYS {
            fields.remove(key);
        }
        let record = NetworkRecord {
            id: owner.to_string(),
            host: owner.to_string(),
            registered_at: Utc::now(),
            fields,
        };
        hosts.insert(owner.to_string(), record.clone());
        debug!("network registered for host {}", owner);
        Ok(record)
    }

    /// Merge fields into the sender's existing record. Fails if the sender
    /// never registered.
    pub fn update(&self, owner: &str, fields: Map<String, Value>) -> Result<NetworkRecord> {
        let mut hosts = self.write();
        let record = hosts.get_mut(owner).ok_or(SignalHubError::HostNotFound)?;

        for (key, value) in fields {
            if !RESERVED_KEYS.contains(&key.as_str()) {
                record.fields.insert(key, value);
            }
        }
        Ok(record.clone())
    }

    pub fn registration(&self, owner: &str) -> Registration {
        match self.read().get(owner) {
            Some(record) => Registration::Registered(record.clone()),
            None => Registration::Unregistered,
        }
    }

    /// Drop the sender's record, returning it for the removal broadcast.
    pub fn remove(&self, owner: &str) -> Option<NetworkRecord> {
        self.write().remove(owner)
    }

    pub fn is_host(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<NetworkRecord> {
        self.read().get(id).cloned()
    }

    /// All registered records, for the HTTP listing.
    pub fn records(&self) -> Vec<NetworkRecord> {
        self.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<SocketId, NetworkRecord>> {
        self.hosts.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<SocketId, NetworkRecord>> {
        self.hosts.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for NetworkDirectory {
    fn default() -> Self {
        Self::new()
    }
}
