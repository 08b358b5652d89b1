use crate::client::ProtocolClient;
use obtest_core::{CommandError, Result};
use std::collections::HashMap;

pub const DEFAULT_CONNECTION: &str = "default";

/// Named connections open for one case.
///
/// Entries are only added; nothing is removed until `close_all`.
#[derive(Default)]
pub struct ConnectionRegistry {
    clients: HashMap<String, ProtocolClient>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection under `name`.
    pub fn insert(&mut self, name: &str, client: ProtocolClient) -> Result<()> {
        if name.is_empty() {
            return Err(CommandError::EmptyName.into());
        }
        if self.clients.contains_key(name) {
            return Err(CommandError::DuplicateConnection(name.to_owned()).into());
        }

        self.clients.insert(name.to_owned(), client);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.clients.contains_key(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut ProtocolClient> {
        self.clients
            .get_mut(name)
            .ok_or_else(|| CommandError::UnknownConnection(name.to_owned()).into())
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Close every connection and empty the registry.
    pub fn close_all(&mut self) {
        for client in self.clients.values_mut() {
            client.close();
        }
        self.clients.clear();
    }
}

impl Drop for ConnectionRegistry {
    fn drop(&mut self) {
        self.close_all();
    }
}
