use crate::session::ClientId;
use std::collections::HashMap;

/// Maps a client identifier to a human-readable application name
pub trait NameResolver: Send + Sync {
    fn display_name(&self, client_id: &ClientId) -> String;
}

/// Lookup table from configuration, falling back to the raw identifier
#[derive(Debug, Clone, Default)]
pub struct StaticNames {
    names: HashMap<ClientId, String>,
}

impl StaticNames {
    pub fn new<I>(names: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            names: names
                .into_iter()
                .map(|(id, name)| (ClientId::new(id), name))
                .collect(),
        }
    }
}

impl NameResolver for StaticNames {
    fn display_name(&self, client_id: &ClientId) -> String {
        self.names
            .get(client_id)
            .cloned()
            .unwrap_or_else(|| client_id.to_string())
    }
}
