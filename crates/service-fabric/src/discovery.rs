//! Service discovery contract and the in-memory default.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::FabricError;

/// Name-to-address resolution.
///
/// The client treats this as an injected capability and assumes nothing
/// about consistency across calls beyond eventual resolution.
#[async_trait]
pub trait ServiceDiscovery: Send + Sync {
    async fn get_address(&self, name: &str) -> Result<String, FabricError>;
    async fn register(&self, name: &str, address: &str);
    async fn unregister(&self, name: &str);
    async fn list(&self) -> Vec<String>;
}

/// In-memory discovery that fabricates `localhost:50NNN` addresses on
/// first lookup, then remembers them.
#[derive(Default)]
pub struct StaticDiscovery {
    entries: RwLock<HashMap<String, String>>,
}

impl StaticDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the table up front.
    pub async fn with_services(services: &[(&str, &str)]) -> Self {
        let discovery = Self::new();
        for (name, address) in services {
            discovery.register(name, address).await;
        }
        discovery
    }

    fn fabricate_address(name: &str) -> String {
        // Deterministic per name, within the 50000-50999 range.
        let offset: u32 = name.bytes().map(u32::from).sum::<u32>() % 1000;
        format!("localhost:{}", 50_000 + offset)
    }
}

#[async_trait]
impl ServiceDiscovery for StaticDiscovery {
    async fn get_address(&self, name: &str) -> Result<String, FabricError> {
        if let Some(address) = self.entries.read().await.get(name) {
            return Ok(address.clone());
        }
        let mut entries = self.entries.write().await;
        // Re-check under the write lock before fabricating.
        if let Some(address) = entries.get(name) {
            return Ok(address.clone());
        }
        let address = Self::fabricate_address(name);
        debug!(service = name, %address, "fabricated address for unknown service");
        entries.insert(name.to_string(), address.clone());
        Ok(address)
    }

    async fn register(&self, name: &str, address: &str) {
        self.entries
            .write()
            .await
            .insert(name.to_string(), address.to_string());
    }

    async fn unregister(&self, name: &str) {
        self.entries.write().await.remove(name);
    }

    async fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fabricates_and_remembers_addresses() {
        let discovery = StaticDiscovery::new();
        let first = discovery.get_address("llm-service").await.unwrap();
        let second = discovery.get_address("llm-service").await.unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("localhost:50"));

        let port: u32 = first.strip_prefix("localhost:").unwrap().parse().unwrap();
        assert!((50_000..51_000).contains(&port));
    }

    #[tokio::test]
    async fn register_overrides_fabrication() {
        let discovery = StaticDiscovery::new();
        discovery.register("rag-service", "10.0.0.7:9000").await;
        assert_eq!(
            discovery.get_address("rag-service").await.unwrap(),
            "10.0.0.7:9000"
        );

        discovery.unregister("rag-service").await;
        // Falls back to fabrication after unregister.
        assert!(discovery
            .get_address("rag-service")
            .await
            .unwrap()
            .starts_with("localhost:"));
    }

    #[tokio::test]
    async fn list_is_sorted() {
        let discovery =
            StaticDiscovery::with_services(&[("b-svc", "x:1"), ("a-svc", "y:2")]).await;
        assert_eq!(discovery.list().await, vec!["a-svc", "b-svc"]);
    }
}
