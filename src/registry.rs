use crate::client::{ClientHandle, ServiceClient};
use crate::config::PoolConfig;
use crate::dispatcher::ThrottledDispatcher;
use crate::error::{ThrottlerError, ThrottlerResult};
use crate::services::ServiceCatalog;
use crate::transport::Transport;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::info;

/// Hands out one client per service, all sharing a single configuration and
/// a single dispatcher.
///
/// Each service's handle is built the first time it is asked for and cached
/// for the life of the registry. Every service key has its own initialization
/// cell, so building one service never blocks lookups of another.
pub struct ClientRegistry<T: Transport> {
    config: Arc<PoolConfig>,
    catalog: ServiceCatalog,
    dispatcher: ThrottledDispatcher<T>,
    handles: DashMap<String, Arc<OnceCell<Arc<ClientHandle>>>>,
}

impl<T: Transport> ClientRegistry<T> {
    /// Create a registry. Configuration problems are reported here, before
    /// any call can be made.
    pub fn new(config: PoolConfig, catalog: ServiceCatalog, transport: T) -> ThrottlerResult<Self> {
        config.ensure_valid()?;
        if catalog.is_empty() {
            return Err(ThrottlerError::ConfigurationError(
                "Service catalog is empty".to_string(),
            ));
        }

        Ok(Self {
            config: Arc::new(config),
            catalog,
            dispatcher: ThrottledDispatcher::new(transport),
            handles: DashMap::new(),
        })
    }

    /// Get the handle for `service`, building it on first access.
    pub fn handle(&self, service: &str) -> ThrottlerResult<Arc<ClientHandle>> {
        let definition = self
            .catalog
            .get(service)
            .ok_or_else(|| ThrottlerError::UnknownService(service.to_string()))?;

        // clone the cell out so the map shard is not held during construction
        let cell = self
            .handles
            .entry(service.to_string())
            .or_default()
            .clone();

        let handle = cell.get_or_init(|| {
            info!(
                service = %definition.name,
                actions = definition.quotas.len(),
                "Creating service client"
            );
            Arc::new(ClientHandle::new(self.config.clone(), definition))
        });
        Ok(handle.clone())
    }

    /// Get a dispatcher-bound client for `service`.
    pub fn client(&self, service: &str) -> ThrottlerResult<ServiceClient<T>> {
        let handle = self.handle(service)?;
        Ok(ServiceClient::new(handle, self.dispatcher.clone()))
    }

    pub fn dispatcher(&self) -> &ThrottledDispatcher<T> {
        &self.dispatcher
    }

    pub fn catalog(&self) -> &ServiceCatalog {
        &self.catalog
    }

    /// Number of service handles built so far.
    pub fn initialized_count(&self) -> usize {
        self.handles
            .iter()
            .filter(|entry| entry.value().get().is_some())
            .count()
    }

    pub fn channel_id(&self) -> Option<&str> {
        self.config.channel_id.as_deref()
    }

    pub fn marketplace_id(&self) -> &str {
        &self.config.marketplace_id
    }

    pub fn seller_id(&self) -> &str {
        &self.config.seller_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;
    use crate::services::{ServiceDefinition, FBA_INBOUND};
    use crate::transport::DryRunTransport;

    fn registry() -> ClientRegistry<DryRunTransport> {
        ClientRegistry::new(test_config(), ServiceCatalog::builtin(), DryRunTransport::new()).unwrap()
    }

    #[test]
    fn test_handles_are_built_once() {
        let registry = registry();
        assert_eq!(registry.initialized_count(), 0);

        let first = registry.handle(FBA_INBOUND).unwrap();
        let second = registry.handle(FBA_INBOUND).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.initialized_count(), 1);
    }

    #[test]
    fn test_concurrent_first_access_builds_one_handle() {
        let registry = Arc::new(registry());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.handle(FBA_INBOUND).unwrap())
            })
            .collect();
        let built: Vec<Arc<ClientHandle>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        for handle in &built[1..] {
            assert!(Arc::ptr_eq(&built[0], handle));
        }
    }

    #[test]
    fn test_unknown_service() {
        let registry = registry();
        assert!(matches!(
            registry.handle("fba-outbound"),
            Err(ThrottlerError::UnknownService(_))
        ));
        assert_eq!(registry.initialized_count(), 0);
    }

    #[test]
    fn test_invalid_config_fails_at_construction() {
        let mut config = test_config();
        config.access_key = String::new();

        let result = ClientRegistry::new(config, ServiceCatalog::builtin(), DryRunTransport::new());
        assert!(matches!(result, Err(ThrottlerError::ValidationError(_))));
    }

    #[test]
    fn test_empty_catalog_rejected() {
        let result = ClientRegistry::new(test_config(), ServiceCatalog::new(), DryRunTransport::new());
        assert!(matches!(result, Err(ThrottlerError::ConfigurationError(_))));
    }

    #[test]
    fn test_pool_accessors() {
        let registry = registry();
        assert_eq!(registry.channel_id(), Some("us-main"));
        assert_eq!(registry.marketplace_id(), "ATVPDKIKX0DER");
        assert_eq!(registry.seller_id(), "A1SELLER");
    }

    #[tokio::test]
    async fn test_registries_are_isolated() {
        let catalog = ServiceCatalog::new()
            .with(ServiceDefinition::fba_inbound())
            .unwrap();
        let a = ClientRegistry::new(test_config(), catalog.clone(), DryRunTransport::new()).unwrap();
        let b = ClientRegistry::new(test_config(), catalog, DryRunTransport::new()).unwrap();

        a.client(FBA_INBOUND)
            .unwrap()
            .acquire("listInboundShipments")
            .await
            .unwrap();

        assert_eq!(a.dispatcher().active_gate_count(), 1);
        assert_eq!(b.dispatcher().active_gate_count(), 0);
    }
}
