use crate::error::{ThrottlerError, ThrottlerResult};
use crate::quota::ActionQuotaTable;
use crate::requests::{LIST_INBOUND_SHIPMENTS, LIST_INBOUND_SHIPMENT_ITEMS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const FBA_INBOUND: &str = "fba-inbound";
pub const FBA_INBOUND_VERSION: &str = "2010-10-01";

/// One logical service: where it lives and how its actions are throttled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub name: String,
    pub endpoint_suffix: String,
    #[serde(default)]
    pub quotas: ActionQuotaTable,
}

impl ServiceDefinition {
    /// Fulfillment inbound shipment API.
    pub fn fba_inbound() -> Self {
        let quotas = ActionQuotaTable::from_pairs([
            (LIST_INBOUND_SHIPMENTS, 30, 2.0),
            (LIST_INBOUND_SHIPMENT_ITEMS, 30, 2.0),
        ])
        .expect("built-in quotas are valid");

        Self {
            name: FBA_INBOUND.to_string(),
            endpoint_suffix: format!("/FulfillmentInboundShipment/{}", FBA_INBOUND_VERSION),
            quotas,
        }
    }

    fn validate(&self) -> ThrottlerResult<()> {
        if self.name.trim().is_empty() {
            return Err(ThrottlerError::ConfigurationError(
                "Service name cannot be empty".to_string(),
            ));
        }
        if !self.endpoint_suffix.starts_with('/') {
            return Err(ThrottlerError::ConfigurationError(format!(
                "Endpoint suffix for service '{}' must start with '/'",
                self.name
            )));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct CatalogFile {
    services: Vec<ServiceDefinition>,
}

/// The set of services a registry can build clients for.
#[derive(Debug, Clone, Default)]
pub struct ServiceCatalog {
    services: BTreeMap<String, ServiceDefinition>,
}

impl ServiceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with only the fulfillment inbound service. Other services
    /// (orders, outbound, finances, reports) are added through a quota file;
    /// `config/quotas.example.json` carries an orders entry to start from.
    pub fn builtin() -> Self {
        Self::new()
            .with(ServiceDefinition::fba_inbound())
            .expect("built-in catalog is consistent")
    }

    pub fn with(mut self, service: ServiceDefinition) -> ThrottlerResult<Self> {
        self.insert(service)?;
        Ok(self)
    }

    pub fn insert(&mut self, service: ServiceDefinition) -> ThrottlerResult<()> {
        service.validate()?;
        if self.services.contains_key(&service.name) {
            return Err(ThrottlerError::ConfigurationError(format!(
                "Service '{}' is defined more than once",
                service.name
            )));
        }
        self.services.insert(service.name.clone(), service);
        Ok(())
    }

    /// Parse a catalog from `{"services": [...]}` JSON.
    pub fn from_json_str(json: &str) -> ThrottlerResult<Self> {
        let file: CatalogFile = serde_json::from_str(json)?;
        let mut catalog = Self::new();
        for service in file.services {
            catalog.insert(service)?;
        }
        Ok(catalog)
    }

    pub fn load(path: impl AsRef<Path>) -> ThrottlerResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ThrottlerError::ConfigurationError(format!(
                "Failed to read quota file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&json)
    }

    pub fn get(&self, name: &str) -> Option<&ServiceDefinition> {
        self.services.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::ActionId;
    use std::time::Duration;

    #[test]
    fn test_builtin_inbound_quotas() {
        let catalog = ServiceCatalog::builtin();
        let inbound = catalog.get(FBA_INBOUND).unwrap();

        assert_eq!(inbound.endpoint_suffix, "/FulfillmentInboundShipment/2010-10-01");
        for action in [LIST_INBOUND_SHIPMENTS, LIST_INBOUND_SHIPMENT_ITEMS] {
            let quota = inbound.quotas.get(&ActionId::parse(action).unwrap()).unwrap();
            assert_eq!(quota.burst_capacity(), 30);
            assert_eq!(quota.restore_period(), Duration::from_secs(2));
        }
    }

    #[test]
    fn test_catalog_from_json() {
        let json = r#"{
            "services": [
                {
                    "name": "orders",
                    "endpoint_suffix": "/Orders/2013-09-01",
                    "quotas": {"ListOrders": [6, 60], "GetOrder": {"burst_capacity": 6, "restore_period": "1m"}}
                },
                {"name": "sellers", "endpoint_suffix": "/Sellers/2011-07-01"}
            ]
        }"#;
        let catalog = ServiceCatalog::from_json_str(json).unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.names().collect::<Vec<_>>(), vec!["orders", "sellers"]);
        assert_eq!(catalog.get("orders").unwrap().quotas.len(), 2);
        assert!(catalog.get("sellers").unwrap().quotas.is_empty());
    }

    #[test]
    fn test_example_quota_file_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/quotas.example.json");
        let catalog = ServiceCatalog::load(path).unwrap();

        assert_eq!(catalog.get(FBA_INBOUND), ServiceCatalog::builtin().get(FBA_INBOUND));
        let orders = catalog.get("orders").unwrap();
        assert_eq!(orders.endpoint_suffix, "/Orders/2013-09-01");
        let list_orders = orders.quotas.get(&ActionId::parse("ListOrders").unwrap()).unwrap();
        assert_eq!(list_orders.burst_capacity(), 6);
        assert_eq!(list_orders.restore_period(), Duration::from_secs(60));
    }

    #[test]
    fn test_duplicate_service_rejected() {
        let result = ServiceCatalog::builtin().with(ServiceDefinition::fba_inbound());
        assert!(matches!(result, Err(ThrottlerError::ConfigurationError(_))));
    }

    #[test]
    fn test_bad_suffix_rejected() {
        let json = r#"{"services": [{"name": "orders", "endpoint_suffix": "Orders"}]}"#;
        assert!(ServiceCatalog::from_json_str(json).is_err());
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let result = ServiceCatalog::load("/nonexistent/quotas.json");
        assert!(matches!(result, Err(ThrottlerError::ConfigurationError(_))));
    }
}
