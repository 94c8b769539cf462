use crate::config::PoolConfig;
use crate::dispatcher::ThrottledDispatcher;
use crate::error::{DispatchError, ThrottlerResult};
use crate::quota::ActionQuotaTable;
use crate::requests::{
    ListInboundShipmentItems, ListInboundShipments, LIST_INBOUND_SHIPMENTS,
    LIST_INBOUND_SHIPMENT_ITEMS,
};
use crate::services::ServiceDefinition;
use crate::throttle_gate::Admission;
use crate::transport::{RequestParams, Transport};
use std::sync::Arc;
use std::time::Duration;

/// Connection details for one logical service.
///
/// Handles are built once per service by the registry and shared from then on;
/// the quota table is frozen at that point.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    service: String,
    endpoint: String,
    config: Arc<PoolConfig>,
    quotas: Arc<ActionQuotaTable>,
}

impl ClientHandle {
    pub fn new(config: Arc<PoolConfig>, service: &ServiceDefinition) -> Self {
        Self {
            service: service.name.clone(),
            endpoint: config.service_endpoint(&service.endpoint_suffix),
            quotas: Arc::new(service.quotas.clone()),
            config,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn quotas(&self) -> &ActionQuotaTable {
        &self.quotas
    }

    pub fn seller_id(&self) -> &str {
        &self.config.seller_id
    }

    pub fn marketplace_id(&self) -> &str {
        &self.config.marketplace_id
    }
}

/// A handle bound to the dispatcher every one of its calls goes through.
pub struct ServiceClient<T: Transport> {
    handle: Arc<ClientHandle>,
    dispatcher: ThrottledDispatcher<T>,
}

impl<T: Transport> Clone for ServiceClient<T> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            dispatcher: self.dispatcher.clone(),
        }
    }
}

impl<T: Transport> ServiceClient<T> {
    pub fn new(handle: Arc<ClientHandle>, dispatcher: ThrottledDispatcher<T>) -> Self {
        Self { handle, dispatcher }
    }

    pub fn handle(&self) -> &Arc<ClientHandle> {
        &self.handle
    }

    pub async fn acquire(&self, action: &str) -> ThrottlerResult<Admission> {
        self.dispatcher.acquire(&self.handle, action).await
    }

    pub async fn call(
        &self,
        action: &str,
        payload: T::Payload,
    ) -> Result<T::Response, DispatchError<T::Error>> {
        self.dispatcher.call(&self.handle, action, payload).await
    }

    pub async fn call_with_timeout(
        &self,
        action: &str,
        payload: T::Payload,
        limit: Duration,
    ) -> Result<T::Response, DispatchError<T::Error>> {
        self.dispatcher
            .call_with_timeout(&self.handle, action, payload, limit)
            .await
    }
}

impl<T> ServiceClient<T>
where
    T: Transport<Payload = RequestParams>,
{
    pub async fn list_inbound_shipments(
        &self,
        request: ListInboundShipments,
    ) -> Result<T::Response, DispatchError<T::Error>> {
        let params = request.into_params(&self.handle);
        self.call(LIST_INBOUND_SHIPMENTS, params).await
    }

    pub async fn list_inbound_shipment_items(
        &self,
        request: ListInboundShipmentItems,
    ) -> Result<T::Response, DispatchError<T::Error>> {
        let params = request.into_params(&self.handle);
        self.call(LIST_INBOUND_SHIPMENT_ITEMS, params).await
    }
}
