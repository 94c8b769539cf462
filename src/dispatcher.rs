use crate::client::ClientHandle;
use crate::error::{DispatchError, ThrottlerResult};
use crate::quota::ActionId;
use crate::throttle_gate::{Admission, GateKey, GateStatus, ThrottleGate};
use crate::transport::Transport;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{trace, Instrument};

/// Single choke point for every outbound call.
///
/// Each call waits at the gate for its `(service, action)` pair, then goes to
/// the transport untouched. Gates are created on first use from the handle's
/// quota table; actions without a quota skip the gate entirely.
///
/// Gates for different actions share nothing but the map they are looked up
/// in, and the map is never held while a caller waits.
pub struct ThrottledDispatcher<T: Transport> {
    transport: Arc<T>,
    gates: Arc<DashMap<GateKey, Arc<ThrottleGate>>>,
}

impl<T: Transport> Clone for ThrottledDispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            gates: self.gates.clone(),
        }
    }
}

impl<T: Transport> ThrottledDispatcher<T> {
    pub fn new(transport: T) -> Self {
        Self::with_shared_transport(Arc::new(transport))
    }

    pub fn with_shared_transport(transport: Arc<T>) -> Self {
        Self {
            transport,
            gates: Arc::new(DashMap::new()),
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Wait for admission of one `action` call on `handle` without sending anything.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAction` if `action` is blank.
    pub async fn acquire(&self, handle: &ClientHandle, action: &str) -> ThrottlerResult<Admission> {
        let action = ActionId::parse(action)?;
        Ok(self.admit(handle, &action).await)
    }

    /// Admit and send one call, returning the transport's result unchanged.
    pub async fn call(
        &self,
        handle: &ClientHandle,
        action: &str,
        payload: T::Payload,
    ) -> Result<T::Response, DispatchError<T::Error>> {
        let action = ActionId::parse(action)?;
        let span = call_span(handle, &action);
        self.dispatch(handle, &action, payload, None)
            .instrument(span)
            .await
    }

    /// Like [`call`](Self::call), but give up waiting for admission after `limit`.
    ///
    /// On `ThrottleTimeout` nothing was sent and no token was used.
    pub async fn call_with_timeout(
        &self,
        handle: &ClientHandle,
        action: &str,
        payload: T::Payload,
        limit: Duration,
    ) -> Result<T::Response, DispatchError<T::Error>> {
        let action = ActionId::parse(action)?;
        let span = call_span(handle, &action);
        self.dispatch(handle, &action, payload, Some(limit))
            .instrument(span)
            .await
    }

    /// Status of every gate created so far.
    pub fn gate_statuses(&self) -> Vec<GateStatus> {
        let mut statuses: Vec<GateStatus> =
            self.gates.iter().map(|entry| entry.value().status()).collect();
        statuses.sort_by(|a, b| (&a.service, &a.action).cmp(&(&b.service, &b.action)));
        statuses
    }

    pub fn active_gate_count(&self) -> usize {
        self.gates.len()
    }

    async fn admit(&self, handle: &ClientHandle, action: &ActionId) -> Admission {
        match self.gate_for(handle, action) {
            Some(gate) => gate.acquire().await,
            None => Admission::immediate(),
        }
    }

    async fn dispatch(
        &self,
        handle: &ClientHandle,
        action: &ActionId,
        payload: T::Payload,
        limit: Option<Duration>,
    ) -> Result<T::Response, DispatchError<T::Error>> {
        let admission = match (self.gate_for(handle, action), limit) {
            (Some(gate), Some(limit)) => gate.acquire_timeout(limit).await?,
            (Some(gate), None) => gate.acquire().await,
            (None, _) => Admission::immediate(),
        };
        trace!(waited_ms = admission.waited.as_millis() as u64, "Admitted");

        self.transport
            .send(handle, action, payload)
            .await
            .map_err(DispatchError::Transport)
    }

    /// Get the gate for an action, creating it on first use.
    fn gate_for(&self, handle: &ClientHandle, action: &ActionId) -> Option<Arc<ThrottleGate>> {
        let quota = *handle.quotas().get(action)?;
        let key = GateKey::new(handle.service(), action.clone());

        if let Some(gate) = self.gates.get(&key) {
            return Some(gate.clone());
        }

        // another caller may have created it since the lookup above
        let gate = self
            .gates
            .entry(key.clone())
            .or_insert_with(|| Arc::new(ThrottleGate::new(key, quota)))
            .clone();
        Some(gate)
    }
}

fn call_span(handle: &ClientHandle, action: &ActionId) -> tracing::Span {
    tracing::debug_span!(
        "dispatch",
        call_id = %uuid::Uuid::new_v4(),
        service = handle.service(),
        action = %action
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;
    use crate::error::ThrottlerError;
    use crate::services::ServiceDefinition;
    use crate::transport::{DryRunTransport, RequestParams};
    use tokio_test::{assert_pending, assert_ready, task};

    fn inbound_handle() -> ClientHandle {
        ClientHandle::new(Arc::new(test_config()), &ServiceDefinition::fba_inbound())
    }

    #[tokio::test]
    async fn test_gates_created_on_demand() {
        let dispatcher = ThrottledDispatcher::new(DryRunTransport::new());
        let handle = inbound_handle();
        assert_eq!(dispatcher.active_gate_count(), 0);

        dispatcher.acquire(&handle, "listInboundShipments").await.unwrap();
        dispatcher.acquire(&handle, "listInboundShipments").await.unwrap();
        assert_eq!(dispatcher.active_gate_count(), 1);

        dispatcher.acquire(&handle, "listInboundShipmentItems").await.unwrap();
        assert_eq!(dispatcher.active_gate_count(), 2);

        let key = GateKey::new("fba-inbound", ActionId::parse("listInboundShipments").unwrap());
        let first = dispatcher.gate_for(&handle, &key.action).unwrap();
        let second = dispatcher.gate_for(&handle, &key.action).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_unregistered_action_has_no_gate() {
        let dispatcher = ThrottledDispatcher::new(DryRunTransport::new());
        let handle = inbound_handle();

        for _ in 0..1_000 {
            let mut acquire = task::spawn(dispatcher.acquire(&handle, "getServiceStatus"));
            let admission = assert_ready!(acquire.poll()).unwrap();
            assert!(!admission.was_delayed());
        }
        assert_eq!(dispatcher.active_gate_count(), 0);
    }

    #[tokio::test]
    async fn test_blank_action_rejected() {
        let dispatcher = ThrottledDispatcher::new(DryRunTransport::new());
        let handle = inbound_handle();

        let err = dispatcher.call(&handle, "", RequestParams::new()).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Throttle(ThrottlerError::UnknownAction(_))
        ));
        assert_eq!(dispatcher.transport().sent_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_actions_do_not_contend() {
        let dispatcher = ThrottledDispatcher::new(DryRunTransport::new());
        let handle = inbound_handle();

        for _ in 0..30 {
            dispatcher.acquire(&handle, "listInboundShipments").await.unwrap();
        }
        let mut blocked = task::spawn(dispatcher.acquire(&handle, "listInboundShipments"));
        assert_pending!(blocked.poll());

        let mut other = task::spawn(dispatcher.acquire(&handle, "listInboundShipmentItems"));
        assert!(assert_ready!(other.poll()).is_ok());
    }

    #[tokio::test]
    async fn test_call_forwards_payload() {
        let dispatcher = ThrottledDispatcher::new(DryRunTransport::new());
        let handle = inbound_handle();

        let mut params = RequestParams::new();
        params.insert("ShipmentId".to_string(), "FBA15DJ8SQ1C".to_string());

        let response = dispatcher
            .call(&handle, "listInboundShipmentItems", params.clone())
            .await
            .unwrap();
        assert_eq!(response.params, params);
        assert_eq!(response.action, "listInboundShipmentItems");
        assert_eq!(response.service, "fba-inbound");
        assert_eq!(dispatcher.transport().sent_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_call_is_not_sent() {
        let dispatcher = ThrottledDispatcher::new(DryRunTransport::new());
        let handle = inbound_handle();

        for _ in 0..30 {
            dispatcher
                .call(&handle, "listInboundShipments", RequestParams::new())
                .await
                .unwrap();
        }

        let err = dispatcher
            .call_with_timeout(
                &handle,
                "listInboundShipments",
                RequestParams::new(),
                Duration::from_millis(100),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Throttle(ThrottlerError::ThrottleTimeout { .. })
        ));
        assert_eq!(dispatcher.transport().sent_count(), 30);
    }
}
