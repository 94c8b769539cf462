//! The boundary between admission control and the network.
//!
//! The dispatcher only decides when a call may go out. Everything about how it
//! goes out (signing, HTTP, decoding) lives behind [`Transport`].

use crate::client::ClientHandle;
use crate::quota::ActionId;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Query parameters of one call, keyed by their wire names.
pub type RequestParams = BTreeMap<String, String>;

/// Performs the remote call once the dispatcher has admitted it.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Payload: Send + 'static;
    type Response: Send + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    async fn send(
        &self,
        handle: &ClientHandle,
        action: &ActionId,
        payload: Self::Payload,
    ) -> Result<Self::Response, Self::Error>;
}

/// Echo of a call that was logged instead of sent.
#[derive(Debug, Clone, Serialize)]
pub struct DryRunResponse {
    pub request_id: String,
    pub sequence: u64,
    pub service: String,
    pub endpoint: String,
    pub action: String,
    pub params: RequestParams,
}

/// Transport that never touches the network. Each admitted call is logged and
/// echoed back, which is enough to observe throttling behaviour end to end.
#[derive(Debug, Default)]
pub struct DryRunTransport {
    sent: AtomicU64,
}

impl DryRunTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Transport for DryRunTransport {
    type Payload = RequestParams;
    type Response = DryRunResponse;
    type Error = Infallible;

    async fn send(
        &self,
        handle: &ClientHandle,
        action: &ActionId,
        payload: RequestParams,
    ) -> Result<DryRunResponse, Infallible> {
        let sequence = self.sent.fetch_add(1, Ordering::Relaxed) + 1;
        let request_id = uuid::Uuid::new_v4().to_string();

        info!(
            request_id = %request_id,
            sequence,
            endpoint = %handle.endpoint(),
            action = %action,
            params = payload.len(),
            "Dry run call"
        );

        Ok(DryRunResponse {
            request_id,
            sequence,
            service: handle.service().to_string(),
            endpoint: handle.endpoint().to_string(),
            action: action.to_string(),
            params: payload,
        })
    }
}
