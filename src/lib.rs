pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod quota;
pub mod registry;
pub mod requests;
pub mod services;
pub mod throttle_gate;
pub mod token_bucket;
pub mod transport;

pub use client::{ClientHandle, ServiceClient};
pub use config::PoolConfig;
pub use dispatcher::ThrottledDispatcher;
pub use error::{DispatchError, ThrottlerError, ThrottlerResult};
pub use quota::{ActionId, ActionQuotaTable, QuotaSpec};
pub use registry::ClientRegistry;
pub use services::{ServiceCatalog, ServiceDefinition};
pub use throttle_gate::{Admission, GateKey, GateStatus, ThrottleGate};
pub use transport::{DryRunTransport, RequestParams, Transport};
