use action_throttler::requests::{
    ListInboundShipmentItems, ListInboundShipments, LIST_INBOUND_SHIPMENTS,
    LIST_INBOUND_SHIPMENT_ITEMS,
};
use action_throttler::services::FBA_INBOUND;
use action_throttler::{
    ClientRegistry, DispatchError, DryRunTransport, PoolConfig, RequestParams, ServiceCatalog,
    ServiceClient,
};
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Push a burst of calls through the throttled dispatcher without touching the network.
#[derive(Debug, Parser)]
#[command(name = "action-throttler", version, about)]
struct Args {
    /// JSON service catalog; the built-in catalog is used when omitted
    #[arg(long)]
    quota_file: Option<PathBuf>,

    #[arg(long, default_value = FBA_INBOUND)]
    service: String,

    #[arg(long, default_value = LIST_INBOUND_SHIPMENTS)]
    action: String,

    /// Total number of calls to issue
    #[arg(long, default_value_t = 31)]
    calls: usize,

    /// Number of concurrent callers sharing the calls
    #[arg(long, default_value_t = 1)]
    concurrency: usize,

    /// Give up on a call that waits longer than this for admission
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, serde::Serialize)]
struct Summary {
    sent: u64,
    timed_out: u64,
    elapsed_ms: u64,
    gates: Vec<action_throttler::GateStatus>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("action_throttler={}", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = PoolConfig::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    let catalog = match &args.quota_file {
        Some(path) => ServiceCatalog::load(path)?,
        None => ServiceCatalog::builtin(),
    };

    tracing::info!(
        service = %args.service,
        action = %args.action,
        calls = args.calls,
        concurrency = args.concurrency,
        "Starting dry run"
    );

    let registry = ClientRegistry::new(config, catalog, DryRunTransport::new())?;
    let client = registry.client(&args.service)?;

    let start = Instant::now();
    let concurrency = args.concurrency.max(1);
    let timeout = args.timeout_ms.map(Duration::from_millis);

    let workers: Vec<_> = (0..concurrency)
        .map(|worker| {
            let client = client.clone();
            let action = args.action.clone();
            let share = args.calls / concurrency + usize::from(worker < args.calls % concurrency);
            tokio::spawn(async move { run_worker(client, action, share, timeout).await })
        })
        .collect();

    let mut timed_out = 0;
    for worker in workers {
        timed_out += worker.await??;
    }

    let summary = Summary {
        sent: registry.dispatcher().transport().sent_count(),
        timed_out,
        elapsed_ms: start.elapsed().as_millis() as u64,
        gates: registry.dispatcher().gate_statuses(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}

/// Issue `calls` calls one after another; returns how many timed out.
async fn run_worker(
    client: ServiceClient<DryRunTransport>,
    action: String,
    calls: usize,
    timeout: Option<Duration>,
) -> Result<u64> {
    let mut timed_out = 0;

    for _ in 0..calls {
        let params = sample_params(&client, &action);
        let result = match timeout {
            Some(limit) => client.call_with_timeout(&action, params, limit).await,
            None => client.call(&action, params).await,
        };

        match result {
            Ok(_) => {}
            Err(DispatchError::Throttle(e)) if e.is_recoverable() => {
                tracing::warn!(error = %e, "Call abandoned");
                timed_out += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(timed_out)
}

fn sample_params(client: &ServiceClient<DryRunTransport>, action: &str) -> RequestParams {
    match action {
        LIST_INBOUND_SHIPMENTS => {
            ListInboundShipments::with_statuses(["WORKING"]).into_params(client.handle())
        }
        LIST_INBOUND_SHIPMENT_ITEMS => {
            ListInboundShipmentItems::new("FBA0000000").into_params(client.handle())
        }
        _ => RequestParams::new(),
    }
}
