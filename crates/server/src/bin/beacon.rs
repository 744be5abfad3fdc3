//! beacon: event routing and webhook ingestion for GitOps pipelines.
//!
//! One process hosts the event router, the receiver gateway, the metrics
//! endpoint and the three subscription controllers.

use anyhow::Context as _;
use beacon_api::duration;
use beacon_controller::{run, Context, ControllerMetrics, Settings};
use beacon_ratelimit::RateLimiter;
use beacon_server::events::{self, Dispatcher, EventServerState};
use beacon_server::{hooks, http, spawn_alert_store};
use clap::Parser;
use kube::Client;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "beacon", about = "Event routing and webhook ingestion for GitOps pipelines")]
struct Flags {
    /// Listen address of the event router.
    #[arg(long, env = "EVENTS_ADDR", default_value = "0.0.0.0:9090")]
    events_addr: SocketAddr,

    /// Listen address of the receiver gateway.
    #[arg(long, env = "RECEIVER_ADDR", default_value = "0.0.0.0:9292")]
    receiver_addr: SocketAddr,

    /// Listen address of the metrics and health endpoint.
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:9690")]
    metrics_addr: SocketAddr,

    /// Interval within which duplicate events are collapsed.
    #[arg(long, default_value = "5m")]
    rate_limit_interval: String,

    /// Concurrent reconciles per controller.
    #[arg(long, default_value_t = 4)]
    concurrent: usize,

    /// Upper bound on concurrent outbound deliveries.
    #[arg(long, default_value_t = 50)]
    dispatch_workers: usize,

    /// Reject references crossing namespaces.
    #[arg(long, default_value_t = false)]
    no_cross_namespace_refs: bool,

    /// Treat plain-HTTP provider addresses as terminally invalid.
    #[arg(long, default_value_t = false)]
    block_insecure_http: bool,

    /// Watch all namespaces instead of only the runtime namespace.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    watch_all_namespaces: bool,

    /// Capacity of the resolved-credential cache.
    #[arg(long, default_value_t = 100)]
    token_cache_size: usize,

    /// TTL of resolved-credential cache entries.
    #[arg(long, default_value = "1h")]
    token_cache_ttl: String,

    /// Emit request paths as metric labels (high cardinality).
    #[arg(long, default_value_t = false)]
    path_metrics: bool,

    /// Log filter, e.g. `info` or `beacon_server=debug`.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON.
    #[arg(long, default_value_t = false)]
    log_json: bool,
}

fn init_tracing(flags: &Flags) {
    let filter = EnvFilter::try_new(&flags.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    if flags.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let flags = Flags::parse();
    init_tracing(&flags);

    let rate_limit_interval = duration::parse(&flags.rate_limit_interval)
        .context("invalid --rate-limit-interval")?;
    let token_cache_ttl =
        duration::parse(&flags.token_cache_ttl).context("invalid --token-cache-ttl")?;

    let client = Client::try_default()
        .await
        .context("failed to build Kubernetes client")?;
    let namespace = if flags.watch_all_namespaces {
        None
    } else {
        Some(client.default_namespace().to_string())
    };

    let settings = Settings {
        no_cross_namespace_refs: flags.no_cross_namespace_refs,
        block_insecure_http: flags.block_insecure_http,
        namespace: namespace.clone(),
        concurrent: flags.concurrent,
        rate_limit_interval,
        token_cache_size: flags.token_cache_size,
        token_cache_ttl,
    };

    let metrics =
        ControllerMetrics::new(flags.path_metrics).context("failed to register metrics")?;
    let ctx = Arc::new(Context::new(client.clone(), metrics.clone(), settings));

    info!(
        events = %flags.events_addr,
        hooks = %flags.receiver_addr,
        metrics = %flags.metrics_addr,
        "starting beacon"
    );

    let alerts = spawn_alert_store(&client, namespace.as_deref());

    // Separate limiters: event identities and webhook digests must not
    // collide in one key space.
    let event_limiter = RateLimiter::new(1);
    let hook_limiter = RateLimiter::new(1);
    let sweep_every = Duration::from_secs(60);
    let _event_sweeper = event_limiter.start_sweeper(sweep_every);
    let _hook_sweeper = hook_limiter.start_sweeper(sweep_every);

    let dispatcher = Arc::new(Dispatcher::new(ctx.clone(), flags.dispatch_workers));

    let event_router = events::router(EventServerState {
        ctx: ctx.clone(),
        alerts,
        limiter: event_limiter,
        dispatcher,
    });
    let gateway_router = hooks::router(hooks::GatewayState {
        ctx: ctx.clone(),
        limiter: hook_limiter,
    });
    let metrics_router = http::metrics_router(metrics);

    let (events_result, hooks_result, metrics_result, ()) = tokio::join!(
        http::serve("events", flags.events_addr, event_router),
        http::serve("hooks", flags.receiver_addr, gateway_router),
        http::serve("metrics", flags.metrics_addr, metrics_router),
        run::controllers(ctx),
    );
    events_result.context("event router failed")?;
    hooks_result.context("receiver gateway failed")?;
    metrics_result.context("metrics server failed")?;

    info!("beacon stopped");
    Ok(())
}
