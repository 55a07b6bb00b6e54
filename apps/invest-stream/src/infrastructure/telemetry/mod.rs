//! Tracing Setup
//!
//! Installs the process-wide `tracing` subscriber for the `invest-stream`
//! binary. Events go to stdout through the fmt layer, filtered by
//! `RUST_LOG`. Spans are also exported over OTLP when `OTEL_ENABLED` is set.
//! The library never installs a subscriber; every session runs inside a
//! `stream_session` span carrying its id.
//!
//! | Variable | Default |
//! |---|---|
//! | `OTEL_ENABLED` | off (`true` or `1` turns export on) |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | `http://localhost:4317` |
//! | `OTEL_SERVICE_NAME` | `invest-stream` |

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_SERVICE_NAME: &str = "invest-stream";
const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";

/// Directives layered over `RUST_LOG`.
const DEFAULT_DIRECTIVES: &[&str] = &["invest_stream=info", "tower=warn", "h2=warn", "hyper=warn"];

/// Where spans are exported, if anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// OTLP collector endpoint; `None` keeps spans local.
    pub otlp_endpoint: Option<String>,
    /// `service.name` resource attribute.
    pub service_name: String,
}

impl TelemetryConfig {
    /// Read the `OTEL_*` variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the `OTEL_*` variables from `lookup`.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = lookup("OTEL_ENABLED")
            .is_some_and(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1"));

        Self {
            otlp_endpoint: enabled.then(|| {
                lookup("OTEL_EXPORTER_OTLP_ENDPOINT")
                    .unwrap_or_else(|| DEFAULT_OTLP_ENDPOINT.to_string())
            }),
            service_name: lookup("OTEL_SERVICE_NAME")
                .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
        }
    }
}

/// Flushes exported spans when dropped. Keep it alive until shutdown.
pub struct TelemetryGuard {
    provider: Option<SdkTracerProvider>,
}

impl TelemetryGuard {
    /// Whether spans are being exported.
    #[must_use]
    pub const fn exporting(&self) -> bool {
        self.provider.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("Failed to flush spans on shutdown: {e}");
        }
    }
}

/// Install the subscriber configured from the environment.
#[must_use]
pub fn init() -> TelemetryGuard {
    init_with_config(TelemetryConfig::from_env())
}

/// Install the subscriber.
///
/// If the exporter cannot be built, events are still logged and span
/// export is skipped.
#[must_use]
pub fn init_with_config(config: TelemetryConfig) -> TelemetryGuard {
    let provider = config
        .otlp_endpoint
        .as_deref()
        .and_then(|endpoint| tracer_provider(endpoint, &config.service_name));

    let otel_layer = provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(config.service_name.clone()))
    });

    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(otel_layer)
        .init();

    TelemetryGuard { provider }
}

fn env_filter() -> EnvFilter {
    DEFAULT_DIRECTIVES
        .iter()
        .filter_map(|directive| directive.parse::<Directive>().ok())
        .fold(EnvFilter::from_default_env(), EnvFilter::add_directive)
}

fn tracer_provider(endpoint: &str, service_name: &str) -> Option<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .inspect_err(|e| eprintln!("OTLP exporter unavailable, spans stay local: {e}"))
        .ok()?;

    let resource = opentelemetry_sdk::Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    Some(
        SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(resource)
            .build(),
    )
}
