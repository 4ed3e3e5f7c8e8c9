//! Logging and optional metrics for the admin binary.
//!
//! Logs are always emitted through `tracing-subscriber` to stderr, filtered
//! by `RUST_LOG` (default `info`), as either pretty or JSON lines.
//!
//! With the `metrics` feature, allocation and backfill counters are recorded
//! through OpenTelemetry and written by the stdout exporter when the
//! providers are shut down. Without it, the recording functions are no-ops.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use super::config::LogFormat;

#[cfg(feature = "metrics")]
use opentelemetry::{
    InstrumentationScope, KeyValue,
    metrics::{Counter, Meter},
};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::{Resource, metrics as sdkmetrics};
#[cfg(feature = "metrics")]
use opentelemetry_semantic_conventions as semvcns;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

pub struct TelemetryProviders {
    #[cfg(feature = "metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes pending telemetry. Failures are reported on stderr only: the
    /// command has already completed by the time this runs.
    pub fn shutdown(self) {
        #[cfg(feature = "metrics")]
        {
            if let Err(err) = self.meter_provider.force_flush() {
                eprintln!("Error flushing metrics: {err:#?}");
            }
            if let Err(err) = self.meter_provider.shutdown() {
                eprintln!("Error shutting down meter provider: {err:#?}");
            }
        }
    }
}

pub fn init_telemetry(format: LogFormat) -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "metrics")]
    let meter_provider = init_metrics();

    let (pretty, json) = match format {
        LogFormat::Pretty => (
            Some(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_target(false)
                    .with_timer(fmt::time::ChronoLocal::rfc_3339())
                    .with_file(true)
                    .pretty(),
            ),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_timer(fmt::time::ChronoLocal::rfc_3339())
                    .json(),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(pretty)
        .with(json)
        .try_init()?;

    #[cfg(feature = "metrics")]
    {
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        let scope = InstrumentationScope::builder("refnum")
            .with_version(env!("CARGO_PKG_VERSION"))
            .with_schema_url(semvcns::SCHEMA_URL)
            .build();
        init_metric_handles(opentelemetry::global::meter_with_scope(scope));
    }

    Ok(TelemetryProviders {
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

#[cfg(feature = "metrics")]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name("refnum-admin")
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "metrics")]
fn init_metrics() -> sdkmetrics::SdkMeterProvider {
    let exporter = opentelemetry_stdout::MetricExporter::default();
    let reader = sdkmetrics::PeriodicReader::builder(exporter)
        .with_interval(std::time::Duration::from_secs(5))
        .build();

    sdkmetrics::SdkMeterProvider::builder()
        .with_resource(resource())
        .with_reader(reader)
        .build()
}

#[cfg(feature = "metrics")]
static REFERENCES_ALLOCATED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static ALLOCATION_FAILURES: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static REFERENCES_BACKFILLED: OnceLock<Counter<u64>> = OnceLock::new();

#[cfg(feature = "metrics")]
fn init_metric_handles(meter: Meter) {
    let _ = REFERENCES_ALLOCATED.set(
        meter
            .u64_counter("references_allocated")
            .with_description("References issued by the allocate command")
            .build(),
    );

    let _ = ALLOCATION_FAILURES.set(
        meter
            .u64_counter("allocation_failures")
            .with_description("Failed counter increments")
            .build(),
    );

    let _ = REFERENCES_BACKFILLED.set(
        meter
            .u64_counter("references_backfilled")
            .with_description("References assigned to pre-existing entities")
            .build(),
    );
}

// Convenience functions that compile to no-ops when metrics are disabled
#[cfg(feature = "metrics")]
pub fn increment_references_allocated(count: u64) {
    if let Some(counter) = REFERENCES_ALLOCATED.get() {
        counter.add(count, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_references_allocated(_count: u64) {}

#[cfg(feature = "metrics")]
pub fn increment_allocation_failures() {
    if let Some(counter) = ALLOCATION_FAILURES.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_allocation_failures() {}

#[cfg(feature = "metrics")]
pub fn increment_references_backfilled(count: u64) {
    if let Some(counter) = REFERENCES_BACKFILLED.get() {
        counter.add(count, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_references_backfilled(_count: u64) {}
