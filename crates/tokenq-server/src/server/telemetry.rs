//! # Telemetry Features
//!
//! Console logging through `tracing-subscriber` is always on and filtered by
//! `RUST_LOG` (default `info`). OpenTelemetry export is opt-in.
//!
//! ## Feature matrix
//!
//! - `otel-trace`: Exports request and store spans through OpenTelemetry.
//! - `metrics`: Exports intake counters (submissions, rejections, status
//!   changes, exports, reminders).
//! - `stdout`: Uses the stdout exporter for whichever of the above is on.
//!
//! ## Feature constraints
//!
//! - `stdout` requires at least one of `otel-trace` or `metrics`.
//!
//! ## Example usage
//!
//! ```bash
//! cargo run -p tokenq-server --features otel-trace,metrics,stdout
//! ```

#[cfg(all(
    feature = "stdout",
    not(any(feature = "otel-trace", feature = "metrics"))
))]
compile_error!(
    "The 'stdout' feature requires at least one of 'otel-trace' or 'metrics' to be enabled."
);

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Meter};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

#[cfg(any(feature = "metrics", feature = "otel-trace"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "metrics", feature = "otel-trace"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "metrics", feature = "otel-trace"))]
use opentelemetry_semantic_conventions as semvcns;

#[cfg(feature = "otel-trace")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "otel-trace")]
use opentelemetry_sdk::propagation::TraceContextPropagator;
#[cfg(feature = "otel-trace")]
use opentelemetry_sdk::trace as sdktrace;

#[cfg(any(feature = "metrics", feature = "otel-trace"))]
const SERVICE_NAME: &str = "tokenq";

#[derive(Default)]
pub struct TelemetryProviders {
    #[cfg(feature = "otel-trace")]
    pub tracer_provider: Option<sdktrace::SdkTracerProvider>,
    #[cfg(feature = "metrics")]
    pub meter_provider: Option<sdkmetrics::SdkMeterProvider>,
}

impl TelemetryProviders {
    /// Flushes and stops every exporter. Errors go to stderr since the
    /// subscriber may already be gone.
    pub fn shutdown(self) {
        #[cfg(feature = "otel-trace")]
        {
            if let Some(provider) = self.tracer_provider {
                if let Err(err) = provider.force_flush() {
                    eprintln!("Error flushing traces: {err:#?}");
                }
                if let Err(err) = provider.shutdown() {
                    eprintln!("Error shutting down tracer: {err:#?}");
                }
            }
        }

        #[cfg(feature = "metrics")]
        {
            if let Some(provider) = self.meter_provider {
                if let Err(err) = provider.force_flush() {
                    eprintln!("Error flushing metrics: {err:#?}");
                }
                if let Err(err) = provider.shutdown() {
                    eprintln!("Error shutting down meter: {err:#?}");
                }
            }
        }
    }
}

pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "otel-trace")]
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    #[cfg(feature = "otel-trace")]
    let tracer_provider = init_tracer();

    #[cfg(feature = "metrics")]
    let meter_provider = init_metrics();

    #[cfg(any(feature = "metrics", feature = "otel-trace"))]
    let scope = InstrumentationScope::builder(SERVICE_NAME)
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build();

    // Human-readable console output, independent of any OpenTelemetry
    // exporter.
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true)
                .pretty(),
        );

    #[cfg(feature = "otel-trace")]
    let registry = {
        opentelemetry::global::set_tracer_provider(tracer_provider.clone());
        registry.with(
            tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer_with_scope(scope.clone()))
                .with_error_records_to_exceptions(true),
        )
    };

    #[cfg(feature = "metrics")]
    let registry = {
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        let meter = opentelemetry::global::meter_with_scope(scope);
        init_metric_handles(&meter);

        registry.with(tracing_opentelemetry::MetricsLayer::new(
            meter_provider.clone(),
        ))
    };

    registry.try_init()?;

    Ok(TelemetryProviders {
        #[cfg(feature = "otel-trace")]
        tracer_provider: Some(tracer_provider),
        #[cfg(feature = "metrics")]
        meter_provider: Some(meter_provider),
    })
}

#[cfg(any(feature = "metrics", feature = "otel-trace"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name(SERVICE_NAME)
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
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        use opentelemetry_stdout::MetricExporter;
        let exporter = MetricExporter::default();
        let reader = sdkmetrics::PeriodicReader::builder(exporter)
            .with_interval(std::time::Duration::from_secs(5))
            .build();

        builder.with_reader(reader)
    };

    builder.build()
}

#[cfg(feature = "otel-trace")]
fn init_tracer() -> sdktrace::SdkTracerProvider {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        use opentelemetry_stdout::SpanExporter;
        let batch = sdktrace::BatchSpanProcessor::builder(SpanExporter::default())
            .with_batch_config(
                sdktrace::BatchConfigBuilder::default()
                    .with_scheduled_delay(std::time::Duration::from_secs(5))
                    .with_max_queue_size(2048)
                    .build(),
            )
            .build();
        builder.with_span_processor(batch)
    };

    builder.build()
}

#[cfg(feature = "metrics")]
static SUBMISSIONS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static VALIDATION_FAILURES: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static STATUS_UPDATES: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static EXPORTS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static REMINDERS_SENT: OnceLock<Counter<u64>> = OnceLock::new();

#[cfg(feature = "metrics")]
fn init_metric_handles(meter: &Meter) {
    let _ = SUBMISSIONS.set(
        meter
            .u64_counter("submissions")
            .with_description("Service requests accepted and assigned a token")
            .build(),
    );

    let _ = VALIDATION_FAILURES.set(
        meter
            .u64_counter("validation_failures")
            .with_description("Submissions rejected for missing or invalid fields")
            .build(),
    );

    let _ = STATUS_UPDATES.set(
        meter
            .u64_counter("status_updates")
            .with_description("Admin status changes")
            .build(),
    );

    let _ = EXPORTS.set(
        meter
            .u64_counter("exports")
            .with_description("Record exports, by format")
            .build(),
    );

    let _ = REMINDERS_SENT.set(
        meter
            .u64_counter("reminders_sent")
            .with_description("Upcoming-turn reminders delivered")
            .build(),
    );
}

// No-ops when metrics are disabled.
#[cfg(feature = "metrics")]
pub fn increment_submissions() {
    if let Some(counter) = SUBMISSIONS.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_submissions() {}

#[cfg(feature = "metrics")]
pub fn increment_validation_failures() {
    if let Some(counter) = VALIDATION_FAILURES.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_validation_failures() {}

#[cfg(feature = "metrics")]
pub fn increment_status_updates() {
    if let Some(counter) = STATUS_UPDATES.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_status_updates() {}

#[cfg(feature = "metrics")]
pub fn increment_exports(format: &'static str) {
    if let Some(counter) = EXPORTS.get() {
        counter.add(1, &[KeyValue::new("format", format)]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_exports(_format: &'static str) {}

#[cfg(feature = "metrics")]
pub fn increment_reminders_sent() {
    if let Some(counter) = REMINDERS_SENT.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_reminders_sent() {}
