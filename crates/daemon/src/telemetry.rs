//! Telemetry setup for OpenTelemetry integration

use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// Boxed layer slotted into the subscriber stack
pub type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// OpenTelemetry layer, if configured
///
/// Runs before the subscriber is installed, so problems go to stderr.
///
/// # Environment Variables
///
/// - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (e.g., http://localhost:4317)
/// - `OTEL_SERVICE_NAME`: Service name (default: waitlist)
///
/// # Example
///
/// ```text
/// OTEL_EXPORTER_OTLP_ENDPOINT=http://localhost:4317 \
/// OTEL_SERVICE_NAME=waitlist-dev \
///     ./waitlist
/// ```
pub fn otel_layer<S>() -> Option<BoxedLayer<S>>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;

    #[cfg(feature = "telemetry")]
    {
        match build_layer(&endpoint) {
            Ok(layer) => Some(layer),
            Err(e) => {
                eprintln!("Failed to initialize OpenTelemetry (continuing without it): {e}");
                None
            }
        }
    }

    #[cfg(not(feature = "telemetry"))]
    {
        eprintln!(
            "OTEL_EXPORTER_OTLP_ENDPOINT={endpoint} set but feature 'telemetry' not enabled \
             (rebuild with: cargo build --features telemetry)"
        );
        None
    }
}

#[cfg(feature = "telemetry")]
fn build_layer<S>(endpoint: &str) -> anyhow::Result<BoxedLayer<S>>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_otlp::{SpanExporter, WithExportConfig};
    use opentelemetry_sdk::{runtime, trace::TracerProvider};

    let service_name =
        std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "waitlist".to_string());

    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;
    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .build();
    let tracer = provider.tracer(service_name);
    opentelemetry::global::set_tracer_provider(provider);

    Ok(Box::new(tracing_opentelemetry::layer().with_tracer(tracer)))
}

/// Flush pending spans on shutdown
pub fn shutdown() {
    #[cfg(feature = "telemetry")]
    opentelemetry::global::shutdown_tracer_provider();
}
