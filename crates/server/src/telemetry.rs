use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,tower_http=info";

/// Bunyan JSON to stdout; `LOG_FORMAT=pretty` switches to human-readable lines.
pub fn init(service_name: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f == "pretty") {
        registry.with(tracing_subscriber::fmt::layer()).init();
    } else {
        registry
            .with(JsonStorageLayer)
            .with(BunyanFormattingLayer::new(service_name.to_string(), std::io::stdout))
            .init();
    }
}
