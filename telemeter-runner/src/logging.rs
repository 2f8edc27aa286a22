//! Logging setup
//!
//! Two sinks share one registry: the console, filtered by `RUST_LOG`, and
//! the in-memory collector that feeds shipped logs. The collector has its
//! own fixed filter, so quieting the console never empties the logs sent
//! with a failed step.

use tracing::{Level, Subscriber};
use tracing_subscriber::filter::{EnvFilter, Targets};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{Layer, layer::SubscriberExt};

use crate::service::{CollectorLayer, LogCollector, MaskingMakeWriter, SecretRegistry};

/// Console filter used when `RUST_LOG` is unset
pub const DEFAULT_CONSOLE_DIRECTIVES: &str =
    concat!(env!("CARGO_CRATE_NAME"), "=info,telemeter_client=info");

/// Console filter from `RUST_LOG`, falling back to the defaults
pub fn console_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_CONSOLE_DIRECTIVES))
}

/// Events captured for shipping, whatever the console shows
pub fn collector_filter() -> Targets {
    Targets::new()
        .with_target(env!("CARGO_CRATE_NAME"), Level::INFO)
        .with_target("telemeter_client", Level::INFO)
}

/// Builds the subscriber used by the binary
///
/// Console output goes through `console`, masked; every event passing
/// [`collector_filter`] is appended to `collector`.
pub fn subscriber<W, C>(
    console: W,
    console_filter: EnvFilter,
    collector: C,
    secrets: SecretRegistry,
) -> impl Subscriber + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    C: LogCollector + 'static,
{
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(MaskingMakeWriter::new(console, secrets.clone()))
                .with_filter(console_filter),
        )
        .with(CollectorLayer::new(collector, secrets).with_filter(collector_filter()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::InMemoryLogCollector;
    use tracing::{debug, info, warn};

    #[test]
    fn test_crate_events_reach_collector() {
        let collector = InMemoryLogCollector::new();
        let subscriber = subscriber(
            std::io::sink,
            EnvFilter::new(DEFAULT_CONSOLE_DIRECTIVES),
            collector.clone(),
            SecretRegistry::new(),
        );

        tracing::subscriber::with_default(subscriber, || {
            info!("hello-from-step");
            warn!(stream = "stderr", "oops");
            debug!("not shipped");
        });

        let messages = collector.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].message, "hello-from-step");
        assert_eq!(messages[1].message, "oops");
    }

    #[test]
    fn test_silent_console_still_collects() {
        let collector = InMemoryLogCollector::new();
        let subscriber = subscriber(
            std::io::sink,
            EnvFilter::new("off"),
            collector.clone(),
            SecretRegistry::new(),
        );

        tracing::subscriber::with_default(subscriber, || {
            info!("still collected");
        });

        assert_eq!(collector.len(), 1);
    }

    #[test]
    fn test_default_directives_name_this_crate() {
        assert!(DEFAULT_CONSOLE_DIRECTIVES.starts_with(env!("CARGO_CRATE_NAME")));
        assert_eq!(env!("CARGO_CRATE_NAME"), "telemeter");
    }
}
