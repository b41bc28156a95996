//! Custom tracing layers for the Skein mesh

use tracing::{Subscriber, span};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::format::{Format, Json, JsonFields};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use crate::config::JsonlConfig;
use crate::context::{PeerContextData, PeerContextGuard};

/// Layer that attaches the active peer context to new spans
///
/// Spans opened while a [`PeerContextGuard`] is active keep a
/// [`PeerContextExtension`], so the peer stays known even when the span is
/// later entered on a thread without a guard.
#[derive(Debug, Default)]
pub struct PeerContextLayer;

impl PeerContextLayer {
    /// Create a new peer context layer
    pub fn new() -> Self {
        Self
    }
}

/// Extension data stored on spans
#[derive(Debug, Clone)]
pub struct PeerContextExtension {
    pub data: PeerContextData,
}

impl<S> Layer<S> for PeerContextLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, _attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let inherited = span
            .parent()
            .and_then(|parent| parent.extensions().get::<PeerContextExtension>().cloned());
        let extension = PeerContextGuard::current()
            .map(|data| PeerContextExtension { data })
            .or(inherited);
        if let Some(extension) = extension {
            span.extensions_mut().insert(extension);
        }
    }
}

/// Create a JSONL formatting layer
///
/// Used for both JSONL console output and file output.
pub fn jsonl_layer<S, W>(
    writer: W,
    config: &JsonlConfig,
) -> tracing_subscriber::fmt::Layer<S, JsonFields, Format<Json>, W>
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    W: for<'writer> MakeWriter<'writer> + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(config.include_spans)
        .flatten_event(config.flatten_events)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_thread_ids(config.include_thread_info)
        .with_thread_names(config.include_thread_info)
        .with_writer(writer)
}
