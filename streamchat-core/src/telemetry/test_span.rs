use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::span;
use tracing::subscriber::DefaultGuard;
use tracing::Subscriber;
use tracing_core::field::{Field, Visit};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::{LookupSpan, Registry};
use tracing_subscriber::Layer;

/// Name and stringified fields of one span seen by [`CaptureLayer`].
#[derive(Debug, Clone, Default)]
pub struct SpanData {
    pub name: String,
    pub fields: HashMap<String, String>,
}

#[derive(Debug, Default)]
pub struct SpanStore {
    pub spans: Mutex<Vec<SpanData>>,
}

impl SpanStore {
    pub fn named(&self, name: &str) -> Vec<SpanData> {
        self.spans
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.name == name)
            .cloned()
            .collect()
    }
}

struct FieldMap<'a>(&'a mut HashMap<String, String>);

impl Visit for FieldMap<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }
}

#[derive(Clone)]
pub struct CaptureLayer {
    store: Arc<SpanStore>,
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, _id: &span::Id, _ctx: Context<'_, S>) {
        let mut data = SpanData {
            name: attrs.metadata().name().to_string(),
            ..Default::default()
        };
        attrs.record(&mut FieldMap(&mut data.fields));
        self.store.spans.lock().unwrap().push(data);
    }
}

/// Capture spans created on this thread until the guard is dropped.
pub fn install_capture() -> (Arc<SpanStore>, DefaultGuard) {
    use tracing_subscriber::prelude::*;
    let store = Arc::new(SpanStore::default());
    let subscriber = Registry::default().with(CaptureLayer {
        store: store.clone(),
    });
    (store, tracing::subscriber::set_default(subscriber))
}
