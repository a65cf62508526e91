use crate::metadata::CallbackMetadata;
use crate::notifier::{Notifier, NotifyOutcome};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

#[derive(Clone, Default)]
pub struct ErrorCount(Arc<AtomicUsize>);

impl ErrorCount {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl<S: Subscriber> Layer<S> for ErrorCount {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::ERROR {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Counts error events emitted on the current thread while the guard lives.
pub fn capture_error_logs() -> (ErrorCount, DefaultGuard) {
    let errors = ErrorCount::default();
    let subscriber = tracing_subscriber::registry().with(errors.clone());
    (errors, tracing::subscriber::set_default(subscriber))
}

/// Records every notification instead of sending it.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<CallbackMetadata>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, metadata: &CallbackMetadata) -> NotifyOutcome {
        self.sent.lock().push(metadata.clone());
        NotifyOutcome::Delivered { status: 200 }
    }
}
