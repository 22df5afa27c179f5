//! Mirrors diagnostic output to a remote log sink.
//!
//! The host's diagnostic channel is `tracing`. [`RelayLayer`] sits beside the
//! host's own formatting layer, so what the host prints is unchanged; once the
//! relay is installed every event is also queued for delivery as
//! `{level, message, timestamp}` JSON to the sink.
//!
//! Delivery runs on a background task and never blocks or fails the caller.
//! Delivery failures are logged under [`RELAY_TARGET`], which the layer never
//! forwards, so a broken sink cannot feed back into itself.

use std::fmt::{self, Write as _};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::host::HttpClient;

/// Target for the relay's own diagnostics. Events with exactly this target are never relayed.
pub const RELAY_TARGET: &str = "tincture_boot::relay";

/// Targets whose events would be produced by the delivery itself.
const TRANSPORT_TARGETS: &[&str] = &["hyper", "reqwest", "h2", "rustls", "want", "mio"];

/// Wire format POSTed to the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRecord {
    pub level: String,
    pub message: String,
    /// ISO-8601, UTC.
    pub timestamp: String,
}

impl LogRecord {
    /// Record stamped with the current time.
    pub fn now(level: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            message: message.into(),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        }
    }
}

struct RelayInner {
    installed: AtomicBool,
    sender: Mutex<Option<mpsc::UnboundedSender<LogRecord>>>,
}

/// Owner of the relay's installation state.
///
/// Construct one per process, register [`DiagnosticsRelay::layer`] with the
/// subscriber, and pass the relay to the orchestrator. Installing more than
/// once is a no-op.
#[derive(Clone)]
pub struct DiagnosticsRelay {
    inner: Arc<RelayInner>,
}

impl DiagnosticsRelay {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RelayInner {
                installed: AtomicBool::new(false),
                sender: Mutex::new(None),
            }),
        }
    }

    /// Subscriber layer feeding this relay. Inert until installed.
    pub fn layer(&self) -> RelayLayer {
        RelayLayer {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn is_installed(&self) -> bool {
        self.inner.installed.load(Ordering::SeqCst)
    }

    /// Start forwarding events to `endpoint`.
    ///
    /// Returns the delivery task on first installation and `None` afterwards.
    /// Must be called from within a Tokio runtime.
    pub fn install(
        &self,
        http: Arc<dyn HttpClient>,
        endpoint: impl Into<String>,
    ) -> Option<JoinHandle<()>> {
        if self.inner.installed.swap(true, Ordering::SeqCst) {
            tracing::debug!(target: RELAY_TARGET, "Diagnostics relay already installed");
            return None;
        }

        let endpoint = endpoint.into();
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inner.sender.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);

        tracing::debug!(target: RELAY_TARGET, "Diagnostics relay forwarding to {}", endpoint);
        Some(tokio::spawn(deliver(rx, http, endpoint)))
    }

    /// Stop queueing new events. The delivery task drains what is queued and exits.
    pub fn detach(&self) {
        self.inner
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
    }
}

impl Default for DiagnosticsRelay {
    fn default() -> Self {
        Self::new()
    }
}

async fn deliver(
    mut rx: mpsc::UnboundedReceiver<LogRecord>,
    http: Arc<dyn HttpClient>,
    endpoint: String,
) {
    while let Some(record) = rx.recv().await {
        let body = match serde_json::to_value(&record) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(target: RELAY_TARGET, "Failed to encode log record: {}", e);
                continue;
            }
        };
        if let Err(e) = http.post_json(&endpoint, &body).await {
            tracing::error!(target: RELAY_TARGET, "Failed to send log to backend: {}", e);
        }
    }
}

/// `tracing` layer that queues events for the relay.
pub struct RelayLayer {
    inner: Arc<RelayInner>,
}

impl<S: Subscriber> Layer<S> for RelayLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if !is_relayed_target(metadata.target()) {
            return;
        }

        let guard = self.inner.sender.lock().unwrap_or_else(|e| e.into_inner());
        let Some(sender) = guard.as_ref() else {
            return;
        };

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let _ = sender.send(LogRecord::now(level_name(metadata.level()), visitor.finish()));
    }
}

fn is_relayed_target(target: &str) -> bool {
    target != RELAY_TARGET
        && !TRANSPORT_TARGETS
            .iter()
            .any(|t| target == *t || target.starts_with(&format!("{t}::")))
}

fn level_name(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "error",
        Level::WARN => "warn",
        Level::INFO => "info",
        Level::DEBUG => "debug",
        Level::TRACE => "trace",
    }
}

/// Renders an event as one line: the message, then `name=value` per field.
///
/// String fields are written as-is; everything else uses its `Debug` form.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields,
            (false, false) => format!("{} {}", self.message, self.fields),
        }
    }

    fn push_field(&mut self, name: &str, value: fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{}={}", name, value);
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.push_field(field.name(), format_args!("{}", value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            self.push_field(field.name(), format_args!("{:?}", value));
        }
    }
}
