//! Canvas-scoped toast notifications.
//!
//! Every toast carries the id of the canvas it originated from, and subscribers only receive the
//! toasts of the canvas they subscribed to, so two open canvases never cross-post warnings.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastSeverity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Toast {
    pub severity: ToastSeverity,
    pub title: String,
    pub description: String,
    pub target_id: String,
}

type Subscribers = Vec<(String, UnboundedSender<Toast>)>;

#[derive(Debug, Clone, Default)]
pub struct ToastBus(Arc<Mutex<Subscribers>>);

impl ToastBus {
    pub fn new() -> Self {
        ToastBus::default()
    }

    /// Receive every toast published for `target_id` from now on. Dropping the receiver
    /// unsubscribes.
    pub fn subscribe(&self, target_id: &str) -> UnboundedReceiver<Toast> {
        let (tx, rx) = unbounded_channel();
        self.0.lock().push((target_id.to_string(), tx));
        rx
    }

    /// Deliver a toast to the subscribers of its target. Returns how many received it.
    pub fn publish(&self, toast: Toast) -> usize {
        match toast.severity {
            ToastSeverity::Error => tracing::error!(
                "[toast:{}] {}: {}",
                toast.target_id,
                toast.title,
                toast.description
            ),
            ToastSeverity::Warning => tracing::warn!(
                "[toast:{}] {}: {}",
                toast.target_id,
                toast.title,
                toast.description
            ),
            ToastSeverity::Info => tracing::info!(
                "[toast:{}] {}: {}",
                toast.target_id,
                toast.title,
                toast.description
            ),
        }
        let mut subscribers = self.0.lock();
        subscribers.retain(|(_, tx)| !tx.is_closed());
        let mut delivered = 0;
        for (target, tx) in subscribers.iter() {
            if *target == toast.target_id && tx.send(toast.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    pub fn warn(&self, target_id: &str, title: &str, description: &str) -> usize {
        self.publish(Toast {
            severity: ToastSeverity::Warning,
            title: title.to_string(),
            description: description.to_string(),
            target_id: target_id.to_string(),
        })
    }

    pub fn error(&self, target_id: &str, title: &str, description: &str) -> usize {
        self.publish(Toast {
            severity: ToastSeverity::Error,
            title: title.to_string(),
            description: description.to_string(),
            target_id: target_id.to_string(),
        })
    }
}

/// Drain every toast currently queued on a receiver.
pub fn drain(rx: &mut UnboundedReceiver<Toast>) -> Vec<Toast> {
    let mut toasts = Vec::new();
    while let Ok(toast) = rx.try_recv() {
        toasts.push(toast);
    }
    toasts
}
