//! User notification delivery.
//!
//! Delivery mechanics (push, SMS, in-app) live outside this system; the server's job ends at handing a message to a
//! [`Notifier`]. Notifiers are wired into the engine's event hooks, so they run on the event handler's own tasks:
//! fire-and-forget, failures logged, never blocking a settlement transition.
use std::{future::Future, pin::Pin, sync::Arc};

use gofer_settlement_engine::events::EventHooks;
use log::info;

pub trait Notifier: Send + Sync {
    fn send(&self, user: &str, message: &str, category: &str);
}

/// The default notifier: writes the notification to the log. Stands in for the real delivery collaborator.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, user: &str, message: &str, category: &str) {
        info!("🔔️ [{category}] → {user}: {message}");
    }
}

fn boxed<F>(f: F) -> Pin<Box<dyn Future<Output = ()> + Send>>
where F: Future<Output = ()> + Send + 'static {
    Box::pin(f)
}

/// Builds the event hooks that turn settlement events into notifications.
pub fn notification_hooks(notifier: Arc<dyn Notifier>) -> EventHooks {
    let mut hooks = EventHooks::default();
    let n = Arc::clone(&notifier);
    hooks.on_order_paid(move |ev| {
        let n = Arc::clone(&n);
        boxed(async move {
            let message =
                format!("Payment of {} for order {} is confirmed", ev.payment.amount, ev.business.order_number);
            n.send(&ev.business.requester_id, &message, "payment");
            if let Some(agent) = &ev.business.agent_id {
                n.send(agent, &format!("Order {} is paid and ready", ev.business.order_number), "payment");
            }
        })
    });
    let n = Arc::clone(&notifier);
    hooks.on_order_cancelled(move |ev| {
        let n = Arc::clone(&n);
        boxed(async move {
            if let Some(business) = &ev.business {
                let message = format!("Order {} was cancelled without payment", business.order_number);
                n.send(&business.requester_id, &message, "cancellation");
            }
        })
    });
    let n = Arc::clone(&notifier);
    hooks.on_order_refunded(move |ev| {
        let n = Arc::clone(&n);
        boxed(async move {
            let message = format!("Order {} was refunded ({})", ev.order.order_number, ev.amount);
            n.send(&ev.order.requester_id, &message, "refund");
            if let Some(agent) = &ev.order.agent_id {
                n.send(agent, &message, "refund");
            }
        })
    });
    let n = Arc::clone(&notifier);
    hooks.on_order_locked(move |ev| {
        let n = Arc::clone(&n);
        boxed(async move {
            let message = format!("Order {} needs attention: {}", ev.order.order_number, ev.reason);
            n.send(&ev.order.requester_id, &message, "locked");
            if let Some(agent) = &ev.order.agent_id {
                n.send(agent, &message, "locked");
            }
        })
    });
    let n = Arc::clone(&notifier);
    hooks.on_order_reassigned(move |ev| {
        let n = Arc::clone(&n);
        boxed(async move {
            let message = format!("Order {} timed out and is available to couriers again", ev.order.order_number);
            n.send(&ev.order.requester_id, &message, "reassignment");
            if let Some(agent) = &ev.previous_agent {
                n.send(agent, &format!("Order {} was taken back", ev.order.order_number), "reassignment");
            }
        })
    });
    let n = Arc::clone(&notifier);
    hooks.on_withdrawal_failed(move |ev| {
        let n = Arc::clone(&n);
        boxed(async move {
            let message = format!("Your withdrawal of {} failed and was returned to your wallet: {}", ev.amount,
                ev.reason);
            n.send(&ev.actor_id, &message, "withdrawal");
        })
    });
    hooks
}
