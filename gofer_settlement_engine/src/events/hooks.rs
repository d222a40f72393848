use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    EventHandler,
    EventProducer,
    Handler,
    OrderLockedEvent,
    OrderReassignedEvent,
    OrderRefundedEvent,
    PaymentOrderCancelledEvent,
    PaymentOrderPaidEvent,
    WithdrawalFailedEvent,
};

/// The producer side of every event channel. Cloned into each API object; publishing on a producer with no
/// subscribers is a silent no-op.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_paid_producer: Vec<EventProducer<PaymentOrderPaidEvent>>,
    pub order_cancelled_producer: Vec<EventProducer<PaymentOrderCancelledEvent>>,
    pub order_refunded_producer: Vec<EventProducer<OrderRefundedEvent>>,
    pub order_locked_producer: Vec<EventProducer<OrderLockedEvent>>,
    pub order_reassigned_producer: Vec<EventProducer<OrderReassignedEvent>>,
    pub withdrawal_failed_producer: Vec<EventProducer<WithdrawalFailedEvent>>,
}

pub struct EventHandlers {
    pub on_order_paid: Option<EventHandler<PaymentOrderPaidEvent>>,
    pub on_order_cancelled: Option<EventHandler<PaymentOrderCancelledEvent>>,
    pub on_order_refunded: Option<EventHandler<OrderRefundedEvent>>,
    pub on_order_locked: Option<EventHandler<OrderLockedEvent>>,
    pub on_order_reassigned: Option<EventHandler<OrderReassignedEvent>>,
    pub on_withdrawal_failed: Option<EventHandler<WithdrawalFailedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        Self {
            on_order_paid: hooks.on_order_paid.map(|f| EventHandler::new(buffer_size, f)),
            on_order_cancelled: hooks.on_order_cancelled.map(|f| EventHandler::new(buffer_size, f)),
            on_order_refunded: hooks.on_order_refunded.map(|f| EventHandler::new(buffer_size, f)),
            on_order_locked: hooks.on_order_locked.map(|f| EventHandler::new(buffer_size, f)),
            on_order_reassigned: hooks.on_order_reassigned.map(|f| EventHandler::new(buffer_size, f)),
            on_withdrawal_failed: hooks.on_withdrawal_failed.map(|f| EventHandler::new(buffer_size, f)),
        }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_paid {
            result.order_paid_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_cancelled {
            result.order_cancelled_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_refunded {
            result.order_refunded_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_locked {
            result.order_locked_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_reassigned {
            result.order_reassigned_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_withdrawal_failed {
            result.withdrawal_failed_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_paid {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_order_cancelled {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_order_refunded {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_order_locked {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_order_reassigned {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_withdrawal_failed {
            tokio::spawn(handler.start_handler());
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_paid: Option<Handler<PaymentOrderPaidEvent>>,
    pub on_order_cancelled: Option<Handler<PaymentOrderCancelledEvent>>,
    pub on_order_refunded: Option<Handler<OrderRefundedEvent>>,
    pub on_order_locked: Option<Handler<OrderLockedEvent>>,
    pub on_order_reassigned: Option<Handler<OrderReassignedEvent>>,
    pub on_withdrawal_failed: Option<Handler<WithdrawalFailedEvent>>,
}

impl EventHooks {
    pub fn on_order_paid<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentOrderPaidEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_paid = Some(Arc::new(f));
        self
    }

    pub fn on_order_cancelled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentOrderCancelledEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static
    {
        self.on_order_cancelled = Some(Arc::new(f));
        self
    }

    pub fn on_order_refunded<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderRefundedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_refunded = Some(Arc::new(f));
        self
    }

    pub fn on_order_locked<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderLockedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_locked = Some(Arc::new(f));
        self
    }

    pub fn on_order_reassigned<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderReassignedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_reassigned = Some(Arc::new(f));
        self
    }

    pub fn on_withdrawal_failed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(WithdrawalFailedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_withdrawal_failed = Some(Arc::new(f));
        self
    }
}
