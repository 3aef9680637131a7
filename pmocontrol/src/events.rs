use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::{Mutex, RwLock};
use tracing::warn;

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Event fan-out: synchronous handlers plus channel subscribers.
///
/// Events are emitted without any lock of the emitter held. A panicking
/// handler is logged and does not prevent delivery to the others.
pub struct EventBus<E> {
    name: &'static str,
    handlers: RwLock<Vec<Handler<E>>>,
    subscribers: Mutex<Vec<Sender<E>>>,
}

impl<E: Clone + Send + 'static> EventBus<E> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handlers: RwLock::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn add_handler(&self, handler: impl Fn(&E) + Send + Sync + 'static) {
        self.handlers.write().push(Arc::new(handler));
    }

    pub fn subscribe(&self) -> Receiver<E> {
        let (tx, rx) = unbounded::<E>();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn emit(&self, event: E) {
        let handlers = self.handlers.read().clone();
        for handler in handlers {
            if panic::catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                warn!("⚠️ {} event handler panicked", self.name);
            }
        }

        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_panicking_handler_does_not_stop_delivery() {
        let bus = EventBus::<u32>::new("test");
        let seen = Arc::new(AtomicUsize::new(0));
        bus.add_handler(|_| panic!("boom"));
        let counter = seen.clone();
        bus.add_handler(move |v| {
            counter.fetch_add(*v as usize, Ordering::SeqCst);
        });
        let rx = bus.subscribe();

        bus.emit(3);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert_eq!(rx.try_recv().unwrap(), 3);
    }

    #[test]
    fn test_dropped_subscriber_is_removed() {
        let bus = EventBus::<u32>::new("test");
        drop(bus.subscribe());
        bus.emit(1);
        assert!(bus.subscribers.lock().is_empty());
    }
}
