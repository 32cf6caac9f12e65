//! Single-threaded change notifications with cancellable subscriptions.

/// Token returned by [`Signal::connect`]; pass it back to
/// [`Signal::disconnect`] to cancel the subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

/// An observer list. Every connected callback is invoked exactly once per
/// `emit`, in connection order.
pub struct Signal<T = ()> {
    slots: Vec<(u64, Box<dyn FnMut(&T)>)>,
    next_id: u64,
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            next_id: 0,
        }
    }

    /// Registers a callback and returns the token that cancels it.
    pub fn connect(&mut self, callback: impl FnMut(&T) + 'static) -> Subscription {
        let id = self.next_id;
        self.next_id += 1;
        self.slots.push((id, Box::new(callback)));
        Subscription(id)
    }

    /// Removes a subscription. Returns `false` if it was already gone.
    pub fn disconnect(&mut self, subscription: Subscription) -> bool {
        let before = self.slots.len();
        self.slots.retain(|(id, _)| *id != subscription.0);
        self.slots.len() != before
    }

    /// Delivers `value` to every connected subscriber.
    pub fn emit(&mut self, value: &T) {
        for (_, callback) in &mut self.slots {
            callback(value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn emit_reaches_every_subscriber_once() {
        let mut signal = Signal::<u32>::new();
        let first = Rc::new(Cell::new(0));
        let second = Rc::new(Cell::new(0));

        let a = first.clone();
        signal.connect(move |v| a.set(a.get() + v));
        let b = second.clone();
        signal.connect(move |v| b.set(b.get() + v));

        signal.emit(&3);
        assert_eq!(first.get(), 3);
        assert_eq!(second.get(), 3);

        signal.emit(&4);
        assert_eq!(first.get(), 7);
        assert_eq!(second.get(), 7);
    }

    #[test]
    fn disconnect_cancels_delivery() {
        let mut signal = Signal::<()>::new();
        let hits = Rc::new(Cell::new(0u32));

        let h = hits.clone();
        let subscription = signal.connect(move |_| h.set(h.get() + 1));

        signal.emit(&());
        assert_eq!(hits.get(), 1);

        assert!(signal.disconnect(subscription));
        signal.emit(&());
        assert_eq!(hits.get(), 1);

        // Second disconnect is a no-op.
        assert!(!signal.disconnect(subscription));
    }

    #[test]
    fn subscriptions_are_independent() {
        let mut signal = Signal::<()>::new();
        let hits = Rc::new(Cell::new(0u32));

        let h = hits.clone();
        let first = signal.connect(move |_| h.set(h.get() + 1));
        let h = hits.clone();
        let _second = signal.connect(move |_| h.set(h.get() + 10));

        signal.disconnect(first);
        signal.emit(&());
        assert_eq!(hits.get(), 10);
    }
}
