//! Registry of attached module screens that display the UART text.

use tracing::debug;

/// Receives the RX cache text whenever it changes
pub trait UartTextListener {
    fn set_uart_text(&mut self, text: &str);
}

impl<F: FnMut(&str)> UartTextListener for F {
    fn set_uart_text(&mut self, text: &str) {
        self(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

#[derive(Default)]
pub struct ListenerRegistry {
    next_id: u64,
    listeners: Vec<(ListenerHandle, Box<dyn UartTextListener>)>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, listener: Box<dyn UartTextListener>) -> ListenerHandle {
        let handle = ListenerHandle(self.next_id);
        self.next_id += 1;
        self.listeners.push((handle, listener));
        debug!("Attached listener {:?} ({} total)", handle, self.listeners.len());
        handle
    }

    /// Returns false when `handle` was not attached
    pub fn remove(&mut self, handle: ListenerHandle) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(h, _)| *h != handle);
        self.listeners.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn broadcast(&mut self, text: &str) {
        for (_, listener) in self.listeners.iter_mut() {
            listener.set_uart_text(text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_add_remove_broadcast() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut registry = ListenerRegistry::new();

        let sink = seen.clone();
        let first = registry.add(Box::new(move |text: &str| {
            sink.borrow_mut().push(format!("first:{}", text))
        }));
        let sink = seen.clone();
        let second = registry.add(Box::new(move |text: &str| {
            sink.borrow_mut().push(format!("second:{}", text))
        }));
        assert_ne!(first, second);

        registry.broadcast("hi");
        assert!(registry.remove(first));
        assert!(!registry.remove(first));
        registry.broadcast("bye");

        assert_eq!(
            *seen.borrow(),
            vec!["first:hi", "second:hi", "second:bye"]
        );
        assert_eq!(registry.len(), 1);
        assert!(registry.remove(second));
        assert!(registry.is_empty());
    }
}
