//! Listener management.
//!
//! This module provides listener IDs and a manager for tracking the
//! callbacks registered for one kind of notification.

use hashbrown::HashMap;
use std::rc::Rc;

/// Unique identifier for a listener.
pub type ListenerId = u64;

/// A registered callback.
pub struct Listener<T> {
    /// Unique identifier
    id: ListenerId,
    /// Callback to invoke on notification
    callback: Rc<dyn Fn(&T)>,
}

impl<T> Listener<T> {
    /// Creates a new listener.
    pub fn new<F>(id: ListenerId, callback: F) -> Self
    where
        F: Fn(&T) + 'static,
    {
        Self {
            id,
            callback: Rc::new(callback),
        }
    }

    /// Returns the listener ID.
    #[inline]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Returns a shared handle to the callback.
    pub fn callback(&self) -> Rc<dyn Fn(&T)> {
        self.callback.clone()
    }
}

/// Manages listeners for one notification payload type.
///
/// Notification clones the callbacks out first, so a callback may register
/// or remove listeners on the manager that notified it once the caller has
/// released its borrow.
pub struct SubscriptionManager<T> {
    /// Active listeners
    listeners: HashMap<ListenerId, Listener<T>>,
    /// Next listener ID to assign
    next_id: ListenerId,
}

impl<T> Default for SubscriptionManager<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SubscriptionManager<T> {
    /// Creates a new manager.
    pub fn new() -> Self {
        Self {
            listeners: HashMap::new(),
            next_id: 1,
        }
    }

    /// Registers a callback and returns its ID.
    pub fn subscribe<F>(&mut self, callback: F) -> ListenerId
    where
        F: Fn(&T) + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners.insert(id, Listener::new(id, callback));
        id
    }

    /// Removes a listener.
    ///
    /// Returns true if the listener was found and removed.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    /// Returns the callback of one listener.
    pub fn callback(&self, id: ListenerId) -> Option<Rc<dyn Fn(&T)>> {
        self.listeners.get(&id).map(Listener::callback)
    }

    /// Returns every callback in registration order.
    pub fn callbacks(&self) -> Vec<Rc<dyn Fn(&T)>> {
        let mut listeners: Vec<_> = self.listeners.values().collect();
        listeners.sort_by_key(|l| l.id());
        listeners.into_iter().map(Listener::callback).collect()
    }

    /// Invokes every callback in registration order.
    pub fn notify_all(&self, payload: &T) {
        for callback in self.callbacks() {
            callback(payload);
        }
    }

    /// Returns the number of listeners.
    #[inline]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Returns true if there are no listeners.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Removes every listener.
    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_subscribe_unsubscribe() {
        let mut manager: SubscriptionManager<u32> = SubscriptionManager::new();
        let id1 = manager.subscribe(|_| {});
        let id2 = manager.subscribe(|_| {});
        assert_ne!(id1, id2);
        assert_eq!(manager.len(), 2);
        assert!(manager.unsubscribe(id1));
        assert!(!manager.unsubscribe(id1));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_notify_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut manager = SubscriptionManager::new();
        for tag in 0..5u32 {
            let log = log.clone();
            manager.subscribe(move |n: &u32| log.borrow_mut().push(tag * 10 + n));
        }
        manager.notify_all(&1);
        assert_eq!(*log.borrow(), vec![1, 11, 21, 31, 41]);
    }

    #[test]
    fn test_callback_lookup() {
        let hits = Rc::new(RefCell::new(0));
        let mut manager = SubscriptionManager::new();
        let counter = hits.clone();
        let id = manager.subscribe(move |_: &()| *counter.borrow_mut() += 1);
        manager.callback(id).unwrap()(&());
        assert_eq!(*hits.borrow(), 1);
        assert!(manager.callback(id + 1).is_none());
        manager.clear();
        assert!(manager.is_empty());
    }
}
