//! Cold observable streams.
//!
//! An `Observable` runs its producer once per subscription. Values arrive as
//! `Result<T>`; an `Err` terminates the stream. Dropping or unsubscribing the
//! returned `Subscription` runs the producer's teardown.

use lumen_core::{Error, Result};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Cleanup run when a subscription ends.
pub type Teardown = Box<dyn FnOnce()>;

type Producer<T> = Rc<dyn Fn(Sink<T>) -> Teardown>;

/// The emitting side handed to a producer.
pub struct Sink<T> {
    callback: Rc<dyn Fn(Result<T>)>,
    closed: Rc<Cell<bool>>,
}

impl<T> Clone for Sink<T> {
    fn clone(&self) -> Self {
        Self {
            callback: self.callback.clone(),
            closed: self.closed.clone(),
        }
    }
}

impl<T> Sink<T> {
    /// Emits a value unless the subscription has ended.
    pub fn next(&self, value: T) {
        if !self.closed.get() {
            (self.callback)(Ok(value));
        }
    }

    /// Emits an error and ends the subscription.
    pub fn error(&self, error: Error) {
        if !self.closed.replace(true) {
            (self.callback)(Err(error));
        }
    }

    /// Emits a result.
    pub fn emit(&self, result: Result<T>) {
        match result {
            Ok(value) => self.next(value),
            Err(error) => self.error(error),
        }
    }

    /// Whether the subscription has ended.
    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

/// Handle of an active subscription.
///
/// Ending the subscription, explicitly or by drop, stops delivery and runs
/// the teardown once.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    closed: Rc<Cell<bool>>,
    teardown: RefCell<Option<Teardown>>,
}

impl Subscription {
    /// Ends the subscription.
    pub fn unsubscribe(&self) {
        self.closed.set(true);
        let teardown = self.teardown.borrow_mut().take();
        if let Some(teardown) = teardown {
            teardown();
        }
    }

    /// Whether the subscription has ended, by unsubscribe or by error.
    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// A cold stream of results.
pub struct Observable<T> {
    producer: Producer<T>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            producer: self.producer.clone(),
        }
    }
}

impl<T: 'static> Observable<T> {
    /// Creates an observable from a producer. The producer is called once per
    /// subscription and returns the teardown for it.
    pub fn new<F>(producer: F) -> Self
    where
        F: Fn(Sink<T>) -> Teardown + 'static,
    {
        Self {
            producer: Rc::new(producer),
        }
    }

    /// An observable that emits one error.
    pub fn failed(error: Error) -> Self {
        Self::new(move |sink| {
            sink.error(error.clone());
            Box::new(|| {})
        })
    }

    /// Subscribes with a callback.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Result<T>) + 'static,
    {
        let closed = Rc::new(Cell::new(false));
        let sink = Sink {
            callback: Rc::new(callback),
            closed: closed.clone(),
        };
        let teardown = (self.producer)(sink);
        let subscription = Subscription {
            closed,
            teardown: RefCell::new(Some(teardown)),
        };
        // An error during the producer call already ended the stream.
        if subscription.is_closed() {
            subscription.unsubscribe();
        }
        subscription
    }

    /// Transforms every value.
    pub fn map<U, F>(self, f: F) -> Observable<U>
    where
        U: 'static,
        F: Fn(T) -> U + 'static,
    {
        let f = Rc::new(f);
        Observable::new(move |sink: Sink<U>| {
            let f = f.clone();
            let subscription = self.subscribe(move |result| sink.emit(result.map(|v| f(v))));
            Box::new(move || drop(subscription))
        })
    }

    /// Transforms every value with a fallible function. An error ends the
    /// stream.
    pub fn try_map<U, F>(self, f: F) -> Observable<U>
    where
        U: 'static,
        F: Fn(T) -> Result<U> + 'static,
    {
        let f = Rc::new(f);
        Observable::new(move |sink: Sink<U>| {
            let f = f.clone();
            let subscription = self.subscribe(move |result| sink.emit(result.and_then(|v| f(v))));
            Box::new(move || drop(subscription))
        })
    }
}

impl<T: Clone + 'static> Observable<T> {
    /// An observable that emits one value.
    pub fn of(value: T) -> Self {
        Self::new(move |sink| {
            sink.next(value.clone());
            Box::new(|| {})
        })
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    /// Suppresses values equal to the previous emission.
    pub fn distinct_until_changed(self) -> Self {
        Observable::new(move |sink: Sink<T>| {
            let last: Rc<RefCell<Option<T>>> = Rc::new(RefCell::new(None));
            let subscription = self.subscribe(move |result| match result {
                Ok(value) => {
                    if last.borrow().as_ref() == Some(&value) {
                        return;
                    }
                    *last.borrow_mut() = Some(value.clone());
                    sink.next(value);
                }
                Err(error) => sink.error(error),
            });
            Box::new(move || drop(subscription))
        })
    }
}
