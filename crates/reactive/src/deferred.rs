//! Lazily resolved shared results.

use lumen_core::{Error, Result};
use std::cell::RefCell;
use std::rc::Rc;

type Thunk<T> = Box<dyn FnOnce() -> Result<T>>;

enum State<T> {
    Pending(Thunk<T>),
    Running,
    Resolved(T),
    Failed(Error),
}

/// A computation that runs at most once, on first access, and whose
/// outcome is shared by every clone.
pub struct Deferred<T> {
    state: Rc<RefCell<State<T>>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T: Clone + 'static> Deferred<T> {
    /// Defers a computation.
    pub fn new(thunk: impl FnOnce() -> Result<T> + 'static) -> Self {
        Self {
            state: Rc::new(RefCell::new(State::Pending(Box::new(thunk)))),
        }
    }

    /// An already resolved value.
    pub fn resolved(value: T) -> Self {
        Self {
            state: Rc::new(RefCell::new(State::Resolved(value))),
        }
    }

    /// Runs the computation if needed and returns its outcome.
    pub fn get(&self) -> Result<T> {
        let pending = {
            let mut state = self.state.borrow_mut();
            match std::mem::replace(&mut *state, State::Running) {
                State::Pending(thunk) => thunk,
                State::Resolved(value) => {
                    *state = State::Resolved(value.clone());
                    return Ok(value);
                }
                State::Failed(error) => {
                    *state = State::Failed(error.clone());
                    return Err(error);
                }
                State::Running => {
                    return Err(Error::invalid_operation("deferred value depends on itself"))
                }
            }
        };

        let outcome = pending();
        *self.state.borrow_mut() = match &outcome {
            Ok(value) => State::Resolved(value.clone()),
            Err(error) => State::Failed(error.clone()),
        };
        outcome
    }

    /// Whether the computation has run.
    pub fn is_resolved(&self) -> bool {
        matches!(&*self.state.borrow(), State::Resolved(_) | State::Failed(_))
    }
}
