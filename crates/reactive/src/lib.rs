//! Lumen Reactive - Single-threaded reactive primitives for Lumen queries.
//!
//! Everything here runs on one thread with `Rc`/`RefCell` sharing. Emissions
//! are synchronous: a commit notifies observers before it returns.
//!
//! # Core Concepts
//!
//! - `Observable`: A cold stream of `Result<T>` values with `map`,
//!   `distinct_until_changed` and `combine_latest`
//! - `Scheduler`: Batches keyed jobs so work triggered several times inside
//!   one batch runs once, after the batch
//! - `ChangeSet`: The tables one committed transaction touched
//! - `QueryRegistry`: Routes a `ChangeSet` to the observers depending on it
//! - `Deferred`: A lazily resolved, shared, cached result
//!
//! # Example
//!
//! ```rust
//! use lumen_reactive::Observable;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = seen.clone();
//! let _sub = Observable::of(20)
//!     .map(|n| n + 1)
//!     .subscribe(move |v| sink.borrow_mut().push(v.unwrap()));
//!
//! assert_eq!(*seen.borrow(), vec![21]);
//! ```

pub mod change_set;
pub mod combine;
pub mod deferred;
pub mod notify;
pub mod observable;
pub mod scheduler;
pub mod subscription;

pub use change_set::ChangeSet;
pub use combine::combine_latest;
pub use deferred::Deferred;
pub use notify::{QueryId, QueryRegistry};
pub use observable::{Observable, Sink, Subscription};
pub use scheduler::Scheduler;
pub use subscription::{Listener, ListenerId, SubscriptionManager};
