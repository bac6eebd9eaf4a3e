//! Combining several observables into one.

use crate::observable::{Observable, Sink};
use crate::scheduler::Scheduler;
use std::cell::RefCell;
use std::rc::Rc;

/// Emits the latest value of every source once all of them have emitted,
/// then again whenever any source emits.
///
/// Emissions go through the scheduler under one key per subscription, so
/// sources that all emit inside one batch produce a single combined value.
/// An error from any source ends the combined stream.
pub fn combine_latest<T>(sources: Vec<Observable<T>>, scheduler: Rc<Scheduler>) -> Observable<Vec<T>>
where
    T: Clone + 'static,
{
    Observable::new(move |sink: Sink<Vec<T>>| {
        if sources.is_empty() {
            sink.next(Vec::new());
            return Box::new(|| {});
        }

        let latest: Rc<RefCell<Vec<Option<T>>>> = Rc::new(RefCell::new(vec![None; sources.len()]));
        let key = scheduler.key();

        let subscriptions = scheduler.batch(|| {
            sources
                .iter()
                .enumerate()
                .map(|(slot, source)| {
                    let latest = latest.clone();
                    let sink = sink.clone();
                    let scheduler = scheduler.clone();
                    source.subscribe(move |result| {
                        let value = match result {
                            Ok(value) => value,
                            Err(error) => return sink.error(error),
                        };
                        latest.borrow_mut()[slot] = Some(value);
                        let latest = latest.clone();
                        let sink = sink.clone();
                        scheduler.schedule(key, move || {
                            let values: Option<Vec<T>> = latest.borrow().iter().cloned().collect();
                            if let Some(values) = values {
                                sink.next(values);
                            }
                        });
                    })
                })
                .collect::<Vec<_>>()
        });

        Box::new(move || drop(subscriptions))
    })
}
