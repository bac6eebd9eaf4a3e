//! Query tokens.

use crate::selector::{MapFn, Selector};
use lumen_core::{Error, Result};
use lumen_reactive::{Deferred, Observable};
use serde::de::DeserializeOwned;
use serde_json::Value as Json;
use std::cell::Cell;
use std::rc::Rc;

/// The handle returned by `Database::get`.
///
/// The query is compiled on first use, not when the token is created. A
/// token can be read once with [`values`](Self::values) and subscribed once
/// through [`changes`](Self::changes); a second call in the same mode fails
/// with [`Error::Consumed`].
pub struct QueryToken {
    selector: Deferred<Selector>,
    values_taken: Cell<bool>,
    changes_taken: Cell<bool>,
}

impl QueryToken {
    pub(crate) fn new(selector: Deferred<Selector>) -> Self {
        Self {
            selector,
            values_taken: Cell::new(false),
            changes_taken: Cell::new(false),
        }
    }

    /// A token over an already built selector.
    pub fn from_selector(selector: Selector) -> Self {
        Self::new(Deferred::resolved(selector))
    }

    /// Reads the current result.
    pub fn values(&self) -> Result<Vec<Json>> {
        if self.values_taken.replace(true) {
            return Err(Error::Consumed { mode: "values" });
        }
        self.selector.get()?.values()
    }

    /// Reads the current result into typed rows.
    pub fn values_as<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.values()?
            .into_iter()
            .map(|row| serde_json::from_value(row).map_err(Error::serialization))
            .collect()
    }

    /// Streams the result. Consumption errors are returned directly; query
    /// errors are delivered on the stream.
    pub fn changes(&self) -> Result<Observable<Vec<Json>>> {
        if self.changes_taken.replace(true) {
            return Err(Error::Consumed { mode: "changes" });
        }
        match self.selector.get() {
            Ok(selector) => selector.changes(),
            Err(error) => Ok(Observable::failed(error)),
        }
    }

    /// Maps every result object.
    pub fn map<F>(self, f: F) -> QueryToken
    where
        F: Fn(Json) -> Json + 'static,
    {
        self.map_with(Rc::new(f))
    }

    /// Maps every result object with a shared function.
    pub fn map_with(self, f: MapFn) -> QueryToken {
        let inner = self.selector;
        QueryToken::new(Deferred::new(move || Ok(inner.get()?.map_with(f.clone()))))
    }

    /// Appends the results of other tokens.
    pub fn combine(self, others: Vec<QueryToken>) -> QueryToken {
        let first = self.selector;
        QueryToken::new(Deferred::new(move || {
            let head = first.get()?;
            let rest = others
                .iter()
                .map(|token| token.selector.get())
                .collect::<Result<Vec<_>>>()?;
            Ok(head.combine(&rest))
        }))
    }

    /// Merges adjacent pages. Resolves every operand immediately.
    pub fn concat(self, others: Vec<QueryToken>) -> Result<QueryToken> {
        let head = self.selector.get()?;
        let rest = others
            .iter()
            .map(|token| token.selector.get())
            .collect::<Result<Vec<_>>>()?;
        Ok(QueryToken::from_selector(head.concat(&rest)?))
    }

    /// Text of the compiled statements.
    pub fn query_text(&self) -> Result<String> {
        self.selector.get().map(|selector| selector.query_text())
    }
}
