//! Selectors: executable reads.
//!
//! A [`Selector`] is either one compiled query or the concatenation of
//! several. It can be read once as a snapshot with [`Selector::values`] and
//! once as a live stream with [`Selector::changes`].
//!
//! Paginated queries never window the joined rows directly, since a root
//! entity with several related rows spans several flat rows. The window is
//! taken over distinct root keys first and the full graph is then read for
//! exactly those keys.

use crate::hydrate::{hydrate, Shape};
use crate::join::JoinPlan;
use lumen_core::{Error, Result, Value};
use lumen_query::ast::{ColumnRef, OrderBy, Predicate, SelectStatement};
use lumen_reactive::{combine_latest, Observable, Scheduler, Sink};
use lumen_storage::{Connection, ObserverId};
use serde_json::Value as Json;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// Output mapping applied to every result object.
pub type MapFn = Rc<dyn Fn(Json) -> Json>;

/// One compiled query bound to a connection.
#[derive(Clone)]
pub struct QuerySelector {
    connection: Connection,
    /// Projection, joins, filter and ordering; no window.
    base: SelectStatement,
    shape: Rc<Shape>,
    primary: ColumnRef,
    limit: Option<usize>,
    skip: Option<usize>,
}

impl QuerySelector {
    pub fn new(
        connection: Connection,
        plan: &JoinPlan,
        predicate: Option<Predicate>,
        order_by: Vec<OrderBy>,
        limit: Option<usize>,
        skip: Option<usize>,
    ) -> Self {
        let mut base = plan.select();
        if let Some(predicate) = predicate {
            base = base.filter(predicate);
        }
        base.order_by = order_by;
        Self {
            connection,
            base,
            shape: Rc::new(plan.shape.clone()),
            primary: plan.root_primary.clone(),
            limit,
            skip,
        }
    }

    pub fn is_paginated(&self) -> bool {
        self.limit.is_some() || self.skip.is_some()
    }

    /// The statement as the application asked for it.
    pub fn statement(&self) -> SelectStatement {
        let mut stmt = self.base.clone();
        stmt.limit = self.limit;
        stmt.skip = self.skip;
        stmt
    }

    /// Distinct root keys in result order, windowed if `window` is set.
    fn key_statement(&self, window: bool) -> SelectStatement {
        let mut stmt = self.base.clone().columns(vec![self.primary.clone()]).distinct();
        if window {
            stmt.limit = self.limit;
            stmt.skip = self.skip;
        }
        stmt
    }

    /// The full read restricted to the given root keys.
    fn keyed_statement(&self, keys: &[Value]) -> SelectStatement {
        self.base
            .clone()
            .filter(Predicate::in_list(self.primary.clone(), keys.to_vec()))
    }

    fn fetch_keys(&self) -> Result<Vec<Value>> {
        let result = self.connection.select(&self.key_statement(true))?;
        Ok(result
            .rows
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .collect())
    }

    fn fetch_keyed(&self, keys: &[Value]) -> Result<Vec<Json>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let result = self.connection.select(&self.keyed_statement(keys))?;
        hydrate(&result, &self.shape)
    }

    /// Reads the current result.
    pub fn fetch(&self) -> Result<Vec<Json>> {
        if self.is_paginated() {
            let keys = self.fetch_keys()?;
            return self.fetch_keyed(&keys);
        }
        let result = self.connection.select(&self.base)?;
        hydrate(&result, &self.shape)
    }

    /// Live results, deduplicated by content.
    fn stream(&self) -> Observable<Vec<Json>> {
        let query = self.clone();
        let raw = if self.is_paginated() {
            Observable::new(move |sink| {
                let pager = Pager::start(query.clone(), sink);
                Box::new(move || pager.stop())
            })
        } else {
            Observable::new(move |sink: Sink<Vec<Json>>| {
                let emit = {
                    let query = query.clone();
                    move || sink.emit(query.fetch())
                };
                emit();
                let id = query.connection.observe(&query.base, emit);
                let connection = query.connection.clone();
                Box::new(move || {
                    connection.unobserve(id);
                })
            })
        };
        raw.distinct_until_changed()
    }
}

enum Window {
    NoWindow,
    Window(Vec<Value>),
    Transitioning,
}

struct PagerState {
    window: Window,
    outer: Option<ObserverId>,
    inner: Option<ObserverId>,
}

/// Live pagination. The outer observer watches the unbounded key query and
/// the inner one the current window; either schedules one refresh, which
/// switches the window when the keys moved and re-reads it.
struct Pager {
    query: QuerySelector,
    sink: Sink<Vec<Json>>,
    key: u64,
    state: RefCell<PagerState>,
}

impl Pager {
    fn start(query: QuerySelector, sink: Sink<Vec<Json>>) -> Rc<Self> {
        let key = query.connection.scheduler().key();
        let pager = Rc::new(Self {
            query,
            sink,
            key,
            state: RefCell::new(PagerState {
                window: Window::NoWindow,
                outer: None,
                inner: None,
            }),
        });
        pager.refresh();
        if !pager.sink.is_closed() {
            let weak = Rc::downgrade(&pager);
            let outer = pager
                .query
                .connection
                .observe(&pager.query.key_statement(false), move || request(&weak));
            pager.state.borrow_mut().outer = Some(outer);
        }
        pager
    }

    fn refresh(self: &Rc<Self>) {
        if self.sink.is_closed() {
            return;
        }
        let keys = match self.query.fetch_keys() {
            Ok(keys) => keys,
            Err(error) => return self.sink.error(error),
        };
        let unchanged = matches!(&self.state.borrow().window, Window::Window(current) if *current == keys);
        if !unchanged {
            self.switch(&keys);
        }
        self.sink.emit(self.query.fetch_keyed(&keys));
    }

    /// Replaces the inner observer. The previous one is removed before the
    /// next one is registered.
    fn switch(self: &Rc<Self>, keys: &[Value]) {
        let previous = {
            let mut state = self.state.borrow_mut();
            state.window = Window::Transitioning;
            state.inner.take()
        };
        if let Some(id) = previous {
            self.query.connection.unobserve(id);
        }
        let inner = (!keys.is_empty()).then(|| {
            let weak = Rc::downgrade(self);
            self.query
                .connection
                .observe(&self.query.keyed_statement(keys), move || request(&weak))
        });
        log::debug!("pagination window moved to {} key(s)", keys.len());
        let mut state = self.state.borrow_mut();
        state.inner = inner;
        state.window = Window::Window(keys.to_vec());
    }

    fn stop(&self) {
        let (outer, inner) = {
            let mut state = self.state.borrow_mut();
            state.window = Window::NoWindow;
            (state.outer.take(), state.inner.take())
        };
        for id in outer.into_iter().chain(inner) {
            self.query.connection.unobserve(id);
        }
    }
}

/// Schedules one refresh of a live pager.
fn request(pager: &Weak<Pager>) {
    let Some(strong) = pager.upgrade() else {
        return;
    };
    let weak = pager.clone();
    strong
        .query
        .connection
        .scheduler()
        .schedule(strong.key, move || {
            if let Some(pager) = weak.upgrade() {
                pager.refresh();
            }
        });
}

#[derive(Clone)]
enum Kind {
    Query(QuerySelector),
    Combined(Vec<Selector>),
}

/// An executable read, consumed at most once per access mode.
#[derive(Clone)]
pub struct Selector {
    kind: Kind,
    map: Option<MapFn>,
    values_taken: Rc<Cell<bool>>,
    changes_taken: Rc<Cell<bool>>,
}

impl Selector {
    fn from_kind(kind: Kind, map: Option<MapFn>) -> Self {
        Self {
            kind,
            map,
            values_taken: Rc::new(Cell::new(false)),
            changes_taken: Rc::new(Cell::new(false)),
        }
    }

    /// A selector over one query.
    pub fn query(query: QuerySelector) -> Self {
        Self::from_kind(Kind::Query(query), None)
    }

    /// Reads the result once.
    pub fn values(&self) -> Result<Vec<Json>> {
        if self.values_taken.replace(true) {
            return Err(Error::Consumed { mode: "values" });
        }
        self.fetch()
    }

    /// Streams the result: the current value on subscription, then one
    /// value per commit that changes it.
    pub fn changes(&self) -> Result<Observable<Vec<Json>>> {
        if self.changes_taken.replace(true) {
            return Err(Error::Consumed { mode: "changes" });
        }
        Ok(self.stream())
    }

    /// Replaces the output mapping.
    pub fn map<F>(&self, f: F) -> Selector
    where
        F: Fn(Json) -> Json + 'static,
    {
        self.map_with(Rc::new(f))
    }

    /// Replaces the output mapping with a shared one. Pages mapped with the
    /// same `MapFn` can be concatenated.
    pub fn map_with(&self, f: MapFn) -> Selector {
        Self::from_kind(self.kind.clone(), Some(f))
    }

    /// A selector whose result is this one's followed by each of `others`.
    pub fn combine(&self, others: &[Selector]) -> Selector {
        let mut parts = vec![self.clone()];
        parts.extend(others.iter().cloned());
        Self::from_kind(Kind::Combined(parts), None)
    }

    /// Joins adjacent pages of the same query into one larger page.
    ///
    /// Every operand must be the same query (projection, joins, filter,
    /// ordering and mapping) with a limit, and each must start where the
    /// previous one ends.
    pub fn concat(&self, others: &[Selector]) -> Result<Selector> {
        let first = self.as_query()?;
        let mut end = first.skip.unwrap_or(0) + limit_of(first)?;
        let fingerprint = first.base.fingerprint();
        for other in others {
            let query = other.as_query()?;
            if query.base.fingerprint() != fingerprint {
                return Err(Error::incompatible("operands select different graphs"));
            }
            if query.base.order_by != first.base.order_by {
                return Err(Error::incompatible("operands are ordered differently"));
            }
            if query.base.filter != first.base.filter {
                return Err(Error::incompatible("operands filter differently"));
            }
            if !same_map(&self.map, &other.map) {
                return Err(Error::incompatible("operands map their output differently"));
            }
            let skip = query.skip.unwrap_or(0);
            if skip != end {
                return Err(Error::incompatible(format!(
                    "page starting at {} does not follow the page ending at {}",
                    skip, end
                )));
            }
            end += limit_of(query)?;
        }
        let start = first.skip.unwrap_or(0);
        let mut merged = first.clone();
        merged.limit = Some(end - start);
        Ok(Self::from_kind(Kind::Query(merged), self.map.clone()))
    }

    /// Statement text, one line per query.
    pub fn query_text(&self) -> String {
        match &self.kind {
            Kind::Query(query) => query.statement().to_string(),
            Kind::Combined(parts) => parts
                .iter()
                .map(Selector::query_text)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    fn as_query(&self) -> Result<&QuerySelector> {
        match &self.kind {
            Kind::Query(query) => Ok(query),
            Kind::Combined(_) => Err(Error::incompatible("a combined selector cannot be paged")),
        }
    }

    fn connection(&self) -> Option<Connection> {
        match &self.kind {
            Kind::Query(query) => Some(query.connection.clone()),
            Kind::Combined(parts) => parts.iter().find_map(Selector::connection),
        }
    }

    fn fetch(&self) -> Result<Vec<Json>> {
        let rows = match &self.kind {
            Kind::Query(query) => query.fetch()?,
            Kind::Combined(parts) => {
                let mut rows = Vec::new();
                for part in parts {
                    rows.extend(part.fetch()?);
                }
                rows
            }
        };
        Ok(self.apply_map(rows))
    }

    fn stream(&self) -> Observable<Vec<Json>> {
        let raw = match &self.kind {
            Kind::Query(query) => query.stream(),
            Kind::Combined(parts) => {
                let scheduler = self
                    .connection()
                    .map(|c| c.scheduler())
                    .unwrap_or_else(|| Rc::new(Scheduler::new()));
                let sources = parts.iter().map(Selector::stream).collect();
                combine_latest(sources, scheduler)
                    .map(|lists: Vec<Vec<Json>>| lists.into_iter().flatten().collect())
            }
        };
        match self.map.clone() {
            Some(f) => raw.map(move |rows: Vec<Json>| rows.into_iter().map(|row| f(row)).collect()),
            None => raw,
        }
    }

    fn apply_map(&self, rows: Vec<Json>) -> Vec<Json> {
        match &self.map {
            Some(f) => rows.into_iter().map(|row| f(row)).collect(),
            None => rows,
        }
    }
}

fn limit_of(query: &QuerySelector) -> Result<usize> {
    query
        .limit
        .ok_or_else(|| Error::incompatible("every page needs a limit"))
}

fn same_map(a: &Option<MapFn>, b: &Option<MapFn>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Rc::ptr_eq(a, b),
        _ => false,
    }
}
