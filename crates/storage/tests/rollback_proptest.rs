//! Property-based tests for atomic statement batches.

use lumen_core::schema::TableBuilder;
use lumen_core::{DataType, Value};
use lumen_query::ast::{ColumnRef, DeleteStatement, InsertStatement, Predicate, Statement, UpdateStatement};
use lumen_storage::Connection;
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Op {
    Insert(i64),
    Upsert(i64, i64),
    Update(i64, i64),
    Delete(i64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0i64..20).prop_map(Op::Insert),
        (0i64..20, 0i64..100).prop_map(|(k, v)| Op::Upsert(k, v)),
        (0i64..20, 0i64..100).prop_map(|(k, v)| Op::Update(k, v)),
        (0i64..20).prop_map(Op::Delete),
    ]
}

fn connection() -> Connection {
    let table = TableBuilder::new("t")
        .unwrap()
        .add_column("k", DataType::Int64)
        .unwrap()
        .add_column("v", DataType::Int64)
        .unwrap()
        .add_primary_key("k")
        .unwrap()
        .build()
        .unwrap();
    Connection::open(vec![table]).unwrap()
}

fn key(k: i64) -> Option<Predicate> {
    Some(Predicate::eq(ColumnRef::new("t", "k"), k))
}

fn statement(op: &Op) -> Statement {
    match op {
        Op::Insert(k) => Statement::Insert(InsertStatement {
            table: "t".into(),
            rows: vec![vec![("k".into(), Value::Int64(*k))]],
            replace: false,
        }),
        Op::Upsert(k, v) => Statement::Insert(InsertStatement {
            table: "t".into(),
            rows: vec![vec![("k".into(), Value::Int64(*k)), ("v".into(), Value::Int64(*v))]],
            replace: true,
        }),
        Op::Update(k, v) => Statement::Update(UpdateStatement {
            table: "t".into(),
            set: vec![("v".into(), Value::Int64(*v))],
            filter: key(*k),
        }),
        Op::Delete(k) => Statement::Delete(DeleteStatement {
            table: "t".into(),
            filter: key(*k),
        }),
    }
}

proptest! {
    /// Property: a failing batch leaves the engine exactly as it was.
    #[test]
    fn failed_batch_restores_state(
        setup in prop::collection::vec(0i64..20, 0..10),
        ops in prop::collection::vec(op_strategy(), 0..20),
    ) {
        let conn = connection();
        let mut keys = setup.clone();
        keys.sort_unstable();
        keys.dedup();
        conn.execute(keys.iter().map(|k| statement(&Op::Insert(*k))).collect()).unwrap();
        let before = conn.dump();

        // A duplicate strict insert at the end always fails.
        let mut batch: Vec<Statement> = ops.iter().map(statement).collect();
        batch.push(statement(&Op::Upsert(99, 0)));
        batch.push(statement(&Op::Insert(99)));
        prop_assert!(conn.execute(batch).is_err());

        prop_assert_eq!(conn.dump(), before);
    }
}
