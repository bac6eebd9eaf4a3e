//! Property-based tests for paginated entity reads.

use lumen_database::{
    Clause, ColumnDef, ColumnType, Database, DatabaseConfig, Query, RelationshipDef, SchemaDef,
    SortOrder,
};
use proptest::prelude::*;
use serde_json::{json, Value as Json};

fn database(children: &[usize], ranks: &[i64]) -> Database {
    let db = Database::new(DatabaseConfig::default());
    db.define_schema(
        "parent",
        SchemaDef::new()
            .column("id", ColumnDef::new(ColumnType::Integer).primary_key())
            .column("rank", ColumnDef::new(ColumnType::Integer))
            .relationship(
                "children",
                RelationshipDef::one_to_many("child", |child| {
                    Ok(Clause::object([("id", child.column("parentId")?)]))
                }),
            ),
    )
    .unwrap();
    db.define_schema(
        "child",
        SchemaDef::new()
            .column("id", ColumnDef::new(ColumnType::Integer).primary_key())
            .column("parentId", ColumnDef::new(ColumnType::Integer)),
    )
    .unwrap();
    db.connect().unwrap();

    let mut next_child = 0;
    let graph: Vec<Json> = children
        .iter()
        .zip(ranks)
        .enumerate()
        .map(|(id, (count, rank))| {
            let kids: Vec<Json> = (0..*count)
                .map(|_| {
                    next_child += 1;
                    json!({ "id": next_child, "parentId": id })
                })
                .collect();
            json!({ "id": id, "rank": rank, "children": kids })
        })
        .collect();
    db.insert("parent", &Json::Array(graph), None).unwrap();
    db
}

fn ordered() -> Query {
    Query::new()
        .order_by("rank", SortOrder::Desc)
        .order_by("id", SortOrder::Asc)
}

proptest! {
    #[test]
    fn window_is_a_slice_of_the_full_result(
        shape in prop::collection::vec((0usize..4, 0i64..5), 0..12),
        skip in 0usize..14,
        limit in 0usize..14,
    ) {
        let (children, ranks): (Vec<usize>, Vec<i64>) = shape.into_iter().unzip();
        let db = database(&children, &ranks);

        let all = db.get("parent", ordered()).values().unwrap();
        prop_assert_eq!(all.len(), children.len());

        let page = db.get("parent", ordered().skip(skip).limit(limit)).values().unwrap();
        let start = skip.min(all.len());
        let end = (skip + limit).min(all.len());
        prop_assert_eq!(page, all[start..end].to_vec());
    }

    #[test]
    fn adjacent_pages_concat_to_one_page(
        count in 0usize..10,
        skip in 0usize..5,
        first in 1usize..4,
        second in 1usize..4,
    ) {
        let db = database(&vec![2; count], &vec![0; count]);

        let merged = db
            .get("parent", ordered().skip(skip).limit(first))
            .concat(vec![db.get("parent", ordered().skip(skip + first).limit(second))])
            .unwrap()
            .values()
            .unwrap();
        let single = db
            .get("parent", ordered().skip(skip).limit(first + second))
            .values()
            .unwrap();
        prop_assert_eq!(merged, single);
    }
}
