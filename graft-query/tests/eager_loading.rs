//! Integration tests for eager loading.
//!
//! Every scenario runs against the same in-memory data set and, where the
//! algorithm supports it, is checked under all three fetch algorithms:
//! - Chains, inverse relations and join table relations
//! - Recursion, bounded and unbounded
//! - Named filters, path modifiers and merged expressions
//! - Key injection and stripping
//! - Join aliases, minimization and identifier limits
//! - Error propagation

use std::sync::Arc;

use graft_query::error::ErrorCode;
use graft_query::prelude::*;
use graft_query::{EagerQuery, RelationType};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

const ALGORITHMS: [EagerAlgorithm; 3] = [EagerAlgorithm::Naive, EagerAlgorithm::WhereIn, EagerAlgorithm::Join];

/// `model1Id` of each Model1 row.
const PARENTS: [(i64, Option<i64>); 9] = [
    (1, Some(2)),
    (2, Some(3)),
    (3, Some(4)),
    (4, None),
    (5, None),
    (6, Some(7)),
    (7, None),
    (8, Some(9)),
    (9, None),
];

/// `model1Id` of each model_2 row.
const OWNERS: [(i64, i64); 4] = [(1, 1), (2, 1), (3, 6), (4, 4)];

fn model1_spec() -> ModelSpec {
    ModelSpec::new("Model1", "Model1")
        .columns(["id", "model1Id", "model1Prop1", "model1Prop2"])
        .relation(RelationSpec::many_to_one("model1Relation1", "Model1").join_on(["model1Id"], ["id"]))
        .relation(RelationSpec::one_to_one("model1Relation1Inverse", "Model1").join_on(["id"], ["model1Id"]))
        .relation(RelationSpec::one_to_many("model1Relation2", "Model2").join_on(["id"], ["model1Id"]))
        .relation(
            RelationSpec::many_to_many(
                "model1Relation3",
                "Model2",
                JoinTableSpec::new("Model1Model2", "model1Id", "model2Id"),
            )
            .join_on(["id"], ["idCol"]),
        )
        .named_filter(
            "select:model1Prop1",
            mutator(|q| {
                q.select(["model1Prop1"]);
            }),
        )
}

fn model2_spec() -> ModelSpec {
    ModelSpec::new("Model2", "model_2")
        .id(["idCol"])
        .columns(["idCol", "model1Id", "model2Prop1", "model2Prop2"])
        .relation(
            RelationSpec::many_to_many(
                "model2Relation1",
                "Model1",
                JoinTableSpec::new("Model1Model2", "model2Id", "model1Id").extra("extra3", "aliasedExtra"),
            )
            .join_on(["idCol"], ["id"]),
        )
        .relation(
            RelationSpec::has_one_through(
                "model2Relation2",
                "Model1",
                JoinTableSpec::new("Model1Model2One", "model2Id", "model1Id"),
            )
            .join_on(["idCol"], ["id"]),
        )
}

fn catalog() -> Catalog {
    Catalog::new().with_model(model1_spec()).with_model(model2_spec())
}

fn database() -> Arc<MemoryExecutor> {
    let db = MemoryExecutor::new();
    db.create_table("Model1", ["id", "model1Id", "model1Prop1", "model1Prop2"]);
    db.create_table("model_2", ["idCol", "model1Id", "model2Prop1", "model2Prop2"]);
    db.create_table("Model1Model2", ["model1Id", "model2Id", "extra3"]);
    db.create_table("Model1Model2One", ["model1Id", "model2Id"]);

    for (id, parent) in PARENTS {
        db.insert_json(
            "Model1",
            json!([{ "id": id, "model1Id": parent, "model1Prop1": format!("hello {}", id) }]),
        )
        .unwrap();
    }
    for (id, owner) in OWNERS {
        db.insert_json(
            "model_2",
            json!([{ "idCol": id, "model1Id": owner, "model2Prop1": format!("hejsan {}", id) }]),
        )
        .unwrap();
    }
    db.insert_json(
        "Model1Model2",
        json!([
            { "model1Id": 5, "model2Id": 2, "extra3": "extra 5" },
            { "model1Id": 6, "model2Id": 2, "extra3": "extra 6" },
        ]),
    )
    .unwrap();
    db.insert_json("Model1Model2One", json!([{ "model1Id": 8, "model2Id": 1 }])).unwrap();
    Arc::new(db)
}

struct Fixture {
    db: Arc<MemoryExecutor>,
    loader: RelationLoader,
}

impl Fixture {
    fn new() -> Self {
        Self::with_catalog(catalog())
    }

    fn with_catalog(catalog: Catalog) -> Self {
        let db = database();
        let loader = RelationLoader::from_shared(db.clone(), Arc::new(catalog));
        Self { db, loader }
    }

    fn model1(&self, algorithm: EagerAlgorithm) -> EagerQuery<'_> {
        self.loader.query("Model1").algorithm(algorithm)
    }
}

fn to_json(records: &[Record]) -> Value {
    Value::Array(records.iter().map(Record::to_json).collect())
}

/// The stored Model1 row with `id`.
fn m1(id: i64) -> Value {
    let parent = PARENTS.iter().find(|(row, _)| *row == id).and_then(|(_, parent)| *parent);
    json!({
        "id": id,
        "model1Id": parent,
        "model1Prop1": format!("hello {}", id),
        "model1Prop2": null,
    })
}

/// The stored model_2 row with `idCol`.
fn m2(id: i64) -> Value {
    let owner = OWNERS.iter().find(|(row, _)| *row == id).map(|(_, owner)| *owner);
    json!({
        "idCol": id,
        "model1Id": owner,
        "model2Prop1": format!("hejsan {}", id),
        "model2Prop2": null,
    })
}

/// `record` with `field` set to `value`.
fn with(mut record: Value, field: &str, value: Value) -> Value {
    record[field] = value;
    record
}

async fn load_all(fixture: &Fixture, expression: &str) -> Vec<(EagerAlgorithm, Value)> {
    let mut results = Vec::new();
    for algorithm in ALGORITHMS {
        let records = fixture
            .model1(algorithm)
            .where_eq("id", 1)
            .eager(expression)
            .exec()
            .await
            .unwrap_or_else(|e| panic!("{} failed: {}", algorithm, e.display_full()));
        results.push((algorithm, to_json(&records)));
    }
    results
}

async fn assert_all(expression: &str, expected: Value) {
    let fixture = Fixture::new();
    for (algorithm, actual) in load_all(&fixture, expression).await {
        assert_eq!(actual, expected, "algorithm {}", algorithm);
    }
}

#[tokio::test]
async fn test_single_relation() {
    assert_all("model1Relation1", json!([with(m1(1), "model1Relation1", m1(2))])).await;
}

#[tokio::test]
async fn test_chain() {
    assert_all(
        "model1Relation1.model1Relation1",
        json!([with(m1(1), "model1Relation1", with(m1(2), "model1Relation1", m1(3)))]),
    )
    .await;
}

#[tokio::test]
async fn test_inverse_relation_returns_to_root() {
    assert_all(
        "model1Relation1.model1Relation1Inverse",
        json!([with(m1(1), "model1Relation1", with(m1(2), "model1Relation1Inverse", m1(1)))]),
    )
    .await;
}

#[tokio::test]
async fn test_missing_one_relation_is_null() {
    assert_all("model1Relation1Inverse", json!([with(m1(1), "model1Relation1Inverse", Value::Null)])).await;
}

#[tokio::test]
async fn test_empty_many_relation_is_empty_list() {
    let fixture = Fixture::new();
    for algorithm in ALGORITHMS {
        let records = fixture
            .model1(algorithm)
            .filter(Filter::In("id".into(), vec![2.into(), 4.into()]))
            .order_by("id", SortOrder::Asc)
            .eager("model1Relation2")
            .exec()
            .await
            .unwrap();
        assert_eq!(
            to_json(&records),
            json!([
                with(m1(2), "model1Relation2", json!([])),
                with(m1(4), "model1Relation2", json!([m2(4)])),
            ]),
            "algorithm {}",
            algorithm
        );
    }
}

#[tokio::test]
async fn test_has_one_through() {
    assert_all(
        "model1Relation2.model2Relation2",
        json!([with(
            m1(1),
            "model1Relation2",
            json!([with(m2(1), "model2Relation2", m1(8)), with(m2(2), "model2Relation2", Value::Null)])
        )]),
    )
    .await;
}

#[tokio::test]
async fn test_nested_below_has_one_through() {
    assert_all(
        "model1Relation2.model2Relation2.model1Relation1",
        json!([with(
            m1(1),
            "model1Relation2",
            json!([
                with(m2(1), "model2Relation2", with(m1(8), "model1Relation1", m1(9))),
                with(m2(2), "model2Relation2", Value::Null),
            ])
        )]),
    )
    .await;
}

#[tokio::test]
async fn test_many_to_many_with_extras() {
    let fixture = Fixture::new();
    let expected = json!([with(
        m2(2),
        "model2Relation1",
        json!([
            with(m1(5), "aliasedExtra", json!("extra 5")),
            with(with(m1(6), "aliasedExtra", json!("extra 6")), "model1Relation1", m1(7)),
        ])
    )]);
    for algorithm in ALGORITHMS {
        let records = fixture
            .loader
            .query("Model2")
            .algorithm(algorithm)
            .where_eq("idCol", 2)
            .eager("model2Relation1.model1Relation1")
            .exec()
            .await
            .unwrap();
        assert_eq!(to_json(&records), expected, "algorithm {}", algorithm);
    }
}

#[tokio::test]
async fn test_filtered_many_to_many_drops_unmatched_join_rows() {
    let fixture = Fixture::new();
    let expected = json!([with(
        m2(2),
        "model2Relation1",
        json!([with(m1(5), "aliasedExtra", json!("extra 5"))])
    )]);
    for algorithm in ALGORITHMS {
        let records = fixture
            .loader
            .query("Model2")
            .algorithm(algorithm)
            .where_eq("idCol", 2)
            .eager("model2Relation1")
            .filter_eager("model2Relation1", |q| {
                q.where_eq("id", 5);
            })
            .exec()
            .await
            .unwrap();
        assert_eq!(to_json(&records), expected, "algorithm {}", algorithm);
    }
}

#[tokio::test]
async fn test_deep_tree() {
    let model2_with_relations = |id: i64, related: Value| with(m2(id), "model2Relation1", related);
    assert_all(
        "[model1Relation1.model1Relation1, model1Relation2.model2Relation1.[model1Relation1, model1Relation2]]",
        json!([with(
            with(m1(1), "model1Relation1", with(m1(2), "model1Relation1", m1(3))),
            "model1Relation2",
            json!([
                model2_with_relations(1, json!([])),
                model2_with_relations(
                    2,
                    json!([
                        with(
                            with(with(m1(5), "aliasedExtra", json!("extra 5")), "model1Relation1", Value::Null),
                            "model1Relation2",
                            json!([])
                        ),
                        with(
                            with(with(m1(6), "aliasedExtra", json!("extra 6")), "model1Relation1", m1(7)),
                            "model1Relation2",
                            json!([m2(3)])
                        ),
                    ])
                ),
            ])
        )]),
    )
    .await;
}

#[tokio::test]
async fn test_unbounded_recursion_ends_with_data() {
    let fixture = Fixture::new();
    let expected = json!([with(
        m1(1),
        "model1Relation1",
        with(
            m1(2),
            "model1Relation1",
            with(m1(3), "model1Relation1", with(m1(4), "model1Relation1", Value::Null))
        )
    )]);
    for algorithm in [EagerAlgorithm::Naive, EagerAlgorithm::WhereIn] {
        fixture.db.clear_log();
        let records = fixture
            .model1(algorithm)
            .where_eq("id", 1)
            .eager("model1Relation1.^")
            .exec()
            .await
            .unwrap();
        assert_eq!(to_json(&records), expected, "algorithm {}", algorithm);
        // Roots, then rows 2, 3 and 4. Row 4 has no parent key to look up.
        assert_eq!(fixture.db.query_count(), 4, "algorithm {}", algorithm);
    }
}

#[tokio::test]
async fn test_unbounded_recursion_rejected_by_join() {
    let fixture = Fixture::new();
    let err = fixture
        .model1(EagerAlgorithm::Join)
        .eager("model1Relation1.^")
        .exec()
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::RecursionTooDeep);
    assert!(err.is_validation_error());
    assert_eq!(err.context.expression.as_deref(), Some("model1Relation1.^"));
    assert_eq!(fixture.db.query_count(), 0);
}

#[tokio::test]
async fn test_join_expansion_conflict_is_not_a_recursion_error() {
    let fixture = Fixture::new();
    let err = fixture
        .model1(EagerAlgorithm::Join)
        .eager("model1Relation1.^2")
        .merge_eager("model1Relation1.model1Relation2 as model1Relation1")
        .exec()
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AliasConflict);
    assert_eq!(err.context.path.as_deref(), Some("model1Relation1.model1Relation1"));
    assert_eq!(fixture.db.query_count(), 0);
}

#[tokio::test]
async fn test_max_recursion_depth_bounds_unbounded_recursion() {
    let fixture = Fixture::new();
    for algorithm in [EagerAlgorithm::Naive, EagerAlgorithm::WhereIn] {
        let records = fixture
            .model1(algorithm)
            .options(EagerOptions::default().max_recursion_depth(2))
            .where_eq("id", 1)
            .eager("model1Relation1.^")
            .exec()
            .await
            .unwrap();
        assert_eq!(
            to_json(&records),
            json!([with(m1(1), "model1Relation1", with(m1(2), "model1Relation1", m1(3)))]),
            "algorithm {}",
            algorithm
        );
    }
}

#[tokio::test]
async fn test_bounded_recursion() {
    assert_all(
        "model1Relation1.^2",
        json!([with(m1(1), "model1Relation1", with(m1(2), "model1Relation1", m1(3)))]),
    )
    .await;
}

#[tokio::test]
async fn test_bounded_recursion_deeper_than_data() {
    let expected = json!([with(
        m1(1),
        "model1Relation1",
        with(
            m1(2),
            "model1Relation1",
            with(m1(3), "model1Relation1", with(m1(4), "model1Relation1", Value::Null))
        )
    )]);
    assert_all("model1Relation1.^5", expected).await;
}

#[tokio::test]
async fn test_recursion_with_narrowing_filter() {
    let fixture = Fixture::new();
    let filters = FilterMap::new().with(
        "selectId",
        mutator(|q| {
            q.select(["id", "model1Id"]);
        }),
    );
    let level = |id: i64, parent: Value, next: Value| json!({ "id": id, "model1Id": parent, "model1Relation1": next });
    let expected = json!([with(
        m1(1),
        "model1Relation1",
        level(2, json!(3), level(3, json!(4), level(4, Value::Null, Value::Null)))
    )]);

    for algorithm in [EagerAlgorithm::Naive, EagerAlgorithm::WhereIn] {
        let records = fixture
            .model1(algorithm)
            .where_eq("id", 1)
            .eager("model1Relation1(selectId).^")
            .with_filters(filters.clone())
            .exec()
            .await
            .unwrap();
        assert_eq!(to_json(&records), expected, "algorithm {}", algorithm);
    }
}

#[tokio::test]
async fn test_recursion_strips_injected_keys() {
    let fixture = Fixture::new();
    let filters = FilterMap::new().with(
        "onlyProp",
        mutator(|q| {
            q.select(["model1Prop1"]);
        }),
    );
    let level = |id: i64, next: Value| json!({ "model1Prop1": format!("hello {}", id), "model1Relation1": next });
    let expected = json!([with(m1(1), "model1Relation1", level(2, level(3, level(4, Value::Null))))]);

    for algorithm in ALGORITHMS {
        let records = fixture
            .model1(algorithm)
            .options(EagerOptions::default().minimize(true))
            .where_eq("id", 1)
            .eager("model1Relation1(onlyProp).^4")
            .with_filters(filters.clone())
            .exec()
            .await
            .unwrap();
        assert_eq!(to_json(&records), expected, "algorithm {}", algorithm);
    }
}

#[tokio::test]
async fn test_model_named_filter_and_injected_key() {
    assert_all(
        "model1Relation1(select:model1Prop1)",
        json!([with(m1(1), "model1Relation1", json!({ "model1Prop1": "hello 2" }))]),
    )
    .await;
}

#[tokio::test]
async fn test_injected_keys_can_be_kept() {
    let fixture = Fixture::new();
    for algorithm in ALGORITHMS {
        let records = fixture
            .model1(algorithm)
            .options(EagerOptions::default().strip_injected_columns(false))
            .where_eq("id", 1)
            .eager("model1Relation1(select:model1Prop1)")
            .exec()
            .await
            .unwrap();
        assert_eq!(
            to_json(&records),
            json!([with(m1(1), "model1Relation1", json!({ "model1Prop1": "hello 2", "id": 2 }))]),
            "algorithm {}",
            algorithm
        );
    }
}

#[tokio::test]
async fn test_narrowed_root_selection() {
    let fixture = Fixture::new();
    for algorithm in ALGORITHMS {
        let records = fixture
            .model1(algorithm)
            .select(["model1Prop1"])
            .where_eq("id", 1)
            .eager("model1Relation1")
            .exec()
            .await
            .unwrap();
        assert_eq!(
            to_json(&records),
            json!([{ "model1Prop1": "hello 1", "model1Relation1": m1(2) }]),
            "algorithm {}",
            algorithm
        );
    }
}

#[tokio::test]
async fn test_relation_aliases() {
    assert_all(
        "[model1Relation1 as parent, model1Relation1 as again.model1Relation1 as grandparent]",
        json!([with(
            with(m1(1), "parent", m1(2)),
            "again",
            with(m1(2), "grandparent", m1(3))
        )]),
    )
    .await;
}

#[tokio::test]
async fn test_path_modifier_by_alias_and_relation_name() {
    let fixture = Fixture::new();
    let expected = json!([with(m1(1), "kids", json!([m2(2)]))]);
    for path in ["kids", "model1Relation2"] {
        for algorithm in ALGORITHMS {
            let records = fixture
                .model1(algorithm)
                .where_eq("id", 1)
                .eager("model1Relation2 as kids")
                .filter_eager(path, |q| {
                    q.where_eq("model2Prop1", "hejsan 2");
                })
                .exec()
                .await
                .unwrap();
            assert_eq!(to_json(&records), expected, "algorithm {} path {}", algorithm, path);
        }
    }
}

#[tokio::test]
async fn test_path_modifiers_apply_in_order() {
    let fixture = Fixture::new();
    for algorithm in ALGORITHMS {
        let records = fixture
            .model1(algorithm)
            .where_eq("id", 1)
            .eager("model1Relation2")
            .modify_eager("model1Relation2", |q| {
                q.select(["model2Prop1"]);
            })
            .modify_eager("model1Relation2", |q| {
                q.order_by_desc("model2Prop1");
            })
            .exec()
            .await
            .unwrap();
        assert_eq!(
            to_json(&records),
            json!([with(
                m1(1),
                "model1Relation2",
                json!([{ "model2Prop1": "hejsan 2" }, { "model2Prop1": "hejsan 1" }])
            )]),
            "algorithm {}",
            algorithm
        );
    }
}

#[tokio::test]
async fn test_path_modifier_on_recursive_level() {
    let fixture = Fixture::new();
    for algorithm in [EagerAlgorithm::Naive, EagerAlgorithm::WhereIn] {
        let records = fixture
            .model1(algorithm)
            .where_eq("id", 1)
            .eager("model1Relation1.^")
            .filter_eager("model1Relation1.model1Relation1", |q| {
                q.where_ne("model1Prop1", "hello 3");
            })
            .exec()
            .await
            .unwrap();
        assert_eq!(
            to_json(&records),
            json!([with(m1(1), "model1Relation1", with(m1(2), "model1Relation1", Value::Null))]),
            "algorithm {}",
            algorithm
        );
    }
}

#[tokio::test]
async fn test_merge_matches_written_union() {
    let fixture = Fixture::new();
    for algorithm in ALGORITHMS {
        let merged = fixture
            .model1(algorithm)
            .where_eq("id", 1)
            .eager("model1Relation1")
            .merge_eager("model1Relation1.model1Relation1Inverse")
            .merge_eager("model1Relation2.model2Relation2")
            .exec()
            .await
            .unwrap();
        let written = fixture
            .model1(algorithm)
            .where_eq("id", 1)
            .eager("[model1Relation1.model1Relation1Inverse, model1Relation2.model2Relation2]")
            .exec()
            .await
            .unwrap();
        assert_eq!(to_json(&merged), to_json(&written), "algorithm {}", algorithm);
    }
}

#[tokio::test]
async fn test_merge_with_filters() {
    let fixture = Fixture::new();
    let filters = FilterMap::new().with(
        "first",
        mutator(|q| {
            q.where_eq("idCol", 1);
        }),
    );
    for algorithm in ALGORITHMS {
        let records = fixture
            .model1(algorithm)
            .where_eq("id", 1)
            .merge_eager_with("model1Relation2(first)", filters.clone())
            .exec()
            .await
            .unwrap();
        assert_eq!(
            to_json(&records),
            json!([with(m1(1), "model1Relation2", json!([m2(1)]))]),
            "algorithm {}",
            algorithm
        );
    }
}

#[tokio::test]
async fn test_expression_includes_merges() {
    let fixture = Fixture::new();
    let query = fixture
        .model1(EagerAlgorithm::WhereIn)
        .eager("model1Relation1")
        .merge_eager("[model1Relation1.model1Relation1, model1Relation2]");
    assert_eq!(
        query.expression().unwrap().to_string(),
        "[model1Relation1.model1Relation1, model1Relation2]"
    );
}

#[tokio::test]
async fn test_query_counts() {
    let fixture = Fixture::new();
    // One query per distinct parent key for the naive algorithm, one per
    // relation for where-in, one in total for join.
    let expected = [
        (EagerAlgorithm::Naive, 1 + 5 + 9),
        (EagerAlgorithm::WhereIn, 1 + 2),
        (EagerAlgorithm::Join, 1),
    ];
    for (algorithm, count) in expected {
        fixture.db.clear_log();
        let records = fixture
            .model1(algorithm)
            .eager("[model1Relation1, model1Relation2]")
            .exec()
            .await
            .unwrap();
        assert_eq!(records.len(), 9);
        assert_eq!(fixture.db.query_count(), count, "algorithm {}", algorithm);
    }
}

#[tokio::test]
async fn test_where_in_query_shape() {
    let fixture = Fixture::new();
    fixture
        .model1(EagerAlgorithm::WhereIn)
        .where_eq("id", 1)
        .eager("model1Relation1")
        .exec()
        .await
        .unwrap();
    assert_eq!(
        fixture.db.executed(),
        vec![
            "SELECT * FROM Model1 WHERE id = $1".to_string(),
            "SELECT * FROM Model1 WHERE Model1.id IN ($1)".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_join_identifier_limit() {
    let fixture = Fixture::new();
    let expression = "model1Relation1.model1Relation1.model1Relation1.model1Relation1";

    let err = fixture
        .model1(EagerAlgorithm::Join)
        .eager(expression)
        .exec()
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::IdentifierTooLong);
    assert_eq!(
        err.context.expression.as_deref(),
        Some("model1Relation1:model1Relation1:model1Relation1:model1Relation1:id")
    );
    assert_eq!(err.context.path.as_deref(), Some(expression));
    assert_eq!(fixture.db.query_count(), 0);

    let expected = json!([with(
        m1(1),
        "model1Relation1",
        with(
            m1(2),
            "model1Relation1",
            with(m1(3), "model1Relation1", with(m1(4), "model1Relation1", Value::Null))
        )
    )]);
    let options = [
        EagerOptions::default().minimize(true),
        EagerOptions::default().alias("model1Relation1", "mr1"),
    ];
    for options in options {
        let records = fixture
            .model1(EagerAlgorithm::Join)
            .options(options)
            .where_eq("id", 1)
            .eager(expression)
            .exec()
            .await
            .unwrap();
        assert_eq!(to_json(&records), expected);
    }
}

#[tokio::test]
async fn test_join_aliases_in_root_filters() {
    let fixture = Fixture::new();
    let records = fixture
        .model1(EagerAlgorithm::Join)
        .options(EagerOptions::default().alias("model1Relation2", "mr2"))
        .eager("model1Relation2.model2Relation1")
        .filter(Filter::Equals("mr2:model2Relation1.id".into(), 6.into()))
        .exec()
        .await
        .unwrap();
    assert_eq!(
        to_json(&records),
        json!([with(
            m1(1),
            "model1Relation2",
            json!([with(
                m2(2),
                "model2Relation1",
                json!([with(m1(6), "aliasedExtra", json!("extra 6"))])
            )])
        )])
    );
    assert!(fixture.db.executed()[0].contains("LEFT JOIN model_2 AS mr2 ON Model1.id = mr2.model1Id"));
}

#[tokio::test]
async fn test_model_default_algorithm() {
    let fixture = Fixture::with_catalog(
        Catalog::new()
            .with_model(model1_spec().default_eager(EagerConfig::new(EagerAlgorithm::Join)))
            .with_model(model2_spec()),
    );

    let records = fixture.loader.query("Model1").where_eq("id", 1).eager("model1Relation1").exec().await.unwrap();
    assert_eq!(to_json(&records), json!([with(m1(1), "model1Relation1", m1(2))]));
    assert_eq!(fixture.db.query_count(), 1);

    fixture.db.clear_log();
    fixture
        .loader
        .query("Model1")
        .algorithm(EagerAlgorithm::WhereIn)
        .where_eq("id", 1)
        .eager("model1Relation1")
        .exec()
        .await
        .unwrap();
    assert_eq!(fixture.db.query_count(), 2);
}

#[tokio::test]
async fn test_model_default_algorithm_with_call_options() {
    let fixture = Fixture::with_catalog(
        Catalog::new()
            .with_model(model1_spec().default_eager(EagerConfig::new(EagerAlgorithm::Join)))
            .with_model(model2_spec()),
    );

    let query = || fixture.loader.query("Model1").where_eq("id", 1).eager("model1Relation1");
    assert_eq!(query().explain().unwrap().algorithm, EagerAlgorithm::Join);

    let minimized = query().options(EagerOptions::default().minimize(true));
    assert_eq!(minimized.explain().unwrap().algorithm, EagerAlgorithm::Join);
    let records = minimized.exec().await.unwrap();
    assert_eq!(to_json(&records), json!([with(m1(1), "model1Relation1", m1(2))]));
    assert_eq!(fixture.db.query_count(), 1);
}

#[tokio::test]
async fn test_model_default_options_with_call_algorithm() {
    let fixture = Fixture::with_catalog(
        Catalog::new()
            .with_model(
                model1_spec().default_eager(
                    EagerConfig::new(EagerAlgorithm::Naive)
                        .with_options(EagerOptions::default().max_recursion_depth(2)),
                ),
            )
            .with_model(model2_spec()),
    );

    fixture
        .loader
        .query("Model1")
        .algorithm(EagerAlgorithm::WhereIn)
        .where_eq("id", 1)
        .eager("model1Relation1.^")
        .exec()
        .await
        .unwrap();
    assert_eq!(fixture.db.query_count(), 3);
}

#[tokio::test]
async fn test_load_related() {
    let fixture = Fixture::new();
    let mut roots = RelationQuery::from_table("Model1");
    roots.where_in("id", [1, 6]);
    let rows = fixture.db.run(&roots).unwrap();

    for algorithm in ALGORITHMS {
        let records: Vec<Record> = rows.iter().cloned().map(Record::from_row).collect();
        let loaded = fixture
            .model1(algorithm)
            .eager("[model1Relation1, model1Relation2]")
            .load(records)
            .await
            .unwrap();
        assert_eq!(
            to_json(&loaded),
            json!([
                with(with(m1(1), "model1Relation1", m1(2)), "model1Relation2", json!([m2(1), m2(2)])),
                with(with(m1(6), "model1Relation1", m1(7)), "model1Relation2", json!([m2(3)])),
            ]),
            "algorithm {}",
            algorithm
        );
    }

    let records: Vec<Record> = rows.into_iter().map(Record::from_row).collect();
    let loaded = fixture.loader.load_related("Model1", records, "model1Relation1").await.unwrap();
    assert_eq!(loaded[1].one("model1Relation1").flatten().and_then(|r| r.value("id")), Some(&FilterValue::Int(7)));
}

#[tokio::test]
async fn test_explain() {
    let fixture = Fixture::new();
    let expression = "[model1Relation1.model1Relation1Inverse, model1Relation3]";

    let plan = fixture.model1(EagerAlgorithm::WhereIn).eager(expression).explain().unwrap();
    assert_eq!(
        plan.explain(),
        "where_in plan, 3 steps\n  \
         0: model1Relation1 (Model1.model1Relation1 -> Model1)\n  \
         1: model1Relation3 (Model1.model1Relation3 -> Model2 through Model1Model2)\n    \
         2: model1Relation1.model1Relation1Inverse (Model1.model1Relation1Inverse -> Model1) after 0"
    );

    let plan = fixture.model1(EagerAlgorithm::Naive).eager(expression).explain().unwrap();
    let paths: Vec<String> = plan.steps.iter().map(|step| step.path.to_string()).collect();
    assert_eq!(
        paths,
        vec!["model1Relation1", "model1Relation1.model1Relation1Inverse", "model1Relation3"]
    );
    assert_eq!(plan.steps[2].node.relation.relation_type, RelationType::ManyToMany);
    assert_eq!(fixture.db.query_count(), 0);
}

#[tokio::test]
async fn test_executor_errors_abort_the_load() {
    for algorithm in ALGORITHMS {
        let fixture = Fixture::new();
        fixture.db.fail_on("model_2");
        let err = fixture
            .model1(algorithm)
            .eager("[model1Relation1.model1Relation1, model1Relation2]")
            .exec()
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError, "algorithm {}", algorithm);
        assert!(err.is_execution_error());
        assert!(err.context.sql.is_some());
    }
}

#[tokio::test]
async fn test_unknown_relation() {
    let fixture = Fixture::new();
    for algorithm in ALGORITHMS {
        let err = fixture
            .model1(algorithm)
            .eager("model1Relation1.model1Relation2.nope")
            .exec()
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownRelation);
        assert_eq!(err.context.path.as_deref(), Some("model1Relation1.model1Relation2.nope"));
    }
    assert_eq!(fixture.db.query_count(), 0);
}

#[tokio::test]
async fn test_unknown_filter() {
    let fixture = Fixture::new();
    let err = fixture
        .model1(EagerAlgorithm::WhereIn)
        .eager("model1Relation2(missing)")
        .exec()
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::UnknownFilter);
    assert_eq!(err.context.path.as_deref(), Some("model1Relation2"));
    assert_eq!(fixture.db.query_count(), 0);
}

#[tokio::test]
async fn test_unresolved_modifier_path() {
    let fixture = Fixture::new();
    let err = fixture
        .model1(EagerAlgorithm::WhereIn)
        .eager("model1Relation1")
        .modify_eager("model1Relation2", |q| {
            q.limit(1);
        })
        .exec()
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::UnresolvedPath);
    assert_eq!(err.context.path.as_deref(), Some("model1Relation2"));
}

#[tokio::test]
async fn test_parse_errors() {
    let fixture = Fixture::new();
    for expression in ["model1Relation1.", "[model1Relation1, model1Relation1]", "model1Relation1.^0"] {
        let err = fixture
            .model1(EagerAlgorithm::WhereIn)
            .eager(expression)
            .exec()
            .await
            .unwrap_err();
        assert!(err.is_parse_error(), "{}: {}", expression, err);
        assert!(err.context.expression.is_some());
    }
    assert_eq!(fixture.db.query_count(), 0);
}

#[tokio::test]
async fn test_unknown_model() {
    let fixture = Fixture::new();
    let err = fixture.loader.query("Model3").eager("a").exec().await.unwrap_err();
    assert_eq!(err.code, ErrorCode::UnknownModel);
}

#[test]
fn test_fixture_catalog_is_valid() {
    catalog().validate().unwrap();
}
