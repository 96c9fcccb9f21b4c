use proptest::prelude::*;
use serde_json::{json, Map, Value};

use kyroref::{EdgeKey, EntitySchema, EntityStore, SchemaMap};

const IDS: usize = 4;

#[derive(Debug, Clone)]
enum Op {
    UpsertArticle {
        id: usize,
        author: Option<Option<usize>>,
        comments: Option<Vec<(usize, bool)>>,
        related: Option<Vec<usize>>,
    },
    UpsertComment {
        id: usize,
        commenter: Option<Option<usize>>,
    },
    Delete {
        schema: &'static str,
        id: usize,
    },
}

fn schemas() -> SchemaMap {
    SchemaMap::new()
        .entity("users", EntitySchema::new())
        .entity("comments", EntitySchema::new().one("commenter", "users"))
        .entity(
            "articles",
            EntitySchema::new()
                .one("author", "users")
                .many("comments", "comments")
                .many("related", "articles"),
        )
}

fn key(prefix: &str, n: usize) -> String {
    format!("{prefix}{n}")
}

fn arb_one() -> impl Strategy<Value = Option<Option<usize>>> {
    prop_oneof![
        Just(None),
        Just(Some(None)),
        (0..IDS).prop_map(|n| Some(Some(n))),
    ]
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (
            0..IDS,
            arb_one(),
            prop::option::of(prop::collection::vec((0..IDS, any::<bool>()), 0..4)),
            prop::option::of(prop::collection::vec(0..IDS, 0..3)),
        )
            .prop_map(|(id, author, comments, related)| Op::UpsertArticle {
                id,
                author,
                comments,
                related,
            }),
        (0..IDS, arb_one()).prop_map(|(id, commenter)| Op::UpsertComment { id, commenter }),
        (
            prop_oneof![Just("users"), Just("comments"), Just("articles")],
            0..IDS
        )
            .prop_map(|(schema, id)| Op::Delete { schema, id }),
    ]
}

fn one_value(target: &str, value: Option<usize>) -> Value {
    value.map_or(Value::Null, |n| json!(key(target, n)))
}

fn apply(store: &EntityStore, op: &Op) -> EntityStore {
    match op {
        Op::UpsertArticle {
            id,
            author,
            comments,
            related,
        } => {
            let mut data = Map::new();
            data.insert("id".to_string(), json!(key("a", *id)));
            if let Some(author) = author {
                data.insert("author".to_string(), one_value("u", *author));
            }
            if let Some(comments) = comments {
                let items = comments
                    .iter()
                    .map(|(n, nested)| {
                        if *nested {
                            json!({"id": key("c", *n), "commenter": key("u", *n)})
                        } else {
                            json!(key("c", *n))
                        }
                    })
                    .collect();
                data.insert("comments".to_string(), Value::Array(items));
            }
            if let Some(related) = related {
                let items = related.iter().map(|n| json!(key("a", *n))).collect();
                data.insert("related".to_string(), Value::Array(items));
            }
            store.upsert_one("articles", &Value::Object(data)).unwrap()
        }
        Op::UpsertComment { id, commenter } => {
            let mut data = Map::new();
            data.insert("id".to_string(), json!(key("c", *id)));
            if let Some(commenter) = commenter {
                data.insert("commenter".to_string(), one_value("u", *commenter));
            }
            store.upsert_one("comments", &Value::Object(data)).unwrap()
        }
        Op::Delete { schema, id } => {
            let prefix = &schema[..1];
            store.delete_one(schema, &key(prefix, *id)).unwrap()
        }
    }
}

/// Every id held in a reference field has a matching edge, and every edge
/// is backed by an id held in the source field.
fn assert_consistent(store: &EntityStore) -> Result<(), TestCaseError> {
    for (schema, references) in store.schema_references().iter() {
        let Some(by_id) = store.entities().schema(schema) else {
            continue;
        };
        for (id, entity) in by_id.iter() {
            for reference in references {
                let source = EdgeKey::new(schema, id.as_str(), reference.via_field.as_str());
                for target in reference.referenced_ids(entity.get(&reference.via_field)) {
                    prop_assert!(
                        store
                            .references_to(&reference.to_schema, &target)
                            .contains(&source),
                        "missing edge {} -> {}#{}",
                        source,
                        reference.to_schema,
                        target
                    );
                }
            }
        }
    }

    for (target, edges) in store.entity_references().iter() {
        for (source, edge) in edges {
            let entity = store.entities().get(&source.schema, &source.id);
            prop_assert!(entity.is_some(), "edge from unstored entity {}", source);
            let Some(entity) = entity else {
                continue;
            };

            let reference = store
                .schema_references()
                .references_for(&source.schema)
                .and_then(|refs| refs.iter().find(|r| r.via_field == source.field));
            prop_assert!(reference.is_some(), "edge from undeclared field {}", source);
            let Some(reference) = reference else {
                continue;
            };

            prop_assert_eq!(&reference.to_schema, &target.schema);
            prop_assert_eq!(reference.relation_type, edge.relation_type);
            prop_assert!(
                reference
                    .referenced_ids(entity.get(&source.field))
                    .contains(&target.id),
                "stale edge {} -> {}",
                source,
                target
            );
        }
    }
    Ok(())
}

proptest! {
    #[test]
    fn graph_matches_entities_after_every_transition(ops in prop::collection::vec(arb_op(), 0..40)) {
        let mut store = EntityStore::new(schemas()).unwrap();
        for op in &ops {
            let previous = store.clone();
            store = apply(&store, op);
            assert_consistent(&store)?;
            // The previous snapshot is never modified by a transition.
            assert_consistent(&previous)?;
        }
    }

    #[test]
    fn repeating_an_upsert_changes_nothing(ops in prop::collection::vec(arb_op(), 1..20)) {
        let mut store = EntityStore::new(schemas()).unwrap();
        for op in &ops {
            store = apply(&store, op);
            if matches!(op, Op::Delete { .. }) {
                continue;
            }
            let again = apply(&store, op);
            prop_assert_eq!(&again, &store);
        }
    }
}
