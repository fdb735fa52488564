//! Integration tests for lazy navigation and resolution.

use std::cell::Cell;
use std::io::Cursor;
use std::rc::Rc;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use stream_model::{
    resolve, stream_model, stream_model_with, ConstructionError, FieldDescriptor, Instance,
    Materializer, PathNode, ResolveError, Schema, SchemaMaterializer, Source, StreamOptions,
    TypeRef,
};

fn counting_schema(aliased: bool) -> Arc<Schema> {
    let mut count = FieldDescriptor::new(TypeRef::integer());
    let mut results = FieldDescriptor::new(TypeRef::sequence(TypeRef::string()));
    if aliased {
        count = count.alias("$count");
        results = results
            .alias("$results")
            .default_factory(|| json!(["a", "b", "c"]));
    }
    Arc::new(
        Schema::builder("Model")
            .record("Model", |r| r.field("count", count).field("results", results))
            .build()
            .unwrap(),
    )
}

fn open(schema: Arc<Schema>, doc: &str) -> PathNode {
    stream_model(schema, Source::from_string(doc), &StreamOptions::default()).unwrap()
}

fn open_forward_only(schema: Arc<Schema>, doc: &str, options: StreamOptions) -> PathNode {
    let source = Source::forward_only(Cursor::new(doc.as_bytes().to_vec()));
    stream_model(schema, source, &options).unwrap()
}

const PLAIN: &str = r#"{"count": 3, "results": ["a", "b", "c"]}"#;

mod idempotence {
    use super::*;

    #[test]
    fn second_resolve_does_no_io() {
        let root = open(counting_schema(false), PLAIN);
        let results = root.field("results").unwrap();
        let first = resolve(&results).unwrap();
        let stats = results.stream_stats();
        let second = resolve(&results).unwrap();
        assert_eq!(first, second);
        assert_eq!(results.stream_stats(), stats);
    }

    struct Counting {
        inner: SchemaMaterializer,
        calls: Rc<Cell<usize>>,
    }

    impl Materializer for Counting {
        fn construct(
            &self,
            schema: &Schema,
            type_ref: &TypeRef,
            raw: Value,
        ) -> Result<Instance, ConstructionError> {
            self.calls.set(self.calls.get() + 1);
            self.inner.construct(schema, type_ref, raw)
        }
    }

    #[test]
    fn materializer_runs_once_per_node() {
        let calls = Rc::new(Cell::new(0));
        let materializer = Counting {
            inner: SchemaMaterializer::new(),
            calls: Rc::clone(&calls),
        };
        let root = stream_model_with(
            counting_schema(false),
            Source::from_string(PLAIN),
            &StreamOptions::default(),
            Box::new(materializer),
        )
        .unwrap();
        let count = root.field("count").unwrap();
        for _ in 0..3 {
            assert_eq!(resolve(&count).unwrap(), json!(3));
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn failure_is_terminal() {
        let root = open(counting_schema(false), r#"{"count": "3", "results": []}"#);
        let count = root.field("count").unwrap();
        let first = resolve(&count).unwrap_err();
        assert!(matches!(first, ResolveError::Construction { .. }));
        assert_eq!(first.exit_code(), 1);
        let second = resolve(&count).unwrap_err();
        assert_eq!(first.to_string(), second.to_string());
    }
}

mod order_independence {
    use super::*;

    #[test]
    fn results_then_count() {
        let root = open(counting_schema(false), PLAIN);
        let results = root.field("results").unwrap();
        assert_eq!(resolve(&results).unwrap(), json!(["a", "b", "c"]));
        let count = root.field("count").unwrap();
        assert_eq!(resolve(&count).unwrap(), json!(3));
        assert_eq!(root.stream_stats().restarts, 1);
    }

    #[test]
    fn count_then_results() {
        let root = open(counting_schema(false), PLAIN);
        let count = root.field("count").unwrap();
        assert_eq!(resolve(&count).unwrap(), json!(3));
        let results = root.field("results").unwrap();
        assert_eq!(resolve(&results).unwrap(), json!(["a", "b", "c"]));
        assert_eq!(root.stream_stats().restarts, 0);
    }

    #[test]
    fn held_siblings_resolve_in_any_order() {
        let schema = Arc::new(
            Schema::builder("Model")
                .record("Pair", |r| r.field("x", FieldDescriptor::new(TypeRef::integer())))
                .record("Model", |r| {
                    r.field("a", FieldDescriptor::new(TypeRef::record("Pair")))
                        .field("b", FieldDescriptor::new(TypeRef::record("Pair")))
                })
                .build()
                .unwrap(),
        );
        let root = open(schema, r#"{"a": {"x": 1}, "b": {"x": 2}}"#);
        let a = root.field("a").unwrap();
        let b = root.field("b").unwrap();

        let a_value = resolve(&a).unwrap();
        let b_value = resolve(&b).unwrap();
        assert_eq!(a_value.record_name(), Some("Pair"));
        assert_eq!(a_value, json!({ "x": 1 }));
        assert_eq!(b_value, json!({ "x": 2 }));
    }

    #[test]
    fn cached_values_survive_rewinds() {
        let root = open(counting_schema(false), PLAIN);
        let results = root.field("results").unwrap();
        let before = resolve(&results).unwrap();
        resolve(&root.field("count").unwrap()).unwrap();
        assert_eq!(resolve(&results).unwrap(), before);
    }

    #[test]
    fn later_field_with_default_is_read_after_rewind() {
        let schema = Arc::new(
            Schema::builder("Model")
                .record("Model", |r| {
                    r.field("a", FieldDescriptor::new(TypeRef::integer()))
                        .field("b", FieldDescriptor::new(TypeRef::integer()))
                        .field("c", FieldDescriptor::new(TypeRef::integer()).default_value(json!(0)))
                })
                .build()
                .unwrap(),
        );
        let root = open(schema, r#"{"a": 1, "b": 2, "c": 5}"#);
        assert_eq!(resolve(&root.field("b").unwrap()).unwrap(), json!(2));
        assert_eq!(resolve(&root.field("a").unwrap()).unwrap(), json!(1));
        assert_eq!(root.stream_stats().restarts, 1);

        let c = root.field("c").unwrap();
        assert!(!c.is_detached());
        assert_eq!(resolve(&c).unwrap(), json!(5));
    }

    #[test]
    fn restart_does_not_hide_fields_without_default() {
        let root = open(counting_schema(false), PLAIN);
        assert_eq!(resolve(&root.field("results").unwrap()).unwrap(), json!(["a", "b", "c"]));
        assert_eq!(resolve(&root.field("count").unwrap()).unwrap(), json!(3));
        let results = root.field("results").unwrap();
        assert!(!results.is_detached());
        assert_eq!(resolve(&results).unwrap(), json!(["a", "b", "c"]));
    }
}

mod aliases {
    use super::*;

    #[test]
    fn logical_name_reaches_wire_key() {
        let root = open(counting_schema(true), r#"{"$count": 3, "$results": ["a", "b", "c"]}"#);
        let count = root.field("count").unwrap();
        assert_eq!(count.location(), "/count");
        assert_eq!(resolve(&count).unwrap(), json!(3));
    }

    #[test]
    fn wire_name_is_not_a_field() {
        let root = open(counting_schema(true), r#"{"$count": 3}"#);
        match root.field("$count").unwrap_err() {
            ResolveError::UnknownField { path, field } => {
                assert_eq!(path, "");
                assert_eq!(field, "$count");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn nested_alias_chain() {
        let schema = Arc::new(
            Schema::builder("Model")
                .record("Leaf", |r| r.field("a", FieldDescriptor::new(TypeRef::string()).alias("$a")))
                .record("Inner", |r| {
                    r.field("b", FieldDescriptor::new(TypeRef::record("Leaf")).alias("$b"))
                })
                .record("Outer", |r| {
                    r.field("c", FieldDescriptor::new(TypeRef::record("Inner")).alias("$c"))
                })
                .record("Model", |r| {
                    r.field("root", FieldDescriptor::new(TypeRef::record("Outer")).alias("$root"))
                })
                .build()
                .unwrap(),
        );
        let root = open(schema, r#"{"$root": {"$c": {"$b": {"$a": "heeeey"}}}}"#);
        let leaf = root
            .field("root")
            .and_then(|n| n.field("c"))
            .and_then(|n| n.field("b"))
            .and_then(|n| n.field("a"))
            .unwrap();
        assert_eq!(resolve(&leaf).unwrap(), json!("heeeey"));
        assert_eq!(root.pointer("/root/c/b/a").unwrap().location(), "/root/c/b/a");
    }

    #[test]
    fn whole_document_uses_logical_names() {
        let root = open(counting_schema(true), r#"{"$count": 3, "$results": ["x"]}"#);
        let model = resolve(&root).unwrap();
        assert_eq!(model.record_name(), Some("Model"));
        assert_eq!(model, json!({ "count": 3, "results": ["x"] }));
    }
}

mod defaults {
    use super::*;

    #[test]
    fn absent_field_uses_default_factory() {
        let root = open(counting_schema(true), r#"{"$count": 3}"#);
        let count = root.field("count").unwrap();
        assert_eq!(resolve(&count).unwrap(), json!(3));
        let results = root.field("results").unwrap();
        assert!(results.is_detached());
        assert_eq!(resolve(&results).unwrap(), json!(["a", "b", "c"]));
        assert_eq!(root.stream_stats().restarts, 0);
    }

    #[test]
    fn second_absent_field_after_closed_object_uses_default() {
        let schema = Arc::new(
            Schema::builder("Model")
                .record("Model", |r| {
                    r.field("count", FieldDescriptor::new(TypeRef::integer()))
                        .field(
                            "label",
                            FieldDescriptor::new(TypeRef::string()).default_value(json!("none")),
                        )
                        .field(
                            "tags",
                            FieldDescriptor::new(TypeRef::sequence(TypeRef::string()))
                                .default_value(json!([])),
                        )
                })
                .build()
                .unwrap(),
        );
        let root = open(schema, r#"{"count": 3}"#);
        assert!(root.field("label").unwrap().is_detached());
        let tags = root.field("tags").unwrap();
        assert!(tags.is_detached());
        assert_eq!(resolve(&tags).unwrap(), json!([]));
        assert_eq!(resolve(&root.field("count").unwrap()).unwrap(), json!(3));
    }

    #[test]
    fn passed_field_with_default_does_not_rewind() {
        let root = open(counting_schema(true), r#"{"$results": ["x"], "$count": 3}"#);
        resolve(&root.field("count").unwrap()).unwrap();
        let results = root.field("results").unwrap();
        assert!(results.is_detached());
        assert_eq!(resolve(&results).unwrap(), json!(["a", "b", "c"]));
        assert_eq!(root.stream_stats().restarts, 0);
    }

    #[test]
    fn default_on_forward_only_stream() {
        let options = StreamOptions::new().allow_rewind(false);
        let root = open_forward_only(counting_schema(true), r#"{"$count": 3}"#, options);
        assert_eq!(resolve(&root.field("count").unwrap()).unwrap(), json!(3));
        assert_eq!(resolve(&root.field("results").unwrap()).unwrap(), json!(["a", "b", "c"]));
    }

    #[test]
    fn detached_children_need_their_own_default() {
        let schema = Arc::new(
            Schema::builder("Model")
                .record("Meta", |r| {
                    r.field("version", FieldDescriptor::new(TypeRef::integer()))
                        .field(
                            "label",
                            FieldDescriptor::new(TypeRef::string()).default_value(json!("none")),
                        )
                })
                .record("Model", |r| {
                    r.field(
                        "meta",
                        FieldDescriptor::new(TypeRef::record("Meta"))
                            .default_value(json!({ "version": 1 })),
                    )
                })
                .build()
                .unwrap(),
        );
        let root = open(schema, "{}");
        let meta = root.field("meta").unwrap();
        assert!(meta.is_detached());
        assert_eq!(resolve(&meta).unwrap(), json!({ "version": 1, "label": "none" }));

        let label = meta.field("label").unwrap();
        assert_eq!(resolve(&label).unwrap(), json!("none"));

        match meta.field("version").unwrap_err() {
            ResolveError::Configuration { path } => assert_eq!(path, "/meta/version"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn required_field_missing_from_document() {
        let root = open(counting_schema(false), r#"{"results": []}"#);
        let err = root.field("count").unwrap_err();
        assert!(matches!(err, ResolveError::Stream { .. }));
        assert_eq!(err.path(), "/count");
        assert_eq!(err.exit_code(), 2);
    }
}

mod shapes {
    use super::*;

    fn union_schema() -> Arc<Schema> {
        Arc::new(
            Schema::builder("Model")
                .record("A", |r| r.field("a", FieldDescriptor::new(TypeRef::string())))
                .record("B", |r| r.field("b", FieldDescriptor::new(TypeRef::integer())))
                .record("Model", |r| {
                    r.field(
                        "values",
                        FieldDescriptor::new(TypeRef::sequence(TypeRef::union([
                            TypeRef::record("A"),
                            TypeRef::record("B"),
                        ]))),
                    )
                    .field(
                        "single",
                        FieldDescriptor::new(TypeRef::union([TypeRef::record("A"), TypeRef::record("B")]))
                            .default_value(Value::Null),
                    )
                })
                .build()
                .unwrap(),
        )
    }

    const VALUES: &str = r#"{"values": [{"a": "hi"}, {"b": 256}, {"a": "bye"}]}"#;

    #[test]
    fn integer_key_on_record_is_not_sequence() {
        let root = open(counting_schema(false), PLAIN);
        assert!(matches!(root.index(0), Err(ResolveError::NotSequence { .. })));
        let count = root.field("count").unwrap();
        assert!(matches!(count.index(0), Err(ResolveError::NotSequence { .. })));
    }

    #[test]
    fn union_without_sequence_member_is_not_sequence() {
        let root = open(union_schema(), VALUES);
        match root.field("single").unwrap().index(0).unwrap_err() {
            ResolveError::NotSequence { path } => assert_eq!(path, "/single"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn union_elements_are_narrowed_in_order() {
        let root = open(union_schema(), VALUES);
        let values = resolve(&root.field("values").unwrap()).unwrap();
        let names: Vec<Option<&str>> = (0..3)
            .map(|i| values.index(i).and_then(Instance::record_name))
            .collect();
        assert_eq!(names, [Some("A"), Some("B"), Some("A")]);
        assert_eq!(values, json!([{ "a": "hi" }, { "b": 256 }, { "a": "bye" }]));
    }

    #[test]
    fn union_member_with_all_defaults_does_not_swallow_others() {
        let schema = Arc::new(
            Schema::builder("Model")
                .record("A", |r| {
                    r.field("a", FieldDescriptor::new(TypeRef::string()).default_value(json!("")))
                })
                .record("B", |r| r.field("b", FieldDescriptor::new(TypeRef::integer())))
                .record("Model", |r| {
                    r.field(
                        "values",
                        FieldDescriptor::new(TypeRef::sequence(TypeRef::union([
                            TypeRef::record("A"),
                            TypeRef::record("B"),
                        ]))),
                    )
                })
                .build()
                .unwrap(),
        );
        let root = open(schema, r#"{"values": [{"b": 256}, {"a": "hi"}, {}]}"#);
        let values = resolve(&root.field("values").unwrap()).unwrap();
        let names: Vec<Option<&str>> = (0..3)
            .map(|i| values.index(i).and_then(Instance::record_name))
            .collect();
        assert_eq!(names, [Some("B"), Some("A"), Some("A")]);
        assert_eq!(values, json!([{ "b": 256 }, { "a": "hi" }, { "a": "" }]));
    }

    #[test]
    fn union_field_lookup_picks_declaring_member() {
        let root = open(union_schema(), VALUES);
        let b = root.pointer("/values/1/b").unwrap();
        assert_eq!(b.type_ref(), TypeRef::integer());
        assert_eq!(resolve(&b).unwrap(), json!(256));
    }

    #[test]
    fn sequence_of_strings_by_index() {
        let schema = Arc::new(
            Schema::builder("Model")
                .record("Model", |r| {
                    r.field("a", FieldDescriptor::new(TypeRef::sequence(TypeRef::string())))
                })
                .build()
                .unwrap(),
        );
        let root = open(schema, r#"{"a": ["x", "y", "z"]}"#);
        assert_eq!(resolve(&root.field("a").unwrap().index(1).unwrap()).unwrap(), json!("y"));
    }

    #[test]
    fn mapping_entries_by_key() {
        let schema = Arc::new(
            Schema::builder("Model")
                .record("Model", |r| {
                    r.field("scores", FieldDescriptor::new(TypeRef::mapping(TypeRef::integer())))
                })
                .build()
                .unwrap(),
        );
        let root = open(schema, r#"{"scores": {"x": 1, "y": 2}}"#);
        assert_eq!(resolve(&root.pointer("/scores/y").unwrap()).unwrap(), json!(2));
        assert_eq!(resolve(&root.pointer("/scores/x").unwrap()).unwrap(), json!(1));
    }

    #[test]
    fn index_out_of_range() {
        let root = open(counting_schema(false), PLAIN);
        let err = root.pointer("/results/7").unwrap_err();
        assert_eq!(err.path(), "/results/7");
        assert!(matches!(err, ResolveError::Stream { .. }));
    }

    #[test]
    fn resolve_as_typed_struct() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Model {
            count: i64,
            results: Vec<String>,
        }
        let root = open(counting_schema(false), PLAIN);
        let model: Model = root.resolve_as().unwrap();
        assert_eq!(
            model,
            Model {
                count: 3,
                results: vec!["a".into(), "b".into(), "c".into()]
            }
        );
    }
}

mod rewind_disabled {
    use super::*;

    #[test]
    fn forward_only_stream_propagates_transient_access() {
        let root = open_forward_only(counting_schema(false), PLAIN, StreamOptions::default());
        assert!(!root.rewind_enabled());
        resolve(&root.field("results").unwrap()).unwrap();
        match root.field("count").unwrap_err() {
            ResolveError::TransientAccess { path } => assert_eq!(path, "/count"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn option_disables_rewind_on_seekable_stream() {
        let options = StreamOptions::new().allow_rewind(false);
        let root = stream_model(counting_schema(false), Source::from_string(PLAIN), &options).unwrap();
        assert!(!root.rewind_enabled());
        root.field("results").unwrap();
        assert!(matches!(
            root.field("count"),
            Err(ResolveError::TransientAccess { .. })
        ));
    }

    #[test]
    fn untouched_root_resolves_without_rewind() {
        let root = open_forward_only(counting_schema(false), PLAIN, StreamOptions::default());
        assert_eq!(resolve(&root).unwrap(), json!({ "count": 3, "results": ["a", "b", "c"] }));
    }

    #[test]
    fn consumed_root_cannot_resolve_without_rewind() {
        let root = open_forward_only(counting_schema(false), PLAIN, StreamOptions::default());
        resolve(&root.field("count").unwrap()).unwrap();
        assert!(matches!(
            resolve(&root),
            Err(ResolveError::TransientAccess { .. })
        ));
    }
}
