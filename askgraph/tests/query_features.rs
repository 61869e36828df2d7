use askgraph::{Database, Payload, PropertyValue};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn team_db() -> Database {
    init_logging();
    let db = Database::in_memory();
    for statement in [
        "create person name=\"Alice\", age=30, dept=\"eng\", city=\"Berlin\"",
        "create person name=\"Bob\", age=25, dept=\"eng\", city=\"Paris\"",
        "create person name=\"Carol\", age=35, dept=\"sales\", city=\"Berlin\"",
        "create company name=\"Acme\", size=1000",
        "create company name=\"Tiny\", size=3",
        "connect Alice to Bob as knows",
        "connect Bob to Carol as knows",
        "connect person \"Alice\" to company \"Acme\" as works_at",
    ] {
        let result = db.query(statement);
        assert!(result.success, "seed failed: {statement}: {:?}", result.error);
    }
    db
}

#[test]
fn within_steps_respects_bound_and_excludes_start() {
    let db = team_db();
    let one = db.query("find person within 1 steps of Alice via knows");
    let names: Vec<_> = one.nodes().iter().filter_map(|n| n.name()).collect();
    assert_eq!(names, vec!["Bob"]);

    let two = db.query("find person within 2 steps of Alice via knows");
    let names: Vec<_> = two.nodes().iter().filter_map(|n| n.name()).collect();
    assert_eq!(names, vec!["Bob", "Carol"]);
}

#[test]
fn path_avoiding_an_edge_type() {
    let db = team_db();
    let blocked = db.query("find path from Alice to Carol avoiding knows");
    assert!(blocked.success);
    assert!(blocked.nodes().is_empty());
}

#[test]
fn plural_labels_and_aggregate_verbs() {
    let db = team_db();
    assert_eq!(db.query("count people").count(), Some(3));
    assert_eq!(db.query("avg age of persons").aggregate(), Some(30.0));
    assert_eq!(db.query("highest age of people").aggregate(), Some(35.0));
}

#[test]
fn like_and_string_operators() {
    let db = team_db();
    assert_eq!(db.query("find person where name like \"%ob\"").nodes().len(), 1);
    assert_eq!(
        db.query("find person where name starts with Al").nodes().len(),
        1
    );
    assert_eq!(
        db.query("find person where city contains erl").nodes().len(),
        2
    );
}

#[test]
fn subquery_membership_and_aggregate_comparison() {
    let db = team_db();
    let above_avg = db.query("find person where age > (avg(age) from person)");
    let names: Vec<_> = above_avg.nodes().iter().filter_map(|n| n.name()).collect();
    assert_eq!(names, vec!["Carol"]);

    let engineers = db.query(
        "find person where name in (select name from person where dept = \"eng\")",
    );
    assert_eq!(engineers.nodes().len(), 2);
}

#[test]
fn exists_subquery() {
    let db = team_db();
    let result = db.query("find person where exists (select name from company)");
    // Exists holds for every candidate once the nested query has rows.
    assert_eq!(result.nodes().len(), 3);

    let none = db.query("find person where exists (select name from ghost)");
    assert!(none.nodes().is_empty());
}

#[test]
fn join_by_edge_type_emits_prefixed_records() {
    let db = team_db();
    let result = db.query("join person to company via works_at");
    assert!(result.success);
    let records = result.records();
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].get("source_name"),
        Some(&PropertyValue::String("Alice".into()))
    );
    assert_eq!(
        records[0].get("target_name"),
        Some(&PropertyValue::String("Acme".into()))
    );
}

#[test]
fn join_on_shared_property_with_conditions() {
    let db = team_db();
    let result = db.query("join person with person on city where age > 30");
    // Alice and Carol share Berlin; the condition keeps only targets
    // older than 30, so only the Alice -> Carol pair survives.
    let records = result.records();
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].get("target_name"),
        Some(&PropertyValue::String("Carol".into()))
    );
}

#[test]
fn group_by_having_and_order_by() {
    let db = team_db();
    let groups = db.query("group person by dept having count > 1");
    assert_eq!(groups.records().len(), 1);
    assert_eq!(
        groups.records()[0].get("dept"),
        Some(&PropertyValue::String("eng".into()))
    );

    let ordered = db.query("order person by age desc limit 2");
    let names: Vec<_> = ordered.nodes().iter().filter_map(|n| n.name()).collect();
    assert_eq!(names, vec!["Carol", "Alice"]);
}

#[test]
fn update_edges_and_filter_them() {
    let db = team_db();
    let updated = db.query("update edges type knows set since=2020");
    assert_eq!(updated.count(), Some(2));
    let found = db.query("find edges where since = 2020");
    assert_eq!(found.edges().len(), 2);
}

#[test]
fn batch_runs_every_statement() {
    let db = Database::in_memory();
    let result = db.query(
        "create person name=\"A\"; create person name=\"B\"; count person",
    );
    assert!(result.success);
    match &result.data {
        Some(Payload::Batch(items)) => {
            assert_eq!(items.len(), 3);
            assert!(items.iter().all(|r| r.success));
            assert_eq!(items[2].count(), Some(2));
        }
        other => panic!("expected batch payload, got {other:?}"),
    }
}

#[test]
fn schema_summary_covers_labels_and_edge_types() {
    let db = team_db();
    let result = db.query("show schema");
    match &result.data {
        Some(Payload::Schema(summary)) => {
            let labels: Vec<_> = summary.labels.iter().map(|l| l.label.as_str()).collect();
            assert_eq!(labels, vec!["company", "person"]);
            let person = &summary.labels[1];
            assert_eq!(person.count, 3);
            assert!(person.properties.iter().any(|p| p == "age"));
            let rels: Vec<_> = summary
                .edge_types
                .iter()
                .map(|e| e.rel_type.as_str())
                .collect();
            assert_eq!(rels, vec!["knows", "works_at"]);
        }
        other => panic!("expected schema payload, got {other:?}"),
    }
}

#[test]
fn json_results_serialize() {
    let db = team_db();
    let json = db.query_json("count person").unwrap();
    assert!(json.contains("\"success\":true"));
    assert!(json.contains("\"Count\":3"));
}

#[test]
fn unlisted_plural_passes_through() {
    init_logging();
    let db = Database::in_memory();
    db.query("create wombat name=\"W\"");
    // "wombats" is not in the plural table, so it stays as written
    // and matches nothing.
    assert_eq!(db.query("count wombats").count(), Some(0));
    assert_eq!(db.query("count wombat").count(), Some(1));
}
