use askgraph::Database;
use tempfile::tempdir;

#[test]
fn mutations_flush_and_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("graph.json");

    {
        let db = Database::open(&path).unwrap();
        assert!(db.query("create person name=\"Alice\", age=30").success);
        assert!(db.query("create person name=\"Bob\", age=20").success);
        assert!(db.query("connect Alice to Bob as knows").success);
    }

    let db = Database::open(&path).unwrap();
    assert_eq!(db.query("count person").count(), Some(2));
    assert_eq!(db.query("find edges type knows").edges().len(), 1);
    let path_result = db.query("find path from Alice to Bob");
    assert_eq!(path_result.nodes().len(), 2);
}

#[test]
fn delete_cascade_is_persisted() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("graph.json");

    {
        let db = Database::open(&path).unwrap();
        db.query("create person name=\"Alice\"");
        db.query("create person name=\"Bob\"");
        db.query("connect Alice to Bob as knows");
        assert!(db.query("delete node Alice").success);
    }

    let db = Database::open(&path).unwrap();
    assert_eq!(db.query("count person").count(), Some(1));
    assert!(db.query("find edges").edges().is_empty());
}

#[test]
fn missing_snapshot_starts_empty() {
    let dir = tempdir().unwrap();
    let db = Database::open(dir.path().join("fresh.json")).unwrap();
    assert_eq!(db.query("count person").count(), Some(0));
}

#[test]
fn corrupt_snapshot_fails_to_open() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "this is not json").unwrap();
    assert!(Database::open(&path).is_err());
}

#[test]
fn explicit_save_reports_target() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("graph.json");
    let db = Database::open(&path).unwrap();
    db.query("create person name=\"Alice\"");
    let report = db.save().unwrap();
    assert!(report.ok);
    assert!(path.exists());
}

#[test]
fn variables_are_not_persisted() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("graph.json");

    {
        let db = Database::open(&path).unwrap();
        db.query("define variable role = \"dev\"");
        db.query("create person name=\"Alice\", role=\"$role\"");
    }

    let db = Database::open(&path).unwrap();
    // The substituted property survived; the variable itself did not.
    assert_eq!(db.query("find person where role = \"dev\"").nodes().len(), 1);
    assert!(db.query("find person where role = $role").nodes().is_empty());
}
