//! Load engine and multi-table import behavior against SQLite.

mod common;

use std::sync::{Arc, Mutex};

use common::{config, dump, row, sqlite, write};
use rowferry::core::TableName;
use rowferry::orchestrator::{Phase, RunStatus};
use rowferry::{
    copy, ColumnMapping, FileFormat, Importer, LoadOptions, LoadSink, Sink, TableDef, TableList,
};
use tokio_util::sync::CancellationToken;

const PARENT_CHILD: &str = "
    CREATE TABLE parent (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
    CREATE TABLE child (
        id INTEGER PRIMARY KEY,
        parent_id INTEGER NOT NULL REFERENCES parent(id),
        note TEXT
    );";

#[test]
fn test_batch_isolation() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path(), FileFormat::Csv);
    config.transfer.batch_size = 10;
    let file = write(
        dir.path(),
        "parent.csv",
        "id,name\n1,one\n2,two\n3,\\N\n4,four\n5,five\n",
    );

    let mut conn = sqlite(dir.path(), "app.db", PARENT_CHILD);
    let table = TableDef::new(TableName::new("parent"), file);
    let result = Importer::new(&config).import_table(&mut conn, &table).unwrap();

    assert!(!result.success);
    assert_eq!(result.counters.written, 4);
    assert_eq!(result.counters.failed, 1);
    assert_eq!(result.counters.unknown(), 0);
    assert_eq!(result.failures.len(), 1);
    assert!(result.failures[0].starts_with("row 3: "), "{}", result.failures[0]);
    assert!(result.failures[0].contains("NOT NULL"));

    assert_eq!(
        dump(&mut conn, "SELECT id FROM parent ORDER BY id"),
        vec![
            row(&[Some("1")]),
            row(&[Some("2")]),
            row(&[Some("4")]),
            row(&[Some("5")]),
        ]
    );
}

#[test]
fn test_conversion_failure_fails_only_that_row() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), FileFormat::Csv);
    let file = write(dir.path(), "parent.csv", "id,name\n1,a\nx,b\n3,c\n");

    let mut conn = sqlite(dir.path(), "app.db", PARENT_CHILD);
    let table = TableDef::new(TableName::new("parent"), file);
    let result = Importer::new(&config).import_table(&mut conn, &table).unwrap();

    assert_eq!(result.counters.written, 2);
    assert_eq!(result.counters.failed, 1);
    assert!(result.failures[0].starts_with("row 2: column id:"));
}

#[test]
fn test_sync_gating() {
    let csv = "@kind,id,name\nU,1,changed\nD,2,\\N\nI,3,new\nC,4,plain\n";

    // Sync off: update and delete rows are ignored
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), FileFormat::Csv);
    let file = write(dir.path(), "parent.csv", csv);
    let mut conn = sqlite(
        dir.path(),
        "app.db",
        &format!("{} INSERT INTO parent VALUES (1, 'a'), (2, 'b');", PARENT_CHILD),
    );
    let table = TableDef::new(TableName::new("parent"), file.clone());
    let result = Importer::new(&config).import_table(&mut conn, &table).unwrap();
    assert!(result.success);
    assert_eq!(result.counters.written, 2);
    assert_eq!(result.counters.ignored, 2);
    assert_eq!(
        dump(&mut conn, "SELECT id, name FROM parent ORDER BY id"),
        vec![
            row(&[Some("1"), Some("a")]),
            row(&[Some("2"), Some("b")]),
            row(&[Some("3"), Some("new")]),
            row(&[Some("4"), Some("plain")]),
        ]
    );

    // Sync only: changes are applied, plain current rows are ignored
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::config(dir.path(), FileFormat::Csv);
    config.transfer.apply_sync = true;
    config.transfer.apply_import = false;
    let file = write(dir.path(), "parent.csv", csv);
    let mut conn = sqlite(
        dir.path(),
        "app.db",
        &format!("{} INSERT INTO parent VALUES (1, 'a'), (2, 'b');", PARENT_CHILD),
    );
    let table = TableDef::new(TableName::new("parent"), file);
    let result = Importer::new(&config).import_table(&mut conn, &table).unwrap();
    assert!(result.success, "{:?}", result.failures);
    assert_eq!(result.counters.written, 3);
    assert_eq!(result.counters.ignored, 1);
    assert_eq!(
        dump(&mut conn, "SELECT id, name FROM parent ORDER BY id"),
        vec![
            row(&[Some("1"), Some("changed")]),
            row(&[Some("3"), Some("new")]),
        ]
    );
}

#[test]
fn test_sync_needs_primary_key() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path(), FileFormat::Csv);
    config.transfer.apply_sync = true;
    let file = write(dir.path(), "log.csv", "@kind,msg\nI,hello\nU,bye\n");

    let mut conn = sqlite(dir.path(), "app.db", "CREATE TABLE log (msg TEXT);");
    let table = TableDef::new(TableName::new("log"), file);
    let result = Importer::new(&config).import_table(&mut conn, &table).unwrap();

    assert!(!result.success);
    assert_eq!(result.counters.written, 1);
    assert_eq!(result.counters.failed, 1);
    assert!(result.failures[0].contains("no primary key"), "{}", result.failures[0]);
}

#[test]
fn test_sync_needs_key_columns_in_input() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path(), FileFormat::Csv);
    config.transfer.apply_sync = true;
    let file = write(
        dir.path(),
        "parent.csv",
        "@kind,name\nI,alpha\nU,beta\nD,gamma\nC,delta\n",
    );

    let mut conn = sqlite(dir.path(), "app.db", PARENT_CHILD);
    let table = TableDef::new(TableName::new("parent"), file);
    let result = Importer::new(&config).import_table(&mut conn, &table).unwrap();

    assert!(!result.success);
    assert_eq!(result.counters.seen, 4);
    assert_eq!(result.counters.written, 2);
    assert_eq!(result.counters.failed, 2);
    assert_eq!(result.counters.ignored, 0);
    assert_eq!(result.failures.len(), 2);
    assert!(result
        .failures
        .iter()
        .all(|f| f.contains("primary key column(s) id missing from input")));
    assert_eq!(
        dump(&mut conn, "SELECT name FROM parent ORDER BY id"),
        vec![row(&[Some("alpha")]), row(&[Some("delta")])]
    );
}

#[test]
fn test_mapping_by_ordinal_and_skip_unmatched() {
    let dir = tempfile::tempdir().unwrap();
    let mut conn = sqlite(dir.path(), "app.db", PARENT_CHILD);

    let file = write(dir.path(), "by_pos.csv", "a,b\n1,x\n");
    let mut options = LoadOptions {
        mapping: ColumnMapping::ByOrdinal,
        ..Default::default()
    };
    let mut source = rowferry::codec::open_source(&file, FileFormat::Csv, &Default::default());
    let mut sink = LoadSink::new(&mut conn, TableName::new("parent"), options);
    let counters = copy(source.as_mut(), &mut sink).unwrap();
    assert_eq!(counters.written, 1);

    let file = write(dir.path(), "extra.csv", "ID,Name,color\n2,y,red\n");
    options.mapping = ColumnMapping::ByName;
    let mut source = rowferry::codec::open_source(&file, FileFormat::Csv, &Default::default());
    let mut sink = LoadSink::new(&mut conn, TableName::new("parent"), options);
    let err = copy(source.as_mut(), &mut sink).unwrap_err();
    assert!(err.to_string().contains("color"), "{}", err);

    options.skip_unmatched = true;
    let mut source = rowferry::codec::open_source(&file, FileFormat::Csv, &Default::default());
    let mut sink = LoadSink::new(&mut conn, TableName::new("parent"), options);
    let counters = copy(source.as_mut(), &mut sink).unwrap();
    assert_eq!(counters.written, 1);
    assert!(sink.failures().is_empty());

    assert_eq!(
        dump(&mut conn, "SELECT id, name FROM parent ORDER BY id"),
        vec![row(&[Some("1"), Some("x")]), row(&[Some("2"), Some("y")])]
    );
}

fn parent_child_files(dir: &std::path::Path) {
    write(dir, "parent.csv", "id,name\n1,p1\n2,p2\n");
    write(dir, "child.csv", "id,parent_id,note\n10,1,a\n11,2,\\N\n12,2,c\n");
}

#[test]
fn test_delete_then_load_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path(), FileFormat::Csv);
    config.transfer.delete_before_load = true;
    parent_child_files(dir.path());

    let mut conn = sqlite(
        dir.path(),
        "app.db",
        &format!(
            "{} INSERT INTO parent VALUES (1, 'old'), (9, 'stale');
             INSERT INTO child VALUES (90, 9, 'stale');",
            PARENT_CHILD
        ),
    );
    let tables = TableList::resolve(&mut conn, &config).unwrap();
    assert_eq!(tables.names(), vec!["parent", "child"]);

    let first = Importer::new(&config).import_all(&mut conn, &tables).unwrap();
    assert!(first.is_success(), "{}", first.summary());
    let snapshot = (
        dump(&mut conn, "SELECT * FROM parent ORDER BY id"),
        dump(&mut conn, "SELECT * FROM child ORDER BY id"),
    );
    assert_eq!(snapshot.0.len(), 2);
    assert_eq!(snapshot.1.len(), 3);
    assert_eq!(first.tables[0].deleted, Some(2));
    assert_eq!(first.tables[1].deleted, Some(1));

    let second = Importer::new(&config).import_all(&mut conn, &tables).unwrap();
    assert!(second.is_success(), "{}", second.summary());
    assert_eq!(
        (
            dump(&mut conn, "SELECT * FROM parent ORDER BY id"),
            dump(&mut conn, "SELECT * FROM child ORDER BY id"),
        ),
        snapshot
    );
}

#[test]
fn test_delete_respects_filter() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path(), FileFormat::Csv);
    config.transfer.delete_before_load = true;
    config.tables.manifest = Some("tables.txt".into());
    write(dir.path(), "tables.txt", "parent, parent.csv, id > 1\n");
    write(dir.path(), "parent.csv", "id,name\n2,two\n");

    let mut conn = sqlite(
        dir.path(),
        "app.db",
        &format!("{} INSERT INTO parent VALUES (1, 'keep'), (2, 'old');", PARENT_CHILD),
    );
    let tables = TableList::resolve(&mut conn, &config).unwrap();
    let report = Importer::new(&config).import_all(&mut conn, &tables).unwrap();
    assert!(report.is_success());
    assert_eq!(
        dump(&mut conn, "SELECT id, name FROM parent ORDER BY id"),
        vec![row(&[Some("1"), Some("keep")]), row(&[Some("2"), Some("two")])]
    );
}

#[test]
fn test_table_failure_does_not_stop_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), FileFormat::Csv);
    // child.csv is missing
    write(dir.path(), "parent.csv", "id,name\n1,p1\n");

    let mut conn = sqlite(dir.path(), "app.db", PARENT_CHILD);
    let mut tables = TableList::new();
    for name in ["child", "parent"] {
        let file = dir.path().join("data").join(format!("{}.csv", name));
        tables.push(TableDef::new(TableName::new(name), file)).unwrap();
    }

    let report = Importer::new(&config).import_all(&mut conn, &tables).unwrap();
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.failed_tables, vec!["child"]);
    assert_eq!(report.tables_success, 1);
    assert!(report.tables[0].error.is_some());
    assert_eq!(report.summary(), "import failed for 1 of 2 table(s)");
    assert_eq!(dump(&mut conn, "SELECT id FROM parent"), vec![row(&[Some("1")])]);
}

#[test]
fn test_malformed_document_fails_only_its_table() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), FileFormat::Json);
    write(
        dir.path(),
        "a.json",
        r#"{"columns":[{"ordinal":1,"name":"id","sql_type":"i64"}],"rows":[{"values":[1,2]}]}"#,
    );
    write(
        dir.path(),
        "b.json",
        r#"{"columns":[{"ordinal":1,"name":"id","sql_type":"i64"},{"ordinal":2,"name":"name","sql_type":"text"}],
            "rows":[{"values":[1,"bee"]},{"values":[2,null]}]}"#,
    );

    let mut conn = sqlite(
        dir.path(),
        "app.db",
        "CREATE TABLE a (id INTEGER PRIMARY KEY);
         CREATE TABLE b (id INTEGER PRIMARY KEY, name TEXT);",
    );
    let mut tables = TableList::new();
    for name in ["a", "b"] {
        let file = dir.path().join("data").join(format!("{}.json", name));
        tables.push(TableDef::new(TableName::new(name), file)).unwrap();
    }

    let report = Importer::new(&config).import_all(&mut conn, &tables).unwrap();
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.failed_tables, vec!["a"]);
    assert!(report.tables[0]
        .error
        .as_deref()
        .unwrap()
        .contains("row 1 has 2 values, expected 1"));
    assert!(report.tables[1].success);
    assert_eq!(report.tables[1].counters.written, 2);
    assert_eq!(report.error().unwrap().exit_code(), 2);
    assert_eq!(
        dump(&mut conn, "SELECT id, name FROM b ORDER BY id"),
        vec![row(&[Some("1"), Some("bee")]), row(&[Some("2"), None])]
    );
}

#[test]
fn test_progress_and_cancellation() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path(), FileFormat::Csv);
    config.transfer.delete_before_load = true;
    parent_child_files(dir.path());

    let mut conn = sqlite(dir.path(), "app.db", PARENT_CHILD);
    let tables = TableList::resolve(&mut conn, &config).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let updates = Arc::clone(&seen);
    let report = Importer::new(&config)
        .with_progress(move |p| updates.lock().unwrap().push((p.phase, p.percent)))
        .import_all(&mut conn, &tables)
        .unwrap();
    assert!(report.is_success());

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 4);
    assert_eq!(seen[0].0, Phase::Delete);
    assert_eq!(seen[2].0, Phase::Load);
    assert!(seen.windows(2).all(|w| w[0].1 <= w[1].1));
    assert!((seen[1].1 - 10.0).abs() < 1e-9);
    assert!((seen[3].1 - 100.0).abs() < 1e-9);

    let token = CancellationToken::new();
    token.cancel();
    let report = Importer::new(&config)
        .with_cancellation(token)
        .import_all(&mut conn, &tables)
        .unwrap();
    assert_eq!(report.status, RunStatus::Cancelled);
    assert!(report.tables.is_empty());
    assert_eq!(report.error().unwrap().exit_code(), 4);
}
