//! Save pipeline tests against real files.

mod common;

use std::fs;

use common::{ContentFileBuilder, TestHarness};
use recforge::codec::RecordKind;
use recforge::document::{read_document, write_document, GenericRecord};
use recforge::saving::{saving_operation, temp_path_for, MOVED_FROM_TAG};
use recforge::{OperationEvent, SaveError, Severity};

fn base_file() -> ContentFileBuilder {
    ContentFileBuilder::new()
        .global("a", "1")
        .global("b", "2")
        .spell("s", "10")
        .referenceable("chair")
        .cell("Balmora", 3)
        .cell("Caldera", 0)
        .reference("r1", "Balmora", "chair", 1)
}

#[test]
fn test_save_writes_only_changes_and_reloads() {
    let harness = TestHarness::new();
    harness.write("base.json", base_file());
    harness.write(
        "mod.json",
        ContentFileBuilder::new()
            .global("a", "5")
            .global("c", "3")
            .deleted(RecordKind::Global, "b"),
    );

    let document = harness.open(&["base.json", "mod.json"]);
    write_document(&document)
        .unwrap()
        .edit()
        .spells
        .modify("x", GenericRecord::new().with("cost", "4"));

    let run = harness.save(&document);
    assert!(run.succeeded(), "{:?}", run.messages());
    assert!(harness.is_clean(&document));

    let (header, records) = harness.read_file(&harness.path("mod.json"));
    assert_eq!(header.record_count, records.len());
    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c", "x"]);
    assert!(records[1].deleted);
    assert_eq!(header.masters.len(), 1);
    assert_eq!(header.masters[0].name, "base.json");
    assert_eq!(
        header.masters[0].size,
        fs::metadata(harness.path("base.json")).unwrap().len()
    );

    let reloaded = harness.open(&["base.json", "mod.json"]);
    let doc = read_document(&reloaded).unwrap();
    let globals = &doc.data.globals;
    assert_eq!(globals.record("a").unwrap().get().field("value"), Some("5"));
    assert!(!globals.contains_live("b"));
    assert!(globals.contains_live("c"));
    assert!(doc.data.spells.contains_live("x"));
    assert!(!doc.data.spells.record("s").unwrap().is_dirty());
}

#[test]
fn test_moved_reference_is_written_under_new_cell() {
    let harness = TestHarness::new();
    harness.write("base.json", base_file());

    let document = harness.document(&["base.json", "mod.json"], true);
    harness.load(&document);
    {
        let mut doc = write_document(&document).unwrap();
        let mut moved = doc.data.references.record("r1").unwrap().get().clone();
        moved.cell = "Caldera".to_string();
        doc.edit().references.modify("r1", moved);
    }

    let run = harness.save(&document);
    assert!(run.succeeded(), "{:?}", run.messages());

    let (header, records) = harness.read_file(&harness.path("mod.json"));
    assert_eq!(header.record_count, 2);
    assert_eq!(records[0].kind, RecordKind::Cell);
    assert_eq!(records[0].id, "Caldera");
    assert_eq!(records[1].id, "r1");
    assert_eq!(
        records[1].sub(MOVED_FROM_TAG),
        Some(&serde_json::json!("Balmora"))
    );
    assert_eq!(records[1].body["cell"], "Caldera");
    // Caldera's counter starts at 0, so the moved reference gets a fresh number.
    assert_eq!(records[0].body["refNumCounter"], 1);
    assert_eq!(records[1].body["refNum"], 0);
}

#[test]
fn test_project_records_go_to_project_file() {
    let harness = TestHarness::new();
    harness.write("base.json", base_file());

    let document = harness.document(&["base.json", "mod.json"], true);
    harness.load(&document);
    {
        let mut doc = write_document(&document).unwrap();
        let data = doc.edit();
        data.filters
            .modify("project::important", GenericRecord::new().with("query", "x"));
        data.globals.modify("content_global", GenericRecord::new());
    }

    let run = harness.save(&document);
    assert!(run.succeeded());

    let (project_header, project_records) =
        harness.read_file(&harness.path("mod.json.project"));
    assert!(project_header.project);
    assert_eq!(project_records.len(), 1);
    assert_eq!(project_records[0].id, "project::important");

    let (_, content_records) = harness.read_file(&harness.path("mod.json"));
    let ids: Vec<&str> = content_records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["content_global"]);
}

#[test]
fn test_aborted_save_leaves_existing_file_untouched() {
    let harness = TestHarness::new();
    harness.write("base.json", base_file());
    let edited = harness.write("mod.json", ContentFileBuilder::new().global("a", "5"));
    let original = fs::read(&edited).unwrap();

    let document = harness.open(&["base.json", "mod.json"]);
    for i in 0..20 {
        write_document(&document)
            .unwrap()
            .edit()
            .globals
            .modify(&format!("g{}", i), GenericRecord::new());
    }

    let mut operation = saving_operation(document.clone()).unwrap();
    let (tx, rx) = crossbeam_channel::unbounded();
    operation.add_reporter(Box::new(recforge::operation::ChannelReporter::new(tx)));
    operation.run();
    let tmp = temp_path_for(&edited);
    while !tmp.exists() {
        assert!(operation.step());
    }
    operation.step();
    operation.abort();
    while operation.step() {}

    assert!(operation.has_error());
    assert_eq!(fs::read(&edited).unwrap(), original);
    assert!(!tmp.exists());
    let doc = read_document(&document).unwrap();
    assert!(!doc.is_saving());
    assert!(!doc.is_clean());
    assert!(matches!(
        rx.try_iter().last(),
        Some(OperationEvent::Done { failed: true, .. })
    ));
}

#[test]
fn test_failing_stage_discards_temp_file() {
    let harness = TestHarness::new();
    harness.write(
        "base.json",
        base_file()
            .cell("Vivec", 0)
            .reference("last", "Vivec", "chair", u32::MAX),
    );
    let edited = harness.write("mod.json", ContentFileBuilder::new().global("a", "5"));
    let original = fs::read(&edited).unwrap();

    let document = harness.open(&["base.json", "mod.json"]);
    {
        let mut doc = write_document(&document).unwrap();
        let reference = doc.data.references.record("last").unwrap().get().clone();
        doc.edit().references.modify("last", reference);
    }

    let run = harness.save(&document);

    assert!(!run.succeeded());
    let serious: Vec<_> = run
        .messages()
        .into_iter()
        .filter(|m| m.severity == Severity::SeriousError)
        .collect();
    assert_eq!(serious.len(), 1, "{:?}", serious);
    assert!(serious[0].subject.is_none());
    assert!(serious[0].text.contains("Vivec"));
    assert!(matches!(
        run.events.last(),
        Some(OperationEvent::Done { failed: true, .. })
    ));
    assert_eq!(fs::read(&edited).unwrap(), original);
    assert!(!temp_path_for(&edited).exists());
    let doc = read_document(&document).unwrap();
    assert!(!doc.is_saving());
    assert!(!doc.is_clean());
}

#[test]
fn test_second_save_is_refused_while_saving() {
    let harness = TestHarness::new();
    harness.write("base.json", base_file());
    let document = harness.open(&["base.json"]);

    let mut first = saving_operation(document.clone()).unwrap();
    first.run();
    first.step();

    assert!(matches!(
        saving_operation(document.clone()),
        Err(SaveError::AlreadySaving)
    ));

    while first.step() {}
    assert!(saving_operation(document).is_ok());
}
