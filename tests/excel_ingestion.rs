use std::path::{Path, PathBuf};

use rust_xlsxwriter::Workbook;
use tabular_ingest::config::IngestionConfig;
use tabular_ingest::ingestion::cells::CellStreamRowSource;
use tabular_ingest::ingestion::{
    list_sheet_names, open_row_source, stream_records, FileFormat, IngestionOptions, ReaderKind, RowSource,
};
use tabular_ingest::types::{Record, Value};

fn write_people_xlsx(dir: &Path) -> PathBuf {
    let path = dir.join("people.xlsx");
    let mut wb = Workbook::new();

    let summary = wb.add_worksheet();
    summary.set_name("Summary").unwrap();
    summary.write_string(0, 0, "total").unwrap();
    summary.write_number(1, 0, 2).unwrap();

    let people = wb.add_worksheet();
    people.set_name("People").unwrap();
    // A blank first row: headers start at the first occupied row.
    people.write_string(1, 0, "id").unwrap();
    people.write_string(1, 1, "Full Name").unwrap();
    people.write_string(1, 2, "score").unwrap();
    people.write_string(1, 3, "active").unwrap();

    people.write_number(2, 0, 1).unwrap();
    people.write_string(2, 1, "  Ada ").unwrap();
    people.write_number(2, 2, 98.5).unwrap();
    people.write_boolean(2, 3, true).unwrap();

    people.write_number(4, 0, 2).unwrap();
    people.write_string(4, 1, "Grace").unwrap();
    people.write_number(4, 2, 87.25).unwrap();
    people.write_boolean(4, 3, false).unwrap();

    wb.save(&path).unwrap();
    path
}

fn drain(mut src: Box<dyn RowSource>) -> Vec<Record> {
    std::iter::from_fn(|| src.next_row()).map(Result::unwrap).collect()
}

#[test]
fn sheet_names_in_workbook_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_people_xlsx(dir.path());
    assert_eq!(list_sheet_names(&path).unwrap(), vec!["Summary", "People"]);
}

#[test]
fn small_workbook_uses_in_memory_reader() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_people_xlsx(dir.path());

    let src = open_row_source(&path, Some("People"), &IngestionConfig::default()).unwrap();
    assert_eq!(src.kind(), ReaderKind::InMemoryWorkbook);
    assert_eq!(src.headers(), &["id", "Full Name", "score", "active"]);

    let rows = drain(src);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("Full Name"), Some(&Value::text("Ada")));
    assert_eq!(rows[0].get("id"), Some(&Value::text("1")));
    assert_eq!(rows[1].get("score"), Some(&Value::text("87.25")));
    assert_eq!(rows[1].get("active"), Some(&Value::text("false")));
}

#[test]
fn threshold_routes_to_cell_stream_with_same_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_people_xlsx(dir.path());

    let small = open_row_source(&path, Some("People"), &IngestionConfig::default()).unwrap();
    let config = IngestionConfig {
        xlsx_streaming_threshold_bytes: 0,
        ..IngestionConfig::default()
    };
    let streamed = open_row_source(&path, Some("People"), &config).unwrap();
    assert_eq!(streamed.kind(), ReaderKind::CellStream);
    assert_eq!(streamed.headers(), small.headers());

    assert_eq!(drain(streamed), drain(small));
}

#[test]
fn missing_sheet_falls_back_to_first() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_people_xlsx(dir.path());
    let src = open_row_source(&path, Some("Nope"), &IngestionConfig::default()).unwrap();
    assert_eq!(src.headers(), &["total"]);
    assert_eq!(drain(src)[0].get("total"), Some(&Value::text("2")));
}

#[test]
fn workbook_records_are_converted() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_people_xlsx(dir.path());
    let options = IngestionOptions {
        sheet: Some("People".to_string()),
        ..IngestionOptions::default()
    };
    let records: Vec<Record> = stream_records(&path, &options).unwrap().map(Result::unwrap).collect();
    assert_eq!(records[0].get("id"), Some(&Value::Int64(1)));
    assert_eq!(records[0].get("score"), Some(&Value::Float64(98.5)));
    assert_eq!(records[0].get("active"), Some(&Value::Bool(true)));
}

#[test]
fn cell_stream_reads_tsv() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("items.tsv");
    std::fs::write(&path, "sku\tqty\nA-1\t3\n\t\nB-2\t\n").unwrap();

    let src = open_row_source(&path, None, &IngestionConfig::default()).unwrap();
    assert_eq!(src.kind(), ReaderKind::CellStream);
    let rows = drain(src);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].get("sku"), Some(&Value::text("B-2")));
    assert_eq!(rows[1].get("qty"), Some(&Value::text("")));
}

#[test]
fn cell_stream_dropped_mid_stream_releases_producer() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("many.tsv");
    let mut body = String::from("n\n");
    for i in 0..5_000 {
        body.push_str(&format!("{i}\n"));
    }
    std::fs::write(&path, body).unwrap();

    let mut src = CellStreamRowSource::open(&path, FileFormat::Tsv, None, 4).unwrap();
    for _ in 0..10 {
        src.next_row().unwrap().unwrap();
    }
    drop(src);
    // The file is no longer held open by a parser thread.
    std::fs::remove_file(&path).unwrap();
}
