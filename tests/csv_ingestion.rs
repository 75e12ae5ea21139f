use std::io::Write;

use chrono::{TimeZone, Utc};
use tabular_ingest::ingestion::csv::DelimitedRowSource;
use tabular_ingest::ingestion::{stream_records, IngestionOptions, RowSource, SourceState};
use tabular_ingest::types::{Record, Value};

fn write_csv(contents: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    f
}

fn collect(path: &std::path::Path, options: &IngestionOptions) -> Vec<Record> {
    stream_records(path, options).unwrap().map(Result::unwrap).collect()
}

#[test]
fn name_age_file_keeps_every_partially_filled_row() {
    let f = write_csv("name,age\nAlice,30\nBob,  \n,25\n , \n");
    let records = collect(f.path(), &IngestionOptions::default());

    assert_eq!(records.len(), 3);
    assert_eq!(records[0].get("name"), Some(&Value::text("Alice")));
    assert_eq!(records[0].get("age"), Some(&Value::Int64(30)));
    assert_eq!(records[1].get("name"), Some(&Value::text("Bob")));
    assert_eq!(records[1].get("age"), Some(&Value::text("")));
    assert_eq!(records[2].get("name"), Some(&Value::text("")));
    assert_eq!(records[2].get("age"), Some(&Value::Int64(25)));
}

#[test]
fn fixture_values_are_inferred_per_cell() {
    let records = collect("tests/fixtures/people.csv".as_ref(), &IngestionOptions::default());
    assert_eq!(records.len(), 3);

    let ada = &records[0];
    assert_eq!(
        ada.field_names().collect::<Vec<_>>(),
        vec!["id", "First Name", "score", "active", "tags", "joined"]
    );
    assert_eq!(ada.get("id"), Some(&Value::Int64(1)));
    assert_eq!(ada.get("First Name"), Some(&Value::text("Ada")));
    assert_eq!(ada.get("score"), Some(&Value::Float64(98.5)));
    assert_eq!(ada.get("active"), Some(&Value::Bool(true)));
    assert_eq!(
        ada.get("tags"),
        Some(&Value::Array(vec![Value::text("ml"), Value::text("math")]))
    );
    assert_eq!(
        ada.get("joined"),
        Some(&Value::Date(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()))
    );

    let grace = &records[1];
    assert_eq!(grace.get("score"), Some(&Value::Float64(1234.5)));
    assert_eq!(grace.get("active"), Some(&Value::Bool(false)));
    assert_eq!(grace.get("tags"), Some(&Value::Array(vec![Value::text("navy")])));

    let linus = &records[2];
    assert_eq!(linus.get("score"), Some(&Value::text("")));
    assert_eq!(linus.get("tags"), Some(&Value::text("")));
}

#[test]
fn inference_can_be_switched_off() {
    let mut options = IngestionOptions::default();
    options.config.infer_types = false;
    let records = collect("tests/fixtures/people.csv".as_ref(), &options);
    assert_eq!(records[0].get("id"), Some(&Value::text("1")));
    assert_eq!(records[0].get("active"), Some(&Value::text("true")));
}

#[test]
fn declared_types_win_and_bad_values_keep_raw_text() {
    use tabular_ingest::value_type::ValueType;

    let f = write_csv("zip,amount\n02134,12\n94105,n/a\n");
    let mut options = IngestionOptions::default();
    options.config = options
        .config
        .with_field_type("zip", ValueType::String)
        .with_field_type("amount", ValueType::Number);

    let records = collect(f.path(), &options);
    assert_eq!(records[0].get("zip"), Some(&Value::text("02134")));
    assert_eq!(records[0].get("amount"), Some(&Value::Int64(12)));
    assert_eq!(records[1].get("amount"), Some(&Value::text("n/a")));
}

#[test]
fn row_source_pairs_cells_by_position() {
    let f = write_csv("a,,c\n1,2,3,4\n5\n");
    let mut src = DelimitedRowSource::open(f.path()).unwrap();
    assert_eq!(src.headers(), &["a", "", "c"]);

    let first = src.next_row().unwrap().unwrap();
    assert_eq!(first.field_names().collect::<Vec<_>>(), vec!["a", "c"]);
    assert_eq!(first.get("c"), Some(&Value::text("3")));

    let second = src.next_row().unwrap().unwrap();
    assert_eq!(second.get("a"), Some(&Value::text("5")));
    assert_eq!(second.get("c"), Some(&Value::text("")));

    assert!(src.next_row().is_none());
    assert_eq!(src.state(), SourceState::Streaming);
    src.close();
    assert_eq!(src.state(), SourceState::Closed);
}

#[test]
fn rows_iterator_closes_source_when_exhausted() {
    let f = write_csv("a\n1\n2\n");
    let src: Box<dyn RowSource> = Box::new(DelimitedRowSource::open(f.path()).unwrap());
    let mut rows = src.into_rows();
    assert_eq!(rows.state(), SourceState::Ready);
    assert_eq!(rows.by_ref().count(), 2);
    assert_eq!(rows.state(), SourceState::Closed);
}

#[test]
fn empty_file_has_no_headers_and_no_rows() {
    let f = write_csv("");
    let mut src = DelimitedRowSource::open(f.path()).unwrap();
    assert!(src.headers().is_empty());
    assert!(src.next_row().is_none());
}
