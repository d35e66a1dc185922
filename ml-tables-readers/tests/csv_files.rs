use std::fs;

use ml_tables_core::{DataType, ElementType, Value};
use ml_tables_readers::{csv, Category, Column, CsvOptions, Enumset};

fn columns(species: &Enumset) -> Vec<Column> {
    vec![
        Column::int("id"),
        Column::float64("score").round(3),
        Column::categorical("species", species, Category::Enum),
        Column::tensor32f("pixels"),
    ]
}

#[test]
fn file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.csv");
    let output = dir.path().join("out.csv");
    fs::write(
        &input,
        "id,score,species,pixels\n1,0.5,cat,1:2:3\n2,,dog,\n3,0.1234,cat,0:0:1\n",
    )
    .unwrap();

    let species = Enumset::new();
    let rows = csv::read_file(&input, &columns(&species));
    let file = fs::File::create(&output).unwrap();
    assert_eq!(csv::write(&rows, file, &columns(&species)).unwrap(), 3);

    assert_eq!(
        fs::read_to_string(&output).unwrap(),
        "id,score,species,pixels\n1,0.5,cat,1:2:3\n2,,dog,\n3,0.123,cat,0:0:1\n"
    );
    assert_eq!(species.values(), vec!["cat", "dog"]);
}

#[test]
fn grouped_features_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.csv");
    let output = dir.path().join("out.csv");
    fs::write(
        &input,
        "id,f1,label,f2,f3\n1,0.5,a,1.5,\n2,,b,,\n3,2,c,0.25,4\n",
    )
    .unwrap();

    let rows = csv::read_file(
        &input,
        &[
            Column::int("id"),
            Column::float32("f*").group("features").unwrap(),
            Column::text("label"),
        ],
    );
    let table = rows.collect().unwrap();
    assert_eq!(table.names(), &["id", "features", "label"]);
    let features = table.column("features").unwrap();
    assert_eq!(features.data_type(), DataType::Tensor(ElementType::Float32));
    assert!(!features.is_na(0) && features.is_na(1) && !features.is_na(2));
    let third = table.row(2).unwrap();
    let tensor = third.tensor("features").unwrap();
    assert_eq!(tensor.shape(), &[3]);
    assert_eq!(tensor.extract(), vec![Value::Float32(2.0), Value::Float32(0.25), Value::Float32(4.0)]);

    let file = fs::File::create(&output).unwrap();
    let written = csv::write(
        &rows,
        file,
        &[
            Column::int("id"),
            Column::float32("features").group("features").unwrap(),
            Column::text("label"),
        ],
    )
    .unwrap();
    assert_eq!(written, 3);
    assert_eq!(
        fs::read_to_string(&output).unwrap(),
        "id,features1,features2,features3,label\n1,0.5,1.5,,a\n2,,,,b\n3,2,0.25,4,c\n"
    );
}

#[test]
fn grouped_pattern_without_match_fails() {
    let rows = csv::read_with(
        || Ok(std::io::Cursor::new("id,x1\n1,2\n")),
        &[Column::int("id"), Column::int("f*").group("f").unwrap()],
        &CsvOptions::default(),
    );
    let err = rows.count().unwrap_err();
    assert!(err.to_string().contains("f*"));
}

#[test]
fn frozen_enumset_rejects_new_category() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.csv");
    fs::write(&input, "label\nyes\nno\nmaybe\n").unwrap();

    let labels = Enumset::from_values(&["yes", "no"]).frozen();
    let rows = csv::read_file(&input, &[Column::categorical("label", &labels, Category::Integer)]);
    let mut seen = Vec::new();
    let err = rows.drain(|r| {
        seen.push(r.int("label")?);
        Ok(())
    });
    assert!(err.is_err());
    assert_eq!(seen, vec![0, 1]);
}

#[test]
fn semicolon_delimited_with_trim() {
    let options = CsvOptions {
        delimiter: b';',
        trim: true,
        ..CsvOptions::default()
    };
    let rows = csv::read_with(
        || Ok(std::io::Cursor::new("a; b\n 1; x \n")),
        &[Column::int("a"), Column::text("b").as_name("name")],
        &options,
    );
    let table = rows.collect().unwrap();
    let row = table.row(0).unwrap();
    assert_eq!(row.value("a").unwrap(), &Value::Int(1));
    assert_eq!(row.text("name").unwrap(), "x");
}

#[test]
fn missing_file_surfaces_io_error() {
    let rows = csv::read_file("/nonexistent/data.csv", &[Column::int("a")]);
    assert!(matches!(rows.count(), Err(ml_tables_core::Error::Io(_))));
}
