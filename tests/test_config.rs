//! Tests for fit-option loading and validation.

use std::io::Write;

use neural_factories::config::{load_fit_options, FitOptions};
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_populated_options() {
    let file = write_config(
        r#"{
            "batch_size": 32,
            "epochs": 10,
            "shuffle": true,
            "validation_split": 0.2,
            "early_stopping_patience": 3,
            "early_stopping_min_delta": 0.001
        }"#,
    );

    let options = load_fit_options(file.path().to_str().unwrap()).unwrap();
    assert_eq!(options.batch_size, Some(32));
    assert_eq!(options.epochs, Some(10));
    assert_eq!(options.shuffle, Some(true));
    assert_eq!(options.early_stopping_patience, Some(3));
    assert!(!options.is_empty());
}

#[test]
fn empty_object_is_the_empty_mapping() {
    let file = write_config("{}");
    let options = load_fit_options(file.path().to_str().unwrap()).unwrap();
    assert!(options.is_empty());
    assert_eq!(options, FitOptions::default());
}

#[test]
fn partial_options_leave_the_rest_unset() {
    let file = write_config(r#"{ "batch_size": 16 }"#);
    let options = load_fit_options(file.path().to_str().unwrap()).unwrap();
    assert_eq!(options.batch_size, Some(16));
    assert_eq!(options.epochs, None);
    assert_eq!(options.validation_split, None);
}

#[test]
fn rejects_zero_batch_size() {
    let file = write_config(r#"{ "batch_size": 0 }"#);
    let err = load_fit_options(file.path().to_str().unwrap()).unwrap_err();
    assert!(err.to_string().contains("batch_size"));
}

#[test]
fn rejects_out_of_range_validation_split() {
    let file = write_config(r#"{ "validation_split": 1.5 }"#);
    assert!(load_fit_options(file.path().to_str().unwrap()).is_err());
}

#[test]
fn rejects_malformed_json() {
    let file = write_config("{ batch_size: }");
    assert!(load_fit_options(file.path().to_str().unwrap()).is_err());
}

#[test]
fn rejects_missing_file() {
    assert!(load_fit_options("/nonexistent/fit_options.json").is_err());
}
