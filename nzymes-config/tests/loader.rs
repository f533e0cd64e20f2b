use chrono::{TimeZone, Utc};
use nzymes_config::Loader;
use std::io::Write;

fn toml_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp file");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn user_file_is_layered_over_defaults() {
    let file = toml_file(
        r#"
[engine]
process_after = "2020-01-01T00:00:00Z"
also_process = [3, 4]
slug_kinds = ["post"]
"#,
    );
    let config = Loader::new().with_file(file.path()).build().expect("config");
    assert_eq!(
        config.engine.process_after,
        Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap())
    );
    assert_eq!(config.engine.also_process, vec![3, 4]);
    assert_eq!(config.engine.slug_kinds, vec!["post".to_string()]);
    // untouched keys keep their defaults
    assert_eq!(config.engine.default_priority, 9);
    assert_eq!(config.sandbox.program, "sh");
}

#[test]
fn missing_required_file_is_an_error() {
    let result = Loader::new().with_file("/nonexistent/nzymes.toml").build();
    assert!(result.is_err());
}

#[test]
fn missing_optional_file_is_ignored() {
    let config = Loader::new()
        .with_optional_file("/nonexistent/nzymes.toml")
        .build()
        .expect("config");
    assert_eq!(config.engine.direct_stage, "__nzymes__process");
}
