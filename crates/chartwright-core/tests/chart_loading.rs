//! Loading chart directories from disk

use chartwright_core::{Chart, CoreError, MergePolicy, ValueNode, Values};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn create_chart(root: &Path) {
    write(
        root,
        "Chart.yaml",
        r#"apiVersion: v2
name: shop
version: 1.4.0
appVersion: "2.0"
dependencies:
  - name: redis
    version: 17.x
    condition: redis.enabled
"#,
    );
    write(
        root,
        "values.yaml",
        "replicas: 2\nglobal:\n  env: dev\nredis:\n  enabled: true\n  maxMemory: 64mb\n",
    );
    write(root, "templates/service.yaml", "kind: Service\n");
    write(root, "templates/deployment.yaml", "kind: Deployment\n");
    write(root, "templates/_helpers.tpl", "{{ define \"x\" }}x{{ end }}\n");
    write(root, "templates/NOTES.txt", "installed\n");
    write(root, "templates/extra/config.yaml", "kind: ConfigMap\n");
    write(root, "templates/README.md", "ignored\n");

    let redis = root.join("charts/redis");
    write(&redis, "Chart.yaml", "name: redis\nversion: 17.3.2\n");
    write(&redis, "values.yaml", "maxMemory: 32mb\nport: 6379\n");
    write(&redis, "templates/statefulset.yaml", "kind: StatefulSet\n");
}

#[test]
fn test_load_chart_directory() {
    let dir = TempDir::new().unwrap();
    create_chart(dir.path());

    let chart = Chart::load(dir.path()).unwrap();

    assert_eq!(chart.name(), "shop");
    assert_eq!(chart.metadata.version.to_string(), "1.4.0");
    assert_eq!(chart.metadata.app_version.as_deref(), Some("2.0"));
    assert_eq!(chart.values.get("replicas"), Some(&ValueNode::Int(2)));

    let paths: Vec<&str> = chart.templates.iter().map(|t| t.path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            "templates/NOTES.txt",
            "templates/_helpers.tpl",
            "templates/deployment.yaml",
            "templates/extra/config.yaml",
            "templates/service.yaml",
        ]
    );

    assert_eq!(chart.subcharts.len(), 1);
    assert_eq!(chart.subcharts[0].name(), "redis");
    assert_eq!(chart.subcharts[0].templates[0].path, "templates/statefulset.yaml");
}

#[test]
fn test_loaded_chart_resolves_values() {
    let dir = TempDir::new().unwrap();
    create_chart(dir.path());
    let chart = Chart::load(dir.path()).unwrap();

    let overrides = Values::from_yaml("global:\n  env: prod\nredis:\n  port: 7000\n").unwrap();
    let resolved = chart.resolve(&overrides, MergePolicy::Strict).unwrap();

    let redis = resolved.subchart("redis").unwrap();
    assert_eq!(redis.values.get("maxMemory"), Some(&ValueNode::from("64mb")));
    assert_eq!(redis.values.get("port"), Some(&ValueNode::Int(7000)));
    assert_eq!(redis.values.get("global.env"), Some(&ValueNode::from("prod")));
    assert_eq!(resolved.values.get("global.env"), Some(&ValueNode::from("prod")));
}

#[test]
fn test_disabled_dependency_is_not_resolved() {
    let dir = TempDir::new().unwrap();
    create_chart(dir.path());
    let chart = Chart::load(dir.path()).unwrap();

    let overrides = Values::from_yaml("redis:\n  enabled: false\n").unwrap();
    let resolved = chart.resolve(&overrides, MergePolicy::Strict).unwrap();
    assert!(resolved.subcharts.is_empty());
}

#[test]
fn test_missing_chart_directory() {
    let dir = TempDir::new().unwrap();
    let err = Chart::load(dir.path().join("nope")).unwrap_err();
    assert!(matches!(err, CoreError::ChartNotFound { .. }));
}

#[test]
fn test_missing_chart_yaml() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "values.yaml", "a: 1\n");
    let err = Chart::load(dir.path()).unwrap_err();
    assert!(matches!(err, CoreError::InvalidChart { .. }));
}

#[test]
fn test_non_mapping_values_file_rejected() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "Chart.yaml", "name: bad\nversion: 0.1.0\n");
    write(dir.path(), "values.yaml", "- just\n- a list\n");
    let err = Chart::load(dir.path()).unwrap_err();
    assert!(matches!(err, CoreError::InvalidValues { .. }));
}
