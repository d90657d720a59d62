#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Manifest policy tests.
//!
//! These keep Cargo.toml honest: the panic-free lint set, the default
//! feature set and the demo wiring. A failure here means the manifest has
//! drifted from project policy.

use std::path::PathBuf;

fn manifest() -> toml::Table {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml");
    let raw = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read '{}': {e}", path.display()));
    raw.parse::<toml::Table>()
        .unwrap_or_else(|e| panic!("Cargo.toml does not parse: {e}"))
}

fn table<'a>(root: &'a toml::Table, key: &str) -> &'a toml::Table {
    root.get(key)
        .and_then(toml::Value::as_table)
        .unwrap_or_else(|| panic!("Cargo.toml is missing [{key}]"))
}

#[test]
fn package_identity() {
    let manifest = manifest();
    let package = table(&manifest, "package");
    assert_eq!(package["name"].as_str(), Some("pickup-client"));
    assert_eq!(package["edition"].as_str(), Some("2021"));
    let msrv = package["rust-version"]
        .as_str()
        .expect("rust-version must be a string");
    assert!(
        msrv.split('.').count() == 3,
        "rust-version '{msrv}' should be a full major.minor.patch version"
    );
}

#[test]
fn panic_free_lints_are_denied() {
    let manifest = manifest();
    let clippy = table(table(&manifest, "lints"), "clippy");
    for lint in [
        "unwrap_used",
        "expect_used",
        "panic",
        "todo",
        "unimplemented",
        "indexing_slicing",
    ] {
        assert_eq!(
            clippy.get(lint).and_then(toml::Value::as_str),
            Some("deny"),
            "[lints.clippy] must deny `{lint}`"
        );
    }
}

#[test]
fn default_features_ship_both_collaborators() {
    let manifest = manifest();
    let features = table(&manifest, "features");
    let default: Vec<&str> = features["default"]
        .as_array()
        .expect("default features must be an array")
        .iter()
        .filter_map(toml::Value::as_str)
        .collect();
    assert!(default.contains(&"transport-websocket"));
    assert!(default.contains(&"http-config"));
}

#[test]
fn optional_dependencies_are_feature_gated() {
    let manifest = manifest();
    let deps = table(&manifest, "dependencies");
    let features = table(&manifest, "features");
    for (name, feature) in [
        ("tokio-tungstenite", "transport-websocket"),
        ("futures-util", "transport-websocket"),
        ("reqwest", "http-config"),
    ] {
        let dep = deps[name].as_table().expect("dependency table");
        assert_eq!(
            dep.get("optional").and_then(toml::Value::as_bool),
            Some(true),
            "{name} must be optional"
        );
        let enables: Vec<&str> = features[feature]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(toml::Value::as_str)
            .collect();
        assert!(
            enables.contains(&format!("dep:{name}").as_str()),
            "feature `{feature}` must enable dep:{name}"
        );
    }
}

#[test]
fn demos_point_at_existing_files() {
    let manifest = manifest();
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let demos = manifest["example"].as_array().expect("[[example]] entries");
    assert!(!demos.is_empty());
    for demo in demos {
        let path = demo["path"].as_str().expect("example path");
        assert!(path.starts_with("demos/"), "{path} should live under demos/");
        assert!(root.join(path).is_file(), "{path} does not exist");
    }
}
