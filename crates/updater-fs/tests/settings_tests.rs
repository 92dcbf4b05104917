use pretty_assertions::assert_eq;
use serde_json::{Map, Value, json};
use std::fs;
use tempfile::TempDir;
use updater_fs::{Error, FileSettingsStore, SettingsStore};

fn launcher_defaults() -> Map<String, Value> {
    let mut defaults = Map::new();
    defaults.insert("minecraft_dir".into(), json!("data/.minecraft"));
    defaults.insert("max_ram".into(), json!("4096"));
    defaults.insert("username".into(), json!("Player"));
    defaults
}

#[test]
fn test_open_missing_file_is_empty() {
    let temp = TempDir::new().unwrap();
    let store = FileSettingsStore::open(temp.path().join("config.json")).unwrap();

    assert!(store.values().is_empty());
    assert!(!temp.path().join("config.json").exists());
}

#[test]
fn test_open_or_init_writes_defaults() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.json");

    let store = FileSettingsStore::open_or_init(&path, launcher_defaults()).unwrap();

    assert!(path.exists());
    assert_eq!(store.get("max_ram"), Some(json!("4096")));

    let on_disk: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk["username"], json!("Player"));
}

#[test]
fn test_open_or_init_keeps_existing_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.json");
    fs::write(&path, r#"{"username": "Steve"}"#).unwrap();

    let store = FileSettingsStore::open_or_init(&path, launcher_defaults()).unwrap();

    assert_eq!(store.get("username"), Some(json!("Steve")));
    assert!(store.get("max_ram").is_none());
}

#[test]
fn test_json_set_persist_reload() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.json");

    let mut store = FileSettingsStore::open(&path).unwrap();
    store.set("update.source", json!("github:owner/launcher@main"));
    store.set("update.require_confirmation", json!(true));
    store.persist().unwrap();

    let reloaded = FileSettingsStore::open(&path).unwrap();
    assert_eq!(
        reloaded.get("update.source"),
        Some(json!("github:owner/launcher@main"))
    );
    assert_eq!(reloaded.get("update.require_confirmation"), Some(json!(true)));
}

#[test]
fn test_toml_set_persist_reload() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("updater.toml");

    let mut store = FileSettingsStore::open(&path).unwrap();
    store.set("update.local_root", json!("/opt/launcher"));
    store.set("update.timeout_secs", json!(45));
    store.persist().unwrap();

    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains("[update]"), "got:\n{content}");
    assert!(content.contains("/opt/launcher"));

    let reloaded = FileSettingsStore::open(&path).unwrap();
    assert_eq!(reloaded.get("update.local_root"), Some(json!("/opt/launcher")));
    assert_eq!(reloaded.get("update.timeout_secs"), Some(json!(45)));
}

#[test]
fn test_toml_dotted_keys_read_as_written() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("updater.toml");
    fs::write(
        &path,
        "update.source = \"github:king/launcher\"\nupdate.local_root = \"/opt/l\"\n",
    )
    .unwrap();

    let store = FileSettingsStore::open(&path).unwrap();

    assert_eq!(store.get("update.source"), Some(json!("github:king/launcher")));
    assert_eq!(store.get("update.local_root"), Some(json!("/opt/l")));
}

#[test]
fn test_toml_table_section_and_update_in_place() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("updater.toml");
    fs::write(
        &path,
        "username = \"Steve\"\n\n[update]\nsource = \"github:king/launcher\"\nexclude = [\"update_temp\", \"saves\"]\n",
    )
    .unwrap();

    let mut store = FileSettingsStore::open(&path).unwrap();
    assert_eq!(store.get("update.exclude"), Some(json!(["update_temp", "saves"])));

    store.set("update.source", json!("github:king/launcher@dev"));
    store.persist().unwrap();

    let reloaded = FileSettingsStore::open(&path).unwrap();
    assert_eq!(
        reloaded.get("update.source"),
        Some(json!("github:king/launcher@dev"))
    );
    assert_eq!(reloaded.get("username"), Some(json!("Steve")));
    assert!(reloaded.values().get("update.source").is_none());
}

#[test]
fn test_json_keeps_literal_dotted_keys() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.json");

    let mut store = FileSettingsStore::open(&path).unwrap();
    store.set("update.source", json!("github:king/launcher"));
    store.persist().unwrap();

    let on_disk: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk["update.source"], json!("github:king/launcher"));
}

#[test]
fn test_json_nested_object_is_found() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.json");
    fs::write(&path, r#"{"update": {"require_confirmation": true}}"#).unwrap();

    let store = FileSettingsStore::open(&path).unwrap();

    assert_eq!(store.get("update.require_confirmation"), Some(json!(true)));
}

#[test]
fn test_invalid_json_reports_parse_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.json");
    fs::write(&path, "{ not json").unwrap();

    let err = FileSettingsStore::open(&path).unwrap_err();
    assert!(matches!(err, Error::SettingsParse { .. }));
}

#[test]
fn test_unsupported_extension() {
    let temp = TempDir::new().unwrap();
    let err = FileSettingsStore::open(temp.path().join("config.yaml")).unwrap_err();
    assert!(matches!(err, Error::UnsupportedFormat { .. }));
}
