use sensor_qc::persistence::{load_value, sections, store_value};
use sensor_qc::{JsonPreferences, MapBoundaries, UserPreferences};
use serde_json::json;

#[test]
fn json_store_writes_through_and_reopens() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("alice.json");

    let mut prefs = JsonPreferences::open(&path).unwrap();
    assert!(!path.exists());
    let bounds = MapBoundaries {
        lon_min: 9.0,
        lon_max: 13.0,
        lat_min: 55.0,
        lat_max: 60.0,
    };
    store_value(&mut prefs, sections::MAP, "boundaries", &bounds).unwrap();
    store_value(&mut prefs, sections::PARAMETER_PRIORITY, "profile", &"TEMP").unwrap();
    assert!(path.exists());

    let reopened = JsonPreferences::open(&path).unwrap();
    assert_eq!(
        load_value::<MapBoundaries>(&reopened, sections::MAP, "boundaries"),
        Some(bounds)
    );
    assert_eq!(
        load_value::<String>(&reopened, sections::PARAMETER_PRIORITY, "profile").as_deref(),
        Some("TEMP")
    );
}

#[test]
fn removed_key_is_gone_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bob.json");

    let mut prefs = JsonPreferences::open(&path).unwrap();
    prefs.set(sections::OPTIONS, "zoom_to_data", json!(true)).unwrap();
    prefs.set(sections::OPTIONS, "keep", json!(1)).unwrap();
    prefs.remove(sections::OPTIONS, "zoom_to_data").unwrap();
    // Removing an unknown key is not an error.
    prefs.remove("nothing", "here").unwrap();

    let reopened = JsonPreferences::open(&path).unwrap();
    assert_eq!(reopened.get(sections::OPTIONS, "zoom_to_data"), None);
    assert_eq!(reopened.get(sections::OPTIONS, "keep"), Some(json!(1)));
}

#[test]
fn empty_file_opens_as_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.json");
    std::fs::write(&path, "  \n").unwrap();

    let prefs = JsonPreferences::open(&path).unwrap();
    assert_eq!(prefs.get(sections::OPTIONS, "zoom_to_data"), None);
    assert_eq!(prefs.path(), path.as_path());
}

#[test]
fn corrupt_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(JsonPreferences::open(&path).is_err());
}

#[test]
fn default_path_is_per_user() {
    let a = JsonPreferences::default_path("alice");
    let b = JsonPreferences::default_path("bob");
    assert_ne!(a, b);
    assert!(a.ends_with("sensor-qc/alice.json"));
}
