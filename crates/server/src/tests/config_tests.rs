use super::*;

use std::{
    collections::HashMap,
    env,
    time::{SystemTime, UNIX_EPOCH},
};

fn temp_root(label: &str) -> PathBuf {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    env::temp_dir().join(format!("event_bot_{label}_{suffix}"))
}

fn no_env(_key: &str) -> Option<String> {
    None
}

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
    assert_eq!(normalize_database_url("sqlite:data/bot.db"), "sqlite://data/bot.db");
    assert_eq!(normalize_database_url("  "), Settings::default().database_url);
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
}

#[test]
fn keeps_windows_absolute_path_with_single_sqlite_colon() {
    assert_eq!(
        normalize_database_url("sqlite:C:\\Users\\alice\\test.db"),
        "sqlite:C:/Users/alice/test.db"
    );
    assert_eq!(
        normalize_database_url("C:\\Users\\alice\\test.db"),
        "sqlite:C:/Users/alice/test.db"
    );
    assert_eq!(
        normalize_database_url("sqlite://C:/Users/alice/test.db"),
        "sqlite:C:/Users/alice/test.db"
    );
}

#[test]
fn creates_parent_dir_for_sqlite_url() {
    let root = temp_root("config");
    let db_path = root.join("data").join("test.db");

    prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare db url");
    assert!(root.join("data").exists());

    fs::remove_dir_all(root).expect("cleanup");
}

#[test]
fn file_settings_are_overridden_by_environment() {
    let root = temp_root("settings");
    fs::create_dir_all(&root).expect("temp root");
    let path = root.join(CONFIG_FILE);
    fs::write(
        &path,
        "bind_addr = \"0.0.0.0:9000\"\nadmin_ids = [10, 11]\nqr_min_size = 320\n",
    )
    .expect("write settings");

    let from_file = load_settings_from(&path, no_env);
    assert_eq!(from_file.server_bind, "0.0.0.0:9000");
    assert_eq!(from_file.admin_ids, vec![10, 11]);
    assert_eq!(from_file.qr_min_size, 320);
    assert_eq!(from_file.database_url, Settings::default().database_url);

    let vars = HashMap::from([
        ("APP__BIND_ADDR", "127.0.0.1:7000"),
        ("DATABASE_URL", "sqlite://./other.db"),
        ("APP__ADMIN_IDS", " 5, x ,6,"),
        ("APP__QR_MIN_SIZE", "big"),
    ]);
    let overridden = load_settings_from(&path, |key| vars.get(key).map(|v| v.to_string()));
    assert_eq!(overridden.server_bind, "127.0.0.1:7000");
    assert_eq!(overridden.database_url, "sqlite://./other.db");
    assert_eq!(overridden.admin_ids, vec![5, 6]);
    assert_eq!(overridden.qr_min_size, 320);
    assert!(overridden.admin_ids().contains(&UserId(5)));

    fs::remove_dir_all(root).expect("cleanup");
}

#[test]
fn missing_or_malformed_file_falls_back_to_defaults() {
    let root = temp_root("malformed");
    fs::create_dir_all(&root).expect("temp root");
    let path = root.join(CONFIG_FILE);

    assert_eq!(load_settings_from(&path, no_env), Settings::default());

    fs::write(&path, "admin_ids = \"everyone\"").expect("write settings");
    assert_eq!(load_settings_from(&path, no_env), Settings::default());

    fs::remove_dir_all(root).expect("cleanup");
}

#[tokio::test]
async fn prepared_database_url_creates_openable_sqlite_file() {
    let root = temp_root("open");
    let db_path = root.join("nested").join("bot.db");

    let prepared = prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare");
    let storage = storage::Storage::new(&prepared).await.expect("open sqlite");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should be created: {}",
        db_path.display()
    );

    fs::remove_dir_all(root).expect("cleanup");
}
