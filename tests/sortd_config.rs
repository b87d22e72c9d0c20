use std::sync::Mutex;

use tempfile::NamedTempFile;

use ecosort::config::SortdConfig;
use ecosort::Category;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SORTD_CONFIG",
        "SORTD_DB_PATH",
        "SORTD_API_ADDR",
        "SORTD_THRESHOLD",
        "SORTD_RETENTION_SECS",
        "SORTD_SIMULATE",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let toml = r#"
        db_path = "ecosort_prod.db"
        threshold = 0.6

        [api]
        addr = "0.0.0.0:9100"

        [retention]
        seconds = 43200

        [simulate]
        enabled = true
        fps = 12

        [[classes]]
        id = 0
        name = "bag"
        category = "inorganic"

        [[classes]]
        id = 1
        name = "banana_peel"
        category = "organic"
    "#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");

    std::env::set_var("SORTD_CONFIG", file.path());
    std::env::set_var("SORTD_THRESHOLD", "0.8");
    std::env::set_var("SORTD_RETENTION_SECS", "86400");

    let cfg = SortdConfig::load().expect("load config");

    assert_eq!(cfg.db_path, "ecosort_prod.db");
    assert_eq!(cfg.api_addr, "0.0.0.0:9100");
    // Environment wins over the file.
    assert_eq!(cfg.threshold, 0.8);
    assert_eq!(cfg.retention.as_secs(), 86400);
    assert!(cfg.simulate.enabled);
    assert_eq!(cfg.simulate.fps, 12);
    assert_eq!(cfg.classes.len(), 2);
    assert_eq!(cfg.classes[0].class_name, "bag");
    assert_eq!(cfg.classes[0].category, Category::Inorganic);
    assert_eq!(cfg.classes[1].category, Category::Organic);

    clear_env();
}

#[test]
fn defaults_apply_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = SortdConfig::load().expect("load config");

    assert_eq!(cfg.db_path, "ecosort.db");
    assert_eq!(cfg.api_addr, "127.0.0.1:8960");
    assert_eq!(cfg.threshold, 0.75);
    assert_eq!(cfg.retention.as_secs(), 60 * 60 * 24 * 7);
    assert!(!cfg.simulate.enabled);
    // The observed six-class waste catalog ships as the sample default.
    assert_eq!(cfg.classes.len(), 6);
    let catalog = cfg.catalog().expect("default catalog is valid");
    assert_eq!(catalog.names_for(Category::Organic).len(), 3);
    assert_eq!(catalog.names_for(Category::Inorganic).len(), 3);

    clear_env();
}

#[test]
fn rejects_threshold_outside_unit_interval() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SORTD_THRESHOLD", "1.5");
    assert!(SortdConfig::load().is_err());

    clear_env();
}

#[test]
fn rejects_catalog_with_duplicate_ids() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let toml = r#"
        [[classes]]
        id = 3
        name = "can"
        category = "inorganic"

        [[classes]]
        id = 3
        name = "bottle"
        category = "inorganic"
    "#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");
    std::env::set_var("SORTD_CONFIG", file.path());

    assert!(SortdConfig::load().is_err());

    clear_env();
}
