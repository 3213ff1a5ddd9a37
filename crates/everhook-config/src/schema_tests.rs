use super::*;

#[test]
fn test_config_defaults() {
    let config = Config::default();
    assert_eq!(config.logging.file, PathBuf::from("log.txt"));
    assert_eq!(config.logging.history_dir, PathBuf::from("LogHistory"));
    assert_eq!(config.logging.history_count_to_keep, 3);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.crash.report_path, PathBuf::from("error_log.txt"));
    assert!(config.modules.disabled.is_empty());
    assert_eq!(config.host.frame_rate, 60);
    assert!(config.host.frame_limit.is_none());
}

#[test]
fn test_retained_history_clamps_negative() {
    let mut logging = LoggingConfig::default();
    logging.history_count_to_keep = -42;
    assert_eq!(logging.retained_history(), 0);
    logging.history_count_to_keep = 5;
    assert_eq!(logging.retained_history(), 5);
}

#[test]
fn test_filter_directive() {
    let mut logging = LoggingConfig::default();
    assert_eq!(logging.filter_directive(), "info");

    logging.level = "warn".to_string();
    logging
        .levels
        .insert("everhook_core::lifecycle".to_string(), "debug".to_string());
    logging
        .levels
        .insert("everhook_core::bus".to_string(), "trace".to_string());
    assert_eq!(
        logging.filter_directive(),
        "warn,everhook_core::bus=trace,everhook_core::lifecycle=debug"
    );
}

#[test]
fn test_module_settings_as_json() {
    let config: Config = toml::from_str(
        r#"
        [modules]
        disabled = ["noisy"]

        [modules.settings.core]
        show_mod_options_in_game = false
        log_history_count_to_keep = 5
        "#,
    )
    .unwrap();

    assert!(config.modules.is_disabled("noisy"));
    assert!(!config.modules.is_disabled("core"));
    let core = config.modules.settings_json("core").unwrap().unwrap();
    assert_eq!(core["show_mod_options_in_game"], serde_json::json!(false));
    assert_eq!(core["log_history_count_to_keep"], serde_json::json!(5));
    assert!(config.modules.settings_json("missing").unwrap().is_none());
    assert_eq!(config.modules.configured(), vec!["core"]);
}

#[test]
fn test_module_settings_must_be_table() {
    let config: Config = toml::from_str(
        r#"
        [modules.settings]
        core = 3
        "#,
    )
    .unwrap();
    let err = config.modules.settings_json("core").unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "modules.settings.core"));
}

#[test]
fn test_config_serialization_round_trip() {
    let mut config = Config::default();
    config.host.frame_limit = Some(120);
    let text = toml::to_string(&config).unwrap();
    let parsed: Config = toml::from_str(&text).unwrap();
    assert_eq!(parsed.host.frame_limit, Some(120));
    assert_eq!(parsed.logging.file, config.logging.file);
}
