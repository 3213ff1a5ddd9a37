    use super::*;
    use crate::loader::ConfigLoader;

    #[test]
    fn test_validate_default_config() {
        let config = Config::default();
        let result = ConfigValidator::validate(&config).unwrap();
        assert!(result.is_valid());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_validate_invalid_level() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();

        let result = ConfigValidator::validate(&config).unwrap();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.path == "logging.level"));
    }

    #[test]
    fn test_validate_level_is_case_insensitive() {
        let mut config = Config::default();
        config.logging.level = "DEBUG".to_string();

        let result = ConfigValidator::validate(&config).unwrap();
        assert!(result.is_valid());
    }

    #[test]
    fn test_validate_invalid_target_level() {
        let mut config = Config::default();
        config
            .logging
            .levels
            .insert("everhook_core::hook".to_string(), "chatty".to_string());

        let result = ConfigValidator::validate(&config).unwrap();
        assert!(!result.is_valid());
        assert!(
            result
                .errors
                .iter()
                .any(|e| e.path == "logging.levels.everhook_core::hook")
        );
    }

    #[test]
    fn test_validate_negative_history_warning() {
        let mut config = Config::default();
        config.logging.history_count_to_keep = -1;

        let result = ConfigValidator::validate(&config).unwrap();
        assert!(result.is_valid());
        assert!(
            result
                .warnings
                .iter()
                .any(|w| w.path == "logging.history_count_to_keep")
        );
    }

    #[test]
    fn test_validate_empty_report_path() {
        let mut config = Config::default();
        config.crash.report_path = std::path::PathBuf::new();

        let result = ConfigValidator::validate(&config).unwrap();
        assert!(result.errors.iter().any(|e| e.path == "crash.report_path"));
    }

    #[test]
    fn test_validate_duplicate_disabled_warning() {
        let mut config = Config::default();
        config.modules.disabled = vec!["a".to_string(), "b".to_string(), "a".to_string()];

        let result = ConfigValidator::validate(&config).unwrap();
        assert!(result.is_valid());
        assert_eq!(
            result
                .warnings
                .iter()
                .filter(|w| w.path == "modules.disabled")
                .count(),
            1
        );
    }

    #[test]
    fn test_validate_settings_not_a_table() {
        let config = ConfigLoader::load_str(
            r#"
            [modules.settings]
            core = "yes"
            "#,
        )
        .unwrap();

        let result = ConfigValidator::validate(&config).unwrap();
        assert!(result.errors.iter().any(|e| e.path == "modules.settings.core"));
    }

    #[test]
    fn test_validate_settings_for_disabled_module_warning() {
        let config = ConfigLoader::load_str(
            r#"
            [modules]
            disabled = ["core"]

            [modules.settings.core]
            show_mod_options_in_game = true
            "#,
        )
        .unwrap();

        let result = ConfigValidator::validate(&config).unwrap();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.path == "modules.settings.core"));
    }

    #[test]
    fn test_validate_zero_frame_rate() {
        let mut config = Config::default();
        config.host.frame_rate = 0;

        let result = ConfigValidator::validate(&config).unwrap();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.path == "host.frame_rate"));
    }

    #[test]
    fn test_validate_zero_frame_limit_warning() {
        let mut config = Config::default();
        config.host.frame_limit = Some(0);

        let result = ConfigValidator::validate(&config).unwrap();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.path == "host.frame_limit"));
    }
