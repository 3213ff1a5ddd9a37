use super::*;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use everhook_core::{HostRuntime, Kernel};
use everhook_il::Value;
use everhook_protocols::ModuleState;
use serde_json::json;
use tempfile::TempDir;

use crate::host::{self, DemoHost, SCRIPTING_ASSEMBLY};

struct Setup {
    kernel: Arc<Kernel>,
    host: DemoHost,
    _temp: TempDir,
    history: PathBuf,
}

fn setup(settings: Option<serde_json::Value>) -> Setup {
    let temp = TempDir::new().unwrap();
    let history = temp.path().join("LogHistory");
    let runtime = Arc::new(HostRuntime::new());
    let counters = host::define(&runtime).unwrap();
    let kernel = Arc::new(Kernel::new(runtime, temp.path().to_path_buf()));
    kernel
        .register_module(Box::new(CoreModule::new(history.clone(), 3)))
        .unwrap();
    if let Some(settings) = settings {
        kernel.lifecycle().set_settings(CORE_MODULE_ID, settings);
    }
    let host = DemoHost::new(Arc::clone(&kernel), counters, 10);
    Setup {
        kernel,
        host,
        _temp: temp,
        history,
    }
}

fn seed_history(dir: &Path, count: usize) {
    fs::create_dir_all(dir).unwrap();
    for day in 1..=count {
        fs::write(dir.join(format!("log_2024-01-{day:02}_12-00-00.txt")), "").unwrap();
    }
}

fn labels(buttons: &[MenuButton]) -> Vec<&str> {
    buttons.iter().map(|b| b.label.as_str()).collect()
}

#[test]
fn test_culling_guard_skips_offscreen_spikes() {
    let s = setup(None);
    assert!(s.kernel.boot().unwrap().is_empty());

    // Columns 7, 8 and 9 are off screen.
    s.host.frame().unwrap();
    assert_eq!(s.host.draws(), 7);

    s.kernel.shutdown().unwrap();
    s.host.frame().unwrap();
    assert_eq!(s.host.draws(), 17);
}

#[test]
fn test_culling_can_be_disabled() {
    let s = setup(Some(json!({ "cull_spikes": false })));
    s.kernel.boot().unwrap();

    s.host.frame().unwrap();
    assert_eq!(s.host.draws(), 10);
    assert!(!s.kernel.runtime().is_redirected(&methods::render()));
}

#[test]
fn test_get_types_is_redirected() {
    let s = setup(None);
    let call = || {
        s.kernel.runtime().invoke(
            &methods::get_extension_methods(),
            &[Value::Int(SCRIPTING_ASSEMBLY)],
        )
    };

    let err = call().unwrap_err();
    assert_eq!(err.type_name, "ReflectionTypeLoadException");

    s.kernel.boot().unwrap();
    let types = call().unwrap();
    assert_eq!(types.as_str(), Some("Scripting.Lua,Scripting.TypeExtensions"));

    let body = s
        .kernel
        .hooks()
        .effective_body(&methods::get_extension_methods())
        .unwrap();
    assert!(
        body.instructions()
            .any(|i| i.match_call("Scripting.Extensions", "GetTypesSafe"))
    );
    assert!(
        !body
            .instructions()
            .any(|i| i.match_callvirt(methods::ASSEMBLY, "GetTypes"))
    );

    s.kernel.shutdown().unwrap();
    assert!(call().is_err());
}

#[test]
fn test_redirect_without_match_is_a_no_op() {
    let s = setup(Some(json!({ "cull_spikes": false })));
    s.kernel.boot().unwrap();
    // Render has no GetTypes call; the rewrite leaves it alone.
    let handle = s
        .kernel
        .hooks()
        .install_il(&methods::render(), redirect_get_types)
        .unwrap();
    s.host.frame().unwrap();
    assert_eq!(s.host.draws(), 10);
    s.kernel.hooks().remove(&handle).unwrap();
}

#[test]
fn test_main_menu_button_after_options() {
    let s = setup(None);
    s.kernel.boot().unwrap();

    let menu = s.host.main_menu().unwrap();
    assert_eq!(
        labels(&menu.buttons),
        vec![
            "menu_begin",
            "menu_options",
            MOD_OPTIONS_LABEL,
            "menu_credits",
            "menu_exit"
        ]
    );
    assert_eq!(menu.buttons[2].icon.as_deref(), Some(MOD_OPTIONS_ICON));
}

#[test]
fn test_main_menu_button_without_options() {
    let mut menu = MainMenuButtons {
        buttons: vec![
            MenuButton::new("menu_begin").with_icon("menu/start"),
            // Same label, different icon: not the options button.
            MenuButton::new("menu_options").with_icon("menu/other"),
            MenuButton::new("menu_exit").with_icon("menu/exit"),
        ],
    };
    add_main_menu_button(&mut menu);
    assert_eq!(
        labels(&menu.buttons),
        vec!["menu_begin", "menu_options", MOD_OPTIONS_LABEL, "menu_exit"]
    );

    let mut empty = MainMenuButtons::default();
    add_main_menu_button(&mut empty);
    assert_eq!(labels(&empty.buttons), vec![MOD_OPTIONS_LABEL]);
}

#[test]
fn test_pause_menu_button() {
    let s = setup(None);
    s.kernel.boot().unwrap();

    let menu = s.host.pause_menu(true).unwrap();
    assert_eq!(
        labels(&menu.items),
        vec![
            "menu_pause_resume",
            "menu_pause_options",
            PAUSE_MOD_OPTIONS_LABEL,
            "menu_pause_savequit"
        ]
    );

    let mut no_options = PauseMenuButtons {
        items: vec![MenuButton::new("menu_pause_resume")],
        minimal: true,
    };
    add_pause_menu_button(&mut no_options);
    assert_eq!(
        labels(&no_options.items),
        vec!["menu_pause_resume", PAUSE_MOD_OPTIONS_LABEL]
    );
}

#[test]
fn test_pause_menu_button_hidden_by_setting() {
    let s = setup(Some(json!({ "show_mod_options_in_game": false })));
    s.kernel.boot().unwrap();

    let menu = s.host.pause_menu(false).unwrap();
    assert!(menu.position(PAUSE_MOD_OPTIONS_LABEL).is_none());
    // The title screen still gets its button.
    assert!(s.host.main_menu().unwrap().position(MOD_OPTIONS_LABEL, None).is_some());
}

#[test]
fn test_pause_menu_setting_applies_after_boot() {
    let s = setup(None);
    s.kernel.boot().unwrap();
    assert!(s.host.pause_menu(false).unwrap().position(PAUSE_MOD_OPTIONS_LABEL).is_some());

    s.kernel
        .lifecycle()
        .reload_settings(CORE_MODULE_ID, json!({ "show_mod_options_in_game": false }))
        .unwrap();
    assert!(s.host.pause_menu(false).unwrap().position(PAUSE_MOD_OPTIONS_LABEL).is_none());

    s.kernel
        .lifecycle()
        .reload_settings(CORE_MODULE_ID, json!({ "show_mod_options_in_game": true }))
        .unwrap();
    assert!(s.host.pause_menu(false).unwrap().position(PAUSE_MOD_OPTIONS_LABEL).is_some());
    // The reload neither adds nor drops subscriptions.
    assert_eq!(s.kernel.bus().owned_by(CORE_MODULE_ID).len(), 2);
}

#[test]
fn test_load_prunes_log_history() {
    let s = setup(None);
    seed_history(&s.history, 5);

    s.kernel.boot().unwrap();

    let mut left: Vec<_> = fs::read_dir(&s.history)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    left.sort();
    assert_eq!(
        left,
        vec![
            "log_2024-01-03_12-00-00.txt",
            "log_2024-01-04_12-00-00.txt",
            "log_2024-01-05_12-00-00.txt",
        ]
    );
}

#[test]
fn test_history_count_setting_overrides_and_clamps() {
    let s = setup(Some(json!({ "log_history_count_to_keep": -42 })));
    seed_history(&s.history, 4);

    s.kernel.boot().unwrap();

    assert_eq!(fs::read_dir(&s.history).unwrap().count(), 0);
    let keep = s
        .kernel
        .lifecycle()
        .with_module(CORE_MODULE_ID, |m| {
            m.as_any()
                .downcast_ref::<CoreModule>()
                .and_then(|core| core.settings().log_history_count_to_keep)
        })
        .flatten();
    assert_eq!(keep, Some(-42));
}

#[test]
fn test_invalid_settings_fail_only_the_core_module() {
    let s = setup(Some(json!({ "cull_spikes": "sometimes" })));

    let failures = s.kernel.boot().unwrap();

    assert_eq!(failures.len(), 1);
    assert!(matches!(failures[0], ModuleError::LoadFailure { .. }));
    assert_eq!(
        s.kernel.lifecycle().state(CORE_MODULE_ID),
        Some(ModuleState::Unloaded)
    );
    s.host.frame().unwrap();
    assert_eq!(s.host.draws(), 10);
}

#[test]
fn test_unload_leaves_nothing_behind() {
    let s = setup(None);
    s.kernel.boot().unwrap();
    assert_eq!(s.kernel.hooks().owned_by(CORE_MODULE_ID).len(), 2);
    assert_eq!(s.kernel.bus().owned_by(CORE_MODULE_ID).len(), 2);

    let report = s.kernel.lifecycle().unload(CORE_MODULE_ID).unwrap();

    assert!(report.is_clean());
    assert!(s.kernel.hooks().is_empty());
    assert!(s.kernel.bus().is_empty());
}
