//! The built-in core module.
//!
//! Culls off-screen spikes, keeps the scripting layer's type enumeration from
//! throwing on broken assemblies, adds the mod options buttons to the menus
//! and prunes the log history.

use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Deserialize;
use tracing::{debug, info, warn};

use everhook_boot::LogHistory;
use everhook_core::{HookHandle, Module, ModuleContext, SubscriptionHandle};
use everhook_il::{CursorError, ILCursor, Instruction, MoveType, OpCode};
use everhook_protocols::points::{
    MAIN_MENU_BUTTONS_CREATED, MainMenuButtons, MenuButton, PAUSE_MENU_BUTTONS_CREATED,
    PauseMenuButtons,
};
use everhook_protocols::{ModuleError, ModuleManifest, Version};

use crate::host::methods;

pub(crate) const CORE_MODULE_ID: &str = "core";

pub(crate) const MOD_OPTIONS_LABEL: &str = "menu_modoptions";
pub(crate) const MOD_OPTIONS_ICON: &str = "menu/modoptions_new";
pub(crate) const PAUSE_MOD_OPTIONS_LABEL: &str = "menu_pause_modoptions";

/// Settings under `[modules.settings.core]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct CoreSettings {
    pub show_mod_options_in_game: bool,
    pub cull_spikes: bool,
    /// Overrides `logging.history_count_to_keep`.
    pub log_history_count_to_keep: Option<i64>,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            show_mod_options_in_game: true,
            cull_spikes: true,
            log_history_count_to_keep: None,
        }
    }
}

pub(crate) struct CoreModule {
    manifest: ModuleManifest,
    settings: CoreSettings,
    /// Read by the pause menu subscriber on every menu build.
    show_in_game: Arc<AtomicBool>,
    history_dir: PathBuf,
    history_count: i64,
    hooks: Vec<HookHandle>,
    subscriptions: Vec<SubscriptionHandle>,
}

impl CoreModule {
    pub(crate) fn new(history_dir: PathBuf, history_count: i64) -> Self {
        Self {
            manifest: ModuleManifest::new(CORE_MODULE_ID, "Everhook Core", core_version())
                .with_description("Built-in fixes and menu entries"),
            settings: CoreSettings::default(),
            show_in_game: Arc::new(AtomicBool::new(true)),
            history_dir,
            history_count,
            hooks: Vec::new(),
            subscriptions: Vec::new(),
        }
    }

    pub(crate) fn settings(&self) -> &CoreSettings {
        &self.settings
    }

    fn prune_log_history(&self) {
        let keep = self
            .settings
            .log_history_count_to_keep
            .unwrap_or(self.history_count)
            .max(0);
        let history = LogHistory::new(&self.history_dir, usize::try_from(keep).unwrap_or(0));
        if let Err(e) = history.enforce() {
            warn!("log.txt history: {}", e);
        }
    }
}

fn core_version() -> Version {
    env!("CARGO_PKG_VERSION")
        .parse()
        .unwrap_or_else(|_| Version::new(0, 1, 0))
}

/// `if (!this.IsVisible()) return;` at the start of the method.
pub(crate) fn culling_guard(c: &mut ILCursor<'_>) -> Result<(), CursorError> {
    let visible = c.define_label();
    c.emit(Instruction::ldarg(0));
    c.emit(Instruction::callvirt(methods::is_visible())?);
    c.emit_branch(OpCode::Brtrue, visible)?;
    c.emit(Instruction::ret());
    c.mark_label(visible)
}

/// Turns every `Assembly.GetTypes()` call into `Extensions.GetTypesSafe(asm)`.
pub(crate) fn redirect_get_types(c: &mut ILCursor<'_>) -> Result<(), CursorError> {
    while c.try_goto_next(MoveType::Before, &[&|i: &Instruction| {
        i.match_callvirt(methods::ASSEMBLY, "GetTypes")
    }]) {
        debug!(
            "Redirecting Assembly.GetTypes => Extensions.GetTypesSafe in {}, index {}",
            c.method(),
            c.index()
        );
        c.replace_next(Instruction::call(methods::get_types_safe()))?;
    }
    Ok(())
}

/// Below the options button, or above the last button.
pub(crate) fn add_main_menu_button(menu: &mut MainMenuButtons) {
    let index = match menu.position("menu_options", Some("menu/options")) {
        Some(i) => i + 1,
        None => menu.buttons.len().saturating_sub(1),
    };
    menu.buttons
        .insert(index, MenuButton::new(MOD_OPTIONS_LABEL).with_icon(MOD_OPTIONS_ICON));
}

/// Below the options item, or at the end.
pub(crate) fn add_pause_menu_button(menu: &mut PauseMenuButtons) {
    let index = match menu.position("menu_pause_options") {
        Some(i) => i + 1,
        None => menu.items.len(),
    };
    menu.items.insert(index, MenuButton::new(PAUSE_MOD_OPTIONS_LABEL));
}

impl Module for CoreModule {
    fn manifest(&self) -> &ModuleManifest {
        &self.manifest
    }

    fn load_settings(&mut self, ctx: &ModuleContext) -> Result<(), ModuleError> {
        self.settings = ctx.settings_as()?;
        self.show_in_game
            .store(self.settings.show_mod_options_in_game, Ordering::SeqCst);
        debug!("Core settings: {:?}", self.settings);
        Ok(())
    }

    fn load(&mut self, ctx: &ModuleContext) -> Result<(), ModuleError> {
        self.subscriptions
            .push(ctx.bus.subscribe(MAIN_MENU_BUTTONS_CREATED, add_main_menu_button)?);
        let show_in_game = Arc::clone(&self.show_in_game);
        self.subscriptions.push(ctx.bus.subscribe(
            PAUSE_MENU_BUTTONS_CREATED,
            move |menu: &mut PauseMenuButtons| {
                if show_in_game.load(Ordering::SeqCst) {
                    add_pause_menu_button(menu);
                }
            },
        )?);

        self.hooks.push(
            ctx.hooks
                .install_il(&methods::get_extension_methods(), redirect_get_types)?,
        );
        if self.settings.cull_spikes {
            self.hooks
                .push(ctx.hooks.install_il(&methods::render(), culling_guard)?);
        }

        self.prune_log_history();
        info!(
            "Core module loaded ({} hook(s), {} subscription(s))",
            self.hooks.len(),
            self.subscriptions.len()
        );
        Ok(())
    }

    fn unload(&mut self, ctx: &ModuleContext) -> Result<(), ModuleError> {
        for handle in self.subscriptions.drain(..) {
            ctx.bus.unsubscribe(&handle)?;
        }
        for handle in self.hooks.drain(..) {
            ctx.hooks.remove(&handle)?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
#[path = "core_module_tests.rs"]
mod tests;
