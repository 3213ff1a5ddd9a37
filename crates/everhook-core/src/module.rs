//! Module contract and the context modules work through.

use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;

use everhook_protocols::{ModuleError, ModuleManifest};

use crate::bus::ExtensionBus;
use crate::hook::HookManager;
use crate::runtime::HostRuntime;

/// An independently developed extension unit.
///
/// The controller calls the phases in order: `load_settings`, `load`,
/// `initialize`, `on_input_initialize`, `load_content`, and finally `unload`.
/// Hooks and subscriptions created during any phase are attributed to the
/// module; whatever `unload` leaves behind is removed by the controller.
pub trait Module: Send + 'static {
    /// Returns the module manifest.
    fn manifest(&self) -> &ModuleManifest;

    /// Apply settings. `ctx.settings` holds the module's configured table.
    fn load_settings(&mut self, _ctx: &ModuleContext) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Install hooks and subscriptions.
    fn load(&mut self, ctx: &ModuleContext) -> Result<(), ModuleError>;

    fn initialize(&mut self, _ctx: &ModuleContext) -> Result<(), ModuleError> {
        Ok(())
    }

    fn on_input_initialize(&mut self, _ctx: &ModuleContext) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Called once content is available; `first_load` is false on reloads.
    fn load_content(&mut self, _ctx: &ModuleContext, _first_load: bool) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Remove everything `load` installed.
    fn unload(&mut self, ctx: &ModuleContext) -> Result<(), ModuleError>;

    /// Returns a reference to the module as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// Context passed to every module phase.
#[derive(Clone)]
pub struct ModuleContext {
    /// Id of the module the context belongs to.
    pub module_id: String,

    /// Settings table for this module, `Null` when none is configured.
    pub settings: serde_json::Value,

    /// Working directory.
    pub work_dir: PathBuf,

    pub hooks: Arc<HookManager>,
    pub bus: Arc<ExtensionBus>,
    pub runtime: Arc<HostRuntime>,
}

impl ModuleContext {
    /// Get a single settings value.
    pub fn get_setting<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.settings
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Deserialize the whole settings table. A missing table yields the
    /// type's default.
    pub fn settings_as<T>(&self) -> Result<T, ModuleError>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        if self.settings.is_null() {
            return Ok(T::default());
        }
        serde_json::from_value(self.settings.clone()).map_err(|e| ModuleError::Settings {
            module: self.module_id.clone(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ModuleScope;
    use serde::Deserialize;

    fn context(settings: serde_json::Value) -> ModuleContext {
        let runtime = Arc::new(HostRuntime::new());
        let scope = Arc::new(ModuleScope::new());
        ModuleContext {
            module_id: "tester".to_string(),
            settings,
            work_dir: PathBuf::from("."),
            hooks: Arc::new(HookManager::new(Arc::clone(&runtime), Arc::clone(&scope))),
            bus: Arc::new(ExtensionBus::new(scope)),
            runtime,
        }
    }

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct TesterSettings {
        #[serde(default)]
        show_timer: bool,
        #[serde(default)]
        label: String,
    }

    #[test]
    fn test_get_setting() {
        let ctx = context(serde_json::json!({ "show_timer": true, "count": 3 }));
        assert_eq!(ctx.get_setting::<bool>("show_timer"), Some(true));
        assert_eq!(ctx.get_setting::<i64>("count"), Some(3));
        assert_eq!(ctx.get_setting::<String>("missing"), None);
    }

    #[test]
    fn test_settings_as_struct() {
        let ctx = context(serde_json::json!({ "show_timer": true, "label": "hi" }));
        let s: TesterSettings = ctx.settings_as().unwrap();
        assert!(s.show_timer);
        assert_eq!(s.label, "hi");
    }

    #[test]
    fn test_settings_as_defaults_when_missing() {
        let ctx = context(serde_json::Value::Null);
        assert_eq!(ctx.settings_as::<TesterSettings>().unwrap(), TesterSettings::default());
    }

    #[test]
    fn test_settings_as_reports_bad_table() {
        let ctx = context(serde_json::json!({ "show_timer": "yes" }));
        let err = ctx.settings_as::<TesterSettings>().unwrap_err();
        assert!(matches!(err, ModuleError::Settings { ref module, .. } if module == "tester"));
    }
}
