//! Module lifecycle state and the descriptor the controller keeps per module.

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;

use super::ModuleManifest;
use crate::types::{HookId, SubscriptionId};

/// Lifecycle state. States only move forward; `Unloaded` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ModuleState {
    /// Registered, nothing called yet.
    Discovered = 0,
    /// Settings applied.
    SettingsLoaded = 1,
    /// `load`, `initialize` and `on_input_initialize` completed.
    Loaded = 2,
    /// First content load completed.
    ContentLoaded = 3,
    /// Torn down, either by request or after a failure.
    Unloaded = 4,
}

impl From<u8> for ModuleState {
    fn from(v: u8) -> Self {
        match v {
            0 => ModuleState::Discovered,
            1 => ModuleState::SettingsLoaded,
            2 => ModuleState::Loaded,
            3 => ModuleState::ContentLoaded,
            _ => ModuleState::Unloaded,
        }
    }
}

impl ModuleState {
    /// Whether `next` is a legal successor.
    pub fn can_advance_to(self, next: ModuleState) -> bool {
        (next as u8) > (self as u8)
    }

    /// Loaded or content-loaded.
    pub fn is_active(self) -> bool {
        matches!(self, ModuleState::Loaded | ModuleState::ContentLoaded)
    }
}

/// A module entry point invoked by the lifecycle controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ModulePhase {
    LoadSettings,
    Load,
    Initialize,
    InputInitialize,
    LoadContent,
    Unload,
}

/// Why a module stopped early.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleFailure {
    pub phase: ModulePhase,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl ModuleFailure {
    pub fn new(phase: ModulePhase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
            at: Utc::now(),
        }
    }
}

/// Controller-side record of a module.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleDescriptor {
    pub manifest: ModuleManifest,
    pub state: ModuleState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<ModuleFailure>,
    /// Hooks currently attributed to the module.
    pub hooks: Vec<HookId>,
    /// Subscriptions currently attributed to the module.
    pub subscriptions: Vec<SubscriptionId>,
}

impl ModuleDescriptor {
    pub fn new(manifest: ModuleManifest) -> Self {
        Self {
            manifest,
            state: ModuleState::Discovered,
            failure: None,
            hooks: Vec::new(),
            subscriptions: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.manifest.id
    }
}
