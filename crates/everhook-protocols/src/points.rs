//! Typed extension points and the host's standard points.
//!
//! An [`ExtensionPoint`] pairs a name with the payload type its subscribers
//! receive. Subscribers get `&mut A`, so a point can collect contributions
//! (menu buttons) as well as announce events (process exit).

use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;

/// Named dispatch point carrying payloads of type `A`.
pub struct ExtensionPoint<A: 'static> {
    name: &'static str,
    _payload: PhantomData<fn(&mut A)>,
}

impl<A: 'static> ExtensionPoint<A> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _payload: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<A: 'static> Clone for ExtensionPoint<A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A: 'static> Copy for ExtensionPoint<A> {}

impl<A: 'static> fmt::Debug for ExtensionPoint<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionPoint")
            .field("name", &self.name)
            .field("payload", &std::any::type_name::<A>())
            .finish()
    }
}

/// A button in one of the host's menus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuButton {
    /// Dialog key of the label.
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl MenuButton {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            icon: None,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }
}

/// Payload of [`MAIN_MENU_BUTTONS_CREATED`]: the main menu's buttons, top to
/// bottom. Subscribers may insert, reorder or remove entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MainMenuButtons {
    pub buttons: Vec<MenuButton>,
}

impl MainMenuButtons {
    pub fn position(&self, label: &str, icon: Option<&str>) -> Option<usize> {
        self.buttons
            .iter()
            .position(|b| b.label == label && (icon.is_none() || b.icon.as_deref() == icon))
    }
}

/// Payload of [`PAUSE_MENU_BUTTONS_CREATED`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PauseMenuButtons {
    pub items: Vec<MenuButton>,
    /// The reduced pause menu shown in some contexts.
    pub minimal: bool,
}

impl PauseMenuButtons {
    pub fn position(&self, label: &str) -> Option<usize> {
        self.items.iter().position(|b| b.label == label)
    }
}

/// Payload of [`PROCESS_EXITING`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessExiting {
    pub reason: String,
}

/// Raised after the host built its main menu buttons.
pub const MAIN_MENU_BUTTONS_CREATED: ExtensionPoint<MainMenuButtons> =
    ExtensionPoint::new("main-menu-buttons-created");

/// Raised after the host built its pause menu.
pub const PAUSE_MENU_BUTTONS_CREATED: ExtensionPoint<PauseMenuButtons> =
    ExtensionPoint::new("pause-menu-buttons-created");

/// Raised once before the host loop exits.
pub const PROCESS_EXITING: ExtensionPoint<ProcessExiting> =
    ExtensionPoint::new("process-exiting");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_point_names() {
        assert_eq!(MAIN_MENU_BUTTONS_CREATED.name(), "main-menu-buttons-created");
        assert_eq!(PAUSE_MENU_BUTTONS_CREATED.name(), "pause-menu-buttons-created");
        assert_eq!(PROCESS_EXITING.name(), "process-exiting");
    }

    #[test]
    fn test_points_are_copy() {
        let a = PROCESS_EXITING;
        let b = a;
        assert_eq!(a.name(), b.name());
        assert!(format!("{a:?}").contains("ProcessExiting"));
    }

    #[test]
    fn test_main_menu_position_matches_icon() {
        let menu = MainMenuButtons {
            buttons: vec![
                MenuButton::new("menu_options").with_icon("menu/options"),
                MenuButton::new("menu_exit").with_icon("menu/exit"),
            ],
        };
        assert_eq!(menu.position("menu_options", Some("menu/options")), Some(0));
        assert_eq!(menu.position("menu_options", Some("menu/other")), None);
        assert_eq!(menu.position("menu_exit", None), Some(1));
    }

    #[test]
    fn test_pause_menu_position() {
        let menu = PauseMenuButtons {
            items: vec![MenuButton::new("Resume"), MenuButton::new("Options")],
            minimal: false,
        };
        assert_eq!(menu.position("Options"), Some(1));
        assert_eq!(menu.position("Mod Options"), None);
    }
}
