//! The demo host application: a handful of game methods, its menus and the
//! frame loop that drives them.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use everhook_boot::SignalHandler;
use everhook_config::HostConfig;
use everhook_core::{HostRuntime, Kernel};
use everhook_il::{Exception, ILCursor, Instruction, MethodBody, MethodId, Signature, Value};
use everhook_protocols::BusError;
use everhook_protocols::points::{
    MAIN_MENU_BUTTONS_CREATED, MainMenuButtons, MenuButton, PAUSE_MENU_BUTTONS_CREATED,
    PROCESS_EXITING, PauseMenuButtons, ProcessExiting,
};

/// Methods the host defines.
pub(crate) mod methods {
    use super::*;

    pub(crate) const SPIKES: &str = "Game.Spikes";
    pub(crate) const ASSEMBLY: &str = "Scripting.Assembly";

    pub(crate) fn render() -> MethodId {
        MethodId::new(SPIKES, "Render", Signature::instance(0))
    }

    pub(crate) fn draw_spikes() -> MethodId {
        MethodId::new(SPIKES, "DrawSpikes", Signature::instance(0))
    }

    pub(crate) fn is_visible() -> MethodId {
        MethodId::new(SPIKES, "IsVisible", Signature::instance(0).returning())
    }

    pub(crate) fn get_types() -> MethodId {
        MethodId::new(ASSEMBLY, "GetTypes", Signature::instance(0).returning())
    }

    pub(crate) fn get_types_safe() -> MethodId {
        MethodId::new(
            "Scripting.Extensions",
            "GetTypesSafe",
            Signature::new(1).returning(),
        )
    }

    pub(crate) fn get_extension_methods() -> MethodId {
        MethodId::new(
            "Scripting.TypeExtensions",
            "GetExtensionMethods",
            Signature::new(1).returning(),
        )
    }
}

/// Assembly handle whose type list contains a type that fails to load.
pub(crate) const SCRIPTING_ASSEMBLY: i64 = 1;

const GAME_TYPES: &str = "Game.Player,Game.Level,Game.Spikes";
const SCRIPTING_TYPES: &str = "Scripting.Lua,Scripting.TypeExtensions";

/// Counters the host's native methods update.
#[derive(Debug, Default)]
pub(crate) struct HostCounters {
    pub draws: AtomicU64,
}

/// Define the host's methods in `runtime`.
pub(crate) fn define(runtime: &HostRuntime) -> Result<Arc<HostCounters>, Exception> {
    let counters = Arc::new(HostCounters::default());

    // Render(this) { this.DrawSpikes(); }
    let mut body = MethodBody::new(methods::render());
    let mut c = ILCursor::new(&mut body);
    c.emit(Instruction::ldarg(0));
    c.emit(Instruction::callvirt(methods::draw_spikes()).map_err(invalid)?);
    c.emit(Instruction::ret());
    runtime.define_body(body).map_err(invalid)?;

    let draws = Arc::clone(&counters);
    runtime.define_native(methods::draw_spikes(), move |_, _| {
        draws.draws.fetch_add(1, Ordering::Relaxed);
        Ok(Value::Unit)
    });

    // Receivers are x positions; the camera shows 7 of every 10 columns.
    runtime.define_native(methods::is_visible(), |_, args| {
        let x = args.first().and_then(Value::as_int).unwrap_or(0);
        Ok(Value::Bool(x.rem_euclid(10) < 7))
    });

    runtime.define_native(methods::get_types(), |_, args| {
        match args.first().and_then(Value::as_int) {
            Some(SCRIPTING_ASSEMBLY) => Err(Exception::new(
                "ReflectionTypeLoadException",
                "Unable to load one or more of the requested types",
            )),
            _ => Ok(Value::from(GAME_TYPES)),
        }
    });

    runtime.define_native(methods::get_types_safe(), |_, args| {
        match args.first().and_then(Value::as_int) {
            Some(SCRIPTING_ASSEMBLY) => Ok(Value::from(SCRIPTING_TYPES)),
            _ => Ok(Value::from(GAME_TYPES)),
        }
    });

    // GetExtensionMethods(asm) { return asm.GetTypes(); }
    let mut body = MethodBody::new(methods::get_extension_methods());
    let mut c = ILCursor::new(&mut body);
    c.emit(Instruction::ldarg(0));
    c.emit(Instruction::callvirt(methods::get_types()).map_err(invalid)?);
    c.emit(Instruction::ret());
    runtime.define_body(body).map_err(invalid)?;

    Ok(counters)
}

fn invalid(e: impl std::fmt::Display) -> Exception {
    Exception::invalid_program(e.to_string())
}

fn bus_failure(e: BusError) -> Exception {
    Exception::new("BusError", e.to_string())
}

/// What a host run did.
#[derive(Debug, Clone)]
pub(crate) struct HostReport {
    pub frames: u64,
    pub draws: u64,
    pub main_menu: Vec<String>,
    pub pause_menu: Vec<String>,
    pub scripting_types: String,
    pub exit_reason: String,
}

/// The running host.
pub(crate) struct DemoHost {
    kernel: Arc<Kernel>,
    counters: Arc<HostCounters>,
    spikes: Vec<i64>,
}

impl DemoHost {
    pub(crate) fn new(kernel: Arc<Kernel>, counters: Arc<HostCounters>, spike_count: i64) -> Self {
        Self {
            kernel,
            counters,
            spikes: (0..spike_count).collect(),
        }
    }

    fn runtime(&self) -> &Arc<HostRuntime> {
        self.kernel.runtime()
    }

    pub(crate) fn draws(&self) -> u64 {
        self.counters.draws.load(Ordering::Relaxed)
    }

    /// Build the title screen buttons and let modules adjust them.
    pub(crate) fn main_menu(&self) -> Result<MainMenuButtons, Exception> {
        let mut menu = MainMenuButtons {
            buttons: vec![
                MenuButton::new("menu_begin").with_icon("menu/start"),
                MenuButton::new("menu_options").with_icon("menu/options"),
                MenuButton::new("menu_credits").with_icon("menu/credits"),
                MenuButton::new("menu_exit").with_icon("menu/exit"),
            ],
        };
        self.kernel
            .bus()
            .publish(MAIN_MENU_BUTTONS_CREATED, &mut menu)
            .map_err(bus_failure)?;
        Ok(menu)
    }

    /// Build the pause menu and let modules adjust it.
    pub(crate) fn pause_menu(&self, minimal: bool) -> Result<PauseMenuButtons, Exception> {
        let mut items = vec![MenuButton::new("menu_pause_resume")];
        if !minimal {
            items.push(MenuButton::new("menu_pause_retry"));
        }
        items.push(MenuButton::new("menu_pause_options"));
        items.push(MenuButton::new("menu_pause_savequit"));

        let mut menu = PauseMenuButtons { items, minimal };
        self.kernel
            .bus()
            .publish(PAUSE_MENU_BUTTONS_CREATED, &mut menu)
            .map_err(bus_failure)?;
        Ok(menu)
    }

    /// Render every spike once.
    pub(crate) fn frame(&self) -> Result<(), Exception> {
        let render = methods::render();
        for x in &self.spikes {
            self.runtime().invoke(&render, &[Value::Int(*x)])?;
        }
        Ok(())
    }

    /// Run frames at `config.frame_rate` until `frame_limit` is reached or a
    /// shutdown signal arrives, then raise the process-exiting point once.
    pub(crate) async fn run(
        &self,
        config: &HostConfig,
        frame_limit: Option<u64>,
        signals: &SignalHandler,
    ) -> Result<HostReport, Exception> {
        let labels = |buttons: &[MenuButton]| -> Vec<String> {
            buttons.iter().map(|b| b.label.clone()).collect()
        };
        let main_menu = labels(&self.main_menu()?.buttons);
        let pause_menu = labels(&self.pause_menu(false)?.items);
        let scripting_types = self
            .runtime()
            .invoke(&methods::get_extension_methods(), &[Value::Int(SCRIPTING_ASSEMBLY)])?
            .as_str()
            .unwrap_or_default()
            .to_string();
        debug!("Main menu: {:?}", main_menu);
        debug!("Pause menu: {:?}", pause_menu);

        let period = Duration::from_secs_f64(1.0 / f64::from(config.frame_rate.max(1)));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut shutdown = signals.subscribe();

        info!(
            "Host loop started ({} fps, {} spikes)",
            config.frame_rate,
            self.spikes.len()
        );
        let mut frames = 0u64;
        let exit_reason = loop {
            if signals.is_shutdown_requested() {
                break "shutdown requested".to_string();
            }
            if frame_limit.is_some_and(|limit| frames >= limit) {
                break "frame limit reached".to_string();
            }
            tokio::select! {
                _ = ticker.tick() => {
                    self.frame()?;
                    frames += 1;
                }
                signal = shutdown.recv() => {
                    break match signal {
                        Ok(s) => format!("signal {s}"),
                        Err(_) => "signal channel closed".to_string(),
                    };
                }
            }
        };

        info!("Host loop stopped after {} frame(s): {}", frames, exit_reason);
        let mut exiting = ProcessExiting {
            reason: exit_reason.clone(),
        };
        self.kernel
            .bus()
            .publish(PROCESS_EXITING, &mut exiting)
            .map_err(bus_failure)?;

        Ok(HostReport {
            frames,
            draws: self.draws(),
            main_menu,
            pause_menu,
            scripting_types,
            exit_reason,
        })
    }
}

#[cfg(test)]
#[path = "host_tests.rs"]
mod tests;
