//! everhook - runtime patching host.
//!
//! Main entry point: reads the launch flags and configuration, opens the log
//! session, boots the kernel and runs the host inside the failure envelope.

mod cli;
mod core_module;
mod host;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use everhook_boot::{
    Disposition, EnvironmentInfo, FailureContainment, LogSession, SignalHandler, headless_from_env,
};
use everhook_config::{
    Config, ConfigError, ConfigLoader, ConfigValidator, LAUNCH_FILE, LaunchFile,
};
use everhook_core::{HostRuntime, Kernel};
use everhook_il::Exception;

use crate::cli::Cli;
use crate::core_module::CoreModule;
use crate::host::DemoHost;

const SPIKE_COUNT: i64 = 100;

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32, Box<dyn std::error::Error>> {
    let launch = LaunchFile::load_or_create(Path::new(LAUNCH_FILE));
    let argv: Vec<String> = match &launch {
        Ok(l) => l.apply(std::env::args()),
        Err(_) => std::env::args().collect(),
    };
    let cli = Cli::parse_from(&argv);

    let work_dir = match &cli.work_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };
    let config_path = cli.config.clone().unwrap_or_else(ConfigLoader::default_path);
    let config = ConfigLoader::load_or_default(&config_path)?;

    let session = LogSession::init(&config.logging, cli.nolog)?;
    info!("Starting everhook v{}", env!("CARGO_PKG_VERSION"));
    info!("Working directory: {}", work_dir.display());
    match &launch {
        Ok(l) if l.created() => info!("Wrote launch flags template to {}", l.path().display()),
        Ok(l) if !l.args().is_empty() => info!("Launch flags: {}", l.args().join(" ")),
        Ok(_) => {}
        Err(e) => warn!("Could not read {}: {}", LAUNCH_FILE, e),
    }
    if let Some(archived) = session.archived() {
        info!("Previous log moved to {}", archived.display());
    }
    for e in session.errors() {
        warn!("log.txt: {}", e);
    }

    let validation = ConfigValidator::validate(&config)?;
    for w in &validation.warnings {
        warn!("Config {}: {}", w.path, w.message);
    }
    if !validation.is_valid() {
        for e in &validation.errors {
            error!("Config {}: {}", e.path, e.message);
        }
        return Err(format!("invalid configuration in {}", config_path.display()).into());
    }

    let headless = cli.headless || headless_from_env();
    let backend = cli.render_backend();
    if cli.console {
        info!("Console output requested");
    }
    info!("Render backend: {}", backend);

    let runtime = Arc::new(HostRuntime::new());
    let counters = host::define(&runtime)?;
    let kernel = Arc::new(Kernel::new(runtime, work_dir));
    kernel.register_module(Box::new(CoreModule::new(
        config.logging.history_dir.clone(),
        config.logging.history_count_to_keep,
    )))?;
    apply_module_config(&kernel, &config)?;

    let containment = Arc::new(FailureContainment::new(
        Arc::clone(&kernel),
        config.crash.report_path.clone(),
        EnvironmentInfo::capture(argv, headless, backend.to_string()),
    ));
    containment.install_panic_hook();

    let host = DemoHost::new(Arc::clone(&kernel), counters, SPIKE_COUNT);
    let frame_limit = cli.frames.or(config.host.frame_limit);
    let disposition =
        containment.run_envelope(|| main_inner(&kernel, &host, &config, frame_limit));

    if disposition == Disposition::Completed {
        let reports = kernel.shutdown()?;
        info!("Unloaded {} module(s)", reports.len());
    }

    // Flush log.txt before exiting.
    drop(session);
    Ok(disposition.exit_code())
}

fn apply_module_config(kernel: &Kernel, config: &Config) -> Result<(), ConfigError> {
    for id in &config.modules.disabled {
        kernel.lifecycle().disable(id.clone());
    }
    for id in config.modules.configured() {
        if let Some(settings) = config.modules.settings_json(id)? {
            kernel.lifecycle().set_settings(id, settings);
        }
    }
    Ok(())
}

fn main_inner(
    kernel: &Kernel,
    host: &DemoHost,
    config: &Config,
    frame_limit: Option<u64>,
) -> Result<(), Exception> {
    let failures = kernel
        .boot()
        .map_err(|e| Exception::new("ModuleError", e.to_string()))?;
    if !failures.is_empty() {
        warn!("{} module(s) failed to load", failures.len());
    }

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Exception::new("IOException", e.to_string()))?;

    let report = rt.block_on(async {
        let signals = SignalHandler::new();
        signals
            .setup_os_signals()
            .map_err(|e| Exception::new("SignalException", e.to_string()))?;
        host.run(&config.host, frame_limit, &signals).await
    })?;

    info!(
        frames = report.frames,
        draws = report.draws,
        "Host finished: {}",
        report.exit_reason
    );
    Ok(())
}
