//! Crash reports.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use everhook_core::KernelSnapshot;
use everhook_il::Exception;

use crate::error::BootError;

const BANNER: &str = "\
everhook has encountered a catastrophic failure.

IF YOU WANT TO HELP US FIX THIS:
Attach this file and log.txt when reporting the problem.";

/// Process and platform facts recorded with every report.
#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentInfo {
    pub os: String,
    pub arch: String,
    pub version: String,
    pub pid: u32,
    pub args: Vec<String>,
    pub headless: bool,
    pub render_backend: String,
}

impl EnvironmentInfo {
    pub fn capture(args: Vec<String>, headless: bool, render_backend: impl Into<String>) -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            pid: std::process::id(),
            args,
            headless,
            render_backend: render_backend.into(),
        }
    }
}

/// One exception of the chain, outermost first.
#[derive(Debug, Clone, Serialize)]
pub struct ExceptionEntry {
    pub type_name: String,
    pub message: String,
    pub trace: Vec<String>,
}

/// Everything written when the process dies.
#[derive(Debug, Clone, Serialize)]
pub struct CrashReport {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub exceptions: Vec<ExceptionEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kernel: Option<KernelSnapshot>,
    pub environment: EnvironmentInfo,
}

impl CrashReport {
    pub fn new(
        exception: &Exception,
        kernel: Option<KernelSnapshot>,
        environment: EnvironmentInfo,
    ) -> Self {
        let exceptions = exception
            .chain()
            .map(|e| ExceptionEntry {
                type_name: e.type_name.clone(),
                message: e.message.clone(),
                trace: e.trace.clone(),
            })
            .collect();

        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            exceptions,
            kernel,
            environment,
        }
    }

    /// Plain-text rendering.
    pub fn render(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.render_into(&mut out);
        out
    }

    fn render_into(&self, out: &mut String) -> std::fmt::Result {
        writeln!(out, "{BANNER}")?;
        writeln!(out)?;
        writeln!(out, "Report: {}", self.id)?;
        writeln!(out, "Time:   {}", self.created_at.to_rfc3339())?;

        writeln!(out)?;
        writeln!(out, "== Exception ==")?;
        for (depth, e) in self.exceptions.iter().enumerate() {
            if depth > 0 {
                writeln!(out, "--- Inner exception ---")?;
            }
            writeln!(out, "{}: {}", e.type_name, e.message)?;
            for frame in &e.trace {
                writeln!(out, "  at {frame}")?;
            }
        }

        if let Some(kernel) = &self.kernel {
            writeln!(out)?;
            writeln!(out, "== Kernel ({}) ==", kernel.state)?;

            writeln!(out, "Hooks: {}", kernel.hooks.len())?;
            for h in &kernel.hooks {
                writeln!(
                    out,
                    "  {} {} on {} (owner: {}){}",
                    h.id,
                    h.kind,
                    h.target,
                    h.owner.as_deref().unwrap_or("-"),
                    if h.active { "" } else { " [inactive]" }
                )?;
            }

            writeln!(out, "Subscriptions: {}", kernel.subscriptions.len())?;
            for s in &kernel.subscriptions {
                writeln!(
                    out,
                    "  {} on {} (owner: {})",
                    s.id,
                    s.point,
                    s.owner.as_deref().unwrap_or("-")
                )?;
            }

            writeln!(out, "Modules: {}", kernel.modules.len())?;
            for m in &kernel.modules {
                write!(
                    out,
                    "  {} {} [{}]",
                    m.manifest.id, m.manifest.version, m.state
                )?;
                match &m.failure {
                    Some(f) => writeln!(out, " failed in {}: {}", f.phase, f.message)?,
                    None => writeln!(out)?,
                }
            }
        }

        let env = &self.environment;
        writeln!(out)?;
        writeln!(out, "== Environment ==")?;
        writeln!(out, "everhook: {}", env.version)?;
        writeln!(out, "Platform: {} {}", env.os, env.arch)?;
        writeln!(out, "PID: {}", env.pid)?;
        writeln!(out, "Arguments: {}", env.args.join(" "))?;
        writeln!(out, "Headless: {}", env.headless)?;
        writeln!(out, "Render backend: {}", env.render_backend)?;
        Ok(())
    }

    /// Write the plain-text report to `path`, creating parent directories.
    pub fn write_to(&self, path: &Path) -> Result<(), BootError> {
        let fail = |source| BootError::CrashReport {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(fail)?;
        }
        fs::write(path, self.render()).map_err(fail)
    }
}
