//! CLI definitions for everhook.

use std::fmt;
use std::path::PathBuf;

use clap::Parser;

/// everhook CLI. Flags from `launch.txt` are placed in front of these.
#[derive(Parser, Debug)]
#[command(name = "everhook")]
#[command(about = "Runtime patching host for a closed game")]
#[command(version)]
#[command(args_override_self = true)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Working directory
    #[arg(short, long)]
    pub work_dir: Option<PathBuf>,

    /// Open a console window on platforms that do not have one
    #[arg(long)]
    pub console: bool,

    /// Prefer the Direct3D render backend
    #[arg(long, overrides_with = "no_d3d")]
    pub d3d: bool,

    /// Force the OpenGL render backend
    #[arg(long = "no-d3d", overrides_with = "d3d")]
    pub no_d3d: bool,

    /// Do not write log.txt
    #[arg(long)]
    pub nolog: bool,

    /// Never present crash reports interactively
    #[arg(long)]
    pub headless: bool,

    /// Stop after this many frames
    #[arg(long)]
    pub frames: Option<u64>,
}

/// Render backend picked from the `--d3d` / `--no-d3d` flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RenderBackend {
    OpenGl,
    Direct3D,
}

impl fmt::Display for RenderBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderBackend::OpenGl => write!(f, "opengl"),
            RenderBackend::Direct3D => write!(f, "d3d"),
        }
    }
}

impl Cli {
    /// The later of `--d3d` and `--no-d3d` wins; OpenGL when neither is given.
    pub fn render_backend(&self) -> RenderBackend {
        if self.d3d && !self.no_d3d {
            RenderBackend::Direct3D
        } else {
            RenderBackend::OpenGl
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("everhook").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&[]);
        assert!(cli.config.is_none());
        assert!(!cli.console);
        assert!(!cli.nolog);
        assert!(!cli.headless);
        assert!(cli.frames.is_none());
        assert_eq!(cli.render_backend(), RenderBackend::OpenGl);
    }

    #[test]
    fn test_flags() {
        let cli = parse(&["--console", "--nolog", "--headless", "--frames", "120", "-c", "my.toml"]);
        assert!(cli.console);
        assert!(cli.nolog);
        assert!(cli.headless);
        assert_eq!(cli.frames, Some(120));
        assert_eq!(cli.config, Some(PathBuf::from("my.toml")));
    }

    #[test]
    fn test_later_backend_flag_wins() {
        assert_eq!(parse(&["--d3d"]).render_backend(), RenderBackend::Direct3D);
        assert_eq!(parse(&["--no-d3d"]).render_backend(), RenderBackend::OpenGl);
        assert_eq!(
            parse(&["--no-d3d", "--d3d"]).render_backend(),
            RenderBackend::Direct3D
        );
        assert_eq!(
            parse(&["--d3d", "--no-d3d"]).render_backend(),
            RenderBackend::OpenGl
        );
    }

    #[test]
    fn test_repeated_flag_is_accepted() {
        // launch.txt and the command line may both carry a flag.
        let cli = parse(&["--nolog", "--nolog"]);
        assert!(cli.nolog);
    }

    #[test]
    fn test_unknown_flag_is_rejected() {
        let result = Cli::try_parse_from(["everhook", "--fullscreen"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_backend_display() {
        assert_eq!(RenderBackend::OpenGl.to_string(), "opengl");
        assert_eq!(RenderBackend::Direct3D.to_string(), "d3d");
    }
}
