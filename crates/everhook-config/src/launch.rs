//! Launch arguments file.
//!
//! `launch.txt` holds extra command line flags, one or more per line. Blank
//! lines and lines starting with `#` are ignored. The remaining tokens are
//! placed in front of the process arguments, so flags given on the command
//! line come later and win where later flags override earlier ones.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const LAUNCH_FILE: &str = "launch.txt";

/// Written when no launch file exists yet.
pub const LAUNCH_TEMPLATE: &str = "\
# Add any everhook launch flags here. Lines starting with # are ignored.

# Open a console window on platforms that do not have one.
#--console

# Prefer the Direct3D render backend.
#--d3d

# Force the OpenGL render backend. If both are given, the later flag wins.
#--no-d3d

# Do not write log.txt.
#--nolog
";

/// Tokens of a launch file, in file order.
pub fn parse_launch_args(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .flat_map(str::split_whitespace)
        .map(str::to_string)
        .collect()
}

/// A launch file on disk.
#[derive(Debug, Clone)]
pub struct LaunchFile {
    path: PathBuf,
    args: Vec<String>,
    created: bool,
}

impl LaunchFile {
    /// Read `path`, or write [`LAUNCH_TEMPLATE`] there when it does not exist.
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = fs::read_to_string(path).map_err(ConfigError::io(path))?;
            return Ok(Self {
                path: path.to_path_buf(),
                args: parse_launch_args(&content),
                created: false,
            });
        }

        fs::write(path, LAUNCH_TEMPLATE).map_err(ConfigError::io(path))?;
        Ok(Self {
            path: path.to_path_buf(),
            args: Vec::new(),
            created: true,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Whether the template was just written.
    pub fn created(&self) -> bool {
        self.created
    }

    /// Insert the file's tokens after the program name in `argv`.
    pub fn apply<I>(&self, argv: I) -> Vec<String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut argv = argv.into_iter();
        let mut merged = Vec::new();
        merged.extend(argv.next());
        merged.extend(self.args.iter().cloned());
        merged.extend(argv);
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_skips_comments_and_blank_lines() {
        let args = parse_launch_args("# comment\n\n  --console  \n#--d3d\n--nolog --headless\n");
        assert_eq!(args, vec!["--console", "--nolog", "--headless"]);
    }

    #[test]
    fn test_parse_template_is_empty() {
        assert!(parse_launch_args(LAUNCH_TEMPLATE).is_empty());
    }

    #[test]
    fn test_parse_indented_comment() {
        assert!(parse_launch_args("   # --d3d").is_empty());
    }

    #[test]
    fn test_missing_file_writes_template() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LAUNCH_FILE);

        let launch = LaunchFile::load_or_create(&path).unwrap();
        assert!(launch.created());
        assert!(launch.args().is_empty());

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("#--d3d"));
        assert!(written.contains("#--no-d3d"));
    }

    #[test]
    fn test_existing_file_is_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LAUNCH_FILE);
        fs::write(&path, "--d3d\n# --nolog\n").unwrap();

        let launch = LaunchFile::load_or_create(&path).unwrap();
        assert!(!launch.created());
        assert_eq!(launch.args(), ["--d3d"]);
        assert_eq!(fs::read_to_string(&path).unwrap(), "--d3d\n# --nolog\n");
    }

    #[test]
    fn test_apply_inserts_after_program_name() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LAUNCH_FILE);
        fs::write(&path, "--d3d --console").unwrap();
        let launch = LaunchFile::load_or_create(&path).unwrap();

        let argv = vec!["everhook".to_string(), "--no-d3d".to_string()];
        assert_eq!(
            launch.apply(argv),
            vec!["everhook", "--d3d", "--console", "--no-d3d"]
        );
    }

    #[test]
    fn test_apply_empty_argv() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LAUNCH_FILE);
        fs::write(&path, "--nolog").unwrap();
        let launch = LaunchFile::load_or_create(&path).unwrap();
        assert_eq!(launch.apply(Vec::new()), vec!["--nolog"]);
    }
}
