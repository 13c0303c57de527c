//! Build configuration: merges CLI flags, an optional JSON config file, and
//! built-in defaults (spec §6 — "flag values win over file values over
//! built-in defaults"), the same precedence shape as the teacher's
//! `RenderServiceConfig::from_file_and_env`.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::CompileError;

/// Resolved build settings, after merging flags/file/defaults.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Source glob patterns to compile.
    pub patterns: Vec<String>,
    /// Command output directory.
    pub out_dir: PathBuf,
    /// Agent output directory.
    pub agents_out_dir: PathBuf,
    /// Runtime bundle output directory.
    pub runtime_out_dir: PathBuf,
    /// When true, compile and report without writing any file.
    pub dry_run: bool,
    /// When true, keep running and recompile on source changes.
    pub watch: bool,
    /// When true, bundle the runtime in code-split mode.
    pub code_split: bool,
    /// When true, minify the emitted runtime bundle.
    pub minify: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            patterns: Vec::new(),
            out_dir: PathBuf::from(".claude/commands"),
            agents_out_dir: PathBuf::from(".claude/agents"),
            runtime_out_dir: PathBuf::from(".claude/runtime"),
            dry_run: false,
            watch: false,
            code_split: false,
            minify: false,
        }
    }
}

/// The optional JSON config file shape (spec §6): every field optional, so
/// a file only needs to override what it cares about.
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    patterns: Option<Vec<String>>,
    #[serde(default)]
    out: Option<PathBuf>,
    #[serde(default)]
    agents_out: Option<PathBuf>,
    #[serde(default)]
    runtime_out: Option<PathBuf>,
    #[serde(default)]
    dry_run: Option<bool>,
    #[serde(default)]
    watch: Option<bool>,
    #[serde(default)]
    code_split: Option<bool>,
    #[serde(default)]
    minify: Option<bool>,
}

impl BuildConfig {
    /// Loads a config file, if given, and overlays it under the defaults;
    /// flags are applied afterward by the caller via the `with_*` builders,
    /// so flags always win.
    pub fn from_file(path: Option<&PathBuf>) -> Result<Self, CompileError> {
        let mut config = BuildConfig::default();
        let Some(path) = path else {
            return Ok(config);
        };
        let text = std::fs::read_to_string(path)
            .map_err(|e| CompileError::Config(format!("cannot read config file {}: {e}", path.display())))?;
        let file: ConfigFile = serde_json::from_str(&text)
            .map_err(|e| CompileError::Config(format!("malformed config file {}: {e}", path.display())))?;

        if let Some(v) = file.patterns {
            config.patterns = v;
        }
        if let Some(v) = file.out {
            config.out_dir = v;
        }
        if let Some(v) = file.agents_out {
            config.agents_out_dir = v;
        }
        if let Some(v) = file.runtime_out {
            config.runtime_out_dir = v;
        }
        if let Some(v) = file.dry_run {
            config.dry_run = v;
        }
        if let Some(v) = file.watch {
            config.watch = v;
        }
        if let Some(v) = file.code_split {
            config.code_split = v;
        }
        if let Some(v) = file.minify {
            config.minify = v;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_paths() {
        let config = BuildConfig::default();
        assert_eq!(config.out_dir, PathBuf::from(".claude/commands"));
        assert_eq!(config.agents_out_dir, PathBuf::from(".claude/agents"));
        assert_eq!(config.runtime_out_dir, PathBuf::from(".claude/runtime"));
    }

    #[test]
    fn missing_config_path_returns_defaults() {
        let config = BuildConfig::from_file(None).unwrap();
        assert!(!config.watch);
    }

    #[test]
    fn file_values_overlay_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        write!(file, r#"{{"out": "build/commands", "code_split": true}}"#).unwrap();
        let config = BuildConfig::from_file(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(config.out_dir, PathBuf::from("build/commands"));
        assert!(config.code_split);
        assert_eq!(config.agents_out_dir, PathBuf::from(".claude/agents"));
    }

    #[test]
    fn malformed_config_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        write!(file, "not json").unwrap();
        assert!(BuildConfig::from_file(Some(&file.path().to_path_buf())).is_err());
    }
}
