//! Transformer configuration
//!
//! [`TransformConfig`] carries the knobs the CLI exposes; an optional
//! TOML file can extend the known-function deny-list and override the
//! output path without rebuilding the tool.
//!
//! # Example
//!
//! ```toml
//! output_path = "out/parallel.cpp"
//! parallelize_loops = true
//! known_functions = ["my_runtime_hook", "trace_begin"]
//! ```

use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Default output file for the emitted translation unit.
pub const DEFAULT_OUTPUT_PATH: &str = "enhanced_hybrid_mpi_openmp_output.cpp";

/// Configuration for one transformer run.
#[derive(Debug, Clone)]
pub struct TransformConfig {
    /// Rewrite function bodies with OpenMP pragmas. `--no-loops`
    /// disables this; MPI grouping in `main` is unaffected.
    pub parallelize_loops: bool,
    /// Emit the OpenMP-only rendition: the original translation unit
    /// with pragmas spliced in (including `main`'s loops) and no MPI
    /// scaffolding.
    pub openmp_only: bool,
    /// Where the emitted translation unit is written.
    pub output_path: PathBuf,
    /// Additional names treated as known (non-user) functions.
    pub known_functions: Vec<String>,
    /// Suppress the analysis report on stdout.
    pub quiet: bool,
}

impl Default for TransformConfig {
    fn default() -> Self {
        TransformConfig {
            parallelize_loops: true,
            openmp_only: false,
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            known_functions: Vec::new(),
            quiet: false,
        }
    }
}

impl TransformConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = path.into();
        self
    }

    pub fn with_loop_parallelization(mut self, enabled: bool) -> Self {
        self.parallelize_loops = enabled;
        self
    }

    pub fn with_openmp_only(mut self, enabled: bool) -> Self {
        self.openmp_only = enabled;
        self
    }

    pub fn with_known_function(mut self, name: impl Into<String>) -> Self {
        self.known_functions.push(name.into());
        self
    }

    /// The extra deny-list entries as a set, for the user-function
    /// predicate.
    pub fn extra_denied(&self) -> BTreeSet<String> {
        self.known_functions.iter().cloned().collect()
    }

    /// Overlay settings from a parsed config file. File values win for
    /// scalars; the deny-list extends.
    pub fn merge_file(&mut self, file: ConfigFile) {
        if let Some(path) = file.output_path {
            self.output_path = path;
        }
        if let Some(enabled) = file.parallelize_loops {
            self.parallelize_loops = enabled;
        }
        self.known_functions.extend(file.known_functions);
    }
}

/// User-provided TOML configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub output_path: Option<PathBuf>,
    pub parallelize_loops: Option<bool>,
    #[serde(default)]
    pub known_functions: Vec<String>,
}

impl ConfigFile {
    pub fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| format!("Failed to parse config: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TransformConfig::default();
        assert!(config.parallelize_loops);
        assert!(!config.quiet);
        assert_eq!(config.output_path, PathBuf::from(DEFAULT_OUTPUT_PATH));
        assert!(config.known_functions.is_empty());
    }

    #[test]
    fn test_builder_methods() {
        let config = TransformConfig::new()
            .with_output_path("out.cpp")
            .with_loop_parallelization(false)
            .with_known_function("trace_begin");
        assert_eq!(config.output_path, PathBuf::from("out.cpp"));
        assert!(!config.parallelize_loops);
        assert!(config.extra_denied().contains("trace_begin"));
    }

    #[test]
    fn test_from_toml() {
        let file = ConfigFile::from_toml(
            "output_path = \"x.cpp\"\nparallelize_loops = false\nknown_functions = [\"hook\"]\n",
        )
        .unwrap();
        assert_eq!(file.output_path, Some(PathBuf::from("x.cpp")));
        assert_eq!(file.parallelize_loops, Some(false));
        assert_eq!(file.known_functions, vec!["hook".to_string()]);
    }

    #[test]
    fn test_from_toml_rejects_garbage() {
        assert!(ConfigFile::from_toml("not [valid").is_err());
    }

    #[test]
    fn test_merge_file() {
        let mut config = TransformConfig::new().with_known_function("a");
        config.merge_file(ConfigFile {
            output_path: Some(PathBuf::from("y.cpp")),
            parallelize_loops: Some(false),
            known_functions: vec!["b".to_string()],
        });
        assert_eq!(config.output_path, PathBuf::from("y.cpp"));
        assert!(!config.parallelize_loops);
        assert_eq!(config.known_functions, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_merge_empty_file_keeps_defaults() {
        let mut config = TransformConfig::default();
        config.merge_file(ConfigFile::default());
        assert!(config.parallelize_loops);
        assert_eq!(config.output_path, PathBuf::from(DEFAULT_OUTPUT_PATH));
    }
}
