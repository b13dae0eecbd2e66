//! Hybrid MPI/OpenMP parallelizer library
//!
//! Transforms a C/C++ translation unit into an equivalent one
//! instrumented for hybrid parallelism: function invocations in `main`
//! are scheduled across MPI ranks by a dependency DAG, and eligible
//! loops inside functions receive OpenMP parallel-for pragmas.
//!
//! The pipeline is a fixed sequence of passes over immutable artifacts:
//!
//! 1. parse (front-end crate) — AST plus verbatim source access
//! 2. global collection — file-scope names
//! 3. function analysis — read/write sets, signatures, body capture
//! 4. loop analysis — per-loop classification and pragma synthesis
//! 5. main extraction — call sites, locals, argument bindings
//! 6. scheduling — dependency edges, level-ordered groups
//! 7. emission — the output translation unit
//!
//! # Example
//!
//! ```rust,ignore
//! use hybridc::{TransformConfig, transform_file};
//!
//! let config = TransformConfig::new().with_output_path("out.cpp");
//! let output = transform_file(Path::new("input.cpp"), &config)?;
//! println!("{}", hybridc::report::render(&output.analysis));
//! ```

pub mod catalog;
pub mod codegen;
pub mod config;
pub mod functions;
pub mod globals;
pub mod loops;
pub mod main_extractor;
pub mod report;
pub mod schedule;
pub mod types;

pub use codegen::EmitError;
pub use config::{ConfigFile, DEFAULT_OUTPUT_PATH, TransformConfig};
pub use functions::FunctionSummary;
pub use loops::{LoopKind, LoopRecord, ReductionOp, Schedule};
pub use main_extractor::{CallSite, LocalBinding, LocalInit, MainSummary};
pub use schedule::{DependencyEdge, DependencyReason, ExecutionPlan};

use hybridc_frontend::SourceFile;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// All analysis artifacts for one translation unit, frozen after the
/// pipeline runs.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub globals: BTreeSet<String>,
    /// Function summaries in source order, loops attached.
    pub functions: Vec<FunctionSummary>,
    pub main: MainSummary,
    pub plan: ExecutionPlan,
}

/// The emitted translation unit plus the analysis it was derived from.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub code: String,
    pub analysis: Analysis,
}

/// Run the full pipeline over source text.
pub fn transform_source(
    source_text: &str,
    config: &TransformConfig,
) -> Result<TransformOutput, String> {
    let source = SourceFile::new(source_text);
    let tu = hybridc_frontend::parse(&source)?;
    tracing::debug!(
        functions = tu.functions.len(),
        globals = tu.globals.len(),
        "parsed translation unit"
    );

    let globals = globals::collect_globals(&tu);
    let mut functions = functions::analyze_functions(&tu, &source, &globals);
    for summary in &mut functions {
        if let Some(def) = tu.find_function(&summary.name) {
            summary.loops = loops::analyze_function_loops(def, &source);
        }
    }

    let extra_denied = config.extra_denied();
    let main = main_extractor::extract_main(&tu, &source, &functions, &extra_denied);
    let plan = schedule::build_plan(&main, &functions);
    tracing::debug!(
        calls = main.calls.len(),
        groups = plan.groups.len(),
        "execution plan built"
    );

    let code = if config.openmp_only {
        codegen::emit_openmp_only(&tu, &source, &functions).map_err(|e| e.to_string())?
    } else {
        codegen::emit(
            &tu,
            &source,
            &functions,
            &main,
            &plan,
            config.parallelize_loops,
        )
        .map_err(|e| e.to_string())?
    };

    Ok(TransformOutput {
        code,
        analysis: Analysis {
            globals,
            functions,
            main,
            plan,
        },
    })
}

/// Transform a file on disk and write the emitted translation unit to
/// the configured output path.
pub fn transform_file(input: &Path, config: &TransformConfig) -> Result<TransformOutput, String> {
    let source_text = fs::read_to_string(input)
        .map_err(|e| format!("Failed to read source file {}: {}", input.display(), e))?;
    let output = transform_source(&source_text, config)?;
    fs::write(&config.output_path, &output.code).map_err(|e| {
        format!(
            "Failed to write output file {}: {}",
            config.output_path.display(),
            e
        )
    })?;
    Ok(output)
}

/// Run the analysis passes only, without emitting a file.
pub fn analyze_source(source_text: &str, config: &TransformConfig) -> Result<Analysis, String> {
    transform_source(source_text, config).map(|output| output.analysis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_source_end_to_end() {
        let output = transform_source(
            "double f() { return 1.0; }\nint main() {\n    double x = f();\n    return 0;\n}\n",
            &TransformConfig::default(),
        )
        .unwrap();
        assert!(output.code.contains("#include <mpi.h>"));
        assert!(output.code.contains("int main(int argc, char* argv[])"));
        assert_eq!(output.analysis.main.calls.len(), 1);
        assert_eq!(output.analysis.plan.groups.len(), 1);
    }

    #[test]
    fn test_parse_failure_propagates() {
        let err = transform_source("int = ;", &TransformConfig::default()).unwrap_err();
        assert!(err.contains("Expected"), "unexpected error: {}", err);
    }

    #[test]
    fn test_missing_main_still_emits() {
        let output = transform_source(
            "int helper() { return 3; }\n",
            &TransformConfig::default(),
        )
        .unwrap();
        assert!(output.analysis.main.calls.is_empty());
        assert!(output.code.contains("// No user function calls detected in main"));
    }

    #[test]
    fn test_transform_file_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.cpp");
        let output_path = dir.path().join("out.cpp");
        std::fs::write(&input, "int f() { return 1; }\nint main() { int x = f(); return 0; }\n")
            .unwrap();

        let config = TransformConfig::new().with_output_path(&output_path);
        let output = transform_file(&input, &config).unwrap();
        let written = std::fs::read_to_string(&output_path).unwrap();
        assert_eq!(written, output.code);
    }

    #[test]
    fn test_transform_file_missing_input() {
        let config = TransformConfig::default();
        let err = transform_file(Path::new("/nonexistent/input.cpp"), &config).unwrap_err();
        assert!(err.contains("Failed to read source file"));
    }
}
