//! Output translation-unit emission
//!
//! Consumes every analysis artifact and produces the final C++ text:
//! the MPI/OpenMP preamble, global declarations, user functions with
//! OpenMP pragmas stitched into their bodies, and a synthesized MPI
//! `main` that dispatches the execution plan's groups across ranks.
//!
//! # Emission strategy
//!
//! Function bodies are rewritten textually on top of the verbatim
//! source captured during analysis: thread-unsafe calls are substituted
//! first (token-aware), then the thread-local seed prologue is
//! inserted, then pragmas are placed above their loops in descending
//! source order so earlier offsets stay valid. The synthesized `main`
//! renames locals that collide with MPI reserved identifiers and
//! applies the rename consistently with word-boundary substitution.

mod error;

pub use error::EmitError;

use crate::functions::FunctionSummary;
use crate::loops::LoopRecord;
use crate::main_extractor::{CallSite, LocalBinding, MainSummary};
use crate::schedule::ExecutionPlan;
use crate::types;
use hybridc_frontend::{Initializer, SourceFile, TranslationUnit};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::LazyLock;

/// Local names in the synthesized `main` that belong to the MPI
/// scaffolding; user locals with these names are renamed.
const MPI_RESERVED_NAMES: &[&str] = &[
    "rank", "size", "provided", "argc", "argv", "status", "request", "comm", "tag", "source",
    "dest", "count", "datatype",
];

/// Token-aware match for `rand()` calls.
static RAND_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\brand\s*\(\s*\)").expect("static regex"));

/// Fallback headers when the input had no includes of its own.
const FALLBACK_INCLUDES: &[&str] = &[
    "#include <stdio.h>",
    "#include <iostream>",
    "#include <vector>",
    "#include <cmath>",
    "#include <time.h>",
    "#include <chrono>",
    "#include <string>",
];

/// Emit the complete output translation unit.
pub fn emit(
    tu: &TranslationUnit,
    source: &SourceFile,
    summaries: &[FunctionSummary],
    main: &MainSummary,
    plan: &ExecutionPlan,
    parallelize_loops: bool,
) -> Result<String, EmitError> {
    let emitter = Emitter {
        tu,
        source,
        summaries,
        main,
        plan,
        parallelize_loops,
        rename: build_rename_map(&main.locals),
    };
    emitter.render()
}

struct Emitter<'a> {
    tu: &'a TranslationUnit,
    source: &'a SourceFile,
    summaries: &'a [FunctionSummary],
    main: &'a MainSummary,
    plan: &'a ExecutionPlan,
    parallelize_loops: bool,
    /// Old name → emitted name, one entry per `main` local.
    rename: BTreeMap<String, String>,
}

impl<'a> Emitter<'a> {
    fn render(&self) -> Result<String, EmitError> {
        let mut out = String::new();
        self.emit_preamble(&mut out)?;
        self.emit_globals(&mut out)?;
        self.emit_functions(&mut out)?;
        self.emit_main(&mut out)?;
        Ok(out)
    }

    fn summary_of(&self, name: &str) -> Option<&FunctionSummary> {
        self.summaries.iter().find(|s| s.name == name)
    }

    fn resolved<'b>(&'b self, name: &'b str) -> &'b str {
        self.rename.get(name).map(|s| s.as_str()).unwrap_or(name)
    }

    // ------------------------------------------------------------------
    // Preamble and globals
    // ------------------------------------------------------------------

    fn emit_preamble(&self, out: &mut String) -> Result<(), EmitError> {
        // The synthesized main always needs std::cout and std::min
        let mut emitted: BTreeSet<&str> = BTreeSet::new();
        for line in [
            "#include <mpi.h>",
            "#include <omp.h>",
            "#include <iostream>",
            "#include <algorithm>",
        ] {
            writeln!(out, "{}", line)?;
            emitted.insert(line);
        }
        if self.tu.includes.is_empty() {
            for line in FALLBACK_INCLUDES.iter().copied() {
                if emitted.insert(line) {
                    writeln!(out, "{}", line)?;
                }
            }
        } else {
            for line in &self.tu.includes {
                if emitted.insert(line.as_str()) {
                    writeln!(out, "{}", line)?;
                }
            }
        }
        writeln!(out)?;
        if !self.tu.typedefs.is_empty() {
            for line in &self.tu.typedefs {
                writeln!(out, "{}", line)?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    /// Globals actually touched by an emitted function, declared once.
    /// Parsed declarations are reproduced; names with no declaration
    /// fall back to a name heuristic.
    fn emit_globals(&self, out: &mut String) -> Result<(), EmitError> {
        let mut needed: BTreeSet<&str> = BTreeSet::new();
        for summary in self.summaries {
            if summary.name == "main" {
                continue;
            }
            needed.extend(summary.global_reads.iter().map(|s| s.as_str()));
            needed.extend(summary.global_writes.iter().map(|s| s.as_str()));
        }
        if needed.is_empty() {
            return Ok(());
        }

        writeln!(out, "// Global variables")?;
        for name in needed {
            match self.tu.globals.iter().find(|g| g.name == name) {
                Some(decl) => {
                    let mut line = format!("{} {}", decl.type_name, decl.name);
                    if let Some(suffix) = &decl.array_suffix {
                        line.push_str(suffix);
                    }
                    match &decl.init {
                        Initializer::None => {}
                        Initializer::Assign(expr) => {
                            write!(line, " = {}", self.source.slice(expr.span))?;
                        }
                        Initializer::Ctor(_, span) => {
                            line.push_str(self.source.slice(*span));
                        }
                        Initializer::Brace(span) => {
                            write!(line, " = {}", self.source.slice(*span))?;
                        }
                    }
                    writeln!(out, "{};", line)?;
                }
                None => {
                    // Declaration unavailable; infer from the name
                    if name.contains("array") {
                        writeln!(out, "int {}[1000];", name)?;
                    } else if name.contains("sum") || name.contains("result") {
                        writeln!(out, "double {} = 0.0;", name)?;
                    } else if name.contains("flag") {
                        writeln!(out, "bool {} = false;", name)?;
                    } else {
                        writeln!(out, "int {} = 0;", name)?;
                    }
                }
            }
        }
        writeln!(out)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Function emission
    // ------------------------------------------------------------------

    fn emit_functions(&self, out: &mut String) -> Result<(), EmitError> {
        for summary in self.summaries {
            if summary.name == "main" {
                continue;
            }
            writeln!(out, "// Parallelized function: {}", summary.name)?;
            if summary.has_parallelizable_loops() {
                if self.parallelize_loops {
                    writeln!(out, "// Contains parallelizable loops - OpenMP pragmas added")?;
                } else {
                    writeln!(out, "// Contains loops (OpenMP disabled by --no-loops flag)")?;
                }
            }

            let params: Vec<String> = summary
                .params
                .iter()
                .map(|(name, ty)| format!("{} {}", ty, name))
                .collect();
            write!(out, "{} {}({}) ", summary.return_type, summary.name, params.join(", "))?;

            if self.parallelize_loops && summary.has_parallelizable_loops() {
                out.push_str(&rewrite_body(summary));
            } else {
                out.push_str(&summary.body_text);
            }
            out.push_str("\n\n");
        }

        self.emit_missing_function_stubs(out)
    }

    /// Callees in `main` with no definition get a stub so the emitted
    /// file still links.
    fn emit_missing_function_stubs(&self, out: &mut String) -> Result<(), EmitError> {
        let mut emitted: BTreeSet<&str> = BTreeSet::new();
        for call in &self.main.calls {
            if self.summary_of(&call.callee_name).is_some()
                || !emitted.insert(call.callee_name.as_str())
            {
                continue;
            }
            let return_type = types::normalize(&call.return_type).to_string();
            writeln!(out, "// Function definition not found for: {}", call.callee_name)?;
            writeln!(out, "{} {}() {{", return_type, call.callee_name)?;
            writeln!(out, "    printf(\"Executing {}\\n\");", call.callee_name)?;
            if return_type != "void" {
                writeln!(out, "    return {};", types::default_literal_of(&return_type))?;
            }
            writeln!(out, "}}")?;
            writeln!(out)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Synthesized main
    // ------------------------------------------------------------------

    fn emit_main(&self, out: &mut String) -> Result<(), EmitError> {
        writeln!(out, "int main(int argc, char* argv[]) {{")?;
        writeln!(out, "    int rank, size, provided;")?;
        writeln!(out)?;
        writeln!(out, "    // Initialize MPI with thread support")?;
        writeln!(out, "    MPI_Init_thread(&argc, &argv, MPI_THREAD_FUNNELED, &provided);")?;
        writeln!(out, "    MPI_Comm_rank(MPI_COMM_WORLD, &rank);")?;
        writeln!(out, "    MPI_Comm_size(MPI_COMM_WORLD, &size);")?;
        writeln!(out)?;

        self.emit_banner(out)?;
        self.emit_local_declarations(out)?;
        self.emit_result_slots(out)?;

        if self.plan.groups.is_empty() {
            writeln!(out, "    // No user function calls detected in main")?;
            writeln!(out, "    MPI_Barrier(MPI_COMM_WORLD);")?;
            writeln!(out)?;
        } else {
            for (group_index, group) in self.plan.groups.iter().enumerate() {
                self.emit_group(out, group_index, group)?;
            }
        }

        self.emit_result_section(out)?;

        writeln!(out, "    MPI_Finalize();")?;
        writeln!(out, "    return 0;")?;
        writeln!(out, "}}")?;
        Ok(())
    }

    fn emit_banner(&self, out: &mut String) -> Result<(), EmitError> {
        writeln!(out, "    if (rank == 0) {{")?;
        writeln!(
            out,
            "        std::cout << \"=== Enhanced Hybrid MPI/OpenMP Parallelized Program ===\" << std::endl;"
        )?;
        writeln!(out, "        std::cout << \"MPI processes: \" << size << std::endl;")?;
        writeln!(
            out,
            "        std::cout << \"OpenMP threads per process: \" << omp_get_max_threads() << std::endl;"
        )?;

        let mut with_loops: Vec<&str> = self
            .summaries
            .iter()
            .filter(|s| s.name != "main" && s.has_parallelizable_loops())
            .map(|s| s.name.as_str())
            .collect();
        with_loops.sort_unstable();
        if self.parallelize_loops && !with_loops.is_empty() {
            writeln!(
                out,
                "        std::cout << \"Functions with parallelized loops: \" << std::endl;"
            )?;
            for name in with_loops {
                writeln!(out, "        std::cout << \"  {}\" << std::endl;", name)?;
            }
        }
        writeln!(out, "    }}")?;
        writeln!(out)?;
        Ok(())
    }

    fn emit_local_declarations(&self, out: &mut String) -> Result<(), EmitError> {
        if self.main.locals.is_empty() {
            return Ok(());
        }
        writeln!(out, "    // Local variables from original main function (ordered by source)")?;
        for local in &self.main.locals {
            let resolved = self.resolved(&local.name);
            let suffix = local.array_suffix.as_deref().unwrap_or("");
            // A local defined by a recorded call gets its value from the
            // group execution; repeating the call here would run it on
            // every rank.
            if local.defined_at_call.is_some() {
                if local.mpi_eligible() {
                    writeln!(
                        out,
                        "    {} {} = {};",
                        local.type_name,
                        resolved,
                        types::default_literal_of(&local.type_name)
                    )?;
                } else {
                    writeln!(out, "    {} {}{};", local.type_name, resolved, suffix)?;
                }
                continue;
            }
            match &local.init {
                crate::main_extractor::LocalInit::Default => {
                    writeln!(out, "    {} {}{};", local.type_name, resolved, suffix)?;
                }
                crate::main_extractor::LocalInit::Assign(rhs) => {
                    let rhs = substitute_names(rhs, &self.rename);
                    writeln!(out, "    {} {}{} = {};", local.type_name, resolved, suffix, rhs)?;
                }
                crate::main_extractor::LocalInit::Ctor(text) => {
                    let text = substitute_names(text, &self.rename);
                    // `NAME(args)` with the name already renamed
                    let args = text
                        .strip_prefix(resolved)
                        .map(|rest| rest.to_string())
                        .unwrap_or_else(|| text.clone());
                    writeln!(out, "    {} {}{};", local.type_name, resolved, args)?;
                }
            }
        }
        writeln!(out)?;
        Ok(())
    }

    fn emit_result_slots(&self, out: &mut String) -> Result<(), EmitError> {
        let mut any = false;
        for call in &self.main.calls {
            if !call.has_return_value {
                continue;
            }
            let return_type = types::normalize(&call.return_type);
            writeln!(
                out,
                "    {} result_{} = {};",
                return_type,
                call.order_index,
                types::default_literal_of(return_type)
            )?;
            any = true;
        }
        if any {
            writeln!(out)?;
        }
        Ok(())
    }

    /// The invocation text for a call site: the renamed raw text with
    /// any `NAME =` prefix and trailing semicolon stripped.
    fn call_expr_text(&self, call: &CallSite) -> String {
        let substituted = substitute_names(&call.raw_text, &self.rename);
        let body = if call.return_binding.is_some() {
            match substituted.find('=') {
                Some(eq) => substituted[eq + 1..].to_string(),
                None => substituted,
            }
        } else {
            substituted
        };
        body.trim().trim_end_matches(';').trim().to_string()
    }

    fn emit_group(
        &self,
        out: &mut String,
        group_index: usize,
        group: &[usize],
    ) -> Result<(), EmitError> {
        let calls: Vec<&CallSite> = group
            .iter()
            .map(|&k| {
                self.main
                    .calls
                    .get(k)
                    .ok_or_else(|| format!("execution plan references unknown call {}", k))
            })
            .collect::<Result<_, String>>()?;

        writeln!(out, "    // === Parallel group {} ===", group_index)?;
        writeln!(out, "    if (rank == 0) {{")?;
        writeln!(
            out,
            "        std::cout << \"\\n--- Executing Group {} ---\" << std::endl;",
            group_index
        )?;
        writeln!(out, "    }}")?;

        if calls.len() == 1 {
            self.emit_singleton_call(out, calls[0])?;
        } else {
            self.emit_parallel_calls(out, &calls)?;
        }

        self.emit_group_broadcasts(out, &calls)?;
        writeln!(out, "    MPI_Barrier(MPI_COMM_WORLD);")?;
        writeln!(out)?;
        Ok(())
    }

    fn emit_singleton_call(&self, out: &mut String, call: &CallSite) -> Result<(), EmitError> {
        writeln!(out, "    if (rank == 0) {{")?;
        if call.has_return_value {
            writeln!(out, "        result_{} = {};", call.order_index, self.call_expr_text(call))?;
            if let Some(bound) = &call.return_binding {
                writeln!(out, "        {} = result_{};", self.resolved(bound), call.order_index)?;
            }
        } else {
            writeln!(out, "        {};", self.call_expr_text(call))?;
        }
        writeln!(out, "    }}")?;
        Ok(())
    }

    /// Workers compute and send; rank 0 receives afterwards. The sends
    /// always precede the receive block, and the group barrier follows
    /// the broadcasts.
    fn emit_parallel_calls(&self, out: &mut String, calls: &[&CallSite]) -> Result<(), EmitError> {
        writeln!(out, "    {{")?;
        writeln!(out, "        // Dynamic process assignment to avoid deadlocks")?;
        writeln!(
            out,
            "        int effective_processes = std::min(size, (int){});",
            calls.len()
        )?;
        for (i, call) in calls.iter().enumerate() {
            writeln!(
                out,
                "        int assigned_rank_{} = {} % effective_processes;",
                call.order_index, i
            )?;
        }

        for call in calls {
            let k = call.order_index;
            writeln!(out, "        if (rank == assigned_rank_{}) {{", k)?;
            if call.has_return_value {
                writeln!(out, "            result_{} = {};", k, self.call_expr_text(call))?;
                match types::mpi_type_of(&call.return_type) {
                    Some(mpi) => {
                        writeln!(out, "            if (assigned_rank_{} != 0) {{", k)?;
                        writeln!(
                            out,
                            "                MPI_Send(&result_{}, 1, {}, 0, {}, MPI_COMM_WORLD);",
                            k, mpi, k
                        )?;
                        writeln!(out, "            }}")?;
                    }
                    None => {
                        writeln!(
                            out,
                            "            // Skipping MPI_Send for unsupported type: {}",
                            call.return_type
                        )?;
                    }
                }
            } else {
                writeln!(out, "            {};", self.call_expr_text(call))?;
            }
            writeln!(out, "        }}")?;
        }

        writeln!(out, "        if (rank == 0) {{")?;
        for call in calls {
            let k = call.order_index;
            if !call.has_return_value {
                continue;
            }
            match types::mpi_type_of(&call.return_type) {
                Some(mpi) => {
                    writeln!(out, "            if (assigned_rank_{} != 0) {{", k)?;
                    writeln!(
                        out,
                        "                MPI_Recv(&result_{}, 1, {}, assigned_rank_{}, {}, MPI_COMM_WORLD, MPI_STATUS_IGNORE);",
                        k, mpi, k, k
                    )?;
                    writeln!(out, "            }}")?;
                }
                None => {
                    writeln!(
                        out,
                        "            // Skipping MPI_Recv for unsupported type: {}",
                        call.return_type
                    )?;
                }
            }
        }
        for call in calls {
            if let Some(bound) = &call.return_binding {
                writeln!(
                    out,
                    "            {} = result_{};",
                    self.resolved(bound),
                    call.order_index
                )?;
            }
        }
        writeln!(out, "        }}")?;
        writeln!(out, "    }}")?;
        Ok(())
    }

    /// Every local a group updated travels to all ranks before the
    /// barrier; unsupported types get a comment instead.
    fn emit_group_broadcasts(&self, out: &mut String, calls: &[&CallSite]) -> Result<(), EmitError> {
        let mut updated: BTreeMap<&str, &LocalBinding> = BTreeMap::new();
        for call in calls {
            if let Some(bound) = &call.return_binding
                && let Some(local) = self.main.local(bound)
            {
                updated.insert(self.resolved(bound), local);
            }
        }
        if updated.is_empty() {
            return Ok(());
        }
        writeln!(out, "    // Broadcast updated variables to all processes")?;
        for (resolved, local) in updated {
            if local.array_suffix.is_none()
                && let Some(mpi) = types::mpi_type_of(&local.type_name)
            {
                writeln!(out, "    MPI_Bcast(&{}, 1, {}, 0, MPI_COMM_WORLD);", resolved, mpi)?;
            } else {
                let mut ty = local.type_name.clone();
                if let Some(suffix) = &local.array_suffix {
                    ty.push_str(suffix);
                }
                writeln!(out, "    // Skipping MPI_Bcast for unsupported type: {}", ty)?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Result report inside the emitted main
    // ------------------------------------------------------------------

    fn emit_result_section(&self, out: &mut String) -> Result<(), EmitError> {
        writeln!(out, "    if (rank == 0) {{")?;
        writeln!(out, "        std::cout << \"\\n=== Results ===\" << std::endl;")?;
        writeln!(
            out,
            "        std::cout << \"\\n=== Loop Parallelization Summary ===\" << std::endl;"
        )?;
        if !self.parallelize_loops {
            writeln!(
                out,
                "        std::cout << \"Loop parallelization DISABLED (--no-loops flag)\" << std::endl;"
            )?;
        }

        let mut with_loops: Vec<&FunctionSummary> = self
            .summaries
            .iter()
            .filter(|s| s.name != "main" && !s.loops.is_empty())
            .collect();
        with_loops.sort_unstable_by(|a, b| a.name.cmp(&b.name));
        for summary in with_loops {
            writeln!(
                out,
                "        std::cout << \"Function {}: \" << {} << \" loops found\" << std::endl;",
                summary.name,
                summary.loops.len()
            )?;
            for l in &summary.loops {
                let verdict = if l.parallelizable {
                    "PARALLELIZED"
                } else {
                    "not parallelized"
                };
                writeln!(
                    out,
                    "        std::cout << \"  - Line {}: {} ({})\" << std::endl;",
                    l.start.line,
                    verdict,
                    l.kind.as_str()
                )?;
            }
        }

        for local in &self.main.locals {
            if local.array_suffix.is_none() && types::is_printable(&local.type_name) {
                writeln!(
                    out,
                    "        std::cout << \"{} = \" << {} << std::endl;",
                    local.name,
                    self.resolved(&local.name)
                )?;
            }
        }
        for call in &self.main.calls {
            if call.has_return_value
                && call.return_binding.is_none()
                && types::is_printable(types::normalize(&call.return_type))
            {
                writeln!(
                    out,
                    "        std::cout << \"{} result: \" << result_{} << std::endl;",
                    call.callee_name, call.order_index
                )?;
            }
        }

        writeln!(
            out,
            "        std::cout << \"\\n=== Enhanced Hybrid MPI/OpenMP Execution Complete ===\" << std::endl;"
        )?;
        writeln!(out, "    }}")?;
        writeln!(out)?;
        Ok(())
    }
}

/// Emit the OpenMP-only rendition: the original translation unit
/// reproduced verbatim with pragmas spliced into function bodies —
/// `main` included — and no MPI scaffolding.
pub fn emit_openmp_only(
    tu: &TranslationUnit,
    source: &SourceFile,
    summaries: &[FunctionSummary],
) -> Result<String, EmitError> {
    let mut out = String::from("// OpenMP Parallelized Version\n");
    if !tu.includes.iter().any(|line| line.contains("<omp.h>")) {
        out.push_str("#include <omp.h>\n");
    }

    let text = source.text();
    let mut cursor = 0usize;
    for def in &tu.functions {
        let Some(summary) = summaries.iter().find(|s| s.name == def.name) else {
            continue;
        };
        if def.body_span.start < cursor {
            continue; // overlapping span, keep the earlier splice
        }
        out.push_str(&text[cursor..def.body_span.start]);
        if summary.has_parallelizable_loops() {
            out.push_str(&rewrite_body(summary));
        } else {
            out.push_str(&summary.body_text);
        }
        cursor = def.body_span.end;
    }
    out.push_str(&text[cursor..]);
    Ok(out)
}

// ----------------------------------------------------------------------
// Body rewriting
// ----------------------------------------------------------------------

/// Rewrite a function body: substitute `rand()` when a loop demands a
/// thread-local seed, insert the seed prologue, then place pragmas in
/// descending source order so offsets discovered earlier stay valid.
fn rewrite_body(summary: &FunctionSummary) -> String {
    let mut body = summary.body_text.clone();

    let needs_rand_fix = summary
        .loops
        .iter()
        .any(|l| l.unsafe_calls.contains("rand"));
    if needs_rand_fix {
        body = RAND_CALL.replace_all(&body, "rand_r(&__thread_seed)").into_owned();
    }

    let needs_seed = summary
        .loops
        .iter()
        .any(|l| l.thread_local_needs.contains("__thread_seed"));
    if needs_seed
        && let Some(brace) = body.find('{')
    {
        body.insert_str(
            brace + 1,
            "\n    unsigned int __thread_seed = (unsigned int)time(NULL) ^ omp_get_thread_num();",
        );
    }

    let mut loops: Vec<&LoopRecord> = summary
        .loops
        .iter()
        .filter(|l| l.parallelizable && !l.pragma_text.is_empty())
        .collect();
    loops.sort_by(|a, b| (b.start.line, b.start.column).cmp(&(a.start.line, a.start.column)));

    let mut processed: BTreeSet<&str> = BTreeSet::new();
    for l in loops {
        if !processed.insert(l.source_text.as_str()) {
            continue;
        }
        let Some(for_pos) = locate_loop(&body, l) else {
            continue;
        };
        let line_start = body[..for_pos].rfind('\n').map(|i| i + 1).unwrap_or(0);
        // An existing pragma shortly before the loop means the input was
        // already transformed; never duplicate it.
        let window_start = line_start.saturating_sub(200);
        if body[window_start..for_pos].contains("#pragma omp") {
            continue;
        }
        let indent: String = body[line_start..for_pos]
            .chars()
            .take_while(|c| *c == ' ' || *c == '\t')
            .collect();
        body.insert_str(line_start, &format!("{}{}\n", indent, l.pragma_text));
    }

    body
}

/// Find the loop's position in the (possibly rewritten) body: exact
/// text first, then the text with the `rand()` substitution applied,
/// then the `for (VAR` patterns.
fn locate_loop(body: &str, l: &LoopRecord) -> Option<usize> {
    if let Some(pos) = body.find(&l.source_text) {
        return Some(pos);
    }
    let substituted = RAND_CALL.replace_all(&l.source_text, "rand_r(&__thread_seed)");
    if let Some(pos) = body.find(substituted.as_ref()) {
        return Some(pos);
    }
    let var = l.iteration_variable.as_deref()?;
    body.find(&format!("for ({}", var))
        .or_else(|| body.find(&format!("for (int {}", var)))
}

// ----------------------------------------------------------------------
// Name substitution
// ----------------------------------------------------------------------

/// One rename entry per local; collisions with MPI reserved names take
/// a `user_` prefix, repeated until unique.
fn build_rename_map(locals: &[LocalBinding]) -> BTreeMap<String, String> {
    let taken: BTreeSet<&str> = locals.iter().map(|l| l.name.as_str()).collect();
    let mut rename = BTreeMap::new();
    for local in locals {
        let mut resolved = local.name.clone();
        if MPI_RESERVED_NAMES.contains(&local.name.as_str()) {
            resolved = format!("user_{}", local.name);
            while taken.contains(resolved.as_str())
                || rename.values().any(|v| v == &resolved)
            {
                resolved = format!("user_{}", resolved);
            }
        }
        rename.insert(local.name.clone(), resolved);
    }
    rename
}

/// Apply every changed rename with word-boundary matching; partial
/// identifier matches are never replaced.
fn substitute_names(text: &str, rename: &BTreeMap<String, String>) -> String {
    let mut result = text.to_string();
    for (old, new) in rename {
        if old != new {
            result = replace_word(&result, old, new);
        }
    }
    result
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn replace_word(text: &str, old: &str, new: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < text.len() {
        if text[i..].starts_with(old) {
            let end = i + old.len();
            let boundary_before = i == 0 || !is_word_byte(bytes[i - 1]);
            let boundary_after = end >= text.len() || !is_word_byte(bytes[end]);
            if boundary_before && boundary_after {
                out.push_str(new);
                i = end;
                continue;
            }
        }
        let ch = text[i..].chars().next().expect("in-bounds index");
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}
