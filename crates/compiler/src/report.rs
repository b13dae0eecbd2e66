//! Analysis report rendering
//!
//! Builds the structured text report printed after emission: globals,
//! `main` locals, per-function read/write sets, per-loop verdicts with
//! pragmas and notes, totals, and the execution plan. The report's
//! grammar is part of the tool's interface; tests pattern-match on it.

use crate::Analysis;
use crate::functions::FunctionSummary;
use std::fmt::Write as _;

/// Render the complete analysis report.
pub fn render(analysis: &Analysis) -> String {
    let mut out = String::new();
    let _ = write_report(analysis, &mut out);
    out
}

fn write_report(analysis: &Analysis, out: &mut String) -> std::fmt::Result {
    writeln!(out, "=== Hybrid MPI/OpenMP Analysis ===")?;

    writeln!(out, "\nGlobal variables:")?;
    for name in &analysis.globals {
        writeln!(out, "  {}", name)?;
    }

    writeln!(out, "\nLocal variables in main:")?;
    for local in &analysis.main.locals {
        let suffix = local.array_suffix.as_deref().unwrap_or("");
        writeln!(out, "  {} ({}{})", local.name, local.type_name, suffix)?;
    }

    writeln!(out, "\nFunction analysis:")?;
    let mut sorted: Vec<&FunctionSummary> = analysis.functions.iter().collect();
    sorted.sort_unstable_by(|a, b| a.name.cmp(&b.name));
    for summary in &sorted {
        writeln!(out, "  Function: {}", summary.name)?;
        writeln!(out, "    Return type: {}", summary.return_type)?;
        writeln!(out, "    Global reads: {}", join(&summary.global_reads))?;
        writeln!(out, "    Global writes: {}", join(&summary.global_writes))?;
    }

    writeln!(out, "\nLoop analysis:")?;
    let mut total_loops = 0usize;
    let mut parallelizable_loops = 0usize;
    for summary in &sorted {
        if summary.loops.is_empty() {
            continue;
        }
        writeln!(out, "\nFunction: {}", summary.name)?;
        for l in &summary.loops {
            total_loops += 1;
            writeln!(out, "  Loop at lines {}-{}:", l.start.line, l.end.line)?;
            writeln!(out, "    Type: {}", l.kind.as_str())?;
            writeln!(
                out,
                "    Parallelizable: {}",
                if l.parallelizable { "YES" } else { "NO" }
            )?;
            if l.parallelizable {
                parallelizable_loops += 1;
                writeln!(out, "    Schedule: {}", l.schedule.name())?;
                writeln!(out, "    Pragma: {}", l.pragma_text)?;
                if let Some(var) = &l.iteration_variable {
                    writeln!(out, "    Loop variable: {}", var)?;
                }
            }
            if !l.reductions.is_empty() {
                let reductions: Vec<String> = l
                    .reductions
                    .iter()
                    .map(|(var, op)| format!("{} ({})", var, op.symbol()))
                    .collect();
                writeln!(out, "    Reductions: {}", reductions.join(", "))?;
            }
            if !l.reads.is_empty() {
                writeln!(out, "    Variables read: {}", join(&l.reads))?;
            }
            if !l.writes.is_empty() {
                writeln!(out, "    Variables written: {}", join(&l.writes))?;
            }
            writeln!(out, "    Analysis: {}", l.notes.trim_end())?;
        }
    }

    writeln!(out, "\nLoop parallelization summary:")?;
    writeln!(out, "Total loops found: {}", total_loops)?;
    writeln!(out, "Parallelizable loops: {}", parallelizable_loops)?;
    let rate = if total_loops > 0 {
        100.0 * parallelizable_loops as f64 / total_loops as f64
    } else {
        0.0
    };
    writeln!(out, "Parallelization rate: {:.1}%", rate)?;

    writeln!(out, "\nFunction calls in main():")?;
    for call in &analysis.main.calls {
        writeln!(
            out,
            "  {}: {} (line {})",
            call.order_index, call.callee_name, call.line
        )?;
    }

    writeln!(out, "\nDependency edges:")?;
    for edge in &analysis.plan.edges {
        let reasons: Vec<String> = edge.reasons.iter().map(|r| r.to_string()).collect();
        writeln!(
            out,
            "  {} -> {}: {}",
            edge.from,
            edge.to,
            reasons.join("; ")
        )?;
    }

    writeln!(out, "\nExecution plan:")?;
    for (i, group) in analysis.plan.groups.iter().enumerate() {
        let names: Vec<&str> = group
            .iter()
            .filter_map(|&k| analysis.main.calls.get(k))
            .map(|c| c.callee_name.as_str())
            .collect();
        writeln!(out, "  Group {}: {}", i, names.join(" "))?;
    }

    writeln!(out, "\n=== Analysis complete ===")?;
    Ok(())
}

/// Render the analysis as a JSON document, for tooling that consumes
/// the report programmatically.
pub fn render_json(analysis: &Analysis) -> String {
    let functions: Vec<serde_json::Value> = analysis
        .functions
        .iter()
        .map(|f| {
            serde_json::json!({
                "name": f.name,
                "return_type": f.return_type,
                "global_reads": f.global_reads,
                "global_writes": f.global_writes,
                "local_symbols": f.local_symbols,
                "loops": f.loops.iter().map(|l| {
                    let schedule = l.parallelizable.then(|| l.schedule.name());
                    let pragma = (!l.pragma_text.is_empty()).then_some(l.pragma_text.as_str());
                    let reductions: Vec<serde_json::Value> = l.reductions.iter()
                        .map(|(var, op)| serde_json::json!({"variable": var, "op": op.symbol()}))
                        .collect();
                    serde_json::json!({
                        "kind": l.kind.as_str(),
                        "start_line": l.start.line,
                        "end_line": l.end.line,
                        "iteration_variable": l.iteration_variable,
                        "parallelizable": l.parallelizable,
                        "schedule": schedule,
                        "pragma": pragma,
                        "reductions": reductions,
                        "reads": l.reads,
                        "writes": l.writes,
                        "notes": l.notes.trim_end(),
                    })
                }).collect::<Vec<_>>(),
            })
        })
        .collect();

    let calls: Vec<serde_json::Value> = analysis
        .main
        .calls
        .iter()
        .map(|c| {
            serde_json::json!({
                "index": c.order_index,
                "callee": c.callee_name,
                "line": c.line,
                "has_return_value": c.has_return_value,
                "return_binding": c.return_binding,
                "return_type": c.return_type,
                "argument_variables": c.argument_variables,
            })
        })
        .collect();

    let locals: Vec<serde_json::Value> = analysis
        .main
        .locals
        .iter()
        .map(|l| {
            serde_json::json!({
                "name": l.name,
                "type": l.type_name,
                "declaration_order": l.declaration_order,
                "defined_at_call": l.defined_at_call,
                "used_at_calls": l.used_at_calls,
            })
        })
        .collect();

    let edges: Vec<serde_json::Value> = analysis
        .plan
        .edges
        .iter()
        .map(|e| {
            serde_json::json!({
                "from": e.from,
                "to": e.to,
                "reasons": e.reasons.iter().map(|r| r.to_string()).collect::<Vec<_>>(),
            })
        })
        .collect();

    let total_loops: usize = analysis.functions.iter().map(|f| f.loops.len()).sum();
    let parallelizable_loops: usize = analysis
        .functions
        .iter()
        .flat_map(|f| &f.loops)
        .filter(|l| l.parallelizable)
        .count();

    let document = serde_json::json!({
        "globals": analysis.globals,
        "functions": functions,
        "main": { "locals": locals, "calls": calls },
        "plan": { "groups": analysis.plan.groups, "edges": edges },
        "summary": {
            "total_loops": total_loops,
            "parallelizable_loops": parallelizable_loops,
        },
    });

    // Pretty output; the document is built from tree maps so key order
    // is stable across runs.
    serde_json::to_string_pretty(&document).unwrap_or_else(|_| "{}".to_string())
}

fn join(set: &std::collections::BTreeSet<String>) -> String {
    set.iter().cloned().collect::<Vec<_>>().join(" ")
}
