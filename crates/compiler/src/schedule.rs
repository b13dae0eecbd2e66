//! Call-level dependency analysis and execution planning
//!
//! Builds a dependency DAG over the call sites in `main` — local
//! data-flow edges plus global RAW/WAW/WAR hazards — and layers it with
//! Kahn's algorithm into an [`ExecutionPlan`]: an ordered sequence of
//! groups whose members are mutually independent and may run on
//! different MPI ranks.

use crate::functions::FunctionSummary;
use crate::main_extractor::{CallSite, MainSummary};
use std::collections::BTreeMap;

/// Why one call must precede another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyReason {
    /// The earlier call defines a local the later call reads.
    LocalDataFlow(String),
    /// The earlier call writes a global the later call reads.
    GlobalRaw(String),
    /// Both calls write the same global.
    GlobalWaw(String),
    /// The earlier call reads a global the later call writes.
    GlobalWar(String),
}

impl std::fmt::Display for DependencyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencyReason::LocalDataFlow(v) => write!(f, "Local variable data flow: {}", v),
            DependencyReason::GlobalRaw(v) => write!(f, "Global variable RAW: {}", v),
            DependencyReason::GlobalWaw(v) => write!(f, "Global variable WAW: {}", v),
            DependencyReason::GlobalWar(v) => write!(f, "Global variable WAR: {}", v),
        }
    }
}

/// A directed edge between two call sites, with every reason that
/// forces the ordering.
#[derive(Debug, Clone)]
pub struct DependencyEdge {
    pub from: usize,
    pub to: usize,
    pub reasons: Vec<DependencyReason>,
}

/// Level-ordered groups of independent call sites.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    /// Each group lists call indices in ascending source order.
    pub groups: Vec<Vec<usize>>,
    pub edges: Vec<DependencyEdge>,
}

impl ExecutionPlan {
    /// The group index a call belongs to.
    pub fn group_of(&self, call_index: usize) -> Option<usize> {
        self.groups.iter().position(|g| g.contains(&call_index))
    }
}

/// Build the dependency DAG and layer it into an execution plan.
pub fn build_plan(main: &MainSummary, summaries: &[FunctionSummary]) -> ExecutionPlan {
    let by_name: BTreeMap<&str, &FunctionSummary> =
        summaries.iter().map(|s| (s.name.as_str(), s)).collect();

    let edges = build_edges(&main.calls, &by_name);
    let groups = layer_groups(main.calls.len(), &edges);
    ExecutionPlan { groups, edges }
}

fn build_edges(
    calls: &[CallSite],
    by_name: &BTreeMap<&str, &FunctionSummary>,
) -> Vec<DependencyEdge> {
    let mut edges = Vec::new();

    for i in 0..calls.len() {
        for j in (i + 1)..calls.len() {
            let mut reasons = Vec::new();

            // Local data flow: call i defines a local that call j reads
            if let Some(bound) = &calls[i].return_binding
                && calls[j].used_locals.contains(bound)
            {
                reasons.push(DependencyReason::LocalDataFlow(bound.clone()));
            }

            // Global hazards, visible through the callee summaries
            if let (Some(a), Some(b)) = (
                by_name.get(calls[i].callee_name.as_str()),
                by_name.get(calls[j].callee_name.as_str()),
            ) {
                for var in a.global_writes.intersection(&b.global_reads) {
                    reasons.push(DependencyReason::GlobalRaw(var.clone()));
                }
                for var in a.global_writes.intersection(&b.global_writes) {
                    reasons.push(DependencyReason::GlobalWaw(var.clone()));
                }
                for var in a.global_reads.intersection(&b.global_writes) {
                    reasons.push(DependencyReason::GlobalWar(var.clone()));
                }
            }

            if !reasons.is_empty() {
                edges.push(DependencyEdge {
                    from: i,
                    to: j,
                    reasons,
                });
            }
        }
    }

    edges
}

/// Kahn's algorithm, layered: every round collects all calls whose
/// remaining in-degree is zero into one group. Ties break by ascending
/// call index, so singleton chains keep source order.
fn layer_groups(call_count: usize, edges: &[DependencyEdge]) -> Vec<Vec<usize>> {
    let mut in_degree = vec![0usize; call_count];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); call_count];
    for edge in edges {
        in_degree[edge.to] += 1;
        dependents[edge.from].push(edge.to);
    }

    let mut processed = vec![false; call_count];
    let mut groups = Vec::new();

    loop {
        let ready: Vec<usize> = (0..call_count)
            .filter(|&i| !processed[i] && in_degree[i] == 0)
            .collect();
        if ready.is_empty() {
            break;
        }
        for &i in &ready {
            processed[i] = true;
            for &dep in &dependents[i] {
                in_degree[dep] -= 1;
            }
        }
        groups.push(ready);
    }

    debug_assert!(
        processed.iter().all(|&p| p),
        "dependency graph contains a cycle"
    );
    groups
}
