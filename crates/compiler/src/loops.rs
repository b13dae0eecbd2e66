//! Loop discovery and OpenMP classification
//!
//! For every lexical loop in a function this pass produces a
//! [`LoopRecord`]: read/write/reduction sets, a catalog of blocking
//! patterns (I/O, break/continue, thread-unsafe calls, loop-carried
//! dependences), a parallelizability verdict, and — for accepted loops —
//! the synthesized `#pragma omp parallel for` line.
//!
//! Only outermost `for` loops are candidates. The analysis is
//! syntactic and conservative: a loop is parallelized only when every
//! rule in the fixed catalog passes.

use crate::catalog;
use hybridc_frontend::{
    BinOp, Expr, ExprKind, FunctionDef, SourceFile, SourcePos, Stmt,
};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    For,
    While,
    DoWhile,
}

impl LoopKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LoopKind::For => "for",
            LoopKind::While => "while",
            LoopKind::DoWhile => "do-while",
        }
    }
}

/// Reduction operators recognized on compound assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReductionOp {
    Add,
    Sub,
    Mul,
    BitAnd,
    BitOr,
    BitXor,
}

impl ReductionOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ReductionOp::Add => "+",
            ReductionOp::Sub => "-",
            ReductionOp::Mul => "*",
            ReductionOp::BitAnd => "&",
            ReductionOp::BitOr => "|",
            ReductionOp::BitXor => "^",
        }
    }
}

/// OpenMP schedule choice for a parallelized loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Static,
    DynamicChunked(u32),
}

impl Schedule {
    /// The clause body as it appears in the pragma.
    pub fn clause(self) -> String {
        match self {
            Schedule::Static => "static".to_string(),
            Schedule::DynamicChunked(chunk) => format!("dynamic,{}", chunk),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Schedule::Static => "static",
            Schedule::DynamicChunked(_) => "dynamic",
        }
    }
}

/// Everything the analyzer learned about one lexical loop.
#[derive(Debug, Clone)]
pub struct LoopRecord {
    pub kind: LoopKind,
    pub source_text: String,
    pub start: SourcePos,
    pub end: SourcePos,
    pub containing_function: String,
    pub iteration_variable: Option<String>,
    pub reads: BTreeSet<String>,
    pub writes: BTreeSet<String>,
    /// Reduction variables with their operators.
    pub reductions: BTreeMap<String, ReductionOp>,
    pub has_io: bool,
    pub has_function_call: bool,
    pub has_unsafe_call: bool,
    pub has_break_continue: bool,
    pub has_complex_condition: bool,
    pub is_nested_inner: bool,
    pub has_loop_carried_dep: bool,
    pub unsafe_calls: BTreeSet<String>,
    /// Synthetic names that must become thread-local (`__thread_seed`).
    pub thread_local_needs: BTreeSet<String>,
    pub parallelizable: bool,
    pub schedule: Schedule,
    pub pragma_text: String,
    pub notes: String,
}

/// Discover and classify every loop in a function body.
pub fn analyze_function_loops(def: &FunctionDef, source: &SourceFile) -> Vec<LoopRecord> {
    let mut records = Vec::new();
    let mut seen: BTreeSet<(u32, u32, &'static str)> = BTreeSet::new();
    for stmt in &def.body.stmts {
        walk_stmt(stmt, 0, def, source, &mut records, &mut seen);
    }
    records
}

fn walk_stmt(
    stmt: &Stmt,
    depth: u32,
    def: &FunctionDef,
    source: &SourceFile,
    records: &mut Vec<LoopRecord>,
    seen: &mut BTreeSet<(u32, u32, &'static str)>,
) {
    let loop_kind = match stmt {
        Stmt::For { .. } => Some(LoopKind::For),
        Stmt::While { .. } => Some(LoopKind::While),
        Stmt::DoWhile { .. } => Some(LoopKind::DoWhile),
        _ => None,
    };

    if let Some(kind) = loop_kind {
        let (start, _) = source.span_pos(stmt.span());
        let key = (start.line, start.column, kind.as_str());
        if seen.insert(key) {
            records.push(classify_loop(stmt, kind, depth + 1, def, source));
        }
        stmt.for_each_child(&mut |child| {
            walk_stmt(child, depth + 1, def, source, records, seen);
        });
        return;
    }

    stmt.for_each_child(&mut |child| {
        walk_stmt(child, depth, def, source, records, seen);
    });
}

/// Accumulated facts from one loop body walk.
#[derive(Default)]
struct BodyScan {
    reads: BTreeSet<String>,
    writes: BTreeSet<String>,
    reductions: BTreeMap<String, ReductionOp>,
    local_decls: BTreeSet<String>,
    unsafe_calls: BTreeSet<String>,
    thread_local_needs: BTreeSet<String>,
    has_io: bool,
    has_function_call: bool,
    has_unsafe_call: bool,
    has_break_continue: bool,
    is_nested_inner: bool,
}

fn classify_loop(
    stmt: &Stmt,
    kind: LoopKind,
    depth: u32,
    def: &FunctionDef,
    source: &SourceFile,
) -> LoopRecord {
    let (start, end) = source.span_pos(stmt.span());
    let source_text = source.slice(stmt.span()).to_string();

    let (iteration_variable, cond, body): (Option<String>, Option<&Expr>, &Stmt) = match stmt {
        Stmt::For {
            init, cond, body, ..
        } => {
            let var = init.as_deref().and_then(|i| match i {
                Stmt::Decl { decls, .. } => decls.first().map(|d| d.name.clone()),
                _ => None,
            });
            (var, cond.as_ref(), body.as_ref())
        }
        Stmt::While { cond, body, .. } => (None, Some(cond), body.as_ref()),
        Stmt::DoWhile { cond, body, .. } => (None, Some(cond), body.as_ref()),
        _ => unreachable!("classify_loop called on a non-loop statement"),
    };

    // Complex condition: `&&` or `||` anywhere in the condition text
    let has_complex_condition = cond
        .map(|c| {
            let text: String = source
                .slice(c.span)
                .chars()
                .filter(|ch| !ch.is_whitespace())
                .collect();
            text.contains("&&") || text.contains("||")
        })
        .unwrap_or(false);

    // Pre-collect locals declared inside the loop; compound assignments
    // to these are private accumulation, not reductions.
    let mut scan = BodyScan::default();
    collect_loop_locals(body, &mut scan.local_decls);
    scan_stmt(body, &mut scan);

    // Loop-carried dependence: array accessed at an offset of the
    // iteration variable while also written at the iteration variable.
    let has_loop_carried_dep =
        detect_loop_carried_dep(&source_text, iteration_variable.as_deref());

    // Secondary reduction scan over the raw text for the `x += ...`
    // pattern the AST walk may have missed (e.g. inside opaque regions).
    if scan.reductions.is_empty()
        && let Some(var) = scan_textual_reduction(&source_text, &scan.local_decls)
    {
        scan.reductions.insert(var, ReductionOp::Add);
    }

    let mut record = LoopRecord {
        kind,
        source_text,
        start,
        end,
        containing_function: def.name.clone(),
        iteration_variable,
        reads: scan.reads,
        writes: scan.writes,
        reductions: scan.reductions,
        has_io: scan.has_io,
        has_function_call: scan.has_function_call,
        has_unsafe_call: scan.has_unsafe_call,
        has_break_continue: scan.has_break_continue,
        has_complex_condition,
        is_nested_inner: scan.is_nested_inner,
        has_loop_carried_dep,
        unsafe_calls: scan.unsafe_calls,
        thread_local_needs: scan.thread_local_needs,
        parallelizable: false,
        schedule: Schedule::Static,
        pragma_text: String::new(),
        notes: String::new(),
    };

    decide_verdict(&mut record, depth);
    if record.parallelizable {
        record.schedule = choose_schedule(&record);
        record.pragma_text = generate_pragma(&record);
    }
    record
}

fn collect_loop_locals(stmt: &Stmt, locals: &mut BTreeSet<String>) {
    if let Stmt::Decl { decls, .. } = stmt {
        for d in decls {
            locals.insert(d.name.clone());
        }
    }
    stmt.for_each_child(&mut |child| collect_loop_locals(child, locals));
}

fn scan_stmt(stmt: &Stmt, scan: &mut BodyScan) {
    match stmt {
        Stmt::Break { .. } | Stmt::Continue { .. } => {
            scan.has_break_continue = true;
        }
        Stmt::For { .. } | Stmt::While { .. } | Stmt::DoWhile { .. } => {
            scan.is_nested_inner = true;
        }
        _ => {}
    }
    stmt.for_each_expr(&mut |expr| scan_expr(expr, scan));
    stmt.for_each_child(&mut |child| scan_stmt(child, scan));
}

fn scan_expr(expr: &Expr, scan: &mut BodyScan) {
    expr.for_each(&mut |e| match &e.kind {
        ExprKind::DeclRef(name) => {
            if !name.contains("::") && !catalog::is_stream_sentinel(name) {
                scan.reads.insert(name.clone());
            }
        }
        ExprKind::Assign { op, lhs, .. } => {
            if let Some(root) = lhs.lvalue_root() {
                scan.writes.insert(root.to_string());
            }
            if op.is_compound()
                && let Some(name) = lhs.as_decl_ref()
                && !scan.local_decls.contains(name)
                && let Some(red) = reduction_op_of(*op)
            {
                scan.reductions.insert(name.to_string(), red);
            }
        }
        ExprKind::Unary { op, operand } if op.is_inc_dec() => {
            if let Some(root) = operand.lvalue_root() {
                scan.writes.insert(root.to_string());
            }
        }
        ExprKind::Call { callee, .. } => {
            classify_call(simple_name(callee), scan);
        }
        ExprKind::MethodCall { method, .. } => {
            if !method.is_empty() {
                classify_call(method, scan);
            }
        }
        ExprKind::Binary { op, lhs, .. } if matches!(op, BinOp::Shl | BinOp::Shr) => {
            if is_stream_chain(lhs) {
                scan.has_io = true;
            }
        }
        _ => {}
    });
}

fn classify_call(name: &str, scan: &mut BodyScan) {
    if catalog::is_unsafe_function(name) {
        scan.has_unsafe_call = true;
        scan.unsafe_calls.insert(name.to_string());
        if name == "rand" {
            scan.thread_local_needs.insert("__thread_seed".to_string());
        }
    } else if catalog::is_io_function(name) {
        scan.has_io = true;
    } else {
        // Math functions and everything else; math never blocks on its own
        scan.has_function_call = true;
    }
}

fn simple_name(callee: &str) -> &str {
    callee.rsplit("::").next().unwrap_or(callee)
}

/// Whether the left spine of a `<<`/`>>` chain roots at a stream object.
fn is_stream_chain(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::DeclRef(name) => {
            let simple = simple_name(name);
            matches!(simple, "cout" | "cin" | "cerr" | "clog")
        }
        ExprKind::Binary { op, lhs, .. } if matches!(op, BinOp::Shl | BinOp::Shr) => {
            is_stream_chain(lhs)
        }
        ExprKind::Paren(inner) => is_stream_chain(inner),
        _ => false,
    }
}

fn reduction_op_of(op: hybridc_frontend::ast::AssignOp) -> Option<ReductionOp> {
    use hybridc_frontend::ast::AssignOp;
    Some(match op {
        AssignOp::Add => ReductionOp::Add,
        AssignOp::Sub => ReductionOp::Sub,
        AssignOp::Mul => ReductionOp::Mul,
        AssignOp::BitAnd => ReductionOp::BitAnd,
        AssignOp::BitOr => ReductionOp::BitOr,
        AssignOp::BitXor => ReductionOp::BitXor,
        _ => return None,
    })
}

/// Conservative syntactic test: `name[v ± K]` read anywhere while
/// `name[v] =` is written in the same loop.
fn detect_loop_carried_dep(source_text: &str, iteration_variable: Option<&str>) -> bool {
    let var = iteration_variable.unwrap_or("i");
    let Ok(dep_re) = Regex::new(&format!(r"(\w+)\s*\[\s*{}\s*[-+]\s*\d+\s*\]", var)) else {
        return false;
    };
    for cap in dep_re.captures_iter(source_text) {
        let array_name = &cap[1];
        let Ok(write_re) = Regex::new(&format!(r"{}\s*\[\s*{}\s*\]\s*=", array_name, var)) else {
            continue;
        };
        if write_re.is_match(source_text) {
            return true;
        }
    }
    false
}

/// Textual fallback for the accumulation pattern `x += ...` when the
/// AST walk found no compound reduction. The target must not be an
/// array access and not a loop-local.
fn scan_textual_reduction(
    source_text: &str,
    local_decls: &BTreeSet<String>,
) -> Option<String> {
    let re = Regex::new(r"(\w+)\s*\+=").ok()?;
    let cap = re.captures(source_text)?;
    let var = cap[1].to_string();
    let array_re = Regex::new(&format!(r"{}\s*\[", var)).ok()?;
    if array_re.is_match(source_text) || local_decls.contains(&var) {
        return None;
    }
    Some(var)
}

/// The parallelizability rulebook. Depth-1 `for` loops only; I/O and
/// break/continue always block; complex conditions and loop-carried
/// dependences are excused when a reduction is present; thread-unsafe
/// calls block unless every one of them has a safe substitution.
fn decide_verdict(record: &mut LoopRecord, depth: u32) {
    if record.kind != LoopKind::For {
        record.parallelizable = false;
        record.notes = "Only for-loops are automatically parallelizable. ".to_string();
        return;
    }
    if depth > 1 {
        record.parallelizable = false;
        record.notes =
            "Inner loop in nested structure - not parallelized to avoid race conditions."
                .to_string();
        return;
    }

    let mut ok = true;
    let mut notes = String::new();

    if record.has_io {
        ok = false;
        notes.push_str("Contains I/O operations - not parallelizable. ");
    }
    if record.has_break_continue {
        ok = false;
        notes.push_str("Contains break/continue statements - not parallelizable. ");
    }
    if record.has_complex_condition && record.reductions.is_empty() {
        ok = false;
        notes.push_str("Complex loop condition - not parallelizable. ");
    }
    if record.has_loop_carried_dep && record.reductions.is_empty() {
        ok = false;
        notes.push_str("Has loop-carried dependencies - not parallelizable. ");
    }
    if !record.reductions.is_empty() && !record.has_io && !record.has_break_continue {
        notes.push_str("Contains reduction operations - parallelizable with reduction clause. ");
    }
    if record.has_unsafe_call {
        let rewritable = record.unsafe_calls.iter().all(|f| f == "rand");
        if !rewritable {
            ok = false;
            notes.push_str(
                "Thread-unsafe functions without safe replacement - not parallelizable. ",
            );
        } else if ok {
            notes.push_str(
                "Thread-unsafe functions detected - replacing with thread-safe alternatives. ",
            );
        }
    }
    if record.is_nested_inner && ok {
        notes.push_str("Nested loop structure detected. ");
    }
    if record.has_function_call && !record.has_io && ok {
        notes.push_str("Contains function calls - verify they are thread-safe. ");
    }

    if ok {
        notes.push_str("PARALLELIZABLE - OpenMP pragma will be added. ");
    } else {
        notes.push_str("NOT PARALLELIZABLE - no pragma added. ");
    }

    record.parallelizable = ok;
    record.notes = notes;
}

fn choose_schedule(record: &LoopRecord) -> Schedule {
    if record.is_nested_inner {
        // Static keeps cache locality for regular nested iteration spaces
        Schedule::Static
    } else if record.has_function_call {
        Schedule::DynamicChunked(100)
    } else {
        Schedule::Static
    }
}

/// Build the pragma: reductions grouped per operator, firstprivate for
/// synthesized thread-locals, then the schedule clause.
fn generate_pragma(record: &LoopRecord) -> String {
    let mut pragma = String::from("#pragma omp parallel for");

    if !record.reductions.is_empty() {
        let mut groups: BTreeMap<&'static str, Vec<&str>> = BTreeMap::new();
        for (var, op) in &record.reductions {
            groups.entry(op.symbol()).or_default().push(var);
        }
        for (op, vars) in groups {
            pragma.push_str(&format!(" reduction({}:{})", op, vars.join(",")));
        }
    }

    if !record.thread_local_needs.is_empty() {
        let vars: Vec<&str> = record.thread_local_needs.iter().map(|s| s.as_str()).collect();
        pragma.push_str(&format!(" firstprivate({})", vars.join(",")));
    }

    pragma.push_str(&format!(" schedule({})", record.schedule.clause()));
    pragma
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybridc_frontend::Parser;

    fn loops_of(src: &str) -> Vec<LoopRecord> {
        let sf = SourceFile::new(src);
        let tu = Parser::new(&sf).parse().unwrap();
        let def = &tu.functions[0];
        analyze_function_loops(def, &sf)
    }

    #[test]
    fn test_reduction_loop_parallelizable() {
        let loops = loops_of(
            "double sum_squares(int n) {\n    double s = 0;\n    for (int i = 1; i <= n; i++) s += i * i;\n    return s;\n}\n",
        );
        assert_eq!(loops.len(), 1);
        let l = &loops[0];
        assert!(l.parallelizable);
        assert_eq!(l.reductions.get("s"), Some(&ReductionOp::Add));
        assert_eq!(
            l.pragma_text,
            "#pragma omp parallel for reduction(+:s) schedule(static)"
        );
    }

    #[test]
    fn test_loop_carried_dependence_blocks() {
        let loops = loops_of(
            "void smooth(int n) {\n    for (int i = 1; i < n; i++) a[i] = a[i - 1] + 1;\n}\n",
        );
        let l = &loops[0];
        assert!(l.has_loop_carried_dep);
        assert!(l.reductions.is_empty());
        assert!(!l.parallelizable);
        assert!(l.notes.contains("Has loop-carried dependencies"));
    }

    #[test]
    fn test_complex_condition_excused_by_reduction() {
        let loops = loops_of(
            "double f(int n) {\n    double s = 0;\n    for (int i = 0; i < n && s < 1000.0; i++) s += i * 0.5;\n    return s;\n}\n",
        );
        let l = &loops[0];
        assert!(l.has_complex_condition);
        assert!(l.parallelizable);
    }

    #[test]
    fn test_complex_condition_without_reduction_blocks() {
        let loops = loops_of(
            "void f(int n) {\n    for (int i = 0; i < n && i != 7; i++) step(i);\n}\n",
        );
        let l = &loops[0];
        assert!(l.has_complex_condition);
        assert!(!l.parallelizable);
        assert!(l.notes.contains("Complex loop condition"));
    }

    #[test]
    fn test_io_blocks_even_with_reduction() {
        let loops = loops_of(
            "double f(int n) {\n    double s = 0;\n    for (int i = 0; i < n; i++) { s += i; printf(\"%d\\n\", i); }\n    return s;\n}\n",
        );
        assert!(loops[0].has_io);
        assert!(!loops[0].parallelizable);
    }

    #[test]
    fn test_stream_output_counts_as_io() {
        let loops = loops_of(
            "void f(int n) {\n    for (int i = 0; i < n; i++) { std::cout << i << std::endl; }\n}\n",
        );
        assert!(loops[0].has_io);
        assert!(!loops[0].parallelizable);
    }

    #[test]
    fn test_break_blocks() {
        let loops = loops_of(
            "void f(int n) {\n    for (int i = 0; i < n; i++) { if (i > 3) break; work(i); }\n}\n",
        );
        assert!(loops[0].has_break_continue);
        assert!(!loops[0].parallelizable);
    }

    #[test]
    fn test_inner_loop_not_candidate() {
        let loops = loops_of(
            "void f(int n) {\n    for (int i = 0; i < n; i++) {\n        for (int j = 0; j < n; j++) { work(i, j); }\n    }\n}\n",
        );
        assert_eq!(loops.len(), 2);
        assert!(loops[0].is_nested_inner);
        assert!(loops[0].parallelizable);
        assert_eq!(loops[0].schedule, Schedule::Static);
        assert!(!loops[1].parallelizable);
        assert!(loops[1].notes.contains("Inner loop in nested structure"));
    }

    #[test]
    fn test_while_never_parallelized() {
        let loops = loops_of(
            "void f(int n) {\n    int i = 0;\n    while (i < n) { i++; }\n}\n",
        );
        assert_eq!(loops[0].kind, LoopKind::While);
        assert!(!loops[0].parallelizable);
        assert!(loops[0].notes.contains("Only for-loops"));
    }

    #[test]
    fn test_function_call_chooses_dynamic_schedule() {
        let loops = loops_of(
            "void f(int n) {\n    for (int i = 0; i < n; i++) { work(i); }\n}\n",
        );
        let l = &loops[0];
        assert!(l.has_function_call);
        assert!(l.parallelizable);
        assert_eq!(l.schedule, Schedule::DynamicChunked(100));
        assert!(l.pragma_text.ends_with("schedule(dynamic,100)"));
    }

    #[test]
    fn test_math_calls_do_not_block() {
        let loops = loops_of(
            "double f(int n) {\n    double s = 0;\n    for (int i = 0; i < n; i++) s += sqrt(i) + sin(i);\n    return s;\n}\n",
        );
        let l = &loops[0];
        assert!(l.parallelizable);
        assert_eq!(l.schedule, Schedule::DynamicChunked(100));
    }

    #[test]
    fn test_rand_requires_thread_seed() {
        let loops = loops_of(
            "double f(int n) {\n    double s = 0;\n    for (int i = 0; i < n; i++) s += rand();\n    return s;\n}\n",
        );
        let l = &loops[0];
        assert!(l.has_unsafe_call);
        assert!(l.parallelizable);
        assert!(l.thread_local_needs.contains("__thread_seed"));
        assert!(l.pragma_text.contains("firstprivate(__thread_seed)"));
    }

    #[test]
    fn test_strtok_blocks() {
        let loops = loops_of(
            "void f(int n) {\n    for (int i = 0; i < n; i++) { strtok(buf, \",\"); }\n}\n",
        );
        let l = &loops[0];
        assert!(l.has_unsafe_call);
        assert!(!l.parallelizable);
    }

    #[test]
    fn test_local_accumulator_not_reduction() {
        let loops = loops_of(
            "void f(int n) {\n    for (int i = 0; i < n; i++) { int acc = 0; acc += i; use(acc); }\n}\n",
        );
        assert!(loops[0].reductions.is_empty());
    }

    #[test]
    fn test_reduction_groups_by_operator() {
        let loops = loops_of(
            "void f(int n) {\n    for (int i = 0; i < n; i++) { s += i; p *= i; }\n}\n",
        );
        let l = &loops[0];
        assert_eq!(l.reductions.len(), 2);
        assert!(l.pragma_text.contains("reduction(*:p)"));
        assert!(l.pragma_text.contains("reduction(+:s)"));
        // Exactly one schedule clause
        assert_eq!(l.pragma_text.matches("schedule(").count(), 1);
    }

    #[test]
    fn test_iteration_variable_extracted() {
        let loops = loops_of(
            "void f(int n) {\n    for (int k = 0; k < n; k++) { a[k] = k; }\n}\n",
        );
        assert_eq!(loops[0].iteration_variable.as_deref(), Some("k"));
    }

    #[test]
    fn test_spans_recorded() {
        let loops = loops_of(
            "void f(int n) {\n    for (int i = 0; i < n; i++) { a[i] = i; }\n}\n",
        );
        assert_eq!(loops[0].start.line, 2);
        assert_eq!(loops[0].kind, LoopKind::For);
    }
}
