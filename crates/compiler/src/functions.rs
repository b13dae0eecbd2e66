//! Per-function read/write analysis
//!
//! Walks every user-defined function with a body and produces a
//! [`FunctionSummary`]: signature, verbatim body text, and the sets of
//! global names the function reads and writes. The classification is
//! deliberately conservative — every reference counts as a read, and
//! the root name of any assignment target counts as a write — because
//! the dependency scheduler relies on over-approximation for safety.

use crate::catalog;
use crate::loops::LoopRecord;
use hybridc_frontend::{
    Expr, ExprKind, FunctionDef, SourceFile, Stmt, TranslationUnit,
};
use std::collections::BTreeSet;

/// Analysis summary for one user-defined function.
#[derive(Debug, Clone)]
pub struct FunctionSummary {
    pub name: String,
    pub return_type: String,
    /// Ordered (name, type) parameter list.
    pub params: Vec<(String, String)>,
    /// Verbatim brace-to-brace body text.
    pub body_text: String,
    pub global_reads: BTreeSet<String>,
    pub global_writes: BTreeSet<String>,
    /// Non-parameter locals referenced, in declaration order.
    pub local_symbols: Vec<String>,
    /// Loop records, attached by the loop analyzer, in source order.
    pub loops: Vec<LoopRecord>,
}

impl FunctionSummary {
    pub fn has_parallelizable_loops(&self) -> bool {
        self.loops.iter().any(|l| l.parallelizable)
    }
}

/// Analyze every function definition in the translation unit.
///
/// Duplicate definitions of the same name keep the first occurrence.
pub fn analyze_functions(
    tu: &TranslationUnit,
    source: &SourceFile,
    globals: &BTreeSet<String>,
) -> Vec<FunctionSummary> {
    let mut summaries: Vec<FunctionSummary> = Vec::new();
    for def in &tu.functions {
        if summaries.iter().any(|s| s.name == def.name) {
            continue;
        }
        summaries.push(analyze_function(def, source, globals));
    }
    summaries
}

fn analyze_function(
    def: &FunctionDef,
    source: &SourceFile,
    globals: &BTreeSet<String>,
) -> FunctionSummary {
    let params: Vec<(String, String)> = def
        .params
        .iter()
        .filter(|p| !p.name.is_empty())
        .map(|p| (p.name.clone(), p.type_name.clone()))
        .collect();
    let param_names: BTreeSet<&str> = params.iter().map(|(n, _)| n.as_str()).collect();

    // Declared locals in source order, including for-init declarations
    let mut declared: Vec<String> = Vec::new();
    for stmt in &def.body.stmts {
        collect_declared(stmt, &mut declared);
    }

    let mut global_reads = BTreeSet::new();
    let mut global_writes = BTreeSet::new();
    let mut referenced: BTreeSet<String> = BTreeSet::new();

    for stmt in &def.body.stmts {
        classify_stmt(stmt, globals, &mut global_reads, &mut global_writes, &mut referenced);
    }

    let local_symbols: Vec<String> = declared
        .into_iter()
        .filter(|n| referenced.contains(n) && !param_names.contains(n.as_str()))
        .collect();

    FunctionSummary {
        name: def.name.clone(),
        return_type: def.return_type.clone(),
        params,
        body_text: source.slice(def.body_span).to_string(),
        global_reads,
        global_writes,
        local_symbols,
        loops: Vec::new(),
    }
}

fn collect_declared(stmt: &Stmt, declared: &mut Vec<String>) {
    if let Stmt::Decl { decls, .. } = stmt {
        for d in decls {
            if !declared.iter().any(|n| n == &d.name) {
                declared.push(d.name.clone());
            }
        }
    }
    stmt.for_each_child(&mut |child| collect_declared(child, declared));
}

fn classify_stmt(
    stmt: &Stmt,
    globals: &BTreeSet<String>,
    reads: &mut BTreeSet<String>,
    writes: &mut BTreeSet<String>,
    referenced: &mut BTreeSet<String>,
) {
    stmt.for_each_expr(&mut |expr| {
        classify_expr(expr, globals, reads, writes, referenced);
    });
    stmt.for_each_child(&mut |child| {
        classify_stmt(child, globals, reads, writes, referenced);
    });
}

/// Classify one expression tree. Reads come from every name reference;
/// writes come from assignment targets and increment/decrement operands.
fn classify_expr(
    expr: &Expr,
    globals: &BTreeSet<String>,
    reads: &mut BTreeSet<String>,
    writes: &mut BTreeSet<String>,
    referenced: &mut BTreeSet<String>,
) {
    expr.for_each(&mut |e| match &e.kind {
        ExprKind::DeclRef(name) => {
            if name.contains("::") || catalog::is_stream_sentinel(name) {
                return;
            }
            if globals.contains(name) {
                reads.insert(name.clone());
            } else {
                referenced.insert(name.clone());
            }
        }
        ExprKind::Assign { lhs, .. } => {
            if let Some(root) = lhs.lvalue_root()
                && globals.contains(root)
            {
                writes.insert(root.to_string());
            }
        }
        ExprKind::Unary { op, operand } if op.is_inc_dec() => {
            if let Some(root) = operand.lvalue_root()
                && globals.contains(root)
            {
                writes.insert(root.to_string());
            }
        }
        _ => {}
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybridc_frontend::Parser;

    fn analyze(src: &str) -> Vec<FunctionSummary> {
        let sf = SourceFile::new(src);
        let tu = Parser::new(&sf).parse().unwrap();
        let globals = crate::globals::collect_globals(&tu);
        analyze_functions(&tu, &sf, &globals)
    }

    #[test]
    fn test_signature_capture() {
        let s = analyze("double scale(double x, int factor) { return x * factor; }\n");
        assert_eq!(s[0].name, "scale");
        assert_eq!(s[0].return_type, "double");
        assert_eq!(
            s[0].params,
            vec![("x".to_string(), "double".to_string()), ("factor".to_string(), "int".to_string())]
        );
    }

    #[test]
    fn test_body_text_verbatim() {
        let s = analyze("int f() { return 42; }\n");
        assert_eq!(s[0].body_text, "{ return 42; }");
    }

    #[test]
    fn test_global_read_and_write_sets() {
        let src = "int counter = 0;\nint limit = 10;\nvoid bump() { if (counter < limit) counter = counter + 1; }\n";
        let s = analyze(src);
        assert_eq!(s[0].global_reads, BTreeSet::from(["counter".into(), "limit".into()]));
        assert_eq!(s[0].global_writes, BTreeSet::from(["counter".into()]));
    }

    #[test]
    fn test_compound_assignment_is_both() {
        let src = "double total = 0.0;\nvoid add(double x) { total += x; }\n";
        let s = analyze(src);
        assert!(s[0].global_reads.contains("total"));
        assert!(s[0].global_writes.contains("total"));
    }

    #[test]
    fn test_increment_is_write() {
        let src = "int counter = 0;\nvoid tick() { counter++; }\n";
        let s = analyze(src);
        assert!(s[0].global_writes.contains("counter"));
    }

    #[test]
    fn test_array_element_write_roots_at_name() {
        let src = "int data[100];\nvoid fill(int n) { for (int i = 0; i < n; i++) data[i] = i; }\n";
        let s = analyze(src);
        assert!(s[0].global_writes.contains("data"));
        assert!(s[0].global_reads.contains("data"));
    }

    #[test]
    fn test_local_symbols_in_declaration_order() {
        let src = "int f(int n) { int b = 1; int a = 2; return a + b + n; }\n";
        let s = analyze(src);
        assert_eq!(s[0].local_symbols, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_params_not_in_local_symbols() {
        let src = "int f(int n) { int x = n; return x; }\n";
        let s = analyze(src);
        assert_eq!(s[0].local_symbols, vec!["x".to_string()]);
    }

    #[test]
    fn test_duplicate_definition_keeps_first() {
        let src = "int f() { return 1; }\nint f() { return 2; }\n";
        let s = analyze(src);
        assert_eq!(s.len(), 1);
        assert_eq!(s[0].body_text, "{ return 1; }");
    }

    #[test]
    fn test_stream_sentinels_ignored() {
        let src = "void report() { std::cout << \"x\" << std::endl; }\n";
        let s = analyze(src);
        assert!(s[0].global_reads.is_empty());
        assert!(s[0].local_symbols.is_empty());
    }
}
