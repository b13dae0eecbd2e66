//! Call-site and local-variable extraction from `main`
//!
//! Walks only the body of `main`: collects its local declarations in
//! source order (with their initializer shapes, preserved verbatim) and
//! enumerates every invocation of a user function, recording argument
//! bindings and return-value sinks. The dependency scheduler consumes
//! both tables.

use crate::catalog;
use crate::functions::FunctionSummary;
use hybridc_frontend::{
    Expr, ExprKind, Initializer, SourceFile, Stmt, TranslationUnit,
};
use std::collections::{BTreeMap, BTreeSet};

/// Initializer shape of a `main` local, rendered by the emitter.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalInit {
    /// No initializer; default construction.
    Default,
    /// `= RHS`, storing the RHS text verbatim.
    Assign(String),
    /// Constructor syntax, storing `NAME(args)` verbatim.
    Ctor(String),
}

/// One local variable declared in `main`.
#[derive(Debug, Clone)]
pub struct LocalBinding {
    pub name: String,
    pub type_name: String,
    /// Array suffix like `[1000]`, if the declarator had one.
    pub array_suffix: Option<String>,
    pub declaration_order: usize,
    pub init: LocalInit,
    /// Index of the call whose return value defines this local.
    pub defined_at_call: Option<usize>,
    /// Indices of calls that read this local through their arguments.
    pub used_at_calls: BTreeSet<usize>,
    /// True when the local is passed as an argument to any call.
    pub is_parameter_alias: bool,
}

impl LocalBinding {
    /// Whether the local can travel over MPI with a single broadcast.
    pub fn mpi_eligible(&self) -> bool {
        self.array_suffix.is_none() && crate::types::is_supported(&self.type_name)
    }
}

/// One user-function invocation inside `main`.
#[derive(Debug, Clone)]
pub struct CallSite {
    pub callee_name: String,
    pub order_index: usize,
    pub line: u32,
    pub has_return_value: bool,
    /// Local receiving the return value, when the call initializes or
    /// assigns one.
    pub return_binding: Option<String>,
    pub return_type: String,
    /// Local names referenced by the arguments, ordered, deduplicated.
    pub argument_variables: Vec<String>,
    pub used_locals: BTreeSet<String>,
    /// Verbatim text of the call (or of the defining declaration).
    pub raw_text: String,
}

/// Extraction result for `main`.
#[derive(Debug, Clone, Default)]
pub struct MainSummary {
    pub calls: Vec<CallSite>,
    /// Locals ordered by `declaration_order`.
    pub locals: Vec<LocalBinding>,
}

impl MainSummary {
    pub fn local(&self, name: &str) -> Option<&LocalBinding> {
        self.locals.iter().find(|l| l.name == name)
    }
}

/// Extract call sites and locals from `main`, if the translation unit
/// has one.
pub fn extract_main(
    tu: &TranslationUnit,
    source: &SourceFile,
    summaries: &[FunctionSummary],
    extra_denied: &BTreeSet<String>,
) -> MainSummary {
    let Some(main_def) = tu.find_function("main") else {
        return MainSummary::default();
    };

    let by_name: BTreeMap<&str, &FunctionSummary> =
        summaries.iter().map(|s| (s.name.as_str(), s)).collect();

    let mut extractor = Extractor {
        source,
        by_name,
        extra_denied,
        summary: MainSummary::default(),
    };

    // Locals first: call enumeration needs the name table to resolve
    // argument references and return bindings.
    for stmt in &main_def.body.stmts {
        extractor.collect_locals(stmt);
    }
    for stmt in &main_def.body.stmts {
        extractor.process_stmt(stmt);
    }
    extractor.annotate_local_dependencies();
    extractor.summary
}

struct Extractor<'a> {
    source: &'a SourceFile,
    by_name: BTreeMap<&'a str, &'a FunctionSummary>,
    extra_denied: &'a BTreeSet<String>,
    summary: MainSummary,
}

impl<'a> Extractor<'a> {
    fn is_user_function(&self, name: &str) -> bool {
        catalog::is_user_function(name, self.extra_denied)
    }

    /// Locals are hoisted from the top level of `main` and from bare
    /// nested blocks; declarations inside loop or branch bodies stay
    /// where they are.
    fn collect_locals(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Decl { decls, .. } => {
                for d in decls {
                    if self.summary.local(&d.name).is_some() {
                        continue;
                    }
                    let init = match &d.init {
                        Initializer::None => LocalInit::Default,
                        Initializer::Assign(expr) => {
                            LocalInit::Assign(self.source.slice(expr.span).trim().to_string())
                        }
                        Initializer::Ctor(_, paren_span) => LocalInit::Ctor(format!(
                            "{}{}",
                            d.name,
                            self.source.slice(*paren_span)
                        )),
                        Initializer::Brace(span) => {
                            LocalInit::Assign(self.source.slice(*span).trim().to_string())
                        }
                    };
                    let order = self.summary.locals.len();
                    self.summary.locals.push(LocalBinding {
                        name: d.name.clone(),
                        type_name: d.type_name.clone(),
                        array_suffix: d.array_suffix.clone(),
                        declaration_order: order,
                        init,
                        defined_at_call: None,
                        used_at_calls: BTreeSet::new(),
                        is_parameter_alias: false,
                    });
                }
            }
            Stmt::Compound(block) => {
                for s in &block.stmts {
                    self.collect_locals(s);
                }
            }
            _ => {}
        }
    }

    fn process_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Decl { decls, .. } => {
                for d in decls {
                    if let Initializer::Assign(expr) = &d.init
                        && let Some((callee, args)) = as_user_call(expr, self)
                    {
                        let return_type = self
                            .by_name
                            .get(callee)
                            .map(|s| s.return_type.clone())
                            .unwrap_or_else(|| d.type_name.clone());
                        let raw_text = self.source.slice(d.span).to_string();
                        self.record_call(callee, args, Some(d.name.clone()), return_type, raw_text, expr);
                    }
                }
            }
            Stmt::Expr { expr, .. } => {
                self.process_expr_stmt(expr);
            }
            other => {
                other.for_each_expr(&mut |e| {
                    // Collect calls buried in conditions and steps
                    self.collect_buried_calls(e);
                });
                other.for_each_child(&mut |child| self.process_stmt(child));
            }
        }
    }

    fn process_expr_stmt(&mut self, expr: &Expr) {
        // `x = f(...)` — a call site defining the local `x`
        if let ExprKind::Assign {
            op: hybridc_frontend::AssignOp::Assign,
            lhs,
            rhs,
        } = &expr.kind
            && let Some(lhs_name) = lhs.as_decl_ref()
            && self.summary.local(lhs_name).is_some()
            && let Some((callee, args)) = as_user_call(rhs, self)
        {
            let return_type = self
                .by_name
                .get(callee)
                .map(|s| s.return_type.clone())
                .or_else(|| self.summary.local(lhs_name).map(|l| l.type_name.clone()))
                .unwrap_or_else(|| "int".to_string());
            let raw_text = self.source.slice(expr.span).to_string();
            self.record_call(callee, args, Some(lhs_name.to_string()), return_type, raw_text, rhs);
            return;
        }

        // Plain `f(...)` statement
        if let Some((callee, args)) = as_user_call(expr, self) {
            let return_type = self
                .by_name
                .get(callee)
                .map(|s| s.return_type.clone())
                .unwrap_or_else(|| "int".to_string());
            let raw_text = self.source.slice(expr.span).to_string();
            self.record_call(callee, args, None, return_type, raw_text, expr);
            return;
        }

        self.collect_buried_calls(expr);
    }

    /// User calls buried in larger expressions are enumerated as
    /// standalone sites; their arguments are not searched further.
    fn collect_buried_calls(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Call { callee, args } if self.is_user_function(callee) => {
                let return_type = self
                    .by_name
                    .get(callee.as_str())
                    .map(|s| s.return_type.clone())
                    .unwrap_or_else(|| "int".to_string());
                let raw_text = self.source.slice(expr.span).to_string();
                let callee = callee.clone();
                let args: Vec<&Expr> = args.iter().collect();
                self.record_call(&callee, args, None, return_type, raw_text, expr);
            }
            ExprKind::Call { args, .. } => {
                args.iter().for_each(|a| self.collect_buried_calls(a));
            }
            ExprKind::MethodCall { recv, args, .. } => {
                self.collect_buried_calls(recv);
                args.iter().for_each(|a| self.collect_buried_calls(a));
            }
            ExprKind::Member { base, .. } => self.collect_buried_calls(base),
            ExprKind::Unary { operand, .. } => self.collect_buried_calls(operand),
            ExprKind::Binary { lhs, rhs, .. } | ExprKind::Assign { lhs, rhs, .. } => {
                self.collect_buried_calls(lhs);
                self.collect_buried_calls(rhs);
            }
            ExprKind::Index { base, index } => {
                self.collect_buried_calls(base);
                self.collect_buried_calls(index);
            }
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                self.collect_buried_calls(cond);
                self.collect_buried_calls(then_expr);
                self.collect_buried_calls(else_expr);
            }
            ExprKind::Cast { operand, .. } => self.collect_buried_calls(operand),
            ExprKind::Paren(inner) => self.collect_buried_calls(inner),
            _ => {}
        }
    }

    fn record_call(
        &mut self,
        callee: &str,
        args: Vec<&Expr>,
        return_binding: Option<String>,
        return_type: String,
        raw_text: String,
        site_expr: &Expr,
    ) {
        let order_index = self.summary.calls.len();
        let line = self.source.pos_at(site_expr.span.start).line;

        let mut argument_variables: Vec<String> = Vec::new();
        let mut used_locals = BTreeSet::new();
        for arg in &args {
            arg.for_each(&mut |e| {
                if let ExprKind::DeclRef(name) = &e.kind
                    && self.summary.local(name).is_some()
                    && !argument_variables.iter().any(|v| v == name)
                {
                    argument_variables.push(name.clone());
                }
            });
        }
        for v in &argument_variables {
            used_locals.insert(v.clone());
        }

        let has_return_value = return_binding.is_some() || return_type != "void";

        if let Some(bound) = &return_binding
            && let Some(local) = self.summary.locals.iter_mut().find(|l| &l.name == bound)
            && local.defined_at_call.is_none()
        {
            local.defined_at_call = Some(order_index);
        }

        self.summary.calls.push(CallSite {
            callee_name: callee.to_string(),
            order_index,
            line,
            has_return_value,
            return_binding,
            return_type,
            argument_variables,
            used_locals,
            raw_text,
        });
    }

    fn annotate_local_dependencies(&mut self) {
        for call in &self.summary.calls {
            for used in &call.used_locals {
                if let Some(local) = self.summary.locals.iter_mut().find(|l| &l.name == used) {
                    local.used_at_calls.insert(call.order_index);
                }
            }
            for arg in &call.argument_variables {
                if let Some(local) = self.summary.locals.iter_mut().find(|l| &l.name == arg) {
                    local.is_parameter_alias = true;
                }
            }
        }
    }
}

/// Match an expression (modulo parens) as a call to a user function;
/// returns the callee and argument expressions.
fn as_user_call<'e>(expr: &'e Expr, ex: &Extractor<'_>) -> Option<(&'e str, Vec<&'e Expr>)> {
    match &expr.kind {
        ExprKind::Call { callee, args } if ex.is_user_function(callee) => {
            Some((callee.as_str(), args.iter().collect()))
        }
        ExprKind::Paren(inner) => as_user_call(inner, ex),
        _ => None,
    }
}
