//! Recursive-descent parser for the C/C++ subset
//!
//! Token-based with single-token lookahead plus save/rollback for the
//! declaration-vs-expression ambiguity. Top-level items it does not
//! understand (class definitions, templates) are skipped with balanced
//! braces; statements it cannot parse degrade to `Stmt::Opaque` so the
//! surrounding function body can still be reproduced verbatim.

use crate::ast::{
    AssignOp, BinOp, Block, Expr, ExprKind, FunctionDef, Initializer, Param, Stmt,
    TranslationUnit, UnaryOp, VarDecl,
};
use crate::lexer::{Token, TokenKind, tokenize};
use crate::source::{SourceFile, Span};

/// Keywords that start a statement and therefore can never begin a
/// declaration's type spelling.
const STMT_KEYWORDS: &[&str] = &[
    "if", "else", "for", "while", "do", "return", "break", "continue", "switch", "case",
    "default", "goto",
];

/// Builtin type keywords.
const TYPE_KEYWORDS: &[&str] = &[
    "void", "bool", "char", "short", "int", "long", "float", "double", "auto", "signed",
    "unsigned", "size_t", "_Bool",
];

/// Leading qualifiers allowed in a type spelling.
const TYPE_QUALIFIERS: &[&str] = &["const", "volatile", "static", "inline", "constexpr"];

pub struct Parser<'a> {
    source: &'a SourceFile,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a SourceFile) -> Self {
        Parser {
            source,
            tokens: tokenize(source),
            pos: 0,
        }
    }

    /// Parse the whole translation unit.
    pub fn parse(&mut self) -> Result<TranslationUnit, String> {
        let mut tu = TranslationUnit::default();

        while !self.is_at_end() {
            let tok = self.peek().unwrap().clone();

            if tok.kind == TokenKind::Directive {
                tu.includes.push(tok.text.clone());
                self.pos += 1;
                continue;
            }

            if tok.is("typedef") || tok.is("using") {
                let text = self.capture_through_semicolon();
                tu.typedefs.push(text);
                continue;
            }

            if tok.is("struct") || tok.is("class") || tok.is("enum") || tok.is("template")
                || tok.is("namespace") || tok.is("extern")
            {
                self.skip_top_level_item();
                continue;
            }

            self.parse_type_and_declarator(&mut tu)?;
        }

        Ok(tu)
    }

    /// Parse `TYPE NAME` then dispatch: function definition, prototype,
    /// or file-scope variable declaration(s).
    fn parse_type_and_declarator(&mut self, tu: &mut TranslationUnit) -> Result<(), String> {
        let start = self.current_offset();
        let type_name = self.try_parse_type().ok_or_else(|| {
            format!(
                "Expected a declaration at {}",
                self.pos_context()
            )
        })?;

        let name = self
            .expect_ident()
            .map_err(|e| format!("{} (after type '{}')", e, type_name))?;

        if self.check("(") {
            return self.parse_function_tail(tu, start, type_name, name);
        }

        // File-scope variable declarators
        let decls = self.parse_declarator_list(start, &type_name, name)?;
        tu.globals.extend(decls);
        Ok(())
    }

    fn parse_function_tail(
        &mut self,
        tu: &mut TranslationUnit,
        start: usize,
        return_type: String,
        name: String,
    ) -> Result<(), String> {
        self.expect("(")?;
        let mut params = Vec::new();
        if !self.check(")") {
            loop {
                // `void` as a lone parameter list
                if params.is_empty() && self.check("void") && self.peek_nth_is(1, ")") {
                    self.pos += 1;
                    break;
                }
                let ptype = self.try_parse_type().ok_or_else(|| {
                    format!("Expected parameter type at {}", self.pos_context())
                })?;
                let pname = if self.peek_kind() == Some(TokenKind::Ident) {
                    self.advance().unwrap().text.clone()
                } else {
                    String::new()
                };
                let mut ptype = ptype;
                // Array parameter suffix, e.g. `char* argv[]`
                while self.check("[") {
                    let suffix = self.capture_balanced("[", "]")?;
                    ptype.push_str(&suffix);
                }
                // Default argument: skip the value
                if self.consume("=") {
                    self.parse_assign_expr()?;
                }
                params.push(Param {
                    name: pname,
                    type_name: ptype,
                });
                if !self.consume(",") {
                    break;
                }
            }
        }
        self.expect(")")?;

        if self.consume(";") {
            // Prototype only; the analyzer works with definitions
            return Ok(());
        }

        let body_start = self.current_offset();
        let body = self.parse_block()?;
        let body_span = Span::new(body_start, body.span.end);
        tu.functions.push(FunctionDef {
            name,
            return_type,
            params,
            span: Span::new(start, body.span.end),
            body_span,
            body,
        });
        Ok(())
    }

    /// Parse declarators after `TYPE NAME`, through the terminating `;`.
    fn parse_declarator_list(
        &mut self,
        type_start: usize,
        type_name: &str,
        first_name: String,
    ) -> Result<Vec<VarDecl>, String> {
        let mut decls = Vec::new();
        let mut name = first_name;
        let mut decl_start = type_start;
        loop {
            let mut array_suffix = String::new();
            while self.check("[") {
                array_suffix.push_str(&self.capture_balanced("[", "]")?);
            }
            let init = if self.consume("=") {
                Initializer::Assign(self.parse_assign_expr()?)
            } else if self.check("(") {
                let paren_start = self.current_offset();
                self.expect("(")?;
                let mut args = Vec::new();
                if !self.check(")") {
                    loop {
                        args.push(self.parse_assign_expr()?);
                        if !self.consume(",") {
                            break;
                        }
                    }
                }
                self.expect(")")?;
                Initializer::Ctor(args, Span::new(paren_start, self.prev_end()))
            } else if self.check("{") {
                let brace_start = self.current_offset();
                self.skip_balanced("{", "}")?;
                Initializer::Brace(Span::new(brace_start, self.prev_end()))
            } else {
                Initializer::None
            };
            decls.push(VarDecl {
                name,
                type_name: type_name.to_string(),
                array_suffix: if array_suffix.is_empty() {
                    None
                } else {
                    Some(array_suffix)
                },
                init,
                span: Span::new(decl_start, self.prev_end()),
            });
            if self.consume(",") {
                decl_start = self.current_offset();
                name = self.expect_ident()?;
                continue;
            }
            break;
        }
        self.expect(";")?;
        Ok(decls)
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_block(&mut self) -> Result<Block, String> {
        let start = self.current_offset();
        self.expect("{")?;
        let mut stmts = Vec::new();
        while !self.check("}") && !self.is_at_end() {
            stmts.push(self.parse_stmt_or_opaque());
        }
        self.expect("}")?;
        Ok(Block {
            stmts,
            span: Span::new(start, self.prev_end()),
        })
    }

    /// Parse one statement; on failure, recover by skipping to the next
    /// `;` (or balanced `}`) and record the region as opaque.
    fn parse_stmt_or_opaque(&mut self) -> Stmt {
        let start = self.current_offset();
        let saved = self.pos;
        match self.parse_stmt() {
            Ok(stmt) => stmt,
            Err(_) => {
                self.pos = saved;
                self.skip_to_statement_end();
                Stmt::Opaque {
                    span: Span::new(start, self.prev_end()),
                }
            }
        }
    }

    fn parse_stmt(&mut self) -> Result<Stmt, String> {
        let tok = self
            .peek()
            .ok_or_else(|| "Unexpected end of input in statement".to_string())?
            .clone();
        let start = tok.span.start;

        if tok.kind == TokenKind::Directive {
            self.pos += 1;
            return Ok(Stmt::Opaque { span: tok.span });
        }

        match tok.text.as_str() {
            "{" => return Ok(Stmt::Compound(self.parse_block()?)),
            "if" => {
                self.pos += 1;
                self.expect("(")?;
                let cond = self.parse_expr()?;
                self.expect(")")?;
                let then_branch = Box::new(self.parse_stmt()?);
                let else_branch = if self.consume("else") {
                    Some(Box::new(self.parse_stmt()?))
                } else {
                    None
                };
                let end = else_branch
                    .as_ref()
                    .map(|e| e.span().end)
                    .unwrap_or(then_branch.span().end);
                return Ok(Stmt::If {
                    cond,
                    then_branch,
                    else_branch,
                    span: Span::new(start, end),
                });
            }
            "for" => {
                self.pos += 1;
                self.expect("(")?;
                let init = if self.consume(";") {
                    None
                } else {
                    Some(Box::new(self.parse_simple_stmt()?))
                };
                let cond = if self.check(";") {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(";")?;
                let step = if self.check(")") {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(")")?;
                let body = Box::new(self.parse_stmt()?);
                let end = body.span().end;
                return Ok(Stmt::For {
                    init,
                    cond,
                    step,
                    body,
                    span: Span::new(start, end),
                });
            }
            "while" => {
                self.pos += 1;
                self.expect("(")?;
                let cond = self.parse_expr()?;
                self.expect(")")?;
                let body = Box::new(self.parse_stmt()?);
                let end = body.span().end;
                return Ok(Stmt::While {
                    cond,
                    body,
                    span: Span::new(start, end),
                });
            }
            "do" => {
                self.pos += 1;
                let body = Box::new(self.parse_stmt()?);
                self.expect("while")?;
                self.expect("(")?;
                let cond = self.parse_expr()?;
                self.expect(")")?;
                self.expect(";")?;
                return Ok(Stmt::DoWhile {
                    body,
                    cond,
                    span: Span::new(start, self.prev_end()),
                });
            }
            "return" => {
                self.pos += 1;
                let value = if self.check(";") {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(";")?;
                return Ok(Stmt::Return {
                    value,
                    span: Span::new(start, self.prev_end()),
                });
            }
            "break" => {
                self.pos += 1;
                self.expect(";")?;
                return Ok(Stmt::Break {
                    span: Span::new(start, self.prev_end()),
                });
            }
            "continue" => {
                self.pos += 1;
                self.expect(";")?;
                return Ok(Stmt::Continue {
                    span: Span::new(start, self.prev_end()),
                });
            }
            ";" => {
                self.pos += 1;
                return Ok(Stmt::Opaque { span: tok.span });
            }
            _ => {}
        }

        self.parse_simple_stmt()
    }

    /// A declaration or expression statement, terminated by `;`.
    fn parse_simple_stmt(&mut self) -> Result<Stmt, String> {
        let start = self.current_offset();

        if let Some(decl) = self.try_parse_decl_stmt()? {
            return Ok(decl);
        }

        let expr = self.parse_expr()?;
        self.expect(";")?;
        Ok(Stmt::Expr {
            expr,
            span: Span::new(start, self.prev_end()),
        })
    }

    /// Attempt a declaration statement; rolls back and returns `None`
    /// when the lookahead does not form `TYPE NAME ( = | ; | , | ( | [ )`.
    fn try_parse_decl_stmt(&mut self) -> Result<Option<Stmt>, String> {
        let saved = self.pos;
        let start = self.current_offset();

        if let Some(tok) = self.peek()
            && STMT_KEYWORDS.contains(&tok.text.as_str())
        {
            return Ok(None);
        }

        let Some(type_name) = self.try_parse_type() else {
            self.pos = saved;
            return Ok(None);
        };
        if self.peek_kind() != Some(TokenKind::Ident) {
            self.pos = saved;
            return Ok(None);
        }
        let name = self.advance().unwrap().text.clone();
        let next_ok = self
            .peek()
            .map(|t| matches!(t.text.as_str(), "=" | ";" | "," | "(" | "[" | "{"))
            .unwrap_or(false);
        if !next_ok {
            self.pos = saved;
            return Ok(None);
        }

        let decls = self.parse_declarator_list(start, &type_name, name)?;
        Ok(Some(Stmt::Decl {
            decls,
            span: Span::new(start, self.prev_end()),
        }))
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    /// Try to parse a type spelling. Returns `None` (with position
    /// restored) when the lookahead cannot start a type.
    fn try_parse_type(&mut self) -> Option<String> {
        let saved = self.pos;
        let mut words: Vec<String> = Vec::new();

        loop {
            let Some(tok) = self.peek() else { break };
            if tok.kind != TokenKind::Ident {
                break;
            }
            let text = tok.text.clone();
            if TYPE_QUALIFIERS.contains(&text.as_str()) {
                words.push(text);
                self.pos += 1;
                continue;
            }
            break;
        }

        // Builtin multi-word spellings: unsigned int, long long, ...
        let mut saw_builtin = false;
        while let Some(tok) = self.peek() {
            if tok.kind == TokenKind::Ident && TYPE_KEYWORDS.contains(&tok.text.as_str()) {
                words.push(tok.text.clone());
                saw_builtin = true;
                self.pos += 1;
            } else {
                break;
            }
        }

        if !saw_builtin {
            // A (possibly qualified, possibly templated) named type
            let Some(name) = self.try_parse_qualified_name(true) else {
                self.pos = saved;
                return None;
            };
            if STMT_KEYWORDS.contains(&name.as_str()) {
                self.pos = saved;
                return None;
            }
            words.push(name);
        }

        let mut spelling = words.join(" ");

        // Pointer / reference suffixes attach without a space
        while let Some(tok) = self.peek() {
            match tok.text.as_str() {
                "*" | "&" => {
                    spelling.push_str(&tok.text);
                    self.pos += 1;
                }
                "const" => {
                    spelling.push_str(" const");
                    self.pos += 1;
                }
                _ => break,
            }
        }

        Some(spelling)
    }

    /// `a::b::c` with optional balanced template arguments, spelled
    /// verbatim. `allow_template` gates the `<...>` scan.
    fn try_parse_qualified_name(&mut self, allow_template: bool) -> Option<String> {
        if self.peek_kind() != Some(TokenKind::Ident) {
            return None;
        }
        let mut name = self.advance().unwrap().text.clone();
        while self.check("::") && self.peek_nth_kind(1) == Some(TokenKind::Ident) {
            self.pos += 1;
            name.push_str("::");
            name.push_str(&self.advance().unwrap().text);
        }
        if allow_template && self.check("<") {
            let saved = self.pos;
            if self.skip_balanced_angles() {
                let end = self.prev_end();
                // Append the template arguments verbatim
                name.push_str(self.source.slice(Span::new(
                    self.tokens[saved].span.start,
                    end,
                )));
            } else {
                self.pos = saved;
            }
        }
        Some(name)
    }

    /// Scan a balanced `<...>` region; restores nothing on failure
    /// (caller saves position). Refuses regions containing `;` or `{`,
    /// which indicate a comparison rather than template arguments.
    fn skip_balanced_angles(&mut self) -> bool {
        let mut depth = 0usize;
        let limit = self.pos + 64;
        while let Some(tok) = self.peek() {
            if self.pos > limit {
                return false;
            }
            match tok.text.as_str() {
                "<" => depth += 1,
                ">" => {
                    depth -= 1;
                    if depth == 0 {
                        self.pos += 1;
                        return true;
                    }
                }
                ">>" => {
                    if depth >= 2 {
                        depth -= 2;
                        if depth == 0 {
                            self.pos += 1;
                            return true;
                        }
                    } else {
                        return false;
                    }
                }
                ";" | "{" | "}" => return false,
                _ => {}
            }
            self.pos += 1;
        }
        false
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Full expression, including the comma operator.
    pub fn parse_expr(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_assign_expr()?;
        while self.check(",") {
            self.pos += 1;
            let rhs = self.parse_assign_expr()?;
            let span = lhs.span.to(rhs.span);
            lhs = Expr {
                kind: ExprKind::Binary {
                    op: BinOp::Comma,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            };
        }
        Ok(lhs)
    }

    /// Assignment expression (no comma operator); right-associative.
    pub fn parse_assign_expr(&mut self) -> Result<Expr, String> {
        let lhs = self.parse_conditional()?;
        let op = match self.peek().map(|t| t.text.as_str()) {
            Some("=") => Some(AssignOp::Assign),
            Some("+=") => Some(AssignOp::Add),
            Some("-=") => Some(AssignOp::Sub),
            Some("*=") => Some(AssignOp::Mul),
            Some("/=") => Some(AssignOp::Div),
            Some("%=") => Some(AssignOp::Rem),
            Some("&=") => Some(AssignOp::BitAnd),
            Some("|=") => Some(AssignOp::BitOr),
            Some("^=") => Some(AssignOp::BitXor),
            Some("<<=") => Some(AssignOp::Shl),
            Some(">>=") => Some(AssignOp::Shr),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let rhs = self.parse_assign_expr()?;
            let span = lhs.span.to(rhs.span);
            return Ok(Expr {
                kind: ExprKind::Assign {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            });
        }
        Ok(lhs)
    }

    fn parse_conditional(&mut self) -> Result<Expr, String> {
        let cond = self.parse_binary(1)?;
        if self.consume("?") {
            let then_expr = self.parse_assign_expr()?;
            self.expect(":")?;
            let else_expr = self.parse_assign_expr()?;
            let span = cond.span.to(else_expr.span);
            return Ok(Expr {
                kind: ExprKind::Conditional {
                    cond: Box::new(cond),
                    then_expr: Box::new(then_expr),
                    else_expr: Box::new(else_expr),
                },
                span,
            });
        }
        Ok(cond)
    }

    fn binop_of(text: &str) -> Option<(BinOp, u8)> {
        Some(match text {
            "||" => (BinOp::LogicalOr, 1),
            "&&" => (BinOp::LogicalAnd, 2),
            "|" => (BinOp::BitOr, 3),
            "^" => (BinOp::BitXor, 4),
            "&" => (BinOp::BitAnd, 5),
            "==" => (BinOp::Eq, 6),
            "!=" => (BinOp::Ne, 6),
            "<" => (BinOp::Lt, 7),
            ">" => (BinOp::Gt, 7),
            "<=" => (BinOp::Le, 7),
            ">=" => (BinOp::Ge, 7),
            "<<" => (BinOp::Shl, 8),
            ">>" => (BinOp::Shr, 8),
            "+" => (BinOp::Add, 9),
            "-" => (BinOp::Sub, 9),
            "*" => (BinOp::Mul, 10),
            "/" => (BinOp::Div, 10),
            "%" => (BinOp::Rem, 10),
            _ => return None,
        })
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, String> {
        let mut lhs = self.parse_unary()?;
        while let Some(tok) = self.peek() {
            let Some((op, prec)) = Self::binop_of(&tok.text) else {
                break;
            };
            if prec < min_prec {
                break;
            }
            self.pos += 1;
            let rhs = self.parse_binary(prec + 1)?;
            let span = lhs.span.to(rhs.span);
            lhs = Expr {
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        let tok = self
            .peek()
            .ok_or_else(|| "Unexpected end of input in expression".to_string())?
            .clone();
        let op = match tok.text.as_str() {
            "+" => Some(UnaryOp::Plus),
            "-" => Some(UnaryOp::Minus),
            "!" => Some(UnaryOp::Not),
            "~" => Some(UnaryOp::BitNot),
            "++" => Some(UnaryOp::PreInc),
            "--" => Some(UnaryOp::PreDec),
            "*" => Some(UnaryOp::Deref),
            "&" => Some(UnaryOp::AddrOf),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let operand = self.parse_unary()?;
            let span = tok.span.to(operand.span);
            return Ok(Expr {
                kind: ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                span,
            });
        }
        if let Some(cast) = self.try_parse_cast()? {
            return Ok(cast);
        }
        self.parse_postfix()
    }

    /// A C-style cast whose target starts with a builtin type keyword
    /// or qualifier, like `(int)x` or `(unsigned int)time(NULL)`.
    /// Anything else in parentheses is left to the primary parser.
    fn try_parse_cast(&mut self) -> Result<Option<Expr>, String> {
        if !self.check("(") {
            return Ok(None);
        }
        let next_is_type_start = self
            .tokens
            .get(self.pos + 1)
            .map(|t| {
                t.kind == TokenKind::Ident
                    && (TYPE_KEYWORDS.contains(&t.text.as_str())
                        || TYPE_QUALIFIERS.contains(&t.text.as_str()))
            })
            .unwrap_or(false);
        if !next_is_type_start {
            return Ok(None);
        }

        let saved = self.pos;
        let start = self.current_offset();
        self.pos += 1; // '('
        let Some(target_type) = self.try_parse_type() else {
            self.pos = saved;
            return Ok(None);
        };
        if !self.consume(")") {
            self.pos = saved;
            return Ok(None);
        }
        let operand = self.parse_unary()?;
        let span = Span::new(start, operand.span.end);
        Ok(Some(Expr {
            kind: ExprKind::Cast {
                target_type,
                operand: Box::new(operand),
            },
            span,
        }))
    }

    fn parse_postfix(&mut self) -> Result<Expr, String> {
        let mut expr = self.parse_primary()?;
        loop {
            let Some(tok) = self.peek() else { break };
            match tok.text.as_str() {
                "(" => {
                    let callee = match &expr.kind {
                        ExprKind::DeclRef(name) => Some(name.clone()),
                        _ => None,
                    };
                    let args = self.parse_call_args()?;
                    let span = Span::new(expr.span.start, self.prev_end());
                    expr = match (callee, expr.kind) {
                        (Some(callee), _) => Expr {
                            kind: ExprKind::Call { callee, args },
                            span,
                        },
                        (None, ExprKind::Member { base, member }) => Expr {
                            kind: ExprKind::MethodCall {
                                recv: base,
                                method: member,
                                args,
                            },
                            span,
                        },
                        (None, other) => {
                            // Call through an arbitrary expression; keep the
                            // receiver so variable references stay visible.
                            Expr {
                                kind: ExprKind::MethodCall {
                                    recv: Box::new(Expr {
                                        kind: other,
                                        span: expr.span,
                                    }),
                                    method: String::new(),
                                    args,
                                },
                                span,
                            }
                        }
                    };
                }
                "[" => {
                    self.pos += 1;
                    let index = self.parse_expr()?;
                    self.expect("]")?;
                    let span = Span::new(expr.span.start, self.prev_end());
                    expr = Expr {
                        kind: ExprKind::Index {
                            base: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    };
                }
                "." | "->" => {
                    self.pos += 1;
                    let member = self.expect_ident()?;
                    let span = Span::new(expr.span.start, self.prev_end());
                    expr = Expr {
                        kind: ExprKind::Member {
                            base: Box::new(expr),
                            member,
                        },
                        span,
                    };
                }
                "++" | "--" => {
                    let op = if tok.is("++") {
                        UnaryOp::PostInc
                    } else {
                        UnaryOp::PostDec
                    };
                    self.pos += 1;
                    let span = Span::new(expr.span.start, self.prev_end());
                    expr = Expr {
                        kind: ExprKind::Unary {
                            op,
                            operand: Box::new(expr),
                        },
                        span,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>, String> {
        self.expect("(")?;
        let mut args = Vec::new();
        if !self.check(")") {
            loop {
                args.push(self.parse_assign_expr()?);
                if !self.consume(",") {
                    break;
                }
            }
        }
        self.expect(")")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        let tok = self
            .peek()
            .ok_or_else(|| "Unexpected end of input in expression".to_string())?
            .clone();
        match tok.kind {
            TokenKind::Int => {
                self.pos += 1;
                Ok(Expr {
                    kind: ExprKind::IntLit(tok.text),
                    span: tok.span,
                })
            }
            TokenKind::Float => {
                self.pos += 1;
                Ok(Expr {
                    kind: ExprKind::FloatLit(tok.text),
                    span: tok.span,
                })
            }
            TokenKind::Str => {
                self.pos += 1;
                Ok(Expr {
                    kind: ExprKind::StrLit(tok.text),
                    span: tok.span,
                })
            }
            TokenKind::Char => {
                self.pos += 1;
                Ok(Expr {
                    kind: ExprKind::CharLit(tok.text),
                    span: tok.span,
                })
            }
            TokenKind::Ident => {
                if tok.is("true") || tok.is("false") {
                    self.pos += 1;
                    return Ok(Expr {
                        kind: ExprKind::BoolLit(tok.is("true")),
                        span: tok.span,
                    });
                }
                let start = self.current_offset();
                let name = self
                    .try_parse_qualified_name(false)
                    .ok_or_else(|| format!("Expected name at {}", self.pos_context()))?;
                // Templated constructor expressions: std::vector<double>(n, 0.0)
                let name = self.maybe_extend_template(name);
                Ok(Expr {
                    kind: ExprKind::DeclRef(name),
                    span: Span::new(start, self.prev_end()),
                })
            }
            TokenKind::Punct if tok.is("(") => {
                self.pos += 1;
                let inner = self.parse_expr()?;
                self.expect(")")?;
                Ok(Expr {
                    kind: ExprKind::Paren(Box::new(inner)),
                    span: Span::new(tok.span.start, self.prev_end()),
                })
            }
            _ => Err(format!(
                "Unexpected token '{}' at {}",
                tok.text,
                self.pos_context()
            )),
        }
    }

    /// After a name, scan `<...>` as template arguments only when the
    /// balanced region is followed by `(` or `{` or `::` — otherwise it
    /// is a comparison and the scan rolls back.
    fn maybe_extend_template(&mut self, name: String) -> String {
        if !self.check("<") {
            return name;
        }
        let saved = self.pos;
        let args_start = self.current_offset();
        if self.skip_balanced_angles()
            && self
                .peek()
                .map(|t| matches!(t.text.as_str(), "(" | "{" | "::"))
                .unwrap_or(false)
        {
            let mut name = name;
            name.push_str(self.source.slice(Span::new(args_start, self.prev_end())));
            if self.check("::") && self.peek_nth_kind(1) == Some(TokenKind::Ident) {
                self.pos += 1;
                name.push_str("::");
                name.push_str(&self.advance().unwrap().text);
            }
            name
        } else {
            self.pos = saved;
            name
        }
    }

    // ------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn peek_nth_kind(&self, n: usize) -> Option<TokenKind> {
        self.tokens.get(self.pos + n).map(|t| t.kind)
    }

    fn peek_nth_is(&self, n: usize, text: &str) -> bool {
        self.tokens
            .get(self.pos + n)
            .map(|t| t.is(text))
            .unwrap_or(false)
    }

    fn check(&self, text: &str) -> bool {
        self.peek().map(|t| t.is(text)).unwrap_or(false)
    }

    fn consume(&mut self, text: &str) -> bool {
        if self.check(text) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, text: &str) -> Result<(), String> {
        if self.consume(text) {
            Ok(())
        } else {
            Err(format!(
                "Expected '{}' at {}, found '{}'",
                text,
                self.pos_context(),
                self.peek().map(|t| t.text.as_str()).unwrap_or("<eof>")
            ))
        }
    }

    fn expect_ident(&mut self) -> Result<String, String> {
        match self.peek() {
            Some(t) if t.kind == TokenKind::Ident => {
                let text = t.text.clone();
                self.pos += 1;
                Ok(text)
            }
            _ => Err(format!("Expected identifier at {}", self.pos_context())),
        }
    }

    fn advance(&mut self) -> Option<&Token> {
        if self.pos >= self.tokens.len() {
            return None;
        }
        self.pos += 1;
        self.tokens.get(self.pos - 1)
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Byte offset of the current token (or end of file).
    fn current_offset(&self) -> usize {
        self.peek()
            .map(|t| t.span.start)
            .unwrap_or_else(|| self.source.text().len())
    }

    /// Byte offset just past the previously consumed token.
    fn prev_end(&self) -> usize {
        if self.pos == 0 {
            0
        } else {
            self.tokens[self.pos - 1].span.end
        }
    }

    fn pos_context(&self) -> String {
        match self.peek() {
            Some(t) => self.source.pos_at(t.span.start).to_string(),
            None => "<eof>".to_string(),
        }
    }

    /// Capture verbatim source from the current token through the next
    /// top-level `;` (used for `typedef` / `using` lines).
    fn capture_through_semicolon(&mut self) -> String {
        let start = self.current_offset();
        while let Some(tok) = self.peek() {
            let is_semi = tok.is(";");
            self.pos += 1;
            if is_semi {
                break;
            }
        }
        self.source.slice(Span::new(start, self.prev_end())).to_string()
    }

    /// Skip an unsupported top-level item: through balanced braces if
    /// one opens before the terminating `;`.
    fn skip_top_level_item(&mut self) {
        let mut brace_depth = 0usize;
        while let Some(tok) = self.peek() {
            match tok.text.as_str() {
                "{" => brace_depth += 1,
                "}" => {
                    brace_depth = brace_depth.saturating_sub(1);
                    if brace_depth == 0 && self.peek_nth_is(1, ";") {
                        self.pos += 2;
                        return;
                    }
                    if brace_depth == 0 {
                        self.pos += 1;
                        return;
                    }
                }
                ";" if brace_depth == 0 => {
                    self.pos += 1;
                    return;
                }
                _ => {}
            }
            self.pos += 1;
        }
    }

    /// Skip to just past the next `;` at brace depth zero, or past the
    /// closing brace of the enclosing block.
    fn skip_to_statement_end(&mut self) {
        let mut depth = 0usize;
        while let Some(tok) = self.peek() {
            match tok.text.as_str() {
                "{" => depth += 1,
                "}" => {
                    if depth == 0 {
                        return; // let the block close normally
                    }
                    depth -= 1;
                    if depth == 0 {
                        self.pos += 1;
                        return;
                    }
                }
                ";" if depth == 0 => {
                    self.pos += 1;
                    return;
                }
                _ => {}
            }
            self.pos += 1;
        }
    }

    /// Consume a balanced `open ... close` region and return it verbatim.
    fn capture_balanced(&mut self, open: &str, close: &str) -> Result<String, String> {
        let start = self.current_offset();
        self.skip_balanced(open, close)?;
        Ok(self.source.slice(Span::new(start, self.prev_end())).to_string())
    }

    fn skip_balanced(&mut self, open: &str, close: &str) -> Result<(), String> {
        self.expect(open)?;
        let mut depth = 1usize;
        while depth > 0 {
            let Some(tok) = self.peek() else {
                return Err(format!("Unbalanced '{}' at end of input", open));
            };
            if tok.is(open) {
                depth += 1;
            } else if tok.is(close) {
                depth -= 1;
            }
            self.pos += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_src(src: &str) -> TranslationUnit {
        let sf = SourceFile::new(src);
        Parser::new(&sf).parse().expect("parse failed")
    }

    #[test]
    fn test_parse_includes_and_globals() {
        let tu = parse_src("#include <stdio.h>\n#include <vector>\nint counter = 0;\ndouble total_sum = 0.0;\n");
        assert_eq!(tu.includes, vec!["#include <stdio.h>", "#include <vector>"]);
        assert_eq!(tu.globals.len(), 2);
        assert_eq!(tu.globals[0].name, "counter");
        assert_eq!(tu.globals[0].type_name, "int");
        assert_eq!(tu.globals[1].type_name, "double");
    }

    #[test]
    fn test_parse_global_array() {
        let tu = parse_src("int data_array[1000];\n");
        assert_eq!(tu.globals[0].name, "data_array");
        assert_eq!(tu.globals[0].array_suffix.as_deref(), Some("[1000]"));
    }

    #[test]
    fn test_parse_using_namespace() {
        let tu = parse_src("using namespace std;\nint x;\n");
        assert_eq!(tu.typedefs, vec!["using namespace std;"]);
        assert_eq!(tu.globals.len(), 1);
    }

    #[test]
    fn test_parse_simple_function() {
        let tu = parse_src("double sum_squares(int n) {\n    double s = 0;\n    for (int i = 1; i <= n; i++) s += i * i;\n    return s;\n}\n");
        assert_eq!(tu.functions.len(), 1);
        let f = &tu.functions[0];
        assert_eq!(f.name, "sum_squares");
        assert_eq!(f.return_type, "double");
        assert_eq!(f.params, vec![Param { name: "n".into(), type_name: "int".into() }]);
        assert_eq!(f.body.stmts.len(), 3);
        assert!(matches!(f.body.stmts[1], Stmt::For { .. }));
    }

    #[test]
    fn test_body_span_is_brace_to_brace() {
        let src = "int f() { return 1; }\n";
        let sf = SourceFile::new(src);
        let tu = Parser::new(&sf).parse().unwrap();
        let body = sf.slice(tu.functions[0].body_span);
        assert!(body.starts_with('{'));
        assert!(body.ends_with('}'));
    }

    #[test]
    fn test_parse_main_with_argv() {
        let tu = parse_src("int main(int argc, char* argv[]) { return 0; }\n");
        let f = &tu.functions[0];
        assert_eq!(f.params[0].type_name, "int");
        assert_eq!(f.params[1].type_name, "char*[]");
    }

    #[test]
    fn test_prototype_is_skipped() {
        let tu = parse_src("double f(int n);\nint g() { return 0; }\n");
        assert_eq!(tu.functions.len(), 1);
        assert_eq!(tu.functions[0].name, "g");
    }

    #[test]
    fn test_decl_vs_expr_statement() {
        let tu = parse_src("int f() { int x = 1; x = x + 1; return x; }\n");
        let body = &tu.functions[0].body.stmts;
        assert!(matches!(body[0], Stmt::Decl { .. }));
        assert!(matches!(body[1], Stmt::Expr { .. }));
    }

    #[test]
    fn test_compound_assignment_parses() {
        let tu = parse_src("int f(int n) { int s = 0; s += n; s *= 2; return s; }\n");
        let body = &tu.functions[0].body.stmts;
        let Stmt::Expr { expr, .. } = &body[1] else {
            panic!("expected expr stmt");
        };
        assert!(matches!(
            expr.kind,
            ExprKind::Assign { op: AssignOp::Add, .. }
        ));
    }

    #[test]
    fn test_ctor_initializer() {
        let tu = parse_src("int main() { std::vector<double> v(10, 1.0); return 0; }\n");
        let Stmt::Decl { decls, .. } = &tu.functions[0].body.stmts[0] else {
            panic!("expected decl");
        };
        assert_eq!(decls[0].name, "v");
        assert_eq!(decls[0].type_name, "std::vector<double>");
        assert!(matches!(decls[0].init, Initializer::Ctor(ref args, _) if args.len() == 2));
    }

    #[test]
    fn test_stream_output_parses_as_shl_chain() {
        let tu = parse_src("int main() { std::cout << \"x\" << 42 << std::endl; return 0; }\n");
        let Stmt::Expr { expr, .. } = &tu.functions[0].body.stmts[0] else {
            panic!("expected expr stmt");
        };
        assert!(matches!(
            expr.kind,
            ExprKind::Binary { op: BinOp::Shl, .. }
        ));
    }

    #[test]
    fn test_method_call() {
        let tu = parse_src("int f() { std::vector<int> v; v.push_back(1); return v.size(); }\n");
        let Stmt::Expr { expr, .. } = &tu.functions[0].body.stmts[1] else {
            panic!("expected expr stmt");
        };
        assert!(matches!(
            &expr.kind,
            ExprKind::MethodCall { method, .. } if method == "push_back"
        ));
    }

    #[test]
    fn test_do_while_and_break() {
        let tu = parse_src("int f() { int i = 0; do { i++; if (i > 3) break; } while (i < 10); return i; }\n");
        assert!(matches!(tu.functions[0].body.stmts[1], Stmt::DoWhile { .. }));
    }

    #[test]
    fn test_unparseable_statement_degrades_to_opaque() {
        let tu = parse_src("int f() { @ # $; return 0; }\n");
        let body = &tu.functions[0].body.stmts;
        assert!(body.iter().any(|s| matches!(s, Stmt::Opaque { .. })));
        assert!(body.iter().any(|s| matches!(s, Stmt::Return { .. })));
    }

    #[test]
    fn test_struct_definition_skipped() {
        let tu = parse_src("struct Point { int x; int y; };\nint f() { return 0; }\n");
        assert_eq!(tu.functions.len(), 1);
        assert!(tu.globals.is_empty());
    }

    #[test]
    fn test_parse_error_reports_position() {
        let sf = SourceFile::new("int = 3;\n");
        let err = Parser::new(&sf).parse().unwrap_err();
        assert!(err.contains("1:"), "error should carry a position: {}", err);
    }

    #[test]
    fn test_for_loop_shape() {
        let tu = parse_src("int f(int n) { int s = 0; for (int i = 0; i < n; i++) { s += i; } return s; }\n");
        let Stmt::For { init, cond, step, .. } = &tu.functions[0].body.stmts[1] else {
            panic!("expected for");
        };
        assert!(init.is_some());
        assert!(cond.is_some());
        assert!(step.is_some());
    }

    #[test]
    fn test_c_style_cast() {
        let tu = parse_src("int f(double d) { return (int)d + (unsigned int)time(NULL); }\n");
        let Stmt::Return { value: Some(e), .. } = &tu.functions[0].body.stmts[0] else {
            panic!("expected return");
        };
        let mut casts = 0;
        e.for_each(&mut |sub| {
            if let ExprKind::Cast { .. } = sub.kind {
                casts += 1;
            }
        });
        assert_eq!(casts, 2);
    }

    #[test]
    fn test_parenthesized_expression_not_cast() {
        let tu = parse_src("int f(int a, int b) { return (a) * b; }\n");
        let Stmt::Return { value: Some(e), .. } = &tu.functions[0].body.stmts[0] else {
            panic!("expected return");
        };
        assert!(matches!(e.kind, ExprKind::Binary { op: BinOp::Mul, .. }));
    }

    #[test]
    fn test_qualified_call() {
        let tu = parse_src("int f() { return std::min(1, 2); }\n");
        let Stmt::Return { value: Some(e), .. } = &tu.functions[0].body.stmts[0] else {
            panic!("expected return");
        };
        assert!(matches!(
            &e.kind,
            ExprKind::Call { callee, .. } if callee == "std::min"
        ));
    }
}
