use std::fmt::Write as _;
use std::rc::Rc;

use crate::token::Span;

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    AddAssign,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Assign {
        name: Rc<str>,
        op: AssignOp,
        value: Expr,
    },
    Expr(Expr),
    If {
        // One entry per `if`/`elif` arm, in source order.
        branches: Vec<(Expr, Vec<Stmt>)>,
        else_body: Vec<Stmt>,
    },
    Foreach {
        vars: Vec<Rc<str>>,
        iterable: Expr,
        body: Vec<Stmt>,
    },
    Break,
    Continue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Bool(bool),
    Int(i64),
    Str(Rc<str>),
    Identifier(Rc<str>),
    Array(Vec<Expr>),
    Dict(Vec<(Rc<str>, Expr)>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        lhs: Box<Expr>,
        op: BinOp,
        rhs: Box<Expr>,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        name: Rc<str>,
        args: ArgList,
    },
    MethodCall {
        receiver: Box<Expr>,
        name: Rc<str>,
        args: ArgList,
    },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArgList {
    pub positional: Vec<Expr>,
    pub keywords: Vec<Keyword>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    pub name: Rc<str>,
    pub name_span: Span,
    pub value: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Neq,
    Lt,
    Leq,
    Gt,
    Geq,
    In,
    NotIn,
    And,
    Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Neq => "!=",
            BinOp::Lt => "<",
            BinOp::Leq => "<=",
            BinOp::Gt => ">",
            BinOp::Geq => ">=",
            BinOp::In => "in",
            BinOp::NotIn => "not in",
            BinOp::And => "and",
            BinOp::Or => "or",
        }
    }
}

/// Renders a program back to parseable source. Reparsing the output
/// yields a structurally identical tree (spans aside); the formatter
/// fully parenthesizes nested binary expressions so it never has to
/// reason about precedence.
pub fn format_program(program: &Program) -> String {
    let mut out = String::new();
    for stmt in &program.statements {
        format_stmt(&mut out, stmt, 0);
    }
    out
}

fn indent(out: &mut String, level: usize) {
    for _ in 0..level {
        out.push_str("  ");
    }
}

fn format_stmt(out: &mut String, stmt: &Stmt, level: usize) {
    indent(out, level);
    match &stmt.kind {
        StmtKind::Assign { name, op, value } => {
            let op = match op {
                AssignOp::Assign => "=",
                AssignOp::AddAssign => "+=",
            };
            let _ = write!(out, "{name} {op} ");
            format_expr(out, value);
            out.push('\n');
        }
        StmtKind::Expr(expr) => {
            format_expr(out, expr);
            out.push('\n');
        }
        StmtKind::If {
            branches,
            else_body,
        } => {
            for (i, (condition, body)) in branches.iter().enumerate() {
                if i > 0 {
                    indent(out, level);
                }
                let _ = write!(out, "{} ", if i == 0 { "if" } else { "elif" });
                format_expr(out, condition);
                out.push('\n');
                for stmt in body {
                    format_stmt(out, stmt, level + 1);
                }
            }
            if !else_body.is_empty() {
                indent(out, level);
                out.push_str("else\n");
                for stmt in else_body {
                    format_stmt(out, stmt, level + 1);
                }
            }
            indent(out, level);
            out.push_str("endif\n");
        }
        StmtKind::Foreach {
            vars,
            iterable,
            body,
        } => {
            let _ = write!(out, "foreach {} : ", vars.join(", "));
            format_expr(out, iterable);
            out.push('\n');
            for stmt in body {
                format_stmt(out, stmt, level + 1);
            }
            indent(out, level);
            out.push_str("endforeach\n");
        }
        StmtKind::Break => out.push_str("break\n"),
        StmtKind::Continue => out.push_str("continue\n"),
    }
}

fn format_expr(out: &mut String, expr: &Expr) {
    match &expr.kind {
        ExprKind::Bool(value) => {
            out.push_str(if *value { "true" } else { "false" });
        }
        ExprKind::Int(value) => {
            let _ = write!(out, "{value}");
        }
        ExprKind::Str(value) => format_str_literal(out, value),
        ExprKind::Identifier(name) => out.push_str(name),
        ExprKind::Array(elements) => {
            out.push('[');
            for (i, element) in elements.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                format_expr(out, element);
            }
            out.push(']');
        }
        ExprKind::Dict(entries) => {
            out.push('{');
            for (i, (key, value)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                format_str_literal(out, key);
                out.push_str(": ");
                format_expr(out, value);
            }
            out.push('}');
        }
        ExprKind::Unary { op, operand } => {
            match op {
                UnaryOp::Not => out.push_str("not "),
                UnaryOp::Neg => out.push('-'),
            }
            let needs_parens = matches!(operand.kind, ExprKind::Binary { .. });
            if needs_parens {
                out.push('(');
            }
            format_expr(out, operand);
            if needs_parens {
                out.push(')');
            }
        }
        ExprKind::Binary { lhs, op, rhs } => {
            format_operand(out, lhs);
            let _ = write!(out, " {} ", op.symbol());
            format_operand(out, rhs);
        }
        ExprKind::Index { object, index } => {
            format_operand(out, object);
            out.push('[');
            format_expr(out, index);
            out.push(']');
        }
        ExprKind::Call { name, args } => {
            out.push_str(name);
            format_args(out, args);
        }
        ExprKind::MethodCall {
            receiver,
            name,
            args,
        } => {
            format_operand(out, receiver);
            out.push('.');
            out.push_str(name);
            format_args(out, args);
        }
    }
}

fn format_operand(out: &mut String, expr: &Expr) {
    let needs_parens = matches!(expr.kind, ExprKind::Binary { .. } | ExprKind::Unary { .. });
    if needs_parens {
        out.push('(');
    }
    format_expr(out, expr);
    if needs_parens {
        out.push(')');
    }
}

fn format_args(out: &mut String, args: &ArgList) {
    out.push('(');
    let mut first = true;
    for arg in &args.positional {
        if !first {
            out.push_str(", ");
        }
        first = false;
        format_expr(out, arg);
    }
    for keyword in &args.keywords {
        if !first {
            out.push_str(", ");
        }
        first = false;
        let _ = write!(out, "{}: ", keyword.name);
        format_expr(out, &keyword.value);
    }
    out.push(')');
}

fn format_str_literal(out: &mut String, value: &str) {
    out.push('\'');
    for c in value.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            other => out.push(other),
        }
    }
    out.push('\'');
}
