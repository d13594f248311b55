use std::io::Write;

use crate::{ast::*, type_checker::TypeTable};

const INDENT_WIDTH: usize = 2;

pub fn print_program_string(program: &[Stmt], types: Option<&TypeTable>) -> String {
    let mut buf = Vec::with_capacity(1024);
    print_program(&mut buf, program, types).expect("writing to a Vec never fails");
    String::from_utf8(buf).expect("tree output is UTF-8")
}

pub fn print_expr_string(expr: &Expr, types: Option<&TypeTable>) -> String {
    let mut buf = Vec::with_capacity(512);
    let p = Printer { types };
    p.print_expr(&mut buf, 0, expr)
        .expect("writing to a Vec never fails");
    String::from_utf8(buf).expect("tree output is UTF-8")
}

pub fn print_program(
    w: &mut impl Write,
    program: &[Stmt],
    types: Option<&TypeTable>,
) -> std::io::Result<()> {
    let p = Printer { types };
    p.print_block(w, 0, program)
}

/// Writes statements and expressions one node per line, children indented.
/// When a type table is given, expressions are annotated with `%: type`.
struct Printer<'t> {
    types: Option<&'t TypeTable>,
}

impl Printer<'_> {
    fn print_block(&self, w: &mut impl Write, i: usize, stmts: &[Stmt]) -> std::io::Result<()> {
        for stmt in stmts {
            self.print_stmt(w, i, stmt)?;
        }
        Ok(())
    }

    fn print_stmt(&self, w: &mut impl Write, i: usize, stmt: &Stmt) -> std::io::Result<()> {
        let loc = format!("{}:{}", stmt.location.line, stmt.location.column);
        if let StmtKind::Expr(expr) = &stmt.kind {
            return self.print_expr(w, i, expr);
        }
        sp(w, i)?;
        match &stmt.kind {
            StmtKind::Let {
                name,
                ty,
                value,
                mutable,
            } => {
                let keyword = if *mutable { "var" } else { "let" };
                writeln!(w, "{keyword} {name}: {ty} ({loc})")?;
                self.print_expr(w, i + 1, value)?;
            }
            StmtKind::Assign { target, value } => {
                writeln!(w, "assign {target} ({loc})")?;
                self.print_expr(w, i + 1, value)?;
            }
            StmtKind::Expr(_) => unreachable!("handled above"),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                writeln!(w, "if ({loc})")?;
                self.print_expr(w, i + 1, condition)?;
                sp(w, i + 1)?;
                writeln!(w, "then")?;
                self.print_block(w, i + 2, then_branch)?;
                if !else_branch.is_empty() {
                    sp(w, i + 1)?;
                    writeln!(w, "else")?;
                    self.print_block(w, i + 2, else_branch)?;
                }
            }
            StmtKind::While { condition, body } => {
                writeln!(w, "while ({loc})")?;
                self.print_expr(w, i + 1, condition)?;
                sp(w, i + 1)?;
                writeln!(w, "body")?;
                self.print_block(w, i + 2, body)?;
            }
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => {
                writeln!(w, "for ({loc})")?;
                self.print_stmt(w, i + 1, init)?;
                self.print_expr(w, i + 1, condition)?;
                self.print_stmt(w, i + 1, update)?;
                sp(w, i + 1)?;
                writeln!(w, "body")?;
                self.print_block(w, i + 2, body)?;
            }
            StmtKind::Return(value) => {
                writeln!(w, "return ({loc})")?;
                if let Some(value) = value {
                    self.print_expr(w, i + 1, value)?;
                }
            }
            StmtKind::Break => writeln!(w, "break ({loc})")?,
            StmtKind::Continue => writeln!(w, "continue ({loc})")?,
            StmtKind::Function(Function {
                name,
                params,
                return_ty,
                body,
            }) => {
                write!(w, "func {name}(")?;
                for (idx, param) in params.iter().enumerate() {
                    if idx > 0 {
                        write!(w, ", ")?;
                    }
                    write!(w, "{}: {}", param.name, param.ty)?;
                }
                writeln!(w, ") => {return_ty} ({loc})")?;
                self.print_block(w, i + 1, body)?;
            }
            StmtKind::Import { name, module } => {
                writeln!(w, "import {name} from {} ({loc})", module.join("::"))?;
            }
        }
        Ok(())
    }

    fn print_expr(&self, w: &mut impl Write, i: usize, expr: &Expr) -> std::io::Result<()> {
        sp(w, i)?;
        let loc = format!("{}:{}", expr.location.line, expr.location.column);
        let info = match self.types.and_then(|t| t.get(expr.id)) {
            Some(ty) => format!("{loc} %: {ty}"),
            None => loc,
        };
        match &expr.kind {
            ExprKind::Literal(Literal::Int(val)) => writeln!(w, "int {val} ({info})")?,
            ExprKind::Literal(Literal::Float(val)) => writeln!(w, "float {val:?} ({info})")?,
            ExprKind::Literal(Literal::Bool(val)) => writeln!(w, "bool {val} ({info})")?,
            ExprKind::Literal(Literal::String(val)) => writeln!(w, "string {val:?} ({info})")?,
            ExprKind::Ident(name) => writeln!(w, "ident {name} ({info})")?,
            ExprKind::Binary { op, lhs, rhs } => {
                writeln!(w, "binary {op} ({info})")?;
                self.print_expr(w, i + 1, lhs)?;
                self.print_expr(w, i + 1, rhs)?;
            }
            ExprKind::Unary {
                op,
                expr: inner_expr,
            } => {
                writeln!(w, "unary {op:?} ({info})")?;
                self.print_expr(w, i + 1, inner_expr)?;
            }
            ExprKind::Call { callee, args } => {
                writeln!(w, "call ({info})")?;
                self.print_expr(w, i + 1, callee)?;
                if !args.is_empty() {
                    sp(w, i + 1)?;
                    writeln!(w, "arguments")?;
                    for arg in args {
                        self.print_expr(w, i + 2, arg)?;
                    }
                }
            }
            ExprKind::Member { object, property } => {
                writeln!(w, "member {property} ({info})")?;
                self.print_expr(w, i + 1, object)?;
            }
        }
        Ok(())
    }
}

fn sp(w: &mut impl Write, i: usize) -> std::io::Result<()> {
    write!(w, "{:width$}", "", width = i * INDENT_WIDTH)
}
