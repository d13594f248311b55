use std::{fmt::Write as _, format_args as f, marker::PhantomData};

use indexmap::IndexMap;

use crate::{
    ast::{BinaryOperator, Expr, ExprKind, Function, Literal, Stmt, StmtKind, UnaryOperator},
    codegen::{x86_64_env, CodegenError, CodegenErrorKind},
    resolve::{Binding, FunctionId, Resolution, Slot, REGISTER_PARAMS},
    token::Location,
    type_checker::{TypeTable, PRINT_BUILTINS},
    types::{Primitive, Type},
};

type Result<T, E = CodegenError> = std::result::Result<T, E>;

const ARG_REGISTERS: [&str; REGISTER_PARAMS] = ["rdi", "rsi", "rdx", "rcx", "r8", "r9"];

/// Emits GNU `as` Intel-syntax assembly.
///
/// Every expression leaves its value in `rax`; floats travel there as raw
/// IEEE-754 bits and only visit `xmm` registers while an SSE instruction
/// needs them. Binary operands go through the machine stack, and `depth`
/// counts those pushes so calls can keep `rsp` 16-byte aligned.
pub struct Generator<'a, E> {
    resolution: &'a Resolution,
    types: &'a TypeTable,
    text: String,
    /// Deduplicated string literals, in first-use order.
    strings: IndexMap<Box<str>, usize>,
    labels: u32,
    depth: usize,
    loops: Vec<LoopLabels>,
    return_ty: Type,
    indent: bool,
    _env: PhantomData<E>,
}

struct LoopLabels {
    continue_label: String,
    break_label: String,
}

impl<'a, E> Generator<'a, E>
where
    E: x86_64_env::Env,
{
    pub fn new(resolution: &'a Resolution, types: &'a TypeTable) -> Generator<'a, E> {
        Generator {
            resolution,
            types,
            text: String::with_capacity(4096),
            strings: IndexMap::new(),
            labels: 0,
            depth: 0,
            loops: Vec::new(),
            return_ty: Type::VOID,
            indent: false,
            _env: PhantomData,
        }
    }

    pub fn generate(mut self, program: &[Stmt]) -> Result<String> {
        self.g_program_prologue();
        self.out(f!(".section {}", E::SECTION_TEXT));
        self.out_line();
        self.g_entry(program)?;
        for stmt in program {
            if let StmtKind::Function(function) = &stmt.kind {
                self.g_function(stmt, function)?;
            }
        }
        self.g_print_helpers();
        self.g_data();
        Ok(self.text)
    }
}

/// Program structure.
impl<E> Generator<'_, E>
where
    E: x86_64_env::Env,
{
    fn g_program_prologue(&mut self) {
        self.text.push_str(E::GLOBAL_PROLOGUE);
    }

    /// The entry point runs every top-level statement except function
    /// declarations.
    fn g_entry(&mut self, program: &[Stmt]) -> Result<()> {
        self.out(f!(".globl {}", E::ENTRY_POINT));
        self.out(f!("{}:", E::ENTRY_POINT));
        let frame_size = self.resolution.main_frame_size();
        self.indented(|this| -> Result<()> {
            this.g_prologue(frame_size);
            this.return_ty = Type::VOID;
            for stmt in program {
                if !matches!(stmt.kind, StmtKind::Function(_)) {
                    this.g_stmt(stmt)?;
                }
            }
            this.out("xor eax, eax");
            this.g_epilogue();
            Ok(())
        })
    }

    fn g_function(&mut self, stmt: &Stmt, function: &Function) -> Result<()> {
        let resolution = self.resolution;
        let Some(id) = resolution.function_decl(stmt.id) else {
            return Ok(());
        };
        let info = resolution.function(id);
        self.out(f!("user_{}:", function.name));
        self.indented(|this| -> Result<()> {
            this.g_prologue(info.frame_size);
            for (&param, register) in info.params.iter().zip(ARG_REGISTERS) {
                let slot = resolution.local(param).slot;
                this.out(f!("mov {}, {register}", operand(slot)));
            }
            this.return_ty = info.return_ty;
            for stmt in &function.body {
                this.g_stmt(stmt)?;
            }
            this.out("xor eax, eax");
            this.g_epilogue();
            Ok(())
        })
    }

    fn g_prologue(&mut self, frame_size: u32) {
        self.depth = 0;
        self.out("push rbp");
        self.out("mov rbp, rsp");
        if frame_size > 0 {
            self.out(f!("sub rsp, {frame_size}"));
        }
    }

    fn g_epilogue(&mut self) {
        self.out("mov rsp, rbp");
        self.out("pop rbp");
        self.out("ret");
    }

    /// Fixed helpers forwarding to `printf`, one per printable type. Every
    /// helper terminates the line.
    fn g_print_helpers(&mut self) {
        self.g_helper(
            "strata_print_int",
            &["mov rsi, rdi", "lea rdi, [rip + .Lfmt_int]", "xor eax, eax"],
        );
        self.g_helper(
            "strata_print_float",
            &["movq xmm0, rdi", "lea rdi, [rip + .Lfmt_float]", "mov eax, 1"],
        );
        self.g_helper(
            "strata_print_str",
            &["mov rsi, rdi", "lea rdi, [rip + .Lfmt_str]", "xor eax, eax"],
        );
        self.g_helper(
            "strata_print_bool",
            &[
                "lea rsi, [rip + .Lstr_false]",
                "lea rax, [rip + .Lstr_true]",
                "test rdi, rdi",
                "cmovne rsi, rax",
                "lea rdi, [rip + .Lfmt_str]",
                "xor eax, eax",
            ],
        );
        self.g_helper(
            "strata_print_char",
            &["mov esi, edi", "lea rdi, [rip + .Lfmt_char]", "xor eax, eax"],
        );
    }

    fn g_helper(&mut self, name: &str, setup: &[&str]) {
        self.out(f!("{name}:"));
        self.indented(|this| {
            this.out("push rbp");
            this.out("mov rbp, rsp");
            for line in setup {
                this.out(line);
            }
            this.out(f!("call {}", E::PRINTF));
            this.out("pop rbp");
            this.out("ret");
        });
    }

    fn g_data(&mut self) {
        self.out(f!(".section {}", E::SECTION_READ_ONLY_DATA));
        for (label, value) in [
            (".Lfmt_int", "%lld\\n"),
            (".Lfmt_float", "%g\\n"),
            (".Lfmt_str", "%s\\n"),
            (".Lfmt_char", "%c\\n"),
            (".Lstr_true", "true"),
            (".Lstr_false", "false"),
        ] {
            self.out(f!("{label}:"));
            self.out(f!("    .asciz \"{value}\""));
        }
        let strings = std::mem::take(&mut self.strings);
        for (value, index) in &strings {
            self.out(f!(".LC{index}:"));
            self.out(f!("    .asciz \"{}\"", escape_asciz(value)));
        }

        let globals = self.resolution.global_count();
        if globals > 0 {
            self.out_line();
            self.out(f!(".section {}", E::SECTION_DATA));
            self.out(".p2align 3");
            for index in 0..globals {
                self.out(f!(".Lglobal_{index}:"));
                self.out("    .quad 0");
            }
        }
    }
}

/// Statements.
impl<E> Generator<'_, E>
where
    E: x86_64_env::Env,
{
    fn g_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match &stmt.kind {
            StmtKind::Let { ty, value, .. } => {
                self.g_expr(value)?;
                self.g_coerce(self.types.of(value), *ty);
                if let Some(local) = self.resolution.declared(stmt.id) {
                    self.store(self.resolution.local(local).slot);
                }
            }
            StmtKind::Assign { target, value } => {
                self.g_expr(value)?;
                let Some(Binding::Local(local)) = self.resolution.binding(stmt.id) else {
                    let kind = CodegenErrorKind::UnresolvedAssignment(target.clone());
                    return Err(error(kind, &stmt.location));
                };
                let local = self.resolution.local(local);
                self.g_coerce(self.types.of(value), local.ty);
                self.store(local.slot);
            }
            StmtKind::Expr(expr) => self.g_expr(expr)?,
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let n = self.next_label();
                self.g_expr(condition)?;
                self.out("cmp rax, 0");
                self.out(f!("je .Lelse_{n}"));
                self.g_block(then_branch)?;
                self.out(f!("jmp .Lendif_{n}"));
                self.label(f!(".Lelse_{n}"));
                self.g_block(else_branch)?;
                self.label(f!(".Lendif_{n}"));
            }
            StmtKind::While { condition, body } => {
                let n = self.next_label();
                self.label(f!(".Lwhile_{n}"));
                self.g_expr(condition)?;
                self.out("cmp rax, 0");
                self.out(f!("je .Lendwhile_{n}"));
                self.g_loop_body(body, format!(".Lwhile_{n}"), format!(".Lendwhile_{n}"))?;
                self.out(f!("jmp .Lwhile_{n}"));
                self.label(f!(".Lendwhile_{n}"));
            }
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => {
                let n = self.next_label();
                self.g_stmt(init)?;
                self.label(f!(".Lfor_{n}"));
                self.g_expr(condition)?;
                self.out("cmp rax, 0");
                self.out(f!("je .Lendfor_{n}"));
                self.g_loop_body(body, format!(".Lforupd_{n}"), format!(".Lendfor_{n}"))?;
                self.label(f!(".Lforupd_{n}"));
                self.g_stmt(update)?;
                self.out(f!("jmp .Lfor_{n}"));
                self.label(f!(".Lendfor_{n}"));
            }
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.g_expr(value)?;
                    self.g_coerce(self.types.of(value), self.return_ty);
                } else {
                    self.out("xor eax, eax");
                }
                self.g_epilogue();
            }
            StmtKind::Break | StmtKind::Continue => {
                let is_break = matches!(stmt.kind, StmtKind::Break);
                let Some(labels) = self.loops.last() else {
                    let keyword = if is_break { "break" } else { "continue" };
                    return Err(error(CodegenErrorKind::OutsideLoop(keyword), &stmt.location));
                };
                let target = if is_break {
                    labels.break_label.clone()
                } else {
                    labels.continue_label.clone()
                };
                self.out(f!("jmp {target}"));
            }
            // Emitted on their own after the entry point.
            StmtKind::Function(_) => {}
            StmtKind::Import { .. } => {}
        }
        Ok(())
    }

    fn g_block(&mut self, stmts: &[Stmt]) -> Result<()> {
        for stmt in stmts {
            self.g_stmt(stmt)?;
        }
        Ok(())
    }

    fn g_loop_body(
        &mut self,
        body: &[Stmt],
        continue_label: String,
        break_label: String,
    ) -> Result<()> {
        self.loops.push(LoopLabels {
            continue_label,
            break_label,
        });
        let res = self.g_block(body);
        self.loops.pop();
        res
    }
}

/// Expressions.
impl<E> Generator<'_, E>
where
    E: x86_64_env::Env,
{
    fn g_expr(&mut self, expr: &Expr) -> Result<()> {
        match &expr.kind {
            ExprKind::Literal(Literal::Int(value)) => self.out(f!("mov rax, {value}")),
            ExprKind::Literal(Literal::Float(value)) => {
                self.out(f!("movabs rax, {:#018x}", value.to_bits()));
            }
            ExprKind::Literal(Literal::Bool(true)) => self.out("mov eax, 1"),
            ExprKind::Literal(Literal::Bool(false)) => self.out("xor eax, eax"),
            ExprKind::Literal(Literal::String(value)) => {
                let index = self.intern_string(value);
                self.out(f!("lea rax, [rip + .LC{index}]"));
            }
            ExprKind::Ident(_) => match self.resolution.binding(expr.id) {
                Some(Binding::Local(local)) => {
                    let slot = self.resolution.local(local).slot;
                    self.out(f!("mov rax, {}", operand(slot)));
                }
                // Imports and unresolved names have no run-time value.
                Some(Binding::Import(_)) | None => self.out("xor eax, eax"),
            },
            ExprKind::Binary { op, lhs, rhs } => self.g_binary(expr, *op, lhs, rhs)?,
            ExprKind::Unary { op, expr: inner } => {
                self.g_expr(inner)?;
                let ty = self.types.of(inner);
                match op {
                    UnaryOperator::Plus => {}
                    UnaryOperator::Neg if ty.is(Primitive::Float) => {
                        self.out("movabs rcx, 0x8000000000000000");
                        self.out("xor rax, rcx");
                    }
                    UnaryOperator::Neg => self.out("neg rax"),
                    UnaryOperator::Not => {
                        self.out("cmp rax, 0");
                        self.out("sete al");
                        self.out("movzx eax, al");
                    }
                    UnaryOperator::BitNot => {
                        if ty.is(Primitive::Float) {
                            self.out("movq xmm0, rax");
                            self.out("cvttsd2si rax, xmm0");
                        }
                        self.out("not rax");
                    }
                }
            }
            ExprKind::Call { callee, args } => self.g_call(expr, callee, args)?,
            ExprKind::Member { property, .. } => {
                let kind = CodegenErrorKind::UnsupportedMember(property.clone());
                return Err(error(kind, &expr.location));
            }
        }
        Ok(())
    }

    fn g_binary(&mut self, expr: &Expr, op: BinaryOperator, lhs: &Expr, rhs: &Expr) -> Result<()> {
        if op.is_logical() {
            return self.g_logical(op, lhs, rhs);
        }
        let lhs_ty = self.types.of(lhs);
        let rhs_ty = self.types.of(rhs);
        let is_float = lhs_ty.is(Primitive::Float) || rhs_ty.is(Primitive::Float);
        let has_string = lhs_ty.is(Primitive::String) || rhs_ty.is(Primitive::String);
        if op == BinaryOperator::Add && has_string && !is_float {
            return Err(error(
                CodegenErrorKind::StringConcatenation,
                &expr.location,
            ));
        }

        self.g_expr(lhs)?;
        self.push("rax");
        self.g_expr(rhs)?;
        self.out("mov rcx, rax");
        self.pop("rax");

        if is_float {
            self.g_float_binary(op, lhs_ty, rhs_ty);
        } else {
            self.g_int_binary(op);
        }
        Ok(())
    }

    /// Applies `op` to `rax` (left) and `rcx` (right).
    fn g_int_binary(&mut self, op: BinaryOperator) {
        use BinaryOperator::*;
        match op {
            Add => self.out("add rax, rcx"),
            Sub => self.out("sub rax, rcx"),
            Mul => self.out("imul rax, rcx"),
            Div | Rem => {
                self.out("cqo");
                self.out("idiv rcx");
                if op == Rem {
                    self.out("mov rax, rdx");
                }
            }
            Eq | Ne | Lt | Gt | Le | Ge => {
                let cc = match op {
                    Eq => "e",
                    Ne => "ne",
                    Lt => "l",
                    Gt => "g",
                    Le => "le",
                    _ => "ge",
                };
                self.out("cmp rax, rcx");
                self.out(f!("set{cc} al"));
                self.out("movzx eax, al");
            }
            And | Or => unreachable!("logical operators short-circuit"),
        }
    }

    /// Applies `op` to `rax` (left) and `rcx` (right) as doubles, converting
    /// integer operands first.
    fn g_float_binary(&mut self, op: BinaryOperator, lhs_ty: Type, rhs_ty: Type) {
        use BinaryOperator::*;
        self.out(if lhs_ty.is(Primitive::Int) {
            "cvtsi2sd xmm0, rax"
        } else {
            "movq xmm0, rax"
        });
        self.out(if rhs_ty.is(Primitive::Int) {
            "cvtsi2sd xmm1, rcx"
        } else {
            "movq xmm1, rcx"
        });
        match op {
            Add | Sub | Mul | Div => {
                let instr = match op {
                    Add => "addsd",
                    Sub => "subsd",
                    Mul => "mulsd",
                    _ => "divsd",
                };
                self.out(f!("{instr} xmm0, xmm1"));
                self.out("movq rax, xmm0");
            }
            Rem => {
                self.g_aligned_call(E::FMOD);
                self.out("movq rax, xmm0");
            }
            // Unordered comparisons (NaN) are false, except for `!=`.
            Eq => {
                self.out("ucomisd xmm0, xmm1");
                self.out("sete al");
                self.out("setnp cl");
                self.out("and al, cl");
                self.out("movzx eax, al");
            }
            Ne => {
                self.out("ucomisd xmm0, xmm1");
                self.out("setne al");
                self.out("setp cl");
                self.out("or al, cl");
                self.out("movzx eax, al");
            }
            Lt | Gt | Le | Ge => {
                let (operands, cc) = match op {
                    Gt => ("xmm0, xmm1", "a"),
                    Ge => ("xmm0, xmm1", "ae"),
                    Lt => ("xmm1, xmm0", "a"),
                    _ => ("xmm1, xmm0", "ae"),
                };
                self.out(f!("ucomisd {operands}"));
                self.out(f!("set{cc} al"));
                self.out("movzx eax, al");
            }
            And | Or => unreachable!("logical operators short-circuit"),
        }
    }

    fn g_logical(&mut self, op: BinaryOperator, lhs: &Expr, rhs: &Expr) -> Result<()> {
        let n = self.next_label();
        if op == BinaryOperator::And {
            self.g_expr(lhs)?;
            self.out("cmp rax, 0");
            self.out(f!("je .Land_false_{n}"));
            self.g_expr(rhs)?;
            self.out("cmp rax, 0");
            self.out(f!("je .Land_false_{n}"));
            self.out("mov eax, 1");
            self.out(f!("jmp .Land_end_{n}"));
            self.label(f!(".Land_false_{n}"));
            self.out("xor eax, eax");
            self.label(f!(".Land_end_{n}"));
        } else {
            self.g_expr(lhs)?;
            self.out("cmp rax, 0");
            self.out(f!("jne .Lor_true_{n}"));
            self.g_expr(rhs)?;
            self.out("cmp rax, 0");
            self.out(f!("jne .Lor_true_{n}"));
            self.out("xor eax, eax");
            self.out(f!("jmp .Lor_end_{n}"));
            self.label(f!(".Lor_true_{n}"));
            self.out("mov eax, 1");
            self.label(f!(".Lor_end_{n}"));
        }
        Ok(())
    }

    fn g_call(&mut self, call: &Expr, callee: &Expr, args: &[Expr]) -> Result<()> {
        match &callee.kind {
            ExprKind::Ident(name) => {
                if let Some(function) = self.resolution.call_target(call.id) {
                    return self.g_user_call(function, args);
                }
                if PRINT_BUILTINS.contains(&&**name) {
                    return self.g_print(name, args, &call.location);
                }
                let kind = CodegenErrorKind::UndefinedFunction(name.clone());
                Err(error(kind, &call.location))
            }
            ExprKind::Member { property, .. } if PRINT_BUILTINS.contains(&&**property) => {
                self.g_print(property, args, &call.location)
            }
            ExprKind::Member { property, .. } => {
                let kind = CodegenErrorKind::UnsupportedMember(property.clone());
                Err(error(kind, &call.location))
            }
            _ => Err(error(CodegenErrorKind::UnsupportedCallee, &call.location)),
        }
    }

    /// Evaluates arguments left to right onto the stack, then moves the
    /// first six into registers and leaves the rest in order on top of the
    /// stack.
    fn g_user_call(&mut self, function: FunctionId, args: &[Expr]) -> Result<()> {
        let resolution = self.resolution;
        let info = resolution.function(function);
        for (index, arg) in args.iter().enumerate() {
            self.g_expr(arg)?;
            if let Some(&param_ty) = info.param_types.get(index) {
                self.g_coerce(self.types.of(arg), param_ty);
            }
            self.push("rax");
        }

        let n = args.len();
        let stack_args = n.saturating_sub(REGISTER_PARAMS);
        let pad = (self.depth + stack_args) % 2;
        if pad == 1 {
            self.out("sub rsp, 8");
            self.depth += 1;
        }
        for index in (REGISTER_PARAMS..n).rev() {
            let offset = 16 * (n - 1 - index) + 8 * pad;
            self.push(f!("qword ptr [rsp + {offset}]"));
        }
        for (index, register) in ARG_REGISTERS.iter().enumerate().take(n) {
            let offset = 8 * (n - 1 - index) + 8 * pad + 8 * stack_args;
            self.out(f!("mov {register}, qword ptr [rsp + {offset}]"));
        }
        self.out(f!("call user_{}", info.name));

        let slots = n + pad + stack_args;
        if slots > 0 {
            self.out(f!("add rsp, {}", 8 * slots));
            self.depth -= slots;
        }
        Ok(())
    }

    fn g_print(&mut self, name: &str, args: &[Expr], location: &Location) -> Result<()> {
        let [arg] = args else {
            let kind = CodegenErrorKind::PrintArity {
                name: name.into(),
                found: args.len(),
            };
            return Err(error(kind, location));
        };
        self.g_expr(arg)?;
        let helper = match self.types.of(arg).primitive {
            Primitive::Float => "strata_print_float",
            Primitive::String => "strata_print_str",
            Primitive::Bool => "strata_print_bool",
            Primitive::Char => "strata_print_char",
            Primitive::Int | Primitive::Void | Primitive::Any => "strata_print_int",
        };
        self.out("mov rdi, rax");
        self.g_aligned_call(helper);
        Ok(())
    }

    /// Converts the value in `rax` when an integer flows into a float slot.
    fn g_coerce(&mut self, from: Type, to: Type) {
        if from.is(Primitive::Int) && to.is(Primitive::Float) {
            self.out("cvtsi2sd xmm0, rax");
            self.out("movq rax, xmm0");
        }
    }

    fn g_aligned_call(&mut self, target: &str) {
        if self.depth % 2 == 1 {
            self.out("sub rsp, 8");
            self.out(f!("call {target}"));
            self.out("add rsp, 8");
        } else {
            self.out(f!("call {target}"));
        }
    }
}

/// Utility functions.
impl<E> Generator<'_, E>
where
    E: x86_64_env::Env,
{
    /// Prints a line.
    fn out(&mut self, f: impl std::fmt::Display) {
        let indent = if self.indent { "    " } else { "" };
        _ = writeln!(self.text, "{indent}{f}");
    }

    /// Prints an empty line.
    fn out_line(&mut self) {
        self.text.push('\n');
    }

    /// Prints a local label, outdented from the surrounding instructions.
    fn label(&mut self, label: impl std::fmt::Display) {
        _ = writeln!(self.text, "{label}:");
    }

    fn push(&mut self, operand: impl std::fmt::Display) {
        self.out(f!("push {operand}"));
        self.depth += 1;
    }

    fn pop(&mut self, operand: impl std::fmt::Display) {
        self.out(f!("pop {operand}"));
        self.depth -= 1;
    }

    fn store(&mut self, slot: Slot) {
        self.out(f!("mov {}, rax", operand(slot)));
    }

    fn next_label(&mut self) -> u32 {
        let n = self.labels;
        self.labels += 1;
        n
    }

    fn intern_string(&mut self, value: &str) -> usize {
        let next = self.strings.len();
        *self.strings.entry(value.into()).or_insert(next)
    }

    /// Writes in an indented block that is finished with an empty line.
    fn indented<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.indent = true;
        let res = f(self);
        self.indent = false;
        self.out_line();
        res
    }
}

fn operand(slot: Slot) -> String {
    match slot {
        Slot::Frame(offset) if offset < 0 => format!("qword ptr [rbp - {}]", -offset),
        Slot::Frame(offset) => format!("qword ptr [rbp + {offset}]"),
        Slot::Global(index) => format!("qword ptr [rip + .Lglobal_{index}]"),
    }
}

fn error(kind: CodegenErrorKind, location: &Location) -> CodegenError {
    CodegenError {
        kind,
        location: location.clone(),
    }
}

/// Escapes a string for an `.asciz` directive.
fn escape_asciz(value: &str) -> String {
    let mut buf = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'"' => buf.push_str("\\\""),
            b'\\' => buf.push_str("\\\\"),
            b'\n' => buf.push_str("\\n"),
            b'\t' => buf.push_str("\\t"),
            b'\r' => buf.push_str("\\r"),
            0x20..=0x7e => buf.push(char::from(byte)),
            _ => _ = write!(buf, "\\{byte:03o}"),
        }
    }
    buf
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::{
        codegen::{generate, Target},
        lexer::lex,
        parser::parse,
        resolve::resolve,
        type_checker::{check, CheckOptions},
    };

    fn compile_for(src: &str, target: Target) -> Result<String> {
        let program = parse(&lex(src, "")).expect("failed to parse");
        let resolution = resolve(&program);
        let types = check(&program, &resolution, CheckOptions::default()).expect("failed to check");
        generate(&program, &resolution, &types, target)
    }

    fn compile(src: &str) -> String {
        compile_for(src, Target::x86_64_linux).expect("failed to generate")
    }

    fn count(haystack: &str, needle: &str) -> usize {
        haystack.matches(needle).count()
    }

    #[test]
    fn literals_are_pooled_once() {
        let asm = compile(indoc! {r#"
            import io from std::io
            io.println(42)
            io.println(2.5)
            io.println("hello")
            io.println(true)
            io.println("hello")
            print("bye")
        "#});
        assert_eq!(count(&asm, ".asciz \"hello\""), 1);
        assert_eq!(count(&asm, ".asciz \"bye\""), 1);
        assert!(asm.contains(".LC0:\n    .asciz \"hello\""));
        assert!(asm.contains(".LC1:\n    .asciz \"bye\""));
        assert!(asm.contains("mov rax, 42"));
        assert!(asm.contains(&format!("movabs rax, {:#018x}", 2.5f64.to_bits())));
        for helper in [
            "strata_print_int",
            "strata_print_float",
            "strata_print_str",
            "strata_print_bool",
        ] {
            assert!(asm.contains(&format!("call {helper}")), "missing {helper}");
        }
    }

    #[test]
    fn linux_layout() {
        let asm = compile("let x: int = 1");
        assert!(asm.starts_with(".intel_syntax noprefix\n"));
        assert!(asm.contains(".section .note.GNU-stack"));
        assert!(asm.contains(".globl main\nmain:\n"));
        assert!(asm.contains("call printf@PLT"));
        assert!(asm.contains("mov qword ptr [rip + .Lglobal_0], rax"));
        assert!(asm.contains(".section .data\n.p2align 3\n.Lglobal_0:\n    .quad 0"));
    }

    #[test]
    fn darwin_layout() {
        let asm = compile_for("print(1)", Target::x86_64_darwin).unwrap();
        assert!(asm.contains(".globl _main\n_main:\n"));
        assert!(asm.contains("call _printf"));
        assert!(!asm.contains("GNU-stack"));
    }

    #[test]
    fn functions_use_mangled_labels() {
        let asm = compile(indoc! {"
            func add(a: int, b: int) => int {
                return a + b
            }
            print(add(1, 2))
        "});
        assert!(asm.contains("user_add:\n"));
        assert!(asm.contains("    mov qword ptr [rbp - 8], rdi\n    mov qword ptr [rbp - 16], rsi\n"));
        assert!(asm.contains("call user_add"));
        assert!(asm.contains("mov rdi, qword ptr [rsp + 8]\n    mov rsi, qword ptr [rsp + 0]"));
    }

    #[test]
    fn stack_arguments_are_reordered() {
        let asm = compile(indoc! {"
            func pick(a: int, b: int, c: int, d: int, e: int, f: int, g: int, h: int) => int {
                return h
            }
            pick(1, 2, 3, 4, 5, 6, 7, 8)
        "});
        // Eight pushes are even, so no padding: `h` then `g` are re-pushed.
        assert!(asm.contains("push qword ptr [rsp + 0]\n    push qword ptr [rsp + 16]\n"));
        assert!(asm.contains("mov rdi, qword ptr [rsp + 72]"));
        assert!(asm.contains("mov r9, qword ptr [rsp + 32]"));
        assert!(asm.contains("call user_pick\n    add rsp, 80"));
        assert!(asm.contains("mov rax, qword ptr [rbp + 24]"));
    }

    #[test]
    fn control_flow_labels_never_collide() {
        let asm = compile(indoc! {"
            var i: int = 0
            while (i < 10) {
                if (i == 5) { break } else { i = i + 1 }
                if (i > 7) { continue }
            }
            for (var j: int = 0; j < 3; j = j + 1) {
                if (true && false || true) { continue }
            }
        "});
        for label in [
            ".Lwhile_0:",
            ".Lendwhile_0:",
            ".Lelse_1:",
            ".Lendif_1:",
            ".Lelse_2:",
            ".Lendif_2:",
            ".Lfor_3:",
            ".Lforupd_3:",
            ".Lendfor_3:",
            ".Lelse_4:",
            ".Lor_true_5:",
            ".Land_false_6:",
        ] {
            assert_eq!(count(&asm, &format!("\n{label}\n")), 1, "label {label}");
        }
        assert!(asm.contains("jmp .Lendwhile_0"));
        assert!(asm.contains("jmp .Lwhile_0"));
        assert!(asm.contains("jmp .Lforupd_3"));
    }

    #[test]
    fn integers_widen_into_float_slots() {
        let asm = compile(indoc! {"
            func half(x: float) => float { return x / 2 }
            var f: float = 1
            f = half(3)
        "});
        assert!(count(&asm, "cvtsi2sd xmm0, rax") >= 2);
        assert!(asm.contains("cvtsi2sd xmm1, rcx"));
        assert!(asm.contains("divsd xmm0, xmm1"));
    }

    #[test]
    fn calls_before_the_declaration_use_its_signature() {
        let asm = compile(indoc! {"
            print(half(3))
            func half(x: float) => float { return x / 2 }
        "});
        assert!(asm.contains("cvtsi2sd xmm0, rax\n    movq rax, xmm0\n    push rax"));
        assert!(asm.contains("call user_half"));
        assert!(asm.contains("call strata_print_float"));
        assert!(!asm.contains("call strata_print_int"));
    }

    #[test]
    fn float_remainder_calls_fmod_aligned() {
        let asm = compile("let r: float = 5.5 % 2.0");
        assert!(asm.contains("call fmod@PLT"));
    }

    #[test]
    fn string_concatenation_is_rejected() {
        let error = compile_for(r#"let s: string = "a" + "b""#, Target::x86_64_linux).unwrap_err();
        assert_eq!(error.kind, CodegenErrorKind::StringConcatenation);
        assert_eq!(error.to_string(), "1:21: string concatenation is not supported");
    }

    #[test]
    fn unsupported_member_access_is_rejected() {
        let error = compile_for("import m from lib\nm.run(1)", Target::x86_64_linux).unwrap_err();
        assert_eq!(error.kind, CodegenErrorKind::UnsupportedMember("run".into()));
    }

    #[test]
    fn demos_compile_for_every_target() {
        let demos = [
            include_str!("../../demos/fib.str"),
            include_str!("../../demos/hello.str"),
            include_str!("../../demos/loops.str"),
        ];
        for demo in demos {
            for &target in Target::ALL {
                let asm = compile_for(demo, target).unwrap();
                assert!(asm.contains("strata_print_int:"));
            }
        }
    }

    #[test]
    fn escape_asciz_handles_specials() {
        assert_eq!(escape_asciz("a\"b\\c\n\t\u{1}"), "a\\\"b\\\\c\\n\\t\\001");
        assert_eq!(escape_asciz("é"), "\\303\\251");
    }
}
