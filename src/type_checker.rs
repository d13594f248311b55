use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::{
    ast::{
        BinaryOperator, Expr, ExprKind, Function, Literal, NodeId, Stmt, StmtKind, UnaryOperator,
    },
    resolve::{Binding, Resolution},
    token::Location,
    types::{Primitive, Type},
};

type Result<T, E = TypeError> = std::result::Result<T, E>;

/// Names accepted as calls to the print helpers when no user function
/// shadows them.
pub const PRINT_BUILTINS: &[&str] = &["print", "println"];

#[derive(Copy, Clone, Debug, Default)]
pub struct CheckOptions {
    /// Reject identifiers and calls that don't resolve, instead of typing
    /// them as `any`.
    pub strict_names: bool,
}

/// Static type of every expression, keyed by node.
#[derive(Debug, Default)]
pub struct TypeTable {
    map: HashMap<NodeId, Type>,
}

impl TypeTable {
    pub fn get(&self, id: NodeId) -> Option<Type> {
        self.map.get(&id).copied()
    }

    /// Type of an expression, `any` if the checker never reached it.
    pub fn of(&self, expr: &Expr) -> Type {
        self.get(expr.id).unwrap_or(Type::ANY)
    }
}

#[derive(Clone, Debug, PartialEq, Error)]
#[error("{location}: {kind}")]
pub struct TypeError {
    pub kind: TypeErrorKind,
    pub location: Location,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TypeErrorKind {
    #[error("type mismatch: expected {expected}, found {found}")]
    Mismatch { expected: Type, found: Type },
    #[error("undefined variable `{0}`")]
    UndefinedVariable(Box<str>),
    #[error("undefined function `{0}`")]
    UndefinedFunction(Box<str>),
    #[error("cannot assign to immutable variable `{0}`")]
    ImmutableAssignment(Box<str>),
    #[error("condition must be bool, found {0}")]
    NonBooleanCondition(Type),
    #[error("return statement outside function")]
    ReturnOutsideFunction,
    #[error("function returning {0} must return a value")]
    MissingReturnValue(Type),
    #[error("return type mismatch: expected {expected}, found {found}")]
    ReturnMismatch { expected: Type, found: Type },
    #[error("logical operator `{op}` requires bool operands, found {found}")]
    LogicalOperand { op: BinaryOperator, found: Type },
    #[error("logical not requires a bool operand, found {0}")]
    NotOperand(Type),
    #[error("function `{name}` expects {expected} arguments, found {found}")]
    ArgumentCount {
        name: Box<str>,
        expected: usize,
        found: usize,
    },
    #[error("argument {index} of `{name}` has type {found}, expected {expected}")]
    ArgumentMismatch {
        name: Box<str>,
        index: usize,
        expected: Type,
        found: Type,
    },
    #[error("functions can only be declared at the top level")]
    NestedFunction,
    #[error("function `{0}` is already defined")]
    DuplicateFunction(Box<str>),
    #[error("`{0}` outside of a loop")]
    OutsideLoop(&'static str),
}

impl TypeError {
    fn new(kind: TypeErrorKind, location: &Location) -> TypeError {
        TypeError {
            kind,
            location: location.clone(),
        }
    }
}

/// Checks `program` against the resolved names, stopping at the first
/// violation. On success, returns the type of every expression.
pub fn check(
    program: &[Stmt],
    resolution: &Resolution,
    options: CheckOptions,
) -> Result<TypeTable> {
    let mut checker = Checker {
        resolution,
        options,
        types: TypeTable::default(),
        return_ty: None,
        loop_depth: 0,
        block_depth: 0,
        functions: HashSet::new(),
    };
    checker.check_block(program)?;
    Ok(checker.types)
}

struct Checker<'r> {
    resolution: &'r Resolution,
    options: CheckOptions,
    types: TypeTable,
    /// Declared return type of the enclosing function, if any.
    return_ty: Option<Type>,
    loop_depth: u32,
    block_depth: u32,
    functions: HashSet<Box<str>>,
}

impl Checker<'_> {
    fn check_block(&mut self, stmts: &[Stmt]) -> Result<()> {
        for stmt in stmts {
            self.check_stmt(stmt)?;
        }
        Ok(())
    }

    fn check_nested_block(&mut self, stmts: &[Stmt]) -> Result<()> {
        self.block_depth += 1;
        let res = self.check_block(stmts);
        self.block_depth -= 1;
        res
    }

    fn check_loop_body(&mut self, stmts: &[Stmt]) -> Result<()> {
        self.loop_depth += 1;
        let res = self.check_nested_block(stmts);
        self.loop_depth -= 1;
        res
    }

    fn check_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        let location = &stmt.location;
        match &stmt.kind {
            StmtKind::Let { ty, value, .. } => {
                let found = self.check_expr(value)?;
                if !found.is_compatible_with(*ty) {
                    let kind = TypeErrorKind::Mismatch {
                        expected: *ty,
                        found,
                    };
                    return Err(TypeError::new(kind, location));
                }
            }
            StmtKind::Assign { target, value } => {
                let found = self.check_expr(value)?;
                let local = match self.resolution.binding(stmt.id) {
                    None => {
                        let kind = TypeErrorKind::UndefinedVariable(target.clone());
                        return Err(TypeError::new(kind, location));
                    }
                    Some(Binding::Import(_)) => {
                        let kind = TypeErrorKind::ImmutableAssignment(target.clone());
                        return Err(TypeError::new(kind, location));
                    }
                    Some(Binding::Local(id)) => self.resolution.local(id),
                };
                if !local.mutable {
                    let kind = TypeErrorKind::ImmutableAssignment(target.clone());
                    return Err(TypeError::new(kind, location));
                }
                if !found.is_compatible_with(local.ty) {
                    let kind = TypeErrorKind::Mismatch {
                        expected: local.ty,
                        found,
                    };
                    return Err(TypeError::new(kind, location));
                }
            }
            StmtKind::Expr(expr) => {
                self.check_expr(expr)?;
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.check_condition(condition)?;
                self.check_nested_block(then_branch)?;
                self.check_nested_block(else_branch)?;
            }
            StmtKind::While { condition, body } => {
                self.check_condition(condition)?;
                self.check_loop_body(body)?;
            }
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => {
                self.block_depth += 1;
                self.check_stmt(init)?;
                self.check_condition(condition)?;
                self.check_stmt(update)?;
                self.block_depth -= 1;
                self.check_loop_body(body)?;
            }
            StmtKind::Return(value) => self.check_return(value.as_ref(), location)?,
            StmtKind::Break => self.check_loop_control("break", location)?,
            StmtKind::Continue => self.check_loop_control("continue", location)?,
            StmtKind::Function(function) => self.check_function(function, location)?,
            StmtKind::Import { .. } => {}
        }
        Ok(())
    }

    fn check_function(&mut self, function: &Function, location: &Location) -> Result<()> {
        if self.block_depth > 0 || self.return_ty.is_some() {
            return Err(TypeError::new(TypeErrorKind::NestedFunction, location));
        }
        if !self.functions.insert(function.name.clone()) {
            let kind = TypeErrorKind::DuplicateFunction(function.name.clone());
            return Err(TypeError::new(kind, location));
        }

        let outer_return = self.return_ty.replace(function.return_ty);
        let outer_loops = std::mem::take(&mut self.loop_depth);
        let res = self.check_nested_block(&function.body);
        self.return_ty = outer_return;
        self.loop_depth = outer_loops;
        res
    }

    fn check_return(&mut self, value: Option<&Expr>, location: &Location) -> Result<()> {
        let Some(expected) = self.return_ty else {
            return Err(TypeError::new(TypeErrorKind::ReturnOutsideFunction, location));
        };
        match value {
            None if expected.is(Primitive::Void) => Ok(()),
            None => Err(TypeError::new(
                TypeErrorKind::MissingReturnValue(expected),
                location,
            )),
            Some(value) => {
                let found = self.check_expr(value)?;
                if found.is_compatible_with(expected) {
                    Ok(())
                } else {
                    let kind = TypeErrorKind::ReturnMismatch { expected, found };
                    Err(TypeError::new(kind, location))
                }
            }
        }
    }

    fn check_loop_control(&self, keyword: &'static str, location: &Location) -> Result<()> {
        if self.loop_depth == 0 {
            return Err(TypeError::new(TypeErrorKind::OutsideLoop(keyword), location));
        }
        Ok(())
    }

    fn check_condition(&mut self, condition: &Expr) -> Result<()> {
        let ty = self.check_expr(condition)?;
        if !ty.is_boolish() {
            let kind = TypeErrorKind::NonBooleanCondition(ty);
            return Err(TypeError::new(kind, &condition.location));
        }
        Ok(())
    }

    fn check_expr(&mut self, expr: &Expr) -> Result<Type> {
        let ty = self.infer_expr(expr)?;
        self.types.map.insert(expr.id, ty);
        Ok(ty)
    }

    fn infer_expr(&mut self, expr: &Expr) -> Result<Type> {
        let location = &expr.location;
        let ty = match &expr.kind {
            ExprKind::Literal(Literal::Int(_)) => Type::INT,
            ExprKind::Literal(Literal::Float(_)) => Type::FLOAT,
            ExprKind::Literal(Literal::Bool(_)) => Type::BOOL,
            ExprKind::Literal(Literal::String(_)) => Type::STRING,
            ExprKind::Ident(name) => match self.resolution.binding(expr.id) {
                Some(Binding::Local(id)) => self.resolution.local(id).ty,
                Some(Binding::Import(_)) => Type::ANY,
                None if self.options.strict_names => {
                    let kind = TypeErrorKind::UndefinedVariable(name.clone());
                    return Err(TypeError::new(kind, location));
                }
                None => Type::ANY,
            },
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.check_expr(lhs)?;
                let rhs = self.check_expr(rhs)?;
                binary_type(*op, lhs, rhs, location)?
            }
            ExprKind::Unary { op, expr: inner } => {
                let inner = self.check_expr(inner)?;
                match op {
                    UnaryOperator::Not if inner.is_boolish() => Type::BOOL,
                    UnaryOperator::Not => {
                        return Err(TypeError::new(TypeErrorKind::NotOperand(inner), location));
                    }
                    UnaryOperator::Neg | UnaryOperator::Plus => inner,
                    UnaryOperator::BitNot => Type::INT,
                }
            }
            ExprKind::Call { callee, args } => self.check_call(expr, callee, args)?,
            ExprKind::Member { object, .. } => {
                self.check_expr(object)?;
                Type::ANY
            }
        };
        Ok(ty)
    }

    fn check_call(&mut self, call: &Expr, callee: &Expr, args: &[Expr]) -> Result<Type> {
        let mut arg_types = Vec::with_capacity(args.len());
        for arg in args {
            arg_types.push(self.check_expr(arg)?);
        }

        let Some(name) = callee.as_ident() else {
            // Method-style calls such as `io.println(x)`.
            self.check_expr(callee)?;
            return Ok(Type::ANY);
        };
        let Some(function) = self.resolution.call_target(call.id) else {
            if PRINT_BUILTINS.contains(&name) {
                return Ok(Type::VOID);
            }
            if self.options.strict_names {
                let kind = TypeErrorKind::UndefinedFunction(name.into());
                return Err(TypeError::new(kind, &call.location));
            }
            return Ok(Type::ANY);
        };

        let function = self.resolution.function(function);
        if function.param_types.len() != args.len() {
            let kind = TypeErrorKind::ArgumentCount {
                name: name.into(),
                expected: function.param_types.len(),
                found: args.len(),
            };
            return Err(TypeError::new(kind, &call.location));
        }
        let params = function.param_types.iter().zip(&arg_types);
        for (index, (&expected, &found)) in params.enumerate() {
            if !found.is_compatible_with(expected) {
                let kind = TypeErrorKind::ArgumentMismatch {
                    name: name.into(),
                    index: index + 1,
                    expected,
                    found,
                };
                return Err(TypeError::new(kind, &args[index].location));
            }
        }
        Ok(function.return_ty)
    }
}

fn binary_type(op: BinaryOperator, lhs: Type, rhs: Type, location: &Location) -> Result<Type> {
    if op.is_comparison() {
        return Ok(Type::BOOL);
    }
    if op.is_logical() {
        for found in [lhs, rhs] {
            if !found.is_boolish() {
                let kind = TypeErrorKind::LogicalOperand { op, found };
                return Err(TypeError::new(kind, location));
            }
        }
        return Ok(Type::BOOL);
    }
    let ty = if lhs.is(Primitive::Float) || rhs.is(Primitive::Float) {
        Type::FLOAT
    } else if op == BinaryOperator::Add && lhs.is(Primitive::String) {
        Type::STRING
    } else {
        Type::INT
    };
    Ok(ty)
}

#[cfg(test)]
mod tests {
    use crate::util::test_utils::tree_tests;

    tree_tests!(
        use checker;

        fn test_arithmetic_types() {
            let program = "
                let a: float = 1 + 2.5
                let b: string = \"x\" + 1
                let c: bool = 1 < 2.0 == true
            ";
            let tree_ok = r#"
                let a: float (1:1)
                  binary + (1:18 %: float)
                    int 1 (1:16 %: int)
                    float 2.5 (1:20 %: float)
                let b: string (2:1)
                  binary + (2:21 %: string)
                    string "x" (2:17 %: string)
                    int 1 (2:23 %: int)
                let c: bool (3:1)
                  binary == (3:23 %: bool)
                    binary < (3:17 %: bool)
                      int 1 (3:15 %: int)
                      float 2.0 (3:19 %: float)
                    bool true (3:26 %: bool)
            "#;
        }

        fn test_int_widens_to_float() {
            let program = "var x: float = 1\nx = 2";
            let expected_errors = &[];
        }

        fn test_float_does_not_narrow_to_int() {
            let program = "let x: int = 1.5";
            let expected_errors = &["1:1: type mismatch: expected int, found float"];
        }

        fn test_let_string_into_int() {
            let program = r#"let x: int = "s""#;
            let expected_errors = &["1:1: type mismatch: expected int, found string"];
        }

        fn test_var_assignment() {
            let program = "var x: int = 1\nx = 2";
            let expected_errors = &[];
        }

        fn test_immutable_assignment() {
            let program = "let x: int = 1\nx = 2";
            let expected_errors = &["2:1: cannot assign to immutable variable `x`"];
        }

        fn test_const_is_immutable() {
            let program = "const x: int = 1\nx = 2";
            let expected_errors = &["2:1: cannot assign to immutable variable `x`"];
        }

        fn test_parameters_are_immutable() {
            let program = "
                func f(x: int) => int {
                    x = 2
                    return x
                }
            ";
            let expected_errors = &["2:5: cannot assign to immutable variable `x`"];
        }

        fn test_assignment_to_undefined() {
            let program = "y = 2";
            let expected_errors = &["1:1: undefined variable `y`"];
        }

        fn test_bare_return_in_int_function() {
            let program = "func f() => int { return }";
            let expected_errors = &["1:19: function returning int must return a value"];
        }

        fn test_return_value_in_void_function() {
            let program = "func f() => void { return 5 }";
            let expected_errors = &["1:20: return type mismatch: expected void, found int"];
        }

        fn test_return_outside_function() {
            let program = "return 1";
            let expected_errors = &["1:1: return statement outside function"];
        }

        fn test_condition_must_be_bool() {
            let program = "while (1) { }";
            let expected_errors = &["1:8: condition must be bool, found int"];
        }

        fn test_any_condition_is_accepted() {
            let program = "if (unknown) { }";
            let expected_errors = &[];
        }

        fn test_logical_operands() {
            let program = "let b: bool = true && 1";
            let expected_errors = &["1:20: logical operator `&&` requires bool operands, found int"];
        }

        fn test_logical_not() {
            let program = "let b: bool = !1";
            let expected_errors = &["1:15: logical not requires a bool operand, found int"];
        }

        fn test_unary_types() {
            let expr = "-1.5 + ~2";
            let tree_ok = "
                binary + (1:6 %: float)
                  unary Neg (1:1 %: float)
                    float 1.5 (1:2 %: float)
                  unary BitNot (1:8 %: int)
                    int 2 (1:9 %: int)
            ";
        }

        fn test_calls_before_declaration_are_checked() {
            let program = "
                let h: float = half(1)
                half(1, 2)
                func half(x: float) => float { return x / 2 }
            ";
            let expected_errors = &["2:1: function `half` expects 1 arguments, found 2"];
        }

        fn test_call_arity() {
            let program = "
                func add(a: int, b: int) => int { return a + b }
                add(1)
            ";
            let expected_errors = &["2:1: function `add` expects 2 arguments, found 1"];
        }

        fn test_call_argument_type() {
            let program = "
                func half(x: float) => float { return x / 2 }
                let h: float = half(1)
                let s: float = half(\"s\")
            ";
            let expected_errors = &["3:21: argument 1 of `half` has type string, expected float"];
        }

        fn test_recursive_call_types() {
            let program = "
                func fact(n: int) => int {
                    if (n <= 1) { return 1 }
                    return n * fact(n - 1)
                }
                let x: int = fact(5)
            ";
            let expected_errors = &[];
        }

        fn test_unresolved_names_are_any() {
            let program = "let x: int = mystery(y)";
            let expected_errors = &[];
        }

        fn test_for_scope_does_not_leak_in_strict_mode() {
            let strict_program = "
                for (var i: int = 0; i < 3; i = i + 1) { }
                let j: int = i
            ";
            let expected_errors = &["2:14: undefined variable `i`"];
        }

        fn test_strict_undefined_function() {
            let strict_program = "nothing(1)";
            let expected_errors = &["1:1: undefined function `nothing`"];
        }

        fn test_print_builtins_are_known_in_strict_mode() {
            let strict_program = "
                import io from std::io
                io.println(1)
                print(2.5)
            ";
            let expected_errors = &[];
        }

        fn test_break_outside_loop() {
            let program = "break";
            let expected_errors = &["1:1: `break` outside of a loop"];
        }

        fn test_loop_depth_resets_in_function() {
            let program = "while (true) { }\nfunc f() => void { continue }";
            let expected_errors = &["2:20: `continue` outside of a loop"];
        }

        fn test_nested_function() {
            let program = "func f() => void { func g() => void { } }";
            let expected_errors = &["1:20: functions can only be declared at the top level"];
        }

        fn test_duplicate_function() {
            let program = "func f() => void { }\nfunc f() => void { }";
            let expected_errors = &["2:1: function `f` is already defined"];
        }
    );
}
