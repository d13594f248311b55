//! Symbol resolution.
//!
//! A single walk over the AST binds every identifier use to the declaration
//! it refers to and assigns each local a storage slot. The resulting
//! [`Resolution`] is read by both the type checker and the code generator.

use std::collections::HashMap;

use crate::{
    ast::{Expr, ExprKind, Function, Ident, NodeId, Stmt, StmtKind},
    token::Location,
    types::Type,
};

/// Number of parameters passed in registers.
pub const REGISTER_PARAMS: usize = 6;

const SLOT_SIZE: u32 = 8;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct LocalId(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FunctionId(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImportId(pub u32);

/// What a name use refers to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Binding {
    Local(LocalId),
    Import(ImportId),
}

/// Where a local lives at run time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Slot {
    /// Offset from `rbp`. Negative for spilled parameters and locals,
    /// positive for stack-passed parameters.
    Frame(i32),
    /// A zero-initialized data cell, for declarations in the top-level
    /// scope.
    Global(u32),
}

#[derive(Debug, Clone)]
pub struct Local {
    pub name: Ident,
    pub ty: Type,
    pub mutable: bool,
    pub slot: Slot,
}

#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub name: Ident,
    pub params: Vec<LocalId>,
    pub param_types: Vec<Type>,
    pub return_ty: Type,
    /// Bytes reserved below `rbp`, a multiple of 16.
    pub frame_size: u32,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub struct Import {
    pub name: Ident,
    pub module: Vec<Ident>,
}

#[derive(Debug, Default)]
pub struct Resolution {
    locals: Vec<Local>,
    functions: Vec<FunctionInfo>,
    imports: Vec<Import>,
    /// Declaring node (`let` statement or parameter) to the local it
    /// introduces.
    declarations: HashMap<NodeId, LocalId>,
    /// Identifier expression or assignment statement to its binding.
    uses: HashMap<NodeId, Binding>,
    /// Call expression to the function visible at the call site.
    calls: HashMap<NodeId, FunctionId>,
    /// Function declaration statement to its table entry.
    function_decls: HashMap<NodeId, FunctionId>,
    globals: u32,
    main_frame_size: u32,
}

impl Resolution {
    pub fn local(&self, id: LocalId) -> &Local {
        &self.locals[id.0 as usize]
    }

    pub fn function(&self, id: FunctionId) -> &FunctionInfo {
        &self.functions[id.0 as usize]
    }

    pub fn import(&self, id: ImportId) -> &Import {
        &self.imports[id.0 as usize]
    }

    pub fn imports(&self) -> &[Import] {
        &self.imports
    }

    pub fn functions(&self) -> &[FunctionInfo] {
        &self.functions
    }

    pub fn declared(&self, decl: NodeId) -> Option<LocalId> {
        self.declarations.get(&decl).copied()
    }

    pub fn binding(&self, use_site: NodeId) -> Option<Binding> {
        self.uses.get(&use_site).copied()
    }

    pub fn call_target(&self, call: NodeId) -> Option<FunctionId> {
        self.calls.get(&call).copied()
    }

    pub fn function_decl(&self, decl: NodeId) -> Option<FunctionId> {
        self.function_decls.get(&decl).copied()
    }

    /// Number of global data cells.
    pub fn global_count(&self) -> u32 {
        self.globals
    }

    /// Frame size of the entry point, which runs the top-level statements.
    pub fn main_frame_size(&self) -> u32 {
        self.main_frame_size
    }
}

/// Resolves every name in `program`. Never fails: uses that do not resolve
/// are simply absent from the result.
///
/// Top-level functions are registered before any statement is walked, so
/// calls may precede the declaration they target.
pub fn resolve(program: &[Stmt]) -> Resolution {
    let mut r = Resolver {
        out: Resolution::default(),
        scopes: vec![Scope::default()],
        function_names: HashMap::new(),
        frame: FrameAllocator::default(),
        in_function: false,
    };
    for stmt in program {
        if let StmtKind::Function(function) = &stmt.kind {
            r.declare_function(stmt, function);
        }
    }
    r.resolve_block(program);
    r.out.main_frame_size = r.frame.size();
    r.out
}

#[derive(Default)]
struct Scope {
    names: HashMap<Ident, Binding>,
}

#[derive(Default)]
struct FrameAllocator {
    used: u32,
}

impl FrameAllocator {
    /// Reserves the next 8-byte slot, returning its `rbp` offset.
    fn next(&mut self) -> i32 {
        self.used += SLOT_SIZE;
        -i32::try_from(self.used).expect("frame offset fits in i32")
    }

    fn size(&self) -> u32 {
        self.used.next_multiple_of(16)
    }
}

struct Resolver {
    out: Resolution,
    scopes: Vec<Scope>,
    /// Functions visible by name. The first declaration of a name wins.
    function_names: HashMap<Ident, FunctionId>,
    frame: FrameAllocator,
    in_function: bool,
}

impl Resolver {
    fn resolve_block(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.resolve_stmt(stmt);
        }
    }

    fn resolve_scoped_block(&mut self, stmts: &[Stmt]) {
        self.scoped(|this| this.resolve_block(stmts));
    }

    fn resolve_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Let {
                name,
                ty,
                value,
                mutable,
            } => {
                // The initializer can't see the name it initializes.
                self.resolve_expr(value);
                let id = self.declare(name, *ty, *mutable);
                self.out.declarations.insert(stmt.id, id);
            }
            StmtKind::Assign { target, value } => {
                self.resolve_expr(value);
                if let Some(binding) = self.lookup(target) {
                    self.out.uses.insert(stmt.id, binding);
                }
            }
            StmtKind::Expr(expr) => self.resolve_expr(expr),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition);
                self.resolve_scoped_block(then_branch);
                self.resolve_scoped_block(else_branch);
            }
            StmtKind::While { condition, body } => {
                self.resolve_expr(condition);
                self.resolve_scoped_block(body);
            }
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => self.scoped(|this| {
                this.resolve_stmt(init);
                this.resolve_expr(condition);
                this.resolve_stmt(update);
                this.resolve_block(body);
            }),
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.resolve_expr(value);
                }
            }
            StmtKind::Break | StmtKind::Continue => {}
            StmtKind::Function(function) => self.resolve_function(stmt, function),
            StmtKind::Import { name, module } => {
                let id = ImportId(count(&self.out.imports));
                self.out.imports.push(Import {
                    name: name.clone(),
                    module: module.clone(),
                });
                self.innermost().names.insert(name.clone(), Binding::Import(id));
            }
        }
    }

    fn declare_function(&mut self, stmt: &Stmt, function: &Function) -> FunctionId {
        let id = FunctionId(count(&self.out.functions));
        self.out.functions.push(FunctionInfo {
            name: function.name.clone(),
            params: Vec::with_capacity(function.params.len()),
            param_types: function.params.iter().map(|p| p.ty).collect(),
            return_ty: function.return_ty,
            frame_size: 0,
            location: stmt.location.clone(),
        });
        self.out.function_decls.insert(stmt.id, id);
        self.function_names
            .entry(function.name.clone())
            .or_insert(id);
        id
    }

    fn resolve_function(&mut self, stmt: &Stmt, function: &Function) {
        // Nested declarations are not hoisted; they become visible here,
        // before their body, so recursive calls resolve.
        let id = match self.out.function_decls.get(&stmt.id) {
            Some(&id) => id,
            None => self.declare_function(stmt, function),
        };

        let outer_frame = std::mem::take(&mut self.frame);
        let outer_in_function = std::mem::replace(&mut self.in_function, true);
        self.scoped(|this| {
            for (index, param) in function.params.iter().enumerate() {
                let slot = if index < REGISTER_PARAMS {
                    Slot::Frame(this.frame.next())
                } else {
                    let stack_index = i32::try_from(index - REGISTER_PARAMS)
                        .expect("parameter count fits in i32");
                    Slot::Frame(16 + 8 * stack_index)
                };
                let local = this.push_local(&param.name, param.ty, false, slot);
                this.out.declarations.insert(param.id, local);
                this.out.functions[id.0 as usize].params.push(local);
            }
            this.resolve_block(&function.body);
        });
        self.out.functions[id.0 as usize].frame_size = self.frame.size();
        self.frame = outer_frame;
        self.in_function = outer_in_function;
    }

    fn resolve_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Literal(_) => {}
            ExprKind::Ident(name) => {
                if let Some(binding) = self.lookup(name) {
                    self.out.uses.insert(expr.id, binding);
                }
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                self.resolve_expr(lhs);
                self.resolve_expr(rhs);
            }
            ExprKind::Unary { expr: inner, .. } => self.resolve_expr(inner),
            ExprKind::Call { callee, args } => {
                if let Some(name) = callee.as_ident() {
                    if let Some(&function) = self.function_names.get(name) {
                        self.out.calls.insert(expr.id, function);
                    }
                } else {
                    self.resolve_expr(callee);
                }
                for arg in args {
                    self.resolve_expr(arg);
                }
            }
            ExprKind::Member { object, .. } => self.resolve_expr(object),
        }
    }

    /// Declares a local in the innermost scope. Names declared directly in
    /// the top-level scope become globals so functions can reach them.
    fn declare(&mut self, name: &Ident, ty: Type, mutable: bool) -> LocalId {
        let slot = if !self.in_function && self.scopes.len() == 1 {
            let cell = self.out.globals;
            self.out.globals += 1;
            Slot::Global(cell)
        } else {
            Slot::Frame(self.frame.next())
        };
        self.push_local(name, ty, mutable, slot)
    }

    fn push_local(&mut self, name: &Ident, ty: Type, mutable: bool, slot: Slot) -> LocalId {
        let id = LocalId(count(&self.out.locals));
        self.out.locals.push(Local {
            name: name.clone(),
            ty,
            mutable,
            slot,
        });
        self.innermost()
            .names
            .insert(name.clone(), Binding::Local(id));
        id
    }

    fn lookup(&self, name: &str) -> Option<Binding> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.names.get(name).copied())
    }

    fn innermost(&mut self) -> &mut Scope {
        self.scopes
            .last_mut()
            .expect("the top-level scope is never popped")
    }

    fn scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.scopes.push(Scope::default());
        let res = f(self);
        self.scopes.pop();
        res
    }
}

fn count<T>(items: &[T]) -> u32 {
    u32::try_from(items.len()).expect("item count fits in u32")
}
