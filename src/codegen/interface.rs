use thiserror::Error;

use crate::{
    ast::Stmt,
    codegen::{x86_64::Generator, x86_64_env},
    resolve::Resolution,
    token::Location,
    type_checker::TypeTable,
};

/// Emits assembly for a checked program.
pub fn generate(
    program: &[Stmt],
    resolution: &Resolution,
    types: &TypeTable,
    target: Target,
) -> Result<String, CodegenError> {
    type DarwinGenerator<'a> = Generator<'a, x86_64_env::Darwin>;
    type LinuxGenerator<'a> = Generator<'a, x86_64_env::Linux>;

    match target {
        Target::x86_64_darwin => DarwinGenerator::new(resolution, types).generate(program),
        Target::x86_64_linux => LinuxGenerator::new(resolution, types).generate(program),
    }
}

#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Target {
    x86_64_darwin,
    x86_64_linux,
}

impl Target {
    pub const ALL: &[Target] = &[Target::x86_64_darwin, Target::x86_64_linux];

    pub const fn triple(&self) -> &'static str {
        match self {
            Target::x86_64_darwin => "x86_64-apple-darwin",
            Target::x86_64_linux => "x86_64-unknown-linux-gnu",
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::x86_64_darwin => f.write_str("x86_64_darwin"),
            Target::x86_64_linux => f.write_str("x86_64_linux"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Error)]
#[error("{location}: {kind}")]
pub struct CodegenError {
    pub kind: CodegenErrorKind,
    pub location: Location,
}

/// Constructs that pass the type checker but have no machine
/// representation.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CodegenErrorKind {
    #[error("string concatenation is not supported")]
    StringConcatenation,
    #[error("member access `.{0}` is not supported outside of print calls")]
    UnsupportedMember(Box<str>),
    #[error("only named functions and print members can be called")]
    UnsupportedCallee,
    #[error("call to undefined function `{0}`")]
    UndefinedFunction(Box<str>),
    #[error("`{name}` takes exactly one argument, found {found}")]
    PrintArity { name: Box<str>, found: usize },
    #[error("`{0}` outside of a loop")]
    OutsideLoop(&'static str),
    #[error("assignment to unresolved name `{0}`")]
    UnresolvedAssignment(Box<str>),
}
