use std::{fmt, io, path::PathBuf};

use thiserror::Error;

use crate::{
    codegen::CodegenError, parser::ParseError, token::Location, toolchain::ToolchainError,
    type_checker::TypeError,
};

/// The pipeline stage a failure is attributed to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Read,
    Lexer,
    Parser,
    Type,
    Codegen,
    Assembler,
    Linker,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Read => "read",
            Phase::Lexer => "lexer",
            Phase::Parser => "parser",
            Phase::Type => "type",
            Phase::Codegen => "codegen",
            Phase::Assembler => "assembler",
            Phase::Linker => "linker",
        })
    }
}

/// Any failure of a compile. The first error aborts the pipeline.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{location}: {message}")]
    Lex { message: Box<str>, location: Location },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error(transparent)]
    Codegen(#[from] CodegenError),
    #[error(transparent)]
    Toolchain(#[from] ToolchainError),
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CompileError {
    pub fn phase(&self) -> Phase {
        match self {
            CompileError::Read { .. } => Phase::Read,
            CompileError::Lex { .. } => Phase::Lexer,
            CompileError::Parse(_) => Phase::Parser,
            CompileError::Type(_) => Phase::Type,
            CompileError::Codegen(_) => Phase::Codegen,
            CompileError::Toolchain(e) => e.phase(),
            CompileError::Write { .. } => Phase::Linker,
        }
    }
}
