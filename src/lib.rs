/// The lexer takes the source input, mapping it into a sequence of tokens.
pub mod lexer;

/// The parser takes a sequence of tokens, mapping it into an AST.
pub mod parser;

/// The resolver binds every name in the AST to its declaration and assigns
/// each variable a storage slot.
pub mod resolve;

/// The type checker takes a resolved AST, checks the soundness of its types,
/// and records the type of every expression.
pub mod type_checker;

/// The code generator maps a checked AST into x86-64 assembly.
pub mod codegen {
    mod interface;
    pub use interface::*;

    pub mod x86_64;
    pub mod x86_64_env;
}

/// External assembler and linker invocation.
pub mod toolchain;

/// Runs the whole pipeline, from a source path to an executable.
pub mod driver;

pub mod ast;
pub mod error;
pub mod token;
pub mod types;

pub mod util {
    pub mod fmt;
    #[cfg(test)]
    pub(crate) mod test_utils;
}
