use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use crate::{
    codegen::{self, Target},
    error::{CompileError, Phase},
    lexer, parser, resolve,
    toolchain::Toolchain,
    type_checker::{self, CheckOptions},
};

#[derive(Clone, Debug)]
pub struct Options {
    pub input: PathBuf,
    /// Defaults to the input's file stem plus the host executable suffix.
    pub output: Option<PathBuf>,
    /// Stop after code generation and hand back the assembly.
    pub emit_asm: bool,
    /// Keep `<output>.s` next to the executable.
    pub keep_asm: bool,
    pub verbose: bool,
    pub strict_names: bool,
    pub target: Target,
}

impl Options {
    pub fn new(input: impl Into<PathBuf>, target: Target) -> Options {
        Options {
            input: input.into(),
            output: None,
            emit_asm: false,
            keep_asm: false,
            verbose: false,
            strict_names: false,
            target,
        }
    }

    pub fn output_path(&self) -> PathBuf {
        if let Some(output) = &self.output {
            return output.clone();
        }
        let stem = self.input.file_stem().unwrap_or(self.input.as_os_str());
        let mut name = stem.to_os_string();
        name.push(std::env::consts::EXE_SUFFIX);
        PathBuf::from(name)
    }
}

/// What a successful run produced.
#[derive(Debug, PartialEq, Eq)]
pub enum Artifact {
    Assembly(String),
    Executable(PathBuf),
}

pub struct Driver<T> {
    options: Options,
    toolchain: T,
}

impl<T: Toolchain> Driver<T> {
    pub fn new(options: Options, toolchain: T) -> Driver<T> {
        Driver { options, toolchain }
    }

    pub fn run(&self) -> Result<Artifact, CompileError> {
        let input = &self.options.input;
        self.trace(Phase::Read, format_args!("{}", input.display()));
        let src = fs::read_to_string(input).map_err(|source| CompileError::Read {
            path: input.clone(),
            source,
        })?;

        let asm = self.compile(&src, &input.display().to_string())?;
        if self.options.emit_asm {
            return Ok(Artifact::Assembly(asm));
        }

        let output = self.options.output_path();
        if self.options.keep_asm {
            let mut asm_path = output.clone().into_os_string();
            asm_path.push(".s");
            let asm_path = PathBuf::from(asm_path);
            self.trace(Phase::Codegen, format_args!("keeping {}", asm_path.display()));
            write(&asm_path, asm.as_bytes())?;
        }

        self.trace(Phase::Assembler, format_args!("{} bytes of assembly", asm.len()));
        let object = self.toolchain.assemble(&asm)?;
        self.trace(Phase::Linker, format_args!("{} bytes of object code", object.len()));
        let executable = self.toolchain.link(&[object])?;

        write(&output, &executable)?;
        make_executable(&output)?;
        self.trace(Phase::Linker, format_args!("wrote {}", output.display()));
        Ok(Artifact::Executable(output))
    }

    /// Runs every in-process phase over `src`, returning the assembly text.
    pub fn compile(&self, src: &str, file: &str) -> Result<String, CompileError> {
        let tokens = lexer::lex(src, file);
        if let Some(error) = tokens.iter().find(|token| token.is_error()) {
            return Err(CompileError::Lex {
                message: error.value.clone(),
                location: error.location.clone(),
            });
        }
        self.trace(Phase::Lexer, format_args!("{} tokens", tokens.len()));

        let program = parser::parse(&tokens)?;
        self.trace(Phase::Parser, format_args!("{} top-level statements", program.len()));

        let resolution = resolve::resolve(&program);
        let options = CheckOptions {
            strict_names: self.options.strict_names,
        };
        let types = type_checker::check(&program, &resolution, options)?;
        self.trace(
            Phase::Type,
            format_args!("{} functions checked", resolution.functions().len()),
        );

        let asm = codegen::generate(&program, &resolution, &types, self.options.target)?;
        self.trace(Phase::Codegen, format_args!("target {}", self.options.target));
        Ok(asm)
    }

    fn trace(&self, phase: Phase, args: fmt::Arguments<'_>) {
        if self.options.verbose {
            eprintln!("[stratac] {phase}: {args}");
        }
    }
}

fn write(path: &Path, contents: &[u8]) -> Result<(), CompileError> {
    fs::write(path, contents).map_err(|source| CompileError::Write {
        path: path.to_owned(),
        source,
    })
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), CompileError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|source| {
        CompileError::Write {
            path: path.to_owned(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn make_executable(_: &Path) -> Result<(), CompileError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, io};

    use indoc::indoc;

    use super::*;
    use crate::toolchain::ToolchainError;

    #[derive(Default)]
    struct StubToolchain {
        assembled: RefCell<Vec<String>>,
        fail_assembler: bool,
    }

    impl Toolchain for &StubToolchain {
        fn assemble(&self, asm: &str) -> Result<Vec<u8>, ToolchainError> {
            if self.fail_assembler {
                return Err(ToolchainError::Spawn {
                    phase: Phase::Assembler,
                    program: "as",
                    source: io::Error::from(io::ErrorKind::NotFound),
                });
            }
            self.assembled.borrow_mut().push(asm.to_owned());
            Ok(b"object".to_vec())
        }

        fn link(&self, objects: &[Vec<u8>]) -> Result<Vec<u8>, ToolchainError> {
            assert_eq!(objects, [b"object".to_vec()]);
            Ok(b"executable".to_vec())
        }
    }

    fn source_file(dir: &tempfile::TempDir, src: &str) -> PathBuf {
        let path = dir.path().join("main.str");
        fs::write(&path, src).unwrap();
        path
    }

    fn options(input: PathBuf) -> Options {
        Options::new(input, Target::x86_64_linux)
    }

    const HELLO: &str = indoc! {r#"
        import io from std::io
        let greeting: string = "hello"
        io.println(greeting)
    "#};

    #[test]
    fn emit_asm_stops_before_the_toolchain() {
        let dir = tempfile::tempdir().unwrap();
        let stub = StubToolchain::default();
        let options = Options {
            emit_asm: true,
            ..options(source_file(&dir, HELLO))
        };
        let Artifact::Assembly(asm) = Driver::new(options, &stub).run().unwrap() else {
            panic!("expected assembly");
        };
        assert!(asm.contains(".asciz \"hello\""));
        assert!(asm.contains("call strata_print_str"));
        assert!(stub.assembled.borrow().is_empty());
    }

    #[test]
    fn run_writes_the_linked_executable() {
        let dir = tempfile::tempdir().unwrap();
        let stub = StubToolchain::default();
        let output = dir.path().join("hello");
        let options = Options {
            output: Some(output.clone()),
            keep_asm: true,
            ..options(source_file(&dir, HELLO))
        };
        let artifact = Driver::new(options, &stub).run().unwrap();

        assert_eq!(artifact, Artifact::Executable(output.clone()));
        assert_eq!(fs::read(&output).unwrap(), b"executable");
        let kept = fs::read_to_string(dir.path().join("hello.s")).unwrap();
        assert_eq!(stub.assembled.borrow().as_slice(), [kept]);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&output).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn assembly_is_not_kept_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let stub = StubToolchain::default();
        let output = dir.path().join("hello");
        let options = Options {
            output: Some(output.clone()),
            ..options(source_file(&dir, HELLO))
        };
        Driver::new(options, &stub).run().unwrap();
        assert!(!dir.path().join("hello.s").exists());
    }

    #[test]
    fn errors_report_their_phase() {
        let cases = [
            ("let x: int = 1 @ 2", Phase::Lexer, "main.str:1:16: unexpected character '@'"),
            ("let = 3", Phase::Parser, "main.str:1:5: expected `identifier`, found `=`"),
            (
                "let x: int = true",
                Phase::Type,
                "main.str:1:1: type mismatch: expected int, found bool",
            ),
            (
                r#"let s: string = "a" + "b""#,
                Phase::Codegen,
                "main.str:1:21: string concatenation is not supported",
            ),
        ];
        for (src, phase, message) in cases {
            let dir = tempfile::tempdir().unwrap();
            let stub = StubToolchain::default();
            let error = Driver::new(options(source_file(&dir, src)), &stub)
                .run()
                .unwrap_err();
            assert_eq!(error.phase(), phase, "{src}");
            assert!(error.to_string().ends_with(message), "{error}");
        }
    }

    #[test]
    fn strict_names_reject_unknown_identifiers() {
        let dir = tempfile::tempdir().unwrap();
        let input = source_file(&dir, "let x: any = y");
        let stub = StubToolchain::default();

        let lenient = Options {
            emit_asm: true,
            ..options(input.clone())
        };
        assert!(Driver::new(lenient, &stub).run().is_ok());

        let strict = Options {
            emit_asm: true,
            strict_names: true,
            ..options(input)
        };
        let error = Driver::new(strict, &stub).run().unwrap_err();
        assert_eq!(error.phase(), Phase::Type);
    }

    #[test]
    fn toolchain_failures_keep_their_phase() {
        let dir = tempfile::tempdir().unwrap();
        let stub = StubToolchain {
            fail_assembler: true,
            ..StubToolchain::default()
        };
        let options = Options {
            output: Some(dir.path().join("out")),
            ..options(source_file(&dir, HELLO))
        };
        let error = Driver::new(options, &stub).run().unwrap_err();
        assert_eq!(error.phase(), Phase::Assembler);
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn missing_input_is_a_read_error() {
        let stub = StubToolchain::default();
        let error = Driver::new(options("does/not/exist.str".into()), &stub)
            .run()
            .unwrap_err();
        assert_eq!(error.phase(), Phase::Read);
        assert!(error.to_string().starts_with("failed to read does/not/exist.str: "));
    }

    #[test]
    fn default_output_is_the_input_stem() {
        let options = options("demos/fib.str".into());
        let expected = format!("fib{}", std::env::consts::EXE_SUFFIX);
        assert_eq!(options.output_path(), PathBuf::from(expected));
    }
}
