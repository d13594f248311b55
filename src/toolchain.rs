use std::{
    fs, io,
    path::Path,
    process::{Command, ExitStatus},
};

use thiserror::Error;

use crate::{codegen::Target, error::Phase};

/// Turns assembly text into object code and object code into an executable.
pub trait Toolchain {
    fn assemble(&self, asm: &str) -> Result<Vec<u8>, ToolchainError>;

    fn link(&self, objects: &[Vec<u8>]) -> Result<Vec<u8>, ToolchainError>;
}

#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("failed to prepare scratch files: {source}")]
    Io {
        phase: Phase,
        #[source]
        source: io::Error,
    },
    #[error("could not run `{program}`: {source}")]
    Spawn {
        phase: Phase,
        program: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("`{program}` failed ({status}): {stderr}")]
    Failed {
        phase: Phase,
        program: &'static str,
        status: ExitStatus,
        stderr: Box<str>,
    },
}

impl ToolchainError {
    pub fn phase(&self) -> Phase {
        match self {
            ToolchainError::Io { phase, .. }
            | ToolchainError::Spawn { phase, .. }
            | ToolchainError::Failed { phase, .. } => *phase,
        }
    }
}

/// The host's assembler and C compiler driver, run through a scratch
/// directory that is removed on drop.
///
/// Each step has one fallback: `as` falls back to `cc -c`, and linking with
/// `cc` falls back to `clang`.
pub struct SystemToolchain {
    target: Target,
}

impl SystemToolchain {
    pub fn new(target: Target) -> SystemToolchain {
        SystemToolchain { target }
    }

    fn arch_args(&self) -> &'static [&'static str] {
        match self.target {
            Target::x86_64_darwin => &["-arch", "x86_64"],
            Target::x86_64_linux => &[],
        }
    }

    /// Libraries the generated code calls into beyond libc. On glibc `fmod`
    /// lives in libm.
    fn link_libs(&self) -> &'static [&'static str] {
        match self.target {
            Target::x86_64_darwin => &[],
            Target::x86_64_linux => &["-lm"],
        }
    }
}

impl Toolchain for SystemToolchain {
    fn assemble(&self, asm: &str) -> Result<Vec<u8>, ToolchainError> {
        let phase = Phase::Assembler;
        let dir = scratch_dir(phase)?;
        let asm_path = dir.path().join("out.s");
        let obj_path = dir.path().join("out.o");
        fs::write(&asm_path, asm).map_err(|source| ToolchainError::Io { phase, source })?;

        let mut primary = Command::new("as");
        primary
            .args(self.arch_args())
            .arg("-o")
            .arg(&obj_path)
            .arg(&asm_path);
        let mut fallback = Command::new("cc");
        fallback
            .args(self.arch_args())
            .args(["-c", "-x", "assembler"])
            .arg(&asm_path)
            .arg("-o")
            .arg(&obj_path);
        run_with_fallback(phase, ("as", primary), ("cc", fallback))?;

        read_output(phase, &obj_path)
    }

    fn link(&self, objects: &[Vec<u8>]) -> Result<Vec<u8>, ToolchainError> {
        let phase = Phase::Linker;
        let dir = scratch_dir(phase)?;
        let mut object_paths = Vec::with_capacity(objects.len());
        for (i, object) in objects.iter().enumerate() {
            let path = dir.path().join(format!("in{i}.o"));
            fs::write(&path, object).map_err(|source| ToolchainError::Io { phase, source })?;
            object_paths.push(path);
        }
        let exe_path = dir.path().join("a.out");

        let command = |program: &str| {
            let mut command = Command::new(program);
            command
                .args(self.arch_args())
                .arg("-o")
                .arg(&exe_path)
                .args(&object_paths)
                .args(self.link_libs());
            command
        };
        run_with_fallback(phase, ("cc", command("cc")), ("clang", command("clang")))?;

        read_output(phase, &exe_path)
    }
}

fn scratch_dir(phase: Phase) -> Result<tempfile::TempDir, ToolchainError> {
    tempfile::Builder::new()
        .prefix("stratac")
        .tempdir()
        .map_err(|source| ToolchainError::Io { phase, source })
}

fn read_output(phase: Phase, path: &Path) -> Result<Vec<u8>, ToolchainError> {
    fs::read(path).map_err(|source| ToolchainError::Io { phase, source })
}

/// Runs `primary`, and `fallback` once if the first could not be started or
/// exited unsuccessfully.
///
/// When the fallback is not installed, the primary's failure is reported
/// instead, since it is the one that says what went wrong.
fn run_with_fallback(
    phase: Phase,
    primary: (&'static str, Command),
    fallback: (&'static str, Command),
) -> Result<(), ToolchainError> {
    let Err(primary_error) = run(phase, primary) else {
        return Ok(());
    };
    match run(phase, fallback) {
        Err(ToolchainError::Spawn { .. }) => Err(primary_error),
        res => res,
    }
}

fn run(phase: Phase, (program, mut command): (&'static str, Command)) -> Result<(), ToolchainError> {
    let output = command
        .output()
        .map_err(|source| ToolchainError::Spawn {
            phase,
            program,
            source,
        })?;
    if output.status.success() {
        return Ok(());
    }
    Err(ToolchainError::Failed {
        phase,
        program,
        status: output.status,
        stderr: String::from_utf8_lossy(&output.stderr).trim().into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_carry_their_phase() {
        let error = ToolchainError::Spawn {
            phase: Phase::Linker,
            program: "cc",
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert_eq!(error.phase(), Phase::Linker);
        assert!(error.to_string().starts_with("could not run `cc`: "));
    }

    #[test]
    fn missing_programs_report_the_primary() {
        let missing = Command::new("stratac-no-such-program");
        let result = run_with_fallback(
            Phase::Assembler,
            ("stratac-no-such-program", missing),
            ("stratac-still-missing", Command::new("stratac-still-missing")),
        );
        match result {
            Err(ToolchainError::Spawn { program, phase, .. }) => {
                assert_eq!(program, "stratac-no-such-program");
                assert_eq!(phase, Phase::Assembler);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn primary_failure_survives_a_missing_fallback() {
        let mut failing = Command::new("sh");
        failing.args(["-c", "echo 'undefined reference to fmod' >&2; exit 1"]);
        let result = run_with_fallback(
            Phase::Linker,
            ("cc", failing),
            ("stratac-no-such-program", Command::new("stratac-no-such-program")),
        );
        match result {
            Err(ToolchainError::Failed {
                program,
                phase,
                stderr,
                ..
            }) => {
                assert_eq!(program, "cc");
                assert_eq!(phase, Phase::Linker);
                assert_eq!(&*stderr, "undefined reference to fmod");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn fallback_recovers_from_a_failing_primary() {
        let mut failing = Command::new("sh");
        failing.args(["-c", "exit 1"]);
        let result = run_with_fallback(
            Phase::Assembler,
            ("as", failing),
            ("true", Command::new("true")),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn linux_links_against_libm() {
        assert_eq!(SystemToolchain::new(Target::x86_64_linux).link_libs(), ["-lm"]);
        assert!(SystemToolchain::new(Target::x86_64_darwin).link_libs().is_empty());
    }
}
