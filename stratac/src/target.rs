#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
#[clap(rename_all = "snake_case")]
pub enum Target {
    x86_64_darwin,
    x86_64_linux,
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        strata::codegen::Target::from(*self).fmt(f)
    }
}

impl From<Target> for strata::codegen::Target {
    fn from(value: Target) -> Self {
        match value {
            Target::x86_64_darwin => strata::codegen::Target::x86_64_darwin,
            Target::x86_64_linux => strata::codegen::Target::x86_64_linux,
        }
    }
}

// Hosts without a native backend still default to Linux output, which is
// useful with `-S`.
cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "x86_64", target_os = "macos"))] {
        pub const DEFAULT_TARGET: Target = Target::x86_64_darwin;
    } else {
        pub const DEFAULT_TARGET: Target = Target::x86_64_linux;
    }
}
