//! Target architecture table and compiler configuration.
//!
//! Mirrors the teacher's `CompilerConfig` builder: an external driver
//! constructs a [`CompileOptions`] describing include paths, predefined
//! macros, and the target, and hands it to [`crate::compile_translation_unit`].

use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Machine integer width as carried by the IR (spec.md §3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IrWidth {
    I8,
    I16,
    I32,
    I64,
}

impl IrWidth {
    pub fn bits(self) -> u32 {
        match self {
            IrWidth::I8 => 8,
            IrWidth::I16 => 16,
            IrWidth::I32 => 32,
            IrWidth::I64 => 64,
        }
    }
}

impl std::fmt::Display for IrWidth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IrWidth::I8 => "i8",
            IrWidth::I16 => "i16",
            IrWidth::I32 => "i32",
            IrWidth::I64 => "i64",
        };
        write!(f, "{name}")
    }
}

/// One of the four target architectures spec.md §6 accepts as input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetArch {
    I386,
    Amd64,
    Arm32,
    Arm64,
}

impl std::str::FromStr for TargetArch {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "i386" => Ok(TargetArch::I386),
            "amd64" => Ok(TargetArch::Amd64),
            "arm32" => Ok(TargetArch::Arm32),
            "arm64" => Ok(TargetArch::Arm64),
            other => Err(format!("unknown target architecture '{other}'")),
        }
    }
}

use crate::types::{FloatRank, IntRank};

impl TargetArch {
    /// Width of `Bool/Char/Short/Int/Long/LongLong` on this architecture.
    /// Only `long` varies: 32 bits on the two ILP32 targets (`i386`,
    /// `arm32`), 64 bits on the two LP64 targets (`amd64`, `arm64`). This
    /// table is the authoritative source the spec's open questions point
    /// to (spec.md §9: "`long` width differs per architecture").
    pub fn int_width(self, rank: IntRank) -> IrWidth {
        match rank {
            IntRank::Bool | IntRank::Char => IrWidth::I8,
            IntRank::Short => IrWidth::I16,
            IntRank::Int => IrWidth::I32,
            IntRank::Long => match self {
                TargetArch::I386 | TargetArch::Arm32 => IrWidth::I32,
                TargetArch::Amd64 | TargetArch::Arm64 => IrWidth::I64,
            },
            IntRank::LongLong => IrWidth::I64,
        }
    }

    pub fn float_width(self, rank: FloatRank) -> IrWidth {
        match rank {
            FloatRank::Float => IrWidth::I32,
            // `long double` is a Non-goal (spec.md §1); treated as an
            // alias of `double` for width purposes only.
            FloatRank::Double | FloatRank::LongDouble => IrWidth::I64,
        }
    }

    /// Pointers and `size_t`/`sizeof` results are machine-word sized.
    pub fn pointer_width(self) -> IrWidth {
        match self {
            TargetArch::I386 | TargetArch::Arm32 => IrWidth::I32,
            TargetArch::Amd64 | TargetArch::Arm64 => IrWidth::I64,
        }
    }

    /// The integer rank `sizeof` and pointer-difference results take:
    /// `unsigned long` by convention on every target here.
    pub fn size_t_rank(self) -> IntRank {
        IntRank::Long
    }
}

/// External input of spec.md §6: root file is supplied separately by the
/// caller, everything else needed to drive the pipeline lives here.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub user_include_paths: Vec<PathBuf>,
    pub system_include_paths: Vec<PathBuf>,
    pub predefined_macros: HashMap<String, String>,
    pub target: TargetArch,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            user_include_paths: Vec::new(),
            system_include_paths: Vec::new(),
            predefined_macros: HashMap::new(),
            target: TargetArch::Amd64,
        }
    }
}

impl CompileOptions {
    pub fn new(target: TargetArch) -> Self {
        CompileOptions { target, ..Default::default() }
    }

    pub fn with_user_include(mut self, path: impl Into<PathBuf>) -> Self {
        self.user_include_paths.push(path.into());
        self
    }

    pub fn with_system_include(mut self, path: impl Into<PathBuf>) -> Self {
        self.system_include_paths.push(path.into());
        self
    }

    pub fn with_macro(mut self, name: impl Into<String>, replacement: impl Into<String>) -> Self {
        self.predefined_macros.insert(name.into(), replacement.into());
        self
    }

    /// Load user/system include paths, macros, and target from a project
    /// file, the way the teacher's `CompilerConfig` complements its
    /// programmatic builder with a loadable form.
    pub fn from_toml(text: &str) -> Result<Self, String> {
        #[derive(Deserialize)]
        struct Raw {
            target: TargetArch,
            #[serde(default)]
            user_include_paths: Vec<PathBuf>,
            #[serde(default)]
            system_include_paths: Vec<PathBuf>,
            #[serde(default)]
            predefined_macros: HashMap<String, String>,
        }
        let raw: Raw = toml::from_str(text).map_err(|e| format!("invalid compiler config: {e}"))?;
        Ok(CompileOptions {
            user_include_paths: raw.user_include_paths,
            system_include_paths: raw.system_include_paths,
            predefined_macros: raw.predefined_macros,
            target: raw.target,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_is_32_bits_on_ilp32_targets() {
        assert_eq!(TargetArch::I386.int_width(IntRank::Long), IrWidth::I32);
        assert_eq!(TargetArch::Arm32.int_width(IntRank::Long), IrWidth::I32);
    }

    #[test]
    fn long_is_64_bits_on_lp64_targets() {
        assert_eq!(TargetArch::Amd64.int_width(IntRank::Long), IrWidth::I64);
        assert_eq!(TargetArch::Arm64.int_width(IntRank::Long), IrWidth::I64);
    }

    #[test]
    fn builder_accumulates_include_paths_and_macros() {
        let opts = CompileOptions::new(TargetArch::Amd64)
            .with_user_include("./include")
            .with_system_include("/usr/include")
            .with_macro("NDEBUG", "1");
        assert_eq!(opts.user_include_paths, vec![PathBuf::from("./include")]);
        assert_eq!(opts.system_include_paths, vec![PathBuf::from("/usr/include")]);
        assert_eq!(opts.predefined_macros.get("NDEBUG").map(String::as_str), Some("1"));
    }

    #[test]
    fn from_toml_parses_target_and_paths() {
        let opts = CompileOptions::from_toml(
            r#"
            target = "arm64"
            user_include_paths = ["src/include"]
            "#,
        )
        .unwrap();
        assert_eq!(opts.target, TargetArch::Arm64);
        assert_eq!(opts.user_include_paths, vec![PathBuf::from("src/include")]);
    }
}
