//! c11front: translation pipeline of a C11 compiler front end.
//!
//! Four components, leaves first: [`lexer`] (tokenizing with an embedded
//! `#include`/object-macro preprocessor), [`numeric`] (integer/floating
//! constant decoding), [`types`] (the C type algebra plus conversion
//! rules), [`parser`] (recursive-descent, typedef-aware), [`irgen`]
//! (semantic checking folded into lowering to a typed three-address IR),
//! and [`cfg`] (basic-block recovery, unreachable-block pruning, and
//! re-linearization). [`span`] and [`diagnostics`] are shared across all
//! of them.
//!
//! The facade this module exposes, [`compile_translation_unit`], runs the
//! whole pipeline end to end and mirrors the teacher's `compile_file`/
//! `compile_file_with_config` pair: a plain-path entry point
//! ([`compile_file`]) backed by a config-driven one that every caller
//! (including the CLI binary) ultimately goes through.
//!
//! Command-line entry, include-path search *policy*, register allocation,
//! and assembly emission are out of scope (spec.md §1) — external
//! collaborators consume the [`ir::Module`] this crate produces.

pub mod ast;
pub mod cfg;
pub mod config;
pub mod diagnostics;
pub mod ir;
pub mod irgen;
pub mod lexer;
pub mod numeric;
pub mod parser;
pub mod span;
pub mod symtab;
pub mod types;

pub use ast::TranslationUnit;
pub use config::{CompileOptions, TargetArch};
pub use diagnostics::{Category, Diagnostic, DiagnosticBag, DiagnosticKind, Severity};
pub use ir::Module;
pub use irgen::IrGenerator;
pub use lexer::Lexer;
pub use parser::Parser;
pub use span::{Position, SourceMap, Span};

use std::fmt;
use std::path::{Path, PathBuf};

/// Successful result of [`compile_translation_unit`]: the lowered module,
/// every diagnostic recorded along the way (warnings only — an `Err` is
/// returned instead when any diagnostic is error-severity), and the
/// [`SourceMap`] needed to render a [`Span`] back to `path:line:col`.
pub struct CompileOutput {
    pub module: ir::Module,
    pub diagnostics: Vec<Diagnostic>,
    pub source_map: SourceMap,
}

/// Everything that can keep a translation unit from producing IR: either
/// the root file (or one of its `#include`s) could not be opened, or at
/// least one error-severity diagnostic was recorded during lexing,
/// parsing, or IR generation.
pub enum CompileError {
    Io { path: PathBuf, source: std::io::Error },
    Diagnostics { diagnostics: Vec<Diagnostic>, source_map: SourceMap },
}

impl fmt::Debug for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Io { path, source } => {
                f.debug_struct("Io").field("path", path).field("source", source).finish()
            }
            CompileError::Diagnostics { diagnostics, .. } => {
                f.debug_struct("Diagnostics").field("count", &diagnostics.len()).finish()
            }
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Io { path, source } => {
                write!(f, "cannot read '{}': {source}", path.display())
            }
            CompileError::Diagnostics { diagnostics, source_map } => {
                for (i, d) in diagnostics.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}: {}: {}", source_map.display_span(d.primary), severity_label(d.severity), d.kind)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for CompileError {}

fn severity_label(s: Severity) -> &'static str {
    match s {
        Severity::Error => "error",
        Severity::Warning => "warning",
    }
}

/// Compile one root translation unit file with default options (amd64,
/// no extra include paths or predefined macros) — the plain-path entry
/// point of the `compile_file`/`compile_file_with_config` pair.
pub fn compile_file(root_path: &Path) -> Result<CompileOutput, CompileError> {
    compile_translation_unit(root_path, &CompileOptions::default())
}

/// Run the full pipeline — lex, parse, lower to IR, prune and linearize
/// each function's CFG — over one root translation unit file.
///
/// `#include` and macro expansion happen transparently inside the lexer;
/// the parser consumes the fully preprocessed token stream and resolves
/// typedef ambiguity against its own scoped symbol table; IR generation
/// folds semantic checking (scopes, conversions, lvalue rules) into a
/// single AST walk per spec.md §4.7. Diagnostics from every stage are
/// merged into one bag, in the order each stage actually ran (lex and
/// parse fully finish — token buffering means the whole file is already
/// scanned — before any function is lowered).
pub fn compile_translation_unit(root_path: &Path, options: &CompileOptions) -> Result<CompileOutput, CompileError> {
    let mut lexer = Lexer::new(root_path, options)
        .map_err(|source| CompileError::Io { path: root_path.to_path_buf(), source })?;

    let mut parser = Parser::new(&mut lexer, options.target);
    let lex_diagnostics = std::mem::take(&mut lexer.diagnostics);
    let source_map = lexer.source_map().clone();

    let tu = parser.parse_translation_unit();
    let parse_diagnostics = parser.into_diagnostics();

    let mut diagnostics = DiagnosticBag::new();
    for d in lex_diagnostics.into_vec() {
        diagnostics.push(d);
    }
    for d in parse_diagnostics.into_vec() {
        diagnostics.push(d);
    }

    let mut generator = IrGenerator::new(options.target);
    let module = generator.generate(&tu, &mut diagnostics);

    if diagnostics.has_errors() {
        return Err(CompileError::Diagnostics { diagnostics: diagnostics.into_vec(), source_map });
    }
    Ok(CompileOutput { module, diagnostics: diagnostics.into_vec(), source_map })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_source(src: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::with_suffix(".c").unwrap();
        file.write_all(src.as_bytes()).unwrap();
        file
    }

    #[test]
    fn scenario_one_return_zero() {
        let file = write_source("int main() { return 0; }");
        let out = compile_file(file.path()).unwrap();
        let rendered = out.module.to_string();
        assert!(rendered.contains("ret i32 0"), "{rendered}");
    }

    #[test]
    fn scenario_two_constant_folds_float_addition() {
        let file = write_source("float main() { return 1.0f + 2.0f; }");
        let out = compile_file(file.path()).unwrap();
        assert!(out.module.to_string().contains("ret f32 3.000000"));
    }

    #[test]
    fn undeclared_identifier_is_a_compile_error() {
        let file = write_source("int main() { return missing; }");
        let err = compile_file(file.path()).unwrap_err();
        match err {
            CompileError::Diagnostics { diagnostics, .. } => assert!(!diagnostics.is_empty()),
            CompileError::Io { .. } => panic!("expected a diagnostic error, not an IO error"),
        }
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = compile_file(Path::new("/nonexistent/does-not-exist.c")).unwrap_err();
        assert!(matches!(err, CompileError::Io { .. }));
    }
}
