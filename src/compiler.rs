//! The compiler driver
//!
//! Orchestrates one compilation: parse, walk, collect diagnostics, and
//! hand back the compiled output. The walk is single-threaded cooperative;
//! one invocation owns its Program, entity graph and output buffer, and
//! shares nothing.

use std::path::PathBuf;

use thiserror::Error;

use crate::diagnostics::{Diagnostic, InternalError};
use crate::emitter::{WalkOptions, Walker};
use crate::entity::{BashVersion, Program};
use crate::parser::parse;

/// Default system-wide standard library location
pub const DEFAULT_STDLIB_PATH: &str = "/usr/lib/bpp/stdlib";

#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Include search path, in order. User-supplied `-I` paths come first,
    /// the system stdlib last.
    pub include_paths: Vec<PathBuf>,
    pub suppress_warnings: bool,
    pub target_bash: BashVersion,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            include_paths: vec![PathBuf::from(DEFAULT_STDLIB_PATH)],
            suppress_warnings: false,
            target_bash: BashVersion::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Internal(#[from] InternalError),
}

/// The outcome of one compilation
pub struct CompileResult {
    /// The compiled Bash text. Only meaningful when `success` is true; the
    /// driver never writes it out otherwise.
    pub output: String,
    pub diagnostics: Vec<Diagnostic>,
    pub success: bool,
    /// The analyzed program, for callers that want the symbol graph
    pub program: Program,
}

pub struct Compiler {
    options: CompileOptions,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compile source text. `source_file` is used for diagnostics and for
    /// resolving relative includes; pass `<stdin>` when compiling a pipe.
    pub fn compile_source(
        &self,
        source: &str,
        source_file: &str,
    ) -> Result<CompileResult, CompileError> {
        let (script, parse_errors) = parse(source);

        let mut program = Program::new();
        program.target_bash = self.options.target_bash;
        for error in parse_errors {
            program.add_diagnostic(Diagnostic::error_at(source_file, error.pos, error.message));
        }

        let walk_options = WalkOptions {
            include_paths: self.options.include_paths.clone(),
            suppress_warnings: self.options.suppress_warnings,
        };
        let mut walker = Walker::new(program, source_file, walk_options);
        let output = walker.walk(&script)?;

        let program = walker.program;
        let success = !program.has_errors;
        Ok(CompileResult {
            output,
            diagnostics: program.all_diagnostics(),
            success,
            program,
        })
    }

    pub fn compile_file(&self, path: &str) -> Result<CompileResult, CompileError> {
        let source = std::fs::read_to_string(path)?;
        self.compile_source(&source, path)
    }
}

/// One-shot convenience with default options
pub fn compile(source: &str) -> Result<CompileResult, CompileError> {
    Compiler::new(CompileOptions::default()).compile_source(source, "<stdin>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_bash_passes_through() {
        let result = compile("echo hello\n").unwrap();
        assert!(result.success);
        assert!(result.output.contains("echo hello\n"));
    }

    #[test]
    fn test_errors_mark_failure_and_walk_continues() {
        let result = compile("echo @missing.x\necho @alsoMissing.y\necho fine\n").unwrap();
        assert!(!result.success);
        let errors: Vec<_> = result.diagnostics.iter().filter(|d| d.is_error()).collect();
        assert_eq!(errors.len(), 2);
        // The walk continued past the bad statements
        assert!(result.output.contains("echo fine"));
    }

    #[test]
    fn test_reparse_yields_equivalent_program() {
        let source = "@class Foo {\n\t@public x=1\n}\n@Foo f\n";
        let first = compile(source).unwrap();
        let second = compile(source).unwrap();
        assert_eq!(first.output, second.output);
        assert_eq!(first.program.class_count(), second.program.class_count());
        assert_eq!(first.diagnostics, second.diagnostics);
    }
}
