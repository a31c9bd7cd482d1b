//! Emission contexts and shared emitter types

use crate::codegen::resolver::ResolveError;
use crate::diagnostics::{Diagnostic, InternalError};
use crate::entity::code_buffer::{CodeBuffer, CodeSegment};
use crate::entity::types::{ClassId, ReferenceKind};

/// One emission context: a pre/code/post buffer plus the helper-function
/// definitions that an enclosing `&&`/`||` sequence may hoist.
#[derive(Debug)]
pub struct EmitContext {
    pub buf: CodeBuffer,
    /// Supershell helper definitions. In a plain code context these fold
    /// straight into the output; in a string context they accumulate so the
    /// enclosing construct can decide where they go.
    pub hoisted: String,
}

impl EmitContext {
    /// A plain code context: buffers flush on newline
    pub fn code() -> Self {
        Self { buf: CodeBuffer::code(), hoisted: String::new() }
    }

    /// A string context: buffers accumulate until the enclosing construct
    /// places them
    pub fn string() -> Self {
        Self { buf: CodeBuffer::string(), hoisted: String::new() }
    }

    pub fn is_string(&self) -> bool {
        self.buf.mode() == crate::entity::code_buffer::BufferMode::Literal
    }

    /// Add a helper-function definition at the right place for this mode
    pub fn add_definition(&mut self, definition: &str) {
        if definition.is_empty() {
            return;
        }
        if self.is_string() {
            self.hoisted.push_str(definition);
        } else {
            self.buf.add_code_to_previous_line(definition);
        }
    }

    /// Finish a string context: its three buffers as a segment, with any
    /// hoisted definitions folded in front of the pre-code
    pub fn finish(mut self) -> CodeSegment {
        let mut segment = self.buf.take_segment();
        if !self.hoisted.is_empty() {
            segment.pre_code = format!("{}{}", self.hoisted, segment.pre_code);
        }
        segment
    }
}

/// Why a reference is being emitted; decides the final expression shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefPurpose {
    /// Substitutable expression: primitives expand, methods run in a
    /// supershell, objects call `toPrimitive`
    Rvalue,
    /// First word of a statement: methods are called directly
    Statement,
    /// Assignment target; `deref` assigns through the pointer
    Lvalue { deref: bool },
    /// Rvalue of an assignment; a non-primitive lvalue turns object
    /// references into copy sources instead of `toPrimitive` substitutions
    AssignmentRvalue { lvalue_nonprimitive: bool },
    /// `&@obj`: the bare address
    Address,
    /// `@delete` target
    DeleteTarget,
    /// `*@ptr`: the pointee
    Deref,
}

/// What a reference emission produced, for enclosing constructs
#[derive(Debug, Clone)]
pub struct EmittedReference {
    pub kind: ReferenceKind,
    pub is_pointer: bool,
    /// The class of the terminal entity's type, when it has one
    pub type_class: Option<ClassId>,
    /// The expression text that was added to the context
    pub text: String,
    /// How runtime code should address the object (for delete and copy)
    pub object_ref: String,
}

/// Errors during emission. A diagnostic discards the offending statement's
/// output and the walk continues; an internal error aborts the walk.
#[derive(Debug)]
pub enum EmitError {
    Diag(Diagnostic),
    Internal(InternalError),
}

impl From<Diagnostic> for EmitError {
    fn from(diag: Diagnostic) -> Self {
        Self::Diag(diag)
    }
}

impl From<InternalError> for EmitError {
    fn from(error: InternalError) -> Self {
        Self::Internal(error)
    }
}

pub type EmitResult<T = ()> = Result<T, EmitError>;

/// The outcome of emitting an rvalue
#[derive(Debug, Default)]
pub struct ValueOutcome {
    /// Set when the rvalue was a non-primitive object (copy semantics):
    /// the address text and the object's class
    pub nonprimitive: Option<(String, ClassId)>,
    pub is_array: bool,
}

/// A resolve error rendered as a diagnostic at the best-known position
pub fn resolve_diag(
    file: &str,
    error: ResolveError,
    fallback: crate::ast::types::Position,
) -> Diagnostic {
    let pos = error.position().unwrap_or(fallback);
    Diagnostic::error_at(file, pos, error.to_string())
}
