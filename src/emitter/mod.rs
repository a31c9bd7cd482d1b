//! The code emitter
//!
//! Walks the AST once. Each node handler assembles output through the
//! pre-code / code / post-code discipline; compound constructs route the
//! buffers deliberately (condition hoisting, connective gating, loop
//! re-evaluation).

pub mod context;
pub mod control_flow;
pub mod references;
pub mod statements;
pub mod walker;

pub use context::{EmitContext, EmitError, EmittedReference, RefPurpose};
pub use walker::{WalkOptions, Walker};
