//! Symbol model for the Bash++ compiler
//!
//! This module holds the entity graph: the Program owns its classes, a
//! Class owns its methods and data members, and objects live in the scope
//! frames of the emitter. Cross-links (containing class, parent classes,
//! overridden methods) are indices into the Program's class table so that
//! ownership stays a DAG.

pub mod class;
pub mod code_buffer;
pub mod object;
pub mod program;
pub mod scope;
pub mod types;

pub use class::{Class, DefinitionError, Method, Parameter};
pub use code_buffer::{BufferMode, CodeBuffer, CodeSegment};
pub use object::{DataMember, Object, NULLPTR};
pub use program::{BashVersion, Counters, Program};
pub use scope::{FrameKind, ScopeFrame, Scopes};
pub use types::{ClassId, MemberLookup, ReferenceKind, SourceRef, Visibility};
