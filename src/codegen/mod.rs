//! Code generation for the Bash++ compiler
//!
//! `resolver` turns identifier chains into runtime indirection walks,
//! `generate` holds the per-construct code generators, and `templates`
//! holds the frozen runtime-library text the generators emit calls into.

pub mod generate;
pub mod resolver;
pub mod templates;

pub use generate::{
    encase_ref, finalize_class, generate_class_definition, generate_constructor_call_code,
    generate_delete_code, generate_destructor_call_code, generate_dynamic_cast_code,
    generate_method_call_code, generate_supershell_code, generate_typeof_code, inline_new,
    IndirectionLevel, SupershellCode,
};
pub use resolver::{
    explode, join, resolve_reference, resolve_reference_path, AsIdentifier, EntityReference,
    ResolveError, ResolveScope, ResolvedEntity,
};
