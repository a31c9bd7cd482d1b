//! The Program: root of the entity graph
//!
//! The Program exclusively owns its classes. The synthetic `primitive`
//! class always exists at id 0 and serves as the type of shell-string
//! values. Global counters for generated names are the only shared mutable
//! state in code generation and are collapsed into one struct here.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use regex_lite::Regex;

use crate::ast::types::{Position, Span};
use crate::diagnostics::Diagnostic;
use crate::entity::class::Class;
use crate::entity::types::{ClassId, SourceRef};

/// A target Bash version, ordered by (major, minor)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BashVersion {
    pub major: u8,
    pub minor: u8,
}

impl BashVersion {
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// The first version with native supershell support (`${ cmd; }`)
    pub const NATIVE_SUPERSHELL: BashVersion = BashVersion::new(5, 3);
}

impl Default for BashVersion {
    fn default() -> Self {
        Self::new(5, 2)
    }
}

impl fmt::Display for BashVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for BashVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let re = Regex::new(r"^([0-9]+)\.([0-9]+)$").unwrap();
        let caps = re
            .captures(s.trim())
            .ok_or_else(|| format!("Invalid Bash version: '{s}' (expected MAJOR.MINOR)"))?;
        let major = caps[1].parse::<u8>().map_err(|_| format!("Invalid major version in '{s}'"))?;
        let minor = caps[2].parse::<u8>().map_err(|_| format!("Invalid minor version in '{s}'"))?;
        Ok(Self::new(major, minor))
    }
}

/// Global monotonic counters for generated names
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub supershell: u64,
    pub assignment: u64,
    pub function: u64,
    pub dynamic_cast: u64,
    pub type_of: u64,
    pub object: u64,
}

/// An entry in the per-file entity map, for IDE-style queries
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMark {
    pub span: Span,
    pub description: String,
}

#[derive(Debug)]
pub struct Program {
    classes: Vec<Class>,
    class_ids: IndexMap<String, ClassId>,
    pub counters: Counters,
    pub target_bash: BashVersion,
    pub main_source_file: String,
    pub has_errors: bool,
    diagnostics: IndexMap<String, Vec<Diagnostic>>,
    /// Reference positions for objects, keyed by address (objects live in
    /// the emitter's scope frames, not in the Program)
    object_references: IndexMap<String, Vec<SourceRef>>,
    /// Innermost-entity maps per file
    entity_marks: IndexMap<String, Vec<EntityMark>>,
    /// Runtime-library templates queued for emission at the next top-level
    /// write (each emitted at most once, the first time it is needed)
    pending_runtime: Vec<&'static str>,
    emitted_repeat: bool,
}

impl Program {
    /// The synthetic class of shell-string values
    pub const PRIMITIVE: ClassId = 0;

    pub fn new() -> Self {
        let mut program = Self {
            classes: Vec::new(),
            class_ids: IndexMap::new(),
            counters: Counters::default(),
            target_bash: BashVersion::default(),
            main_source_file: String::new(),
            has_errors: false,
            diagnostics: IndexMap::new(),
            object_references: IndexMap::new(),
            entity_marks: IndexMap::new(),
            pending_runtime: Vec::new(),
            emitted_repeat: false,
        };
        let primitive = Class::new("primitive", Self::PRIMITIVE);
        program.class_ids.insert("primitive".to_string(), Self::PRIMITIVE);
        program.classes.push(primitive);
        program
    }

    // -------------------------------------------------------------------------
    // Classes
    // -------------------------------------------------------------------------

    pub fn class(&self, id: ClassId) -> &Class {
        &self.classes[id]
    }

    pub fn class_mut(&mut self, id: ClassId) -> &mut Class {
        &mut self.classes[id]
    }

    pub fn lookup_class(&self, name: &str) -> Option<ClassId> {
        self.class_ids.get(name).copied()
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.class_ids.keys().map(String::as_str)
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Register a new class so forward references inside its own body
    /// resolve. Fails if the name is taken.
    pub fn prepare_class(&mut self, name: &str) -> Option<ClassId> {
        if self.class_ids.contains_key(name) {
            return None;
        }
        let id = self.classes.len();
        self.classes.push(Class::new(name, id));
        self.class_ids.insert(name.to_string(), id);
        Some(id)
    }

    /// Copy the parent's methods and data members into the child and extend
    /// its parent chain. Inherited private members are downgraded to
    /// inaccessible; virtual methods keep their `last_override`.
    pub fn inherit(&mut self, child: ClassId, parent: ClassId) {
        use crate::entity::types::Visibility;

        let parent_methods = self.classes[parent].methods.clone();
        let parent_members = self.classes[parent].datamembers.clone();
        let parent_chain = self.classes[parent].parents.clone();
        let parent_has_constructor = self.classes[parent].has_constructor;

        let child_class = &mut self.classes[child];
        for mut method in parent_methods {
            if method.synthesized {
                // Compiler-synthesized defaults (__delete, __new, default
                // toPrimitive/__destructor) are regenerated per class at
                // finalization
                continue;
            }
            if method.visibility == Visibility::Private {
                method.visibility = Visibility::Inaccessible;
            }
            method.inherited = true;
            let _ = child_class.add_method(method);
        }
        for mut member in parent_members {
            if member.visibility == Visibility::Private {
                member.visibility = Visibility::Inaccessible;
            }
            let _ = child_class.add_datamember(member);
        }

        child_class.has_constructor |= parent_has_constructor;
        child_class.parents.push(parent);
        child_class.parents.extend(parent_chain);
    }

    // -------------------------------------------------------------------------
    // Counters and lazy runtime templates
    // -------------------------------------------------------------------------

    pub fn bump_supershell_counter(&mut self) {
        self.counters.supershell += 1;
        if self.counters.supershell == 1 && self.target_bash < BashVersion::NATIVE_SUPERSHELL {
            self.pending_runtime.push(crate::codegen::templates::SUPERSHELL_FUNCTION);
        }
    }

    pub fn bump_assignment_counter(&mut self) {
        self.counters.assignment += 1;
    }

    pub fn bump_function_counter(&mut self) {
        self.counters.function += 1;
        if self.counters.function == 1 {
            self.pending_runtime.push(crate::codegen::templates::VTABLE_LOOKUP);
        }
    }

    pub fn bump_dynamic_cast_counter(&mut self) {
        self.counters.dynamic_cast += 1;
        if self.counters.dynamic_cast == 1 {
            self.pending_runtime.push(crate::codegen::templates::DYNAMIC_CAST);
        }
    }

    pub fn bump_typeof_counter(&mut self) {
        self.counters.type_of += 1;
        if self.counters.type_of == 1 {
            self.pending_runtime.push(crate::codegen::templates::TYPEOF_FUNCTION);
        }
    }

    pub fn bump_object_counter(&mut self) {
        self.counters.object += 1;
    }

    /// Queue the `bpp____repeat` helper (used by `&&`/`||` gating)
    pub fn require_repeat_helper(&mut self) {
        if !self.emitted_repeat {
            self.pending_runtime.push(crate::codegen::templates::REPEAT_FUNCTION);
            self.emitted_repeat = true;
        }
    }

    /// Drain the runtime templates queued since the last top-level write
    pub fn take_pending_runtime(&mut self) -> Vec<&'static str> {
        std::mem::take(&mut self.pending_runtime)
    }

    // -------------------------------------------------------------------------
    // Diagnostics
    // -------------------------------------------------------------------------

    pub fn add_diagnostic(&mut self, diagnostic: Diagnostic) {
        if diagnostic.is_error() {
            self.has_errors = true;
        }
        self.diagnostics
            .entry(diagnostic.file.clone())
            .or_default()
            .push(diagnostic);
    }

    pub fn diagnostics_for(&self, file: &str) -> &[Diagnostic] {
        self.diagnostics.get(file).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn all_diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.values().flatten().cloned().collect()
    }

    pub fn source_files(&self) -> impl Iterator<Item = &str> {
        self.diagnostics.keys().map(String::as_str)
    }

    // -------------------------------------------------------------------------
    // Find-references and entity maps
    // -------------------------------------------------------------------------

    pub fn record_object_reference(&mut self, address: &str, reference: SourceRef) {
        self.object_references
            .entry(address.to_string())
            .or_default()
            .push(reference);
    }

    pub fn object_references(&self, address: &str) -> &[SourceRef] {
        self.object_references.get(address).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn mark_entity(&mut self, file: &str, span: Span, description: impl Into<String>) {
        self.entity_marks
            .entry(file.to_string())
            .or_default()
            .push(EntityMark { span, description: description.into() });
    }

    /// The innermost marked entity enclosing a position, if any
    pub fn active_entity(&self, file: &str, pos: Position) -> Option<&EntityMark> {
        let marks = self.entity_marks.get(file)?;
        marks
            .iter()
            .filter(|m| m.span.contains(pos))
            .min_by_key(|m| {
                (
                    m.span.end.line - m.span.start.line,
                    m.span.end.column.wrapping_sub(m.span.start.column),
                )
            })
    }

    pub fn clear_diagnostics(&mut self, file: &str) {
        self.diagnostics.shift_remove(file);
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_class_exists() {
        let program = Program::new();
        assert_eq!(program.lookup_class("primitive"), Some(Program::PRIMITIVE));
        assert_eq!(program.class(Program::PRIMITIVE).name, "primitive");
    }

    #[test]
    fn test_prepare_class_rejects_duplicates() {
        let mut program = Program::new();
        let id = program.prepare_class("Foo").unwrap();
        assert_eq!(program.lookup_class("Foo"), Some(id));
        assert!(program.prepare_class("Foo").is_none());
    }

    #[test]
    fn test_bash_version_parse_and_order() {
        let v: BashVersion = "5.3".parse().unwrap();
        assert_eq!(v, BashVersion::new(5, 3));
        assert!(BashVersion::new(5, 2) < BashVersion::NATIVE_SUPERSHELL);
        assert!(BashVersion::new(6, 0) >= BashVersion::NATIVE_SUPERSHELL);
        assert!("abc".parse::<BashVersion>().is_err());
    }

    #[test]
    fn test_error_diagnostic_sets_flag() {
        use crate::ast::types::Position;
        let mut program = Program::new();
        assert!(!program.has_errors);
        program.add_diagnostic(Diagnostic::warning_at("f.bpp", Position::new(0, 0), "w"));
        assert!(!program.has_errors);
        program.add_diagnostic(Diagnostic::error_at("f.bpp", Position::new(0, 0), "e"));
        assert!(program.has_errors);
        assert_eq!(program.diagnostics_for("f.bpp").len(), 2);
    }
}
