//! Reference resolution
//!
//! Turns a chain of identifiers (`@a.b.c`) into the runtime code that walks
//! a chain of indirect variable references. At Bash runtime each `__`
//! concatenation names the next variable rather than holding its value, so
//! walking the chain needs a temporary to hold each intermediate name and
//! `${!tmp}` to dereference it. Two temporaries suffice: after the second,
//! the value itself already names the next variable.

use thiserror::Error;

use crate::ast::types::{Ident, Position};
use crate::codegen::generate::{encase_ref, IndirectionLevel};
use crate::entity::code_buffer::CodeSegment;
use crate::entity::program::Program;
use crate::entity::scope::Scopes;
use crate::entity::types::{ClassId, ReferenceKind, SourceRef};
use crate::entity::{MemberLookup, Object};

/// The resolver accepts either positioned identifiers (from the parser,
/// for diagnostics and find-references) or plain strings (for IDE-style
/// queries after analysis).
pub trait AsIdentifier {
    fn ident_text(&self) -> &str;
    fn ident_position(&self) -> Option<Position> {
        None
    }
}

impl AsIdentifier for Ident {
    fn ident_text(&self) -> &str {
        &self.name
    }

    fn ident_position(&self) -> Option<Position> {
        Some(self.pos)
    }
}

impl AsIdentifier for String {
    fn ident_text(&self) -> &str {
        self
    }
}

impl AsIdentifier for &str {
    fn ident_text(&self) -> &str {
        self
    }
}

/// The terminal entity a reference chain resolved to
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedEntity {
    /// `@this` or `@super` with no member access
    CurrentClass(ClassId),
    Object(Object),
    DataMember { class: ClassId, index: usize },
    Method { class: ClassId, index: usize },
}

impl ResolvedEntity {
    /// The class of the entity's *type* (not the class that declares it)
    pub fn type_class(&self, program: &Program) -> Option<ClassId> {
        match self {
            Self::CurrentClass(id) => Some(*id),
            Self::Object(object) => Some(object.class_id),
            Self::DataMember { class, index } => {
                Some(program.class(*class).datamembers[*index].class_id)
            }
            Self::Method { .. } => None,
        }
    }

    /// Whether the terminal entity is a pointer
    pub fn is_pointer(&self, program: &Program) -> bool {
        match self {
            Self::Object(object) => object.is_pointer,
            Self::DataMember { class, index } => {
                program.class(*class).datamembers[*index].is_pointer
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("Object not found: {name}")]
    ObjectNotFound { name: String, pos: Option<Position> },
    #[error("{class_name} has no parent class to reference with @super")]
    NoParentForSuper { class_name: String, pos: Option<Position> },
    #[error("@{keyword} outside of a class")]
    SelfOutsideClass { keyword: String, pos: Option<Position> },
    #[error("Invalid identifier: {name}\nBash++ identifiers cannot contain double underscores")]
    DoubleUnderscore { name: String, pos: Option<Position> },
    #[error("Unexpected identifier after primitive object reference")]
    UnexpectedAfterPrimitive { pos: Option<Position> },
    #[error("Unexpected identifier after method reference")]
    UnexpectedAfterMethod { pos: Option<Position> },
    #[error("{name} is inaccessible in this context")]
    Inaccessible { name: String, pos: Option<Position> },
    #[error("{owner} has no member named {name}")]
    NoSuchMember { owner: String, name: String, pos: Option<Position> },
}

impl ResolveError {
    pub fn position(&self) -> Option<Position> {
        match self {
            Self::ObjectNotFound { pos, .. }
            | Self::NoParentForSuper { pos, .. }
            | Self::SelfOutsideClass { pos, .. }
            | Self::DoubleUnderscore { pos, .. }
            | Self::UnexpectedAfterPrimitive { pos }
            | Self::UnexpectedAfterMethod { pos }
            | Self::Inaccessible { pos, .. }
            | Self::NoSuchMember { pos, .. } => *pos,
        }
    }
}

/// The context a reference is resolved in
pub struct ResolveScope<'a> {
    pub scopes: &'a Scopes,
    /// Nearest enclosing class, used both as the `@this` seed and as the
    /// visibility context
    pub current_class: Option<ClassId>,
    /// True inside class bodies, method bodies and shell functions:
    /// temporaries get a `local ` prefix
    pub declare_local: bool,
}

/// The resolved reference: the terminal entity, the code to reach it, and
/// the indirection state the emitter needs to finish the expression.
#[derive(Debug, Clone)]
pub struct EntityReference {
    pub entity: ResolvedEntity,
    pub code: CodeSegment,
    pub created_first_temporary: bool,
    pub created_second_temporary: bool,
    pub class_holding_method: Option<ClassId>,
    pub last_kind: ReferenceKind,
}

impl EntityReference {
    pub fn indirection(&self) -> IndirectionLevel {
        IndirectionLevel::from_flags(self.created_first_temporary, self.created_second_temporary)
    }
}

fn source_ref(file: &str, pos: Option<Position>) -> Option<SourceRef> {
    pos.map(|p| SourceRef::new(file, p.line, p.column))
}

/// Split a string on a delimiter, dropping empty segments. Inverse of
/// `join` on delimiter-free tokens.
pub fn explode(text: &str, delimiter: char) -> Vec<String> {
    text.split(delimiter)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join tokens with a delimiter
pub fn join(delimiter: char, tokens: &[String]) -> String {
    tokens.join(&delimiter.to_string())
}

/// Resolve a dotted reference path (`a.b.c`), as used by editor-style
/// queries where only text is available and no positions are recorded.
pub fn resolve_reference_path(
    file: &str,
    path: &str,
    scope: &ResolveScope<'_>,
    program: &mut Program,
) -> Result<EntityReference, ResolveError> {
    let identifiers = explode(path, '.');
    resolve_reference(file, &identifiers, scope, program)
}

/// Resolve an identifier chain in a context.
///
/// The first identifier may be `this` or `super`; otherwise it names an
/// object in scope. Each further identifier is looked up on the current
/// entity's class, data members first, then methods. Data-member steps emit
/// one temporary assignment (and a matching `unset` in post-code) whenever
/// an earlier step already required dereferencing.
pub fn resolve_reference<I: AsIdentifier>(
    file: &str,
    identifiers: &[I],
    scope: &ResolveScope<'_>,
    program: &mut Program,
) -> Result<EntityReference, ResolveError> {
    if identifiers.is_empty() {
        return Err(ResolveError::ObjectNotFound { name: String::new(), pos: None });
    }
    let first = &identifiers[0];
    let first_text = first.ident_text();
    let self_reference = first_text == "this" || first_text == "super";
    let super_reference = first_text == "super";

    let mut access_class = scope.current_class;
    let mut code = CodeSegment::default();
    let first_temporary;
    let entity: ResolvedEntity;

    if self_reference {
        let current = scope.current_class.ok_or_else(|| ResolveError::SelfOutsideClass {
            keyword: first_text.to_string(),
            pos: first.ident_position(),
        })?;
        let seed_class = if super_reference {
            let parent = program.class(current).parent().ok_or_else(|| {
                ResolveError::NoParentForSuper {
                    class_name: program.class(current).name.clone(),
                    pos: first.ident_position(),
                }
            })?;
            // Visibility is judged from the parent's point of view
            access_class = Some(parent);
            parent
        } else {
            current
        };
        entity = ResolvedEntity::CurrentClass(seed_class);
        code.code = "__this".to_string();
        // The ${__this} pointer counts as the first temporary
        first_temporary = true;
    } else {
        let object = scope
            .scopes
            .lookup_object(first_text)
            .cloned()
            .ok_or_else(|| ResolveError::ObjectNotFound {
                name: first_text.to_string(),
                pos: first.ident_position(),
            })?;
        if let Some(reference) = source_ref(file, first.ident_position()) {
            program.record_object_reference(&object.address, reference);
        }
        code.code = object.address.clone();
        // Dereferencing a pointer requires a temporary
        first_temporary = object.is_pointer;
        entity = ResolvedEntity::Object(object);
    }

    let mut result = EntityReference {
        entity,
        code,
        created_first_temporary: first_temporary,
        created_second_temporary: false,
        class_holding_method: scope.current_class,
        last_kind: ReferenceKind::Object,
    };

    let declare_prefix = if scope.declare_local { "local " } else { "" };

    for identifier in &identifiers[1..] {
        let text = identifier.ident_text();
        let pos = identifier.ident_position();

        match result.last_kind {
            ReferenceKind::Object => {}
            ReferenceKind::Primitive => {
                return Err(ResolveError::UnexpectedAfterPrimitive { pos });
            }
            ReferenceKind::Method => {
                return Err(ResolveError::UnexpectedAfterMethod { pos });
            }
        }

        if text.contains("__") {
            return Err(ResolveError::DoubleUnderscore { name: text.to_string(), pos });
        }

        let indirection = IndirectionLevel::from_flags(
            result.created_first_temporary,
            result.created_second_temporary,
        );

        let reference_class = result
            .entity
            .type_class(program)
            .expect("non-method reference entity always has a class");

        let datamember = program.class(reference_class).get_datamember(text, access_class);
        let method = program.class(reference_class).get_method(text, access_class);

        if datamember.is_inaccessible() || method.is_inaccessible() {
            return Err(ResolveError::Inaccessible { name: text.to_string(), pos });
        }

        if let MemberLookup::Found(index) = method {
            result.class_holding_method = Some(reference_class);
            result.last_kind = ReferenceKind::Method;
            result.entity = ResolvedEntity::Method { class: reference_class, index };
            if let Some(reference) = source_ref(file, pos) {
                program.class_mut(reference_class).methods[index].add_reference(reference);
            }
        } else if let MemberLookup::Found(index) = datamember {
            let member_class = program.class(reference_class).datamembers[index].class_id;
            result.last_kind = if member_class == Program::PRIMITIVE {
                ReferenceKind::Primitive
            } else {
                ReferenceKind::Object
            };
            result.entity = ResolvedEntity::DataMember { class: reference_class, index };

            let temporary_lvalue = format!("{}__{text}", result.code.code);
            let temporary_rvalue = format!("{}__{text}", encase_ref(&result.code.code, indirection));

            if result.created_first_temporary {
                result
                    .code
                    .pre_code
                    .push_str(&format!("{declare_prefix}{temporary_lvalue}={temporary_rvalue}\n"));
                result.code.post_code.push_str(&format!("unset {temporary_lvalue}\n"));
                result.created_second_temporary = true;
            }

            result.code.code = temporary_lvalue;
            result.created_first_temporary = true;

            if let Some(reference) = source_ref(file, pos) {
                program.class_mut(reference_class).datamembers[index].add_reference(reference);
            }
        } else {
            let owner = match &result.entity {
                ResolvedEntity::Object(object) => object.name.clone(),
                _ => program.class(reference_class).name.clone(),
            };
            return Err(ResolveError::NoSuchMember { owner, name: text.to_string(), pos });
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{DataMember, Method, Visibility};

    /// A program with Outer { Inner inner } / Inner { primitive x, greet() }
    fn fixture() -> (Program, Scopes, ClassId, ClassId) {
        let mut program = Program::new();
        let inner = program.prepare_class("Inner").unwrap();
        let mut x = DataMember::new("x", Program::PRIMITIVE, Visibility::Public);
        x.default_value = "0".to_string();
        program.class_mut(inner).add_datamember(x).unwrap();
        let mut greet = Method::new("greet");
        greet.visibility = Visibility::Public;
        program.class_mut(inner).add_method(greet).unwrap();

        let outer = program.prepare_class("Outer").unwrap();
        let member = DataMember::new("inner", inner, Visibility::Public);
        program.class_mut(outer).add_datamember(member).unwrap();

        let mut scopes = Scopes::new();
        let mut object = Object::new("o", outer);
        object.address = "bpp__0__Outer__o".to_string();
        scopes.add_object(object).unwrap();

        (program, scopes, outer, inner)
    }

    fn idents(names: &[&str]) -> Vec<Ident> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| Ident::new(*n, Position::new(0, i)))
            .collect()
    }

    #[test]
    fn test_this_alone_resolves_without_temporaries() {
        let (mut program, scopes, outer, _) = fixture();
        let scope = ResolveScope { scopes: &scopes, current_class: Some(outer), declare_local: true };
        let result =
            resolve_reference("f.bpp", &idents(&["this"]), &scope, &mut program).unwrap();
        assert_eq!(result.code.code, "__this");
        assert!(result.code.pre_code.is_empty());
        assert!(result.code.post_code.is_empty());
        assert!(result.created_first_temporary);
        assert!(!result.created_second_temporary);
    }

    #[test]
    fn test_super_at_root_fails() {
        let (mut program, scopes, outer, _) = fixture();
        let scope = ResolveScope { scopes: &scopes, current_class: Some(outer), declare_local: true };
        let err =
            resolve_reference("f.bpp", &idents(&["super"]), &scope, &mut program).unwrap_err();
        assert!(matches!(err, ResolveError::NoParentForSuper { .. }));
    }

    #[test]
    fn test_chained_this_reference_two_temporaries() {
        let (mut program, scopes, outer, _) = fixture();
        let scope = ResolveScope { scopes: &scopes, current_class: Some(outer), declare_local: true };
        let result =
            resolve_reference("f.bpp", &idents(&["this", "inner", "x"]), &scope, &mut program)
                .unwrap();
        assert_eq!(
            result.code.pre_code,
            "local __this__inner=${__this}__inner\nlocal __this__inner__x=${!__this__inner}__x\n"
        );
        assert_eq!(
            result.code.post_code,
            "unset __this__inner\nunset __this__inner__x\n"
        );
        assert_eq!(result.code.code, "__this__inner__x");
        assert!(result.created_second_temporary);
        assert_eq!(result.last_kind, ReferenceKind::Primitive);
    }

    #[test]
    fn test_temporary_count_matches_chain_length() {
        // An n-identifier @this chain creates n-1 temporaries with matching unsets
        let mut program = Program::new();
        let mut prev = program.prepare_class("C0").unwrap();
        let mut chain_ids = vec!["this".to_string()];
        for depth in 1..8 {
            let next = program.prepare_class(&format!("C{depth}")).unwrap();
            let member = DataMember::new(format!("m{depth}"), prev, Visibility::Public);
            program.class_mut(next).add_datamember(member).unwrap();
            prev = next;
        }
        for depth in (1..8).rev() {
            chain_ids.push(format!("m{depth}"));
        }
        let scopes = Scopes::new();
        let scope = ResolveScope { scopes: &scopes, current_class: Some(prev), declare_local: false };
        let result = resolve_reference("f.bpp", &chain_ids, &scope, &mut program).unwrap();
        let n = chain_ids.len();
        assert_eq!(result.code.pre_code.lines().count(), n - 1);
        assert_eq!(result.code.post_code.matches("unset ").count(), n - 1);
    }

    #[test]
    fn test_plain_object_member_no_temporary() {
        let (mut program, scopes, outer, _) = fixture();
        let scope = ResolveScope { scopes: &scopes, current_class: Some(outer), declare_local: false };
        let result =
            resolve_reference("f.bpp", &idents(&["o", "inner"]), &scope, &mut program).unwrap();
        assert!(result.code.pre_code.is_empty());
        assert_eq!(result.code.code, "bpp__0__Outer__o__inner");
        assert!(result.created_first_temporary);
        assert!(!result.created_second_temporary);
    }

    #[test]
    fn test_pointer_seed_requires_temporary() {
        let (mut program, mut scopes, outer, _) = fixture();
        let mut pointer = Object::pointer("p", outer);
        pointer.address = "bpp____ptr__Outer__p".to_string();
        scopes.add_object(pointer).unwrap();
        let scope = ResolveScope { scopes: &scopes, current_class: None, declare_local: false };
        let result =
            resolve_reference("f.bpp", &idents(&["p", "inner"]), &scope, &mut program).unwrap();
        assert_eq!(
            result.code.pre_code,
            "bpp____ptr__Outer__p__inner=${bpp____ptr__Outer__p}__inner\n"
        );
        assert!(result.created_second_temporary);
    }

    #[test]
    fn test_method_terminal_and_no_identifiers_after() {
        let (mut program, scopes, outer, inner) = fixture();
        let scope = ResolveScope { scopes: &scopes, current_class: Some(outer), declare_local: false };
        let result =
            resolve_reference("f.bpp", &idents(&["o", "inner", "greet"]), &scope, &mut program)
                .unwrap();
        assert_eq!(result.last_kind, ReferenceKind::Method);
        assert_eq!(result.class_holding_method, Some(inner));

        let err = resolve_reference(
            "f.bpp",
            &idents(&["o", "inner", "greet", "oops"]),
            &scope,
            &mut program,
        )
        .unwrap_err();
        assert!(matches!(err, ResolveError::UnexpectedAfterMethod { .. }));
    }

    #[test]
    fn test_double_underscore_rejected() {
        let (mut program, scopes, outer, _) = fixture();
        let scope = ResolveScope { scopes: &scopes, current_class: Some(outer), declare_local: false };
        let err =
            resolve_reference("f.bpp", &idents(&["o", "bad__name"]), &scope, &mut program)
                .unwrap_err();
        assert!(matches!(err, ResolveError::DoubleUnderscore { .. }));
    }

    #[test]
    fn test_inaccessible_is_distinct_from_not_found() {
        let (mut program, scopes, outer, inner) = fixture();
        let mut secret = DataMember::new("secret", Program::PRIMITIVE, Visibility::Private);
        secret.default_value = "1".to_string();
        program.class_mut(inner).add_datamember(secret).unwrap();

        let scope = ResolveScope { scopes: &scopes, current_class: Some(outer), declare_local: false };
        let err = resolve_reference(
            "f.bpp",
            &idents(&["o", "inner", "secret"]),
            &scope,
            &mut program,
        )
        .unwrap_err();
        assert!(matches!(err, ResolveError::Inaccessible { .. }));

        let err = resolve_reference(
            "f.bpp",
            &idents(&["o", "inner", "missing"]),
            &scope,
            &mut program,
        )
        .unwrap_err();
        assert!(matches!(err, ResolveError::NoSuchMember { .. }));
    }

    #[test]
    fn test_explode_join_round_trip() {
        let tokens = explode("a.b.c", '.');
        assert_eq!(tokens, vec!["a", "b", "c"]);
        assert_eq!(join('.', &tokens), "a.b.c");
        // Adjacent delimiters collapse, so only delimiter-free token lists
        // round-trip
        assert_eq!(explode("a..b", '.'), vec!["a", "b"]);
        assert!(explode("", '.').is_empty());
    }

    #[test]
    fn test_resolve_reference_path() {
        let (mut program, scopes, outer, _) = fixture();
        let scope = ResolveScope { scopes: &scopes, current_class: Some(outer), declare_local: false };
        let result = resolve_reference_path("f.bpp", "o.inner.x", &scope, &mut program).unwrap();
        assert_eq!(result.last_kind, ReferenceKind::Primitive);
    }

    #[test]
    fn test_plain_string_identifiers_resolve() {
        let (mut program, scopes, outer, _) = fixture();
        let scope = ResolveScope { scopes: &scopes, current_class: Some(outer), declare_local: false };
        let ids = vec!["o".to_string(), "inner".to_string()];
        let result = resolve_reference("f.bpp", &ids, &scope, &mut program).unwrap();
        assert_eq!(result.code.code, "bpp__0__Outer__o__inner");
        // No positions were supplied, so nothing was recorded
        assert!(program.object_references("bpp__0__Outer__o").is_empty());
    }

    #[test]
    fn test_object_references_recorded() {
        let (mut program, scopes, outer, _) = fixture();
        let scope = ResolveScope { scopes: &scopes, current_class: Some(outer), declare_local: false };
        resolve_reference("f.bpp", &idents(&["o", "inner"]), &scope, &mut program).unwrap();
        assert_eq!(program.object_references("bpp__0__Outer__o").len(), 1);
    }
}
