//! Classes, methods and parameters

use thiserror::Error;

use crate::entity::object::DataMember;
use crate::entity::types::{ClassId, MemberLookup, SourceRef, Visibility};

/// Why a method or data member could not be added to a class
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("Method redefinition: {0}")]
    DuplicateMethod(String),
    #[error("Data member redefinition: {0}")]
    DuplicateMember(String),
    #[error("{0} is already the name of a method or data member in this class")]
    NameClash(String),
    #[error("toPrimitive method must be public")]
    NonPublicToPrimitive,
    #[error("Constructor redefinition")]
    ConstructorRedefinition,
    #[error("Destructor redefinition")]
    DestructorRedefinition,
    #[error("Class is finalized; no members can be added")]
    ClassFinalized,
}

/// A method parameter. Non-primitive parameters must be pointers.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub type_id: ClassId,
    pub definition: Option<SourceRef>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, type_id: ClassId) -> Self {
        Self { name: name.into(), type_id, definition: None }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub name: String,
    pub parameters: Vec<Parameter>,
    /// The compiled body text, accumulated during the walk
    pub body: String,
    pub visibility: Visibility,
    pub is_virtual: bool,
    pub is_overridable: bool,
    pub inherited: bool,
    /// Default implementation synthesized by the compiler; replaced in place
    /// when the user supplies their own
    pub synthesized: bool,
    /// Name of the class that most recently overrode this virtual method
    pub last_override: Option<String>,
    /// Weak backlink to the method this one overrides, as (class, method)
    /// names; used for cross-file rename propagation
    pub overridden_method: Option<(String, String)>,
    pub containing_class: Option<ClassId>,
    pub definition: Option<SourceRef>,
    pub references: Vec<SourceRef>,
}

impl Method {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            body: String::new(),
            visibility: Visibility::Private,
            is_virtual: false,
            is_overridable: false,
            inherited: false,
            synthesized: false,
            last_override: None,
            overridden_method: None,
            containing_class: None,
            definition: None,
            references: Vec::new(),
        }
    }

    pub fn set_virtual(&mut self, is_virtual: bool) {
        self.is_virtual = is_virtual;
        // Virtual methods are overridable by default
        self.is_overridable = is_virtual;
    }

    pub fn add_parameter(&mut self, parameter: Parameter) -> Result<(), DefinitionError> {
        if self.parameters.iter().any(|p| p.name == parameter.name) {
            return Err(DefinitionError::NameClash(parameter.name));
        }
        self.parameters.push(parameter);
        Ok(())
    }

    pub fn add_reference(&mut self, reference: SourceRef) {
        self.references.push(reference);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Class {
    pub id: ClassId,
    pub name: String,
    pub methods: Vec<Method>,
    pub datamembers: Vec<DataMember>,
    /// Inheritance chain, nearest parent first
    pub parents: Vec<ClassId>,
    pub has_constructor: bool,
    pub has_destructor: bool,
    pub has_custom_to_primitive: bool,
    pub finalized: bool,
    pub definition: Option<SourceRef>,
    pub references: Vec<SourceRef>,
}

impl Class {
    pub fn new(name: impl Into<String>, id: ClassId) -> Self {
        Self {
            id,
            name: name.into(),
            methods: Vec::new(),
            datamembers: Vec::new(),
            parents: Vec::new(),
            has_constructor: false,
            has_destructor: false,
            has_custom_to_primitive: false,
            finalized: false,
            definition: None,
            references: Vec::new(),
        }
    }

    /// The direct parent class, if any
    pub fn parent(&self) -> Option<ClassId> {
        self.parents.first().copied()
    }

    pub fn method_index(&self, name: &str) -> Option<usize> {
        self.methods.iter().position(|m| m.name == name)
    }

    pub fn datamember_index(&self, name: &str) -> Option<usize> {
        self.datamembers.iter().position(|d| d.name == name)
    }

    /// Visibility-aware method lookup. Public members resolve from anywhere;
    /// protected and private only when the accessing context is this class
    /// itself; inaccessible members always fail distinctly.
    pub fn get_method(&self, name: &str, context: Option<ClassId>) -> MemberLookup<usize> {
        match self.method_index(name) {
            Some(index) => self.check_access(self.methods[index].visibility, context, index),
            None => MemberLookup::NotFound,
        }
    }

    pub fn get_datamember(&self, name: &str, context: Option<ClassId>) -> MemberLookup<usize> {
        match self.datamember_index(name) {
            Some(index) => self.check_access(self.datamembers[index].visibility, context, index),
            None => MemberLookup::NotFound,
        }
    }

    fn check_access(
        &self,
        visibility: Visibility,
        context: Option<ClassId>,
        index: usize,
    ) -> MemberLookup<usize> {
        match visibility {
            Visibility::Public => MemberLookup::Found(index),
            Visibility::Protected | Visibility::Private => {
                if context == Some(self.id) {
                    MemberLookup::Found(index)
                } else {
                    MemberLookup::Inaccessible
                }
            }
            Visibility::Inaccessible => MemberLookup::Inaccessible,
        }
    }

    /// Add a method, applying the overriding rule: a user method may replace
    /// an inherited virtual method (becoming its most-derived override) or a
    /// compiler-synthesized default; any other name collision is a
    /// redefinition error.
    pub fn add_method(&mut self, mut method: Method) -> Result<(), DefinitionError> {
        if self.finalized {
            return Err(DefinitionError::ClassFinalized);
        }

        if !method.inherited {
            if method.name == "toPrimitive" {
                if method.visibility != Visibility::Public {
                    return Err(DefinitionError::NonPublicToPrimitive);
                }
                method.set_virtual(true);
                self.has_custom_to_primitive = !method.synthesized;
            }
            if method.name == "__destructor" {
                method.set_virtual(true);
                self.has_destructor = !method.synthesized;
            }
            if method.name == "__constructor" {
                self.has_constructor = true;
            }
            if method.is_virtual && method.last_override.is_none() {
                method.last_override = Some(self.name.clone());
            }
        }

        if let Some(index) = self.method_index(&method.name) {
            let existing = &self.methods[index];

            let replaces_synthesized = existing.synthesized && !method.inherited;
            let overrides_virtual = existing.inherited
                && existing.is_virtual
                && existing.last_override.as_deref() != Some(self.name.as_str())
                && !method.inherited;

            if replaces_synthesized || overrides_virtual {
                if existing.is_virtual {
                    method.set_virtual(true);
                }
                method.last_override = Some(self.name.clone());
                method.containing_class = Some(self.id);
                if overrides_virtual {
                    method.overridden_method = Some((
                        existing
                            .last_override
                            .clone()
                            .unwrap_or_else(|| self.name.clone()),
                        existing.name.clone(),
                    ));
                    // The overridden method is "referenced" by its override,
                    // so renames propagate across the hierarchy
                    if let Some(def) = method.definition.clone() {
                        self.methods[index].add_reference(def);
                    }
                }
                self.methods[index] = method;
                return Ok(());
            }

            return Err(match method.name.as_str() {
                "__constructor" => DefinitionError::ConstructorRedefinition,
                "__destructor" if !method.inherited && self.has_destructor => {
                    DefinitionError::DestructorRedefinition
                }
                _ => DefinitionError::DuplicateMethod(method.name.clone()),
            });
        }

        if self.datamember_index(&method.name).is_some() {
            return Err(DefinitionError::NameClash(method.name));
        }

        if !method.inherited {
            method.containing_class = Some(self.id);
        }
        self.methods.push(method);
        Ok(())
    }

    pub fn add_datamember(&mut self, datamember: DataMember) -> Result<(), DefinitionError> {
        if self.finalized {
            return Err(DefinitionError::ClassFinalized);
        }
        if self.datamember_index(&datamember.name).is_some() {
            return Err(DefinitionError::DuplicateMember(datamember.name));
        }
        if self.method_index(&datamember.name).is_some() {
            return Err(DefinitionError::NameClash(datamember.name));
        }
        self.datamembers.push(datamember);
        Ok(())
    }

    /// Synthesize the default `toPrimitive` (echoes "<Name> Instance") if no
    /// user-supplied one exists. Idempotent.
    pub fn add_default_to_primitive(&mut self) {
        if self.has_custom_to_primitive || self.method_index("toPrimitive").is_some() {
            return;
        }
        let mut method = Method::new("toPrimitive");
        method.visibility = Visibility::Public;
        method.synthesized = true;
        method.body = format!("\techo {} Instance\n", self.name);
        let _ = self.add_method(method);
    }

    /// Synthesize the default no-op `__destructor` if no user-supplied one
    /// exists. Idempotent.
    pub fn add_default_destructor(&mut self) {
        if self.has_destructor || self.method_index("__destructor").is_some() {
            return;
        }
        let mut method = Method::new("__destructor");
        method.visibility = Visibility::Public;
        method.synthesized = true;
        let _ = self.add_method(method);
    }

    pub fn add_reference(&mut self, reference: SourceRef) {
        self.references.push(reference);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn public_method(name: &str) -> Method {
        let mut m = Method::new(name);
        m.visibility = Visibility::Public;
        m
    }

    #[test]
    fn test_duplicate_method_rejected() {
        let mut class = Class::new("Foo", 1);
        class.add_method(public_method("bar")).unwrap();
        assert_eq!(
            class.add_method(public_method("bar")),
            Err(DefinitionError::DuplicateMethod("bar".into()))
        );
    }

    #[test]
    fn test_method_member_name_clash() {
        let mut class = Class::new("Foo", 1);
        class.add_method(public_method("x")).unwrap();
        let member = DataMember::new("x", 0, Visibility::Public);
        assert_eq!(
            class.add_datamember(member),
            Err(DefinitionError::NameClash("x".into()))
        );
    }

    #[test]
    fn test_user_to_primitive_replaces_synthesized_once() {
        let mut class = Class::new("Foo", 1);
        class.add_default_to_primitive();
        assert!(class.methods[0].synthesized);

        let mut custom = public_method("toPrimitive");
        custom.body = "\techo custom\n".to_string();
        class.add_method(custom).unwrap();

        let hits: Vec<_> = class.methods.iter().filter(|m| m.name == "toPrimitive").collect();
        assert_eq!(hits.len(), 1);
        assert!(!hits[0].synthesized);
        assert!(hits[0].is_virtual);
        assert_eq!(hits[0].last_override.as_deref(), Some("Foo"));

        // A second user definition is now a redefinition
        assert!(class.add_method(public_method("toPrimitive")).is_err());
    }

    #[test]
    fn test_non_public_to_primitive_rejected() {
        let mut class = Class::new("Foo", 1);
        let mut m = Method::new("toPrimitive");
        m.visibility = Visibility::Private;
        assert_eq!(class.add_method(m), Err(DefinitionError::NonPublicToPrimitive));
    }

    #[test]
    fn test_inherited_virtual_override() {
        let mut class = Class::new("B", 2);
        let mut greet = public_method("greet");
        greet.set_virtual(true);
        greet.inherited = true;
        greet.last_override = Some("A".to_string());
        class.add_method(greet).unwrap();

        let mut own = public_method("greet");
        own.definition = Some(SourceRef::new("b.bpp", 3, 0));
        class.add_method(own).unwrap();

        let m = &class.methods[class.method_index("greet").unwrap()];
        assert!(m.is_virtual);
        assert_eq!(m.last_override.as_deref(), Some("B"));
        assert_eq!(m.overridden_method.as_ref().unwrap().1, "greet");
    }

    #[test]
    fn test_finalized_class_rejects_additions() {
        let mut class = Class::new("Foo", 1);
        class.finalized = true;
        assert_eq!(
            class.add_method(public_method("bar")),
            Err(DefinitionError::ClassFinalized)
        );
    }

    #[test]
    fn test_visibility_lookup() {
        let mut class = Class::new("Foo", 1);
        let mut m = Method::new("secret");
        m.visibility = Visibility::Private;
        class.add_method(m).unwrap();
        assert_eq!(class.get_method("secret", Some(1)), MemberLookup::Found(0));
        assert_eq!(class.get_method("secret", Some(2)), MemberLookup::Inaccessible);
        assert_eq!(class.get_method("secret", None), MemberLookup::Inaccessible);
        assert_eq!(class.get_method("missing", Some(1)), MemberLookup::NotFound);
    }
}
