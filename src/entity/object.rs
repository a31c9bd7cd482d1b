//! Objects and data members

use serde::Serialize;

use crate::entity::types::{ClassId, SourceRef, Visibility};

/// The null-pointer sentinel written into compiled code
pub const NULLPTR: &str = "0";

/// A named instance of a class, or a pointer to one.
///
/// The address is the shell identifier under which the object's storage
/// lives at runtime. For a pointer, the variable at `address` holds the
/// address of the pointee.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Object {
    pub name: String,
    pub class_id: ClassId,
    pub is_pointer: bool,
    pub address: String,
    /// Initializer for pointers (defaults to the null sentinel)
    pub assignment_value: String,
    pub pre_access_code: String,
    pub post_access_code: String,
    /// Address of the object this one is copy-constructed from
    pub copy_from: Option<String>,
    pub definition: Option<SourceRef>,
}

impl Object {
    pub fn new(name: impl Into<String>, class_id: ClassId) -> Self {
        Self {
            name: name.into(),
            class_id,
            is_pointer: false,
            address: String::new(),
            assignment_value: String::new(),
            pre_access_code: String::new(),
            post_access_code: String::new(),
            copy_from: None,
            definition: None,
        }
    }

    pub fn pointer(name: impl Into<String>, class_id: ClassId) -> Self {
        let mut object = Self::new(name, class_id);
        object.is_pointer = true;
        object.assignment_value = NULLPTR.to_string();
        object
    }

    pub fn is_nullptr(&self) -> bool {
        self.assignment_value == NULLPTR
    }
}

/// A data member of a class.
///
/// The pre/post access code runs when the containing object is instantiated,
/// wrapping the member's initialization (it holds the setup and teardown of
/// any supershells in the default value).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataMember {
    pub name: String,
    pub class_id: ClassId,
    pub is_pointer: bool,
    pub is_array: bool,
    pub default_value: String,
    pub visibility: Visibility,
    pub pre_access_code: String,
    pub post_access_code: String,
    pub definition: Option<SourceRef>,
    pub references: Vec<SourceRef>,
}

impl DataMember {
    pub fn new(name: impl Into<String>, class_id: ClassId, visibility: Visibility) -> Self {
        Self {
            name: name.into(),
            class_id,
            is_pointer: false,
            is_array: false,
            default_value: String::new(),
            visibility,
            pre_access_code: String::new(),
            post_access_code: String::new(),
            definition: None,
            references: Vec::new(),
        }
    }

    pub fn add_reference(&mut self, reference: SourceRef) {
        self.references.push(reference);
    }
}
