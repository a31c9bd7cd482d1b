//! The scope stack
//!
//! Frames are pushed and popped as the emitter enters and leaves code
//! entities. Objects are owned by the frame that declared them; lookup
//! searches the current frame then walks outward.

use indexmap::IndexMap;

use crate::entity::object::Object;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Program,
    Method,
    Supershell,
    Function,
    Block,
}

#[derive(Debug)]
pub struct ScopeFrame {
    pub kind: FrameKind,
    pub objects: IndexMap<String, Object>,
}

impl ScopeFrame {
    pub fn new(kind: FrameKind) -> Self {
        Self { kind, objects: IndexMap::new() }
    }
}

#[derive(Debug)]
pub struct Scopes {
    frames: Vec<ScopeFrame>,
}

impl Scopes {
    pub fn new() -> Self {
        Self { frames: vec![ScopeFrame::new(FrameKind::Program)] }
    }

    pub fn push(&mut self, kind: FrameKind) {
        self.frames.push(ScopeFrame::new(kind));
    }

    pub fn pop(&mut self) -> Option<ScopeFrame> {
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Search the current scope then walk outward
    pub fn lookup_object(&self, name: &str) -> Option<&Object> {
        self.frames.iter().rev().find_map(|f| f.objects.get(name))
    }

    pub fn object_exists(&self, name: &str) -> bool {
        self.lookup_object(name).is_some()
    }

    /// Register an object in the innermost frame. Fails when the name is
    /// visible anywhere in scope.
    pub fn add_object(&mut self, object: Object) -> Result<(), Object> {
        if self.object_exists(&object.name) {
            return Err(object);
        }
        self.frames
            .last_mut()
            .expect("scope stack is never empty")
            .objects
            .insert(object.name.clone(), object);
        Ok(())
    }

    pub fn current_frame(&self) -> &ScopeFrame {
        self.frames.last().expect("scope stack is never empty")
    }

    pub fn current_frame_mut(&mut self) -> &mut ScopeFrame {
        self.frames.last_mut().expect("scope stack is never empty")
    }
}

impl Default for Scopes {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_walks_outward() {
        let mut scopes = Scopes::new();
        scopes.add_object(Object::new("global", 1)).unwrap();
        scopes.push(FrameKind::Method);
        scopes.add_object(Object::new("local", 1)).unwrap();
        assert!(scopes.lookup_object("global").is_some());
        assert!(scopes.lookup_object("local").is_some());
        scopes.pop();
        assert!(scopes.lookup_object("local").is_none());
    }

    #[test]
    fn test_shadowing_rejected() {
        let mut scopes = Scopes::new();
        scopes.add_object(Object::new("x", 1)).unwrap();
        scopes.push(FrameKind::Method);
        assert!(scopes.add_object(Object::new("x", 1)).is_err());
    }

    #[test]
    fn test_program_frame_never_pops() {
        let mut scopes = Scopes::new();
        assert!(scopes.pop().is_none());
        assert_eq!(scopes.depth(), 1);
    }
}
