//! The AST walker
//!
//! Drives one pass over the tree. Each statement is emitted into its own
//! context; on error the context is discarded, the diagnostic is recorded,
//! and the walk continues so one invocation can report many errors.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::ast::types::*;
use crate::codegen::generate::{finalize_class, generate_class_definition, generate_delete_code};
use crate::codegen::templates::PROTECTED_KEYWORDS;
use crate::diagnostics::{Diagnostic, InternalError};
use crate::entity::scope::FrameKind;
use crate::entity::types::{is_valid_identifier, ClassId, SourceRef};
use crate::entity::{DataMember, Method, Object, Parameter, Program, Scopes, Visibility};
use crate::emitter::context::{EmitContext, EmitError, EmitResult, RefPurpose};

/// Settings the walker needs from the driver
#[derive(Debug, Clone)]
pub struct WalkOptions {
    pub include_paths: Vec<PathBuf>,
    pub suppress_warnings: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self { include_paths: Vec::new(), suppress_warnings: false }
    }
}

pub struct Walker {
    pub program: Program,
    pub(crate) scopes: Scopes,
    pub(crate) options: WalkOptions,
    pub(crate) source_file: String,
    pub(crate) included_files: BTreeSet<PathBuf>,
    pub(crate) include_stack: Vec<PathBuf>,
    pub(crate) in_class: Option<ClassId>,
    pub(crate) in_method: bool,
    pub(crate) method_locals: Vec<Object>,
    pub(crate) supershell_depth: usize,
    pub(crate) function_depth: usize,
    pub(crate) in_while_condition: usize,
    pub(crate) while_condition_calls: Vec<Vec<String>>,
    pub(crate) dynamic_cast_depth: usize,
}

impl Walker {
    pub fn new(mut program: Program, source_file: impl Into<String>, options: WalkOptions) -> Self {
        let source_file = source_file.into();
        program.main_source_file = source_file.clone();
        Self {
            program,
            scopes: Scopes::new(),
            options,
            source_file,
            included_files: BTreeSet::new(),
            include_stack: Vec::new(),
            in_class: None,
            in_method: false,
            method_locals: Vec::new(),
            supershell_depth: 0,
            function_depth: 0,
            in_while_condition: 0,
            while_condition_calls: Vec::new(),
            dynamic_cast_depth: 0,
        }
    }

    /// Walk a whole script and return the compiled output. The caller is
    /// responsible for checking `program.has_errors` before using it.
    pub fn walk(&mut self, script: &Script) -> Result<String, InternalError> {
        let mut root = EmitContext::code();
        root.buf.add_code("#!/usr/bin/env bash\n");
        self.emit_block(&script.statements, &mut root, true)?;
        self.emit_program_epilogue(&mut root)?;
        Ok(root.buf.take_output())
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    pub(crate) fn diag(&self, pos: Position, message: impl Into<String>) -> EmitError {
        EmitError::Diag(Diagnostic::error_at(self.source_file.clone(), pos, message))
    }

    pub(crate) fn warn(&mut self, pos: Position, message: impl Into<String>) {
        if !self.options.suppress_warnings {
            let diag = Diagnostic::warning_at(self.source_file.clone(), pos, message);
            self.program.add_diagnostic(diag);
        }
    }

    pub(crate) fn source_ref(&self, pos: Position) -> SourceRef {
        SourceRef::new(self.source_file.clone(), pos.line, pos.column)
    }

    /// Temporaries get `local` inside class bodies, method bodies and
    /// shell-function bodies
    pub(crate) fn declare_local(&self) -> bool {
        self.in_class.is_some() || self.supershell_depth > 0 || self.function_depth > 0
    }

    pub(crate) fn check_new_name(&self, ident: &Ident) -> EmitResult {
        let name = ident.name.as_str();
        if PROTECTED_KEYWORDS.contains(name) {
            return Err(self.diag(ident.pos, format!("Invalid object name: {name}")));
        }
        if name.contains("__") {
            return Err(self.diag(
                ident.pos,
                format!(
                    "Invalid object name: {name}\nBash++ identifiers cannot contain double underscores"
                ),
            ));
        }
        if !is_valid_identifier(name) {
            return Err(self.diag(ident.pos, format!("Invalid object name: {name}")));
        }
        if self.program.lookup_class(name).is_some() {
            return Err(self.diag(ident.pos, format!("Class already exists: {name}")));
        }
        if self.scopes.object_exists(name) {
            return Err(self.diag(ident.pos, format!("Object already exists: {name}")));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Block walking
    // -------------------------------------------------------------------------

    /// Emit every statement of a block into `ctx`. Each statement gets its
    /// own context so an erroring statement's output can be discarded.
    /// At the root, runtime templates queued by the statement are flushed
    /// above its output.
    pub(crate) fn emit_block(
        &mut self,
        block: &[Node],
        ctx: &mut EmitContext,
        root: bool,
    ) -> Result<(), InternalError> {
        for node in block {
            let mut statement_ctx = EmitContext::code();
            match self.emit_node(node, &mut statement_ctx) {
                Ok(()) => {
                    let output = statement_ctx.buf.take_output();
                    if root {
                        for template in self.program.take_pending_runtime() {
                            ctx.buf.add_code_to_previous_line(template);
                        }
                    }
                    if !output.is_empty() {
                        ctx.buf.add_code(&output);
                    }
                }
                Err(EmitError::Diag(diag)) => {
                    self.program.add_diagnostic(diag);
                }
                Err(EmitError::Internal(error)) => return Err(error),
            }
        }
        Ok(())
    }

    /// Emit the parts of one expression or pipeline. The first part of a
    /// statement gets `RefPurpose::Statement` so method references call
    /// directly instead of substituting.
    pub(crate) fn emit_parts(&mut self, parts: &[Node], ctx: &mut EmitContext) -> EmitResult {
        for part in parts {
            self.emit_node_inner(part, ctx, RefPurpose::Rvalue)?;
        }
        Ok(())
    }

    pub(crate) fn emit_node(&mut self, node: &Node, ctx: &mut EmitContext) -> EmitResult {
        self.emit_node_inner(node, ctx, RefPurpose::Rvalue)
    }

    pub(crate) fn emit_node_inner(
        &mut self,
        node: &Node,
        ctx: &mut EmitContext,
        purpose: RefPurpose,
    ) -> EmitResult {
        match node {
            Node::RawText(raw) | Node::SinglequoteString(raw) | Node::Comment(raw) => {
                ctx.buf.add_code(&raw.text);
                Ok(())
            }
            Node::StringLiteral(node) => self.emit_string(node, ctx),
            Node::Statement(node) => self.emit_statement(node, ctx),
            Node::Supershell(node) => self.emit_supershell(node, ctx),
            Node::ObjectReference(node) => {
                self.emit_object_reference(node, ctx, purpose).map(|_| ())
            }
            Node::PointerDereference(node) => {
                self.emit_object_reference(node, ctx, RefPurpose::Deref).map(|_| ())
            }
            Node::ObjectAddress(node) => {
                self.emit_object_reference(node, ctx, RefPurpose::Address).map(|_| ())
            }
            Node::NullptrRef(_) => {
                ctx.buf.add_code(crate::entity::NULLPTR);
                Ok(())
            }
            Node::New(node) => self.emit_new(node, ctx),
            Node::Delete(node) => self.emit_delete(node, ctx),
            Node::DynamicCast(node) => self.emit_dynamic_cast(node, ctx),
            Node::Typeof(node) => self.emit_typeof(node, ctx),
            Node::ObjectInstantiation(node) => self.emit_instantiation(node, ctx),
            Node::PointerDeclaration(node) => self.emit_pointer_declaration(node, ctx),
            Node::ObjectAssignment(node) => self.emit_assignment(node, ctx),
            Node::ClassDefinition(node) => self.emit_class_definition(node, ctx),
            Node::Include(node) => self.emit_include(node, ctx),
            Node::If(node) => self.emit_if(node, ctx),
            Node::WhileOrUntil(node) => self.emit_while(node, ctx),
            Node::For(node) => self.emit_for(node, ctx),
            Node::Case(node) => self.emit_case(node, ctx),
            Node::FunctionDefinition(node) => self.emit_function(node, ctx),
            Node::Group(node) => self.emit_group(node, ctx),
        }
    }

    /// Global objects are destructed when the program entity closes
    fn emit_program_epilogue(&mut self, root: &mut EmitContext) -> Result<(), InternalError> {
        let globals: Vec<Object> = self
            .scopes
            .current_frame()
            .objects
            .values()
            .filter(|o| !o.is_pointer)
            .cloned()
            .collect();
        for object in globals.iter().rev() {
            let delete_code =
                generate_delete_code(object.class_id, &object.address, &mut self.program)?;
            for template in self.program.take_pending_runtime() {
                root.buf.add_code_to_previous_line(template);
            }
            root.buf.add_code(&delete_code.pre_code);
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Class definitions
    // -------------------------------------------------------------------------

    pub(crate) fn emit_class_definition(
        &mut self,
        node: &ClassDefinitionNode,
        ctx: &mut EmitContext,
    ) -> EmitResult {
        if self.in_class.is_some() || self.in_method {
            return Err(self.diag(node.pos, "Class definitions cannot be nested"));
        }

        let name = node.name.name.as_str();
        if PROTECTED_KEYWORDS.contains(name) || !is_valid_identifier(name) {
            return Err(self.diag(
                node.name.pos,
                format!("Invalid class name: {name}\nBash++ identifiers cannot contain double underscores"),
            ));
        }
        if self.scopes.object_exists(name) {
            return Err(self.diag(node.name.pos, format!("Object already exists: {name}")));
        }

        let class_id = match self.program.prepare_class(name) {
            Some(id) => id,
            None => {
                return Err(self.diag(node.name.pos, format!("Class already exists: {name}")));
            }
        };
        let definition = self.source_ref(node.name.pos);
        self.program.class_mut(class_id).definition = Some(definition);

        if let Some(parent) = &node.parent {
            match self.program.lookup_class(&parent.name) {
                Some(parent_id) if parent_id != class_id => {
                    self.program.inherit(class_id, parent_id);
                    let reference = self.source_ref(parent.pos);
                    self.program.class_mut(parent_id).add_reference(reference);
                }
                Some(_) => {
                    return Err(self.diag(parent.pos, "A class cannot inherit from itself"));
                }
                None => {
                    return Err(
                        self.diag(parent.pos, format!("Class not found: {}", parent.name))
                    );
                }
            }
        }

        self.in_class = Some(class_id);
        for item in &node.items {
            let result = match item {
                ClassItem::Member(member) => self.add_class_member(class_id, member),
                ClassItem::Method(method) => self.add_class_method(class_id, method, false),
                ClassItem::Constructor(method) => self.add_class_method(class_id, method, true),
                ClassItem::Destructor(method) => self.add_class_method(class_id, method, true),
            };
            if let Err(error) = result {
                match error {
                    EmitError::Diag(diag) => self.program.add_diagnostic(diag),
                    internal => {
                        self.in_class = None;
                        return Err(internal);
                    }
                }
            }
        }
        self.in_class = None;

        finalize_class(&mut self.program, class_id)?;
        ctx.buf.add_code(&generate_class_definition(&self.program, class_id));

        self.program.mark_entity(
            &self.source_file.clone(),
            Span::point(node.pos),
            format!("class {name}"),
        );
        Ok(())
    }

    fn member_visibility(visibility: VisibilityKeyword) -> Visibility {
        match visibility {
            VisibilityKeyword::Public => Visibility::Public,
            VisibilityKeyword::Protected => Visibility::Protected,
            VisibilityKeyword::Private => Visibility::Private,
        }
    }

    fn add_class_member(&mut self, class_id: ClassId, decl: &MemberDeclNode) -> EmitResult {
        let name = decl.name.name.as_str();
        if name.contains("__") || !is_valid_identifier(name) {
            return Err(self.diag(
                decl.name.pos,
                format!(
                    "Invalid member name: {name}\nBash++ identifiers cannot contain double underscores"
                ),
            ));
        }
        if PROTECTED_KEYWORDS.contains(name) {
            return Err(self.diag(decl.name.pos, format!("Invalid member name: {name}")));
        }

        let visibility = Self::member_visibility(decl.visibility);
        let mut member = DataMember::new(name, Program::PRIMITIVE, visibility);
        member.definition = Some(self.source_ref(decl.name.pos));

        match &decl.kind {
            MemberKind::Primitive { default } => {
                if let Some(value) = default {
                    let mut value_ctx = EmitContext::string();
                    let outcome = self.emit_value(value, &mut value_ctx, false)?;
                    let segment = value_ctx.finish();
                    member.default_value = segment.code.trim().to_string();
                    member.pre_access_code = segment.pre_code;
                    member.post_access_code = segment.post_code;
                    member.is_array = outcome.is_array;
                }
            }
            MemberKind::Object { class_name } => {
                let type_id = self
                    .program
                    .lookup_class(&class_name.name)
                    .ok_or_else(|| {
                        self.diag(class_name.pos, format!("Class not found: {}", class_name.name))
                    })?;
                if type_id == class_id {
                    return Err(self.diag(
                        class_name.pos,
                        "A class cannot contain a non-pointer member of its own type",
                    ));
                }
                member.class_id = type_id;
            }
            MemberKind::Pointer { class_name, default } => {
                // A pointer to the class being defined is fine
                let type_id = match self.program.lookup_class(&class_name.name) {
                    Some(id) => id,
                    None => {
                        return Err(self.diag(
                            class_name.pos,
                            format!("Class not found: {}", class_name.name),
                        ));
                    }
                };
                member.class_id = type_id;
                member.is_pointer = true;
                member.default_value = crate::entity::NULLPTR.to_string();
                if let Some(value) = default {
                    let mut value_ctx = EmitContext::string();
                    self.emit_value(value, &mut value_ctx, false)?;
                    let segment = value_ctx.finish();
                    member.default_value = segment.code.trim().to_string();
                    member.pre_access_code = segment.pre_code;
                    member.post_access_code = segment.post_code;
                }
            }
        }

        self.program
            .class_mut(class_id)
            .add_datamember(member)
            .map_err(|e| self.diag(decl.name.pos, e.to_string()))
    }

    /// Register a method (or constructor/destructor) and walk its body.
    /// The method is registered before the body walk so recursive
    /// references resolve.
    fn add_class_method(
        &mut self,
        class_id: ClassId,
        def: &MethodDefNode,
        special: bool,
    ) -> EmitResult {
        let name = def.name.name.as_str();
        if !special && (name.contains("__") && name != "toPrimitive") {
            return Err(self.diag(
                def.name.pos,
                format!(
                    "Invalid method name: {name}\nBash++ identifiers cannot contain double underscores"
                ),
            ));
        }
        if !special && name != "toPrimitive" && !is_valid_identifier(name) {
            return Err(self.diag(def.name.pos, format!("Invalid method name: {name}")));
        }

        let mut method = Method::new(name);
        method.visibility = Self::member_visibility(def.visibility);
        if def.is_virtual {
            method.set_virtual(true);
        }
        method.definition = Some(self.source_ref(def.name.pos));

        // Parameters; non-primitive parameters must be pointers
        let mut parameter_objects: Vec<Object> = Vec::new();
        for param in &def.params {
            let type_id = match &param.type_name {
                None => Program::PRIMITIVE,
                Some(type_name) => {
                    let id = self.program.lookup_class(&type_name.name).ok_or_else(|| {
                        self.diag(type_name.pos, format!("Class not found: {}", type_name.name))
                    })?;
                    if !param.is_pointer {
                        return Err(self.diag(
                            param.name.pos,
                            "Non-primitive method parameters must be pointers",
                        ));
                    }
                    id
                }
            };
            let mut parameter = Parameter::new(param.name.name.clone(), type_id);
            parameter.definition = Some(self.source_ref(param.name.pos));
            method
                .add_parameter(parameter)
                .map_err(|_| {
                    self.diag(param.name.pos, format!("Duplicate parameter: {}", param.name.name))
                })?;
            if type_id != Program::PRIMITIVE {
                let mut object = Object::pointer(param.name.name.clone(), type_id);
                object.address = param.name.name.clone();
                parameter_objects.push(object);
            }
        }

        if let Err(error) = self.program.class_mut(class_id).add_method(method) {
            return Err(self.diag(def.name.pos, error.to_string()));
        }

        // Walk the body
        self.scopes.push(FrameKind::Method);
        for object in parameter_objects {
            let _ = self.scopes.add_object(object);
        }
        let saved_locals = std::mem::take(&mut self.method_locals);
        self.in_method = true;

        let mut body_ctx = EmitContext::code();
        let walk_result = self.emit_block(&def.body, &mut body_ctx, false);

        // Destruct method-local objects on the way out, on every exit path
        let locals = std::mem::replace(&mut self.method_locals, saved_locals);
        self.in_method = false;
        self.scopes.pop();

        walk_result.map_err(EmitError::Internal)?;

        for local in locals.iter().rev() {
            if !local.is_pointer {
                let delete_code =
                    generate_delete_code(local.class_id, &local.address, &mut self.program)
                        .map_err(EmitError::Internal)?;
                body_ctx.buf.add_code(&delete_code.pre_code);
            }
        }

        let body = body_ctx.buf.take_output();
        let class = self.program.class_mut(class_id);
        if let Some(index) = class.method_index(name) {
            class.methods[index].body = body;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Includes
    // -------------------------------------------------------------------------

    pub(crate) fn emit_include(&mut self, node: &IncludeNode, ctx: &mut EmitContext) -> EmitResult {
        if self.in_class.is_some()
            || self.in_method
            || self.supershell_depth > 0
            || self.function_depth > 0
        {
            return Err(self.diag(
                node.pos,
                "Include statements can only be used at the top level of a program",
            ));
        }

        let resolved = self.resolve_include_path(node)?;
        let canonical = resolved
            .canonicalize()
            .map_err(|_| self.diag(node.pos, format!("File not found: {}", resolved.display())))?;

        if self.include_stack.contains(&canonical) {
            return Err(self.diag(
                node.pos,
                format!("Circular include: {}", canonical.display()),
            ));
        }
        let first_inclusion = self.included_files.insert(canonical.clone());
        if node.once && !first_inclusion {
            return Ok(());
        }

        let source = std::fs::read_to_string(&canonical).map_err(|e| {
            self.diag(node.pos, format!("Could not read {}: {e}", canonical.display()))
        })?;
        let (script, parse_errors) = crate::parser::parse(&source);
        let included_file = canonical.display().to_string();
        for error in parse_errors {
            self.program.add_diagnostic(Diagnostic::error_at(
                included_file.clone(),
                error.pos,
                error.message,
            ));
        }

        let saved_file = std::mem::replace(&mut self.source_file, included_file);
        self.include_stack.push(canonical.clone());

        let result = if node.dynamic {
            // Register the included file's symbols but discard its output;
            // at runtime a `source` directive loads the precompiled body
            let mut discard = EmitContext::code();
            let walked = self.emit_block(&script.statements, &mut discard, false);
            if walked.is_ok() {
                let target = node.as_path.clone().unwrap_or_else(|| {
                    let stem = Path::new(&node.path)
                        .file_stem()
                        .map(|s| s.to_string_lossy().to_string())
                        .unwrap_or_else(|| node.path.clone());
                    format!("{stem}.sh")
                });
                ctx.buf.add_code(&format!("source \"{target}\"\n"));
            }
            walked
        } else {
            self.emit_block(&script.statements, ctx, false)
        };

        self.include_stack.pop();
        self.source_file = saved_file;
        result.map_err(EmitError::Internal)
    }

    fn resolve_include_path(&self, node: &IncludeNode) -> EmitResult<PathBuf> {
        if node.system {
            for dir in &self.options.include_paths {
                let candidate = dir.join(&node.path);
                if candidate.exists() {
                    return Ok(candidate);
                }
            }
            return Err(self.diag(node.pos, format!("File not found: {}", node.path)));
        }

        let path = Path::new(&node.path);
        if path.is_absolute() {
            return Ok(path.to_path_buf());
        }
        // Relative to the current source file, or the CWD when compiling
        // from stdin
        let base = if self.source_file == "<stdin>" {
            std::env::current_dir().map_err(|e| {
                EmitError::Internal(InternalError::new(format!(
                    "Could not get current working directory: {e}"
                )))
            })?
        } else {
            Path::new(&self.source_file)
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        };
        Ok(base.join(path))
    }
}

/// Register an object in scope, mirroring `bpp_code_entity::add_object`:
/// name collisions anywhere in scope are rejected.
impl Walker {
    pub(crate) fn register_object(&mut self, object: Object, pos: Position) -> EmitResult {
        let local_copy = if self.in_method { Some(object.clone()) } else { None };
        self.scopes
            .add_object(object)
            .map_err(|object| self.diag(pos, format!("Object already exists: {}", object.name)))?;
        if let Some(object) = local_copy {
            self.method_locals.push(object);
        }
        Ok(())
    }
}
