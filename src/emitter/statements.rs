//! Statement emission: declarations, assignments, and the `@`-operators
//! that stand alone as statements

use crate::ast::types::*;
use crate::codegen::generate::{
    generate_constructor_call_code, generate_delete_code, generate_dynamic_cast_code,
    generate_typeof_code, inline_new,
};
use crate::emitter::context::{EmitContext, EmitResult, RefPurpose, ValueOutcome};
use crate::emitter::walker::Walker;
use crate::entity::types::ReferenceKind;
use crate::entity::{Object, Program};

impl Walker {
    // -------------------------------------------------------------------------
    // Values (rvalues)
    // -------------------------------------------------------------------------

    /// Emit an rvalue into a string context. When the lvalue is
    /// non-primitive, object references become copy sources instead of
    /// `toPrimitive` substitutions.
    pub(crate) fn emit_value(
        &mut self,
        value: &ValueNode,
        ctx: &mut EmitContext,
        lvalue_nonprimitive: bool,
    ) -> EmitResult<ValueOutcome> {
        let mut outcome = ValueOutcome { nonprimitive: None, is_array: value.is_array };
        for part in &value.parts {
            match part {
                Node::ObjectReference(reference) => {
                    let emitted = self.emit_object_reference(
                        reference,
                        ctx,
                        RefPurpose::AssignmentRvalue { lvalue_nonprimitive },
                    )?;
                    if lvalue_nonprimitive && emitted.kind == ReferenceKind::Object {
                        if let Some(class) = emitted.type_class {
                            outcome.nonprimitive = Some((emitted.object_ref.clone(), class));
                        }
                    }
                }
                _ => self.emit_node(part, ctx)?,
            }
        }
        Ok(outcome)
    }

    // -------------------------------------------------------------------------
    // Statements (pipelines with connectives)
    // -------------------------------------------------------------------------

    pub(crate) fn emit_statement(
        &mut self,
        node: &StatementNode,
        ctx: &mut EmitContext,
    ) -> EmitResult {
        if node.connectives.is_empty() {
            self.emit_pipeline(&node.pipelines[0], ctx)?;
            ctx.buf.add_code("\n");
            return Ok(());
        }

        // Each component's pre-code must execute only if that component
        // executes: wrap every component in braces, re-raise the saved exit
        // status after its post-code runs.
        let mut joined = String::new();
        let mut hoisted = String::new();
        let mut uses_repeat = false;

        for (index, pipeline) in node.pipelines.iter().enumerate() {
            let mut component_ctx = EmitContext::string();
            self.emit_pipeline(pipeline, &mut component_ctx)?;
            hoisted.push_str(&component_ctx.hoisted);
            let segment = component_ctx.buf.take_segment();

            let mut component = String::from("{\n");
            if !segment.pre_code.is_empty() {
                component.push_str(&segment.pre_code);
                if !segment.pre_code.ends_with('\n') {
                    component.push('\n');
                }
            }
            component.push_str(&segment.code);
            if !segment.post_code.is_empty() {
                uses_repeat = true;
                component.push_str("\n____ret=$?\n");
                component.push_str(&segment.post_code);
                if !segment.post_code.ends_with('\n') {
                    component.push('\n');
                }
                component.push_str("bpp____repeat $____ret");
            }
            component.push_str("\n}");
            joined.push_str(&component);

            if index < node.connectives.len() {
                joined.push_str(match node.connectives[index] {
                    Connective::And => " && ",
                    Connective::Or => " || ",
                });
            }
        }

        if uses_repeat {
            self.program.require_repeat_helper();
        }
        ctx.add_definition(&hoisted);
        ctx.buf.add_code(&joined);
        ctx.buf.add_code("\n");
        Ok(())
    }

    /// The parts of one pipeline; the first part is in statement position
    fn emit_pipeline(&mut self, parts: &[Node], ctx: &mut EmitContext) -> EmitResult {
        for (index, part) in parts.iter().enumerate() {
            let purpose = if index == 0 { RefPurpose::Statement } else { RefPurpose::Rvalue };
            self.emit_node_inner(part, ctx, purpose)?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Object instantiation and pointer declarations
    // -------------------------------------------------------------------------

    pub(crate) fn emit_instantiation(
        &mut self,
        node: &ObjectInstantiationNode,
        ctx: &mut EmitContext,
    ) -> EmitResult {
        if self.in_class.is_some() && !self.in_method {
            return Err(self.diag(
                node.pos,
                "Stray object instantiation inside class body.\nDid you mean to declare a data member?\nIf so, start by declaring the data member with a visibility keyword (@public, @private, @protected)",
            ));
        }
        let class_id = self
            .program
            .lookup_class(&node.class_name.name)
            .ok_or_else(|| {
                self.diag(node.class_name.pos, format!("Class not found: {}", node.class_name.name))
            })?;
        if class_id == Program::PRIMITIVE {
            return Err(self.diag(node.class_name.pos, "Cannot instantiate a primitive"));
        }
        self.check_new_name(&node.name)?;

        let address = format!(
            "bpp__{}__{}__{}",
            self.program.counters.object, node.class_name.name, node.name.name
        );
        self.program.bump_object_counter();

        let mut object = Object::new(node.name.name.clone(), class_id);
        object.address = address.clone();
        object.definition = Some(self.source_ref(node.name.pos));

        // Copy-instantiation source, if any
        let copy_source = match &node.copy_from {
            Some(reference) => {
                let mut source_ctx = EmitContext::string();
                let emitted = self.emit_object_reference(
                    reference,
                    &mut source_ctx,
                    RefPurpose::AssignmentRvalue { lvalue_nonprimitive: true },
                )?;
                if emitted.kind != ReferenceKind::Object {
                    return Err(self.diag(reference.pos, "Can only copy from another object"));
                }
                if emitted.type_class != Some(class_id) {
                    return Err(
                        self.diag(reference.pos, "Cannot copy objects of different classes")
                    );
                }
                let segment = source_ctx.finish();
                ctx.buf.add_code_to_previous_line(&segment.pre_code);
                ctx.buf.add_code_to_next_line(&segment.post_code);
                object.copy_from = Some(emitted.object_ref.clone());
                Some(emitted.object_ref)
            }
            None => None,
        };

        let class_name = &node.class_name.name;
        if self.in_method {
            // Inline the class's new logic so every variable is local to
            // the method call; this keeps recursion safe
            let new_code = inline_new(&address, class_id, &self.program);
            ctx.buf.add_code(&new_code.pre_code);
            if let Some(source) = &copy_source {
                ctx.buf
                    .add_code(&format!("bpp__{class_name}____copy {source} {address} 0 0\n"));
            } else if let Some(constructor) =
                generate_constructor_call_code(&address, class_id, &self.program)
            {
                ctx.buf.add_code(&constructor.full_code());
            }
        } else if let Some(source) = &copy_source {
            ctx.buf.add_code(&format!("bpp__{class_name}____new {address} >/dev/null\n"));
            ctx.buf
                .add_code(&format!("bpp__{class_name}____copy {source} {address} 0 0\n"));
        } else {
            ctx.buf.add_code(&format!("bpp__{class_name}____new {address} >/dev/null\n"));
            if let Some(constructor) =
                generate_constructor_call_code(&address, class_id, &self.program)
            {
                ctx.buf.add_code(&constructor.full_code());
            }
        }

        self.register_object(object, node.name.pos)
    }

    pub(crate) fn emit_pointer_declaration(
        &mut self,
        node: &PointerDeclarationNode,
        ctx: &mut EmitContext,
    ) -> EmitResult {
        if self.in_class.is_some() && !self.in_method {
            return Err(self.diag(
                node.pos,
                "Stray pointer declaration inside class body.\nDid you mean to declare a data member?\nIf so, start by declaring the data member with a visibility keyword (@public, @private, @protected)",
            ));
        }
        let class_id = self
            .program
            .lookup_class(&node.class_name.name)
            .ok_or_else(|| {
                self.diag(node.class_name.pos, format!("Class not found: {}", node.class_name.name))
            })?;
        self.check_new_name(&node.name)?;

        let mut object = Object::pointer(node.name.name.clone(), class_id);
        object.address = format!("bpp____ptr__{}__{}", node.class_name.name, node.name.name);
        object.definition = Some(self.source_ref(node.name.pos));

        if let Some(value) = &node.value {
            let mut value_ctx = EmitContext::string();
            self.emit_value(value, &mut value_ctx, false)?;
            let segment = value_ctx.finish();
            ctx.buf.add_code_to_previous_line(&segment.pre_code);
            ctx.buf.add_code_to_next_line(&segment.post_code);
            let text = segment.code.trim().to_string();
            if !text.is_empty() {
                object.assignment_value = text;
            }
        }

        let prefix = if self.declare_local() { "local " } else { "" };
        ctx.buf.add_code(&format!(
            "{prefix}{}=\"{}\"\n",
            object.address, object.assignment_value
        ));
        self.register_object(object, node.name.pos)
    }

    // -------------------------------------------------------------------------
    // Assignments
    // -------------------------------------------------------------------------

    pub(crate) fn emit_assignment(
        &mut self,
        node: &ObjectAssignmentNode,
        ctx: &mut EmitContext,
    ) -> EmitResult {
        let mut lvalue_ctx = EmitContext::string();
        let lvalue = self.emit_object_reference(
            &node.lvalue,
            &mut lvalue_ctx,
            RefPurpose::Lvalue { deref: node.deref },
        )?;
        let lvalue_segment = lvalue_ctx.finish();

        let lvalue_nonprimitive = if node.deref {
            lvalue.type_class.is_some_and(|c| c != Program::PRIMITIVE)
        } else {
            lvalue.kind == ReferenceKind::Object && !lvalue.is_pointer
        };

        let mut value_ctx = EmitContext::string();
        let outcome = self.emit_value(&node.value, &mut value_ctx, lvalue_nonprimitive)?;
        let value_segment = value_ctx.finish();

        if lvalue_nonprimitive {
            let (source, source_class) = outcome.nonprimitive.ok_or_else(|| {
                self.diag(
                    node.value.pos,
                    "Cannot assign a primitive value to a nonprimitive object",
                )
            })?;
            let target_class = lvalue.type_class.unwrap_or(Program::PRIMITIVE);
            if source_class != target_class {
                return Err(self.diag(node.value.pos, "Cannot copy objects of different classes"));
            }
            let class_name = self.program.class(target_class).name.clone();
            ctx.buf.add_code_to_previous_line(&lvalue_segment.pre_code);
            ctx.buf.add_code_to_previous_line(&value_segment.pre_code);
            ctx.buf.add_code_to_next_line(&value_segment.post_code);
            ctx.buf.add_code_to_next_line(&lvalue_segment.post_code);
            ctx.buf.add_code(&format!(
                "bpp__{class_name}____copy {source} {} 0 0\n",
                lvalue.object_ref
            ));
            return Ok(());
        }

        // The rvalue is materialized into a temporary first, then an eval
        // performs the indirect write; this sidesteps evaluation-ordering
        // pitfalls between the two sides
        let counter = self.program.counters.assignment;
        self.program.bump_assignment_counter();
        let temporary = format!("____assignment{counter}");
        let operator = if node.adding { "+=" } else { "=" };

        ctx.buf.add_code_to_previous_line(&lvalue_segment.pre_code);
        ctx.buf.add_code_to_previous_line(&value_segment.pre_code);
        ctx.buf
            .add_code_to_previous_line(&format!("{temporary}={}\n", value_segment.code.trim()));
        ctx.buf.add_code_to_next_line(&format!("unset {temporary}\n"));
        ctx.buf.add_code_to_next_line(&value_segment.post_code);
        ctx.buf.add_code_to_next_line(&lvalue_segment.post_code);

        let assignment = if outcome.is_array {
            format!(
                "eval \"{}{operator}(\\\"\\${{{temporary}[@]}}\\\")\"\n",
                lvalue.text
            )
        } else {
            format!("eval {}{operator}\\${temporary}\n", lvalue.text)
        };
        ctx.buf.add_code(&assignment);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // @new, @delete, @dynamic_cast, @typeof
    // -------------------------------------------------------------------------

    pub(crate) fn emit_new(&mut self, node: &NewNode, ctx: &mut EmitContext) -> EmitResult {
        let class_id = self
            .program
            .lookup_class(&node.class_name.name)
            .ok_or_else(|| {
                self.diag(node.class_name.pos, format!("Class not found: {}", node.class_name.name))
            })?;
        if class_id == Program::PRIMITIVE {
            return Err(self.diag(node.class_name.pos, "Cannot instantiate a primitive"));
        }

        let supershell = self.supershell_wrap(&format!("bpp__{}____new", node.class_name.name));
        ctx.add_definition(&supershell.definition);
        ctx.buf.add_code_to_previous_line(&supershell.segment.pre_code);
        // The supershell output is the new object's address; construct it
        // before the surrounding expression runs
        if let Some(constructor) =
            generate_constructor_call_code(&supershell.segment.code, class_id, &self.program)
        {
            ctx.buf.add_code_to_previous_line(&constructor.full_code());
        }
        ctx.buf.add_code_to_next_line(&supershell.segment.post_code);
        ctx.buf.add_code(&supershell.segment.code);
        Ok(())
    }

    pub(crate) fn emit_delete(&mut self, node: &DeleteNode, ctx: &mut EmitContext) -> EmitResult {
        let mut target_ctx = EmitContext::string();
        let target =
            self.emit_object_reference(&node.target, &mut target_ctx, RefPurpose::DeleteTarget)?;
        let segment = target_ctx.finish();

        let class = target
            .type_class
            .ok_or_else(|| self.diag(node.pos, "Cannot determine the class of the delete target"))?;
        let delete_code = generate_delete_code(class, &target.object_ref, &mut self.program)?;

        ctx.buf.add_code_to_previous_line(&segment.pre_code);
        ctx.buf.add_code_to_next_line(&segment.post_code);
        ctx.buf.add_code(&delete_code.pre_code);
        Ok(())
    }

    pub(crate) fn emit_dynamic_cast(
        &mut self,
        node: &DynamicCastNode,
        ctx: &mut EmitContext,
    ) -> EmitResult {
        let target = match &node.target {
            CastTarget::ClassName(ident) => {
                if self.program.lookup_class(&ident.name).is_none() {
                    return Err(self.diag(ident.pos, format!("Class not found: {}", ident.name)));
                }
                ident.name.clone()
            }
            CastTarget::Runtime(text) => {
                if text.is_empty() {
                    return Err(self.diag(node.pos, "Dynamic cast target not specified"));
                }
                text.clone()
            }
        };

        let operand = self.emit_operand(&node.operand, ctx, node.pos, true)?;
        let cast = generate_dynamic_cast_code(&operand, &target, &mut self.program);
        ctx.buf.add_code_to_previous_line(&cast.pre_code);
        ctx.buf.add_code_to_next_line(&cast.post_code);
        ctx.buf.add_code(&cast.code);
        Ok(())
    }

    pub(crate) fn emit_typeof(&mut self, node: &TypeofNode, ctx: &mut EmitContext) -> EmitResult {
        let operand = self.emit_operand(&node.operand, ctx, node.pos, false)?;
        let type_of = generate_typeof_code(&operand, &mut self.program);
        ctx.buf.add_code_to_previous_line(&type_of.pre_code);
        ctx.buf.add_code_to_next_line(&type_of.post_code);
        ctx.buf.add_code(&type_of.code);
        Ok(())
    }

    /// Emit a cast/typeof operand. A bare word that names an object in
    /// scope resolves as a reference; anything else is shell text.
    fn emit_operand(
        &mut self,
        parts: &[Node],
        ctx: &mut EmitContext,
        pos: Position,
        in_dynamic_cast: bool,
    ) -> EmitResult<String> {
        if in_dynamic_cast {
            self.dynamic_cast_depth += 1;
        }
        let mut operand_ctx = EmitContext::string();
        let result = (|| -> EmitResult {
            if let [Node::RawText(raw)] = parts {
                let text = raw.text.trim();
                if crate::entity::types::is_valid_identifier(text)
                    && self.scopes.object_exists(text)
                {
                    let reference = ObjectReferenceNode {
                        ids: vec![Ident::new(text, raw.pos)],
                        array_index: None,
                        length_query: false,
                        pos: raw.pos,
                    };
                    self.emit_object_reference(&reference, &mut operand_ctx, RefPurpose::Rvalue)?;
                    return Ok(());
                }
            }
            self.emit_parts(parts, &mut operand_ctx)
        })();
        if in_dynamic_cast {
            self.dynamic_cast_depth -= 1;
        }
        result?;

        let segment = operand_ctx.finish();
        ctx.buf.add_code_to_previous_line(&segment.pre_code);
        ctx.buf.add_code_to_next_line(&segment.post_code);
        let operand = segment.code.trim().to_string();
        if operand.is_empty() {
            return Err(self.diag(pos, "Expected an operand"));
        }
        Ok(operand)
    }
}
