//! Reference emission
//!
//! Object references resolve to either a primitive value, a method, or an
//! object. What gets emitted depends on where the reference appears:
//! primitives expand in place, rvalue method references run in a supershell
//! and substitute their output, statement-position method references call
//! directly, `&@` yields the bare address, and non-primitive objects fall
//! back to their `toPrimitive` output.

use crate::ast::types::{Node, ObjectReferenceNode, StringNode, SupershellNode};
use crate::codegen::generate::{
    generate_method_call_code, generate_supershell_code, SupershellCode,
};
use crate::codegen::resolver::{resolve_reference, EntityReference, ResolveScope, ResolvedEntity};
use crate::emitter::context::{resolve_diag, EmitContext, EmitResult, EmittedReference, RefPurpose};
use crate::emitter::walker::Walker;
use crate::entity::types::ReferenceKind;

impl Walker {
    /// Fold a generated supershell into a context
    fn fold_supershell(ctx: &mut EmitContext, supershell: SupershellCode) {
        ctx.add_definition(&supershell.definition);
        ctx.buf.add_code_to_previous_line(&supershell.segment.pre_code);
        ctx.buf.add_code_to_next_line(&supershell.segment.post_code);
        ctx.buf.add_code(&supershell.segment.code);
    }

    /// Run generated code in a supershell, registering the invocation with
    /// the enclosing while-condition when there is one
    pub(crate) fn supershell_wrap(&mut self, code_to_run: &str) -> SupershellCode {
        let sink = if self.in_while_condition > 0 && self.supershell_depth == 0 {
            self.while_condition_calls.last_mut()
        } else {
            None
        };
        generate_supershell_code(code_to_run, sink, &mut self.program)
    }

    // -------------------------------------------------------------------------
    // Supershells and strings
    // -------------------------------------------------------------------------

    pub(crate) fn emit_supershell(
        &mut self,
        node: &SupershellNode,
        ctx: &mut EmitContext,
    ) -> EmitResult {
        self.supershell_depth += 1;
        self.scopes.push(crate::entity::scope::FrameKind::Supershell);
        let mut body_ctx = EmitContext::string();
        let walked = self.emit_block(&node.body, &mut body_ctx, false);
        self.scopes.pop();
        self.supershell_depth -= 1;
        walked.map_err(crate::emitter::context::EmitError::Internal)?;

        let segment = body_ctx.finish();
        let mut code_to_run = String::new();
        code_to_run.push_str(&segment.pre_code);
        code_to_run.push_str(&segment.code);
        code_to_run.push('\n');
        code_to_run.push_str(&segment.post_code);

        let supershell = self.supershell_wrap(&code_to_run);
        Self::fold_supershell(ctx, supershell);
        Ok(())
    }

    pub(crate) fn emit_string(&mut self, node: &StringNode, ctx: &mut EmitContext) -> EmitResult {
        let mut string_ctx = EmitContext::string();
        self.emit_parts(&node.parts, &mut string_ctx)?;
        let segment = string_ctx.finish();
        // Setup stays outside the quoted region
        ctx.buf.add_code_to_previous_line(&segment.pre_code);
        ctx.buf.add_code_to_next_line(&segment.post_code);
        ctx.buf.add_code(&format!("\"{}\"", segment.code));
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Object references
    // -------------------------------------------------------------------------

    pub(crate) fn emit_object_reference(
        &mut self,
        node: &ObjectReferenceNode,
        ctx: &mut EmitContext,
        purpose: RefPurpose,
    ) -> EmitResult<EmittedReference> {
        let reference = {
            let scope = ResolveScope {
                scopes: &self.scopes,
                current_class: self.in_class,
                declare_local: self.declare_local(),
            };
            resolve_reference(&self.source_file, &node.ids, &scope, &mut self.program)
        }
        .map_err(|e| resolve_diag(&self.source_file, e, node.pos))?;

        ctx.buf.add_code_to_previous_line(&reference.code.pre_code);
        ctx.buf.add_code_to_next_line(&reference.code.post_code);

        let kind = reference.last_kind;
        let is_pointer = reference.entity.is_pointer(&self.program);
        let type_class = reference.entity.type_class(&self.program);
        let mut code = reference.code.code.clone();
        let first = reference.created_first_temporary;
        let mut second = reference.created_second_temporary;

        let mut emitted = EmittedReference {
            kind,
            is_pointer,
            type_class,
            text: String::new(),
            object_ref: String::new(),
        };

        // Methods resolve before anything else; no identifiers can follow
        if kind == ReferenceKind::Method {
            return self.emit_method_reference(node, ctx, purpose, &reference, emitted);
        }

        // Array index access rewrites the reference code: afterwards the
        // temporary holds the indexed value itself
        if let Some(index_parts) = &node.array_index {
            code = self.emit_array_index(node, ctx, index_parts, &code, second)?;
            second = false;
        }

        let encased = |with_indirection: bool| -> String {
            let indirection = if with_indirection && second { "!" } else { "" };
            format!("${{{indirection}{code}}}")
        };

        match purpose {
            RefPurpose::Address => {
                // The bare address: peel the outermost expansion
                let address = if second { format!("${{{code}}}") } else { code.clone() };
                emitted.text = address.clone();
                emitted.object_ref = address;
                ctx.buf.add_code(&emitted.text);
                Ok(emitted)
            }
            RefPurpose::DeleteTarget => {
                if matches!(node.ids[0].name.as_str(), "this") && node.ids.len() == 1 {
                    return Err(self.diag(node.pos, "Cannot call @delete on @this"));
                }
                if kind == ReferenceKind::Primitive {
                    return Err(self.diag(node.pos, "Cannot call @delete on a primitive"));
                }
                emitted.object_ref = if is_pointer || second {
                    encased(true)
                } else {
                    code.clone()
                };
                emitted.text = emitted.object_ref.clone();
                Ok(emitted)
            }
            RefPurpose::Lvalue { deref } => {
                if deref {
                    emitted.text = encased(true);
                    emitted.object_ref = emitted.text.clone();
                    ctx.buf.add_code(&emitted.text);
                    return Ok(emitted);
                }
                // Assignment targets use the variable *name*: expansion
                // only once a temporary holds that name
                emitted.text = if second { format!("${{{code}}}") } else { code.clone() };
                emitted.object_ref = if is_pointer || second { encased(true) } else { code.clone() };
                ctx.buf.add_code(&emitted.text);
                Ok(emitted)
            }
            RefPurpose::AssignmentRvalue { lvalue_nonprimitive }
                if lvalue_nonprimitive
                    && kind == ReferenceKind::Object
                    && !matches!(reference.entity, ResolvedEntity::Method { .. }) =>
            {
                // Copy source: the object's address value
                emitted.object_ref = if is_pointer || second { encased(true) } else { code.clone() };
                emitted.text = emitted.object_ref.clone();
                ctx.buf.add_code(&emitted.text);
                Ok(emitted)
            }
            RefPurpose::Deref => {
                if !is_pointer {
                    return Err(self.diag(node.pos, "Cannot dereference a non-pointer"));
                }
                // Call .toPrimitive on the pointee
                let receiver = encased(true);
                self.emit_to_primitive_call(node, ctx, &receiver, type_class, &mut emitted)?;
                Ok(emitted)
            }
            _ => {
                // Rvalue / Statement / primitive-lvalue fallthrough
                if kind == ReferenceKind::Primitive || is_pointer {
                    let indirection = if second && !node.length_query { "!" } else { "" };
                    emitted.text = format!("${{{indirection}{code}}}");
                    emitted.object_ref = emitted.text.clone();
                    ctx.buf.add_code(&emitted.text);
                    return Ok(emitted);
                }
                // Non-primitive object: substitute its toPrimitive output
                let receiver = if first {
                    let indirection = if second { "!" } else { "" };
                    format!("${{{indirection}{code}}}")
                } else {
                    code.clone()
                };
                emitted.object_ref = receiver.clone();
                self.emit_to_primitive_call(node, ctx, &receiver, type_class, &mut emitted)?;
                Ok(emitted)
            }
        }
    }

    fn emit_method_reference(
        &mut self,
        node: &ObjectReferenceNode,
        ctx: &mut EmitContext,
        purpose: RefPurpose,
        reference: &EntityReference,
        mut emitted: EmittedReference,
    ) -> EmitResult<EmittedReference> {
        let method_name = node.ids.last().expect("method chains are non-empty").name.clone();
        let force_static = node.ids[0].name == "super";

        let receiver = {
            let code = &reference.code.code;
            if reference.created_first_temporary {
                let indirection = if reference.created_second_temporary { "!" } else { "" };
                format!("${{{indirection}{code}}}")
            } else {
                code.clone()
            }
        };

        let holding_class = reference
            .class_holding_method
            .ok_or_else(|| self.diag(node.pos, "Method reference has no containing class"))?;

        let call = generate_method_call_code(
            &receiver,
            &method_name,
            holding_class,
            force_static,
            &mut self.program,
        )?;

        match purpose {
            RefPurpose::Lvalue { .. } => {
                Err(self.diag(node.pos, "Cannot assign to a method"))
            }
            RefPurpose::DeleteTarget => {
                Err(self.diag(node.pos, "Cannot call @delete on a method"))
            }
            RefPurpose::Statement | RefPurpose::Address => {
                // Direct call (statement) or the `function receiver` pair
                // (taking the address); no supershell either way
                ctx.buf.add_code_to_previous_line(&call.pre_code);
                ctx.buf.add_code_to_next_line(&call.post_code);
                emitted.text = call.code.clone();
                ctx.buf.add_code(&call.code);
                Ok(emitted)
            }
            _ => {
                let supershell = self.supershell_wrap(&call.full_code());
                emitted.text = supershell.segment.code.clone();
                Self::fold_supershell(ctx, supershell);
                Ok(emitted)
            }
        }
    }

    fn emit_to_primitive_call(
        &mut self,
        node: &ObjectReferenceNode,
        ctx: &mut EmitContext,
        receiver: &str,
        type_class: Option<crate::entity::ClassId>,
        emitted: &mut EmittedReference,
    ) -> EmitResult {
        let class = type_class
            .ok_or_else(|| self.diag(node.pos, "Referenced entity has no class"))?;
        let call =
            generate_method_call_code(receiver, "toPrimitive", class, false, &mut self.program)?;
        let supershell = self.supershell_wrap(&call.full_code());
        emitted.text = supershell.segment.code.clone();
        Self::fold_supershell(ctx, supershell);

        if self.dynamic_cast_depth > 0 {
            self.warn(
                node.pos,
                "Dynamic casting the result of .toPrimitive may not be what you want\nDid you mean to take the address of the object?",
            );
        }
        Ok(())
    }

    /// Rewrite the reference code for an `[index]` access, returning the
    /// temporary that holds the indexed value (or the string naming it).
    fn emit_array_index(
        &mut self,
        node: &ObjectReferenceNode,
        ctx: &mut EmitContext,
        index_parts: &[Node],
        code: &str,
        second: bool,
    ) -> EmitResult<String> {
        let mut index_ctx = EmitContext::string();
        self.emit_parts(index_parts, &mut index_ctx)?;
        let index_segment = index_ctx.finish();
        ctx.buf.add_code_to_previous_line(&index_segment.pre_code);
        ctx.buf.add_code_to_next_line(&index_segment.post_code);
        let index = index_segment.code.trim().to_string();

        let counting = if node.length_query { "#" } else { "" };
        let first_is_pointer = self
            .scopes
            .lookup_object(&node.ids[0].name)
            .map(|o| o.is_pointer)
            .unwrap_or(false);
        let must_dereference = first_is_pointer || node.ids.len() > 2;

        let string_temporary = format!("{code}____arrayIndexString");
        let string_value = if must_dereference {
            format!("{counting}${{{code}}}[{index}]")
        } else {
            let indirection = if second { "!" } else { "" };
            format!("${{{counting}{indirection}{code}[{index}]}}")
        };
        ctx.buf
            .add_code_to_previous_line(&format!("{string_temporary}={string_value}\n"));
        ctx.buf.add_code_to_next_line(&format!("unset {string_temporary}\n"));

        if !must_dereference {
            return Ok(string_temporary);
        }

        // The string temporary names the array cell; evaluate it to fetch
        // the value
        let mut cell = format!("${{{string_temporary}}}");
        if node.length_query {
            cell = format!("\\${{{cell}}}");
        }
        let value_temporary = format!("{code}____arrayIndex");
        ctx.buf
            .add_code_to_previous_line(&format!("eval {value_temporary}=\"{cell}\"\n"));
        ctx.buf.add_code_to_next_line(&format!("unset {value_temporary}\n"));
        Ok(value_temporary)
    }
}
