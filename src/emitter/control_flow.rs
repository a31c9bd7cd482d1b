//! Compound-construct emission: if/elif chains, loops, case statements,
//! functions and brace groups
//!
//! Conditions are emitted as string contexts and their setup is hoisted
//! above the whole construct: a later branch may depend on variables whose
//! setup would otherwise be trapped inside an earlier, never-executed
//! branch. Teardown is hoisted below the construct for the same reason.

use crate::ast::types::*;
use crate::emitter::context::{EmitContext, EmitError, EmitResult};
use crate::emitter::walker::Walker;
use crate::entity::scope::FrameKind;

impl Walker {
    fn emit_body(&mut self, body: &[Node]) -> EmitResult<String> {
        self.scopes.push(FrameKind::Block);
        let mut body_ctx = EmitContext::code();
        let walked = self.emit_block(body, &mut body_ctx, false);
        self.scopes.pop();
        walked.map_err(EmitError::Internal)?;
        Ok(body_ctx.buf.take_output())
    }

    fn emit_condition(&mut self, parts: &[Node]) -> EmitResult<(String, String, String)> {
        let mut condition_ctx = EmitContext::string();
        self.emit_parts(parts, &mut condition_ctx)?;
        let segment = condition_ctx.finish();
        Ok((segment.pre_code, segment.code, segment.post_code))
    }

    pub(crate) fn emit_if(&mut self, node: &IfNode, ctx: &mut EmitContext) -> EmitResult {
        let mut conditions_pre = String::new();
        let mut conditions_post = String::new();
        let mut text = String::new();

        for (index, branch) in node.branches.iter().enumerate() {
            let (pre, condition, post) = self.emit_condition(&branch.condition)?;
            conditions_pre.push_str(&pre);
            conditions_post.push_str(&post);
            let keyword = if index == 0 { "if" } else { "elif" };
            text.push_str(&format!("{keyword} {condition}; then\n"));
            text.push_str(&self.emit_body(&branch.body)?);
        }
        if let Some(else_body) = &node.else_body {
            text.push_str("else\n");
            text.push_str(&self.emit_body(else_body)?);
        }
        text.push_str("fi\n");

        ctx.buf.add_code_to_previous_line(&conditions_pre);
        ctx.buf.add_code_to_next_line(&conditions_post);
        ctx.buf.add_code(&text);
        Ok(())
    }

    pub(crate) fn emit_while(&mut self, node: &WhileNode, ctx: &mut EmitContext) -> EmitResult {
        // Supershells inside the condition must re-run at each iteration on
        // targets without native supershells: their invocations are
        // registered here and emitted both before the loop and at the
        // bottom of the body.
        self.in_while_condition += 1;
        self.while_condition_calls.push(Vec::new());
        let condition = self.emit_condition(&node.condition);
        self.in_while_condition -= 1;
        let calls = self.while_condition_calls.pop().unwrap_or_default();
        let (pre, condition, post) = condition?;

        let body = self.emit_body(&node.body)?;

        let mut evaluation = String::new();
        for call in &calls {
            evaluation.push_str(call);
            evaluation.push('\n');
        }

        let keyword = if node.until { "until" } else { "while" };
        let mut text = String::new();
        text.push_str(&format!("{keyword} {condition}; do\n"));
        text.push_str(&body);
        text.push_str(&evaluation);
        text.push_str("done\n");

        ctx.buf.add_code_to_previous_line(&pre);
        ctx.buf.add_code_to_next_line(&post);
        ctx.buf.add_code_to_previous_line(&evaluation);
        ctx.buf.add_code(&text);
        Ok(())
    }

    pub(crate) fn emit_for(&mut self, node: &ForNode, ctx: &mut EmitContext) -> EmitResult {
        let (pre, header, post) = self.emit_condition(&node.header)?;
        let body = self.emit_body(&node.body)?;

        let mut text = String::new();
        text.push_str(&format!("{} {header}; do\n", node.keyword));
        text.push_str(&body);
        text.push_str("done\n");

        ctx.buf.add_code_to_previous_line(&pre);
        ctx.buf.add_code_to_next_line(&post);
        ctx.buf.add_code(&text);
        Ok(())
    }

    pub(crate) fn emit_case(&mut self, node: &CaseNode, ctx: &mut EmitContext) -> EmitResult {
        let (mut pre, subject, mut post) = self.emit_condition(&node.subject)?;
        let mut text = format!("case {subject} in\n");

        for pattern in &node.patterns {
            // Pattern setup hoists above the whole case, like if conditions
            let (pattern_pre, pattern_text, pattern_post) =
                self.emit_condition(&pattern.pattern)?;
            pre.push_str(&pattern_pre);
            post.push_str(&pattern_post);
            text.push_str(&format!("{pattern_text})\n"));
            text.push_str(&self.emit_body(&pattern.body)?);
            text.push_str(";;\n");
        }
        text.push_str("esac\n");

        ctx.buf.add_code_to_previous_line(&pre);
        ctx.buf.add_code_to_next_line(&post);
        ctx.buf.add_code(&text);
        Ok(())
    }

    pub(crate) fn emit_function(&mut self, node: &FunctionNode, ctx: &mut EmitContext) -> EmitResult {
        self.function_depth += 1;
        self.scopes.push(FrameKind::Function);
        let mut body_ctx = EmitContext::code();
        let walked = self.emit_block(&node.body, &mut body_ctx, false);
        self.scopes.pop();
        self.function_depth -= 1;
        walked.map_err(EmitError::Internal)?;

        let mut text = String::new();
        text.push_str(&format!("{} {{\n", node.header));
        text.push_str(&body_ctx.buf.take_output());
        text.push_str("}\n");
        ctx.buf.add_code(&text);
        Ok(())
    }

    pub(crate) fn emit_group(&mut self, node: &GroupNode, ctx: &mut EmitContext) -> EmitResult {
        let body = self.emit_body(&node.body)?;
        ctx.buf.add_code("{\n");
        ctx.buf.add_code(&body);
        ctx.buf.add_code("}\n");
        Ok(())
    }
}
