//! Per-construct code generators
//!
//! Each generator returns a code segment: setup in `pre_code`, the
//! substitutable expression (or call) in `code`, teardown in `post_code`.
//! The emitter decides where each part lands relative to the enclosing
//! construct.

use crate::codegen::templates;
use crate::diagnostics::InternalError;
use crate::entity::code_buffer::CodeSegment;
use crate::entity::program::{BashVersion, Program};
use crate::entity::types::ClassId;
use crate::entity::{Method, Visibility};

/// The indirection state machine of reference resolution:
/// `{0,0} → {1,0} → {1,1}`, i.e. bare name → `${name}` → `${!name}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndirectionLevel {
    None,
    Braced,
    Indirect,
}

impl IndirectionLevel {
    pub fn from_flags(first_temporary: bool, second_temporary: bool) -> Self {
        match (first_temporary, second_temporary) {
            (false, _) => Self::None,
            (true, false) => Self::Braced,
            (true, true) => Self::Indirect,
        }
    }
}

/// Encase a variable name with the given level of indirection
pub fn encase_ref(reference: &str, level: IndirectionLevel) -> String {
    match level {
        IndirectionLevel::None => reference.to_string(),
        IndirectionLevel::Braced => format!("${{{reference}}}"),
        IndirectionLevel::Indirect => format!("${{!{reference}}}"),
    }
}

/// A generated supershell: the helper-function definition is kept apart
/// from the invocation so that `&&`/`||` sequences can hoist the definition
/// while gating the invocation.
#[derive(Debug, Clone, Default)]
pub struct SupershellCode {
    pub definition: String,
    pub segment: CodeSegment,
}

impl SupershellCode {
    /// Definition and invocation merged into one segment, for contexts with
    /// no gating concerns
    pub fn merged(self) -> CodeSegment {
        CodeSegment {
            pre_code: format!("{}{}", self.definition, self.segment.pre_code),
            code: self.segment.code,
            post_code: self.segment.post_code,
        }
    }
}

/// Generate the code to run `code_to_run` in a supershell and substitute
/// its captured output.
///
/// Below Bash 5.3 this wraps the code in a uniquely named function and runs
/// it through the `bpp____supershell` helper; at 5.3+ the native `${ fn; }`
/// form is used and no temporary variable is needed.
///
/// When `while_condition_calls` is supplied (we are inside a `while`/`until`
/// condition on a pre-5.3 target), the invocation is registered with the
/// condition instead of being emitted into `pre_code`, so the loop emitter
/// can re-run it at every iteration.
pub fn generate_supershell_code(
    code_to_run: &str,
    while_condition_calls: Option<&mut Vec<String>>,
    program: &mut Program,
) -> SupershellCode {
    let counter = program.counters.supershell;
    let function_name = format!("____supershellRunFunc{counter}");
    let output_variable = format!("____supershellOutput{counter}");

    let mut result = SupershellCode::default();
    let body = code_to_run.trim_end_matches('\n');
    result.definition = format!("function {function_name}() {{\n\t{body}\n}}\n");

    if program.target_bash >= BashVersion::NATIVE_SUPERSHELL {
        // Native supershells re-evaluate wherever they appear, including in
        // loop conditions
        result.segment.code = format!("${{ {function_name}; }}");
        program.bump_supershell_counter();
        return result;
    }

    let invocation = format!("bpp____supershell {output_variable} {function_name}");
    match while_condition_calls {
        Some(calls) => calls.push(invocation),
        None => result.segment.pre_code = format!("{invocation}\n"),
    }
    result.segment.post_code = format!("unset -f {function_name}\nunset {output_variable}\n");
    result.segment.code = format!("${{{output_variable}}}");

    program.bump_supershell_counter();
    result
}

fn virtual_method_call(reference_code: &str, method_name: &str, program: &mut Program) -> CodeSegment {
    let counter = program.counters.function;
    let result = CodeSegment {
        pre_code: format!(
            "if bpp____vTable__lookup \"{reference_code}\" \"{method_name}\" __func{counter}; then\n"
        ),
        code: format!("\t${{!__func{counter}}} {reference_code}"),
        post_code: format!("\tunset __func{counter}\nfi\n"),
    };
    program.bump_function_counter();
    result
}

/// The class whose name appears in a static call: the class that actually
/// holds the method, walking the containing-class backlink.
fn holder_class_name(program: &Program, class_id: ClassId, method_name: &str) -> String {
    let class = program.class(class_id);
    match class.method_index(method_name) {
        Some(index) => {
            let method = &class.methods[index];
            match method.containing_class {
                Some(holder) => program.class(holder).name.clone(),
                None => class.name.clone(),
            }
        }
        None => class.name.clone(),
    }
}

/// Generate a call to a method on a receiver.
///
/// Virtual methods dispatch through a `bpp____vTable__lookup` call unless a
/// static reference is forced (`@super.method`); everything else calls the
/// concrete `bpp__Class__method` function directly.
pub fn generate_method_call_code(
    reference_code: &str,
    method_name: &str,
    assumed_class: ClassId,
    force_static_reference: bool,
    program: &mut Program,
) -> Result<CodeSegment, InternalError> {
    let class = program.class(assumed_class);
    let is_virtual = match class.method_index(method_name) {
        Some(index) => class.methods[index].is_virtual,
        None => templates::system_method(method_name).ok_or_else(|| {
            InternalError::new(format!(
                "Method {method_name} not found in class {}",
                class.name
            ))
        })?,
    };

    if is_virtual && !force_static_reference {
        return Ok(virtual_method_call(reference_code, method_name, program));
    }

    let class_name = holder_class_name(program, assumed_class, method_name);
    Ok(CodeSegment {
        code: format!("bpp__{class_name}__{method_name} {reference_code}"),
        ..CodeSegment::default()
    })
}

/// A `__constructor` call, or None when the class has no constructor
pub fn generate_constructor_call_code(
    reference_code: &str,
    assumed_class: ClassId,
    program: &Program,
) -> Option<CodeSegment> {
    let class = program.class(assumed_class);
    if !class.has_constructor {
        return None;
    }
    let class_name = holder_class_name(program, assumed_class, "__constructor");
    Some(CodeSegment {
        code: format!("bpp__{class_name}____constructor {reference_code}\n"),
        ..CodeSegment::default()
    })
}

/// A `__destructor` call. All destructors are virtual.
pub fn generate_destructor_call_code(
    reference_code: &str,
    assumed_class: ClassId,
    force_static_reference: bool,
    program: &mut Program,
) -> CodeSegment {
    if !force_static_reference {
        return virtual_method_call(reference_code, "__destructor", program);
    }
    let class_name = holder_class_name(program, assumed_class, "__destructor");
    CodeSegment {
        code: format!("bpp__{class_name}____destructor {reference_code}"),
        ..CodeSegment::default()
    }
}

/// Destructor call followed by the `__delete` call, both in `pre_code`
pub fn generate_delete_code(
    object_class: ClassId,
    object_ref: &str,
    program: &mut Program,
) -> Result<CodeSegment, InternalError> {
    let mut result = CodeSegment::default();

    let destructor_code = generate_destructor_call_code(object_ref, object_class, false, program);
    result.pre_code.push_str(&destructor_code.full_code());
    result.pre_code.push('\n');

    let delete_code = generate_method_call_code(object_ref, "__delete", object_class, false, program)?;
    result.pre_code.push_str(&delete_code.full_code());
    result.pre_code.push('\n');

    Ok(result)
}

/// A runtime dynamic cast: sets a temporary to the address on success or
/// the null sentinel on failure.
pub fn generate_dynamic_cast_code(
    reference_code: &str,
    class_name: &str,
    program: &mut Program,
) -> CodeSegment {
    let counter = program.counters.dynamic_cast;
    let result = CodeSegment {
        pre_code: format!(
            "bpp____dynamic__cast \"{class_name}\" \"__dynamicCast{counter}\" \"{reference_code}\"\n"
        ),
        code: format!("${{__dynamicCast{counter}}}"),
        post_code: format!("unset __dynamicCast{counter}\n"),
    };
    program.bump_dynamic_cast_counter();
    result
}

/// Walks the vTable chain of the operand and writes its class name into a
/// temporary
pub fn generate_typeof_code(reference_code: &str, program: &mut Program) -> CodeSegment {
    let counter = program.counters.type_of;
    let result = CodeSegment {
        pre_code: format!("bpp____typeof {reference_code} __typeof{counter}\n"),
        code: format!("${{__typeof{counter}}}"),
        post_code: format!("unset __typeof{counter}\n"),
    };
    program.bump_typeof_counter();
    result
}

/// Escape a leading `$` so defaults like `$HOME` survive the eval
fn pointer_default(default_value: &str) -> String {
    if default_value.is_empty() {
        return crate::entity::NULLPTR.to_string();
    }
    if default_value.starts_with('$') {
        format!("\\{default_value}")
    } else {
        default_value.to_string()
    }
}

/// Inline a class's `__new` logic with `local` declarations.
///
/// Used for objects instantiated inside methods: inlining keeps every
/// variable local to the method call, which keeps recursion safe.
pub fn inline_new(new_address: &str, new_class: ClassId, program: &Program) -> CodeSegment {
    let class = program.class(new_class);
    let mut pre = format!(
        "eval \"local {new_address}____vPointer=bpp__{}____vTable\"\n",
        class.name
    );

    for member in &class.datamembers {
        if !member.pre_access_code.is_empty() {
            pre.push_str(&member.pre_access_code);
            push_newline(&mut pre);
        }
        let member_address = format!("{new_address}__{}", member.name);
        if member.class_id == Program::PRIMITIVE {
            if member.is_array {
                let default = if member.default_value.is_empty() { "()" } else { &member.default_value };
                pre.push_str(&format!("\teval \"local {member_address}={default}\"\n"));
            } else {
                pre.push_str(&format!("\tlocal __objAssignment={}\n", member.default_value));
                pre.push_str(&format!(
                    "\teval \"local {member_address}=\\$__objAssignment\"\n"
                ));
                pre.push_str("\tunset __objAssignment\n");
            }
        } else if member.is_pointer {
            pre.push_str(&format!(
                "\teval \"local {member_address}={}\"\n",
                pointer_default(&member.default_value)
            ));
        } else {
            // The member's own variable holds its address, so chained
            // references dereference uniformly whether the member is
            // embedded or a pointer
            pre.push_str(&format!(
                "\teval \"local {member_address}=\\\"{member_address}\\\"\"\n"
            ));
            pre.push_str(&inline_new(&member_address, member.class_id, program).pre_code);
            if let Some(constructor) = generate_constructor_call_code(&member_address, member.class_id, program) {
                pre.push_str(&constructor.full_code());
            }
        }
        if !member.post_access_code.is_empty() {
            pre.push_str(&member.post_access_code);
            push_newline(&mut pre);
        }
    }

    CodeSegment { pre_code: pre, ..CodeSegment::default() }
}

fn push_newline(text: &mut String) {
    if !text.ends_with('\n') {
        text.push('\n');
    }
}

/// Build the body of the per-class `__new` wrapper.
///
/// The wrapper takes the target address in `$1` (empty means "allocate an
/// anonymous slot"), initializes the vPointer and every data member, and
/// echoes the address.
fn build_new_body(program: &Program, class_id: ClassId) -> String {
    let class = program.class(class_id);
    let mut body = String::new();
    body.push_str("\tlocal __objectAddress=\"$1\"\n");
    body.push_str("\tif [[ -z \"${__objectAddress}\" ]]; then\n");
    body.push_str("\t\t__objectAddress=\"bpp____anon__${bpp____objectCounter:-0}\"\n");
    body.push_str("\t\tbpp____objectCounter=$(( ${bpp____objectCounter:-0} + 1 ))\n");
    body.push_str("\tfi\n");
    body.push_str(&format!(
        "\teval \"${{__objectAddress}}____vPointer=bpp__{}____vTable\"\n",
        class.name
    ));

    for member in &class.datamembers {
        if !member.pre_access_code.is_empty() {
            body.push_str(&member.pre_access_code);
            push_newline(&mut body);
        }
        let member_suffix = format!("__{}", member.name);
        if member.class_id == Program::PRIMITIVE {
            if member.is_array {
                let default = if member.default_value.is_empty() { "()" } else { &member.default_value };
                body.push_str(&format!(
                    "\teval \"${{__objectAddress}}{member_suffix}={default}\"\n"
                ));
            } else {
                body.push_str(&format!("\t__objAssignment={}\n", member.default_value));
                body.push_str(&format!(
                    "\teval \"${{__objectAddress}}{member_suffix}=\\\"\\${{__objAssignment}}\\\"\"\n"
                ));
                body.push_str("\tunset __objAssignment\n");
            }
        } else if member.is_pointer {
            body.push_str(&format!(
                "\teval \"${{__objectAddress}}{member_suffix}={}\"\n",
                pointer_default(&member.default_value)
            ));
        } else {
            let member_class_name = program.class(member.class_id).name.clone();
            body.push_str(&format!(
                "\teval \"${{__objectAddress}}{member_suffix}=\\\"${{__objectAddress}}{member_suffix}\\\"\"\n"
            ));
            body.push_str(&format!(
                "\tbpp__{member_class_name}____new \"${{__objectAddress}}{member_suffix}\" >/dev/null\n"
            ));
            if program.class(member.class_id).has_constructor {
                let holder = holder_class_name(program, member.class_id, "__constructor");
                body.push_str(&format!(
                    "\tbpp__{holder}____constructor \"${{__objectAddress}}{member_suffix}\"\n"
                ));
            }
        }
        if !member.post_access_code.is_empty() {
            body.push_str(&member.post_access_code);
            push_newline(&mut body);
        }
    }

    body.push_str("\techo \"${__objectAddress}\"\n");
    body
}

/// Build the per-class `__copy` helper:
/// `bpp__C____copy from to fromIsPtr toIsPtr`. A `1` flag means the
/// argument is a pointer variable holding the address rather than the
/// address itself.
fn build_copy_function(program: &Program, class_id: ClassId) -> String {
    let class = program.class(class_id);
    let name = &class.name;
    let mut out = format!("function bpp__{name}____copy() {{\n");
    out.push_str("\tlocal __copyFrom=\"$1\" __copyTo=\"$2\"\n");
    out.push_str("\tif [[ \"${3:-0}\" == \"1\" ]]; then\n\t\t__copyFrom=\"${!__copyFrom}\"\n\tfi\n");
    out.push_str("\tif [[ \"${4:-0}\" == \"1\" ]]; then\n\t\t__copyTo=\"${!__copyTo}\"\n\tfi\n");
    out.push_str(&format!(
        "\teval \"${{__copyTo}}____vPointer=bpp__{name}____vTable\"\n"
    ));
    for member in &class.datamembers {
        let suffix = format!("__{}", member.name);
        if member.class_id == Program::PRIMITIVE && member.is_array {
            out.push_str(&format!(
                "\teval \"${{__copyTo}}{suffix}=(\\\"\\${{${{__copyFrom}}{suffix}[@]}}\\\")\"\n"
            ));
        } else if member.class_id == Program::PRIMITIVE || member.is_pointer {
            out.push_str(&format!(
                "\teval \"${{__copyTo}}{suffix}=\\\"\\${{${{__copyFrom}}{suffix}}}\\\"\"\n"
            ));
        } else {
            let member_class_name = &program.class(member.class_id).name;
            out.push_str(&format!(
                "\teval \"${{__copyTo}}{suffix}=\\\"${{__copyTo}}{suffix}\\\"\"\n"
            ));
            out.push_str(&format!(
                "\tbpp__{member_class_name}____copy \"${{__copyFrom}}{suffix}\" \"${{__copyTo}}{suffix}\" 0 0\n"
            ));
        }
    }
    out.push_str("}\n");
    out
}

/// Finalize a class: synthesize the default `toPrimitive` and
/// `__destructor` if absent, generate the `__delete` and `__new` methods
/// from the member list, and freeze the class. Idempotent.
pub fn finalize_class(program: &mut Program, class_id: ClassId) -> Result<(), InternalError> {
    if program.class(class_id).finalized {
        return Ok(());
    }

    program.class_mut(class_id).add_default_to_primitive();
    program.class_mut(class_id).add_default_destructor();

    // The system __delete method: unset every data member and the hidden
    // vPointer, recursively destructing non-primitive non-pointer members
    let members: Vec<_> = program
        .class(class_id)
        .datamembers
        .iter()
        .map(|d| (d.name.clone(), d.class_id, d.is_pointer))
        .collect();
    let mut delete_body = String::new();
    for (name, member_class, is_pointer) in &members {
        if *member_class == Program::PRIMITIVE || *is_pointer {
            delete_body.push_str(&format!("\tunset ${{__this}}__{name}\n"));
        } else {
            let delete_code =
                generate_delete_code(*member_class, &format!("${{__this}}__{name}"), program)?;
            delete_body.push_str(&delete_code.pre_code);
            delete_body.push_str(&format!("\tunset ${{__this}}__{name}\n"));
        }
    }
    delete_body.push_str("\tunset ${__this}____vPointer\n");

    let mut delete_method = Method::new("__delete");
    delete_method.visibility = Visibility::Public;
    delete_method.set_virtual(true);
    delete_method.synthesized = true;
    delete_method.body = delete_body;
    program
        .class_mut(class_id)
        .add_method(delete_method)
        .map_err(|e| InternalError::new(format!("finalize: {e}")))?;

    let mut new_method = Method::new("__new");
    new_method.visibility = Visibility::Public;
    new_method.synthesized = true;
    new_method.body = build_new_body(program, class_id);
    program
        .class_mut(class_id)
        .add_method(new_method)
        .map_err(|e| InternalError::new(format!("finalize: {e}")))?;

    program.class_mut(class_id).finalized = true;
    Ok(())
}

/// Emit everything a class contributes to the output: one function per
/// concrete method, the `__copy` helper, and the vTable declaration.
pub fn generate_class_definition(program: &Program, class_id: ClassId) -> String {
    let class = program.class(class_id);
    let name = &class.name;

    let mut functions = String::new();
    let mut vtable = format!("declare -A bpp__{name}____vTable\n");
    if let Some(parent) = class.parent() {
        vtable.push_str(&format!(
            "bpp__{name}____vTable[\"__parent__\"]=\"bpp__{}____vTable\"\n",
            program.class(parent).name
        ));
    }

    for method in &class.methods {
        if method.inherited && !method.is_virtual {
            continue;
        }

        if method.is_virtual {
            let override_class = method.last_override.as_deref().unwrap_or(name);
            vtable.push_str(&format!(
                "bpp__{name}____vTable[\"{}\"]=\"bpp__{override_class}__{}\"\n",
                method.name, method.name
            ));
            if override_class != name {
                // The concrete function already exists in the overriding
                // class's output
                continue;
            }
        }

        let params = if method.parameters.is_empty() {
            String::new()
        } else {
            let mut line = String::from("\tlocal ");
            for (i, parameter) in method.parameters.iter().enumerate() {
                if i > 0 {
                    line.push(' ');
                }
                line.push_str(&format!("{}=\"${}\"", parameter.name, i + 2));
            }
            line.push('\n');
            line
        };

        let validation = if method.name == "__new" {
            ""
        } else {
            templates::THIS_POINTER_VALIDATION
        };

        let mut body = method.body.clone();
        if !body.is_empty() {
            push_newline(&mut body);
        }

        let function = templates::METHOD_TEMPLATE
            .replace("%THIS_POINTER_VALIDATION%", validation)
            .replace("%CLASS%", name)
            .replace("%SIGNATURE%", &method.name)
            .replace("%PARAMS%", &params)
            .replace("%METHODBODY%", &body);
        functions.push_str(&function);
    }

    functions.push_str(&build_copy_function(program, class_id));
    functions.push_str(&vtable);
    functions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::DataMember;

    fn program_with_class(name: &str) -> (Program, ClassId) {
        let mut program = Program::new();
        let id = program.prepare_class(name).unwrap();
        (program, id)
    }

    #[test]
    fn test_encase_levels() {
        assert_eq!(encase_ref("x", IndirectionLevel::None), "x");
        assert_eq!(encase_ref("x", IndirectionLevel::Braced), "${x}");
        assert_eq!(encase_ref("x", IndirectionLevel::Indirect), "${!x}");
        assert_eq!(
            IndirectionLevel::from_flags(true, true),
            IndirectionLevel::Indirect
        );
        assert_eq!(
            IndirectionLevel::from_flags(false, false),
            IndirectionLevel::None
        );
    }

    #[test]
    fn test_supershell_pre_53() {
        let (mut program, _) = program_with_class("Foo");
        let result = generate_supershell_code("echo hi", None, &mut program);
        assert!(result.definition.contains("____supershellRunFunc0"));
        assert!(result.segment.pre_code.contains("bpp____supershell ____supershellOutput0"));
        assert_eq!(result.segment.code, "${____supershellOutput0}");
        assert!(result.segment.post_code.contains("unset -f ____supershellRunFunc0"));
        assert_eq!(program.counters.supershell, 1);
    }

    #[test]
    fn test_supershell_native_53() {
        let (mut program, _) = program_with_class("Foo");
        program.target_bash = BashVersion::new(5, 3);
        let result = generate_supershell_code("echo hi", None, &mut program);
        assert_eq!(result.segment.code, "${ ____supershellRunFunc0; }");
        assert!(result.segment.pre_code.is_empty());
        assert!(result.segment.post_code.is_empty());
    }

    #[test]
    fn test_supershell_registers_in_while_condition() {
        let (mut program, _) = program_with_class("Foo");
        let mut calls = Vec::new();
        let result = generate_supershell_code("check", Some(&mut calls), &mut program);
        assert_eq!(calls, vec!["bpp____supershell ____supershellOutput0 ____supershellRunFunc0"]);
        assert!(result.segment.pre_code.is_empty());
    }

    #[test]
    fn test_virtual_method_call_uses_vtable() {
        let (mut program, id) = program_with_class("Foo");
        let mut m = Method::new("greet");
        m.visibility = Visibility::Public;
        m.set_virtual(true);
        program.class_mut(id).add_method(m).unwrap();

        let seg = generate_method_call_code("${x}", "greet", id, false, &mut program).unwrap();
        assert!(seg.pre_code.contains("bpp____vTable__lookup \"${x}\" \"greet\" __func0"));
        assert!(seg.code.contains("${!__func0} ${x}"));
    }

    #[test]
    fn test_static_method_call_names_holder_class() {
        let mut program = Program::new();
        let parent = program.prepare_class("A").unwrap();
        let child = program.prepare_class("B").unwrap();
        let mut m = Method::new("helper");
        m.visibility = Visibility::Public;
        program.class_mut(parent).add_method(m).unwrap();
        program.inherit(child, parent);

        let seg = generate_method_call_code("addr", "helper", child, false, &mut program).unwrap();
        assert_eq!(seg.code, "bpp__A__helper addr");
    }

    #[test]
    fn test_dynamic_cast_code_shape() {
        let (mut program, _) = program_with_class("B");
        let seg = generate_dynamic_cast_code("${p}", "B", &mut program);
        assert_eq!(
            seg.pre_code,
            "bpp____dynamic__cast \"B\" \"__dynamicCast0\" \"${p}\"\n"
        );
        assert_eq!(seg.code, "${__dynamicCast0}");
        assert_eq!(seg.post_code, "unset __dynamicCast0\n");
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let (mut program, id) = program_with_class("Foo");
        finalize_class(&mut program, id).unwrap();
        let method_count = program.class(id).methods.len();
        finalize_class(&mut program, id).unwrap();
        assert_eq!(program.class(id).methods.len(), method_count);
        assert!(program.class(id).finalized);
    }

    #[test]
    fn test_empty_class_output() {
        let (mut program, id) = program_with_class("Foo");
        finalize_class(&mut program, id).unwrap();
        let code = generate_class_definition(&program, id);
        assert!(code.contains("declare -A bpp__Foo____vTable"));
        assert!(code.contains("function bpp__Foo__toPrimitive()"));
        assert!(code.contains("echo Foo Instance"));
        assert!(code.contains("function bpp__Foo____destructor()"));
        assert!(code.contains("function bpp__Foo____delete()"));
        assert!(code.contains("unset ${__this}____vPointer"));
        assert!(code.contains("function bpp__Foo____new()"));
        assert!(!code.contains("__parent__"));
    }

    #[test]
    fn test_inherited_override_vtable_entries() {
        let mut program = Program::new();
        let a = program.prepare_class("A").unwrap();
        let mut greet = Method::new("greet");
        greet.visibility = Visibility::Public;
        greet.set_virtual(true);
        greet.body = "\techo A\n".to_string();
        program.class_mut(a).add_method(greet).unwrap();
        finalize_class(&mut program, a).unwrap();

        let b = program.prepare_class("B").unwrap();
        program.inherit(b, a);
        let mut greet_b = Method::new("greet");
        greet_b.visibility = Visibility::Public;
        greet_b.body = "\techo B\n".to_string();
        program.class_mut(b).add_method(greet_b).unwrap();
        finalize_class(&mut program, b).unwrap();

        let a_code = generate_class_definition(&program, a);
        let b_code = generate_class_definition(&program, b);
        assert!(a_code.contains("bpp__A____vTable[\"greet\"]=\"bpp__A__greet\""));
        assert!(b_code.contains("bpp__B____vTable[\"greet\"]=\"bpp__B__greet\""));
        assert!(b_code.contains("bpp__B____vTable[\"__parent__\"]=\"bpp__A____vTable\""));
        // B's greet body is its own, not a duplicate of A's
        assert!(b_code.contains("echo B"));
        assert!(!b_code.contains("echo A\n"));
    }

    #[test]
    fn test_delete_recurses_into_object_members() {
        let mut program = Program::new();
        let inner = program.prepare_class("Inner").unwrap();
        finalize_class(&mut program, inner).unwrap();
        let outer = program.prepare_class("Outer").unwrap();
        let mut member = DataMember::new("inner", inner, Visibility::Public);
        member.is_pointer = false;
        program.class_mut(outer).add_datamember(member).unwrap();
        finalize_class(&mut program, outer).unwrap();

        let index = program.class(outer).method_index("__delete").unwrap();
        let body = &program.class(outer).methods[index].body;
        assert!(body.contains("bpp____vTable__lookup \"${__this}__inner\" \"__destructor\""));
        assert!(body.contains("unset ${__this}__inner"));
        assert!(body.contains("unset ${__this}____vPointer"));
    }
}
