//! End-to-end compile scenarios
//!
//! Each test compiles a complete Bash++ source through the public API and
//! checks the shape of the generated Bash (up to counter numbering and
//! whitespace).

use bashpp::compiler::{CompileOptions, Compiler};
use bashpp::entity::BashVersion;
use bashpp::{compile, Severity};

fn compile_ok(source: &str) -> String {
    let result = compile(source).expect("compilation should not abort");
    assert!(
        result.success,
        "unexpected diagnostics: {:?}",
        result.diagnostics
    );
    result.output
}

#[test]
fn empty_class_produces_full_skeleton() {
    let output = compile_ok("@class Foo {}\n");

    assert!(output.contains("declare -A bpp__Foo____vTable"));
    assert!(output.contains("function bpp__Foo__toPrimitive()"));
    assert!(output.contains("echo Foo Instance"));
    assert!(output.contains("function bpp__Foo____destructor()"));
    assert!(output.contains("function bpp__Foo____delete()"));
    assert!(output.contains("unset ${__this}____vPointer"));
    assert!(output.contains("function bpp__Foo____new()"));
    // No parent, no __parent__ entry
    assert!(!output.contains("__parent__"));
}

#[test]
fn inherited_override_points_vtables_at_most_derived() {
    let source = "\
@class A { @public @virtual @method greet { echo A; } }
@class B : A   { @public @method greet { echo B; } }
";
    let output = compile_ok(source);

    assert!(output.contains("bpp__A____vTable[\"greet\"]=\"bpp__A__greet\""));
    assert!(output.contains("bpp__B____vTable[\"greet\"]=\"bpp__B__greet\""));
    assert!(output.contains("bpp__B____vTable[\"__parent__\"]=\"bpp__A____vTable\""));

    // B's greet is its own body, not a duplicate of A's
    let b_greet = output
        .split("function bpp__B__greet()")
        .nth(1)
        .expect("B::greet function body");
    let b_greet_body = b_greet.split("function ").next().unwrap();
    assert!(b_greet_body.contains("echo B"));
    assert!(!b_greet_body.contains("echo A"));
}

#[test]
fn chained_reference_uses_two_temporaries_and_indirection() {
    let source = "\
@class Inner { @public x=5 }
@class Outer {
\t@public @Inner inner
\t@public @method show {
\t\techo @this.inner.x
\t}
}
";
    let output = compile_ok(source);

    assert!(output.contains("local __this__inner=${__this}__inner"));
    assert!(output.contains("local __this__inner__x=${!__this__inner}__x"));
    assert!(output.contains("echo ${!__this__inner__x}"));
    assert!(output.contains("unset __this__inner\n"));
    assert!(output.contains("unset __this__inner__x\n"));
}

#[test]
fn short_circuited_supershell_is_gated() {
    let output = compile_ok("false && echo @(side_effect)\n");

    // The helper-function definition is hoisted above the sequence
    let definition_at = output
        .find("function ____supershellRunFunc0()")
        .expect("supershell helper definition");
    let gate_at = output.find("{\nfalse\n}").expect("gated first component");
    assert!(definition_at < gate_at);

    // The invocation runs inside the right-hand side of &&
    let invocation_at = output
        .find("bpp____supershell ____supershellOutput0 ____supershellRunFunc0")
        .expect("supershell invocation");
    let connective_at = output.find(" && ").expect("connective");
    assert!(invocation_at > connective_at);

    // The exit status of the gated component survives its post-code
    assert!(output.contains("____ret=$?"));
    assert!(output.contains("bpp____repeat $____ret"));
}

#[test]
fn dynamic_cast_to_null_uses_runtime_helper() {
    let source = "\
@class A {}
@class B : A {}
@A* p = @nullptr
@B* q = @dynamic_cast<B> p
";
    let output = compile_ok(source);

    assert!(output.contains("bpp____ptr__A__p=\"0\""));
    assert!(output.contains("bpp____dynamic__cast \"B\" \"__dynamicCast0\""));
    assert!(output.contains("bpp____ptr__B__q=\"${__dynamicCast0}\""));
    assert!(output.contains("unset __dynamicCast0"));
    // The runtime helper itself was emitted, above its first use
    let helper_at = output.find("function bpp____dynamic__cast()").expect("helper");
    let use_at = output.find("bpp____dynamic__cast \"B\"").unwrap();
    assert!(helper_at < use_at);
}

#[test]
fn delete_rejects_this_and_primitives() {
    let source = "\
@class Foo {
\t@public count=0
\t@public @method clear {
\t\t@delete @this
\t}
}
@Foo f
@delete @f.count
";
    let result = compile(source).expect("compilation should not abort");
    assert!(!result.success);
    let messages: Vec<&str> = result
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .map(|d| d.message.as_str())
        .collect();
    assert!(messages.iter().any(|m| m.contains("@delete on @this")));
    assert!(messages.iter().any(|m| m.contains("@delete on a primitive")));
    // Neither offending statement emitted anything
    assert!(!result.output.contains("bpp____vTable__lookup \"${__this}\" \"__destructor\""));
}

#[test]
fn delete_emits_destructor_then_delete() {
    let source = "\
@class Foo {}
@Foo f
@delete @f
";
    let output = compile_ok(source);
    let destructor_at = output
        .find("bpp____vTable__lookup \"bpp__0__Foo__f\" \"__destructor\"")
        .expect("destructor lookup");
    let delete_at = output
        .find("bpp____vTable__lookup \"bpp__0__Foo__f\" \"__delete\"")
        .expect("delete lookup");
    assert!(destructor_at < delete_at);
}

#[test]
fn instantiation_calls_new_and_tracks_constructor() {
    let source = "\
@class Greeter {
\t@constructor {
\t\techo hello
\t}
}
@Greeter g
";
    let output = compile_ok(source);
    assert!(output.contains("bpp__Greeter____new bpp__0__Greeter__g >/dev/null"));
    assert!(output.contains("bpp__Greeter____constructor bpp__0__Greeter__g"));
    assert!(output.contains("function bpp__Greeter____constructor()"));
}

#[test]
fn while_condition_supershell_reevaluates_per_iteration() {
    let source = "\
@class Q { @public @method poll { echo 0; } }
@Q q
while [[ \"@q.poll\" == \"0\" ]]; do
\techo waiting
done
";
    let output = compile_ok(source);

    // The invocation appears once before the loop and once at the bottom
    // of the body
    let invocation = "bpp____supershell ____supershellOutput0 ____supershellRunFunc0";
    let occurrences = output.matches(invocation).count();
    assert_eq!(occurrences, 2, "expected pre-loop and per-iteration calls:\n{output}");

    let while_at = output.find("while [[").expect("while header");
    let first = output.find(invocation).unwrap();
    let second = output.rfind(invocation).unwrap();
    let done_at = output.rfind("done").unwrap();
    assert!(first < while_at);
    assert!(second > while_at && second < done_at);
}

#[test]
fn native_supershell_on_bash_53() {
    let compiler = Compiler::new(CompileOptions {
        target_bash: BashVersion::new(5, 3),
        ..CompileOptions::default()
    });
    let result = compiler
        .compile_source("echo @(date)\n", "<stdin>")
        .expect("compiles");
    assert!(result.success);
    assert!(result.output.contains("${ ____supershellRunFunc0; }"));
    assert!(!result.output.contains("bpp____supershell"));
}

#[test]
fn if_condition_setup_hoists_above_the_whole_statement() {
    let source = "\
@class Cfg {
\t@public path=/tmp/a
\t@public other=/tmp/b
}
@Cfg c
if [[ -f \"@c.path\" ]]; then
\techo one
elif [[ -f \"@c.other\" ]]; then
\techo two
fi
";
    let output = compile_ok(source);
    let if_at = output.find("if [[").expect("if header");
    // Both conditions' references expand to direct variable accesses; the
    // member variables are reachable without extra setup here, so simply
    // check both conditions were rewritten and the elif references the
    // second member
    assert!(output.contains("elif [[ -f \"${bpp__0__Cfg__c__other}\" ]]"));
    assert!(output[if_at..].contains("echo one"));
}

#[test]
fn method_call_statement_passes_arguments_after_receiver() {
    let source = "\
@class Greeter {
\t@public @method greet name {
\t\techo hello ${name}
\t}
}
@Greeter g
@g.greet world
";
    let output = compile_ok(source);
    assert!(output.contains("bpp__Greeter__greet bpp__0__Greeter__g world"));
    // Parameters bind from $2; the receiver is $1
    assert!(output.contains("local name=\"$2\""));
}

#[test]
fn primitive_assignment_goes_through_temporary() {
    let source = "\
@class P { @public x=0 }
@P p
@p.x = 42
";
    let output = compile_ok(source);
    assert!(output.contains("____assignment0=42"));
    assert!(output.contains("eval bpp__0__P__p__x=\\$____assignment0"));
    assert!(output.contains("unset ____assignment0"));
}

#[test]
fn object_copy_assignment_uses_copy_helper() {
    let source = "\
@class P { @public x=0 }
@P a
@P b
@a = @b
";
    let output = compile_ok(source);
    assert!(output.contains("bpp__P____copy bpp__1__P__b bpp__0__P__a"));
    assert!(output.contains("function bpp__P____copy()"));
}

#[test]
fn copy_across_classes_is_an_error() {
    let source = "\
@class A {}
@class B {}
@A a
@B b
@a = @b
";
    let result = compile(source).expect("compiles");
    assert!(!result.success);
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.message.contains("Cannot copy objects of different classes")));
}

#[test]
fn inaccessible_member_is_reported_distinctly() {
    let source = "\
@class Base { @private secret=1 }
@class Derived : Base {
\t@public @method peek {
\t\techo @this.secret
\t}
}
";
    let result = compile(source).expect("compiles");
    assert!(!result.success);
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.message.contains("inaccessible in this context")));
}

#[test]
fn super_at_root_class_errors() {
    let source = "\
@class Root {
\t@public @method go {
\t\t@super.go
\t}
}
";
    let result = compile(source).expect("compiles");
    assert!(!result.success);
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.message.contains("no parent class to reference with @super")));
}

#[test]
fn super_method_call_is_static() {
    let source = "\
@class A { @public @virtual @method greet { echo A; } }
@class B : A {
\t@public @method greet {
\t\t@super.greet
\t}
}
";
    let output = compile_ok(source);
    // The super call names A's function directly, no vTable lookup
    assert!(output.contains("bpp__A__greet ${__this}"));
}

#[test]
fn double_underscore_identifiers_are_rejected() {
    let result = compile("@class Foo { @public bad__name=1 }\n").expect("compiles");
    assert!(!result.success);
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.message.contains("cannot contain double underscores")));
}

#[test]
fn new_in_pointer_declaration_constructs_object() {
    let source = "\
@class W {
\t@constructor {
\t\techo built
\t}
}
@W* w = @new W
";
    let output = compile_ok(source);
    assert!(output.contains("bpp__W____new"));
    assert!(output.contains("bpp__W____constructor ${____supershellOutput0}"));
    assert!(output.contains("bpp____ptr__W__w=\"${____supershellOutput0}\""));
}

#[test]
fn pointer_members_default_to_nullptr() {
    let source = "\
@class Node {
\t@public @Node* next
}
";
    let output = compile_ok(source);
    assert!(output.contains("function bpp__Node____new()"));
    assert!(output.contains("eval \"${__objectAddress}__next=0\""));
}

#[test]
fn program_scope_objects_are_destructed_at_exit() {
    let output = compile_ok("@class Foo {}\n@Foo f\necho done\n");
    let echo_at = output.find("echo done").unwrap();
    let delete_at = output
        .find("bpp____vTable__lookup \"bpp__0__Foo__f\" \"__delete\"")
        .expect("epilogue delete");
    assert!(delete_at > echo_at);
}

#[test]
fn method_local_objects_are_destructed_at_method_exit() {
    let source = "\
@class Helper {}
@class Owner {
\t@public @method work {
\t\t@Helper h
\t\techo working
\t}
}
";
    let output = compile_ok(source);
    let body = output
        .split("function bpp__Owner__work()")
        .nth(1)
        .expect("method body");
    let body = body.split("function ").next().unwrap();
    assert!(body.contains("eval \"local bpp__0__Helper__h____vPointer=bpp__Helper____vTable\""));
    let echo_at = body.find("echo working").unwrap();
    let delete_at = body.find("\"__delete\"").expect("local delete");
    assert!(delete_at > echo_at);
}

#[test]
fn plain_bash_round_trips() {
    let source = "\
set -euo pipefail
for f in *.txt; do
\tgrep -q hello \"$f\" || continue
\techo \"$f\"
done
";
    let output = compile_ok(source);
    assert!(output.contains("set -euo pipefail"));
    assert!(output.contains("for f in *.txt; do"));
    assert!(output.contains("grep -q hello \"$f\""));
    assert!(output.contains("done"));
}

#[test]
fn typeof_uses_runtime_helper() {
    let source = "\
@class T {}
@T t
@T* pt = &@t
echo @typeof pt
";
    let output = compile_ok(source);
    assert!(output.contains("function bpp____typeof()"));
    assert!(output.contains("bpp____typeof ${bpp____ptr__T__pt} __typeof0"));
    assert!(output.contains("${__typeof0}"));
    assert!(output.contains("unset __typeof0"));
}

#[test]
fn include_not_found_is_an_error() {
    let result = compile("@include \"definitely/not/here.bpp\"\n").expect("compiles");
    assert!(!result.success);
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.message.contains("File not found") || d.message.contains("not/here")));
}

#[test]
fn static_include_inlines_compiled_body() {
    use std::io::Write;

    let dir = tempfile::tempdir().expect("tempdir");
    let lib_path = dir.path().join("lib.bpp");
    let mut lib = std::fs::File::create(&lib_path).expect("create lib");
    writeln!(lib, "@class FromLib {{}}").unwrap();
    drop(lib);

    let main_path = dir.path().join("main.bpp");
    std::fs::write(&main_path, "@include \"lib.bpp\"\n@FromLib x\n").unwrap();

    let compiler = Compiler::new(CompileOptions::default());
    let result = compiler
        .compile_file(main_path.to_str().unwrap())
        .expect("compiles");
    assert!(result.success, "diagnostics: {:?}", result.diagnostics);
    assert!(result.output.contains("declare -A bpp__FromLib____vTable"));
    assert!(result.output.contains("bpp__FromLib____new bpp__0__FromLib__x"));
}

#[test]
fn include_once_skips_duplicates() {
    use std::io::Write;

    let dir = tempfile::tempdir().expect("tempdir");
    let lib_path = dir.path().join("lib.bpp");
    let mut lib = std::fs::File::create(&lib_path).expect("create lib");
    writeln!(lib, "@class Once {{}}").unwrap();
    drop(lib);

    let main_path = dir.path().join("main.bpp");
    std::fs::write(
        &main_path,
        "@include_once \"lib.bpp\"\n@include_once \"lib.bpp\"\n",
    )
    .unwrap();

    let compiler = Compiler::new(CompileOptions::default());
    let result = compiler
        .compile_file(main_path.to_str().unwrap())
        .expect("compiles");
    assert!(result.success, "diagnostics: {:?}", result.diagnostics);
    let occurrences = result.output.matches("declare -A bpp__Once____vTable").count();
    assert_eq!(occurrences, 1);
}

#[test]
fn dynamic_include_emits_source_directive() {
    use std::io::Write;

    let dir = tempfile::tempdir().expect("tempdir");
    let lib_path = dir.path().join("lib.bpp");
    let mut lib = std::fs::File::create(&lib_path).expect("create lib");
    writeln!(lib, "@class Dyn {{}}").unwrap();
    drop(lib);

    let main_path = dir.path().join("main.bpp");
    std::fs::write(
        &main_path,
        "@include dynamic \"lib.bpp\" as \"/usr/lib/dyn.sh\"\n@Dyn d\n",
    )
    .unwrap();

    let compiler = Compiler::new(CompileOptions::default());
    let result = compiler
        .compile_file(main_path.to_str().unwrap())
        .expect("compiles");
    assert!(result.success, "diagnostics: {:?}", result.diagnostics);
    // Symbols resolve, but the class body is loaded at runtime
    assert!(result.output.contains("source \"/usr/lib/dyn.sh\""));
    assert!(!result.output.contains("declare -A bpp__Dyn____vTable"));
    assert!(result.output.contains("bpp__Dyn____new bpp__0__Dyn__d"));
}

#[test]
fn warnings_do_not_suppress_output() {
    let source = "\
@class A {}
@A a
@A* p = @dynamic_cast<A> @a
";
    let result = compile(source).expect("compiles");
    assert!(result.success, "diagnostics: {:?}", result.diagnostics);
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.severity == Severity::Warning && d.message.contains("toPrimitive")));
    assert!(!result.output.is_empty());
}
