//! End-to-end programs run through the public `vela::vm::Vm` API, one per
//! scenario in the design's testable-properties section. Each asserts on
//! exact captured stdout rather than on internal compiler/VM state.

use vela::vm::{InterpretResult, Vm};

fn run(src: &str) -> (InterpretResult, String) {
    let mut vm = Vm::new(Vec::new());
    let result = vm.interpret(src);
    (result, String::from_utf8(vm.into_output()).unwrap())
}

#[test]
fn arithmetic_precedence() {
    let (result, out) = run("print 1 + 2 * 3;");
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(out, "7\n");
}

#[test]
fn for_loop_accumulates() {
    let src = "var a = 0; for(var i = 0; i < 5; i = i + 1) a = a + i; print a;";
    let (result, out) = run(src);
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(out, "10\n");
}

#[test]
fn closure_over_mutable_upvalue_survives_scope_exit() {
    let src = "fun make(){var x=1; fun inc(){x=x+1; return x;} return inc;} \
               var f = make(); print f(); print f(); print f();";
    let (result, out) = run(src);
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(out, "2\n3\n4\n");
}

#[test]
fn class_init_and_bound_method() {
    let src = "class P{init(n){this.n=n;} greet(){print this.n;}} P(\"hi\").greet();";
    let (result, out) = run(src);
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(out, "hi\n");
}

#[test]
fn default_parameters_fill_trailing_args() {
    let src = "fun f(a, b=10, c=20){print a+b+c;} f(1); f(1,2); f(1,2,3);";
    let (result, out) = run(src);
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(out, "31\n23\n6\n");
}

#[test]
fn two_closures_share_one_upvalue() {
    let src = "fun make(){var x=0; fun get(){return x;} fun set(v){x=v;} \
               print get(); set(5); print get();} make();";
    let (result, out) = run(src);
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(out, "0\n5\n");
}

#[test]
fn undefined_variable_is_runtime_error() {
    let (result, _out) = run("print does_not_exist;");
    assert_eq!(result, InterpretResult::RuntimeError);
}

#[test]
fn invalid_assignment_target_is_compile_error() {
    let (result, _out) = run("1 + 2 = 3;");
    assert_eq!(result, InterpretResult::CompileError);
}

#[test]
fn wrong_arity_call_is_runtime_error() {
    let (result, _out) = run("fun f(a, b){return a+b;} f(1);");
    assert_eq!(result, InterpretResult::RuntimeError);
}

#[test]
fn calling_a_number_is_runtime_error() {
    let (result, _out) = run("var x = 1; x();");
    assert_eq!(result, InterpretResult::RuntimeError);
}
