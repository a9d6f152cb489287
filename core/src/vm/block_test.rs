use bumpalo::Bump;
use pretty_assertions::assert_eq;

use crate::ast::{self, AstBuilder, BinOp, Stmt, Type};
use crate::bindings::Globals;
use crate::test_utils::{bind_trace, common_checks, make_vm};
use crate::values::Val;
use crate::vm::{Status, VmError};
use crate::String;

struct Outcome {
    trace: String,
    ticks: usize,
    result: Option<Val>,
}

/// Runs `test` to completion with `trace` bound.
fn run_traced(module: &ast::Module<'_>) -> Outcome {
    let mut globals = Globals::with_builtins();
    let trace = bind_trace(&mut globals);
    let mut vm = make_vm(globals, module);
    vm.start("test").unwrap();

    let mut ticks = 1;
    while vm.tick().unwrap() == Status::Running {
        ticks += 1;
        assert!(ticks < 1_000, "fiber never finished");
    }
    let result = vm.pop_value();
    common_checks(&vm);
    let trace = trace.borrow().clone();
    Outcome {
        trace,
        ticks,
        result,
    }
}

fn trace<'a>(b: &AstBuilder<'a>, msg: &str) -> Stmt<'a> {
    b.eval(b.call("trace", &[b.string(msg)]))
}

fn yield_<'a>(b: &AstBuilder<'a>) -> Stmt<'a> {
    b.eval(b.call("yield", &[]))
}

fn suspend<'a>(b: &AstBuilder<'a>) -> Stmt<'a> {
    b.eval(b.call("suspend", &[]))
}

fn test_func<'a>(b: &AstBuilder<'a>, ret: Type<'a>, body: &[Stmt<'a>]) -> ast::Module<'a> {
    b.module("test", &[b.func("test", ret, &[], body)])
}

// === paral / paral_all ===

#[test]
fn paral_ends_with_its_first_branch() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let module = test_func(
        &b,
        Type::Void,
        &[
            b.paral(&[
                b.seq(&[yield_(&b), trace(&b, "a")]),
                b.seq(&[yield_(&b), yield_(&b), trace(&b, "b")]),
            ]),
            trace(&b, "end"),
        ],
    );
    let outcome = run_traced(&module);
    assert_eq!(outcome.ticks, 2);
    assert_eq!(outcome.trace, "aend");
}

#[test]
fn paral_all_waits_for_every_branch() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let module = test_func(
        &b,
        Type::Void,
        &[
            b.paral_all(&[
                b.seq(&[yield_(&b), trace(&b, "a")]),
                b.seq(&[yield_(&b), yield_(&b), trace(&b, "b")]),
            ]),
            trace(&b, "end"),
        ],
    );
    let outcome = run_traced(&module);
    assert_eq!(outcome.ticks, 3);
    assert_eq!(outcome.trace, "abend");
}

#[test]
fn branches_share_the_frame_locals() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let bump = |by| b.assign("n", b.add(b.var("n"), b.num(by)));
    let module = test_func(
        &b,
        Type::Int,
        &[
            b.define("n", Type::Int, b.num(0.0)),
            // Bare statements become single-statement branches.
            b.paral_all(&[bump(1.0), bump(10.0)]),
            b.ret(b.var("n")),
        ],
    );
    assert_eq!(run_traced(&module).result, Some(Val::Num(11.0)));
}

#[test]
fn yield_while_polls_a_sibling_branch() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let module = test_func(
        &b,
        Type::Int,
        &[
            b.define("i", Type::Int, b.num(0.0)),
            b.paral(&[
                b.seq(&[b.yield_while(b.binary(BinOp::Lt, b.var("i"), b.num(3.0)))]),
                b.seq(&[b.while_(
                    b.boolean(true),
                    &[b.assign("i", b.add(b.var("i"), b.num(1.0))), yield_(&b)],
                )]),
            ]),
            b.ret(b.var("i")),
        ],
    );

    let mut vm = make_vm(Globals::with_builtins(), &module);
    vm.start("test").unwrap();
    for _ in 0..3 {
        assert_eq!(vm.tick().unwrap(), Status::Running);
    }
    assert_eq!(vm.tick().unwrap(), Status::Success);
    assert_eq!(vm.pop_value(), Some(Val::Num(3.0)));
    common_checks(&vm);
}

#[test]
fn return_inside_a_branch_returns_from_the_function() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let module = test_func(
        &b,
        Type::Int,
        &[
            b.defer(&[trace(&b, "out")]),
            b.paral(&[
                b.seq(&[suspend(&b)]),
                b.seq(&[yield_(&b), b.ret(b.num(5.0))]),
            ]),
            trace(&b, "unreachable"),
            b.ret(b.num(0.0)),
        ],
    );
    let outcome = run_traced(&module);
    assert_eq!(outcome.result, Some(Val::Num(5.0)));
    assert_eq!(outcome.trace, "out");
    assert_eq!(outcome.ticks, 2);
}

#[test]
fn nested_paral_blocks_tick_together() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let module = test_func(
        &b,
        Type::Void,
        &[b.paral_all(&[
            b.seq(&[
                b.paral(&[b.seq(&[suspend(&b)]), b.seq(&[yield_(&b)])]),
                trace(&b, "inner"),
            ]),
            b.seq(&[trace(&b, "other")]),
        ])],
    );
    let outcome = run_traced(&module);
    assert_eq!(outcome.trace, "otherinner");
    assert_eq!(outcome.ticks, 2);
}

// === defer ===

#[test]
fn defers_run_in_reverse_when_their_scope_ends() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let module = test_func(
        &b,
        Type::Void,
        &[
            b.defer(&[trace(&b, "hey")]),
            b.seq(&[
                b.defer(&[trace(&b, "foo")]),
                b.defer(&[trace(&b, "bar")]),
                trace(&b, "wow"),
            ]),
        ],
    );
    assert_eq!(run_traced(&module).trace, "wowbarfoohey");
}

#[test]
fn defers_see_the_latest_locals() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let module = test_func(
        &b,
        Type::Void,
        &[
            b.define("a", Type::Int, b.num(1.0)),
            b.defer(&[b.eval(b.call("trace", &[b.cast(Type::Str, b.var("a"))]))]),
            b.assign("a", b.num(2.0)),
        ],
    );
    assert_eq!(run_traced(&module).trace, "2");
}

#[test]
fn branch_and_loop_bodies_scope_their_defers() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let module = test_func(
        &b,
        Type::Void,
        &[
            b.if_(
                b.boolean(true),
                &[b.defer(&[trace(&b, "x")]), trace(&b, "y")],
            ),
            b.for_(
                &[b.define("i", Type::Int, b.num(0.0))],
                b.binary(BinOp::Lt, b.var("i"), b.num(2.0)),
                &[b.assign("i", b.add(b.var("i"), b.num(1.0)))],
                &[b.defer(&[trace(&b, "d")]), trace(&b, "i")],
            ),
            trace(&b, "z"),
        ],
    );
    assert_eq!(run_traced(&module).trace, "yxididz");
}

#[test]
fn returning_runs_the_defers_of_every_frame() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let module = b.module(
        "test",
        &[
            b.func(
                "inner",
                Type::Int,
                &[],
                &[b.defer(&[trace(&b, "f")]), b.ret(b.num(1.0))],
            ),
            b.func(
                "test",
                Type::Int,
                &[],
                &[
                    b.defer(&[trace(&b, "t")]),
                    b.define("x", Type::Int, b.call("inner", &[])),
                    trace(&b, "m"),
                    b.ret(b.var("x")),
                ],
            ),
        ],
    );
    let outcome = run_traced(&module);
    assert_eq!(outcome.trace, "fmt");
    assert_eq!(outcome.result, Some(Val::Num(1.0)));
}

#[test]
fn paral_defers_run_after_the_winner() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let module = test_func(
        &b,
        Type::Void,
        &[
            b.paral(&[
                b.defer(&[trace(&b, "d")]),
                b.seq(&[trace(&b, "a"), yield_(&b), trace(&b, "x")]),
                b.seq(&[trace(&b, "b")]),
            ]),
            trace(&b, "end"),
        ],
    );
    let outcome = run_traced(&module);
    assert_eq!(outcome.trace, "abdend");
    assert_eq!(outcome.ticks, 1);
}

#[test]
fn aborted_branches_run_their_defers() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let module = test_func(
        &b,
        Type::Void,
        &[b.paral(&[
            b.seq(&[b.defer(&[trace(&b, "1")]), suspend(&b)]),
            b.seq(&[yield_(&b), trace(&b, "2")]),
        ])],
    );
    let outcome = run_traced(&module);
    assert_eq!(outcome.trace, "21");
    assert_eq!(outcome.ticks, 2);
}

#[test]
fn stopping_a_fiber_runs_its_defers() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let module = test_func(
        &b,
        Type::Void,
        &[
            b.defer(&[trace(&b, "bye")]),
            b.paral(&[b.seq(&[b.defer(&[trace(&b, "branch ")]), suspend(&b)])]),
        ],
    );
    let mut globals = Globals::with_builtins();
    let log = bind_trace(&mut globals);
    let mut vm = make_vm(globals, &module);
    let id = vm.start("test").unwrap();
    assert_eq!(vm.tick().unwrap(), Status::Running);
    assert_eq!(*log.borrow(), "");

    vm.stop(id).unwrap();
    assert_eq!(*log.borrow(), "branch bye");
    common_checks(&vm);
}

#[test]
fn a_suspending_defer_faults_the_fiber() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let module = test_func(&b, Type::Void, &[b.defer(&[yield_(&b)])]);
    let mut vm = make_vm(Globals::with_builtins(), &module);
    let id = vm.start("test").unwrap();

    let err = vm.tick().unwrap_err();
    assert_eq!(
        err,
        VmError::Fiber {
            id,
            source: crate::Box::new(VmError::DeferSuspended),
        }
    );
    assert_eq!(vm.fibers_count(), 0);
    common_checks(&vm);
}
