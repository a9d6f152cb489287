//! End-to-end scenarios through the public `fibril` API.

use std::cell::RefCell;
use std::rc::Rc;

use bumpalo::Bump;
use fibril::{
    AstBuilder, BytecodeCompiler, CallCtx, Coroutine, Error, Globals, NativeFunc, Status, Type,
    VM, VmError, ast, render_error_to_string_no_color, types,
};
use pretty_assertions::assert_eq;

type Log = Rc<RefCell<Vec<String>>>;

/// Finishes `remaining` ticks after the tick it was called on.
struct Wait {
    remaining: u32,
}

impl Coroutine for Wait {
    fn tick(&mut self, _ctx: &mut CallCtx<'_>) -> Result<Status, VmError> {
        if self.remaining == 0 {
            return Ok(Status::Success);
        }
        self.remaining -= 1;
        Ok(Status::Running)
    }
}

fn game_globals() -> (Globals, Log) {
    let log: Log = Rc::default();
    let mut globals = Globals::with_builtins();

    let sink = log.clone();
    globals
        .define(NativeFunc::new(
            "log",
            types::VOID,
            &[("msg", types::STRING)],
            move |ctx| {
                let msg = ctx.pop_str()?;
                sink.borrow_mut().push(msg.to_string());
                Ok(None)
            },
        ))
        .unwrap();
    globals
        .define(NativeFunc::new(
            "wait",
            types::VOID,
            &[("ticks", types::FLOAT)],
            |ctx| {
                let ticks = ctx.pop_num()?;
                Ok(Some(Box::new(Wait {
                    remaining: ticks as u32,
                })))
            },
        ))
        .unwrap();
    globals
        .define(NativeFunc::new("explode", types::VOID, &[], |_| {
            Err(VmError::native("explode", "boom"))
        }))
        .unwrap();
    (globals, log)
}

fn load(globals: Globals, module: &ast::Module<'_>) -> VM {
    let compiled = BytecodeCompiler::compile(&globals, module).unwrap();
    let mut vm = VM::new(Rc::new(globals));
    vm.load_module(compiled).unwrap();
    vm
}

#[test]
fn first_finished_branch_ends_the_race() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let log = |msg| b.eval(b.call("log", &[b.string(msg)]));
    let wait = |n| b.eval(b.call("wait", &[b.num(n)]));
    let module = b.module(
        "race",
        &[b.func(
            "main",
            Type::Void,
            &[],
            &[
                b.defer(&[log("cleanup")]),
                b.paral(&[
                    b.seq(&[wait(3.0), log("timeout")]),
                    b.seq(&[wait(1.0), log("hit")]),
                ]),
                log("after"),
            ],
        )],
    );

    let (globals, trace) = game_globals();
    let mut vm = load(globals, &module);
    vm.start("main").unwrap();

    assert_eq!(vm.tick().unwrap(), Status::Running);
    assert!(trace.borrow().is_empty());
    assert_eq!(vm.tick().unwrap(), Status::Success);
    assert_eq!(*trace.borrow(), ["hit", "after", "cleanup"]);
    assert_eq!(vm.fibers_count(), 0);
    assert!(vm.pool_stats().is_balanced());
}

#[test]
fn a_faulting_fiber_leaves_the_others_running() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let module = b.module(
        "faults",
        &[
            b.func("idle", Type::Void, &[], &[b.eval(b.call("suspend", &[]))]),
            b.func("broken", Type::Void, &[], &[b.eval(b.call("explode", &[]))]),
        ],
    );

    let (globals, _) = game_globals();
    let mut vm = load(globals, &module);
    let idle = vm.start("idle").unwrap();
    let broken = vm.start("broken").unwrap();

    let err = Error::from(vm.tick().unwrap_err());
    assert_eq!(err.runtime_root(), Some(&VmError::native("explode", "boom")));
    assert!(vm.is_running(idle));
    assert!(!vm.is_running(broken));

    let report = render_error_to_string_no_color(&err);
    assert!(report.contains("native function `explode` failed: boom"), "{report}");
    assert!(report.contains(&format!("{broken:?}")), "{report}");

    assert_eq!(vm.tick().unwrap(), Status::Running);
    vm.stop(idle).unwrap();
    assert_eq!(vm.fibers_count(), 0);
}

#[test]
fn compile_and_bind_errors_render() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let module = b.module_in_file(
        "menu",
        "menu.fb",
        &[b.func("main", Type::Void, &[], &[b.eval(b.call("spawn", &[]))])],
    );
    let (mut globals, _) = game_globals();
    let err = Error::from(BytecodeCompiler::compile(&globals, &module).unwrap_err());
    let report = render_error_to_string_no_color(&err);
    assert!(report.contains("unknown function `spawn`"), "{report}");

    let dup = globals
        .define(NativeFunc::new("log", types::VOID, &[], |_| Ok(None)))
        .unwrap_err();
    let report = render_error_to_string_no_color(&Error::from(dup));
    assert!(report.contains("native function `log` is already defined"), "{report}");
}
