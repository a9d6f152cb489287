//! Benchmarks for the fibril VM.
//!
//! Run with: `cargo bench` in the core/ directory.
//!
//! Benchmark groups:
//! 1. fib: recursive calls and arithmetic on a single fiber
//! 2. fibers: many fibers yielding every tick

use std::rc::Rc;

use bumpalo::Bump;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use fibril_core::ast::{AstBuilder, BinOp, Type};
use fibril_core::bindings::Globals;
use fibril_core::bytecode::Module;
use fibril_core::compiler::BytecodeCompiler;
use fibril_core::values::Val;
use fibril_core::vm::{Status, VM};

/// `int fib(int n) { if (n < 2) { return n } return fib(n - 1) + fib(n - 2) }`
fn fib_module(globals: &Globals) -> Module {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let n = b.var("n");
    let module = b.module(
        "bench",
        &[
            b.func(
                "fib",
                Type::Int,
                &[b.param("n", Type::Int)],
                &[
                    b.if_(b.binary(BinOp::Lt, n, b.num(2.0)), &[b.ret(n)]),
                    b.ret(b.add(
                        b.call("fib", &[b.sub(n, b.num(1.0))]),
                        b.call("fib", &[b.sub(n, b.num(2.0))]),
                    )),
                ],
            ),
            // A fiber that yields `n` times before finishing.
            b.func(
                "spin",
                Type::Void,
                &[b.param("n", Type::Int)],
                &[b.while_(
                    b.binary(BinOp::Gt, b.var("n"), b.num(0.0)),
                    &[
                        b.assign("n", b.sub(b.var("n"), b.num(1.0))),
                        b.eval(b.call("yield", &[])),
                    ],
                )],
            ),
        ],
    );
    BytecodeCompiler::compile(globals, &module).expect("benchmark module compiles")
}

fn new_vm() -> VM {
    let globals = Globals::with_builtins();
    let module = fib_module(&globals);
    let mut vm = VM::new(Rc::new(globals));
    vm.load_module(module).expect("module loads");
    vm
}

fn bench_fib(c: &mut Criterion) {
    let mut group = c.benchmark_group("fib");
    let mut vm = new_vm();

    for n in [10.0, 15.0, 20.0] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                vm.start_with("fib", vec![Val::Num(black_box(n))]).unwrap();
                while vm.tick().unwrap() == Status::Running {}
                black_box(vm.pop_value())
            })
        });
    }
    group.finish();
}

fn bench_fibers(c: &mut Criterion) {
    let mut group = c.benchmark_group("fibers");
    let mut vm = new_vm();

    for count in [10, 100, 1000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                for _ in 0..count {
                    vm.start_with("spin", vec![Val::Num(8.0)]).unwrap();
                }
                while vm.tick().unwrap() == Status::Running {}
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fib, bench_fibers);
criterion_main!(benches);
