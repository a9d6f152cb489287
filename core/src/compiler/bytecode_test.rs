//! Tests for the bytecode compiler.

use bumpalo::Bump;
use pretty_assertions::assert_eq;

use crate::ast::{self, AstBuilder, BinOp, Type};
use crate::bindings::Globals;
use crate::bytecode::{
    BlockKind, CallKind, Const, FuncArgsInfo, Module, Opcode, ParamLayout, assemble, members,
};
use crate::compiler::{BytecodeCompiler, CompileError, CompileErrorKind};
use crate::symbols::{Symbol, types};
use crate::values::ValKind;
use crate::{ToString, Vec};

fn compile_ok(module: &ast::Module<'_>) -> Module {
    BytecodeCompiler::compile(&Globals::with_builtins(), module).unwrap()
}

fn compile_err(module: &ast::Module<'_>) -> CompileErrorKind {
    BytecodeCompiler::compile(&Globals::with_builtins(), module)
        .unwrap_err()
        .kind
}

fn nums(values: &[f64]) -> Vec<Const> {
    values.iter().map(|n| Const::Num(*n)).collect()
}

const NATIVE: u32 = CallKind::Native as u32;

#[test]
fn test_compile_arithmetic() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let module = b.module(
        "m",
        &[b.func(
            "test",
            Type::Int,
            &[],
            &[b.ret(b.mul(b.num(10.0), b.add(b.num(20.0), b.num(30.0))))],
        )],
    );
    let compiled = compile_ok(&module);

    // No locals, so no InitFrame. Every function ends with a bare Return.
    let expected = assemble(&[
        (Opcode::Constant, &[0]),
        (Opcode::Constant, &[1]),
        (Opcode::Constant, &[2]),
        (Opcode::Add, &[]),
        (Opcode::Mul, &[]),
        (Opcode::ReturnVal, &[]),
        (Opcode::Return, &[]),
    ]);
    assert_eq!(compiled.code, expected);
    assert_eq!(compiled.constants, nums(&[10.0, 20.0, 30.0]));
    assert_eq!(compiled.func_offset("test"), Some(0));
    assert!(compiled.init_code.is_empty());
}

#[test]
fn test_compile_identical_literals_share_a_constant() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let sum = |lhs, rhs| {
        let module = b.module(
            "m",
            &[b.func("test", Type::Int, &[], &[b.ret(b.add(b.num(lhs), b.num(rhs)))])],
        );
        compile_ok(&module)
    };

    let same = sum(10.0, 10.0);
    assert_eq!(same.constants, nums(&[10.0]));
    assert_eq!(
        same.code,
        assemble(&[
            (Opcode::Constant, &[0]),
            (Opcode::Constant, &[0]),
            (Opcode::Add, &[]),
            (Opcode::ReturnVal, &[]),
            (Opcode::Return, &[]),
        ])
    );
    assert_eq!(sum(10.0, 20.0).constants, nums(&[10.0, 20.0]));
}

#[test]
fn test_compile_locals_share_constants() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let module = b.module(
        "m",
        &[b.func(
            "test",
            Type::Int,
            &[],
            &[
                b.define("a", Type::Int, b.num(2.0)),
                b.assign("a", b.mul(b.var("a"), b.num(2.0))),
                b.ret(b.var("a")),
            ],
        )],
    );
    let compiled = compile_ok(&module);

    let expected = assemble(&[
        (Opcode::InitFrame, &[1]),
        (Opcode::Constant, &[0]),
        (Opcode::SetVar, &[0]),
        (Opcode::GetVar, &[0]),
        (Opcode::Constant, &[0]),
        (Opcode::Mul, &[]),
        (Opcode::SetVar, &[0]),
        (Opcode::GetVar, &[0]),
        (Opcode::ReturnVal, &[]),
        (Opcode::Return, &[]),
    ]);
    assert_eq!(compiled.code, expected);
    assert_eq!(compiled.constants, nums(&[2.0]));
}

#[test]
fn test_compile_declaration_without_value() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let module = b.module(
        "m",
        &[b.func(
            "test",
            Type::Void,
            &[],
            &[b.declare("flag", Type::Bool), b.declare("name", Type::Str)],
        )],
    );
    let compiled = compile_ok(&module);

    let expected = assemble(&[
        (Opcode::InitFrame, &[2]),
        (Opcode::DeclVar, &[0, crate::values::ValKind::Bool as u32]),
        (Opcode::DeclVar, &[1, crate::values::ValKind::Str as u32]),
        (Opcode::Return, &[]),
    ]);
    assert_eq!(compiled.code, expected);
}

#[test]
fn test_compile_while_loop() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let module = b.module(
        "m",
        &[b.func(
            "test",
            Type::Void,
            &[],
            &[
                b.define("i", Type::Int, b.num(10.0)),
                b.while_(
                    b.binary(BinOp::Gt, b.var("i"), b.num(0.0)),
                    &[b.assign("i", b.sub(b.var("i"), b.num(1.0)))],
                ),
            ],
        )],
    );
    let compiled = compile_ok(&module);

    // Offsets: the loop head is at 6, CondJump ends at 13, LoopJump at 22.
    let expected = assemble(&[
        (Opcode::InitFrame, &[1]),
        (Opcode::Constant, &[0]),
        (Opcode::SetVar, &[0]),
        (Opcode::GetVar, &[0]),
        (Opcode::Constant, &[1]),
        (Opcode::Greater, &[]),
        (Opcode::CondJump, &[9]),
        (Opcode::GetVar, &[0]),
        (Opcode::Constant, &[2]),
        (Opcode::Sub, &[]),
        (Opcode::SetVar, &[0]),
        (Opcode::LoopJump, &[16]),
        (Opcode::Return, &[]),
    ]);
    assert_eq!(compiled.code, expected);
}

#[test]
fn test_compile_if_else() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let module = b.module(
        "m",
        &[b.func(
            "test",
            Type::Void,
            &[],
            &[
                b.define("a", Type::Int, b.num(0.0)),
                b.if_else(
                    b.boolean(true),
                    &[b.assign("a", b.num(1.0))],
                    &[b.assign("a", b.num(2.0))],
                ),
            ],
        )],
    );
    let compiled = compile_ok(&module);

    let expected = assemble(&[
        (Opcode::InitFrame, &[1]),
        (Opcode::Constant, &[0]),
        (Opcode::SetVar, &[0]),
        (Opcode::Constant, &[1]),
        (Opcode::CondJump, &[6]),
        (Opcode::Constant, &[2]),
        (Opcode::SetVar, &[0]),
        (Opcode::Jump, &[4]),
        (Opcode::Constant, &[3]),
        (Opcode::SetVar, &[0]),
        (Opcode::Return, &[]),
    ]);
    assert_eq!(compiled.code, expected);
    assert_eq!(compiled.constants[1], Const::Bool(true));
}

#[test]
fn test_compile_else_if_chain() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let gt = |lhs, rhs| b.binary(BinOp::Gt, lhs, rhs);
    let module = b.module(
        "m",
        &[b.func(
            "test",
            Type::Int,
            &[],
            &[
                b.define("x1", Type::Int, b.num(0.0)),
                b.if_chain(
                    &[
                        (gt(b.num(0.0), b.num(1.0)), &[b.assign("x1", b.num(10.0))][..]),
                        (gt(b.neg(b.num(1.0)), b.num(1.0)), &[b.assign("x1", b.num(30.0))][..]),
                        (gt(b.num(3.0), b.num(1.0)), &[b.assign("x1", b.num(20.0))][..]),
                    ],
                    Some(&[b.assign("x1", b.num(40.0))][..]),
                ),
                b.ret(b.var("x1")),
            ],
        )],
    );
    let compiled = compile_ok(&module);

    // Each branch jumps to the exit jump of the next one; the last exit
    // jump skips the else body.
    let expected = assemble(&[
        (Opcode::InitFrame, &[1]),
        (Opcode::Constant, &[0]),
        (Opcode::SetVar, &[0]),
        (Opcode::Constant, &[0]),
        (Opcode::Constant, &[1]),
        (Opcode::Greater, &[]),
        (Opcode::CondJump, &[6]),
        (Opcode::Constant, &[2]),
        (Opcode::SetVar, &[0]),
        (Opcode::Jump, &[12]),
        (Opcode::Constant, &[1]),
        (Opcode::UnaryNeg, &[]),
        (Opcode::Constant, &[1]),
        (Opcode::Greater, &[]),
        (Opcode::CondJump, &[6]),
        (Opcode::Constant, &[3]),
        (Opcode::SetVar, &[0]),
        (Opcode::Jump, &[11]),
        (Opcode::Constant, &[4]),
        (Opcode::Constant, &[1]),
        (Opcode::Greater, &[]),
        (Opcode::CondJump, &[6]),
        (Opcode::Constant, &[5]),
        (Opcode::SetVar, &[0]),
        (Opcode::Jump, &[4]),
        (Opcode::Constant, &[6]),
        (Opcode::SetVar, &[0]),
        (Opcode::GetVar, &[0]),
        (Opcode::ReturnVal, &[]),
        (Opcode::Return, &[]),
    ]);
    assert_eq!(compiled.code, expected);
    assert_eq!(
        compiled.constants,
        nums(&[0.0, 1.0, 10.0, 30.0, 3.0, 20.0, 40.0])
    );
}

#[test]
fn test_compile_foreach_loop() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let ints = b.array_of(Type::Int);
    let module = b.module(
        "m",
        &[b.func(
            "test",
            Type::Int,
            &[],
            &[
                b.define("arr", ints, b.new_obj(ints)),
                b.eval(b.method(b.var("arr"), ints, "Add", &[b.num(1.0)])),
                b.eval(b.method(b.var("arr"), ints, "Add", &[b.num(3.0)])),
                b.define("accum", Type::Int, b.num(0.0)),
                b.foreach(
                    Type::Int,
                    "a",
                    b.var("arr"),
                    &[b.assign("accum", b.add(b.var("accum"), b.var("a")))],
                ),
                b.ret(b.var("accum")),
            ],
        )],
    );
    let compiled = compile_ok(&module);

    let array = types::ARRAY.id();
    let num = ValKind::Num as u32;
    // Slots: arr 0, accum 1, a 2, then the hidden array copy 3 and counter 4.
    let setup = assemble(&[
        (Opcode::InitFrame, &[5]),
        (Opcode::New, &[array]),
        (Opcode::SetVar, &[0]),
        (Opcode::GetVar, &[0]),
        (Opcode::Constant, &[0]),
        (Opcode::MCall, &[array, members::array::ADD]),
        (Opcode::GetVar, &[0]),
        (Opcode::Constant, &[1]),
        (Opcode::MCall, &[array, members::array::ADD]),
        (Opcode::Constant, &[2]),
        (Opcode::SetVar, &[1]),
        (Opcode::GetVar, &[0]),
        (Opcode::SetVar, &[3]),
        (Opcode::DeclVar, &[4, num]),
        (Opcode::DeclVar, &[2, num]),
    ]);
    let check = assemble(&[
        (Opcode::GetVar, &[4]),
        (Opcode::GetVar, &[3]),
        (Opcode::GetMVar, &[array, members::array::COUNT]),
        (Opcode::Less, &[]),
    ]);
    let pass = assemble(&[
        (Opcode::GetVar, &[3]),
        (Opcode::GetVar, &[4]),
        (Opcode::MCall, &[array, members::array::AT]),
        (Opcode::SetVar, &[2]),
        (Opcode::GetVar, &[1]),
        (Opcode::GetVar, &[2]),
        (Opcode::Add, &[]),
        (Opcode::SetVar, &[1]),
        (Opcode::Inc, &[4]),
    ]);
    // `CondJump` skips the pass and the two-byte `LoopJump`, which jumps back
    // over everything from the counter check on.
    let skip = (pass.len() + 2) as u32;
    let back = (check.len() + 2 + pass.len() + 2) as u32;
    let expected = [
        setup,
        check,
        assemble(&[(Opcode::CondJump, &[skip])]),
        pass,
        assemble(&[
            (Opcode::LoopJump, &[back]),
            (Opcode::GetVar, &[1]),
            (Opcode::ReturnVal, &[]),
            (Opcode::Return, &[]),
        ]),
    ]
    .concat();
    assert_eq!(compiled.code, expected);
    assert_eq!(compiled.constants, nums(&[1.0, 3.0, 0.0]));
}

#[test]
fn test_compile_default_arguments() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let module = b.module(
        "m",
        &[
            b.func(
                "f",
                Type::Int,
                &[
                    b.param("a", Type::Int),
                    b.param_default("b", Type::Int, b.num(2.0)),
                ],
                &[b.ret(b.add(b.var("a"), b.var("b")))],
            ),
            b.func("test", Type::Int, &[], &[b.ret(b.call("f", &[b.num(1.0)]))]),
        ],
    );
    let compiled = compile_ok(&module);

    let mut info = FuncArgsInfo::new(1).unwrap();
    info.use_default(0);

    // `f` takes its args info in the slot after its parameters.
    let f = assemble(&[
        (Opcode::InitFrame, &[3]),
        (Opcode::ArgVar, &[2]),
        (Opcode::ArgVar, &[0]),
        (Opcode::DefArg, &[0, 2]),
        (Opcode::Constant, &[0]),
        (Opcode::ArgVar, &[1]),
        (Opcode::GetVar, &[0]),
        (Opcode::GetVar, &[1]),
        (Opcode::Add, &[]),
        (Opcode::ReturnVal, &[]),
        (Opcode::Return, &[]),
    ]);
    let test = assemble(&[
        (Opcode::Constant, &[1]),
        (Opcode::Call, &[CallKind::Func as u32, 0, info.bits()]),
        (Opcode::ReturnVal, &[]),
        (Opcode::Return, &[]),
    ]);
    assert_eq!(&compiled.code[..f.len()], &f[..]);
    assert_eq!(&compiled.code[f.len()..], &test[..]);
    assert_eq!(compiled.func_offset("test"), Some(f.len() as u32));
    assert_eq!(compiled.params(0), Some(ParamLayout { count: 2, defaults: 0b10 }));
    assert!(compiled.takes_args_info(0));
    assert_eq!(compiled.params(f.len() as u32), Some(ParamLayout::default()));
    assert!(!compiled.takes_args_info(f.len() as u32));
}

#[test]
fn test_compile_lambda_with_capture() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let module = b.module(
        "m",
        &[b.func(
            "test",
            Type::Int,
            &[],
            &[
                b.define("a", Type::Int, b.num(30.0)),
                b.define(
                    "f",
                    b.func_of(Type::Int),
                    b.lambda(
                        Type::Int,
                        &[b.param("b", Type::Int)],
                        &[b.ret(b.add(b.var("a"), b.var("b")))],
                    ),
                ),
                b.ret(b.call("f", &[b.num(5.0)])),
            ],
        )],
    );
    let compiled = compile_ok(&module);

    // The lambda body sits inline at offset 8, jumped over. `a` becomes
    // slot 1 of the lambda frame, bound from slot 0 of `test`.
    let expected = assemble(&[
        (Opcode::InitFrame, &[2]),
        (Opcode::Constant, &[0]),
        (Opcode::SetVar, &[0]),
        (Opcode::Jump, &[10]),
        (Opcode::Nop, &[]),
        (Opcode::ArgVar, &[0]),
        (Opcode::GetVar, &[1]),
        (Opcode::GetVar, &[0]),
        (Opcode::Add, &[]),
        (Opcode::ReturnVal, &[]),
        (Opcode::Return, &[]),
        (Opcode::Lambda, &[8, 2]),
        (Opcode::UseUpval, &[0, 1]),
        (Opcode::SetVar, &[1]),
        (Opcode::Constant, &[1]),
        (
            Opcode::Call,
            &[CallKind::Var as u32, 1, FuncArgsInfo::new(1).unwrap().bits()],
        ),
        (Opcode::ReturnVal, &[]),
        (Opcode::Return, &[]),
    ]);
    assert_eq!(compiled.code, expected);
}

#[test]
fn test_compile_void_call_through_array_element() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let callbacks = b.array_of(b.func_of(Type::Void));
    let first = b.method(b.var("fs"), callbacks, "At", &[b.num(0.0)]);
    let module = b.module(
        "m",
        &[b.func(
            "test",
            Type::Void,
            &[],
            &[
                b.define(
                    "fs",
                    callbacks,
                    b.json_arr(callbacks, &[b.lambda(Type::Void, &[], &[])]),
                ),
                b.eval(b.call_value(first, Type::Void, &[])),
            ],
        )],
    );
    let compiled = compile_ok(&module);

    let array = types::ARRAY.id();
    let prologue: [(Opcode, &[u32]); 3] = [
        (Opcode::InitFrame, &[1]),
        (Opcode::New, &[array]),
        (Opcode::Jump, &[2]),
    ];
    let lambda_start = assemble(&prologue).len() as u32;
    // The call leaves nothing behind, so no `PopValue` follows it.
    let expected = assemble(&[
        prologue[0],
        prologue[1],
        prologue[2],
        (Opcode::Nop, &[]),
        (Opcode::Return, &[]),
        (Opcode::Lambda, &[lambda_start, 0]),
        (Opcode::MCall, &[array, members::array::ADD_INPLACE]),
        (Opcode::SetVar, &[0]),
        (Opcode::GetVar, &[0]),
        (Opcode::Constant, &[0]),
        (Opcode::MCall, &[array, members::array::AT]),
        (Opcode::Call, &[CallKind::Stack as u32, 0, 0]),
        (Opcode::Return, &[]),
    ]);
    assert_eq!(compiled.code, expected);
}

#[test]
fn test_compile_paral_wraps_bare_branches() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let yield_ = b.eval(b.call("yield", &[]));
    let module = b.module(
        "m",
        &[b.func(
            "test",
            Type::Void,
            &[],
            &[b.paral(&[b.seq(&[yield_]), yield_])],
        )],
    );
    let compiled = compile_ok(&module);

    let expected = assemble(&[
        (Opcode::Block, &[BlockKind::Paral as u32, 14]),
        (Opcode::Block, &[BlockKind::Seq as u32, 4]),
        (Opcode::Call, &[NATIVE, 0, 0]),
        (Opcode::Block, &[BlockKind::Seq as u32, 4]),
        (Opcode::Call, &[NATIVE, 0, 0]),
        (Opcode::Return, &[]),
    ]);
    assert_eq!(compiled.code, expected);
}

#[test]
fn test_compile_defer_and_yield_while() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let module = b.module(
        "m",
        &[b.func(
            "test",
            Type::Void,
            &[],
            &[
                b.defer(&[b.eval(b.call("suspend", &[]))]),
                b.yield_while(b.boolean(true)),
            ],
        )],
    );
    let compiled = compile_ok(&module);

    let expected = assemble(&[
        (Opcode::Block, &[BlockKind::Defer as u32, 4]),
        (Opcode::Call, &[NATIVE, 1, 0]),
        (Opcode::Constant, &[0]),
        (Opcode::CondJump, &[6]),
        (Opcode::Call, &[NATIVE, 0, 0]),
        (Opcode::LoopJump, &[10]),
        (Opcode::Return, &[]),
    ]);
    assert_eq!(compiled.code, expected);
}

#[test]
fn test_compile_class_registration() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let bar = b.class_type("Bar");
    let module = b.module(
        "m",
        &[
            // Children may come first; registration is emitted parents first.
            b.class("Bar", Some("Foo"), &[("B", Type::Str)]),
            b.class("Foo", None, &[("A", Type::Int)]),
            b.func(
                "test",
                Type::Str,
                &[],
                &[b.ret(b.member(b.new_obj(bar), bar, "B"))],
            ),
        ],
    );
    let compiled = compile_ok(&module);

    let (foo, bar) = (Symbol::new("Foo"), Symbol::new("Bar"));
    let init = assemble(&[
        (Opcode::ClassBegin, &[foo.id(), Symbol::NONE.id()]),
        (Opcode::ClassMember, &[types::INT.id(), Symbol::new("A").id()]),
        (Opcode::ClassEnd, &[]),
        (Opcode::ClassBegin, &[bar.id(), foo.id()]),
        (Opcode::ClassMember, &[types::STRING.id(), Symbol::new("B").id()]),
        (Opcode::ClassEnd, &[]),
    ]);
    assert_eq!(compiled.init_code, init);

    // `B` follows the inherited `A`.
    let code = assemble(&[
        (Opcode::New, &[bar.id()]),
        (Opcode::GetMVar, &[bar.id(), 1]),
        (Opcode::ReturnVal, &[]),
        (Opcode::Return, &[]),
    ]);
    assert_eq!(compiled.code, code);
}

// === Errors ===

#[test]
fn test_call_errors() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let f = b.func(
        "f",
        Type::Void,
        &[b.param("a", Type::Int)],
        &[],
    );
    let calling = |call| b.module("m", &[f, b.func("test", Type::Void, &[], &[b.eval(call)])]);

    assert_eq!(
        compile_err(&calling(b.call("nope", &[]))),
        CompileErrorKind::UnknownFunction("nope".into())
    );
    assert_eq!(
        compile_err(&calling(b.call("f", &[b.num(1.0), b.num(2.0)]))),
        CompileErrorKind::ArgCount {
            name: "f".into(),
            expected: 1,
            found: 2
        }
    );
    assert_eq!(
        compile_err(&calling(b.call("f", &[]))),
        CompileErrorKind::MissingArg {
            name: "f".into(),
            param: "a".into()
        }
    );
    assert_eq!(
        compile_err(&calling(b.call_args("f", &[b.named("z", b.num(1.0))]))),
        CompileErrorKind::UnknownParam {
            name: "f".into(),
            param: "z".into()
        }
    );
    assert_eq!(
        compile_err(&calling(b.call("yield", &[b.num(1.0)]))),
        CompileErrorKind::ArgCount {
            name: "yield".into(),
            expected: 0,
            found: 1
        }
    );
    assert_eq!(
        compile_err(&calling(b.var("yield"))),
        CompileErrorKind::NativeAsValue("yield".into())
    );
}

#[test]
fn test_named_argument_given_twice() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let module = b.module(
        "m",
        &[
            b.func(
                "f",
                Type::Void,
                &[
                    b.param("a", Type::Int),
                    b.param_default("b", Type::Int, b.num(0.0)),
                ],
                &[],
            ),
            b.func(
                "test",
                Type::Void,
                &[],
                &[b.eval(b.call_args(
                    "f",
                    &[b.arg(b.num(1.0)), b.named("a", b.num(2.0))],
                ))],
            ),
        ],
    );
    assert_eq!(
        compile_err(&module),
        CompileErrorKind::DuplicateArg {
            name: "f".into(),
            param: "a".into()
        }
    );
}

#[test]
fn test_declaration_errors() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let empty = b.func("f", Type::Void, &[], &[]);
    assert_eq!(
        compile_err(&b.module("m", &[empty, empty])),
        CompileErrorKind::DuplicateFunction("f".into())
    );

    let twice = b.func(
        "f",
        Type::Void,
        &[],
        &[b.declare("x", Type::Int), b.declare("x", Type::Int)],
    );
    assert_eq!(
        compile_err(&b.module("m", &[twice])),
        CompileErrorKind::DuplicateVariable("x".into())
    );

    // Inner scopes may shadow.
    let shadow = b.func(
        "f",
        Type::Void,
        &[],
        &[
            b.declare("x", Type::Int),
            b.seq(&[b.declare("x", Type::Str)]),
        ],
    );
    compile_ok(&b.module("m", &[shadow]));

    let unknown = b.func("f", Type::Void, &[], &[b.assign("y", b.num(1.0))]);
    assert_eq!(
        compile_err(&b.module("m", &[unknown])),
        CompileErrorKind::UnknownSymbol("y".into())
    );
}

#[test]
fn test_class_errors() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let cyclic = b.module(
        "m",
        &[
            b.class("A", Some("B"), &[]),
            b.class("B", Some("A"), &[]),
        ],
    );
    assert_eq!(compile_err(&cyclic), CompileErrorKind::CyclicClass("A".into()));

    let orphan = b.module("m", &[b.class("A", Some("Missing"), &[])]);
    assert_eq!(compile_err(&orphan), CompileErrorKind::UnknownClass("Missing".into()));

    let foo = b.class_type("Foo");
    let missing_field = b.module(
        "m",
        &[
            b.class("Foo", None, &[("A", Type::Int)]),
            b.func(
                "test",
                Type::Int,
                &[],
                &[b.ret(b.member(b.new_obj(foo), foo, "Z"))],
            ),
        ],
    );
    assert_eq!(
        compile_err(&missing_field),
        CompileErrorKind::UnknownField {
            class: "Foo".into(),
            field: "Z".into()
        }
    );

    let redeclared_field = b.module(
        "m",
        &[
            b.class("Foo", None, &[("A", Type::Int)]),
            b.class("Bar", Some("Foo"), &[("A", Type::Str)]),
        ],
    );
    assert_eq!(
        compile_err(&redeclared_field),
        CompileErrorKind::DuplicateVariable("A".into())
    );
}

#[test]
fn test_block_errors() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let in_defer = b.module(
        "m",
        &[b.func("test", Type::Void, &[], &[b.defer(&[b.ret_void()])])],
    );
    assert_eq!(compile_err(&in_defer), CompileErrorKind::ReturnInDefer);

    let lambda = b.lambda(
        Type::Int,
        &[b.param_default("x", Type::Int, b.num(1.0))],
        &[b.ret(b.var("x"))],
    );
    let with_default = b.module(
        "m",
        &[b.func("test", Type::Void, &[], &[b.eval(lambda)])],
    );
    assert_eq!(compile_err(&with_default), CompileErrorKind::LambdaDefault("x".into()));

    // Without builtins there is no `yield` to poll with.
    let polling = b.module(
        "m",
        &[b.func("test", Type::Void, &[], &[b.yield_while(b.boolean(true))])],
    );
    let err = BytecodeCompiler::compile(&Globals::new(), &polling).unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::MissingYield);
}

#[test]
fn test_errors_carry_the_source_file() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let module = b.module_in_file(
        "m",
        "main.fb",
        &[b.func("test", Type::Void, &[], &[b.eval(b.call("nope", &[]))])],
    );
    let err = BytecodeCompiler::compile(&Globals::with_builtins(), &module).unwrap_err();
    assert_eq!(
        err,
        CompileError::new(Some("main.fb"), CompileErrorKind::UnknownFunction("nope".into()))
    );
    assert_eq!(err.to_string(), "main.fb: unknown function `nope`");
}
