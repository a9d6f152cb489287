//! Fibril - cooperative fibers for game and simulation scripts
//!
//! # Overview
//!
//! Fibril compiles a small statically typed scripting language to compact
//! bytecode and runs it on a VM that interleaves many fibers, one tick at a
//! time. Scripts express concurrency with structured blocks:
//!
//! - `seq { ... }` runs statements in order inside its own cleanup scope
//! - `paral { ... }` runs every branch each tick and ends with the first one
//! - `paral_all { ... }` ends once every branch has finished
//! - `defer { ... }` runs when the enclosing scope ends, however it ends
//!
//! # Quick Start
//!
//! ```ignore
//! use std::rc::Rc;
//! use bumpalo::Bump;
//! use fibril::{AstBuilder, BytecodeCompiler, Globals, Status, Type, VM};
//!
//! // The front-end hands over a typed AST allocated in an arena.
//! let arena = Bump::new();
//! let b = AstBuilder::new(&arena);
//! let module = b.module("game", &[b.func(
//!     "main",
//!     Type::Int,
//!     &[],
//!     &[b.eval(b.call("yield", &[])), b.ret(b.num(42.0))],
//! )]);
//!
//! let globals = Globals::with_builtins();
//! let compiled = BytecodeCompiler::compile(&globals, &module)?;
//!
//! let mut vm = VM::new(Rc::new(globals));
//! vm.load_module(compiled)?;
//! vm.start("main")?;
//! while vm.tick()? == Status::Running {}
//! assert_eq!(vm.pop_value().and_then(|v| v.as_num()), Some(42.0));
//! ```
//!
//! # Host Interop
//!
//! Register native functions and classes on [`Globals`] before compiling:
//!
//! ```ignore
//! use fibril::{Globals, NativeFunc, types};
//!
//! let mut globals = Globals::with_builtins();
//! globals.define(NativeFunc::new("log", types::VOID, &[("msg", types::STRING)], |ctx| {
//!     println!("{}", ctx.pop_str()?);
//!     Ok(None)
//! }))?;
//! ```
//!
//! Faults are reported as [`Error`] values; [`render_error_to_string`] turns
//! them into readable reports.

pub mod error_renderer;

// Scripts arrive as arena-allocated ASTs.
pub use bumpalo;

// Re-export public API from fibril_core
pub use fibril_core::ast::{self, AstBuilder, Type};
pub use fibril_core::bindings::{
    BindError, CallCtx, Coroutine, Globals, NativeClass, NativeField, NativeFunc,
};
pub use fibril_core::bytecode::{self, Module};
pub use fibril_core::compiler::{BytecodeCompiler, CompileError, CompileErrorKind};
pub use fibril_core::symbols::{self, Symbol, types};
pub use fibril_core::values::{self, Val};
pub use fibril_core::vm::{FiberId, Status, VM, VmError, VmOptions};

// Re-export errors
pub use fibril_core::Error;

pub use error_renderer::{
    render_error, render_error_to, render_error_to_string, render_error_to_string_no_color,
};
