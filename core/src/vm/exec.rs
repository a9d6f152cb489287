//! The interpreter loop.

use alloc::rc::Rc;

use tracing::trace;

use crate::bindings::CallCtx;
use crate::bytecode::{BlockKind, CallKind, Decoded, FuncArgsInfo, Opcode, ParamLayout, decode_at};
use crate::symbols::Symbol;
use crate::values::{FuncPtr, Obj, Val, ValKind};
use crate::{Box, Vec};

use super::block::Paral;
use super::frame::{DeferSpan, Frame, FrameKind, Locals, NativeTask, Pending, Scope};
use super::ops;
use super::runtime::Runtime;
use super::{Status, VmError};

/// How an [`Exec`] stopped running.
#[derive(Debug)]
pub(crate) enum Exit {
    /// A branch reached the end of its code.
    Finished,
    /// The bottom frame returned, with its result if it had one.
    Returned(Option<Val>),
}

#[derive(Debug)]
pub(crate) enum Step {
    Running,
    Done(Exit),
}

/// What the loop must do after one instruction.
enum Flow {
    Continue,
    Call(Frame),
    Return(Option<Val>),
    /// The frame is waiting on pending work; give up the tick.
    Suspend,
}

/// A stack of frames: the body of a fiber or of one `paral` branch.
pub(crate) struct Exec {
    frames: Vec<Frame>,
}

impl Exec {
    pub fn new(root: Frame) -> Self {
        let mut frames = Vec::with_capacity(4);
        frames.push(root);
        Self { frames }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Runs until the exec finishes or has to wait for the next tick.
    pub fn run(&mut self, rt: &Runtime) -> Result<Step, VmError> {
        loop {
            let Some(frame) = self.frames.last_mut() else {
                return Ok(Step::Done(Exit::Finished));
            };

            if let Some(pending) = frame.pending.take() {
                match pending {
                    Pending::Native(mut task) => {
                        let status = match task.coroutine() {
                            Some(co) => {
                                let mut ctx = CallCtx::new(
                                    &mut frame.stack,
                                    &rt.pools,
                                    FuncArgsInfo::default(),
                                );
                                co.tick(&mut ctx)?
                            }
                            None => Status::Success,
                        };
                        match status {
                            Status::Running => {
                                frame.pending = Some(Pending::Native(task));
                                return Ok(Step::Running);
                            }
                            Status::Success => task.finish(),
                        }
                    }
                    Pending::Paral(mut paral) => match paral.tick(rt)? {
                        Step::Running => {
                            frame.pending = Some(Pending::Paral(paral));
                            return Ok(Step::Running);
                        }
                        Step::Done(Exit::Finished) => {}
                        Step::Done(Exit::Returned(value)) => {
                            match self.do_return(rt, value)? {
                                Some(exit) => return Ok(Step::Done(exit)),
                                None => continue,
                            }
                        }
                    },
                }
            }

            // Close every scope that ends here.
            let ip = frame.ip;
            while frame.scopes.last().is_some_and(|scope| scope.end == ip) {
                if let Some(scope) = frame.scopes.pop() {
                    let spans = scope.defers.into_iter().rev();
                    run_defers(rt, frame.module, &frame.locals, spans)?;
                }
            }
            if let FrameKind::Branch { end } = frame.kind
                && ip >= end
            {
                self.frames.pop();
                return Ok(Step::Done(Exit::Finished));
            }

            let code = &rt.module(frame.module)?.code;
            let inst = decode_at(code, frame.ip)?;
            trace!(ip = inst.offset, op = ?inst.op, operands = ?&inst.operands[..], "exec");
            frame.ip = inst.end();

            match execute(frame, rt, &inst)? {
                Flow::Continue => {}
                Flow::Suspend => return Ok(Step::Running),
                Flow::Call(callee) => {
                    if self.frames.len() >= rt.options.max_call_depth {
                        return Err(VmError::CallDepthExceeded {
                            limit: rt.options.max_call_depth,
                        });
                    }
                    self.frames.push(callee);
                }
                Flow::Return(value) => {
                    if let Some(exit) = self.do_return(rt, value)? {
                        return Ok(Step::Done(exit));
                    }
                }
            }
        }
    }

    /// Pops the top frame after running its cleanup. Returns how the exec
    /// ended, or `None` when a caller frame resumes.
    fn do_return(&mut self, rt: &Runtime, value: Option<Val>) -> Result<Option<Exit>, VmError> {
        let Some(mut frame) = self.frames.pop() else {
            return Ok(Some(Exit::Returned(value)));
        };
        unwind(&mut frame, rt)?;
        if matches!(frame.kind, FrameKind::Branch { .. }) {
            return Ok(Some(Exit::Returned(value)));
        }
        match self.frames.last_mut() {
            Some(caller) => {
                if let Some(value) = value {
                    caller.stack.push(value)?;
                }
                Ok(None)
            }
            None => Ok(Some(Exit::Returned(value))),
        }
    }

    /// Abandons every frame, innermost first, running pending cleanup.
    pub fn abort(&mut self, rt: &Runtime) -> Result<(), VmError> {
        while let Some(mut frame) = self.frames.pop() {
            unwind(&mut frame, rt)?;
        }
        Ok(())
    }
}

/// Cancels a frame's pending work and runs all of its deferred blocks.
fn unwind(frame: &mut Frame, rt: &Runtime) -> Result<(), VmError> {
    match frame.pending.take() {
        Some(Pending::Paral(mut paral)) => paral.abort(rt)?,
        Some(Pending::Native(task)) => drop(task),
        None => {}
    }
    let spans = frame.take_defers();
    run_defers(rt, frame.module, &frame.locals, spans)
}

/// Runs deferred blocks to completion, in the order given.
pub(crate) fn run_defers(
    rt: &Runtime,
    module: usize,
    locals: &Rc<Locals>,
    spans: impl IntoIterator<Item = DeferSpan>,
) -> Result<(), VmError> {
    for span in spans {
        trace!(start = span.start, end = span.end, "defer");
        let root = Frame::branch(
            module,
            span.start,
            span.end,
            locals.clone(),
            rt.options.max_stack_size,
        );
        let mut exec = Exec::new(root);
        if let Step::Running = exec.run(rt)? {
            exec.abort(rt)?;
            return Err(VmError::DeferSuspended);
        }
    }
    Ok(())
}

fn pop(frame: &mut Frame, op: Opcode) -> Result<Val, VmError> {
    frame.stack.pop().ok_or(VmError::StackUnderflow { op })
}

fn pop_bool(frame: &mut Frame, op: Opcode) -> Result<bool, VmError> {
    let value = pop(frame, op)?;
    value.as_bool().ok_or(VmError::TypeMismatch {
        expected: "bool",
        found: value.kind(),
    })
}

fn malformed(what: &'static str, inst: &Decoded) -> VmError {
    VmError::Malformed {
        what,
        offset: inst.offset,
    }
}

fn execute(frame: &mut Frame, rt: &Runtime, inst: &Decoded) -> Result<Flow, VmError> {
    let op = inst.op;
    let arg = |idx: usize| inst.operands[idx];

    match op {
        Opcode::Nop => {}

        Opcode::Constant => {
            let value = rt.constant(frame.module, arg(0))?;
            frame.stack.push(value)?;
        }

        Opcode::PopValue => {
            pop(frame, op)?;
        }

        Opcode::Add
        | Opcode::Sub
        | Opcode::Mul
        | Opcode::Div
        | Opcode::Mod
        | Opcode::BitAnd
        | Opcode::BitOr
        | Opcode::And
        | Opcode::Or => {
            let rhs = pop(frame, op)?;
            let lhs = pop(frame, op)?;
            frame.stack.push(ops::binary(op, lhs, rhs)?)?;
        }

        Opcode::Equal
        | Opcode::NotEqual
        | Opcode::Greater
        | Opcode::GreaterOrEqual
        | Opcode::Less
        | Opcode::LessOrEqual => {
            let rhs = pop(frame, op)?;
            let lhs = pop(frame, op)?;
            frame.stack.push(Val::Bool(ops::compare(op, &lhs, &rhs)?))?;
        }

        Opcode::UnaryNot | Opcode::UnaryNeg => {
            let value = pop(frame, op)?;
            frame.stack.push(ops::unary(op, value)?)?;
        }

        Opcode::InitFrame => frame.locals.reserve(arg(0)),

        Opcode::DeclVar => {
            let kind = ValKind::from_operand(arg(1)).ok_or_else(|| malformed("DeclVar", inst))?;
            frame.locals.set(arg(0), Val::default_of(kind))?;
        }

        Opcode::ArgVar | Opcode::SetVar => {
            let value = pop(frame, op)?;
            frame.locals.set(arg(0), value)?;
        }

        Opcode::DefArg => {
            if !frame.args_info.uses_default(arg(0)) {
                frame.ip += arg(1) as usize;
            }
        }

        Opcode::GetVar => {
            let value = frame.locals.get(arg(0))?;
            frame.stack.push(value)?;
        }

        Opcode::Inc => {
            let cell = frame.locals.cell(arg(0))?;
            let mut value = cell.borrow_mut();
            match &mut *value {
                Val::Num(n) => *n += 1.0,
                other => {
                    return Err(VmError::TypeMismatch {
                        expected: "number",
                        found: other.kind(),
                    });
                }
            }
        }

        Opcode::Jump => frame.ip += arg(0) as usize,

        Opcode::CondJump => {
            if !pop_bool(frame, op)? {
                frame.ip += arg(0) as usize;
            }
        }

        Opcode::LoopJump => {
            frame.ip = frame
                .ip
                .checked_sub(arg(0) as usize)
                .ok_or_else(|| malformed("LoopJump", inst))?;
        }

        Opcode::Return => return Ok(Flow::Return(None)),

        Opcode::ReturnVal => {
            let value = pop(frame, op)?;
            return Ok(Flow::Return(Some(value)));
        }

        Opcode::Call => {
            let kind = CallKind::from_operand(arg(0)).ok_or_else(|| malformed("Call", inst))?;
            let info = FuncArgsInfo::from_bits(arg(2));
            return match kind {
                CallKind::Native => call_native(frame, rt, arg(1), info),
                CallKind::Func => {
                    let module = frame.module;
                    let takes_info = rt.module(module)?.takes_args_info(arg(1));
                    let locals = Locals::new(&rt.pools);
                    let callee = enter(frame, rt, module, arg(1), locals, takes_info, info)?;
                    Ok(Flow::Call(callee))
                }
                CallKind::Stack => {
                    let func = pop(frame, op)?;
                    call_value(frame, rt, &func, info)
                }
                CallKind::Var => {
                    let func = frame.locals.get(arg(1))?;
                    call_value(frame, rt, &func, info)
                }
            };
        }

        Opcode::Lambda => {
            let func = FuncPtr::new(&rt.pools, frame.module, arg(0), arg(1), false);
            frame.stack.push(Val::Obj(Obj::Func(Rc::new(func))))?;
        }

        Opcode::UseUpval => {
            let cell = frame.locals.cell(arg(0))?;
            let Some(Val::Obj(Obj::Func(func))) = frame.stack.peek_mut() else {
                return Err(VmError::BadUpvalue);
            };
            let func = Rc::get_mut(func).ok_or(VmError::BadUpvalue)?;
            func.upvals.push((arg(1), cell));
        }

        Opcode::GetFunc => {
            let module = rt.module(frame.module)?;
            let takes_info = module.takes_args_info(arg(0));
            let func = FuncPtr::new(&rt.pools, frame.module, arg(0), 0, takes_info);
            frame.stack.push(Val::Obj(Obj::Func(Rc::new(func))))?;
        }

        Opcode::New => {
            let obj = ops::new_object(rt, sym(arg(0)))?;
            frame.stack.push(obj)?;
        }

        Opcode::GetMVar => {
            let obj = pop(frame, op)?;
            let value = ops::get_member(rt, &obj, sym(arg(0)), arg(1))?;
            frame.stack.push(value)?;
        }

        Opcode::SetMVar => {
            let obj = pop(frame, op)?;
            let value = pop(frame, op)?;
            ops::set_member(rt, &obj, sym(arg(0)), arg(1), value)?;
        }

        Opcode::SetMVarInplace => {
            let value = pop(frame, op)?;
            let obj = frame
                .stack
                .peek()
                .cloned()
                .ok_or(VmError::StackUnderflow { op })?;
            ops::set_member(rt, &obj, sym(arg(0)), arg(1), value)?;
        }

        Opcode::MCall => ops::call_method(&mut frame.stack, sym(arg(0)), arg(1))?,

        Opcode::TypeCast => {
            let value = pop(frame, op)?;
            frame.stack.push(ops::cast(rt, value, sym(arg(0)))?)?;
        }

        Opcode::ClassBegin | Opcode::ClassMember | Opcode::ClassEnd => {
            return Err(malformed("class registration outside init code", inst));
        }

        Opcode::Block => {
            let kind = BlockKind::from_operand(arg(0)).ok_or_else(|| malformed("Block", inst))?;
            let start = frame.ip;
            let end = start + arg(1) as usize;
            match kind {
                BlockKind::Seq => frame.scopes.push(Scope::new(end)),
                BlockKind::Defer => {
                    frame.defer_scope().defers.push(DeferSpan { start, end });
                    frame.ip = end;
                }
                BlockKind::Paral | BlockKind::ParalAll => {
                    let paral = Paral::fork(rt, frame, kind == BlockKind::ParalAll, start, end)?;
                    frame.ip = end;
                    frame.pending = Some(Pending::Paral(Box::new(paral)));
                }
            }
        }
    }
    Ok(Flow::Continue)
}

fn sym(raw: u32) -> Symbol {
    Symbol::from_raw(raw)
}

fn call_native(frame: &mut Frame, rt: &Runtime, idx: u32, info: FuncArgsInfo) -> Result<Flow, VmError> {
    let native = rt
        .globals
        .native(idx)
        .ok_or(VmError::UnknownNative { idx })?;
    trace!(name = native.name(), args = info.count(), "native call");

    let mut ctx = CallCtx::new(&mut frame.stack, &rt.pools, info);
    let Some(mut co) = native.call(&mut ctx)? else {
        return Ok(Flow::Continue);
    };
    match co.tick(&mut ctx)? {
        Status::Success => Ok(Flow::Continue),
        Status::Running => {
            frame.pending = Some(Pending::Native(NativeTask::new(co)));
            Ok(Flow::Suspend)
        }
    }
}

fn call_value(frame: &mut Frame, rt: &Runtime, func: &Val, info: FuncArgsInfo) -> Result<Flow, VmError> {
    let func = func.as_func().ok_or(VmError::TypeMismatch {
        expected: "function",
        found: func.kind(),
    })?;
    let (module, offset) = (func.module, func.offset);
    // Value calls only pass positional arguments; named functions get their
    // omitted defaults flagged here.
    let info = match rt.module(module)?.params(offset) {
        Some(params) => args_info(params, offset, info.count())?,
        None => info,
    };
    let locals = Locals::for_closure(&rt.pools, func.slots, &func.upvals);
    let callee = enter(frame, rt, module, offset, locals, func.takes_args_info, info)?;
    Ok(Flow::Call(callee))
}

/// Args info for a positional call of a named function with `supplied`
/// arguments.
pub(crate) fn args_info(params: ParamLayout, offset: u32, supplied: u32) -> Result<FuncArgsInfo, VmError> {
    params.positional(supplied).ok_or(VmError::ArgCount {
        offset,
        min: params.required(),
        max: params.count,
        found: supplied,
    })
}

/// Builds a callee frame, moving the arguments off the caller's stack. The
/// callee sees its first argument on top, under the args info when it
/// takes one.
fn enter(
    caller: &mut Frame,
    rt: &Runtime,
    module: usize,
    offset: u32,
    locals: Rc<Locals>,
    takes_info: bool,
    info: FuncArgsInfo,
) -> Result<Frame, VmError> {
    let args = caller
        .stack
        .split_top(info.count() as usize)
        .ok_or(VmError::StackUnderflow { op: Opcode::Call })?;
    let mut callee = Frame::call(
        module,
        offset as usize,
        locals,
        rt.options.max_stack_size,
        info,
    );
    for arg in args.into_iter().rev() {
        callee.stack.push(arg)?;
    }
    if takes_info {
        callee.stack.push(Val::Num(info.bits() as f64))?;
    }
    Ok(callee)
}
