//! Bytecode compiler implementation.

use hashbrown::HashMap;

use crate::ast::{self, Arg, BinOp, Callee, Expr, Literal, Stmt, Target, Type, UnaryOp};
use crate::bindings::Globals;
use crate::bytecode::{
    Assembler, BlockKind, CallKind, Const, ConstPool, FuncArgsInfo, Module, Opcode, ParamLayout,
    members,
};
use crate::symbols::{Symbol, SymbolNames, types};
use crate::values::ValKind;
use crate::{Vec, vec};

use super::emitter::{Emitter, Label, Operand};
use super::error::{CompileError, CompileErrorKind};

type CResult<T> = Result<T, CompileErrorKind>;

struct FuncInfo<'a> {
    label: Label,
    decl: &'a ast::FuncDecl<'a>,
}

impl FuncInfo<'_> {
    fn default_count(&self) -> u32 {
        self.decl.params.iter().filter(|p| p.default.is_some()).count() as u32
    }
}

struct ClassInfo<'a> {
    /// Parent-first field layout; empty until the class is laid out.
    fields: Vec<(&'a str, Type<'a>)>,
}

#[derive(Debug, Clone, Copy)]
struct Local<'a> {
    slot: u32,
    ty: Type<'a>,
}

/// Compile state of one function or lambda body.
struct FuncCtx<'a> {
    scopes: Vec<HashMap<&'a str, Local<'a>>>,
    next_slot: u32,
    is_lambda: bool,
    /// `(enclosing slot, own slot)` pairs bound with `UseUpval`.
    upvals: Vec<(u32, u32)>,
    defer_depth: u32,
}

impl<'a> FuncCtx<'a> {
    fn new(is_lambda: bool) -> Self {
        Self {
            scopes: vec![HashMap::new()],
            next_slot: 0,
            is_lambda,
            upvals: Vec::new(),
            defer_depth: 0,
        }
    }

    fn find(&self, name: &str) -> Option<Local<'a>> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn alloc_slot(&mut self) -> u32 {
        self.next_slot += 1;
        self.next_slot - 1
    }
}

/// Compiles a type-checked [`ast::Module`] into a bytecode [`Module`].
///
/// Function bodies go to the module's main code stream, class declarations
/// to its init stream. Jumps are emitted against labels and resolved once
/// the whole stream is known (see [`Emitter`]).
///
/// Local slots are assigned in declaration order: parameters first, then the
/// hidden args-info slot of functions with default parameters, then locals in
/// the order they appear. Slots are never reused within a function. Lambdas
/// get their own slot space; variables they capture are given a slot the
/// first time the lambda body mentions them.
pub struct BytecodeCompiler<'g, 'a> {
    globals: &'g Globals,
    em: Emitter,
    init: Assembler,
    constants: ConstPool,
    symbols: SymbolNames,
    funcs: HashMap<&'a str, FuncInfo<'a>>,
    classes: HashMap<&'a str, ClassInfo<'a>>,
    frames: Vec<FuncCtx<'a>>,

    /// Current stack depth during compilation
    current_stack_depth: usize,

    /// Maximum stack depth observed
    max_stack_size: usize,
}

impl<'g, 'a> BytecodeCompiler<'g, 'a> {
    fn new(globals: &'g Globals) -> Self {
        Self {
            globals,
            em: Emitter::new(),
            init: Assembler::new(),
            constants: ConstPool::new(),
            symbols: SymbolNames::new(),
            funcs: HashMap::new(),
            classes: HashMap::new(),
            frames: Vec::new(),
            current_stack_depth: 0,
            max_stack_size: 0,
        }
    }

    /// Compiles `module` against the natives and native classes in `globals`.
    pub fn compile(globals: &'g Globals, module: &ast::Module<'a>) -> Result<Module, CompileError> {
        let compiler = Self::new(globals);
        compiler
            .compile_module(module)
            .map_err(|kind| CompileError::new(module.file, kind))
    }

    fn compile_module(mut self, module: &ast::Module<'a>) -> CResult<Module> {
        self.collect_decls(module)?;
        self.emit_classes(module)?;

        for decl in module.decls {
            if let ast::Decl::Func(func) = decl {
                self.compile_func(func)?;
            }
        }

        let layout = self.em.finish()?;
        let mut func_offsets = alloc::collections::BTreeMap::new();
        let mut func_params = alloc::collections::BTreeMap::new();
        for (name, info) in &self.funcs {
            let offset = layout.offset(info.label);
            func_offsets.insert((*name).into(), offset);
            let params = ParamLayout::new(info.decl.params.iter().map(|p| p.default.is_some()));
            func_params.insert(offset, params);
        }

        tracing::debug!(
            module = module.name,
            code_len = layout.code.len(),
            constants = self.constants.len(),
            max_stack = self.max_stack_size,
            "compiled module"
        );

        Ok(Module {
            name: module.name.into(),
            code: layout.code,
            init_code: self.init.into_bytes(),
            constants: self.constants.into_vec(),
            func_offsets,
            func_params,
            symbols: self.symbols,
        })
    }

    // === Declarations ===

    fn collect_decls(&mut self, module: &ast::Module<'a>) -> CResult<()> {
        for decl in module.decls {
            match decl {
                ast::Decl::Func(func) => {
                    if self.funcs.contains_key(func.name) {
                        return Err(CompileErrorKind::DuplicateFunction(func.name.into()));
                    }
                    if func.params.len() > FuncArgsInfo::MAX_ARGS as usize {
                        return Err(CompileErrorKind::TooManyArgs(func.name.into()));
                    }
                    let label = self.em.new_label();
                    self.funcs.insert(func.name, FuncInfo { label, decl: func });
                    if self.funcs[func.name].default_count() > FuncArgsInfo::MAX_DEFAULT_ARGS {
                        return Err(CompileErrorKind::TooManyDefaults(func.name.into()));
                    }
                }
                ast::Decl::Class(class) => {
                    if self.classes.contains_key(class.name)
                        || self.globals.find_class(class.name).is_some()
                    {
                        return Err(CompileErrorKind::DuplicateClass(class.name.into()));
                    }
                    self.intern(class.name)?;
                    self.classes.insert(
                        class.name,
                        ClassInfo {
                            fields: Vec::new(),
                        },
                    );
                }
            }
        }
        Ok(())
    }

    /// Writes class registration to the init stream, parents before children.
    fn emit_classes(&mut self, module: &ast::Module<'a>) -> CResult<()> {
        let mut pending: Vec<&'a ast::ClassDecl<'a>> = module
            .decls
            .iter()
            .filter_map(|decl| match decl {
                ast::Decl::Class(class) => Some(*class),
                ast::Decl::Func(_) => None,
            })
            .collect();

        for class in &pending {
            if let Some(parent) = class.parent
                && !self.classes.contains_key(parent)
            {
                return Err(CompileErrorKind::UnknownClass(parent.into()));
            }
        }

        let mut done: hashbrown::HashSet<&'a str> = hashbrown::HashSet::new();
        while !pending.is_empty() {
            let ready = pending
                .iter()
                .position(|class| class.parent.is_none_or(|parent| done.contains(parent)));
            let Some(idx) = ready else {
                return Err(CompileErrorKind::CyclicClass(pending[0].name.into()));
            };
            let class = pending.remove(idx);
            self.emit_class(class)?;
            done.insert(class.name);
        }
        Ok(())
    }

    fn emit_class(&mut self, class: &'a ast::ClassDecl<'a>) -> CResult<()> {
        let mut fields = match class.parent {
            Some(parent) => self.classes[parent].fields.clone(),
            None => Vec::new(),
        };
        let parent_sym = match class.parent {
            Some(parent) => self.intern(parent)?,
            None => Symbol::NONE,
        };
        let class_sym = self.intern(class.name)?;

        self.init
            .emit(Opcode::ClassBegin, &[class_sym.id(), parent_sym.id()]);
        for field in class.fields {
            if fields.iter().any(|(name, _)| *name == field.name) {
                return Err(CompileErrorKind::DuplicateVariable(field.name.into()));
            }
            let ty = self.type_symbol(&field.ty)?;
            let name = self.intern(field.name)?;
            self.init.emit(Opcode::ClassMember, &[ty.id(), name.id()]);
            fields.push((field.name, field.ty));
        }
        self.init.emit(Opcode::ClassEnd, &[]);

        if let Some(info) = self.classes.get_mut(class.name) {
            info.fields = fields;
        }
        Ok(())
    }

    fn compile_func(&mut self, func: &'a ast::FuncDecl<'a>) -> CResult<()> {
        let label = self.funcs[func.name].label;
        self.em.bind(label);
        self.frames.push(FuncCtx::new(false));
        let frame_slot = self.em.reserve();

        for param in func.params {
            self.declare(param.name, param.ty)?;
        }
        let has_defaults = func.params.iter().any(|p| p.default.is_some());

        // Arguments arrive on the stack with the first one on top, under the
        // args info when the function takes one.
        self.current_stack_depth = func.params.len() + usize::from(has_defaults);
        if has_defaults {
            let bits = self.ctx().alloc_slot();
            self.emit(Opcode::ArgVar, &[bits.into()]);
            self.pop_stack();
        }

        let mut default_idx: u32 = 0;
        for (slot, param) in func.params.iter().enumerate() {
            if let Some(default) = param.default {
                let skip = self.em.new_label();
                self.emit(Opcode::DefArg, &[default_idx.into(), Operand::Fwd(skip)]);
                self.compile_expr(default)?;
                // Either the caller's argument or the default fills the slot.
                self.pop_stack();
                self.em.bind(skip);
                default_idx += 1;
            }
            self.emit(Opcode::ArgVar, &[(slot as u32).into()]);
            self.pop_stack();
        }

        self.compile_stmts(func.body)?;
        self.emit(Opcode::Return, &[]);

        let ctx = self.frames.pop();
        let slots = ctx.map_or(0, |ctx| ctx.next_slot);
        if slots > 0 {
            self.em.fill(frame_slot, Opcode::InitFrame, &[slots.into()]);
        }
        self.current_stack_depth = 0;
        Ok(())
    }

    // === Stack Management ===

    fn push_stack(&mut self) {
        self.current_stack_depth += 1;
        if self.current_stack_depth > self.max_stack_size {
            self.max_stack_size = self.current_stack_depth;
        }
    }

    fn pop_stack(&mut self) {
        debug_assert!(self.current_stack_depth > 0, "Stack underflow");
        self.current_stack_depth = self.current_stack_depth.saturating_sub(1);
    }

    fn pop_stack_n(&mut self, n: usize) {
        debug_assert!(
            self.current_stack_depth >= n,
            "Stack underflow: trying to pop {} but depth is {}",
            n,
            self.current_stack_depth
        );
        self.current_stack_depth = self.current_stack_depth.saturating_sub(n);
    }

    // === Instruction Emission ===

    fn emit(&mut self, op: Opcode, operands: &[Operand]) {
        self.em.emit(op, operands);
    }

    fn emit_const(&mut self, value: Const) -> CResult<()> {
        let idx = self
            .constants
            .add(value)
            .ok_or(CompileErrorKind::TooManyConstants)?;
        self.emit(Opcode::Constant, &[idx.into()]);
        self.push_stack();
        Ok(())
    }

    fn intern(&mut self, name: &str) -> CResult<Symbol> {
        self.symbols
            .intern(name)
            .map_err(|existing| CompileErrorKind::SymbolCollision {
                name: name.into(),
                existing,
            })
    }

    fn type_symbol(&mut self, ty: &Type<'a>) -> CResult<Symbol> {
        let sym = self.intern(type_name(ty))?;
        debug_assert_eq!(sym, ty.symbol());
        Ok(sym)
    }

    // === Local Variable Management ===

    fn ctx(&mut self) -> &mut FuncCtx<'a> {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn declare(&mut self, name: &'a str, ty: Type<'a>) -> CResult<u32> {
        let ctx = self.ctx();
        let scope = ctx.scopes.len() - 1;
        if ctx.scopes[scope].contains_key(name) {
            return Err(CompileErrorKind::DuplicateVariable(name.into()));
        }
        let slot = ctx.alloc_slot();
        ctx.scopes[scope].insert(name, Local { slot, ty });
        Ok(slot)
    }

    fn push_scope(&mut self) {
        self.ctx().scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.ctx().scopes.pop();
    }

    /// Looks a variable up, capturing it from enclosing functions when the
    /// current body is a lambda.
    fn lookup(&mut self, name: &'a str) -> Option<Local<'a>> {
        let depth = self.frames.len().checked_sub(1)?;
        self.lookup_in(depth, name)
    }

    fn lookup_in(&mut self, depth: usize, name: &'a str) -> Option<Local<'a>> {
        let ctx = &self.frames[depth];
        if let Some(local) = ctx.find(name) {
            return Some(local);
        }
        if !ctx.is_lambda || depth == 0 {
            return None;
        }
        let outer = self.lookup_in(depth - 1, name)?;
        let ctx = &mut self.frames[depth];
        let slot = ctx.alloc_slot();
        ctx.upvals.push((outer.slot, slot));
        let local = Local { slot, ty: outer.ty };
        ctx.scopes[0].insert(name, local);
        Some(local)
    }

    // === Statements ===

    fn compile_stmts(&mut self, stmts: &'a [Stmt<'a>]) -> CResult<()> {
        for stmt in stmts {
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    /// Body of a branch or loop. Loop and branch bodies have no cleanup scope
    /// of their own, so one that defers directly is wrapped in a `seq` block.
    fn compile_body(&mut self, body: &'a [Stmt<'a>]) -> CResult<()> {
        let defers = body.iter().any(|stmt| {
            matches!(
                stmt,
                Stmt::Block {
                    kind: ast::BlockKind::Defer,
                    ..
                }
            )
        });
        self.push_scope();
        if defers {
            self.compile_block(BlockKind::Seq, |c| c.compile_stmts(body))?;
        } else {
            self.compile_stmts(body)?;
        }
        self.pop_scope();
        Ok(())
    }

    fn compile_block(
        &mut self,
        kind: BlockKind,
        body: impl FnOnce(&mut Self) -> CResult<()>,
    ) -> CResult<()> {
        let end = self.em.new_label();
        self.emit(Opcode::Block, &[(kind as u32).into(), Operand::Fwd(end)]);
        body(self)?;
        self.em.bind(end);
        Ok(())
    }

    fn compile_stmt(&mut self, stmt: &'a Stmt<'a>) -> CResult<()> {
        match stmt {
            Stmt::VarDecl { name, ty, init } => {
                let slot = self.declare(name, *ty)?;
                match init {
                    Some(init) => {
                        self.compile_expr(init)?;
                        self.emit(Opcode::SetVar, &[slot.into()]);
                        self.pop_stack();
                    }
                    None => {
                        let kind = value_kind(ty) as u32;
                        self.emit(Opcode::DeclVar, &[slot.into(), kind.into()]);
                    }
                }
            }

            Stmt::Assign { target, value } => self.compile_assign(target, value)?,

            Stmt::Expr(expr) => {
                let before = self.current_stack_depth;
                self.compile_expr(expr)?;
                while self.current_stack_depth > before {
                    self.emit(Opcode::PopValue, &[]);
                    self.pop_stack();
                }
            }

            Stmt::If {
                branches,
                otherwise,
            } => self.compile_if(branches, *otherwise)?,

            Stmt::While { cond, body } => {
                let top = self.em.here();
                let end = self.em.new_label();
                self.compile_expr(cond)?;
                self.emit(Opcode::CondJump, &[Operand::Fwd(end)]);
                self.pop_stack();
                self.compile_body(body)?;
                self.emit(Opcode::LoopJump, &[Operand::Back(top)]);
                self.em.bind(end);
            }

            Stmt::For {
                init,
                cond,
                step,
                body,
            } => {
                self.push_scope();
                self.compile_stmts(init)?;
                let top = self.em.here();
                let end = self.em.new_label();
                self.compile_expr(cond)?;
                self.emit(Opcode::CondJump, &[Operand::Fwd(end)]);
                self.pop_stack();
                self.compile_body(body)?;
                self.compile_stmts(step)?;
                self.emit(Opcode::LoopJump, &[Operand::Back(top)]);
                self.em.bind(end);
                self.pop_scope();
            }

            Stmt::Foreach {
                elem_ty,
                var,
                array,
                body,
            } => self.compile_foreach(*elem_ty, var, array, body)?,

            Stmt::Return(value) => {
                if self.ctx().defer_depth > 0 {
                    return Err(CompileErrorKind::ReturnInDefer);
                }
                match value {
                    Some(value) => {
                        self.compile_expr(value)?;
                        self.emit(Opcode::ReturnVal, &[]);
                        self.pop_stack();
                    }
                    None => self.emit(Opcode::Return, &[]),
                }
            }

            Stmt::Block { kind, body } => self.compile_structured(*kind, body)?,

            Stmt::YieldWhile(cond) => {
                let yield_idx = self
                    .globals
                    .find_native("yield")
                    .ok_or(CompileErrorKind::MissingYield)?;
                let top = self.em.here();
                let end = self.em.new_label();
                self.compile_expr(cond)?;
                self.emit(Opcode::CondJump, &[Operand::Fwd(end)]);
                self.pop_stack();
                self.emit(
                    Opcode::Call,
                    &[(CallKind::Native as u32).into(), yield_idx.into(), Operand::Imm(0)],
                );
                self.emit(Opcode::LoopJump, &[Operand::Back(top)]);
                self.em.bind(end);
            }
        }
        Ok(())
    }

    fn compile_assign(&mut self, target: &'a Target<'a>, value: &'a Expr<'a>) -> CResult<()> {
        match target {
            Target::Var(name) => {
                self.compile_expr(value)?;
                let local = self
                    .lookup(name)
                    .ok_or_else(|| CompileErrorKind::UnknownSymbol((*name).into()))?;
                self.emit(Opcode::SetVar, &[local.slot.into()]);
                self.pop_stack();
            }
            Target::Member { obj, ty, name } => {
                let (sym, idx) = self.member_index(ty, name)?;
                self.compile_expr(value)?;
                self.compile_expr(obj)?;
                self.emit(Opcode::SetMVar, &[sym.id().into(), idx.into()]);
                self.pop_stack_n(2);
            }
            Target::Index { obj, ty, index } => {
                let sym = container_symbol(ty, "SetAt")?;
                self.compile_expr(value)?;
                self.compile_expr(obj)?;
                self.compile_expr(index)?;
                self.emit(Opcode::MCall, &[sym.id().into(), set_at(sym).into()]);
                self.pop_stack_n(3);
            }
        }
        Ok(())
    }

    /// `if`/`else if`/`else` chain. Each taken branch jumps to the exit jump of
    /// the branch after it, so every exit jump only crosses one body.
    fn compile_if(
        &mut self,
        branches: &'a [(&'a Expr<'a>, &'a [Stmt<'a>])],
        otherwise: Option<&'a [Stmt<'a>]>,
    ) -> CResult<()> {
        let count = branches.len();
        let has_exit = |idx: usize| idx + 1 < count || otherwise.is_some();
        let exits: Vec<Label> = (0..count).map(|_| self.em.new_label()).collect();
        let end = self.em.new_label();

        for (idx, (cond, body)) in branches.iter().enumerate() {
            let next = self.em.new_label();
            self.compile_expr(cond)?;
            self.emit(Opcode::CondJump, &[Operand::Fwd(next)]);
            self.pop_stack();
            self.compile_body(body)?;
            if has_exit(idx) {
                self.em.bind(exits[idx]);
                let target = if idx + 1 < count && has_exit(idx + 1) {
                    exits[idx + 1]
                } else {
                    end
                };
                self.emit(Opcode::Jump, &[Operand::Fwd(target)]);
            }
            self.em.bind(next);
        }
        if let Some(otherwise) = otherwise {
            self.compile_body(otherwise)?;
        }
        self.em.bind(end);
        // Exit labels of branches without an exit jump are never targeted.
        for (idx, exit) in exits.iter().enumerate() {
            if !has_exit(idx) {
                self.em.bind(*exit);
            }
        }
        Ok(())
    }

    fn compile_foreach(
        &mut self,
        elem_ty: Type<'a>,
        var: &'a str,
        array: &'a Expr<'a>,
        body: &'a [Stmt<'a>],
    ) -> CResult<()> {
        self.push_scope();
        let item = self.declare(var, elem_ty)?;
        let items = self.ctx().alloc_slot();
        let counter = self.ctx().alloc_slot();
        let array_sym = types::ARRAY.id();

        self.compile_expr(array)?;
        self.emit(Opcode::SetVar, &[items.into()]);
        self.pop_stack();
        self.emit(
            Opcode::DeclVar,
            &[counter.into(), (ValKind::Num as u32).into()],
        );
        self.emit(
            Opcode::DeclVar,
            &[item.into(), (value_kind(&elem_ty) as u32).into()],
        );

        let top = self.em.here();
        let end = self.em.new_label();
        self.emit(Opcode::GetVar, &[counter.into()]);
        self.emit(Opcode::GetVar, &[items.into()]);
        self.emit(
            Opcode::GetMVar,
            &[array_sym.into(), members::array::COUNT.into()],
        );
        self.emit(Opcode::Less, &[]);
        self.emit(Opcode::CondJump, &[Operand::Fwd(end)]);

        self.emit(Opcode::GetVar, &[items.into()]);
        self.emit(Opcode::GetVar, &[counter.into()]);
        self.emit(Opcode::MCall, &[array_sym.into(), members::array::AT.into()]);
        self.emit(Opcode::SetVar, &[item.into()]);

        self.compile_body(body)?;
        self.emit(Opcode::Inc, &[counter.into()]);
        self.emit(Opcode::LoopJump, &[Operand::Back(top)]);
        self.em.bind(end);
        self.pop_scope();
        Ok(())
    }

    fn compile_structured(&mut self, kind: ast::BlockKind, body: &'a [Stmt<'a>]) -> CResult<()> {
        match kind {
            ast::BlockKind::Seq => self.compile_block(BlockKind::Seq, |c| {
                c.push_scope();
                c.compile_stmts(body)?;
                c.pop_scope();
                Ok(())
            }),
            ast::BlockKind::Defer => self.compile_block(BlockKind::Defer, |c| {
                c.ctx().defer_depth += 1;
                c.push_scope();
                c.compile_stmts(body)?;
                c.pop_scope();
                c.ctx().defer_depth -= 1;
                Ok(())
            }),
            ast::BlockKind::Paral | ast::BlockKind::ParalAll => {
                let kind = if kind == ast::BlockKind::Paral {
                    BlockKind::Paral
                } else {
                    BlockKind::ParalAll
                };
                self.compile_block(kind, |c| {
                    c.push_scope();
                    // Every branch must be a block of its own.
                    for child in body {
                        match child {
                            Stmt::Block {
                                kind: ast::BlockKind::Seq | ast::BlockKind::Defer,
                                ..
                            } => c.compile_stmt(child)?,
                            other => {
                                c.compile_block(BlockKind::Seq, |c| c.compile_stmt(other))?
                            }
                        }
                    }
                    c.pop_scope();
                    Ok(())
                })
            }
        }
    }

    // === Expressions ===

    fn compile_expr(&mut self, expr: &'a Expr<'a>) -> CResult<()> {
        match expr {
            Expr::Literal(lit) => self.emit_const(match lit {
                Literal::Nil => Const::Nil,
                Literal::Num(n) => Const::Num(*n),
                Literal::Bool(b) => Const::Bool(*b),
                Literal::Str(s) => Const::Str((*s).into()),
            })?,

            Expr::Var(name) => {
                if let Some(local) = self.lookup(name) {
                    self.emit(Opcode::GetVar, &[local.slot.into()]);
                } else if let Some(info) = self.funcs.get(name) {
                    let label = info.label;
                    self.emit(Opcode::GetFunc, &[Operand::Abs(label)]);
                } else if self.globals.find_native(name).is_some() {
                    return Err(CompileErrorKind::NativeAsValue((*name).into()));
                } else {
                    return Err(CompileErrorKind::UnknownSymbol((*name).into()));
                }
                self.push_stack();
            }

            Expr::Binary { op, lhs, rhs } => {
                self.compile_expr(lhs)?;
                self.compile_expr(rhs)?;
                self.emit(binary_opcode(*op), &[]);
                self.pop_stack();
            }

            Expr::Unary { op, expr } => {
                self.compile_expr(expr)?;
                let op = match op {
                    UnaryOp::Not => Opcode::UnaryNot,
                    UnaryOp::Neg => Opcode::UnaryNeg,
                };
                self.emit(op, &[]);
            }

            Expr::Call { callee, args } => self.compile_call(callee, args)?,

            Expr::Lambda(lambda) => self.compile_lambda(lambda)?,

            Expr::New(ty) => {
                let sym = self.instantiable(ty)?;
                self.emit(Opcode::New, &[sym.id().into()]);
                self.push_stack();
            }

            Expr::Member { obj, ty, name } => {
                let (sym, idx) = self.member_index(ty, name)?;
                self.compile_expr(obj)?;
                self.emit(Opcode::GetMVar, &[sym.id().into(), idx.into()]);
            }

            Expr::MethodCall {
                obj,
                ty,
                name,
                args,
            } => self.compile_method_call(obj, ty, name, args)?,

            Expr::Index { obj, ty, index } => {
                let sym = container_symbol(ty, "At")?;
                self.compile_expr(obj)?;
                self.compile_expr(index)?;
                self.emit(Opcode::MCall, &[sym.id().into(), at(sym).into()]);
                self.pop_stack();
            }

            Expr::Cast { ty, expr } => {
                let sym = self.type_symbol(ty)?;
                self.compile_expr(expr)?;
                self.emit(Opcode::TypeCast, &[sym.id().into()]);
            }

            Expr::JsonObj { ty, fields } => {
                let sym = self.instantiable(ty)?;
                self.emit(Opcode::New, &[sym.id().into()]);
                self.push_stack();
                for (name, value) in *fields {
                    let (sym, idx) = self.member_index(ty, name)?;
                    self.compile_expr(value)?;
                    self.emit(Opcode::SetMVarInplace, &[sym.id().into(), idx.into()]);
                    self.pop_stack();
                }
            }

            Expr::JsonArr { items, .. } => {
                let array = self.type_symbol(&Type::Array(&Type::Any))?.id();
                self.emit(Opcode::New, &[array.into()]);
                self.push_stack();
                for item in *items {
                    self.compile_expr(item)?;
                    self.emit(
                        Opcode::MCall,
                        &[array.into(), members::array::ADD_INPLACE.into()],
                    );
                    self.pop_stack();
                }
            }
        }
        Ok(())
    }

    fn compile_lambda(&mut self, lambda: &'a ast::LambdaDecl<'a>) -> CResult<()> {
        if let Some(param) = lambda.params.iter().find(|p| p.default.is_some()) {
            return Err(CompileErrorKind::LambdaDefault(param.name.into()));
        }
        if lambda.params.len() > FuncArgsInfo::MAX_ARGS as usize {
            return Err(CompileErrorKind::TooManyArgs("lambda".into()));
        }

        let after = self.em.new_label();
        self.emit(Opcode::Jump, &[Operand::Fwd(after)]);
        let start = self.em.here();
        self.emit(Opcode::Nop, &[]);

        let outer_depth = core::mem::replace(&mut self.current_stack_depth, lambda.params.len());
        self.frames.push(FuncCtx::new(true));
        for param in lambda.params {
            self.declare(param.name, param.ty)?;
        }
        for slot in 0..lambda.params.len() as u32 {
            self.emit(Opcode::ArgVar, &[slot.into()]);
            self.pop_stack();
        }
        self.compile_stmts(lambda.body)?;
        self.emit(Opcode::Return, &[]);
        let ctx = self.frames.pop();
        self.current_stack_depth = outer_depth;

        let (slots, upvals) = ctx.map_or((0, Vec::new()), |ctx| (ctx.next_slot, ctx.upvals));
        self.em.bind(after);
        self.emit(Opcode::Lambda, &[Operand::Abs(start), slots.into()]);
        self.push_stack();
        for (src, dst) in upvals {
            self.emit(Opcode::UseUpval, &[src.into(), dst.into()]);
        }
        Ok(())
    }

    // === Calls ===

    fn compile_call(&mut self, callee: &'a Callee<'a>, args: &'a [Arg<'a>]) -> CResult<()> {
        match callee {
            Callee::Name(name) => {
                if let Some(local) = self.lookup(name) {
                    let info = self.compile_value_args(name, args)?;
                    self.emit(
                        Opcode::Call,
                        &[
                            (CallKind::Var as u32).into(),
                            local.slot.into(),
                            info.bits().into(),
                        ],
                    );
                    self.pop_stack_n(args.len());
                    if returns_value(local.ty) {
                        self.push_stack();
                    }
                } else if self.funcs.contains_key(name) {
                    self.compile_script_call(name, args)?;
                } else if let Some(idx) = self.globals.find_native(name) {
                    self.compile_native_call(name, idx, args)?;
                } else {
                    return Err(CompileErrorKind::UnknownFunction((*name).into()));
                }
            }
            Callee::Expr { func, ret } => {
                let info = self.compile_value_args("lambda", args)?;
                self.compile_expr(func)?;
                self.emit(
                    Opcode::Call,
                    &[(CallKind::Stack as u32).into(), Operand::Imm(0), info.bits().into()],
                );
                self.pop_stack_n(args.len() + 1);
                if !ret.is_void() {
                    self.push_stack();
                }
            }
        }
        Ok(())
    }

    /// Arguments of a call through a function value: positional only.
    fn compile_value_args(&mut self, name: &str, args: &'a [Arg<'a>]) -> CResult<FuncArgsInfo> {
        let info = FuncArgsInfo::new(args.len() as u32)
            .ok_or_else(|| CompileErrorKind::TooManyArgs(name.into()))?;
        for arg in args {
            if let Some(param) = arg.name {
                return Err(CompileErrorKind::UnknownParam {
                    name: name.into(),
                    param: param.into(),
                });
            }
            self.compile_expr(arg.value)?;
        }
        Ok(info)
    }

    /// Named arguments are matched to parameters and everything is pushed in
    /// parameter order; omitted defaults are flagged in the args info.
    fn compile_script_call(&mut self, name: &'a str, args: &'a [Arg<'a>]) -> CResult<()> {
        let info = &self.funcs[name];
        let (decl, label) = (info.decl, info.label);
        let params = decl.params;
        if args.len() > params.len() {
            return Err(CompileErrorKind::ArgCount {
                name: name.into(),
                expected: params.len(),
                found: args.len(),
            });
        }

        let mut given: Vec<Option<&'a Expr<'a>>> = vec![None; params.len()];
        for (pos, arg) in args.iter().enumerate() {
            let idx = match arg.name {
                None => pos,
                Some(param) => params.iter().position(|p| p.name == param).ok_or_else(|| {
                    CompileErrorKind::UnknownParam {
                        name: name.into(),
                        param: param.into(),
                    }
                })?,
            };
            if given[idx].is_some() {
                return Err(CompileErrorKind::DuplicateArg {
                    name: name.into(),
                    param: params[idx].name.into(),
                });
            }
            given[idx] = Some(arg.value);
        }

        let mut info = FuncArgsInfo::new(args.len() as u32)
            .ok_or_else(|| CompileErrorKind::TooManyArgs(name.into()))?;
        let mut default_idx = 0;
        for (param, value) in params.iter().zip(&given) {
            match (value, param.default) {
                (Some(value), _) => self.compile_expr(value)?,
                (None, Some(_)) => {
                    info.use_default(default_idx);
                }
                (None, None) => {
                    return Err(CompileErrorKind::MissingArg {
                        name: name.into(),
                        param: param.name.into(),
                    });
                }
            }
            if param.default.is_some() {
                default_idx += 1;
            }
        }

        self.emit(
            Opcode::Call,
            &[
                (CallKind::Func as u32).into(),
                Operand::Abs(label),
                info.bits().into(),
            ],
        );
        self.pop_stack_n(args.len());
        if !decl.ret.is_void() {
            self.push_stack();
        }
        Ok(())
    }

    fn compile_native_call(&mut self, name: &str, idx: u32, args: &'a [Arg<'a>]) -> CResult<()> {
        let globals = self.globals;
        let Some(native) = globals.native(idx) else {
            return Err(CompileErrorKind::UnknownFunction(name.into()));
        };
        if args.len() != native.arity() {
            return Err(CompileErrorKind::ArgCount {
                name: name.into(),
                expected: native.arity(),
                found: args.len(),
            });
        }
        for (arg, (param, _)) in args.iter().zip(native.params()) {
            if let Some(given) = arg.name
                && given != param
            {
                return Err(CompileErrorKind::UnknownParam {
                    name: name.into(),
                    param: given.into(),
                });
            }
            self.compile_expr(arg.value)?;
        }
        self.emit(
            Opcode::Call,
            &[
                (CallKind::Native as u32).into(),
                idx.into(),
                (args.len() as u32).into(),
            ],
        );
        self.pop_stack_n(args.len());
        if native.returns_value() {
            self.push_stack();
        }
        Ok(())
    }

    fn compile_method_call(
        &mut self,
        obj: &'a Expr<'a>,
        ty: &Type<'a>,
        name: &str,
        args: &'a [&'a Expr<'a>],
    ) -> CResult<()> {
        let unknown = || CompileErrorKind::UnknownMethod {
            ty: type_name(ty).into(),
            method: name.into(),
        };
        let (sym, method, arity, returns) = match ty {
            Type::Array(_) => {
                let method = members::array::method(name).ok_or_else(unknown)?;
                (
                    types::ARRAY,
                    method,
                    members::array::arity(method),
                    members::array::returns_value(method),
                )
            }
            Type::Dict(_, _) => {
                let method = members::dict::method(name).ok_or_else(unknown)?;
                (
                    types::DICT,
                    method,
                    members::dict::arity(method),
                    members::dict::returns_value(method),
                )
            }
            _ => return Err(unknown()),
        };
        if args.len() != arity {
            return Err(CompileErrorKind::ArgCount {
                name: name.into(),
                expected: arity,
                found: args.len(),
            });
        }

        if method == set_at(sym) {
            // SetAt(key, value) shares the stack layout of index assignment.
            self.compile_expr(args[1])?;
            self.compile_expr(obj)?;
            self.compile_expr(args[0])?;
        } else {
            self.compile_expr(obj)?;
            for arg in args {
                self.compile_expr(arg)?;
            }
        }
        self.emit(Opcode::MCall, &[sym.id().into(), method.into()]);
        self.pop_stack_n(args.len() + 1);
        if returns {
            self.push_stack();
        }
        Ok(())
    }

    // === Types & Members ===

    /// Symbol of a type `new` can create.
    fn instantiable(&mut self, ty: &Type<'a>) -> CResult<Symbol> {
        match ty {
            Type::Array(_) | Type::Dict(_, _) => self.type_symbol(ty),
            Type::Class(name)
                if self.classes.contains_key(name) || self.globals.find_class(name).is_some() =>
            {
                self.type_symbol(ty)
            }
            other => Err(CompileErrorKind::UnknownClass(type_name(other).into())),
        }
    }

    fn member_index(&mut self, ty: &Type<'a>, name: &str) -> CResult<(Symbol, u32)> {
        let unknown = || CompileErrorKind::UnknownField {
            class: type_name(ty).into(),
            field: name.into(),
        };
        match ty {
            Type::Array(_) => Ok((types::ARRAY, members::array::field(name).ok_or_else(unknown)?)),
            Type::Dict(_, _) => Ok((types::DICT, members::dict::field(name).ok_or_else(unknown)?)),
            Type::Class(class) => {
                let idx = if let Some(info) = self.classes.get(class) {
                    info.fields.iter().position(|(field, _)| *field == name)
                } else if let Some(native) = self.globals.find_class(class) {
                    native.field_index(name).map(|idx| idx as usize)
                } else {
                    return Err(CompileErrorKind::UnknownClass((*class).into()));
                };
                let idx = idx.ok_or_else(unknown)? as u32;
                Ok((self.intern(class)?, idx))
            }
            _ => Err(unknown()),
        }
    }
}

/// Whether calling a local of type `ty` leaves a result on the stack.
fn returns_value(ty: Type<'_>) -> bool {
    match ty {
        Type::Func(ret) => !ret.is_void(),
        _ => true,
    }
}

fn type_name<'a>(ty: &Type<'a>) -> &'a str {
    match ty {
        Type::Int => "int",
        Type::Float => "float",
        Type::Bool => "bool",
        Type::Str => "string",
        Type::Void => "void",
        Type::Any => "any",
        Type::Array(_) => "[]",
        Type::Dict(_, _) => "[:]",
        Type::Func(_) => "func",
        Type::Class(name) => *name,
    }
}

fn value_kind(ty: &Type<'_>) -> ValKind {
    match ty {
        Type::Int | Type::Float => ValKind::Num,
        Type::Bool => ValKind::Bool,
        Type::Str => ValKind::Str,
        Type::Void | Type::Any => ValKind::Nil,
        Type::Array(_) | Type::Dict(_, _) | Type::Func(_) | Type::Class(_) => ValKind::Obj,
    }
}

fn container_symbol(ty: &Type<'_>, method: &str) -> CResult<Symbol> {
    match ty {
        Type::Array(_) => Ok(types::ARRAY),
        Type::Dict(_, _) => Ok(types::DICT),
        other => Err(CompileErrorKind::UnknownMethod {
            ty: type_name(other).into(),
            method: method.into(),
        }),
    }
}

fn at(container: Symbol) -> u32 {
    if container == types::DICT {
        members::dict::AT
    } else {
        members::array::AT
    }
}

fn set_at(container: Symbol) -> u32 {
    if container == types::DICT {
        members::dict::SET_AT
    } else {
        members::array::SET_AT
    }
}

fn binary_opcode(op: BinOp) -> Opcode {
    match op {
        BinOp::Add => Opcode::Add,
        BinOp::Sub => Opcode::Sub,
        BinOp::Mul => Opcode::Mul,
        BinOp::Div => Opcode::Div,
        BinOp::Mod => Opcode::Mod,
        BinOp::BitAnd => Opcode::BitAnd,
        BinOp::BitOr => Opcode::BitOr,
        BinOp::And => Opcode::And,
        BinOp::Or => Opcode::Or,
        BinOp::Eq => Opcode::Equal,
        BinOp::Ne => Opcode::NotEqual,
        BinOp::Gt => Opcode::Greater,
        BinOp::Ge => Opcode::GreaterOrEqual,
        BinOp::Lt => Opcode::Less,
        BinOp::Le => Opcode::LessOrEqual,
    }
}
