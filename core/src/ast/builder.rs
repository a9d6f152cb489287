use bumpalo::Bump;

use super::*;

/// Convenience constructors for arena-allocated trees.
///
/// ```ignore
/// let arena = Bump::new();
/// let b = AstBuilder::new(&arena);
/// let module = b.module("demo", &[b.func("test", Type::Int, &[], &[
///     b.ret(b.mul(b.num(10.0), b.add(b.num(20.0), b.num(30.0)))),
/// ])]);
/// ```
#[derive(Clone, Copy)]
pub struct AstBuilder<'a> {
    arena: &'a Bump,
}

impl<'a> AstBuilder<'a> {
    pub fn new(arena: &'a Bump) -> Self {
        Self { arena }
    }

    fn name(&self, s: &str) -> &'a str {
        self.arena.alloc_str(s)
    }

    fn expr(&self, e: Expr<'a>) -> &'a Expr<'a> {
        self.arena.alloc(e)
    }

    fn slice<T: Copy>(&self, items: &[T]) -> &'a [T] {
        self.arena.alloc_slice_copy(items)
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    pub fn module(&self, name: &str, decls: &[Decl<'a>]) -> Module<'a> {
        Module {
            name: self.name(name),
            file: None,
            decls: self.slice(decls),
        }
    }

    pub fn module_in_file(&self, name: &str, file: &str, decls: &[Decl<'a>]) -> Module<'a> {
        Module {
            file: Some(self.name(file)),
            ..self.module(name, decls)
        }
    }

    pub fn func(
        &self,
        name: &str,
        ret: Type<'a>,
        params: &[Param<'a>],
        body: &[Stmt<'a>],
    ) -> Decl<'a> {
        Decl::Func(self.arena.alloc(FuncDecl {
            name: self.name(name),
            ret,
            params: self.slice(params),
            body: self.slice(body),
        }))
    }

    pub fn param(&self, name: &str, ty: Type<'a>) -> Param<'a> {
        Param {
            name: self.name(name),
            ty,
            default: None,
        }
    }

    pub fn param_default(&self, name: &str, ty: Type<'a>, default: &'a Expr<'a>) -> Param<'a> {
        Param {
            default: Some(default),
            ..self.param(name, ty)
        }
    }

    pub fn class(&self, name: &str, parent: Option<&str>, fields: &[(&str, Type<'a>)]) -> Decl<'a> {
        let fields = self.arena.alloc_slice_fill_iter(fields.iter().map(|(name, ty)| Field {
            name: self.name(name),
            ty: *ty,
        }));
        Decl::Class(self.arena.alloc(ClassDecl {
            name: self.name(name),
            parent: parent.map(|p| self.name(p)),
            fields,
        }))
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    pub fn array_of(&self, elem: Type<'a>) -> Type<'a> {
        Type::Array(self.arena.alloc(elem))
    }

    pub fn dict_of(&self, key: Type<'a>, value: Type<'a>) -> Type<'a> {
        Type::Dict(self.arena.alloc(key), self.arena.alloc(value))
    }

    pub fn func_of(&self, ret: Type<'a>) -> Type<'a> {
        Type::Func(self.arena.alloc(ret))
    }

    pub fn class_type(&self, name: &str) -> Type<'a> {
        Type::Class(self.name(name))
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub fn num(&self, value: f64) -> &'a Expr<'a> {
        self.expr(Expr::Literal(Literal::Num(value)))
    }

    pub fn boolean(&self, value: bool) -> &'a Expr<'a> {
        self.expr(Expr::Literal(Literal::Bool(value)))
    }

    pub fn string(&self, value: &str) -> &'a Expr<'a> {
        self.expr(Expr::Literal(Literal::Str(self.name(value))))
    }

    pub fn nil(&self) -> &'a Expr<'a> {
        self.expr(Expr::Literal(Literal::Nil))
    }

    pub fn var(&self, name: &str) -> &'a Expr<'a> {
        self.expr(Expr::Var(self.name(name)))
    }

    pub fn binary(&self, op: BinOp, lhs: &'a Expr<'a>, rhs: &'a Expr<'a>) -> &'a Expr<'a> {
        self.expr(Expr::Binary { op, lhs, rhs })
    }

    pub fn add(&self, lhs: &'a Expr<'a>, rhs: &'a Expr<'a>) -> &'a Expr<'a> {
        self.binary(BinOp::Add, lhs, rhs)
    }

    pub fn sub(&self, lhs: &'a Expr<'a>, rhs: &'a Expr<'a>) -> &'a Expr<'a> {
        self.binary(BinOp::Sub, lhs, rhs)
    }

    pub fn mul(&self, lhs: &'a Expr<'a>, rhs: &'a Expr<'a>) -> &'a Expr<'a> {
        self.binary(BinOp::Mul, lhs, rhs)
    }

    pub fn unary(&self, op: UnaryOp, expr: &'a Expr<'a>) -> &'a Expr<'a> {
        self.expr(Expr::Unary { op, expr })
    }

    pub fn neg(&self, expr: &'a Expr<'a>) -> &'a Expr<'a> {
        self.unary(UnaryOp::Neg, expr)
    }

    pub fn not(&self, expr: &'a Expr<'a>) -> &'a Expr<'a> {
        self.unary(UnaryOp::Not, expr)
    }

    pub fn arg(&self, value: &'a Expr<'a>) -> Arg<'a> {
        Arg { name: None, value }
    }

    pub fn named(&self, name: &str, value: &'a Expr<'a>) -> Arg<'a> {
        Arg {
            name: Some(self.name(name)),
            value,
        }
    }

    /// Positional call of a function, native or function-typed local.
    pub fn call(&self, name: &str, args: &[&'a Expr<'a>]) -> &'a Expr<'a> {
        let args = self
            .arena
            .alloc_slice_fill_iter(args.iter().map(|value| self.arg(*value)));
        self.expr(Expr::Call {
            callee: Callee::Name(self.name(name)),
            args,
        })
    }

    pub fn call_args(&self, name: &str, args: &[Arg<'a>]) -> &'a Expr<'a> {
        self.expr(Expr::Call {
            callee: Callee::Name(self.name(name)),
            args: self.slice(args),
        })
    }

    /// Calls the function value `func`, which returns `ret`.
    pub fn call_value(
        &self,
        func: &'a Expr<'a>,
        ret: Type<'a>,
        args: &[&'a Expr<'a>],
    ) -> &'a Expr<'a> {
        let args = self
            .arena
            .alloc_slice_fill_iter(args.iter().map(|value| self.arg(*value)));
        self.expr(Expr::Call {
            callee: Callee::Expr { func, ret },
            args,
        })
    }

    pub fn lambda(&self, ret: Type<'a>, params: &[Param<'a>], body: &[Stmt<'a>]) -> &'a Expr<'a> {
        self.expr(Expr::Lambda(self.arena.alloc(LambdaDecl {
            ret,
            params: self.slice(params),
            body: self.slice(body),
        })))
    }

    pub fn new_obj(&self, ty: Type<'a>) -> &'a Expr<'a> {
        self.expr(Expr::New(ty))
    }

    pub fn member(&self, obj: &'a Expr<'a>, ty: Type<'a>, name: &str) -> &'a Expr<'a> {
        self.expr(Expr::Member {
            obj,
            ty,
            name: self.name(name),
        })
    }

    pub fn method(
        &self,
        obj: &'a Expr<'a>,
        ty: Type<'a>,
        name: &str,
        args: &[&'a Expr<'a>],
    ) -> &'a Expr<'a> {
        self.expr(Expr::MethodCall {
            obj,
            ty,
            name: self.name(name),
            args: self.slice(args),
        })
    }

    pub fn index(&self, obj: &'a Expr<'a>, ty: Type<'a>, index: &'a Expr<'a>) -> &'a Expr<'a> {
        self.expr(Expr::Index { obj, ty, index })
    }

    pub fn cast(&self, ty: Type<'a>, expr: &'a Expr<'a>) -> &'a Expr<'a> {
        self.expr(Expr::Cast { ty, expr })
    }

    pub fn json_obj(&self, ty: Type<'a>, fields: &[(&str, &'a Expr<'a>)]) -> &'a Expr<'a> {
        let fields = self
            .arena
            .alloc_slice_fill_iter(fields.iter().map(|(name, value)| (self.name(name), *value)));
        self.expr(Expr::JsonObj { ty, fields })
    }

    pub fn json_arr(&self, ty: Type<'a>, items: &[&'a Expr<'a>]) -> &'a Expr<'a> {
        self.expr(Expr::JsonArr {
            ty,
            items: self.slice(items),
        })
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    pub fn declare(&self, name: &str, ty: Type<'a>) -> Stmt<'a> {
        Stmt::VarDecl {
            name: self.name(name),
            ty,
            init: None,
        }
    }

    pub fn define(&self, name: &str, ty: Type<'a>, init: &'a Expr<'a>) -> Stmt<'a> {
        Stmt::VarDecl {
            name: self.name(name),
            ty,
            init: Some(init),
        }
    }

    pub fn assign(&self, name: &str, value: &'a Expr<'a>) -> Stmt<'a> {
        Stmt::Assign {
            target: Target::Var(self.name(name)),
            value,
        }
    }

    pub fn assign_member(
        &self,
        obj: &'a Expr<'a>,
        ty: Type<'a>,
        name: &str,
        value: &'a Expr<'a>,
    ) -> Stmt<'a> {
        Stmt::Assign {
            target: Target::Member {
                obj,
                ty,
                name: self.name(name),
            },
            value,
        }
    }

    pub fn assign_index(
        &self,
        obj: &'a Expr<'a>,
        ty: Type<'a>,
        index: &'a Expr<'a>,
        value: &'a Expr<'a>,
    ) -> Stmt<'a> {
        Stmt::Assign {
            target: Target::Index { obj, ty, index },
            value,
        }
    }

    pub fn eval(&self, expr: &'a Expr<'a>) -> Stmt<'a> {
        Stmt::Expr(expr)
    }

    pub fn ret(&self, expr: &'a Expr<'a>) -> Stmt<'a> {
        Stmt::Return(Some(expr))
    }

    pub fn ret_void(&self) -> Stmt<'a> {
        Stmt::Return(None)
    }

    pub fn if_(&self, cond: &'a Expr<'a>, then: &[Stmt<'a>]) -> Stmt<'a> {
        self.if_chain(&[(cond, then)], None)
    }

    pub fn if_else(&self, cond: &'a Expr<'a>, then: &[Stmt<'a>], otherwise: &[Stmt<'a>]) -> Stmt<'a> {
        self.if_chain(&[(cond, then)], Some(otherwise))
    }

    pub fn if_chain(
        &self,
        branches: &[(&'a Expr<'a>, &[Stmt<'a>])],
        otherwise: Option<&[Stmt<'a>]>,
    ) -> Stmt<'a> {
        let branches = self
            .arena
            .alloc_slice_fill_iter(branches.iter().map(|(cond, body)| (*cond, self.slice(body))));
        Stmt::If {
            branches,
            otherwise: otherwise.map(|body| self.slice(body)),
        }
    }

    pub fn while_(&self, cond: &'a Expr<'a>, body: &[Stmt<'a>]) -> Stmt<'a> {
        Stmt::While {
            cond,
            body: self.slice(body),
        }
    }

    pub fn for_(
        &self,
        init: &[Stmt<'a>],
        cond: &'a Expr<'a>,
        step: &[Stmt<'a>],
        body: &[Stmt<'a>],
    ) -> Stmt<'a> {
        Stmt::For {
            init: self.slice(init),
            cond,
            step: self.slice(step),
            body: self.slice(body),
        }
    }

    pub fn foreach(
        &self,
        elem_ty: Type<'a>,
        var: &str,
        array: &'a Expr<'a>,
        body: &[Stmt<'a>],
    ) -> Stmt<'a> {
        Stmt::Foreach {
            elem_ty,
            var: self.name(var),
            array,
            body: self.slice(body),
        }
    }

    pub fn block(&self, kind: BlockKind, body: &[Stmt<'a>]) -> Stmt<'a> {
        Stmt::Block {
            kind,
            body: self.slice(body),
        }
    }

    pub fn seq(&self, body: &[Stmt<'a>]) -> Stmt<'a> {
        self.block(BlockKind::Seq, body)
    }

    pub fn paral(&self, body: &[Stmt<'a>]) -> Stmt<'a> {
        self.block(BlockKind::Paral, body)
    }

    pub fn paral_all(&self, body: &[Stmt<'a>]) -> Stmt<'a> {
        self.block(BlockKind::ParalAll, body)
    }

    pub fn defer(&self, body: &[Stmt<'a>]) -> Stmt<'a> {
        self.block(BlockKind::Defer, body)
    }

    pub fn yield_while(&self, cond: &'a Expr<'a>) -> Stmt<'a> {
        Stmt::YieldWhile(cond)
    }
}
