//! Compiler input: a type-checked, arena-allocated syntax tree.
//!
//! Parsing and type checking happen outside this crate. The front-end hands
//! over a tree in which names are still strings but every member or index
//! access already carries the static type of its receiver. Trees are usually
//! built with [`AstBuilder`].

mod builder;

pub use builder::AstBuilder;

use crate::symbols::{Symbol, types};

/// Static type annotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Type<'a> {
    Int,
    Float,
    Bool,
    Str,
    Void,
    Any,
    Array(&'a Type<'a>),
    Dict(&'a Type<'a>, &'a Type<'a>),
    /// Function value returning the given type.
    Func(&'a Type<'a>),
    /// Script or native class, by name.
    Class(&'a str),
}

impl Type<'_> {
    /// The symbol bytecode uses for this type.
    pub fn symbol(&self) -> Symbol {
        match self {
            Type::Int => types::INT,
            Type::Float => types::FLOAT,
            Type::Bool => types::BOOL,
            Type::Str => types::STRING,
            Type::Void => types::VOID,
            Type::Any => types::ANY,
            Type::Array(_) => types::ARRAY,
            Type::Dict(_, _) => types::DICT,
            Type::Func(_) => types::FUNC,
            Type::Class(name) => Symbol::new(name),
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Module<'a> {
    pub name: &'a str,
    /// Source path reported in compile errors.
    pub file: Option<&'a str>,
    pub decls: &'a [Decl<'a>],
}

#[derive(Debug, Clone, Copy)]
pub enum Decl<'a> {
    Func(&'a FuncDecl<'a>),
    Class(&'a ClassDecl<'a>),
}

#[derive(Debug, Clone, Copy)]
pub struct FuncDecl<'a> {
    pub name: &'a str,
    pub ret: Type<'a>,
    pub params: &'a [Param<'a>],
    pub body: &'a [Stmt<'a>],
}

#[derive(Debug, Clone, Copy)]
pub struct Param<'a> {
    pub name: &'a str,
    pub ty: Type<'a>,
    pub default: Option<&'a Expr<'a>>,
}

#[derive(Debug, Clone, Copy)]
pub struct ClassDecl<'a> {
    pub name: &'a str,
    pub parent: Option<&'a str>,
    pub fields: &'a [Field<'a>],
}

#[derive(Debug, Clone, Copy)]
pub struct Field<'a> {
    pub name: &'a str,
    pub ty: Type<'a>,
}

#[derive(Debug, Clone, Copy)]
pub struct LambdaDecl<'a> {
    pub ret: Type<'a>,
    pub params: &'a [Param<'a>],
    pub body: &'a [Stmt<'a>],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Seq,
    Paral,
    ParalAll,
    Defer,
}

#[derive(Debug, Clone, Copy)]
pub enum Stmt<'a> {
    /// `ty name = init` or a bare `ty name` declaration.
    VarDecl {
        name: &'a str,
        ty: Type<'a>,
        init: Option<&'a Expr<'a>>,
    },
    Assign {
        target: Target<'a>,
        value: &'a Expr<'a>,
    },
    Expr(&'a Expr<'a>),
    /// `if c1 {..} else if c2 {..} else {..}` as one flat chain.
    If {
        branches: &'a [(&'a Expr<'a>, &'a [Stmt<'a>])],
        otherwise: Option<&'a [Stmt<'a>]>,
    },
    While {
        cond: &'a Expr<'a>,
        body: &'a [Stmt<'a>],
    },
    For {
        init: &'a [Stmt<'a>],
        cond: &'a Expr<'a>,
        step: &'a [Stmt<'a>],
        body: &'a [Stmt<'a>],
    },
    Foreach {
        elem_ty: Type<'a>,
        var: &'a str,
        array: &'a Expr<'a>,
        body: &'a [Stmt<'a>],
    },
    Return(Option<&'a Expr<'a>>),
    Block {
        kind: BlockKind,
        body: &'a [Stmt<'a>],
    },
    /// `yield while (cond)`: keep yielding while `cond` holds.
    YieldWhile(&'a Expr<'a>),
}

/// Left-hand side of an assignment.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    Var(&'a str),
    Member {
        obj: &'a Expr<'a>,
        ty: Type<'a>,
        name: &'a str,
    },
    Index {
        obj: &'a Expr<'a>,
        ty: Type<'a>,
        index: &'a Expr<'a>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    And,
    Or,
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal<'a> {
    Nil,
    Num(f64),
    Bool(bool),
    Str(&'a str),
}

#[derive(Debug, Clone, Copy)]
pub enum Callee<'a> {
    /// Script function, native function or function-typed local.
    Name(&'a str),
    /// Any expression producing a function value, returning `ret`.
    Expr { func: &'a Expr<'a>, ret: Type<'a> },
}

#[derive(Debug, Clone, Copy)]
pub struct Arg<'a> {
    pub name: Option<&'a str>,
    pub value: &'a Expr<'a>,
}

#[derive(Debug, Clone, Copy)]
pub enum Expr<'a> {
    Literal(Literal<'a>),
    Var(&'a str),
    Binary {
        op: BinOp,
        lhs: &'a Expr<'a>,
        rhs: &'a Expr<'a>,
    },
    Unary {
        op: UnaryOp,
        expr: &'a Expr<'a>,
    },
    Call {
        callee: Callee<'a>,
        args: &'a [Arg<'a>],
    },
    Lambda(&'a LambdaDecl<'a>),
    New(Type<'a>),
    Member {
        obj: &'a Expr<'a>,
        ty: Type<'a>,
        name: &'a str,
    },
    MethodCall {
        obj: &'a Expr<'a>,
        ty: Type<'a>,
        name: &'a str,
        args: &'a [&'a Expr<'a>],
    },
    Index {
        obj: &'a Expr<'a>,
        ty: Type<'a>,
        index: &'a Expr<'a>,
    },
    Cast {
        ty: Type<'a>,
        expr: &'a Expr<'a>,
    },
    /// `{Field: value, ..}` initializer of a class instance.
    JsonObj {
        ty: Type<'a>,
        fields: &'a [(&'a str, &'a Expr<'a>)],
    },
    /// `[a, b, ..]` initializer of an array.
    JsonArr {
        ty: Type<'a>,
        items: &'a [&'a Expr<'a>],
    },
}
