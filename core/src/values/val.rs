use alloc::rc::Rc;
use core::cell::RefCell;
use core::fmt;

use ecow::EcoString;

use super::dict::ValDict;
use super::list::ValList;
use super::object::{FuncPtr, Instance, NativeObj};
use crate::bytecode::Const;

/// Runtime value kind. Also the second operand of `DeclVar`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValKind {
    Nil = 0,
    Num = 1,
    Bool = 2,
    Str = 3,
    Obj = 4,
}

impl ValKind {
    pub const fn from_operand(value: u32) -> Option<ValKind> {
        match value {
            0 => Some(ValKind::Nil),
            1 => Some(ValKind::Num),
            2 => Some(ValKind::Bool),
            3 => Some(ValKind::Str),
            4 => Some(ValKind::Obj),
            _ => None,
        }
    }
}

impl fmt::Display for ValKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValKind::Nil => "nil",
            ValKind::Num => "number",
            ValKind::Bool => "bool",
            ValKind::Str => "string",
            ValKind::Obj => "object",
        })
    }
}

/// Heap payload of an object value. Cloning shares the payload.
#[derive(Clone)]
pub enum Obj {
    List(Rc<RefCell<ValList>>),
    Dict(Rc<RefCell<ValDict>>),
    Instance(Rc<RefCell<Instance>>),
    Native(Rc<NativeObj>),
    Func(Rc<FuncPtr>),
}

impl Obj {
    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Obj) -> bool {
        match (self, other) {
            (Obj::List(a), Obj::List(b)) => Rc::ptr_eq(a, b),
            (Obj::Dict(a), Obj::Dict(b)) => Rc::ptr_eq(a, b),
            (Obj::Instance(a), Obj::Instance(b)) => Rc::ptr_eq(a, b),
            (Obj::Native(a), Obj::Native(b)) => Rc::ptr_eq(a, b),
            (Obj::Func(a), Obj::Func(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Number of live references to the payload, this one included.
    pub fn ref_count(&self) -> usize {
        match self {
            Obj::List(rc) => Rc::strong_count(rc),
            Obj::Dict(rc) => Rc::strong_count(rc),
            Obj::Instance(rc) => Rc::strong_count(rc),
            Obj::Native(rc) => Rc::strong_count(rc),
            Obj::Func(rc) => Rc::strong_count(rc),
        }
    }
}

impl fmt::Debug for Obj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Obj::List(list) => list.borrow().fmt(f),
            Obj::Dict(dict) => dict.borrow().fmt(f),
            Obj::Instance(inst) => {
                let inst = inst.borrow();
                write!(f, "{:?}", inst.class)?;
                f.debug_list().entries(inst.fields.iter()).finish()
            }
            Obj::Native(native) => native.fmt(f),
            Obj::Func(func) => func.fmt(f),
        }
    }
}

/// Tagged runtime value.
///
/// Scalars are stored inline. Object values share their payload through
/// reference counting: cloning retains, dropping (or [`Val::release`])
/// releases, and container storage goes back to the owning VM's pools when the
/// last reference dies.
#[derive(Clone, Default)]
pub enum Val {
    #[default]
    Nil,
    Num(f64),
    Bool(bool),
    Str(EcoString),
    Obj(Obj),
}

impl Val {
    pub fn kind(&self) -> ValKind {
        match self {
            Val::Nil => ValKind::Nil,
            Val::Num(_) => ValKind::Num,
            Val::Bool(_) => ValKind::Bool,
            Val::Str(_) => ValKind::Str,
            Val::Obj(_) => ValKind::Obj,
        }
    }

    /// Zero value of a declared-but-unassigned variable.
    pub fn default_of(kind: ValKind) -> Val {
        match kind {
            ValKind::Num => Val::Num(0.0),
            ValKind::Bool => Val::Bool(false),
            ValKind::Str => Val::Str(EcoString::new()),
            ValKind::Nil | ValKind::Obj => Val::Nil,
        }
    }

    pub fn set_num(&mut self, value: f64) {
        *self = Val::Num(value);
    }

    pub fn set_bool(&mut self, value: bool) {
        *self = Val::Bool(value);
    }

    pub fn set_str(&mut self, value: impl Into<EcoString>) {
        *self = Val::Str(value.into());
    }

    /// Points this value at `obj`, releasing whatever it held before.
    pub fn set_obj(&mut self, obj: Obj) {
        *self = Val::Obj(obj);
    }

    /// Gives up this reference. Containers whose last reference this was
    /// return their storage to the pools.
    pub fn release(self) {}

    pub fn is_nil(&self) -> bool {
        matches!(self, Val::Nil)
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            Val::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Val::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Val::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_obj(&self) -> Option<&Obj> {
        match self {
            Val::Obj(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Rc<RefCell<ValList>>> {
        match self {
            Val::Obj(Obj::List(list)) => Some(list),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Rc<RefCell<ValDict>>> {
        match self {
            Val::Obj(Obj::Dict(dict)) => Some(dict),
            _ => None,
        }
    }

    pub fn as_native(&self) -> Option<&Rc<NativeObj>> {
        match self {
            Val::Obj(Obj::Native(native)) => Some(native),
            _ => None,
        }
    }

    pub fn as_func(&self) -> Option<&Rc<FuncPtr>> {
        match self {
            Val::Obj(Obj::Func(func)) => Some(func),
            _ => None,
        }
    }

    /// Scalars compare by value, objects by identity.
    pub fn equals(&self, other: &Val) -> bool {
        match (self, other) {
            (Val::Nil, Val::Nil) => true,
            (Val::Num(a), Val::Num(b)) => a == b,
            (Val::Bool(a), Val::Bool(b)) => a == b,
            (Val::Str(a), Val::Str(b)) => a == b,
            (Val::Obj(a), Val::Obj(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl PartialEq for Val {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl From<&Const> for Val {
    fn from(value: &Const) -> Self {
        match value {
            Const::Nil => Val::Nil,
            Const::Num(n) => Val::Num(*n),
            Const::Bool(b) => Val::Bool(*b),
            Const::Str(s) => Val::Str(s.clone()),
        }
    }
}

impl From<f64> for Val {
    fn from(value: f64) -> Self {
        Val::Num(value)
    }
}

impl From<i32> for Val {
    fn from(value: i32) -> Self {
        Val::Num(value as f64)
    }
}

impl From<bool> for Val {
    fn from(value: bool) -> Self {
        Val::Bool(value)
    }
}

impl From<&str> for Val {
    fn from(value: &str) -> Self {
        Val::Str(EcoString::from(value))
    }
}

impl From<EcoString> for Val {
    fn from(value: EcoString) -> Self {
        Val::Str(value)
    }
}

impl From<ValList> for Val {
    fn from(value: ValList) -> Self {
        Val::Obj(Obj::List(Rc::new(RefCell::new(value))))
    }
}

impl From<ValDict> for Val {
    fn from(value: ValDict) -> Self {
        Val::Obj(Obj::Dict(Rc::new(RefCell::new(value))))
    }
}

impl From<NativeObj> for Val {
    fn from(value: NativeObj) -> Self {
        Val::Obj(Obj::Native(Rc::new(value)))
    }
}

impl fmt::Debug for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Nil => write!(f, "nil"),
            Val::Num(n) => write!(f, "{n}"),
            Val::Bool(b) => write!(f, "{b}"),
            Val::Str(s) => write!(f, "{s:?}"),
            Val::Obj(obj) => obj.fmt(f),
        }
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Str(s) => f.write_str(s),
            other => fmt::Debug::fmt(other, f),
        }
    }
}
