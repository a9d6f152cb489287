//! Host interop: native functions, native classes and the globals table.
//!
//! A [`Globals`] table is built once by the embedder and shared between the
//! compiler (which resolves names to indexes) and every VM that runs the
//! compiled modules. Native functions are called with a [`CallCtx`] over the
//! caller's operand stack; a native that needs more than one tick returns a
//! [`Coroutine`] that the VM keeps ticking until it reports
//! [`Status::Success`].

mod builtins;

pub use builtins::{Suspend, YieldOnce};

use alloc::rc::Rc;
use core::any::Any;
use core::fmt;

use ecow::EcoString;
use hashbrown::HashMap;
use thiserror::Error;

use crate::bytecode::{FuncArgsInfo, Opcode};
use crate::symbols::{Symbol, types};
use crate::values::{NativeObj, Pools, Val};
use crate::vm::{Stack, Status, VmError};
use crate::{Box, Vec};

/// Errors raised while filling a [`Globals`] table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("native function `{0}` is already defined")]
    DuplicateFunction(EcoString),

    #[error("native class `{0}` is already defined")]
    DuplicateClass(EcoString),

    #[error("native class `{class}` extends unknown class `{parent}`")]
    UnknownParent { class: EcoString, parent: EcoString },

    #[error("native function `{0}` takes more than {max} parameters", max = FuncArgsInfo::MAX_ARGS)]
    TooManyParams(EcoString),
}

/// Multi-tick native work.
pub trait Coroutine {
    /// Advances the work by one VM tick. The context's stack is the operand
    /// stack of the frame that made the call; push the result there before
    /// returning [`Status::Success`] if the native returns a value.
    fn tick(&mut self, ctx: &mut CallCtx<'_>) -> Result<Status, VmError>;

    /// Called when the coroutine is abandoned before finishing, for example
    /// because a sibling `paral` branch won.
    fn cleanup(&mut self) {}
}

/// Result of a native call: `None` when it finished synchronously.
pub type NativeResult = Result<Option<Box<dyn Coroutine>>, VmError>;

pub type NativeFn = Rc<dyn Fn(&mut CallCtx<'_>) -> NativeResult>;

/// What a native function sees of the VM.
pub struct CallCtx<'a> {
    stack: &'a mut Stack<Val>,
    pools: &'a Pools,
    args_info: FuncArgsInfo,
}

impl<'a> CallCtx<'a> {
    pub(crate) fn new(stack: &'a mut Stack<Val>, pools: &'a Pools, args_info: FuncArgsInfo) -> Self {
        Self {
            stack,
            pools,
            args_info,
        }
    }

    /// Number of arguments the caller pushed.
    pub fn arg_count(&self) -> u32 {
        self.args_info.count()
    }

    /// Pops the next argument. Arguments come off in reverse order: the last
    /// one first.
    pub fn pop(&mut self) -> Result<Val, VmError> {
        self.stack
            .pop()
            .ok_or(VmError::StackUnderflow { op: Opcode::Call })
    }

    pub fn pop_num(&mut self) -> Result<f64, VmError> {
        let value = self.pop()?;
        value.as_num().ok_or(VmError::TypeMismatch {
            expected: "number",
            found: value.kind(),
        })
    }

    pub fn pop_bool(&mut self) -> Result<bool, VmError> {
        let value = self.pop()?;
        value.as_bool().ok_or(VmError::TypeMismatch {
            expected: "bool",
            found: value.kind(),
        })
    }

    pub fn pop_str(&mut self) -> Result<EcoString, VmError> {
        match self.pop()? {
            Val::Str(s) => Ok(s),
            other => Err(VmError::TypeMismatch {
                expected: "string",
                found: other.kind(),
            }),
        }
    }

    /// Pushes the call's result.
    pub fn push(&mut self, value: impl Into<Val>) -> Result<(), VmError> {
        self.stack.push(value.into())
    }

    pub fn pools(&self) -> &Pools {
        self.pools
    }
}

/// A host function callable from scripts.
#[derive(Clone)]
pub struct NativeFunc {
    name: EcoString,
    ret: Symbol,
    params: Vec<(EcoString, Symbol)>,
    func: NativeFn,
}

impl NativeFunc {
    /// `ret` is the type symbol of the result, [`types::VOID`] for none.
    pub fn new<F>(name: &str, ret: Symbol, params: &[(&str, Symbol)], func: F) -> Self
    where
        F: Fn(&mut CallCtx<'_>) -> NativeResult + 'static,
    {
        Self {
            name: name.into(),
            ret,
            params: params.iter().map(|(n, ty)| (EcoString::from(*n), *ty)).collect(),
            func: Rc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ret(&self) -> Symbol {
        self.ret
    }

    pub fn returns_value(&self) -> bool {
        self.ret != types::VOID
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn params(&self) -> impl Iterator<Item = (&str, Symbol)> {
        self.params.iter().map(|(n, ty)| (n.as_str(), *ty))
    }

    pub(crate) fn call(&self, ctx: &mut CallCtx<'_>) -> NativeResult {
        (self.func)(ctx)
    }
}

impl fmt::Debug for NativeFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunc")
            .field("name", &self.name)
            .field("ret", &self.ret)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

type Getter = Rc<dyn Fn(&NativeObj) -> Result<Val, VmError>>;
type Setter = Rc<dyn Fn(&NativeObj, Val) -> Result<(), VmError>>;

/// A field of a native class, backed by host accessors.
#[derive(Clone)]
pub struct NativeField {
    name: EcoString,
    ty: Symbol,
    get: Getter,
    set: Setter,
}

impl NativeField {
    pub fn new<G, S>(name: &str, ty: Symbol, get: G, set: S) -> Self
    where
        G: Fn(&NativeObj) -> Result<Val, VmError> + 'static,
        S: Fn(&NativeObj, Val) -> Result<(), VmError> + 'static,
    {
        Self {
            name: name.into(),
            ty,
            get: Rc::new(get),
            set: Rc::new(set),
        }
    }

    /// Accessors over a concrete payload type `T`. Reading or writing an
    /// object whose payload is not a `T` is a type mismatch.
    pub fn typed<T: 'static>(
        name: &str,
        ty: Symbol,
        get: fn(&T) -> Val,
        set: fn(&mut T, Val) -> Result<(), VmError>,
    ) -> Self {
        Self::new(
            name,
            ty,
            move |obj| obj.with(get).ok_or_else(payload_mismatch),
            move |obj, value| obj.with_mut(|data| set(data, value)).ok_or_else(payload_mismatch)?,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> Symbol {
        self.ty
    }

    pub(crate) fn get(&self, obj: &NativeObj) -> Result<Val, VmError> {
        (self.get)(obj)
    }

    pub(crate) fn set(&self, obj: &NativeObj, value: Val) -> Result<(), VmError> {
        (self.set)(obj, value)
    }
}

fn payload_mismatch() -> VmError {
    VmError::TypeMismatch {
        expected: "native payload",
        found: crate::values::ValKind::Obj,
    }
}

impl fmt::Debug for NativeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}", self.name, self.ty)
    }
}

/// A host class that scripts can instantiate with `new` and access through
/// its fields.
#[derive(Clone)]
pub struct NativeClass {
    name: EcoString,
    sym: Symbol,
    parent: Option<EcoString>,
    alloc: Rc<dyn Fn() -> Box<dyn Any>>,
    /// Own fields until registration; parent-first and complete afterwards.
    fields: Vec<NativeField>,
}

impl NativeClass {
    pub fn new<A>(name: &str, alloc: A) -> Self
    where
        A: Fn() -> Box<dyn Any> + 'static,
    {
        Self {
            name: name.into(),
            sym: Symbol::new(name),
            parent: None,
            alloc: Rc::new(alloc),
            fields: Vec::new(),
        }
    }

    pub fn extends(mut self, parent: &str) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn field(mut self, field: NativeField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> Symbol {
        self.sym
    }

    pub fn parent(&self) -> Option<Symbol> {
        self.parent.as_deref().map(Symbol::new)
    }

    pub fn fields(&self) -> &[NativeField] {
        &self.fields
    }

    pub fn field_index(&self, name: &str) -> Option<u32> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .map(|idx| idx as u32)
    }

    pub(crate) fn instantiate(&self) -> NativeObj {
        NativeObj::new(self.sym, (self.alloc)())
    }
}

impl fmt::Debug for NativeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeClass")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

/// Natives and native classes visible to scripts.
#[derive(Default)]
pub struct Globals {
    funcs: Vec<NativeFunc>,
    by_name: HashMap<EcoString, u32>,
    classes: HashMap<Symbol, NativeClass>,
}

impl Globals {
    /// An empty table. Scripts compiled against it cannot use
    /// `yield while`.
    pub fn new() -> Self {
        Self::default()
    }

    /// A table holding `yield` (index 0) and `suspend` (index 1).
    pub fn with_builtins() -> Self {
        let mut globals = Self::new();
        globals
            .install_builtins()
            .expect("builtin names are unique");
        globals
    }

    /// Adds `yield` and `suspend` after the natives defined so far.
    pub fn install_builtins(&mut self) -> Result<(), BindError> {
        builtins::install(self)
    }

    /// Registers a native function and returns its call index.
    pub fn define(&mut self, func: NativeFunc) -> Result<u32, BindError> {
        if self.by_name.contains_key(&func.name) {
            return Err(BindError::DuplicateFunction(func.name));
        }
        if func.params.len() > FuncArgsInfo::MAX_ARGS as usize {
            return Err(BindError::TooManyParams(func.name));
        }
        let idx = self.funcs.len() as u32;
        self.by_name.insert(func.name.clone(), idx);
        self.funcs.push(func);
        Ok(idx)
    }

    /// Registers a native class. A parent must be registered first; its
    /// fields are laid out before the class's own.
    pub fn define_class(&mut self, mut class: NativeClass) -> Result<Symbol, BindError> {
        if self.classes.contains_key(&class.sym) {
            return Err(BindError::DuplicateClass(class.name));
        }
        if let Some(parent_name) = &class.parent {
            let parent = self
                .classes
                .get(&Symbol::new(parent_name))
                .ok_or_else(|| BindError::UnknownParent {
                    class: class.name.clone(),
                    parent: parent_name.clone(),
                })?;
            let mut fields = parent.fields.clone();
            fields.append(&mut class.fields);
            class.fields = fields;
        }
        let sym = class.sym;
        self.classes.insert(sym, class);
        Ok(sym)
    }

    pub fn find_native(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    pub fn native(&self, idx: u32) -> Option<&NativeFunc> {
        self.funcs.get(idx as usize)
    }

    pub fn class(&self, sym: Symbol) -> Option<&NativeClass> {
        self.classes.get(&sym)
    }

    pub fn find_class(&self, name: &str) -> Option<&NativeClass> {
        self.class(Symbol::new(name))
    }

    pub fn natives(&self) -> impl Iterator<Item = &NativeFunc> {
        self.funcs.iter()
    }

    /// Whether `sym` names `ancestor` or one of its subclasses.
    pub fn class_is_a(&self, sym: Symbol, ancestor: Symbol) -> bool {
        let mut current = Some(sym);
        while let Some(class) = current {
            if class == ancestor {
                return true;
            }
            current = self.class(class).and_then(NativeClass::parent);
        }
        false
    }
}

impl fmt::Debug for Globals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Globals")
            .field("funcs", &self.funcs)
            .field("classes", &self.classes.values().collect::<Vec<_>>())
            .finish()
    }
}
