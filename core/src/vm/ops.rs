//! Value-level semantics of the arithmetic, object and container opcodes.

use alloc::rc::Rc;
use core::cell::RefCell;

use ecow::EcoString;

use crate::bytecode::Opcode;
use crate::bytecode::members::{array, dict};
use crate::symbols::{Symbol, types};
use crate::values::{DictKey, Instance, Obj, Val, ValKind};
use crate::format;

use super::runtime::Runtime;
use super::{Stack, VmError};

fn num(value: &Val) -> Result<f64, VmError> {
    value.as_num().ok_or(VmError::TypeMismatch {
        expected: "number",
        found: value.kind(),
    })
}

fn boolean(value: &Val) -> Result<bool, VmError> {
    value.as_bool().ok_or(VmError::TypeMismatch {
        expected: "bool",
        found: value.kind(),
    })
}

pub(crate) fn binary(op: Opcode, lhs: Val, rhs: Val) -> Result<Val, VmError> {
    if let (Opcode::Add, Val::Str(a), Val::Str(b)) = (op, &lhs, &rhs) {
        let mut joined = EcoString::with_capacity(a.len() + b.len());
        joined.push_str(a);
        joined.push_str(b);
        return Ok(Val::Str(joined));
    }
    if let Opcode::And | Opcode::Or = op {
        let (a, b) = (boolean(&lhs)?, boolean(&rhs)?);
        return Ok(Val::Bool(if op == Opcode::And { a && b } else { a || b }));
    }

    let (a, b) = (num(&lhs)?, num(&rhs)?);
    let result = match op {
        Opcode::Add => a + b,
        Opcode::Sub => a - b,
        Opcode::Mul => a * b,
        Opcode::Div => a / b,
        Opcode::Mod => a % b,
        Opcode::BitAnd => ((a as i64) & (b as i64)) as f64,
        Opcode::BitOr => ((a as i64) | (b as i64)) as f64,
        _ => unreachable!("{op:?} is not a binary operator"),
    };
    Ok(Val::Num(result))
}

pub(crate) fn compare(op: Opcode, lhs: &Val, rhs: &Val) -> Result<bool, VmError> {
    match op {
        Opcode::Equal => return Ok(lhs.equals(rhs)),
        Opcode::NotEqual => return Ok(!lhs.equals(rhs)),
        _ => {}
    }
    let ordering = match (lhs, rhs) {
        (Val::Str(a), Val::Str(b)) => a.as_str().partial_cmp(b.as_str()),
        _ => num(lhs)?.partial_cmp(&num(rhs)?),
    };
    let Some(ordering) = ordering else {
        // NaN is unordered with everything.
        return Ok(false);
    };
    Ok(match op {
        Opcode::Greater => ordering.is_gt(),
        Opcode::GreaterOrEqual => ordering.is_ge(),
        Opcode::Less => ordering.is_lt(),
        Opcode::LessOrEqual => ordering.is_le(),
        _ => unreachable!("{op:?} is not a comparison"),
    })
}

pub(crate) fn unary(op: Opcode, value: Val) -> Result<Val, VmError> {
    match op {
        Opcode::UnaryNot => Ok(Val::Bool(!boolean(&value)?)),
        Opcode::UnaryNeg => Ok(Val::Num(-num(&value)?)),
        _ => unreachable!("{op:?} is not a unary operator"),
    }
}

pub(crate) fn cast(rt: &Runtime, value: Val, target: Symbol) -> Result<Val, VmError> {
    let bad = |value: &Val| VmError::BadCast {
        found: value.kind(),
        target,
    };
    let as_num = |value: &Val| -> Result<f64, VmError> {
        match value {
            Val::Num(n) => Ok(*n),
            Val::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Val::Str(s) => s.trim().parse::<f64>().map_err(|_| bad(value)),
            _ => Err(bad(value)),
        }
    };

    match target {
        types::ANY => Ok(value),
        types::INT => Ok(Val::Num(as_num(&value)? as i64 as f64)),
        types::FLOAT => Ok(Val::Num(as_num(&value)?)),
        types::BOOL => match value {
            Val::Bool(_) => Ok(value),
            Val::Num(n) => Ok(Val::Bool(n != 0.0)),
            _ => Err(bad(&value)),
        },
        types::STRING => match &value {
            Val::Str(_) => Ok(value),
            Val::Num(_) | Val::Bool(_) => Ok(Val::Str(EcoString::from(format!("{value}")))),
            _ => Err(bad(&value)),
        },
        types::ARRAY | types::DICT | types::FUNC => {
            let fits = match &value {
                Val::Nil => true,
                Val::Obj(Obj::List(_)) => target == types::ARRAY,
                Val::Obj(Obj::Dict(_)) => target == types::DICT,
                Val::Obj(Obj::Func(_)) => target == types::FUNC,
                _ => false,
            };
            if fits { Ok(value) } else { Err(bad(&value)) }
        }
        class => {
            let fits = match &value {
                Val::Nil => true,
                Val::Obj(Obj::Instance(inst)) => rt.is_a(inst.borrow().class, class),
                Val::Obj(Obj::Native(native)) => rt.is_a(native.class(), class),
                _ => false,
            };
            if fits { Ok(value) } else { Err(bad(&value)) }
        }
    }
}

/// Initial value of a script class field of type `ty`.
fn field_default(ty: Symbol) -> Val {
    match ty {
        types::INT | types::FLOAT => Val::Num(0.0),
        types::BOOL => Val::Bool(false),
        types::STRING => Val::default_of(ValKind::Str),
        _ => Val::Nil,
    }
}

pub(crate) fn new_object(rt: &Runtime, class: Symbol) -> Result<Val, VmError> {
    match class {
        types::ARRAY => Ok(Val::from(rt.pools.new_list())),
        types::DICT => Ok(Val::from(rt.pools.new_dict())),
        _ => {
            if let Some(def) = rt.classes.get(&class) {
                let fields = def.fields.iter().map(|(ty, _)| field_default(*ty)).collect();
                let inst = Instance { class, fields };
                return Ok(Val::Obj(Obj::Instance(Rc::new(RefCell::new(inst)))));
            }
            match rt.globals.class(class) {
                Some(native) => Ok(Val::from(native.instantiate())),
                None => Err(VmError::UnknownClass { class }),
            }
        }
    }
}

fn expect_obj(value: &Val) -> Result<&Obj, VmError> {
    value.as_obj().ok_or(VmError::TypeMismatch {
        expected: "object",
        found: value.kind(),
    })
}

pub(crate) fn get_member(rt: &Runtime, obj: &Val, class: Symbol, idx: u32) -> Result<Val, VmError> {
    let unknown = |class| VmError::UnknownMember { class, idx };
    match expect_obj(obj)? {
        Obj::List(list) if idx == array::COUNT => Ok(Val::Num(list.borrow().len() as f64)),
        Obj::Dict(map) if idx == dict::COUNT => Ok(Val::Num(map.borrow().len() as f64)),
        Obj::Instance(inst) => {
            let inst = inst.borrow();
            inst.fields
                .get(idx as usize)
                .cloned()
                .ok_or_else(|| unknown(inst.class))
        }
        Obj::Native(native) => {
            let def = rt
                .globals
                .class(native.class())
                .ok_or(VmError::UnknownClass { class: native.class() })?;
            let field = def.fields().get(idx as usize).ok_or_else(|| unknown(native.class()))?;
            field.get(native)
        }
        _ => Err(unknown(class)),
    }
}

pub(crate) fn set_member(
    rt: &Runtime,
    obj: &Val,
    class: Symbol,
    idx: u32,
    value: Val,
) -> Result<(), VmError> {
    let unknown = |class| VmError::UnknownMember { class, idx };
    match expect_obj(obj)? {
        Obj::Instance(inst) => {
            let mut inst = inst.borrow_mut();
            let class = inst.class;
            let slot = inst.fields.get_mut(idx as usize).ok_or_else(|| unknown(class))?;
            *slot = value;
            Ok(())
        }
        Obj::Native(native) => {
            let def = rt
                .globals
                .class(native.class())
                .ok_or(VmError::UnknownClass { class: native.class() })?;
            let field = def.fields().get(idx as usize).ok_or_else(|| unknown(native.class()))?;
            field.set(native, value)
        }
        _ => Err(unknown(class)),
    }
}

fn pop(stack: &mut Stack<Val>) -> Result<Val, VmError> {
    stack.pop().ok_or(VmError::StackUnderflow { op: Opcode::MCall })
}

fn index(value: &Val, len: usize) -> Result<usize, VmError> {
    let n = num(value)?;
    let idx = n as usize;
    if n < 0.0 || idx as f64 != n || idx >= len {
        return Err(VmError::IndexOutOfBounds { idx: n, len });
    }
    Ok(idx)
}

fn key(value: &Val) -> Result<DictKey, VmError> {
    DictKey::from_val(value).ok_or(VmError::TypeMismatch {
        expected: "dict key",
        found: value.kind(),
    })
}

fn list_of(value: &Val) -> Result<&Rc<RefCell<crate::values::ValList>>, VmError> {
    value.as_list().ok_or(VmError::TypeMismatch {
        expected: "array",
        found: value.kind(),
    })
}

fn dict_of(value: &Val) -> Result<&Rc<RefCell<crate::values::ValDict>>, VmError> {
    value.as_dict().ok_or(VmError::TypeMismatch {
        expected: "dict",
        found: value.kind(),
    })
}

/// Runs a builtin container method against the operand stack.
pub(crate) fn call_method(stack: &mut Stack<Val>, container: Symbol, method: u32) -> Result<(), VmError> {
    match container {
        types::ARRAY => array_method(stack, method),
        types::DICT => dict_method(stack, method),
        class => Err(VmError::UnknownMember { class, idx: method }),
    }
}

fn array_method(stack: &mut Stack<Val>, method: u32) -> Result<(), VmError> {
    match method {
        array::ADD => {
            let item = pop(stack)?;
            let arr = pop(stack)?;
            list_of(&arr)?.borrow_mut().push(item);
        }
        array::AT => {
            let idx = pop(stack)?;
            let arr = pop(stack)?;
            let item = {
                let list = list_of(&arr)?.borrow();
                let at = index(&idx, list.len())?;
                list.get(at).cloned().unwrap_or_default()
            };
            stack.push(item)?;
        }
        array::SET_AT => {
            let idx = pop(stack)?;
            let arr = pop(stack)?;
            let item = pop(stack)?;
            let mut list = list_of(&arr)?.borrow_mut();
            let at = index(&idx, list.len())?;
            list.set(at, item);
        }
        array::REMOVE_AT => {
            let idx = pop(stack)?;
            let arr = pop(stack)?;
            let removed = {
                let mut list = list_of(&arr)?.borrow_mut();
                let at = index(&idx, list.len())?;
                list.remove_at(at)
            };
            drop(removed);
        }
        array::ADD_INPLACE => {
            let item = pop(stack)?;
            let arr = stack
                .peek()
                .ok_or(VmError::StackUnderflow { op: Opcode::MCall })?;
            list_of(arr)?.borrow_mut().push(item);
        }
        array::CLEAR => {
            let arr = pop(stack)?;
            list_of(&arr)?.borrow_mut().clear();
        }
        idx => {
            return Err(VmError::UnknownMember {
                class: types::ARRAY,
                idx,
            });
        }
    }
    Ok(())
}

fn dict_method(stack: &mut Stack<Val>, method: u32) -> Result<(), VmError> {
    match method {
        dict::SET => {
            let value = pop(stack)?;
            let k = pop(stack)?;
            let map = pop(stack)?;
            let old = dict_of(&map)?.borrow_mut().insert(key(&k)?, value);
            drop(old);
        }
        dict::AT => {
            let k = pop(stack)?;
            let map = pop(stack)?;
            let value = dict_of(&map)?.borrow().get(&key(&k)?).cloned();
            let value = value.ok_or_else(|| VmError::KeyNotFound {
                key: EcoString::from(format!("{k:?}")),
            })?;
            stack.push(value)?;
        }
        dict::SET_AT => {
            let k = pop(stack)?;
            let map = pop(stack)?;
            let value = pop(stack)?;
            let old = dict_of(&map)?.borrow_mut().insert(key(&k)?, value);
            drop(old);
        }
        dict::REMOVE => {
            let k = pop(stack)?;
            let map = pop(stack)?;
            let old = dict_of(&map)?.borrow_mut().remove(&key(&k)?);
            drop(old);
        }
        dict::CONTAINS => {
            let k = pop(stack)?;
            let map = pop(stack)?;
            let found = dict_of(&map)?.borrow().contains(&key(&k)?);
            stack.push(Val::Bool(found))?;
        }
        dict::CLEAR => {
            let map = pop(stack)?;
            dict_of(&map)?.borrow_mut().clear();
        }
        idx => {
            return Err(VmError::UnknownMember {
                class: types::DICT,
                idx,
            });
        }
    }
    Ok(())
}
