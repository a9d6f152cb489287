//! Loaded modules, class registry and the public [`VM`] handle.

use alloc::rc::Rc;
use core::mem::ManuallyDrop;

use ecow::EcoString;
use hashbrown::HashMap;
use tracing::{debug, warn};

use crate::bindings::Globals;
use crate::bytecode::{Module, Opcode, decode_at};
use crate::symbols::Symbol;
use crate::values::{PoolsStats, Pools, Val};
use crate::{Box, Vec};

use super::exec::{Exec, args_info};
use super::fiber::{Fiber, FiberId};
use super::frame::{Frame, Locals};
use super::{Status, VmError};

/// Limits applied to every fiber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmOptions {
    /// Frames one fiber (or one `paral` branch) may have on its call stack.
    pub max_call_depth: usize,
    /// Values one frame may have on its operand stack.
    pub max_stack_size: usize,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            max_call_depth: 1024,
            max_stack_size: 4096,
        }
    }
}

/// A script class registered by a module's init code.
#[derive(Debug, Clone)]
pub(crate) struct ClassDef {
    pub parent: Symbol,
    /// `(type, name)` of every field, parent fields first.
    pub fields: Vec<(Symbol, Symbol)>,
}

/// Everything instructions read while executing. Shared by all fibers.
pub(crate) struct Runtime {
    pub globals: Rc<Globals>,
    pub modules: Vec<Module>,
    pub classes: HashMap<Symbol, ClassDef>,
    pub pools: Pools,
    pub options: VmOptions,
}

impl Runtime {
    pub fn module(&self, idx: usize) -> Result<&Module, VmError> {
        self.modules.get(idx).ok_or(VmError::Malformed {
            what: "module index",
            offset: idx,
        })
    }

    pub fn constant(&self, module: usize, idx: u32) -> Result<Val, VmError> {
        self.module(module)?
            .constants
            .get(idx as usize)
            .map(Val::from)
            .ok_or(VmError::BadConstant { idx })
    }

    /// Whether `class` is `ancestor` or derives from it.
    pub fn is_a(&self, class: Symbol, ancestor: Symbol) -> bool {
        let mut current = class;
        while let Some(def) = self.classes.get(&current) {
            if current == ancestor {
                return true;
            }
            current = def.parent;
        }
        !current.is_none() && self.globals.class_is_a(current, ancestor)
    }

    /// Finds a script function by name across every loaded module.
    fn find_func(&self, name: &str) -> Result<(usize, u32), VmError> {
        self.modules
            .iter()
            .enumerate()
            .find_map(|(idx, module)| module.func_offset(name).map(|offset| (idx, offset)))
            .ok_or_else(|| VmError::UnknownFunction { name: name.into() })
    }

    /// Runs a module's class registration stream.
    fn register_classes(&self, module: &Module) -> Result<Vec<(Symbol, ClassDef)>, VmError> {
        let code = &module.init_code;
        let mut registered: Vec<(Symbol, ClassDef)> = Vec::new();
        let mut open: Option<(Symbol, ClassDef)> = None;

        let mut offset = 0;
        while offset < code.len() {
            let inst = decode_at(code, offset)?;
            offset = inst.end();
            let mut begun = None;
            match (inst.op, open.as_mut()) {
                (Opcode::ClassBegin, None) => {
                    let class = Symbol::from_raw(inst.operands[0]);
                    let parent = Symbol::from_raw(inst.operands[1]);
                    let taken = self.classes.contains_key(&class)
                        || self.globals.class(class).is_some()
                        || registered.iter().any(|(sym, _)| *sym == class);
                    if taken {
                        return Err(VmError::DuplicateClass { class });
                    }
                    let fields = if parent.is_none() {
                        Vec::new()
                    } else {
                        let earlier = registered.iter().find(|(sym, _)| *sym == parent);
                        self.classes
                            .get(&parent)
                            .or(earlier.map(|(_, def)| def))
                            .map(|def| def.fields.clone())
                            .ok_or(VmError::UnknownClass { class: parent })?
                    };
                    begun = Some((class, ClassDef { parent, fields }));
                }
                (Opcode::ClassMember, Some((_, def))) => {
                    let ty = Symbol::from_raw(inst.operands[0]);
                    let name = Symbol::from_raw(inst.operands[1]);
                    def.fields.push((ty, name));
                }
                (Opcode::ClassEnd, Some(_)) => {}
                _ => {
                    return Err(VmError::Malformed {
                        what: "class registration",
                        offset: inst.offset,
                    });
                }
            }
            if begun.is_some() {
                open = begun;
            } else if inst.op == Opcode::ClassEnd {
                registered.extend(open.take());
            }
        }
        if open.is_some() {
            return Err(VmError::Malformed {
                what: "unterminated class registration",
                offset,
            });
        }
        Ok(registered)
    }
}

/// The virtual machine: loaded modules plus the fibers running them.
///
/// ```ignore
/// let mut vm = VM::new(Rc::new(globals));
/// vm.load_module(module)?;
/// vm.start("main")?;
/// while vm.tick()? == Status::Running {}
/// let result = vm.pop_value();
/// ```
pub struct VM {
    rt: Runtime,
    fibers: Vec<Fiber>,
    results: Vec<Val>,
    next_id: u32,
}

impl VM {
    pub fn new(globals: Rc<Globals>) -> Self {
        Self::with_options(globals, VmOptions::default())
    }

    pub fn with_options(globals: Rc<Globals>, options: VmOptions) -> Self {
        Self {
            rt: Runtime {
                globals,
                modules: Vec::new(),
                classes: HashMap::new(),
                pools: Pools::new(),
                options,
            },
            fibers: Vec::new(),
            results: Vec::new(),
            next_id: 1,
        }
    }

    /// Registers a module's classes and makes its functions startable.
    /// Nothing is registered when this fails.
    pub fn load_module(&mut self, module: Module) -> Result<usize, VmError> {
        for name in module.func_offsets.keys() {
            if self.rt.modules.iter().any(|m| m.func_offset(name).is_some()) {
                return Err(VmError::DuplicateFunction { name: name.clone() });
            }
        }
        let classes = self.rt.register_classes(&module)?;
        debug!(
            module = %module.name,
            funcs = module.func_offsets.len(),
            classes = classes.len(),
            code_len = module.code.len(),
            "load module"
        );
        self.rt.classes.extend(classes);
        self.rt.modules.push(module);
        Ok(self.rt.modules.len() - 1)
    }

    /// Starts a fiber running the function `name` with no arguments.
    pub fn start(&mut self, name: &str) -> Result<FiberId, VmError> {
        self.start_with(name, Vec::new())
    }

    /// Starts a fiber running `name` with its leading parameters bound to
    /// `args`. The parameters after them take their defaults.
    pub fn start_with(&mut self, name: &str, args: Vec<Val>) -> Result<FiberId, VmError> {
        let (module, offset) = self.rt.find_func(name)?;
        let params = self.rt.module(module)?.params(offset).unwrap_or_default();
        let info = args_info(params, offset, args.len().try_into().unwrap_or(u32::MAX))?;

        let locals = Locals::new(&self.rt.pools);
        let mut frame = Frame::call(
            module,
            offset as usize,
            locals,
            self.rt.options.max_stack_size,
            info,
        );
        for arg in args.into_iter().rev() {
            frame.stack.push(arg)?;
        }
        if params.takes_args_info() {
            frame.stack.push(Val::Num(info.bits() as f64))?;
        }

        let id = FiberId(self.next_id);
        self.next_id += 1;
        debug!(fiber = ?id, func = name, "start");
        self.fibers.push(Fiber {
            id,
            func: EcoString::from(name),
            exec: Exec::new(frame),
        });
        Ok(id)
    }

    /// Ticks every fiber once, in start order. Finished fibers are dropped
    /// and a faulting fiber is removed without running its defers; the
    /// remaining fibers still get their tick and the first fault is
    /// returned.
    pub fn tick(&mut self) -> Result<Status, VmError> {
        let mut fault = None;
        let mut idx = 0;
        while idx < self.fibers.len() {
            match self.fibers[idx].tick(&self.rt, &mut self.results) {
                Ok(Status::Running) => idx += 1,
                Ok(Status::Success) => {
                    let fiber = self.fibers.remove(idx);
                    debug!(fiber = ?fiber.id, "done");
                }
                Err(err) => {
                    let fiber = self.fibers.remove(idx);
                    warn!(fiber = ?fiber.id, func = %fiber.func, error = %err, "fiber faulted");
                    fault.get_or_insert(VmError::Fiber {
                        id: fiber.id,
                        source: Box::new(err),
                    });
                }
            }
        }
        match fault {
            Some(err) => Err(err),
            None if self.fibers.is_empty() => Ok(Status::Success),
            None => Ok(Status::Running),
        }
    }

    /// Ticks a single fiber.
    pub fn tick_fiber(&mut self, id: FiberId) -> Result<Status, VmError> {
        let idx = self.fiber_index(id)?;
        let result = self.fibers[idx].tick(&self.rt, &mut self.results);
        match result {
            Ok(Status::Running) => Ok(Status::Running),
            Ok(Status::Success) => {
                self.fibers.remove(idx);
                Ok(Status::Success)
            }
            Err(err) => {
                self.fibers.remove(idx);
                Err(VmError::Fiber {
                    id,
                    source: Box::new(err),
                })
            }
        }
    }

    /// Cancels a fiber, running every defer it has pending.
    pub fn stop(&mut self, id: FiberId) -> Result<(), VmError> {
        let idx = self.fiber_index(id)?;
        let mut fiber = self.fibers.remove(idx);
        debug!(fiber = ?id, "stop");
        fiber.exec.abort(&self.rt)
    }

    fn fiber_index(&self, id: FiberId) -> Result<usize, VmError> {
        self.fibers
            .iter()
            .position(|fiber| fiber.id == id)
            .ok_or(VmError::UnknownFiber(id))
    }

    /// Takes the most recent fiber result. Dropping it gives pooled storage
    /// back to the pools.
    pub fn pop_value(&mut self) -> Option<Val> {
        self.results.pop()
    }

    /// Takes the most recent fiber result and keeps its pooled storage in use
    /// until the caller hands it back with [`Val::release`]. Dropping the
    /// wrapper does not release it.
    pub fn pop_value_manual(&mut self) -> Option<ManuallyDrop<Val>> {
        self.results.pop().map(ManuallyDrop::new)
    }

    /// Fiber results not popped yet.
    pub fn stack_len(&self) -> usize {
        self.results.len()
    }

    pub fn fibers_count(&self) -> usize {
        self.fibers.len()
    }

    pub fn is_running(&self, id: FiberId) -> bool {
        self.fibers.iter().any(|fiber| fiber.id == id)
    }

    pub fn pool_stats(&self) -> PoolsStats {
        self.rt.pools.stats()
    }

    pub fn pools(&self) -> &Pools {
        &self.rt.pools
    }

    pub fn globals(&self) -> &Globals {
        &self.rt.globals
    }

    pub fn modules(&self) -> &[Module] {
        &self.rt.modules
    }
}
