use super::{BindError, CallCtx, Coroutine, Globals, NativeFunc};
use crate::Box;
use crate::symbols::types;
use crate::vm::{Status, VmError};

pub(super) fn install(globals: &mut Globals) -> Result<(), BindError> {
    let builtins = [
        NativeFunc::new("yield", types::VOID, &[], |_| {
            Ok(Some(Box::new(YieldOnce::default())))
        }),
        NativeFunc::new("suspend", types::VOID, &[], |_| Ok(Some(Box::new(Suspend)))),
    ];
    for func in builtins {
        globals.define(func)?;
    }
    Ok(())
}

/// Gives up the rest of the current tick once.
#[derive(Debug, Default)]
pub struct YieldOnce {
    resumed: bool,
}

impl Coroutine for YieldOnce {
    fn tick(&mut self, _ctx: &mut CallCtx<'_>) -> Result<Status, VmError> {
        if self.resumed {
            return Ok(Status::Success);
        }
        self.resumed = true;
        Ok(Status::Running)
    }
}

/// Never finishes; only an enclosing `paral` can end it.
#[derive(Debug)]
pub struct Suspend;

impl Coroutine for Suspend {
    fn tick(&mut self, _ctx: &mut CallCtx<'_>) -> Result<Status, VmError> {
        Ok(Status::Running)
    }
}
