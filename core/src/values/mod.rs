//! Runtime values and the pools that recycle their storage.

mod dict;
mod list;
mod object;
mod pool;
mod val;

pub use dict::{DictKey, ValDict};
pub use list::ValList;
pub use object::{FuncPtr, Instance, NativeObj};
pub use pool::{PoolStats, Pools, PoolsStats, ValCell};
pub use val::{Obj, Val, ValKind};
