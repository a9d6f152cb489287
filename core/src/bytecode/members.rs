//! Member and method indices of the builtin containers.
//!
//! `GetMVar` uses the field tables, `MCall` the method tables. Script classes
//! index their fields by declaration order (parent fields first) instead.

pub mod array {
    pub const COUNT: u32 = 0;

    /// Stack: [arr, item] -> []
    pub const ADD: u32 = 0;
    /// Stack: [arr, idx] -> [item]
    pub const AT: u32 = 1;
    /// Stack: [item, arr, idx] -> []
    pub const SET_AT: u32 = 2;
    /// Stack: [arr, idx] -> []
    pub const REMOVE_AT: u32 = 3;
    /// Stack: [arr, item] -> [arr]
    pub const ADD_INPLACE: u32 = 4;
    /// Stack: [arr] -> []
    pub const CLEAR: u32 = 5;

    pub fn field(name: &str) -> Option<u32> {
        match name {
            "Count" => Some(COUNT),
            _ => None,
        }
    }

    pub fn method(name: &str) -> Option<u32> {
        match name {
            "Add" => Some(ADD),
            "At" => Some(AT),
            "SetAt" => Some(SET_AT),
            "RemoveAt" => Some(REMOVE_AT),
            "Clear" => Some(CLEAR),
            _ => None,
        }
    }

    /// Whether the method leaves a value on the stack.
    pub fn returns_value(method: u32) -> bool {
        matches!(method, AT | ADD_INPLACE)
    }

    /// Number of arguments (besides the receiver) a method pops. For `SetAt`
    /// this counts the assigned value, which sits below the receiver.
    pub fn arity(method: u32) -> usize {
        match method {
            SET_AT => 2,
            ADD | AT | REMOVE_AT | ADD_INPLACE => 1,
            _ => 0,
        }
    }
}

pub mod dict {
    pub const COUNT: u32 = 0;

    /// Stack: [dict, key, value] -> []
    pub const SET: u32 = 0;
    /// Stack: [dict, key] -> [value]
    pub const AT: u32 = 1;
    /// Stack: [value, dict, key] -> []
    pub const SET_AT: u32 = 2;
    /// Stack: [dict, key] -> []
    pub const REMOVE: u32 = 3;
    /// Stack: [dict, key] -> [bool]
    pub const CONTAINS: u32 = 4;
    /// Stack: [dict] -> []
    pub const CLEAR: u32 = 5;

    pub fn field(name: &str) -> Option<u32> {
        match name {
            "Count" => Some(COUNT),
            _ => None,
        }
    }

    pub fn method(name: &str) -> Option<u32> {
        match name {
            "Set" => Some(SET),
            "At" => Some(AT),
            "SetAt" => Some(SET_AT),
            "Remove" => Some(REMOVE),
            "Contains" => Some(CONTAINS),
            "Clear" => Some(CLEAR),
            _ => None,
        }
    }

    pub fn returns_value(method: u32) -> bool {
        matches!(method, AT | CONTAINS)
    }

    /// Number of arguments (besides the receiver) a method pops.
    pub fn arity(method: u32) -> usize {
        match method {
            SET | SET_AT => 2,
            AT | REMOVE | CONTAINS => 1,
            _ => 0,
        }
    }
}
