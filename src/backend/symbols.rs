//! Variable and function tables.
//!
//! Variables live in one growable array scanned newest-to-oldest, so
//! shadowing is by declaration recency. Whether a declaration becomes a
//! stack local or an absolute-address global depends on whether a function
//! body is currently being compiled; function entry snapshots the table so
//! exit can drop the body's locals and parameters again.

use std::ops::Range;

/// Maximum number of live variable records.
pub const MAX_VARS: usize = 4096;
/// Maximum number of registered functions.
pub const MAX_FUNCS: usize = 2048;
/// Maximum declared parameters per function.
pub const MAX_PARAMS: usize = 16;
/// Base virtual address of the global variable window. Globals sit inside
/// the loadable segment's memsz but beyond its filesz, so the kernel
/// zero-fills them at load time.
pub const GLOBAL_BASE: u64 = 0x600000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarScope {
    Local,
    Param,
    Global,
}

/// A declared variable: a frame slot for locals and parameters, a fixed
/// absolute address for globals.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub scope: VarScope,
    /// rbp-relative offset. Negative for locals, positive for parameters,
    /// unused for globals.
    pub frame_offset: i32,
    /// Absolute virtual address. Only meaningful for globals.
    pub address: u64,
}

impl Variable {
    pub fn is_global(&self) -> bool {
        self.scope == VarScope::Global
    }
}

/// Snapshot of the variable table taken at function entry.
#[derive(Debug, Clone, Copy)]
pub struct FrameSnapshot {
    var_len: usize,
    frame_size: i32,
    in_function: bool,
}

/// The variable array plus the frame/global allocation cursors.
pub struct VarTable {
    vars: Vec<Variable>,
    /// Bytes of frame space consumed by locals of the current function.
    frame_size: i32,
    /// Bytes of the global window consumed so far.
    global_bytes: u64,
    /// True while a function body is being compiled.
    in_function: bool,
}

impl VarTable {
    pub fn new() -> Self {
        Self {
            vars: Vec::new(),
            frame_size: 0,
            global_bytes: 0,
            in_function: false,
        }
    }

    /// Most recent declaration of `name`, if any.
    pub fn resolve(&self, name: &str) -> Option<Variable> {
        self.vars.iter().rev().find(|v| v.name == name).cloned()
    }

    /// Declare a new variable. Locals grow the frame downward in 8-byte
    /// steps starting at −8; globals take the next 8-byte slot above
    /// [`GLOBAL_BASE`]. Returns `None` when the table is full.
    pub fn declare(&mut self, name: &str) -> Option<Variable> {
        if self.vars.len() >= MAX_VARS {
            return None;
        }
        let var = if self.in_function {
            self.frame_size += 8;
            Variable {
                name: name.to_string(),
                scope: VarScope::Local,
                frame_offset: -self.frame_size,
                address: 0,
            }
        } else {
            let address = GLOBAL_BASE + self.global_bytes;
            self.global_bytes += 8;
            Variable {
                name: name.to_string(),
                scope: VarScope::Global,
                frame_offset: 0,
                address,
            }
        };
        self.vars.push(var.clone());
        Some(var)
    }

    /// Install a function parameter at a fixed positive frame offset.
    pub fn add_param(&mut self, name: &str, frame_offset: i32) {
        if self.vars.len() >= MAX_VARS {
            return;
        }
        self.vars.push(Variable {
            name: name.to_string(),
            scope: VarScope::Param,
            frame_offset,
            address: 0,
        });
    }

    /// Enter a function body: snapshot the table and mark declarations as
    /// locals until [`VarTable::leave_function`].
    pub fn enter_function(&mut self) -> FrameSnapshot {
        let snap = FrameSnapshot {
            var_len: self.vars.len(),
            frame_size: self.frame_size,
            in_function: self.in_function,
        };
        self.in_function = true;
        snap
    }

    /// Drop the function's locals and parameters and restore the frame
    /// allocation state captured at entry.
    pub fn leave_function(&mut self, snap: FrameSnapshot) {
        self.vars.truncate(snap.var_len);
        self.frame_size = snap.frame_size;
        self.in_function = snap.in_function;
    }

    /// Number of live variable records.
    pub fn count(&self) -> usize {
        self.vars.len()
    }

    /// Bytes of the global window in use (8 per global).
    pub fn global_bytes(&self) -> u64 {
        self.global_bytes
    }
}

impl Default for VarTable {
    fn default() -> Self {
        Self::new()
    }
}

/// A registered function: parameter names and the source span of its body.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    /// Byte range of the body in the source text: open brace exclusive,
    /// matching close brace exclusive.
    pub body: Range<usize>,
    /// Code-buffer offset the body was emitted at; filled during function
    /// emission.
    pub code_offset: usize,
}

/// Function array with cursor-overwrite registration.
///
/// The first pass fills the array in discovery order. Before the main
/// emission pass the cursor is reset to zero so that top-level `fn`
/// statements re-register the same functions in source order, overwriting
/// in place instead of growing the array; afterwards the count is restored
/// to the first-pass value.
pub struct FuncTable {
    funcs: Vec<Function>,
    cursor: usize,
}

impl FuncTable {
    pub fn new() -> Self {
        Self {
            funcs: Vec::new(),
            cursor: 0,
        }
    }

    /// Register a function at the cursor, overwriting any record already in
    /// that slot. Full tables discard further registrations.
    pub fn register(&mut self, func: Function) {
        if self.cursor < self.funcs.len() {
            self.funcs[self.cursor] = func;
            self.cursor += 1;
        } else if self.funcs.len() < MAX_FUNCS {
            self.funcs.push(func);
            self.cursor += 1;
        }
    }

    /// True once the registration cursor has exhausted the table.
    pub fn is_full(&self) -> bool {
        self.cursor >= MAX_FUNCS
    }

    /// Rewind the cursor for the re-registration pass.
    pub fn reset_cursor(&mut self) {
        self.cursor = 0;
    }

    /// Restore the registered count recorded before re-registration.
    pub fn restore_count(&mut self, count: usize) {
        self.funcs.truncate(count);
        self.cursor = count;
    }

    pub fn count(&self) -> usize {
        self.funcs.len()
    }

    pub fn get(&self, index: usize) -> Option<&Function> {
        self.funcs.get(index)
    }

    pub fn set_code_offset(&mut self, index: usize, offset: usize) {
        if let Some(f) = self.funcs.get_mut(index) {
            f.code_offset = offset;
        }
    }
}

impl Default for FuncTable {
    fn default() -> Self {
        Self::new()
    }
}
