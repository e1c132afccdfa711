//! Code emission backend: byte buffer, instruction encoder, symbol and
//! fixup tables, and the ELF64 writer.

pub mod buffer;
pub mod elf;
pub mod encoder;
pub mod symbols;

pub use buffer::{CodeBuffer, CODE_CAPACITY, DATA_CAPACITY};
pub use encoder::{Cond, Encoder};
pub use symbols::{FuncTable, Function, VarTable, Variable, GLOBAL_BASE, MAX_PARAMS};
