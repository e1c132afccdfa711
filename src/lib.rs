//! wavec — a single-pass compiler for the Wave language.
//!
//! Source text flows through a recursive-descent front end straight into an
//! in-memory x86-64 code buffer; there is no intermediate representation, no
//! register allocation pass, and no linker. The final buffer is wrapped in a
//! minimal ELF64 image with a single RWX LOAD segment and written to disk.
//!
//! The crate is organised bottom-up:
//! - [`backend`]: byte buffer, instruction encoder, symbol and fixup tables,
//!   ELF writer.
//! - [`frontend`]: source cursor and the statement/expression compiler that
//!   drives the backend.
//! - [`rules`]: the Unified Field / Tile / Fate / Platform metadata records.
//!   These feed the final report only; they never change emitted code.
//! - [`driver`]: CLI surface, file I/O, and the statistical report.

pub mod backend;
pub mod driver;
pub mod frontend;
pub mod rules;
