//! Rule-layer metadata records: the Unified Field triple, the Tile pool
//! accounting, the Fate scheduler, and the platform/bridge/compat probes.
//!
//! Nothing in this module influences emitted machine code. The records are
//! mutated by dedicated source constructs during compilation and read once
//! by the final report.

pub mod compat;
pub mod fate;
pub mod tile;
pub mod unified;

pub use compat::{Bridge, Compat, Platform};
pub use fate::FateScheduler;
pub use tile::TileManager;
pub use unified::UnifiedField;
