//! Platform, bridge, and compatibility probes.
//!
//! All three are probe-once metadata records. Probing happens at compiler
//! construction and records findings in the Fate pattern store; the
//! `platform.probe` / `bridge.read` / `compat.probe` source statements are
//! purely syntactic and emit nothing.

use super::fate::FateScheduler;

// Standard bridge addresses, externally injected into generated programs.
pub const ADDR_DISPLAY_FB: u64 = 0x1000;
pub const ADDR_DISPLAY_WIDTH: u64 = 0x1004;
pub const ADDR_DISPLAY_HEIGHT: u64 = 0x1008;
pub const ADDR_DISPLAY_PITCH: u64 = 0x100c;
pub const ADDR_DISPLAY_FORMAT: u64 = 0x1010;
pub const ADDR_DISPLAY_READY: u64 = 0x1014;
pub const ADDR_INPUT_BUFFER: u64 = 0x2000;
pub const ADDR_INPUT_HEAD: u64 = 0x2004;
pub const ADDR_INPUT_TAIL: u64 = 0x2008;
pub const ADDR_INPUT_READY: u64 = 0x200c;
pub const ADDR_TIME_TICKS: u64 = 0x3000;
pub const ADDR_TIME_FREQ: u64 = 0x3004;

/// Host platform identity, assigned by the Fate id counter at probe time.
#[derive(Debug, Clone, Copy)]
pub struct Platform {
    pub id: i32,
    pub syscall_base: u64,
    pub probed: bool,
}

impl Platform {
    pub fn new() -> Self {
        Self {
            id: 0,
            syscall_base: 0,
            probed: false,
        }
    }

    /// Probe once: take an id from the scheduler and record the syscall
    /// base for the compile host. Repeat probes are no-ops.
    pub fn probe(&mut self, fate: &mut FateScheduler) {
        if self.probed {
            return;
        }
        self.id = fate.next_id();
        self.syscall_base = if cfg!(target_os = "macos") {
            0x2000000
        } else {
            0
        };
        self.probed = true;
        fate.learn("platform.id", self.id as f64);
        fate.learn("platform.syscall_base", self.syscall_base as f64);
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::new()
    }
}

/// Bridge readiness state for the standard memory protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bridge {
    pub display_ready: bool,
    pub input_ready: bool,
    pub width: u32,
    pub height: u32,
}

impl Bridge {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Device availability flags filled by the compat probe.
#[derive(Debug, Clone, Copy, Default)]
pub struct Compat {
    pub display_available: bool,
    pub input_available: bool,
    pub storage_available: bool,
    pub network_available: bool,
    pub audio_available: bool,
}

impl Compat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record probe requests for the standard device set. Actual device
    /// probing happens in the generated program at runtime; compile time
    /// only notes that the probes were requested.
    pub fn probe(&self, fate: &mut FateScheduler) {
        fate.learn("probe.display", 1.0);
        fate.learn("probe.input", 1.0);
        fate.learn("probe.storage", 1.0);
        fate.learn("probe.network", 1.0);
        fate.learn("probe.audio", 1.0);
    }
}
