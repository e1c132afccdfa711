//! x86-64 instruction encoder.
//!
//! Exposes one named emitter per instruction the front end uses, writing the
//! exact bytes at the current cursor. Branches and calls that target a label
//! emit four zero displacement bytes and record a pending fixup; after all
//! emission is done [`Encoder::resolve_fixups`] patches each site with the
//! signed 32-bit distance to its label.
//!
//! The vocabulary is fixed to the System V subset the language needs: stack
//! ops on rax/rbx/rbp, immediate moves into the argument registers, the
//! rax/rbx arithmetic group, compare-and-set for the six ordering
//! predicates, and the absolute-address load/store pair used for globals.

use std::collections::HashMap;

use tracing::debug;

use super::buffer::{CodeBuffer, CODE_CAPACITY};

/// Maximum number of distinct labels tracked per compilation.
pub const MAX_LABELS: usize = 8192;
/// Maximum number of pending fixups tracked per compilation.
pub const MAX_FIXUPS: usize = 8192;

/// Ordering predicate for compare-and-set emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl Cond {
    /// Second opcode byte of the `setcc` encoding (`0f 9x`).
    fn setcc_opcode(self) -> u8 {
        match self {
            Cond::Eq => 0x94,
            Cond::Ne => 0x95,
            Cond::Lt => 0x9c,
            Cond::Ge => 0x9d,
            Cond::Le => 0x9e,
            Cond::Gt => 0x9f,
        }
    }
}

/// A displacement slot awaiting a label offset.
struct Fixup {
    /// Code offset of the four zero bytes to patch.
    pos: usize,
    /// Target label name.
    label: String,
}

/// Code buffer plus the label/fixup state needed for forward references.
pub struct Encoder {
    pub code: CodeBuffer,
    labels: HashMap<String, usize>,
    fixups: Vec<Fixup>,
}

impl Encoder {
    pub fn new() -> Self {
        Self {
            code: CodeBuffer::new(CODE_CAPACITY),
            labels: HashMap::new(),
            fixups: Vec::new(),
        }
    }

    /// Current write offset in the code buffer.
    pub fn pos(&self) -> usize {
        self.code.pos()
    }

    /// Record `name` at the current offset. The first definition of a name
    /// wins; later definitions of the same name are ignored so that call
    /// fixups resolve to the earliest occurrence.
    pub fn bind_label(&mut self, name: &str) {
        if self.labels.len() < MAX_LABELS && !self.labels.contains_key(name) {
            self.labels.insert(name.to_string(), self.code.pos());
        }
    }

    /// Offset a label was bound at, if any.
    pub fn label_offset(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }

    /// Emit a four-byte zero displacement and remember it for patching.
    fn add_fixup(&mut self, label: &str) {
        if self.fixups.len() < MAX_FIXUPS {
            self.fixups.push(Fixup {
                pos: self.code.pos(),
                label: label.to_string(),
            });
        }
        self.code.emit_u32(0);
    }

    /// Patch every pending fixup whose label was bound with
    /// `target − fixup − 4`. Fixups with unbound labels keep their zero
    /// displacement. Returns the number of sites patched.
    pub fn resolve_fixups(&mut self) -> usize {
        let mut resolved = 0;
        for fixup in &self.fixups {
            if let Some(&target) = self.labels.get(&fixup.label) {
                let disp = target as i64 - fixup.pos as i64 - 4;
                self.code.patch_i32(fixup.pos, disp as i32);
                resolved += 1;
            }
        }
        debug!(
            fixups = self.fixups.len(),
            resolved, "resolved branch fixups"
        );
        resolved
    }

    // ── Stack and frame ─────────────────────────────────────────────────────

    pub fn push_rbp(&mut self) {
        self.code.emit_byte(0x55);
    }

    pub fn pop_rbp(&mut self) {
        self.code.emit_byte(0x5d);
    }

    pub fn push_rax(&mut self) {
        self.code.emit_byte(0x50);
    }

    pub fn pop_rax(&mut self) {
        self.code.emit_byte(0x58);
    }

    pub fn push_rbx(&mut self) {
        self.code.emit_byte(0x53);
    }

    pub fn pop_rbx(&mut self) {
        self.code.emit_byte(0x5b);
    }

    pub fn pop_r8(&mut self) {
        self.code.emit_bytes(&[0x41, 0x58]);
    }

    pub fn pop_r10(&mut self) {
        self.code.emit_bytes(&[0x41, 0x5a]);
    }

    pub fn mov_rbp_rsp(&mut self) {
        self.code.emit_bytes(&[0x48, 0x89, 0xe5]);
    }

    pub fn mov_rsp_rbp(&mut self) {
        self.code.emit_bytes(&[0x48, 0x89, 0xec]);
    }

    pub fn sub_rsp(&mut self, n: i32) {
        self.code.emit_bytes(&[0x48, 0x81, 0xec]);
        self.code.emit_i32(n);
    }

    pub fn add_rsp(&mut self, n: i32) {
        self.code.emit_bytes(&[0x48, 0x81, 0xc4]);
        self.code.emit_i32(n);
    }

    /// `push rbp; mov rbp, rsp`.
    pub fn prologue(&mut self) {
        self.push_rbp();
        self.mov_rbp_rsp();
    }

    /// `mov rsp, rbp; pop rbp; ret`.
    pub fn epilogue(&mut self) {
        self.mov_rsp_rbp();
        self.pop_rbp();
        self.ret();
    }

    // ── Immediate and register moves ────────────────────────────────────────

    pub fn mov_rax_imm(&mut self, v: i64) {
        self.code.emit_bytes(&[0x48, 0xb8]);
        self.code.emit_u64(v as u64);
    }

    pub fn mov_rdi_imm(&mut self, v: i64) {
        self.code.emit_bytes(&[0x48, 0xbf]);
        self.code.emit_u64(v as u64);
    }

    pub fn mov_rsi_imm(&mut self, v: i64) {
        self.code.emit_bytes(&[0x48, 0xbe]);
        self.code.emit_u64(v as u64);
    }

    pub fn mov_rdx_imm(&mut self, v: i64) {
        self.code.emit_bytes(&[0x48, 0xba]);
        self.code.emit_u64(v as u64);
    }

    pub fn mov_rdi_rax(&mut self) {
        self.code.emit_bytes(&[0x48, 0x89, 0xc7]);
    }

    pub fn mov_rsi_rax(&mut self) {
        self.code.emit_bytes(&[0x48, 0x89, 0xc6]);
    }

    pub fn mov_rdx_rax(&mut self) {
        self.code.emit_bytes(&[0x48, 0x89, 0xc2]);
    }

    pub fn mov_rbx_rax(&mut self) {
        self.code.emit_bytes(&[0x48, 0x89, 0xc3]);
    }

    pub fn mov_r9_rax(&mut self) {
        self.code.emit_bytes(&[0x49, 0x89, 0xc1]);
    }

    // ── Frame-relative and absolute memory access ───────────────────────────

    /// `mov rax, [rbp + off]`.
    pub fn mov_rax_frame(&mut self, off: i32) {
        self.code.emit_bytes(&[0x48, 0x8b, 0x85]);
        self.code.emit_i32(off);
    }

    /// `mov [rbp + off], rax`.
    pub fn mov_frame_rax(&mut self, off: i32) {
        self.code.emit_bytes(&[0x48, 0x89, 0x85]);
        self.code.emit_i32(off);
    }

    /// Load a 64-bit value from an absolute address:
    /// `movabs rax, addr; mov rax, [rax]`.
    pub fn load_abs(&mut self, addr: u64) {
        self.code.emit_bytes(&[0x48, 0xb8]);
        self.code.emit_u64(addr);
        self.code.emit_bytes(&[0x48, 0x8b, 0x00]);
    }

    /// Store rax to an absolute address. The value is pushed while the
    /// address is materialised in rbx, preserving it across the imm64 move:
    /// `push rax; movabs rbx, addr; pop rax; mov [rbx], rax`.
    pub fn store_abs(&mut self, addr: u64) {
        self.push_rax();
        self.code.emit_bytes(&[0x48, 0xbb]);
        self.code.emit_u64(addr);
        self.pop_rax();
        self.code.emit_bytes(&[0x48, 0x89, 0x03]);
    }

    /// `movzx rax, byte [rax]`.
    pub fn load_byte_at_rax(&mut self) {
        self.code.emit_bytes(&[0x48, 0x0f, 0xb6, 0x00]);
    }

    /// `movzx rax, byte [rsp]`.
    pub fn load_byte_at_rsp(&mut self) {
        self.code.emit_bytes(&[0x48, 0x0f, 0xb6, 0x04, 0x24]);
    }

    /// `mov [rbx], al`.
    pub fn store_al_at_rbx(&mut self) {
        self.code.emit_bytes(&[0x88, 0x03]);
    }

    /// `mov [rsp], al`.
    pub fn store_al_at_rsp(&mut self) {
        self.code.emit_bytes(&[0x88, 0x04, 0x24]);
    }

    /// `lea rax, [rip + disp]`.
    pub fn lea_rax_rip(&mut self, disp: i32) {
        self.code.emit_bytes(&[0x48, 0x8d, 0x05]);
        self.code.emit_i32(disp);
    }

    /// `lea rsi, [rip + disp]`.
    pub fn lea_rsi_rip(&mut self, disp: i32) {
        self.code.emit_bytes(&[0x48, 0x8d, 0x35]);
        self.code.emit_i32(disp);
    }

    /// `lea rsi, [rsp]`.
    pub fn lea_rsi_rsp(&mut self) {
        self.code.emit_bytes(&[0x48, 0x8d, 0x34, 0x24]);
    }

    // ── Arithmetic and comparison ───────────────────────────────────────────

    /// `add rax, rbx`.
    pub fn add_rax_rbx(&mut self) {
        self.code.emit_bytes(&[0x48, 0x01, 0xd8]);
    }

    /// rax := rbx − rax, via rcx so neither operand is clobbered early:
    /// `mov rcx, rax; mov rax, rbx; sub rax, rcx`.
    pub fn sub_rbx_rax(&mut self) {
        self.code.emit_bytes(&[0x48, 0x89, 0xc1]);
        self.code.emit_bytes(&[0x48, 0x89, 0xd8]);
        self.code.emit_bytes(&[0x48, 0x29, 0xc8]);
    }

    /// `imul rax, rbx`.
    pub fn imul_rax_rbx(&mut self) {
        self.code.emit_bytes(&[0x48, 0x0f, 0xaf, 0xc3]);
    }

    /// Sign-extend and divide: `cqo; idiv rbx`.
    pub fn idiv_rbx(&mut self) {
        self.code.emit_bytes(&[0x48, 0x99]);
        self.code.emit_bytes(&[0x48, 0xf7, 0xfb]);
    }

    /// Compare rbx (left operand) against rax (right operand) and leave the
    /// predicate result as 0 or 1 in rax:
    /// `cmp rbx, rax; setCC al; movzx rax, al`.
    pub fn cmp_rbx_rax_set(&mut self, cond: Cond) {
        self.code.emit_bytes(&[0x48, 0x39, 0xc3]);
        self.code.emit_bytes(&[0x0f, cond.setcc_opcode(), 0xc0]);
        self.code.emit_bytes(&[0x48, 0x0f, 0xb6, 0xc0]);
    }

    /// `test rax, rax`.
    pub fn test_rax_rax(&mut self) {
        self.code.emit_bytes(&[0x48, 0x85, 0xc0]);
    }

    // ── Control flow ────────────────────────────────────────────────────────

    /// `je <label>` with a pending 32-bit fixup.
    pub fn je(&mut self, label: &str) {
        self.code.emit_bytes(&[0x0f, 0x84]);
        self.add_fixup(label);
    }

    /// `jmp <label>` with a pending 32-bit fixup.
    pub fn jmp(&mut self, label: &str) {
        self.code.emit_byte(0xe9);
        self.add_fixup(label);
    }

    /// `call <label>` with a pending 32-bit fixup.
    pub fn call(&mut self, label: &str) {
        self.code.emit_byte(0xe8);
        self.add_fixup(label);
    }

    /// `jmp` with a literal 8-bit displacement (used to hop over inline
    /// string data in expressions).
    pub fn jmp_rel8(&mut self, disp: u8) {
        self.code.emit_byte(0xeb);
        self.code.emit_byte(disp);
    }

    /// `jmp` with a literal 32-bit displacement (used to hop over inline
    /// data emitted by `out`/`emit`).
    pub fn jmp_rel32(&mut self, disp: i32) {
        self.code.emit_byte(0xe9);
        self.code.emit_i32(disp);
    }

    pub fn ret(&mut self) {
        self.code.emit_byte(0xc3);
    }

    pub fn syscall(&mut self) {
        self.code.emit_bytes(&[0x0f, 0x05]);
    }

    /// The `keep` spin: `pause; jmp .-2` holds the process resident without
    /// falling off the end of the program.
    pub fn spin(&mut self) {
        self.code.emit_bytes(&[0xf3, 0x90]);
        self.code.emit_bytes(&[0xeb, 0xfc]);
    }

    /// `exit(code)` with an immediate status.
    pub fn exit_imm(&mut self, code: i64) {
        self.mov_rax_imm(60);
        self.mov_rdi_imm(code);
        self.syscall();
    }

    /// `exit(rax)`: the status is whatever the last expression left in rax.
    pub fn exit_rax(&mut self) {
        self.mov_rdi_rax();
        self.mov_rax_imm(60);
        self.syscall();
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_setup_bytes() {
        let mut enc = Encoder::new();
        enc.prologue();
        enc.sub_rsp(512);
        assert_eq!(
            enc.code.as_slice(),
            &[0x55, 0x48, 0x89, 0xe5, 0x48, 0x81, 0xec, 0x00, 0x02, 0x00, 0x00]
        );
    }

    #[test]
    fn test_global_store_preserves_value() {
        let mut enc = Encoder::new();
        enc.store_abs(0x600008);
        let bytes = enc.code.as_slice();
        // push rax, movabs rbx, pop rax, mov [rbx], rax
        assert_eq!(bytes[0], 0x50);
        assert_eq!(&bytes[1..3], &[0x48, 0xbb]);
        assert_eq!(&bytes[3..11], &0x600008u64.to_le_bytes());
        assert_eq!(bytes[11], 0x58);
        assert_eq!(&bytes[12..15], &[0x48, 0x89, 0x03]);
    }

    #[test]
    fn test_setcc_opcodes() {
        for (cond, opcode) in [
            (Cond::Eq, 0x94),
            (Cond::Ne, 0x95),
            (Cond::Lt, 0x9c),
            (Cond::Ge, 0x9d),
            (Cond::Le, 0x9e),
            (Cond::Gt, 0x9f),
        ] {
            let mut enc = Encoder::new();
            enc.cmp_rbx_rax_set(cond);
            assert_eq!(
                enc.code.as_slice(),
                &[0x48, 0x39, 0xc3, 0x0f, opcode, 0xc0, 0x48, 0x0f, 0xb6, 0xc0]
            );
        }
    }

    #[test]
    fn test_backward_fixup_resolution() {
        let mut enc = Encoder::new();
        enc.bind_label("top");
        enc.mov_rax_imm(1); // 10 bytes
        enc.jmp("top"); // opcode at 10, fixup at 11
        assert_eq!(enc.resolve_fixups(), 1);
        // target 0, fixup 11: 0 - 11 - 4 = -15
        assert_eq!(&enc.code.as_slice()[11..15], &(-15i32).to_le_bytes());
    }

    #[test]
    fn test_forward_fixup_resolution() {
        let mut enc = Encoder::new();
        enc.test_rax_rax(); // 3 bytes
        enc.je("end"); // opcode at 3..5, fixup at 5
        enc.mov_rax_imm(0); // 10 bytes
        enc.bind_label("end"); // offset 19
        assert_eq!(enc.resolve_fixups(), 1);
        // 19 - 5 - 4 = 10
        assert_eq!(&enc.code.as_slice()[5..9], &10i32.to_le_bytes());
    }

    #[test]
    fn test_unresolved_fixup_stays_zero() {
        let mut enc = Encoder::new();
        enc.jmp("nowhere");
        assert_eq!(enc.resolve_fixups(), 0);
        assert_eq!(&enc.code.as_slice()[1..5], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_first_label_definition_wins() {
        let mut enc = Encoder::new();
        enc.bind_label("f");
        enc.mov_rax_imm(1);
        enc.bind_label("f");
        assert_eq!(enc.label_offset("f"), Some(0));
    }
}
