//! Compiler state and pass sequencing.
//!
//! A single [`Compiler`] value owns the source cursor, the code and data
//! buffers, the symbol tables, and the rule-layer metadata. Compilation is
//! three passes over the same buffer:
//!
//! 1. a pre-scan registering every `fn` declaration (name, parameters, and
//!    the source span of the body),
//! 2. the main pass emitting top-level statements in source order, closed
//!    by a safety `exit(0)`,
//! 3. function emission, re-parsing each saved body span behind a label and
//!    a fresh frame.
//!
//! Pending branch fixups are resolved once after all three passes.

use tracing::debug;

use crate::backend::buffer::DATA_CAPACITY;
use crate::backend::symbols::MAX_PARAMS;
use crate::backend::{CodeBuffer, Encoder, FuncTable, Function, VarTable, Variable};
use crate::rules::{Bridge, Compat, FateScheduler, Platform, TileManager, UnifiedField};

use super::cursor::Cursor;

/// `break` and `->` reach at most this many enclosing loops.
pub const MAX_LOOP_DEPTH: usize = 16;

/// Bytes of scratch stack reserved by the top-level prologue.
pub const TOP_LEVEL_SCRATCH: i32 = 512;
/// Bytes of scratch stack reserved by each function prologue.
pub const FUNCTION_SCRATCH: i32 = 256;

pub struct Compiler {
    pub(crate) cur: Cursor,
    pub(crate) asm: Encoder,
    pub(crate) data: CodeBuffer,
    pub(crate) vars: VarTable,
    pub(crate) funcs: FuncTable,

    /// Monotonic id counters for conditional and loop labels.
    pub(crate) when_id: u32,
    pub(crate) loop_id: u32,
    /// Innermost-last stack of (start, end) loop label pairs.
    pub(crate) loop_stack: Vec<(String, String)>,
    pub(crate) fate_mode: bool,

    // Rule-layer metadata; report-only.
    pub(crate) unified: UnifiedField,
    pub(crate) tile: TileManager,
    pub(crate) fate: FateScheduler,
    pub(crate) platform: Platform,
    pub(crate) bridge: Bridge,
    pub(crate) compat: Compat,
}

impl Compiler {
    pub fn new(source: Vec<u8>) -> Self {
        let mut fate = FateScheduler::new();
        let mut platform = Platform::new();
        platform.probe(&mut fate);
        let compat = Compat::new();
        compat.probe(&mut fate);

        Self {
            cur: Cursor::new(source),
            asm: Encoder::new(),
            data: CodeBuffer::new(DATA_CAPACITY),
            vars: VarTable::new(),
            funcs: FuncTable::new(),
            when_id: 0,
            loop_id: 0,
            loop_stack: Vec::new(),
            fate_mode: true,
            unified: UnifiedField::new(),
            tile: TileManager::new(),
            fate,
            platform,
            bridge: Bridge::new(),
            compat: Compat::new(),
        }
    }

    /// Run all passes. Infallible: malformed input degrades per the error
    /// model (skipped lines, zero loads, unresolved fixups) instead of
    /// aborting.
    pub fn compile(&mut self) {
        self.asm.prologue();
        self.asm.sub_rsp(TOP_LEVEL_SCRATCH);

        // Fresh rule systems for this compilation, with the standard pools.
        self.unified = UnifiedField::new();
        self.tile = TileManager::new();
        self.fate = FateScheduler::new();
        self.tile.install_default_pools();

        // Pass 1: register every function declaration.
        let saved_pos = self.cur.pos;
        while !self.cur.at_end() {
            self.cur.skip_whitespace();
            if self.cur.eat("fn ") {
                self.register_function();
            } else {
                self.cur.skip_line();
            }
        }
        self.cur.pos = saved_pos;

        let first_pass_count = self.funcs.count();
        self.funcs.reset_cursor();
        debug!(functions = first_pass_count, "function pre-scan complete");

        // Pass 2: top-level statements. `fn` statements re-register their
        // functions over the pre-scan records in source order.
        while !self.cur.at_end() {
            self.statement();
        }
        self.funcs.restore_count(first_pass_count);

        // Safety terminator so control never falls into the function bodies.
        self.asm.exit_imm(0);

        // Pass 3: function bodies, in discovery order.
        for i in 0..self.funcs.count() {
            let func = match self.funcs.get(i) {
                Some(f) => f.clone(),
                None => continue,
            };
            if func.body.start == 0 || func.body.end <= func.body.start {
                continue;
            }
            self.funcs.set_code_offset(i, self.asm.pos());
            self.asm.bind_label(&func.name);
            self.asm.prologue();
            self.asm.sub_rsp(FUNCTION_SCRATCH);
            self.emit_function_body(&func);
            self.asm.add_rsp(FUNCTION_SCRATCH);
            self.asm.pop_rbp();
            self.asm.ret();
        }

        self.asm.resolve_fixups();
        debug!(
            code_bytes = self.asm.pos(),
            variables = self.vars.count(),
            "compilation complete"
        );
    }

    /// Parse a `fn` declaration at the cursor: name, whitespace-separated
    /// parameter names, then the braced body, which is skipped and recorded
    /// as a source span for pass 3.
    pub(crate) fn register_function(&mut self) {
        self.cur.skip_whitespace();
        let name = self.cur.parse_ident();
        if self.funcs.is_full() {
            return;
        }

        let mut params = Vec::new();
        self.cur.skip_whitespace();
        while !self.cur.at_end() && self.cur.peek() != b'{' && params.len() < MAX_PARAMS {
            if super::cursor::is_ident_start(self.cur.peek()) {
                params.push(self.cur.parse_ident());
            } else {
                self.cur.advance();
            }
            self.cur.skip_whitespace();
        }

        let mut body = 0..0;
        if self.cur.peek() == b'{' {
            self.cur.advance();
            let start = self.cur.pos;
            self.cur.skip_braced();
            // The scan consumed the closing brace; the span excludes it.
            body = start..self.cur.pos.saturating_sub(1);
        }

        self.funcs.register(Function {
            name,
            params,
            body,
            code_offset: 0,
        });
    }

    /// Emit one function body: install parameter slots, re-parse the saved
    /// span as statements, and restore the variable table afterwards.
    fn emit_function_body(&mut self, func: &Function) {
        let snap = self.vars.enter_function();

        // Arguments were pushed in call order, so with the return address at
        // +8 the k-th of p parameters sits at 16 + 8·(p−1−k).
        let p = func.params.len();
        for (k, name) in func.params.iter().enumerate() {
            let offset = 16 + 8 * (p - 1 - k) as i32;
            self.vars.add_param(name, offset);
        }

        let saved_pos = self.cur.pos;
        self.cur.pos = func.body.start;
        while self.cur.pos < func.body.end {
            self.statement();
        }
        self.cur.pos = saved_pos;

        self.vars.leave_function(snap);
    }

    /// Load a variable's value into rax.
    pub(crate) fn load_var(&mut self, var: &Variable) {
        if var.is_global() {
            self.asm.load_abs(var.address);
        } else {
            self.asm.mov_rax_frame(var.frame_offset);
        }
    }

    /// Store rax into a variable.
    pub(crate) fn store_var(&mut self, var: &Variable) {
        if var.is_global() {
            self.asm.store_abs(var.address);
        } else {
            self.asm.mov_frame_rax(var.frame_offset);
        }
    }

    // ── Result accessors for the driver and tests ───────────────────────────

    pub fn code(&self) -> &[u8] {
        self.asm.code.as_slice()
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    pub fn var_count(&self) -> usize {
        self.vars.count()
    }

    pub fn func_count(&self) -> usize {
        self.funcs.count()
    }

    pub fn global_bytes(&self) -> u64 {
        self.vars.global_bytes()
    }

    pub fn unified(&self) -> &UnifiedField {
        &self.unified
    }

    pub fn tile(&self) -> &TileManager {
        &self.tile
    }

    pub fn fate(&self) -> &FateScheduler {
        &self.fate
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn compat(&self) -> &Compat {
        &self.compat
    }

    /// Code offset a label resolved to, if it was bound. Exposed for tests.
    pub fn label_offset(&self, name: &str) -> Option<usize> {
        self.asm.label_offset(name)
    }
}
