//! Statement recognition and code generation.
//!
//! Statements are recognised by raw keyword-prefix matching at the current
//! cursor, in a fixed order with longest-prefix-first where forms overlap
//! (`fate on` before the `fate { … }` skip-block, `platform.probe` before
//! `platform { … }`). Anything unrecognised falls through to the
//! assignment/call identifier path, and failing that the line is skipped.

use super::compiler::{Compiler, MAX_LOOP_DEPTH};
use super::cursor::is_ident_start;

/// `<keyword> { … }` declarations that parse as balanced blocks and emit
/// nothing. `rule`, `intent`, `pool`, and `use` skip to the block from the
/// keyword itself, hence the trailing space instead of ` {`.
const SKIP_BLOCKS: &[&str] = &[
    "pool ",
    "fate {",
    "task {",
    "gpu {",
    "perf {",
    "reg {",
    "sys {",
    "compiler {",
    "collapse {",
    "lib {",
    "env {",
    "rule ",
    "intent ",
    "platform {",
    "tile {",
    "codegen {",
    "graphics {",
    "gui {",
    "style {",
    "layout {",
    "event {",
    "db {",
    "core {",
    "kernel {",
    "linux {",
    "macos {",
    "windows {",
    "driver {",
    "observe {",
    "field {",
    "use ",
];

impl Compiler {
    /// Compile one statement at the cursor. Statements leave the stack
    /// balanced; expression results in rax are dropped.
    pub(crate) fn statement(&mut self) {
        self.cur.skip_whitespace();
        if self.cur.at_end() {
            return;
        }

        if self.cur.peek() == b'#' {
            self.cur.skip_line();
            return;
        }

        if self.cur.eat("out ") {
            self.stmt_out();
            return;
        }
        if self.cur.eat("emit ") {
            self.stmt_emit();
            return;
        }
        if self.cur.eat("fn ") {
            self.register_function();
            return;
        }
        if self.cur.eat("when ") {
            self.stmt_when();
            return;
        }
        if self.cur.eat("loop") {
            self.cur.skip_whitespace();
            self.stmt_loop();
            return;
        }
        if self.cur.eat("break") {
            self.stmt_break();
            return;
        }
        if self.cur.eat("return") {
            self.stmt_return();
            return;
        }
        if self.cur.eat("-> ") {
            self.stmt_return();
            return;
        }
        if self.cur.eat("keep") {
            self.asm.spin();
            return;
        }
        if self.cur.eat("fate on") {
            self.fate_mode = true;
            self.fate.on = true;
            return;
        }
        if self.cur.eat("fate off") {
            self.fate_mode = false;
            self.fate.on = false;
            return;
        }
        if self.cur.eat("limit ") {
            let n = self.cur.parse_int();
            self.fate.set_limit(n);
            return;
        }

        if self.cur.eat("syscall.exit(") {
            self.stmt_syscall_exit();
            return;
        }
        if self.cur.eat("syscall.write(") {
            self.syscall3_args(1);
            self.eat_close_paren();
            return;
        }
        if self.cur.eat("syscall.read(") {
            self.syscall3_args(0);
            self.eat_close_paren();
            return;
        }
        if self.cur.eat("syscall.open(") {
            self.syscall3_args(2);
            self.eat_close_paren();
            return;
        }
        if self.cur.eat("syscall.close(") {
            self.syscall_close_args();
            self.eat_close_paren();
            return;
        }
        if self.cur.eat("syscall.mmap(") {
            self.syscall_mmap_args();
            self.eat_close_paren();
            return;
        }

        if self.cur.eat("poke(") {
            self.stmt_poke();
            return;
        }
        if self.cur.eat("peek(") {
            self.expr();
            self.asm.load_byte_at_rax();
            self.eat_close_paren();
            return;
        }
        if self.cur.eat("getchar()") {
            self.emit_getchar();
            return;
        }
        if self.cur.eat("putchar(") {
            self.stmt_putchar();
            return;
        }
        if self.cur.eat("byte(") {
            self.stmt_putchar();
            return;
        }

        if self.cur.eat("unified ") {
            self.parse_unified_block();
            return;
        }
        if self.cur.starts_with("unified{") {
            self.cur.advance_by("unified".len());
            self.parse_unified_block();
            return;
        }

        // Probes are recorded at compiler construction; the statements are
        // purely syntactic.
        if self.cur.eat("platform.probe") {
            return;
        }
        if self.cur.eat("bridge.read") {
            return;
        }
        if self.cur.eat("compat.probe") {
            return;
        }

        if SKIP_BLOCKS.iter().any(|kw| self.cur.starts_with(kw)) {
            self.cur.skip_block_decl();
            return;
        }

        if self.cur.eat("otherwise") {
            self.cur.skip_whitespace();
            if self.cur.peek() == b'{' {
                self.block();
            }
            return;
        }

        if is_ident_start(self.cur.peek()) {
            self.stmt_ident();
            return;
        }

        self.cur.skip_line();
    }

    /// Compile statements up to the closing brace of the current block.
    pub(crate) fn block(&mut self) {
        self.cur.skip_whitespace();
        if self.cur.peek() == b'{' {
            self.cur.advance();
        }
        while !self.cur.at_end() {
            self.cur.skip_whitespace();
            if self.cur.peek() == b'}' {
                self.cur.advance();
                break;
            }
            self.statement();
        }
    }

    /// `out "…"`: jump over the inlined bytes, then write them to stdout.
    fn stmt_out(&mut self) {
        self.cur.skip_whitespace();
        let text = self.cur.parse_string();
        if text.is_empty() {
            return;
        }
        self.emit_inline_write(&text);
    }

    /// `emit "…"`: identical lowering to `out`; the literal is treated as
    /// raw bytes.
    fn stmt_emit(&mut self) {
        self.cur.skip_whitespace();
        let bytes = self.cur.parse_string();
        if bytes.is_empty() {
            return;
        }
        self.emit_inline_write(&bytes);
    }

    /// Inline `bytes` in the code stream behind a near jump and emit
    /// `write(stdout, rip-relative address, len)`.
    fn emit_inline_write(&mut self, bytes: &[u8]) {
        let len = bytes.len();
        self.asm.jmp_rel32(len as i32);
        let data_pos = self.asm.pos();
        for &b in bytes {
            self.asm.code.emit_byte(b);
        }
        self.asm.mov_rax_imm(1);
        self.asm.mov_rdi_imm(1);
        // rip after the 7-byte lea points past it; back up over the two
        // 10-byte moves as well to land on the inlined data.
        let rel = -((self.asm.pos() - data_pos + 7) as i32);
        self.asm.lea_rsi_rip(rel);
        self.asm.mov_rdx_imm(len as i64);
        self.asm.syscall();
    }

    /// `when <expr> { … }`: test rax, jump past the block when zero.
    fn stmt_when(&mut self) {
        let id = self.when_id;
        self.when_id += 1;
        let end_label = format!("_when_end_{}", id);

        self.cur.skip_whitespace();
        self.expr();
        self.asm.test_rax_rax();
        self.asm.je(&end_label);

        self.cur.skip_whitespace();
        if self.cur.peek() == b'{' {
            self.block();
        }
        self.asm.bind_label(&end_label);
    }

    /// `loop { … }`: back-edge to the start label, end label as the break
    /// target. The label pair is pushed for `break`/`->` while the body
    /// compiles.
    fn stmt_loop(&mut self) {
        let id = self.loop_id;
        self.loop_id += 1;
        let start_label = format!("_loop_start_{}", id);
        let end_label = format!("_loop_end_{}", id);

        if self.loop_stack.len() < MAX_LOOP_DEPTH {
            self.loop_stack
                .push((start_label.clone(), end_label.clone()));
        }

        self.asm.bind_label(&start_label);
        self.cur.skip_whitespace();
        if self.cur.peek() == b'{' {
            self.block();
        }

        // One scheduler tick per compiled loop while fate is dynamic.
        if self.fate_mode && self.fate.on {
            self.fate.tick(&self.tile);
        }

        self.asm.jmp(&start_label);
        self.asm.bind_label(&end_label);
        self.loop_stack.pop();
    }

    /// `break`: jump to the innermost loop end; no-op outside any loop.
    fn stmt_break(&mut self) {
        if let Some((_, end)) = self.loop_stack.last() {
            let end = end.clone();
            self.asm.jmp(&end);
        }
    }

    /// `return <expr>` / `-> <expr>`. Inside a loop this is break-with-value
    /// (the value rides in rax); at function level it is a real return.
    fn stmt_return(&mut self) {
        self.cur.skip_whitespace();
        if !self.cur.at_end() && self.cur.peek() != b'}' {
            self.expr();
        }
        if let Some((_, end)) = self.loop_stack.last() {
            let end = end.clone();
            self.asm.jmp(&end);
        } else {
            self.asm.epilogue();
        }
    }

    /// `syscall.exit(…)`: a literal status takes the immediate path; an
    /// expression is compiled and moved into rdi.
    fn stmt_syscall_exit(&mut self) {
        self.cur.skip_whitespace();
        let c = self.cur.peek();
        if c.is_ascii_digit() || c == b'-' {
            let code = self.cur.parse_int();
            while !self.cur.at_end() && self.cur.peek() != b')' {
                self.cur.advance();
            }
            if self.cur.peek() == b')' {
                self.cur.advance();
            }
            self.asm.exit_imm(code);
        } else {
            self.expr();
            self.eat_close_paren();
            self.asm.exit_rax();
        }
    }

    /// Three-argument syscall body (`write`/`read`/`open`): spill the first
    /// two arguments, evaluate the third into rdx, then pop into rsi and
    /// rdi. Does not consume the closing parenthesis.
    pub(crate) fn syscall3_args(&mut self, nr: i64) {
        self.expr();
        self.asm.push_rax();
        self.eat_comma();
        self.expr();
        self.asm.push_rax();
        self.eat_comma();
        self.expr();
        self.asm.mov_rdx_rax();
        self.asm.pop_rax();
        self.asm.mov_rsi_rax();
        self.asm.pop_rax();
        self.asm.mov_rdi_rax();
        self.asm.mov_rax_imm(nr);
        self.asm.syscall();
    }

    /// `syscall.close(fd)` body.
    pub(crate) fn syscall_close_args(&mut self) {
        self.expr();
        self.asm.mov_rdi_rax();
        self.asm.mov_rax_imm(3);
        self.asm.syscall();
    }

    /// `syscall.mmap(addr, len, prot, flags, fd, offset)` body: five spills,
    /// the sixth argument lands in r9, then pops fill r8/r10/rdx/rsi/rdi.
    pub(crate) fn syscall_mmap_args(&mut self) {
        for _ in 0..5 {
            self.expr();
            self.asm.push_rax();
            self.eat_comma();
        }
        self.expr();
        self.asm.mov_r9_rax();
        self.asm.pop_r8();
        self.asm.pop_r10();
        self.asm.pop_rax();
        self.asm.mov_rdx_rax();
        self.asm.pop_rax();
        self.asm.mov_rsi_rax();
        self.asm.pop_rax();
        self.asm.mov_rdi_rax();
        self.asm.mov_rax_imm(9);
        self.asm.syscall();
    }

    /// `poke(addr, val)`: byte store through rbx.
    fn stmt_poke(&mut self) {
        self.expr();
        self.asm.push_rax();
        self.eat_comma();
        self.cur.skip_whitespace();
        self.expr();
        self.asm.pop_rbx();
        self.asm.store_al_at_rbx();
        self.eat_close_paren();
    }

    /// Read one byte from stdin through a 16-byte red zone; result in rax.
    pub(crate) fn emit_getchar(&mut self) {
        self.asm.sub_rsp(16);
        self.asm.mov_rax_imm(0);
        self.asm.mov_rdi_imm(0);
        self.asm.lea_rsi_rsp();
        self.asm.mov_rdx_imm(1);
        self.asm.syscall();
        self.asm.load_byte_at_rsp();
        self.asm.add_rsp(16);
    }

    /// `putchar(n)` / `byte(n)`: write the low byte of the expression to
    /// stdout through a 16-byte red zone.
    fn stmt_putchar(&mut self) {
        self.expr();
        self.eat_close_paren();
        self.asm.sub_rsp(16);
        self.asm.store_al_at_rsp();
        self.asm.mov_rax_imm(1);
        self.asm.mov_rdi_imm(1);
        self.asm.lea_rsi_rsp();
        self.asm.mov_rdx_imm(1);
        self.asm.syscall();
        self.asm.add_rsp(16);
    }

    /// `unified { i: <f>, e: <f>, r: <f> }`: parse the named fields into
    /// the Unified Field record, clamped to [0, 1]. Long key names are
    /// accepted alongside the single-letter forms; unknown keys are parsed
    /// and ignored.
    fn parse_unified_block(&mut self) {
        self.cur.skip_whitespace();
        if self.cur.peek() != b'{' {
            self.cur.skip_line();
            return;
        }
        self.cur.advance();

        while !self.cur.at_end() && self.cur.peek() != b'}' {
            let entry_pos = self.cur.pos;
            self.cur.skip_whitespace();
            if self.cur.peek() == b'}' {
                break;
            }
            let key = self.cur.parse_ident();
            self.cur.skip_whitespace();
            if self.cur.peek() == b':' {
                self.cur.advance();
            }
            self.cur.skip_whitespace();
            let val = self.cur.parse_decimal();

            match key.as_str() {
                "i" | "information_density" => self.unified.set_i(val),
                "e" | "entropy_gradient" => self.unified.set_e(val),
                "r" | "relation_strength" => self.unified.set_r(val),
                _ => {}
            }

            self.cur.skip_whitespace();
            if self.cur.peek() == b',' {
                self.cur.advance();
            }
            // Malformed entries must still move the cursor.
            if self.cur.pos == entry_pos {
                self.cur.advance();
            }
        }
        if self.cur.peek() == b'}' {
            self.cur.advance();
        }
    }

    /// Identifier fallback: `name = <expr>` assigns (declaring on first
    /// use), `name(args…)` calls, anything else skips the line.
    fn stmt_ident(&mut self) {
        let name = self.cur.parse_ident();
        self.cur.skip_whitespace();

        if self.cur.peek() == b'=' && self.cur.peek_at(1) != b'=' {
            self.cur.advance();
            self.stmt_assign(&name);
        } else if self.cur.peek() == b'(' {
            self.cur.advance();
            self.cur.skip_whitespace();
            let mut argc: i32 = 0;
            while !self.cur.at_end() && self.cur.peek() != b')' {
                let arg_pos = self.cur.pos;
                self.expr();
                self.asm.push_rax();
                argc += 1;
                self.cur.skip_whitespace();
                if self.cur.peek() == b',' {
                    self.cur.advance();
                }
                self.cur.skip_whitespace();
                // Malformed argument lists must still move the cursor.
                if self.cur.pos == arg_pos {
                    self.cur.advance();
                }
            }
            if self.cur.peek() == b')' {
                self.cur.advance();
            }
            self.asm.call(&name);
            if argc > 0 {
                self.asm.add_rsp(argc * 8);
            }
        } else {
            self.cur.skip_line();
        }
    }

    /// Resolve or declare the variable, compile the right-hand side, store.
    fn stmt_assign(&mut self, name: &str) {
        self.cur.skip_whitespace();
        let var = match self.vars.resolve(name) {
            Some(v) => Some(v),
            None => self.vars.declare(name),
        };
        if let Some(var) = var {
            self.expr();
            self.store_var(&var);
        }
    }

    pub(crate) fn eat_comma(&mut self) {
        self.cur.skip_whitespace();
        if self.cur.peek() == b',' {
            self.cur.advance();
        }
    }

    pub(crate) fn eat_close_paren(&mut self) {
        self.cur.skip_whitespace();
        if self.cur.peek() == b')' {
            self.cur.advance();
        }
    }
}
