//! Expression code generation.
//!
//! Expressions evaluate into rax. The grammar is a single recursive descent:
//! a primary (literal, inline string, variable load, call, or parenthesised
//! subexpression) followed by a flat binary-operator loop. The loop does not
//! stratify by precedence — the right operand of every operator is a full
//! expression, so `a - b + c` means `a - (b + c)`.
//!
//! Binary arithmetic spills the left operand, compiles the right, pops the
//! left into rbx, and applies. Comparisons produce 0 or 1 in rax via
//! compare/setcc/zero-extend.

use crate::backend::symbols::MAX_PARAMS;
use crate::backend::Cond;

use super::compiler::Compiler;
use super::cursor::is_ident_start;

impl Compiler {
    /// Compile one expression; the result is left in rax.
    pub(crate) fn expr(&mut self) {
        self.cur.skip_whitespace();
        let c = self.cur.peek();

        if c.is_ascii_digit() || (c == b'-' && self.cur.peek_at(1).is_ascii_digit()) {
            let v = self.cur.parse_int();
            self.asm.mov_rax_imm(v);
        } else if c == b'"' {
            self.string_literal();
        } else if is_ident_start(c) {
            let name = self.cur.parse_ident();
            self.cur.skip_whitespace();
            if self.cur.peek() == b'(' {
                self.cur.advance();
                self.cur.skip_whitespace();
                self.call_or_builtin(&name);
            } else {
                match self.vars.resolve(&name) {
                    Some(var) => self.load_var(&var),
                    // Undeclared reads compile as constant zero.
                    None => self.asm.mov_rax_imm(0),
                }
            }
        } else if c == b'(' {
            self.cur.advance();
            self.expr();
            self.cur.skip_whitespace();
            if self.cur.peek() == b')' {
                self.cur.advance();
            }
        } else {
            self.asm.mov_rax_imm(0);
        }

        self.binary_ops();
    }

    /// Inline the string bytes (NUL-terminated) behind a short jump and
    /// leave their rip-relative address in rax.
    fn string_literal(&mut self) {
        let bytes = self.cur.parse_string();
        let len = bytes.len();
        self.asm.jmp_rel8((len + 1) as u8);
        let data_pos = self.asm.pos();
        for &b in &bytes {
            self.asm.code.emit_byte(b);
        }
        self.asm.code.emit_byte(0);
        // rip after the 7-byte lea, back to the start of the data.
        let rel = -((self.asm.pos() - data_pos + 7) as i32);
        self.asm.lea_rax_rip(rel);
    }

    /// Call-position identifier: a built-in, a syscall, or a user function.
    /// The cursor sits on the first argument (the opening parenthesis is
    /// already consumed).
    fn call_or_builtin(&mut self, name: &str) {
        match name {
            "getchar" => {
                if self.cur.peek() == b')' {
                    self.cur.advance();
                }
                self.emit_getchar();
            }
            "peek" => {
                self.expr();
                self.eat_close_paren();
                self.asm.load_byte_at_rax();
            }
            "poke" => {
                self.expr();
                self.asm.push_rax();
                self.eat_comma();
                self.cur.skip_whitespace();
                self.expr();
                self.eat_close_paren();
                self.asm.pop_rbx();
                self.asm.store_al_at_rbx();
            }
            _ if name.starts_with("syscall") => {
                let sub = name.strip_prefix("syscall").unwrap_or("");
                let sub = sub.strip_prefix('.').unwrap_or(sub);
                match sub {
                    "open" => self.syscall3_args(2),
                    "read" => self.syscall3_args(0),
                    "write" => self.syscall3_args(1),
                    "close" => self.syscall_close_args(),
                    "mmap" => self.syscall_mmap_args(),
                    // Unknown syscall names emit nothing; their arguments
                    // are left for the surrounding parser to trip over.
                    _ => {}
                }
                self.eat_close_paren();
            }
            _ => {
                let mut argc: i32 = 0;
                while !self.cur.at_end()
                    && self.cur.peek() != b')'
                    && (argc as usize) < MAX_PARAMS
                {
                    self.expr();
                    self.asm.push_rax();
                    argc += 1;
                    self.cur.skip_whitespace();
                    if self.cur.peek() == b',' {
                        self.cur.advance();
                    }
                    self.cur.skip_whitespace();
                }
                if self.cur.peek() == b')' {
                    self.cur.advance();
                }
                self.asm.call(name);
                if argc > 0 {
                    self.asm.add_rsp(argc * 8);
                }
            }
        }
    }

    /// The flat binary-operator loop. Two-character comparisons are checked
    /// before their single-character prefixes; `-` is a binary operator only
    /// when not immediately followed by a digit (a following digit starts a
    /// new expression instead), and compound-assignment lookalikes (`+=` and
    /// friends) terminate the expression.
    fn binary_ops(&mut self) {
        self.cur.skip_whitespace();
        while !self.cur.at_end() {
            let op = self.cur.peek();
            let op2 = self.cur.peek_at(1);

            match op {
                b'+' if op2 != b'=' => {
                    self.cur.advance();
                    self.asm.push_rax();
                    self.expr();
                    self.asm.pop_rbx();
                    self.asm.add_rax_rbx();
                }
                b'-' if !op2.is_ascii_digit() && op2 != b'=' => {
                    self.cur.advance();
                    self.asm.push_rax();
                    self.expr();
                    self.asm.pop_rbx();
                    self.asm.sub_rbx_rax();
                }
                b'*' if op2 != b'=' => {
                    self.cur.advance();
                    self.asm.push_rax();
                    self.expr();
                    self.asm.pop_rbx();
                    self.asm.imul_rax_rbx();
                }
                b'/' if op2 != b'=' => {
                    self.cur.advance();
                    self.asm.push_rax();
                    self.expr();
                    // Divisor to rbx, dividend back to rax, sign-extend,
                    // divide.
                    self.asm.mov_rbx_rax();
                    self.asm.pop_rax();
                    self.asm.idiv_rbx();
                }
                b'>' if op2 == b'=' => {
                    self.cur.advance_by(2);
                    self.compare(Cond::Ge);
                }
                b'<' if op2 == b'=' => {
                    self.cur.advance_by(2);
                    self.compare(Cond::Le);
                }
                b'=' if op2 == b'=' => {
                    self.cur.advance_by(2);
                    self.compare(Cond::Eq);
                }
                b'!' if op2 == b'=' => {
                    self.cur.advance_by(2);
                    self.compare(Cond::Ne);
                }
                b'>' if op2 != b'>' => {
                    self.cur.advance();
                    self.compare(Cond::Gt);
                }
                b'<' if op2 != b'<' => {
                    self.cur.advance();
                    self.compare(Cond::Lt);
                }
                _ => break,
            }
        }
    }

    /// Spill the left operand, compile the right, and reduce to 0/1 in rax.
    fn compare(&mut self, cond: Cond) {
        self.asm.push_rax();
        self.expr();
        self.asm.pop_rbx();
        self.asm.cmp_rbx_rax_set(cond);
    }
}
