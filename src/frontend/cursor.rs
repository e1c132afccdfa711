//! Byte-level source cursor.
//!
//! There is no token stream: the compiler scans keywords, identifiers,
//! numbers, and string literals directly off the byte cursor as statements
//! are recognised. Whitespace and `//` comments are consumed by
//! [`Cursor::skip_whitespace`]; `#` comments are handled at statement
//! boundaries and inside brace scanning, which treats them as opaque.

/// Identifiers are capped at this many bytes; further bytes are dropped.
pub const MAX_IDENT: usize = 255;
/// String literals are capped at this many bytes; further bytes are dropped.
pub const MAX_STRING: usize = 4095;

pub fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

/// Identifier bytes include `.`, so `syscall.write` scans as one name.
pub fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.'
}

/// A read cursor over the source bytes.
pub struct Cursor {
    src: Vec<u8>,
    pub pos: usize,
}

impl Cursor {
    pub fn new(src: Vec<u8>) -> Self {
        Self { src, pos: 0 }
    }

    pub fn len(&self) -> usize {
        self.src.len()
    }

    pub fn is_empty(&self) -> bool {
        self.src.is_empty()
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    /// Byte at the cursor, or 0 at end of input.
    pub fn peek(&self) -> u8 {
        self.src.get(self.pos).copied().unwrap_or(0)
    }

    /// Byte `n` past the cursor, or 0 past end of input.
    pub fn peek_at(&self, n: usize) -> u8 {
        self.src.get(self.pos + n).copied().unwrap_or(0)
    }

    /// Consume and return one byte (0 at end of input).
    pub fn advance(&mut self) -> u8 {
        let b = self.peek();
        if self.pos < self.src.len() {
            self.pos += 1;
        }
        b
    }

    pub fn advance_by(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.src.len());
    }

    /// Does the input at the cursor start with `s`?
    pub fn starts_with(&self, s: &str) -> bool {
        self.src[self.pos..].starts_with(s.as_bytes())
    }

    /// Consume `s` if the input starts with it.
    pub fn eat(&mut self, s: &str) -> bool {
        if self.starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    /// Skip spaces, tabs, newlines, and `//` line comments.
    pub fn skip_whitespace(&mut self) {
        while !self.at_end() {
            match self.peek() {
                b' ' | b'\t' | b'\n' | b'\r' => {
                    self.advance();
                }
                b'/' if self.peek_at(1) == b'/' => {
                    while !self.at_end() && self.peek() != b'\n' {
                        self.advance();
                    }
                    if self.peek() == b'\n' {
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    /// Skip to and past the next newline.
    pub fn skip_line(&mut self) {
        while !self.at_end() && self.peek() != b'\n' {
            self.advance();
        }
        if self.peek() == b'\n' {
            self.advance();
        }
    }

    /// With the cursor just past an opening brace, advance past the matching
    /// closing brace. String literals (with `\`-escapes) and `#` comments
    /// are opaque, so a `"}"` or a brace in a comment never closes a block.
    pub fn skip_braced(&mut self) {
        let mut depth = 1u32;
        while !self.at_end() && depth > 0 {
            match self.peek() {
                b'{' => depth += 1,
                b'}' => depth -= 1,
                b'"' => {
                    self.advance();
                    while !self.at_end() && self.peek() != b'"' {
                        if self.peek() == b'\\' {
                            self.advance();
                        }
                        self.advance();
                    }
                }
                b'#' => {
                    while !self.at_end() && self.peek() != b'\n' {
                        self.advance();
                    }
                }
                _ => {}
            }
            self.advance();
        }
    }

    /// Skip a `<keyword> { … }` declaration: everything up to the next `{`,
    /// then the balanced block.
    pub fn skip_block_decl(&mut self) {
        while !self.at_end() && self.peek() != b'{' {
            self.advance();
        }
        if self.peek() == b'{' {
            self.advance();
            self.skip_braced();
        }
    }

    /// Read an identifier at the cursor (letters, digits, `_`, `.`).
    pub fn parse_ident(&mut self) -> String {
        let mut name = String::new();
        while !self.at_end() && is_ident_char(self.peek()) {
            let b = self.advance();
            if name.len() < MAX_IDENT {
                name.push(b as char);
            }
        }
        name
    }

    /// Read a string literal at the cursor, resolving `\n`, `\t`, `\r`,
    /// `\0`, and `\xHH` escapes; any other escaped byte stands for itself.
    /// Returns the raw bytes (which may include NUL or non-UTF-8 data).
    pub fn parse_string(&mut self) -> Vec<u8> {
        let mut bytes = Vec::new();
        if self.peek() == b'"' {
            self.advance();
        }
        while !self.at_end() && self.peek() != b'"' && bytes.len() < MAX_STRING {
            let b = self.advance();
            if b == b'\\' && !self.at_end() {
                let esc = self.advance();
                match esc {
                    b'n' => bytes.push(b'\n'),
                    b't' => bytes.push(b'\t'),
                    b'r' => bytes.push(b'\r'),
                    b'0' => bytes.push(0),
                    b'x' if self.pos + 2 <= self.len() => {
                        let hex = [self.advance(), self.advance()];
                        let s = std::str::from_utf8(&hex).unwrap_or("0");
                        bytes.push(u8::from_str_radix(s, 16).unwrap_or(0));
                    }
                    _ => bytes.push(esc),
                }
            } else {
                bytes.push(b);
            }
        }
        if self.peek() == b'"' {
            self.advance();
        }
        bytes
    }

    /// Read an integer: optional leading minus, decimal or `0x` hex digits.
    /// A decimal point is accepted and its digits consumed, but the
    /// fractional part truncates away.
    pub fn parse_int(&mut self) -> i64 {
        let mut num: i64 = 0;
        let mut neg = false;
        if self.peek() == b'-' {
            neg = true;
            self.advance();
        }
        if self.peek() == b'0' && self.peek_at(1) == b'x' {
            self.advance();
            self.advance();
            while self.peek().is_ascii_hexdigit() {
                let b = self.advance();
                let digit = (b as char).to_digit(16).unwrap_or(0) as i64;
                num = num.wrapping_mul(16).wrapping_add(digit);
            }
        } else {
            while self.peek().is_ascii_digit() {
                let digit = (self.advance() - b'0') as i64;
                num = num.wrapping_mul(10).wrapping_add(digit);
            }
        }
        if self.peek() == b'.' {
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }
        if neg {
            -num
        } else {
            num
        }
    }

    /// Read a decimal fraction with full precision. Used by the `unified`
    /// block, whose parameters live in [0, 1] and would all truncate to
    /// zero under [`Cursor::parse_int`].
    pub fn parse_decimal(&mut self) -> f64 {
        let mut neg = false;
        if self.peek() == b'-' {
            neg = true;
            self.advance();
        }
        let mut val = 0.0f64;
        while self.peek().is_ascii_digit() {
            val = val * 10.0 + (self.advance() - b'0') as f64;
        }
        if self.peek() == b'.' {
            self.advance();
            let mut scale = 0.1;
            while self.peek().is_ascii_digit() {
                val += (self.advance() - b'0') as f64 * scale;
                scale *= 0.1;
            }
        }
        if neg {
            -val
        } else {
            val
        }
    }
}
