//! Numeric-text scanner for the simple on-device file formats.
//!
//! Tokens are plain decimals: an optional leading `-`, digits, and at most
//! one `.`. There is no exponent or locale handling.

use std::io::{self, ErrorKind, Read};

/// Digits kept in the mantissa. Later digits only move the decimal point.
const SIGNIFICANT_DIGITS: u32 = 17;

/// Byte reader with one byte of lookahead.
pub struct TextScanner<R: Read> {
    reader: R,
    lookahead: Option<u8>,
}

impl<R: Read> TextScanner<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            lookahead: None,
        }
    }

    /// Next byte without consuming it, `None` at end of input.
    pub fn peek(&mut self) -> io::Result<Option<u8>> {
        if self.lookahead.is_none() {
            let mut byte = [0u8; 1];
            loop {
                match self.reader.read(&mut byte) {
                    Ok(0) => return Ok(None),
                    Ok(_) => {
                        self.lookahead = Some(byte[0]);
                        break;
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(self.lookahead)
    }

    pub fn next_byte(&mut self) -> io::Result<Option<u8>> {
        let byte = self.peek()?;
        self.lookahead = None;
        Ok(byte)
    }

    /// Skip spaces, tabs, carriage returns and line feeds.
    pub fn skip_whitespace(&mut self) -> io::Result<()> {
        while let Some(b' ' | b'\t' | b'\r' | b'\n') = self.peek()? {
            self.lookahead = None;
        }
        Ok(())
    }

    /// Skip whitespace, then consume `expected` if it is the next byte.
    /// Nothing is consumed on a mismatch.
    pub fn match_char(&mut self, expected: u8) -> io::Result<bool> {
        self.skip_whitespace()?;
        if self.peek()? == Some(expected) {
            self.lookahead = None;
            return Ok(true);
        }
        Ok(false)
    }

    /// Skip whitespace and scan one decimal number.
    ///
    /// Returns `None` when no digit was seen (a bare `-` or `.`) or when a
    /// second decimal point follows the number. Scanning stops before the
    /// first byte that does not belong to the number, so in `1.2.3` the
    /// second point is left in the stream.
    pub fn match_float(&mut self) -> io::Result<Option<f32>> {
        self.skip_whitespace()?;

        let negative = self.peek()? == Some(b'-');
        if negative {
            self.lookahead = None;
        }

        let mut mantissa = 0f64;
        let mut significant = 0u32;
        // Power of ten applied to `mantissa` at the end.
        let mut scale = 0i32;
        let mut seen_digit = false;
        let mut seen_point = false;

        loop {
            match self.peek()? {
                Some(c @ b'0'..=b'9') => {
                    self.lookahead = None;
                    seen_digit = true;
                    if significant < SIGNIFICANT_DIGITS {
                        if mantissa != 0.0 || c != b'0' {
                            significant += 1;
                        }
                        mantissa = mantissa * 10.0 + f64::from(c - b'0');
                        if seen_point {
                            scale = scale.saturating_sub(1);
                        }
                    } else if !seen_point {
                        scale = scale.saturating_add(1);
                    }
                }
                Some(b'.') if seen_point => return Ok(None),
                Some(b'.') => {
                    self.lookahead = None;
                    seen_point = true;
                }
                _ => break,
            }
        }

        if !seen_digit {
            return Ok(None);
        }
        let mut value = if scale < 0 {
            mantissa / 10f64.powi(scale.saturating_neg())
        } else {
            mantissa * 10f64.powi(scale)
        };
        if negative {
            value = -value;
        }
        Ok(Some(value as f32))
    }

    /// Read every number up to end of input, each optionally followed by
    /// `separator`. Anything else is `InvalidData`.
    pub fn collect_floats(&mut self, separator: u8) -> io::Result<Vec<f32>> {
        let mut values = Vec::new();
        loop {
            self.skip_whitespace()?;
            if self.peek()?.is_none() {
                return Ok(values);
            }
            let Some(value) = self.match_float()? else {
                let found = self.peek()?.map(char::from);
                return Err(io::Error::new(
                    ErrorKind::InvalidData,
                    format!("expected a number, found {:?}", found),
                ));
            };
            values.push(value);
            self.match_char(separator)?;
        }
    }

}
