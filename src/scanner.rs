//! Character Scanner
//!
//! A filtered character stream above the script buffer. A 128-entry table
//! of per-character filters folds whitespace runs to a single space,
//! collapses CR/LF pairs to one line break (counting lines), strips `#`
//! line comments, and reports disallowed bytes, passing everything else
//! through unchanged.
//!
//! The whitespace level lets sub-parsers (notably the number parser)
//! temporarily suppress whitespace folding so a space can terminate an
//! expression. A small ring of undo frames supports token-level backtrack;
//! positions are tracked per character so diagnostics can point at a
//! retained frame rather than wherever scanning stopped.

use crate::buffer::{BufStatus, ScriptBuffer};
use crate::diag::{Diagnostics, Frame};
use crate::symtab::{SymId, SymTab};

/// Maximum identifier length kept, in bytes
pub const IDENT_MAX: usize = 79;

/// Size of the undo ring, in frames
pub const UNDO_FRAMES: usize = 64;

/// Whitespace handling level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WsLevel {
    /// Collapse space runs to one `' '`, fold line breaks to `'\n'`
    #[default]
    Normal,
    /// Pass spaces through unfolded (line breaks still count lines)
    None,
}

/// Character returned when the script has ended
pub const CH_END: u8 = 0;

/// One remembered scan step
#[derive(Debug, Clone, Copy, Default)]
struct ScanFrame {
    c: u8,
    line: u32,
    col: u32,
}

type Filter = fn(&mut Scanner, u8) -> Option<u8>;

/// Filtered character stream with interning and diagnostics access
pub struct Scanner {
    buf: ScriptBuffer,
    symtab: SymTab,
    diag: Diagnostics,
    ws: WsLevel,
    line: u32,
    col: u32,
    filters: [Option<Filter>; 128],
    ring: [ScanFrame; UNDO_FRAMES],
    /// Total frames ever written (ring write cursor)
    written: usize,
    /// Frames currently ungot, to be replayed before fresh scanning
    unread: usize,
    read_error_reported: bool,
}

impl Scanner {
    pub fn new(buf: ScriptBuffer, symtab: SymTab, diag: Diagnostics) -> Self {
        let mut filters: [Option<Filter>; 128] = [None; 128];
        filters[b' ' as usize] = Some(Self::filter_space);
        filters[b'\t' as usize] = Some(Self::filter_space);
        filters[b'\n' as usize] = Some(Self::filter_linebreak);
        filters[b'\r' as usize] = Some(Self::filter_linebreak);
        filters[b'#' as usize] = Some(Self::filter_comment);
        for c in 0..0x20u8 {
            if c != b'\t' && c != b'\n' && c != b'\r' {
                filters[c as usize] = Some(Self::filter_invalid);
            }
        }
        filters[0x7f] = Some(Self::filter_invalid);
        Self {
            buf,
            symtab,
            diag,
            ws: WsLevel::Normal,
            line: 1,
            col: 0,
            filters,
            ring: [ScanFrame::default(); UNDO_FRAMES],
            written: 0,
            unread: 0,
            read_error_reported: false,
        }
    }

    /// The symbol table this compile interns into
    pub fn symtab(&mut self) -> &mut SymTab {
        &mut self.symtab
    }

    pub fn symtab_ref(&self) -> &SymTab {
        &self.symtab
    }

    /// The diagnostics collector
    pub fn diag(&mut self) -> &mut Diagnostics {
        &mut self.diag
    }

    /// Position of the most recently returned character
    pub fn frame(&self) -> Frame {
        Frame::new(self.line, self.col.max(1))
    }

    /// Set the whitespace level, returning the previous one.
    pub fn set_ws(&mut self, ws: WsLevel) -> WsLevel {
        std::mem::replace(&mut self.ws, ws)
    }

    /// Whether the underlying source has finished
    pub fn ended(&self) -> bool {
        self.buf.status() != BufStatus::Ok
    }

    /// Tear the scanner apart after parsing.
    pub fn into_parts(self) -> (SymTab, Diagnostics) {
        (self.symtab, self.diag)
    }

    /// One raw byte from the buffer, with column accounting.
    #[inline]
    fn raw(&mut self) -> u8 {
        let c = self.buf.getc();
        self.col += 1;
        c
    }

    #[inline]
    fn unraw(&mut self) {
        self.buf.ungetc();
        self.col -= 1;
    }

    /// Read the next meaningful character; [`CH_END`] at end of script.
    pub fn getc(&mut self) -> u8 {
        if self.unread > 0 {
            let frame = self.ring[(self.written - self.unread) % UNDO_FRAMES];
            self.unread -= 1;
            self.line = frame.line;
            self.col = frame.col;
            return frame.c;
        }
        let c = self.scan();
        self.ring[self.written % UNDO_FRAMES] = ScanFrame {
            c,
            line: self.line,
            col: self.col,
        };
        self.written += 1;
        c
    }

    /// Undo the last [`Self::getc`]; the character is replayed next.
    ///
    /// Up to [`UNDO_FRAMES`] characters may be pending at once.
    pub fn ungetc(&mut self) {
        debug_assert!(
            self.unread < UNDO_FRAMES && self.unread < self.written,
            "ungetc without a frame to restore"
        );
        self.unread += 1;
    }

    /// Count of characters consumed so far (net of ungets). Lets a caller
    /// tell whether a speculative sub-parse moved the stream.
    pub fn scan_pos(&self) -> usize {
        self.written - self.unread
    }

    /// Read one character and keep it only if it equals `c`.
    pub fn tryc(&mut self, c: u8) -> bool {
        if self.getc() == c {
            true
        } else {
            self.ungetc();
            false
        }
    }

    /// Run the filter table until a character comes through.
    fn scan(&mut self) -> u8 {
        loop {
            let c = self.raw();
            if self.buf.is_marker(c) {
                self.unraw();
                if self.buf.status() == BufStatus::Error && !self.read_error_reported {
                    self.read_error_reported = true;
                    let frame = self.frame();
                    self.diag.error_at(frame, "read error in script source");
                }
                return CH_END;
            }
            if c >= 0x80 {
                let frame = self.frame();
                self.diag
                    .warn_at(frame, format!("invalid byte 0x{:02x} skipped", c));
                continue;
            }
            match self.filters[c as usize] {
                Some(filter) => {
                    if let Some(out) = filter(self, c) {
                        return out;
                    }
                }
                None => return c,
            }
        }
    }

    /// Whitespace: collapse the run to a single space at the normal level,
    /// pass single spaces through otherwise.
    fn filter_space(sc: &mut Scanner, _c: u8) -> Option<u8> {
        if sc.ws == WsLevel::Normal {
            loop {
                let c = sc.raw();
                if c != b' ' && c != b'\t' {
                    sc.unraw();
                    break;
                }
            }
        }
        Some(b' ')
    }

    /// Line break: fold a CR/LF or LF/CR pair, count the line.
    fn filter_linebreak(sc: &mut Scanner, c: u8) -> Option<u8> {
        let pair = if c == b'\r' { b'\n' } else { b'\r' };
        let next = sc.raw();
        if next != pair {
            sc.unraw();
        }
        sc.line += 1;
        sc.col = 0;
        Some(b'\n')
    }

    /// `#` line comment: drop the rest of the line.
    fn filter_comment(sc: &mut Scanner, _c: u8) -> Option<u8> {
        sc.buf.skip_line();
        None
    }

    /// Disallowed byte: report and skip.
    fn filter_invalid(sc: &mut Scanner, c: u8) -> Option<u8> {
        let frame = sc.frame();
        sc.diag
            .warn_at(frame, format!("invalid character 0x{:02x} skipped", c));
        None
    }

    /// Read an identifier (`[A-Za-z_][A-Za-z0-9_]*`, kept to
    /// [`IDENT_MAX`] bytes) and intern it. Returns `None` without
    /// consuming anything if the next character cannot start one.
    pub fn get_identifier(&mut self) -> Option<SymId> {
        let c = self.getc();
        if !(c.is_ascii_alphabetic() || c == b'_') {
            self.ungetc();
            return None;
        }
        let mut s = String::new();
        s.push(c as char);
        let n = self
            .buf
            .get_identifier(&mut s, IDENT_MAX - 1, |b| b.is_ascii_alphanumeric() || b == b'_');
        self.col += n as u32;
        Some(self.symtab.intern(&s))
    }

    /// Roll an identifier of byte length `len` back into the buffer.
    ///
    /// Only valid directly after [`Self::get_identifier`], whose bytes are
    /// raw in the buffer (no filter output intervenes).
    pub fn unget_identifier(&mut self, len: usize) {
        debug_assert!(len >= 1);
        // The first character went through the undo ring; the rest are raw.
        self.buf.ungetn(len - 1);
        self.col -= (len - 1) as u32;
        self.ungetc();
    }

    /// Read a plain decimal number straight from the buffer.
    pub fn get_decimal(&mut self) -> (f64, usize) {
        let (v, len) = self.buf.get_decimal();
        self.col += len as u32;
        (v, len)
    }

    /// The interned name's length in bytes (for identifier rollback).
    pub fn sym_len(&self, id: SymId) -> usize {
        self.symtab.name(id).len()
    }
}
