//! Script Byte Buffer
//!
//! A circular byte buffer feeding the scanner. The buffer holds two halves;
//! reading advances one byte at a time, and whenever the read position
//! reaches the refill point the underlying source (a file handle or an
//! in-memory string) fills the next half and the refill point advances by
//! half a buffer.
//!
//! On short read or I/O error a single status marker byte is written at the
//! position after the last byte read, and the source is replaced by a
//! terminal one that re-emits the marker forever. Legitimate input may
//! contain low byte values, so callers detect the end by comparing against
//! the marker byte *and* checking [`ScriptBuffer::status`].

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Total buffer size in bytes. A power of two, split into two halves.
pub const BUF_SIZE: usize = 8192;

/// Half the buffer; the refill unit. Ungets are safe up to `HALF_SIZE - 1`
/// bytes behind the last refill point.
pub const HALF_SIZE: usize = BUF_SIZE / 2;

const POS_MASK: usize = BUF_SIZE - 1;

/// Marker byte written after the last byte of input
pub const MARKER_END: u8 = 0x04;

/// Marker byte written when the source failed mid-read
pub const MARKER_ERROR: u8 = 0x07;

/// State of the underlying byte source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufStatus {
    /// Source still has (or may have) bytes
    Ok,
    /// Source ran out; reads return [`MARKER_END`]
    End,
    /// Source failed; reads return [`MARKER_ERROR`]
    Error,
}

enum Source {
    File(File),
    Bytes { data: Vec<u8>, offset: usize },
    Reader(Box<dyn Read>),
    /// Terminal source: re-emits the marker byte forever
    Done,
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::File(_) => write!(f, "Source::File"),
            Source::Bytes { data, offset } => {
                write!(f, "Source::Bytes({}/{})", offset, data.len())
            }
            Source::Reader(_) => write!(f, "Source::Reader"),
            Source::Done => write!(f, "Source::Done"),
        }
    }
}

/// Circular byte buffer with callback-style refilling
#[derive(Debug)]
pub struct ScriptBuffer {
    buf: Box<[u8; BUF_SIZE]>,
    /// Absolute read position; masked for indexing
    pos: usize,
    /// Absolute position at which the next refill triggers
    call_pos: usize,
    source: Source,
    status: BufStatus,
    marker: u8,
}

impl ScriptBuffer {
    fn with_source(source: Source) -> Self {
        Self {
            buf: Box::new([0u8; BUF_SIZE]),
            pos: 0,
            call_pos: 0,
            source,
            status: BufStatus::Ok,
            marker: MARKER_END,
        }
    }

    /// Open a script file for reading.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::with_source(Source::File(file)))
    }

    /// Read from an in-memory script.
    pub fn from_str(script: &str) -> Self {
        Self::with_source(Source::Bytes {
            data: script.as_bytes().to_vec(),
            offset: 0,
        })
    }

    /// Read from any byte stream (a pipe, a network socket, a decoder).
    pub fn from_reader(reader: impl Read + 'static) -> Self {
        Self::with_source(Source::Reader(Box::new(reader)))
    }

    /// Current source status
    pub fn status(&self) -> BufStatus {
        self.status
    }

    /// The marker byte a finished source emits
    pub fn marker(&self) -> u8 {
        self.marker
    }

    /// Whether the byte just read is the end/error marker rather than
    /// script content.
    ///
    /// Low bytes are legal input, so the value alone is not enough: the
    /// source must have finished, and the byte must have been read from the
    /// marker's position (always directly before the refill point).
    pub fn is_marker(&self, c: u8) -> bool {
        c == self.marker && self.status != BufStatus::Ok && self.pos == self.call_pos
    }

    /// Refill the half starting at `call_pos`, or emit the terminal marker.
    fn refill(&mut self) {
        let start = self.call_pos & POS_MASK;
        match &mut self.source {
            Source::File(file) => {
                let mut read = 0usize;
                let mut failed = false;
                while read < HALF_SIZE {
                    match file.read(&mut self.buf[start + read..start + HALF_SIZE]) {
                        Ok(0) => break,
                        Ok(n) => read += n,
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(_) => {
                            failed = true;
                            break;
                        }
                    }
                }
                if read < HALF_SIZE {
                    self.finish(read, failed);
                } else {
                    self.call_pos += HALF_SIZE;
                }
            }
            Source::Reader(reader) => {
                let mut read = 0usize;
                let mut failed = false;
                while read < HALF_SIZE {
                    match reader.read(&mut self.buf[start + read..start + HALF_SIZE]) {
                        Ok(0) => break,
                        Ok(n) => read += n,
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(_) => {
                            failed = true;
                            break;
                        }
                    }
                }
                if read < HALF_SIZE {
                    self.finish(read, failed);
                } else {
                    self.call_pos += HALF_SIZE;
                }
            }
            Source::Bytes { data, offset } => {
                let avail = data.len() - *offset;
                let n = avail.min(HALF_SIZE);
                self.buf[start..start + n].copy_from_slice(&data[*offset..*offset + n]);
                *offset += n;
                if n < HALF_SIZE {
                    self.finish(n, false);
                } else {
                    self.call_pos += HALF_SIZE;
                }
            }
            Source::Done => {
                // Keep re-emitting the marker one byte at a time.
                self.buf[start] = self.marker;
                self.call_pos += 1;
            }
        }
    }

    /// Place the status marker after the `read` bytes just delivered and
    /// switch to the terminal source.
    fn finish(&mut self, read: usize, failed: bool) {
        self.status = if failed {
            BufStatus::Error
        } else {
            BufStatus::End
        };
        self.marker = if failed { MARKER_ERROR } else { MARKER_END };
        let mark_at = (self.call_pos + read) & POS_MASK;
        self.buf[mark_at] = self.marker;
        self.call_pos += read + 1;
        self.source = Source::Done;
    }

    /// Read one byte, refilling as needed.
    #[inline]
    pub fn getc(&mut self) -> u8 {
        if self.pos == self.call_pos {
            self.refill();
        }
        let c = self.buf[self.pos & POS_MASK];
        self.pos += 1;
        c
    }

    /// Step one byte back.
    ///
    /// Safe for up to `HALF_SIZE - 1` bytes behind the last refill point;
    /// beyond that the bytes have been overwritten.
    #[inline]
    pub fn ungetc(&mut self) {
        debug_assert!(self.pos > 0, "ungetc before start of input");
        debug_assert!(
            self.call_pos - self.pos < HALF_SIZE,
            "ungetc past retained half"
        );
        self.pos -= 1;
    }

    /// Step `n` bytes back (same retention bound as [`Self::ungetc`]).
    pub fn ungetn(&mut self, n: usize) {
        debug_assert!(self.pos >= n, "ungetn before start of input");
        self.pos -= n;
    }

    /// Read one byte and keep it only if it equals `c`.
    #[inline]
    pub fn tryc(&mut self, c: u8) -> bool {
        if self.getc() == c {
            true
        } else {
            self.ungetc();
            false
        }
    }

    /// Skip bytes up to (not including) the next line break or marker.
    pub fn skip_line(&mut self) {
        loop {
            let c = self.getc();
            if c == b'\n' || c == b'\r' || self.is_marker(c) {
                self.ungetc();
                return;
            }
        }
    }

    /// Skip spaces and tabs.
    pub fn skip_space(&mut self) {
        loop {
            let c = self.getc();
            if c != b' ' && c != b'\t' {
                self.ungetc();
                return;
            }
        }
    }

    /// Parse a signed, optional-fraction decimal number directly from the
    /// buffer. Returns the value and the byte length consumed; a length of
    /// zero means no number was read (and the position is unchanged).
    pub fn get_decimal(&mut self) -> (f64, usize) {
        let mut len = 0usize;
        let mut value = 0.0f64;
        let mut negative = false;
        let mut any_digit = false;

        let c = self.getc();
        len += 1;
        let mut c = if c == b'-' || c == b'+' {
            negative = c == b'-';
            let next = self.getc();
            len += 1;
            next
        } else {
            c
        };

        while c.is_ascii_digit() {
            any_digit = true;
            value = value * 10.0 + f64::from(c - b'0');
            c = self.getc();
            len += 1;
        }
        if c == b'.' {
            let mut scale = 0.1f64;
            c = self.getc();
            len += 1;
            while c.is_ascii_digit() {
                any_digit = true;
                value += f64::from(c - b'0') * scale;
                scale *= 0.1;
                c = self.getc();
                len += 1;
            }
        }
        // One byte past the number is always in hand here.
        self.ungetc();
        len -= 1;

        if !any_digit {
            self.ungetn(len);
            return (f64::NAN, 0);
        }
        if negative {
            value = -value;
        }
        (value, len)
    }

    /// Read bytes passing `keep` into `out`, stopping at the first byte
    /// that fails the predicate. At most `max` bytes are kept; further
    /// passing bytes are consumed and dropped. Returns the kept length.
    pub fn get_identifier(
        &mut self,
        out: &mut String,
        max: usize,
        keep: impl Fn(u8) -> bool,
    ) -> usize {
        let start = out.len();
        loop {
            let c = self.getc();
            if self.is_marker(c) || !keep(c) {
                self.ungetc();
                break;
            }
            if out.len() - start < max {
                out.push(c as char);
            }
        }
        out.len() - start
    }
}
