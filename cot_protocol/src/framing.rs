// Terminator-delimited message framing for CoT event streams.
//
// A CoT message is an opaque byte payload ending with the literal `</event>`
// closing tag. There is no length prefix, no escaping, and no compression:
// the framer accumulates raw socket reads and slices off everything up to
// and including each terminator occurrence. Payload bytes are never
// inspected beyond the terminator search.
//
// `FrameBuffer` is deliberately I/O-free. The caller (a reader loop, a
// client, a test) asks for a writable slot with `read_slot`, fills some
// prefix of it from whatever source it has, and then `commit`s the byte
// count. This keeps the reassembly algorithm testable without sockets.

/// Message terminator: the CoT XML closing tag, matched byte-for-byte.
pub const TERMINATOR: &[u8] = b"</event>";

/// Receive granularity. The buffer always keeps at least this much spare
/// room ahead of the valid region so a single `read()` can pull in a full
/// chunk without an intermediate copy.
pub const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Growable receive buffer plus terminator scanner for one connection.
///
/// Invariants between calls:
/// - `len <= data.len()` (valid bytes never exceed allocated capacity);
/// - `data[..len]` contains no complete terminator (extraction is greedy,
///   so anything left over is at most a partial message).
pub struct FrameBuffer {
    /// Allocated storage; bytes at `len..` are scratch space for reads.
    data: Vec<u8>,
    /// Count of valid buffered bytes.
    len: usize,
}

impl FrameBuffer {
    /// Create an empty buffer. No allocation happens until the first
    /// `read_slot` call.
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            len: 0,
        }
    }

    /// Number of buffered bytes still waiting for a terminator.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Ensure spare capacity and return the writable tail of the buffer.
    ///
    /// The caller fills some prefix of the returned slice (e.g. via
    /// `TcpStream::read`) and then calls `commit` with the byte count.
    /// Growth doubles the allocation (starting at `READ_CHUNK_SIZE`) and
    /// never disturbs already-buffered bytes. Allocation failure aborts
    /// the process, which is the intended fate for a relay that can no
    /// longer frame a stream without corrupting message boundaries.
    pub fn read_slot(&mut self) -> &mut [u8] {
        if self.data.is_empty() {
            self.data.resize(READ_CHUNK_SIZE, 0);
        } else if self.len + READ_CHUNK_SIZE > self.data.len() {
            let doubled = self.data.len() * 2;
            self.data.resize(doubled, 0);
        }
        &mut self.data[self.len..]
    }

    /// Mark `n` more bytes as valid and extract every complete message.
    ///
    /// `n` must not exceed the slot most recently returned by `read_slot`.
    /// Each returned frame is the full message including its terminator;
    /// a single commit can yield zero, one, or many frames. Whatever
    /// trails the last terminator stays buffered for the next commit.
    pub fn commit(&mut self, n: usize) -> Vec<Vec<u8>> {
        assert!(
            self.len + n <= self.data.len(),
            "commit of {n} bytes overruns buffer capacity"
        );
        let appended_at = self.len;
        self.len += n;

        let mut frames = Vec::new();
        // Resume the search just short of the appended region: a terminator
        // split across two reads straddles the old length by at most
        // TERMINATOR.len() - 1 bytes, and everything before that is already
        // known terminator-free.
        let mut scan_from = appended_at.saturating_sub(TERMINATOR.len() - 1);
        while let Some(found) = find_terminator(&self.data[scan_from..self.len]) {
            let end = scan_from + found + TERMINATOR.len();
            frames.push(self.data[..end].to_vec());
            // Left-compact the remainder down to offset 0.
            self.data.copy_within(end..self.len, 0);
            self.len -= end;
            scan_from = 0;
        }
        frames
    }

    /// Copy `bytes` into the buffer and extract complete messages.
    ///
    /// Convenience for callers that already hold the bytes rather than
    /// reading directly into the slot. Splits across multiple slots when
    /// `bytes` is larger than the current spare capacity, exercising the
    /// same growth path as socket reads.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        let mut rest = bytes;
        while !rest.is_empty() {
            let slot = self.read_slot();
            let take = rest.len().min(slot.len());
            slot[..take].copy_from_slice(&rest[..take]);
            frames.extend(self.commit(take));
            rest = &rest[take..];
        }
        frames
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounded substring search for the terminator. Returns the offset of the
/// first match start within `haystack`, if any.
fn find_terminator(haystack: &[u8]) -> Option<usize> {
    if haystack.len() < TERMINATOR.len() {
        return None;
    }
    haystack
        .windows(TERMINATOR.len())
        .position(|window| window == TERMINATOR)
}
