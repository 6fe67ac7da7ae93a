// TCP client for connecting to the relay.
//
// Provides a non-blocking interface for a caller to exchange CoT events
// with the relay server. Architecture:
// - `connect()` performs the TCP connect on the calling thread, then
//   spawns a background reader thread.
// - The reader thread drains the socket through a `FrameBuffer` and
//   pushes each completed event into an `mpsc` channel.
// - The calling thread keeps the stream for sending.
// - `poll()` drains the inbox non-blocking; `recv_timeout()` waits for
//   one event with a deadline (handy in tests).
//
// This separation means the caller never blocks on network reads; writes
// flush synchronously, which is acceptable for the event sizes involved.
// There is no handshake — the relay starts broadcasting to a connection
// as soon as it is accepted.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cot_protocol::framing::{FrameBuffer, TERMINATOR};

/// TCP client for relay communication. Each received `Vec<u8>` is one
/// complete event, terminator included, exactly as broadcast.
pub struct RelayClient {
    stream: TcpStream,
    inbox: Receiver<Vec<u8>>,
    _reader_thread: Option<JoinHandle<()>>,
}

impl RelayClient {
    /// Connect to a relay server and spawn the reader thread.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        let reader_stream = stream.try_clone()?;

        let (tx, rx) = mpsc::channel();
        let reader_thread = thread::spawn(move || {
            reader_loop(reader_stream, &tx);
        });

        Ok(Self {
            stream,
            inbox: rx,
            _reader_thread: Some(reader_thread),
        })
    }

    /// Send one event: the body bytes followed by the terminator.
    pub fn send_event(&mut self, body: &[u8]) -> io::Result<()> {
        self.stream.write_all(body)?;
        self.stream.write_all(TERMINATOR)?;
        Ok(())
    }

    /// Send raw bytes exactly as given, without appending a terminator.
    /// Lets callers split an event across deliberate chunk boundaries.
    pub fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes)
    }

    /// Drain all queued received events (non-blocking).
    pub fn poll(&self) -> Vec<Vec<u8>> {
        let mut events = Vec::new();
        while let Ok(event) = self.inbox.try_recv() {
            events.push(event);
        }
        events
    }

    /// Wait up to `timeout` for the next event. `None` on timeout or
    /// when the connection has gone away.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Vec<u8>> {
        match self.inbox.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }
}

/// Reader thread: drain the socket through a frame buffer, pushing each
/// completed event to the channel. Ends on EOF, error, or a dropped
/// receiver.
fn reader_loop(mut stream: TcpStream, tx: &mpsc::Sender<Vec<u8>>) {
    let mut buffer = FrameBuffer::new();
    loop {
        let slot = buffer.read_slot();
        match stream.read(slot) {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                for frame in buffer.commit(n) {
                    if tx.send(frame).is_err() {
                        return; // Owner dropped the client.
                    }
                }
            }
        }
    }
}
