// TCP server and main event loop for the relay.
//
// Architecture: one thread per connection direction with a central `mpsc`
// channel.
//
// - **Listener thread** (`TcpListener::accept()` loop): accepts new TCP
//   connections and sends `InternalEvent::NewConnection` to the main
//   thread. Accept failures are skipped, never fatal.
// - **Reader threads** (one per client): run the drain cycle — read into
//   the connection's `FrameBuffer`, commit, and send one
//   `InternalEvent::MessageFrom` per completed frame. On EOF or error,
//   send `InternalEvent::Disconnected`. A short read timeout lets the
//   thread re-check the shutdown flag without busy-polling.
// - **Writer threads** (one per client): drain a bounded outbox with
//   blocking `write_all`, so a slow receiver stalls only its own thread.
//   Once its outbox fills, `Registry::broadcast` latches it closed.
// - **Main thread**: sole owner of the `Registry`. Receives events with
//   `recv_timeout` (bounded at `poll_interval` so the quit check is never
//   starved), dispatches them, and runs a compaction pass after every
//   iteration. On shutdown it force-compacts, closing every connection.
//
// The main thread never touches a socket directly, so registry mutation
// and broadcast iteration are trivially serialized: no participant is
// removed while a pass over the live set is in progress, and a
// participant added after a frame completes does not see that frame.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, sync_channel};
use std::thread;
use std::time::Duration;

use cot_protocol::framing::FrameBuffer;

use crate::registry::{ParticipantId, Registry};

/// Events sent from listener/reader/writer threads to the main thread.
enum InternalEvent {
    NewConnection {
        stream: TcpStream,
        peer: SocketAddr,
    },
    MessageFrom {
        frame: Arc<[u8]>,
    },
    Disconnected {
        id: ParticipantId,
    },
}

/// Shared stop flag handed to signal handlers and keypress loops.
/// Requesting a stop is observed by the main loop within one
/// `poll_interval` and results in an orderly close of every connection.
#[derive(Clone)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn request_stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Handle returned by `start_relay` to observe and control the server.
pub struct RelayHandle {
    signal: StopSignal,
    participants: Arc<AtomicUsize>,
    thread: Option<thread::JoinHandle<()>>,
}

impl RelayHandle {
    /// A cloneable stop flag, e.g. for a Ctrl+C handler.
    pub fn stop_signal(&self) -> StopSignal {
        self.signal.clone()
    }

    /// True until a stop has been requested.
    pub fn is_running(&self) -> bool {
        self.signal.is_running()
    }

    /// Current number of connected participants, as of the main loop's
    /// last compaction pass. Informational only.
    pub fn participant_count(&self) -> usize {
        self.participants.load(Ordering::SeqCst)
    }

    /// Signal the relay to stop and wait for it to shut down.
    pub fn stop(mut self) {
        self.signal.request_stop();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// Configuration for starting a relay server.
pub struct RelayConfig {
    /// Address to bind; the original relay listens on all interfaces.
    pub host: String,
    /// Listen port; 0 lets the OS pick (useful in tests).
    pub port: u16,
    /// Depth of each participant's outbox. A participant that falls this
    /// many messages behind is treated as unwritable and dropped.
    pub outbox_depth: usize,
    /// Upper bound on how long the main loop waits for events before
    /// running its housekeeping pass (compaction, quit check).
    pub poll_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8087,
            outbox_depth: 64,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Start the relay server on a background thread. Returns a handle for
/// stopping it and the actual bound address (useful when port 0 is used
/// to let the OS pick a free port).
pub fn start_relay(config: RelayConfig) -> std::io::Result<(RelayHandle, SocketAddr)> {
    let listener = TcpListener::bind(format!("{}:{}", config.host, config.port))?;
    let addr = listener.local_addr()?;
    let signal = StopSignal(Arc::new(AtomicBool::new(true)));
    let participants = Arc::new(AtomicUsize::new(0));

    let signal_loop = signal.clone();
    let participants_loop = participants.clone();
    let thread = thread::spawn(move || {
        run_relay(listener, config, signal_loop, participants_loop);
    });

    Ok((
        RelayHandle {
            signal,
            participants,
            thread: Some(thread),
        },
        addr,
    ))
}

/// Main relay loop. Runs until a stop is requested, then force-compacts
/// so every connection is closed before returning.
fn run_relay(
    listener: TcpListener,
    config: RelayConfig,
    signal: StopSignal,
    participants: Arc<AtomicUsize>,
) {
    let mut registry = Registry::new();

    let (tx, rx): (Sender<InternalEvent>, Receiver<InternalEvent>) = mpsc::channel();

    // Set the listener to non-blocking so the accept thread can check the
    // stop flag periodically.
    listener.set_nonblocking(true).ok();

    // Listener thread: accepts new connections.
    let signal_listener = signal.clone();
    let tx_listener = tx.clone();
    thread::spawn(move || {
        while signal_listener.is_running() {
            match listener.accept() {
                Ok((stream, peer)) => {
                    stream.set_nonblocking(false).ok();
                    let _ = tx_listener.send(InternalEvent::NewConnection { stream, peer });
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(50));
                }
                Err(_) => {
                    // Transient accept failure: no participant is created
                    // and the loop carries on.
                    thread::sleep(Duration::from_millis(50));
                }
            }
        }
    });

    // Main event loop.
    while signal.is_running() {
        match rx.recv_timeout(config.poll_interval) {
            Ok(event) => {
                handle_event(&mut registry, event, &config, &tx, &signal);
                // Drain any additional events that arrived during handling.
                while let Ok(event) = rx.try_recv() {
                    handle_event(&mut registry, event, &config, &tx, &signal);
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        // Housekeeping: release everything latched closed this iteration.
        registry.compact(false);
        participants.store(registry.count(), Ordering::SeqCst);
    }

    // Shutdown: every connection is closed regardless of state.
    registry.compact(true);
    participants.store(0, Ordering::SeqCst);
}

/// Dispatch a single event against the registry.
fn handle_event(
    registry: &mut Registry,
    event: InternalEvent,
    config: &RelayConfig,
    tx: &Sender<InternalEvent>,
    signal: &StopSignal,
) {
    match event {
        InternalEvent::NewConnection { stream, peer } => {
            handle_new_connection(registry, stream, peer, config, tx, signal);
        }
        InternalEvent::MessageFrom { frame } => {
            registry.broadcast(&frame);
        }
        InternalEvent::Disconnected { id } => {
            registry.mark_closed(id);
        }
    }
}

/// Register an accepted connection and spawn its reader and writer
/// threads. Any failure here simply drops the connection — the would-be
/// participant never enters the registry.
fn handle_new_connection(
    registry: &mut Registry,
    stream: TcpStream,
    peer: SocketAddr,
    config: &RelayConfig,
    tx: &Sender<InternalEvent>,
    signal: &StopSignal,
) {
    let read_stream = match stream.try_clone() {
        Ok(s) => s,
        Err(_) => return,
    };
    let write_stream = match stream.try_clone() {
        Ok(s) => s,
        Err(_) => return,
    };

    let (outbox_tx, outbox_rx) = sync_channel::<Arc<[u8]>>(config.outbox_depth);
    let Some(id) = registry.add(stream, peer, outbox_tx) else {
        // Already known — silently ignored.
        return;
    };

    let tx_reader = tx.clone();
    let signal_reader = signal.clone();
    thread::spawn(move || {
        reader_loop(id, read_stream, tx_reader, signal_reader);
    });

    let tx_writer = tx.clone();
    thread::spawn(move || {
        writer_loop(id, write_stream, outbox_rx, tx_writer);
    });
}

/// Drain cycle for one connection, running on its own thread.
///
/// Reads land directly in the `FrameBuffer`'s spare capacity; each commit
/// extracts every message completed by that read. A timed-out read is not
/// an error — it just gives the thread a chance to notice shutdown. EOF
/// and real errors report a disconnect and end the thread; the partially
/// buffered message, if any, is discarded with the buffer.
fn reader_loop(
    id: ParticipantId,
    mut stream: TcpStream,
    tx: Sender<InternalEvent>,
    signal: StopSignal,
) {
    stream
        .set_read_timeout(Some(Duration::from_millis(200)))
        .ok();

    let mut buffer = FrameBuffer::new();
    while signal.is_running() {
        let slot = buffer.read_slot();
        match stream.read(slot) {
            Ok(0) => {
                // Orderly remote close.
                let _ = tx.send(InternalEvent::Disconnected { id });
                return;
            }
            Ok(n) => {
                for frame in buffer.commit(n) {
                    let event = InternalEvent::MessageFrom {
                        frame: Arc::from(frame),
                    };
                    if tx.send(event).is_err() {
                        return; // Main thread is gone.
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                // No data within the timeout; loop to re-check the flag.
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(_) => {
                let _ = tx.send(InternalEvent::Disconnected { id });
                return;
            }
        }
    }
}

/// Writer loop for one connection. Exits when the registry drops the
/// outbox sender (compaction) or the socket rejects a write.
fn writer_loop(
    id: ParticipantId,
    mut stream: TcpStream,
    outbox: Receiver<Arc<[u8]>>,
    tx: Sender<InternalEvent>,
) {
    while let Ok(frame) = outbox.recv() {
        if stream.write_all(&frame).is_err() {
            let _ = tx.send(InternalEvent::Disconnected { id });
            return;
        }
    }
}
