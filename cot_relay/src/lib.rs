// cot_relay — TCP broadcast relay for Cursor-on-Target event traffic.
//
// The relay is a thin echo hub: it accepts TCP connections, reassembles
// each client's byte stream into whole `</event>`-terminated messages,
// and broadcasts every completed message verbatim to all connected
// participants, sender included. It never inspects payloads and keeps no
// state across restarts.
//
// Module overview:
// - `registry.rs`: Participant bookkeeping — add on accept, latch closed
//                  on failure, broadcast fan-out, deferred compaction.
//                  The core data structure that `server.rs` drives.
// - `server.rs`:   TCP listener, per-connection reader/writer threads,
//                  and the main event loop. Uses `std::net` with an
//                  `mpsc` channel funneling events into the
//                  single-threaded registry owner.
// - `client.rs`:   A small relay client (connect, send, poll), used by
//                  the integration tests and embeddable elsewhere.
// - `terminal.rs`: Unix raw-mode toggling and non-blocking keypress
//                  detection for the binary's 'Q'-to-quit loop.
//
// Dependencies: `cot_protocol` (terminator framing), `ctrlc` for signal
// shutdown, `libc` on Unix for the terminal bits.
//
// The relay can run as a standalone binary (`main.rs`) or be embedded in
// another process via the library API (`start_relay`).

pub mod client;
pub mod registry;
pub mod server;
pub mod terminal;

pub use server::start_relay;
