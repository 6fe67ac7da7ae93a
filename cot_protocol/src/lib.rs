// cot_protocol — wire framing for Cursor-on-Target event streams.
//
// This crate defines the byte-level framing shared by the relay server
// (`cot_relay`) and any client speaking to it over TCP. CoT traffic is a
// raw byte stream in which each message runs up to and including the
// literal `</event>` closing tag; there is no length prefix and the relay
// never parses the XML in between.
//
// Module overview:
// - `framing.rs`: the `TERMINATOR` constant, the receive chunk size, and
//                 `FrameBuffer` — the growable per-connection buffer that
//                 turns arbitrary-sized reads into whole messages.
//
// Design decisions:
// - **Payloads are opaque `Vec<u8>`.** The relay echoes bytes verbatim, so
//   this crate stays free of any XML or serialization dependency.
// - **No async runtime.** `FrameBuffer` is pure and I/O-free; callers feed
//   it from blocking reads, compatible with plain `std::net` streams.

pub mod framing;

pub use framing::{FrameBuffer, READ_CHUNK_SIZE, TERMINATOR};
