// Participant registry for the relay server.
//
// `Registry` is the central data structure that `server.rs` drives. It owns
// one `Participant` per live connection and implements the broadcast
// fan-out. All mutation happens through methods called from the server's
// single-threaded main loop — no internal locking.
//
// Removal is two-phase by design: broadcast and disconnect handling only
// latch a participant's `closed` flag, and `compact` later drops the
// entries. Nothing is ever removed while a pass over the live set is in
// progress.
//
// Writing to clients: each `Participant` holds the sending half of a
// bounded channel feeding that connection's writer thread (spawned by
// `server.rs`). `broadcast` uses `try_send`, so a participant whose writer
// has stalled long enough to fill its outbox is treated as unwritable and
// latched closed — it can never hold up delivery to anyone else.

use std::collections::BTreeMap;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::mpsc::SyncSender;

/// Registry-assigned participant ID. Monotonically increasing, so BTreeMap
/// iteration order equals insertion order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticipantId(pub u32);

/// One accepted, still-open client connection.
pub struct Participant {
    /// Peer address, used as connection identity for duplicate rejection.
    peer: SocketAddr,
    /// Handle kept only so compaction can force the socket closed; all
    /// actual I/O happens on the connection's reader and writer threads.
    stream: TcpStream,
    /// Bounded queue into the writer thread.
    outbox: SyncSender<Arc<[u8]>>,
    /// Latched once the connection is known dead (read error, orderly
    /// close, or write failure). Never reset.
    closed: bool,
}

/// The set of live participants, keyed by assigned ID.
pub struct Registry {
    participants: BTreeMap<ParticipantId, Participant>,
    next_id: u32,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            participants: BTreeMap::new(),
            next_id: 0,
        }
    }

    /// Add a newly accepted connection. Returns the assigned ID, or `None`
    /// without side effects if a live entry already exists for the same
    /// peer address — duplicates are silently ignored, never an error.
    pub fn add(
        &mut self,
        stream: TcpStream,
        peer: SocketAddr,
        outbox: SyncSender<Arc<[u8]>>,
    ) -> Option<ParticipantId> {
        if self
            .participants
            .values()
            .any(|p| !p.closed && p.peer == peer)
        {
            return None;
        }

        let id = ParticipantId(self.next_id);
        self.next_id += 1;
        self.participants.insert(
            id,
            Participant {
                peer,
                stream,
                outbox,
                closed: false,
            },
        );
        Some(id)
    }

    /// Queue one completed message to every live participant, including
    /// the originator. A full or disconnected outbox latches that
    /// participant closed; delivery to the others continues regardless.
    /// Participants already marked closed are never targeted.
    pub fn broadcast(&mut self, frame: &Arc<[u8]>) {
        for participant in self.participants.values_mut() {
            if participant.closed {
                continue;
            }
            if participant.outbox.try_send(Arc::clone(frame)).is_err() {
                participant.closed = true;
            }
        }
    }

    /// Latch a participant closed. No-op for unknown IDs (the participant
    /// may already have been compacted away).
    pub fn mark_closed(&mut self, id: ParticipantId) {
        if let Some(participant) = self.participants.get_mut(&id) {
            participant.closed = true;
        }
    }

    /// Remove every participant marked closed — or, with `force_all`,
    /// every participant unconditionally. The socket is shut down
    /// best-effort and dropping the entry closes the outbox, which ends
    /// the writer thread. Safe to call on an empty registry.
    pub fn compact(&mut self, force_all: bool) {
        self.participants.retain(|_, participant| {
            if participant.closed || force_all {
                let _ = participant.stream.shutdown(Shutdown::Both);
                false
            } else {
                true
            }
        });
    }

    /// Number of live (not yet compacted) participants.
    pub fn count(&self) -> usize {
        self.participants.len()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
