//! Host-facing chunk fetch boundary.
//!
//! The map core performs no I/O. When the chunk window moves, the streamer
//! queues a [`FetchRequest`] here; the embedding host drains the queue, runs
//! the remote call, and reports the outcome back through
//! `MapWorld::deliver_fetched`. Cancellations travel the same way so the host
//! can abort the underlying call instead of wasting bandwidth.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::coords::{ChunkKey, HexCoord};
use crate::tiles::Biome;

/// Monotonic fetch request identifier. Delivery for an id the streamer no
/// longer tracks is dropped as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FetchId(pub u64);

/// One explored tile as returned by the feed's pull API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileEntity {
    pub hex: HexCoord,
    pub biome: Biome,
}

/// Outbound request covering every hex of one chunk window, keyed by the
/// window's center chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub id: FetchId,
    pub chunk: ChunkKey,
    pub hexes: Vec<HexCoord>,
}

/// Why a fetch produced no tiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchError {
    /// Transient transport failure. The chunk key is released so the next
    /// visibility pass retries it.
    Failed(String),
    /// The request was superseded by a newer chunk window. Expected outcome,
    /// not an error condition.
    Cancelled,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Failed(reason) => write!(f, "chunk fetch failed: {reason}"),
            FetchError::Cancelled => write!(f, "chunk fetch cancelled"),
        }
    }
}

impl std::error::Error for FetchError {}

/// Chunk keys with a fetch already issued.
///
/// A key is marked before its fetch resolves so that a concurrent request
/// for the same key short-circuits, and released again on failure or
/// cancellation so the chunk stays retryable.
#[derive(Debug, Default)]
pub struct FetchedChunkSet {
    keys: HashSet<ChunkKey>,
}

impl FetchedChunkSet {
    /// Mark `chunk` as fetched. Returns false when it already was.
    pub fn mark(&mut self, chunk: ChunkKey) -> bool {
        self.keys.insert(chunk)
    }

    /// Forget `chunk` so a later pass can fetch it again.
    pub fn release(&mut self, chunk: ChunkKey) -> bool {
        self.keys.remove(&chunk)
    }

    pub fn contains(&self, chunk: ChunkKey) -> bool {
        self.keys.contains(&chunk)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }
}

/// Request and cancellation queues crossing the host boundary, drained once
/// per frame.
#[derive(Debug, Default)]
pub struct FetchOutbox {
    next_id: u64,
    requests: Vec<FetchRequest>,
    cancellations: Vec<FetchId>,
}

impl FetchOutbox {
    pub fn issue(&mut self, chunk: ChunkKey, hexes: Vec<HexCoord>) -> FetchId {
        let id = FetchId(self.next_id);
        self.next_id += 1;
        self.requests.push(FetchRequest { id, chunk, hexes });
        id
    }

    pub fn cancel(&mut self, id: FetchId) {
        self.cancellations.push(id);
    }

    pub fn drain_requests(&mut self) -> Vec<FetchRequest> {
        std::mem::take(&mut self.requests)
    }

    pub fn drain_cancellations(&mut self) -> Vec<FetchId> {
        std::mem::take(&mut self.cancellations)
    }

    pub fn pending_requests(&self) -> usize {
        self.requests.len()
    }
}
