use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod cell;
pub mod error;

pub use cell::{CellData, CellId, CellUpdate, CellValue, ReplicatedCell, Role};
pub use error::{ParseCategoryError, ReplicationError};

pub const PROTOCOL_VERSION: u32 = 1;
pub const DEFAULT_ROUND_SECONDS: f32 = 120.0;

/// Receive buffer size on both ends; every datagram must fit.
pub const MAX_PACKET_SIZE: usize = 2048;
/// Objects per snapshot datagram. A late joiner gets the world in pieces.
pub const SNAPSHOT_CHUNK_OBJECTS: usize = 16;

/// Client id reserved for the authority itself. Transport-assigned ids start at 1.
pub const SERVER_CLIENT_ID: ClientId = 0;

pub type ClientId = u32;
pub type ObjectId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Plastics,
    Paper,
    Glass,
    Organic,
    Residual,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Plastics,
        Category::Paper,
        Category::Glass,
        Category::Organic,
        Category::Residual,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Category::Plastics => "plastics",
            Category::Paper => "paper",
            Category::Glass => "glass",
            Category::Organic => "organic",
            Category::Residual => "residual",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Category {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Category::ALL
            .iter()
            .copied()
            .find(|category| category.name() == lowered)
            .ok_or_else(|| ParseCategoryError(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RoundPhase {
    #[default]
    Idle,
    Running,
    Ended,
}

/// Replicated state of one exclusive grab lock.
///
/// A held lock always names its holder, so `held ⇒ holder` cannot be violated
/// on the wire or in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LockState {
    #[default]
    Free,
    Held(ClientId),
}

impl LockState {
    pub fn is_held(&self) -> bool {
        matches!(self, LockState::Held(_))
    }

    pub fn holder(&self) -> Option<ClientId> {
        match self {
            LockState::Held(holder) => Some(*holder),
            LockState::Free => None,
        }
    }

    /// True when someone other than `local` currently holds the lock.
    pub fn is_held_by_other(&self, local: ClientId) -> bool {
        matches!(self, LockState::Held(holder) if *holder != local)
    }
}

/// Read-only view of the round state owned by the authority.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub phase: RoundPhase,
    pub time_remaining: f32,
    pub score: u32,
    pub best_score: u32,
    pub new_best_achieved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScorableItem {
    pub id: ObjectId,
    pub category: Category,
    pub value: u32,
    pub consumed: bool,
}

impl ScorableItem {
    pub fn new(id: ObjectId, category: Category, value: u32) -> Self {
        Self {
            id,
            category,
            value,
            consumed: false,
        }
    }

    pub fn info(&self) -> ObjectInfo {
        ObjectInfo {
            object_id: self.id,
            category: self.category,
            value: self.value,
        }
    }
}

/// What observers learn about a spawned object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub object_id: ObjectId,
    pub category: Category,
    pub value: u32,
}

/// Mutations an observer may ask the authority for. The requester is never
/// part of the payload; the authority derives it from the transport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Request {
    StartRound,
    Score {
        item_id: ObjectId,
        category: Category,
    },
    Grab {
        resource_id: ObjectId,
    },
    Release {
        resource_id: ObjectId,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Request(Request),
    ObjectState {
        object_id: ObjectId,
        position: [f32; 3],
    },
    Heartbeat,
    Disconnect,

    Connected {
        client_id: ClientId,
    },
    /// One piece of the state sent to a joining client.
    Snapshot {
        cells: Vec<CellUpdate>,
        objects: Vec<ObjectInfo>,
        controllers: Vec<(ObjectId, ClientId)>,
    },
    CellUpdate(CellUpdate),
    GrabDenied {
        resource_id: ObjectId,
        holder: ClientId,
    },
    ControlChanged {
        resource_id: ObjectId,
        controller: ClientId,
    },
    ObjectSpawned(ObjectInfo),
    ObjectDespawned {
        object_id: ObjectId,
    },
    Disconnected {
        reason: String,
    },
}
