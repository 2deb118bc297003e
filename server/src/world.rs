//! Authoritative world: the round controller plus the lock arbiter, kept in
//! step for every spawned object.

use crate::arbiter::OwnershipArbiter;
use crate::round::RoundController;
use log::debug;
use shared::{Category, ObjectId, ObjectInfo, Packet, ScorableItem, SNAPSHOT_CHUNK_OBJECTS};

/// Every spawned object is both a scorable item and a grabbable resource,
/// identified by one [`ObjectId`].
pub struct World {
    round: RoundController,
    arbiter: OwnershipArbiter,
    next_object_id: ObjectId,
}

impl World {
    pub fn new(round: RoundController) -> Self {
        Self {
            round,
            arbiter: OwnershipArbiter::new(),
            next_object_id: 1,
        }
    }

    pub fn round(&self) -> &RoundController {
        &self.round
    }

    pub fn round_mut(&mut self) -> &mut RoundController {
        &mut self.round
    }

    pub fn arbiter(&self) -> &OwnershipArbiter {
        &self.arbiter
    }

    pub fn arbiter_mut(&mut self) -> &mut OwnershipArbiter {
        &mut self.arbiter
    }

    /// Registers a new item and its free lock.
    pub fn spawn_item(&mut self, category: Category, value: u32) -> ObjectInfo {
        let id = self.next_object_id;
        self.next_object_id += 1;

        let item = ScorableItem::new(id, category, value);
        self.round.add_item(item);
        self.arbiter.register(id);
        debug!("Spawned object {} ({}, {} points)", id, category, value);

        item.info()
    }

    /// Removes an object's item and lock. Returns false if neither existed.
    pub fn despawn(&mut self, object_id: ObjectId) -> bool {
        let had_item = self.round.remove_item(object_id).is_some();
        let had_lock = self.arbiter.remove(object_id).is_some();
        had_item || had_lock
    }

    pub fn object_ids(&self) -> Vec<ObjectId> {
        self.round.item_ids()
    }

    pub fn objects(&self) -> Vec<ObjectInfo> {
        self.round.items().iter().map(|item| item.info()).collect()
    }

    /// Full replicated state for a late-joining observer.
    ///
    /// The first packet carries the round cells; each following one carries
    /// up to [`SNAPSHOT_CHUNK_OBJECTS`] objects with their lock and controller,
    /// so every piece fits in one datagram however many objects exist.
    pub fn snapshot(&self) -> Vec<Packet> {
        let mut packets = vec![Packet::Snapshot {
            cells: self.round.cell_updates(),
            objects: Vec::new(),
            controllers: Vec::new(),
        }];

        for chunk in self.objects().chunks(SNAPSHOT_CHUNK_OBJECTS) {
            let cells = chunk
                .iter()
                .filter_map(|info| self.arbiter.lock_update(info.object_id))
                .collect();
            let controllers = chunk
                .iter()
                .filter_map(|info| {
                    self.arbiter
                        .controller_of(info.object_id)
                        .map(|controller| (info.object_id, controller))
                })
                .collect();

            packets.push(Packet::Snapshot {
                cells,
                objects: chunk.to_vec(),
                controllers,
            });
        }

        packets
    }
}
