//! Observer side of the replicated state.
//!
//! The store mirrors every cell the authority broadcasts plus the objects it
//! has spawned. Updates may arrive reordered or duplicated; each cell keeps
//! only the newest version, so the store converges to the authority's state
//! once the last write has been delivered.

use log::{debug, warn};
use shared::{
    CellId, CellUpdate, ClientId, LockState, ObjectId, ObjectInfo, ReplicatedCell,
    ReplicationError, RoundPhase, Session,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

type LockListener = Arc<Mutex<dyn FnMut(ObjectId, &LockState, &LockState) + Send>>;

pub struct ReplicaStore {
    phase: ReplicatedCell<RoundPhase>,
    time_remaining: ReplicatedCell<f32>,
    score: ReplicatedCell<u32>,
    best_score: ReplicatedCell<u32>,
    new_best: ReplicatedCell<bool>,

    locks: HashMap<ObjectId, ReplicatedCell<LockState>>,
    objects: HashMap<ObjectId, ObjectInfo>,
    controllers: HashMap<ObjectId, ClientId>,
    positions: HashMap<ObjectId, [f32; 3]>,
    /// Late lock updates for these must not resurrect the object.
    despawned: HashSet<ObjectId>,

    lock_listeners: Vec<LockListener>,
}

impl ReplicaStore {
    pub fn new() -> Self {
        Self {
            phase: ReplicatedCell::observer(CellId::Phase, RoundPhase::Idle),
            time_remaining: ReplicatedCell::observer(CellId::TimeRemaining, 0.0),
            score: ReplicatedCell::observer(CellId::Score, 0),
            best_score: ReplicatedCell::observer(CellId::BestScore, 0),
            new_best: ReplicatedCell::observer(CellId::NewBest, false),
            locks: HashMap::new(),
            objects: HashMap::new(),
            controllers: HashMap::new(),
            positions: HashMap::new(),
            despawned: HashSet::new(),
            lock_listeners: Vec::new(),
        }
    }

    /// Routes an update to its cell. Returns whether it was newer than the
    /// held value.
    pub fn apply(&mut self, update: &CellUpdate) -> Result<bool, ReplicationError> {
        let applied = match update.cell {
            CellId::Phase => self.phase.apply_update(update)?,
            CellId::TimeRemaining => self.time_remaining.apply_update(update)?,
            CellId::Score => self.score.apply_update(update)?,
            CellId::BestScore => self.best_score.apply_update(update)?,
            CellId::NewBest => self.new_best.apply_update(update)?,
            CellId::Lock(object_id) => {
                if self.despawned.contains(&object_id) {
                    debug!("Ignoring lock update for despawned object {}", object_id);
                    return Ok(false);
                }
                self.lock_cell(object_id).apply_update(update)?
            }
        };

        if !applied {
            debug!(
                "Discarded stale update for {:?} (version {})",
                update.cell, update.version
            );
        }
        Ok(applied)
    }

    /// Loads one piece of the state sent to a joining client. Malformed
    /// entries are skipped; returns how many cells changed.
    pub fn apply_snapshot(
        &mut self,
        cells: &[CellUpdate],
        objects: &[ObjectInfo],
        controllers: &[(ObjectId, ClientId)],
    ) -> usize {
        for info in objects {
            self.object_spawned(*info);
        }
        for (object_id, controller) in controllers {
            self.control_changed(*object_id, *controller);
        }

        cells
            .iter()
            .filter(|update| match self.apply(update) {
                Ok(applied) => applied,
                Err(e) => {
                    warn!("Skipping snapshot entry: {}", e);
                    false
                }
            })
            .count()
    }

    pub fn object_spawned(&mut self, info: ObjectInfo) {
        self.despawned.remove(&info.object_id);
        self.objects.insert(info.object_id, info);
        self.lock_cell(info.object_id);
    }

    /// Drops the object together with its lock cell.
    pub fn object_despawned(&mut self, object_id: ObjectId) {
        self.objects.remove(&object_id);
        self.locks.remove(&object_id);
        self.controllers.remove(&object_id);
        self.positions.remove(&object_id);
        self.despawned.insert(object_id);
    }

    pub fn control_changed(&mut self, object_id: ObjectId, controller: ClientId) {
        if self.despawned.contains(&object_id) {
            return;
        }
        self.controllers.insert(object_id, controller);
    }

    pub fn object_state(&mut self, object_id: ObjectId, position: [f32; 3]) {
        if self.objects.contains_key(&object_id) {
            self.positions.insert(object_id, position);
        }
    }

    /// Whether a grab of `object_id` is worth sending. A lock already held by
    /// someone else would only be denied.
    pub fn can_request_grab(&self, object_id: ObjectId, local: ClientId) -> bool {
        !self
            .lock_state(object_id)
            .map_or(false, |lock| lock.is_held_by_other(local))
    }

    pub fn session(&self) -> Session {
        Session {
            phase: *self.phase.read(),
            time_remaining: *self.time_remaining.read(),
            score: *self.score.read(),
            best_score: *self.best_score.read(),
            new_best_achieved: *self.new_best.read(),
        }
    }

    pub fn lock_state(&self, object_id: ObjectId) -> Option<LockState> {
        self.locks.get(&object_id).map(|cell| *cell.read())
    }

    pub fn controller_of(&self, object_id: ObjectId) -> Option<ClientId> {
        self.controllers.get(&object_id).copied()
    }

    pub fn position(&self, object_id: ObjectId) -> Option<[f32; 3]> {
        self.positions.get(&object_id).copied()
    }

    pub fn object(&self, object_id: ObjectId) -> Option<ObjectInfo> {
        self.objects.get(&object_id).copied()
    }

    pub fn objects(&self) -> Vec<ObjectInfo> {
        let mut objects: Vec<ObjectInfo> = self.objects.values().copied().collect();
        objects.sort_by_key(|info| info.object_id);
        objects
    }

    pub fn on_phase_change<F>(&mut self, callback: F)
    where
        F: FnMut(&RoundPhase, &RoundPhase) + Send + 'static,
    {
        self.phase.on_change(callback);
    }

    pub fn on_time_change<F>(&mut self, callback: F)
    where
        F: FnMut(&f32, &f32) + Send + 'static,
    {
        self.time_remaining.on_change(callback);
    }

    pub fn on_score_change<F>(&mut self, callback: F)
    where
        F: FnMut(&u32, &u32) + Send + 'static,
    {
        self.score.on_change(callback);
    }

    pub fn on_best_score_change<F>(&mut self, callback: F)
    where
        F: FnMut(&u32, &u32) + Send + 'static,
    {
        self.best_score.on_change(callback);
    }

    pub fn on_new_best_change<F>(&mut self, callback: F)
    where
        F: FnMut(&bool, &bool) + Send + 'static,
    {
        self.new_best.on_change(callback);
    }

    /// Subscribes to lock changes of every object, including ones spawned
    /// later.
    pub fn on_lock_change<F>(&mut self, callback: F)
    where
        F: FnMut(ObjectId, &LockState, &LockState) + Send + 'static,
    {
        let listener: LockListener = Arc::new(Mutex::new(callback));
        for (object_id, cell) in self.locks.iter_mut() {
            attach(cell, *object_id, Arc::clone(&listener));
        }
        self.lock_listeners.push(listener);
    }

    fn lock_cell(&mut self, object_id: ObjectId) -> &mut ReplicatedCell<LockState> {
        let listeners = &self.lock_listeners;
        self.locks.entry(object_id).or_insert_with(|| {
            let mut cell = ReplicatedCell::observer(CellId::Lock(object_id), LockState::Free);
            for listener in listeners {
                attach(&mut cell, object_id, Arc::clone(listener));
            }
            cell
        })
    }
}

impl Default for ReplicaStore {
    fn default() -> Self {
        Self::new()
    }
}

fn attach(cell: &mut ReplicatedCell<LockState>, object_id: ObjectId, listener: LockListener) {
    cell.on_change(move |old, new| {
        if let Ok(mut callback) = listener.lock() {
            (*callback)(object_id, old, new);
        }
    });
}
