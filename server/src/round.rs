//! Session-level round state machine.
//!
//! `Idle → Running → Ended → Running → ...`. The controller owns the
//! replicated round cells, the item registry and the idempotency guard, so
//! every score decision and every timer step happens in one place on the
//! authority. Cell writes are buffered as [`CellUpdate`]s until the caller
//! drains and broadcasts them.

use crate::error::RequestError;
use crate::guard::IdempotencyGuard;
use crate::persistence::BestScoreStore;
use crate::registry::ItemRegistry;
use log::{error, info, warn};
use shared::{
    CellData, CellId, CellUpdate, Category, ObjectId, ReplicatedCell, RoundPhase, ScorableItem,
    Session,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreOutcome {
    /// Item consumed in the matching receptacle.
    Scored { points: u32 },
    /// Item consumed in the wrong receptacle; it still leaves the world.
    Mismatched,
    /// Item was already consumed this round. Callers treat this like success.
    Replayed,
}

impl ScoreOutcome {
    /// True when this call consumed the item, so it must be despawned.
    pub fn consumed(&self) -> bool {
        matches!(self, ScoreOutcome::Scored { .. } | ScoreOutcome::Mismatched)
    }
}

pub struct RoundController {
    round_seconds: f32,
    phase: ReplicatedCell<RoundPhase>,
    time_remaining: ReplicatedCell<f32>,
    score: ReplicatedCell<u32>,
    best_score: ReplicatedCell<u32>,
    new_best: ReplicatedCell<bool>,
    guard: IdempotencyGuard<ObjectId>,
    items: ItemRegistry,
    store: Box<dyn BestScoreStore>,
    updates: Vec<CellUpdate>,
}

impl RoundController {
    /// Creates an idle controller and publishes the persisted best score.
    pub fn new(round_seconds: f32, store: Box<dyn BestScoreStore>) -> Self {
        let best = match store.load() {
            Ok(best) => best,
            Err(e) => {
                warn!("Could not load best score, starting from 0: {}", e);
                0
            }
        };

        let mut controller = Self {
            round_seconds: round_seconds.max(0.0),
            phase: ReplicatedCell::authority(CellId::Phase, RoundPhase::Idle),
            time_remaining: ReplicatedCell::authority(CellId::TimeRemaining, 0.0),
            score: ReplicatedCell::authority(CellId::Score, 0),
            best_score: ReplicatedCell::authority(CellId::BestScore, 0),
            new_best: ReplicatedCell::authority(CellId::NewBest, false),
            guard: IdempotencyGuard::new(),
            items: ItemRegistry::new(),
            store,
            updates: Vec::new(),
        };

        set(&mut controller.best_score, best, &mut controller.updates);
        info!("Best score loaded: {}", best);
        controller
    }

    /// Starts a fresh round from any phase, including mid-round.
    pub fn start(&mut self) {
        let epoch = self.guard.new_epoch();

        set(&mut self.score, 0, &mut self.updates);
        set(&mut self.time_remaining, self.round_seconds, &mut self.updates);
        set(&mut self.new_best, false, &mut self.updates);
        set(&mut self.phase, RoundPhase::Running, &mut self.updates);

        info!("Round {} started ({:.0}s)", epoch, self.round_seconds);
    }

    /// Advances the timer by `dt` seconds while running.
    pub fn tick(&mut self, dt: f32) {
        if *self.phase.read() != RoundPhase::Running {
            return;
        }
        if !dt.is_finite() || dt < 0.0 {
            warn!("Ignoring invalid tick delta {}", dt);
            return;
        }

        let remaining = *self.time_remaining.read() - dt;
        if remaining <= 0.0 {
            set(&mut self.time_remaining, 0.0, &mut self.updates);
            self.end();
        } else {
            set(&mut self.time_remaining, remaining, &mut self.updates);
        }
    }

    fn end(&mut self) {
        set(&mut self.phase, RoundPhase::Ended, &mut self.updates);

        let score = *self.score.read();
        let previous_best = *self.best_score.read();

        if score > previous_best {
            set(&mut self.best_score, score, &mut self.updates);
            set(&mut self.new_best, true, &mut self.updates);
            if let Err(e) = self.store.save(score) {
                error!("Failed to persist best score {}: {}", score, e);
            }
            info!(
                "Round ended with {} points, new best (was {})",
                score, previous_best
            );
        } else {
            set(&mut self.new_best, false, &mut self.updates);
            info!("Round ended with {} points (best {})", score, previous_best);
        }
    }

    /// Consumes `item_id` at most once per round, scoring only on a category match.
    pub fn request_score(
        &mut self,
        item_id: ObjectId,
        receptacle: Category,
    ) -> Result<ScoreOutcome, RequestError> {
        if *self.phase.read() != RoundPhase::Running {
            return Err(RequestError::RoundNotRunning);
        }
        if self.guard.is_committed(&item_id) {
            return Ok(ScoreOutcome::Replayed);
        }

        let item = self
            .items
            .get(item_id)
            .ok_or(RequestError::UnknownObject(item_id))?;
        if item.consumed || !self.guard.try_commit(item_id) {
            return Ok(ScoreOutcome::Replayed);
        }

        let Some(item) = self.items.consume(item_id) else {
            return Ok(ScoreOutcome::Replayed);
        };
        self.items.remove(item_id);

        if item.category != receptacle {
            info!(
                "Item {} ({}) dropped in {} receptacle, no points",
                item_id, item.category, receptacle
            );
            return Ok(ScoreOutcome::Mismatched);
        }

        let score = self.score.read().saturating_add(item.value);
        set(&mut self.score, score, &mut self.updates);
        info!("Item {} scored {} points (total {})", item_id, item.value, score);
        Ok(ScoreOutcome::Scored { points: item.value })
    }

    pub fn add_item(&mut self, item: ScorableItem) -> bool {
        self.items.insert(item)
    }

    pub fn remove_item(&mut self, item_id: ObjectId) -> Option<ScorableItem> {
        self.items.remove(item_id)
    }

    pub fn item(&self, item_id: ObjectId) -> Option<&ScorableItem> {
        self.items.get(item_id)
    }

    pub fn items(&self) -> Vec<ScorableItem> {
        self.items.items()
    }

    pub fn item_ids(&self) -> Vec<ObjectId> {
        self.items.ids()
    }

    pub fn phase(&self) -> RoundPhase {
        *self.phase.read()
    }

    pub fn time_remaining(&self) -> f32 {
        *self.time_remaining.read()
    }

    pub fn score(&self) -> u32 {
        *self.score.read()
    }

    pub fn best_score(&self) -> u32 {
        *self.best_score.read()
    }

    pub fn new_best_achieved(&self) -> bool {
        *self.new_best.read()
    }

    pub fn epoch(&self) -> u64 {
        self.guard.epoch()
    }

    pub fn session(&self) -> Session {
        Session {
            phase: self.phase(),
            time_remaining: self.time_remaining(),
            score: self.score(),
            best_score: self.best_score(),
            new_best_achieved: self.new_best_achieved(),
        }
    }

    /// Current state of every round cell, for late-joining observers.
    pub fn cell_updates(&self) -> Vec<CellUpdate> {
        vec![
            self.phase.update(),
            self.time_remaining.update(),
            self.score.update(),
            self.best_score.update(),
            self.new_best.update(),
        ]
    }

    pub fn drain_updates(&mut self) -> Vec<CellUpdate> {
        std::mem::take(&mut self.updates)
    }
}

fn set<T: CellData>(cell: &mut ReplicatedCell<T>, value: T, updates: &mut Vec<CellUpdate>) {
    match cell.write(value) {
        Ok(update) => updates.push(update),
        Err(e) => error!("Round cell write rejected: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::persistence::MemoryStore;
    use assert_approx_eq::assert_approx_eq;
    use tokio_test::{assert_err, assert_ok};

    fn controller_with_best(best: u32) -> (RoundController, MemoryStore) {
        let store = MemoryStore::new(best);
        let controller = RoundController::new(120.0, Box::new(store.clone()));
        (controller, store)
    }

    struct BrokenStore;

    impl BestScoreStore for BrokenStore {
        fn load(&self) -> Result<u32, StoreError> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk gone").into())
        }

        fn save(&mut self, _best: u32) -> Result<(), StoreError> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk gone").into())
        }
    }

    #[test]
    fn test_new_controller_is_idle_with_loaded_best() {
        let (mut controller, _) = controller_with_best(11);

        assert_eq!(controller.phase(), RoundPhase::Idle);
        assert_eq!(controller.best_score(), 11);
        assert_eq!(controller.score(), 0);

        let updates = controller.drain_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].cell, CellId::BestScore);
    }

    #[test]
    fn test_load_failure_falls_back_to_zero() {
        let mut controller = RoundController::new(30.0, Box::new(BrokenStore));
        assert_eq!(controller.best_score(), 0);

        controller.start();
        controller.add_item(ScorableItem::new(1, Category::Glass, 4));
        assert_ok!(controller.request_score(1, Category::Glass));
        controller.tick(30.0);

        // save failure keeps the in-memory value
        assert_eq!(controller.best_score(), 4);
        assert!(controller.new_best_achieved());
    }

    #[test]
    fn test_start_resets_round_state() {
        let (mut controller, _) = controller_with_best(0);
        controller.drain_updates();

        controller.start();

        let session = controller.session();
        assert_eq!(session.phase, RoundPhase::Running);
        assert_approx_eq!(session.time_remaining, 120.0);
        assert_eq!(session.score, 0);
        assert!(!session.new_best_achieved);
        assert_eq!(controller.epoch(), 1);

        let cells: Vec<CellId> = controller.drain_updates().iter().map(|u| u.cell).collect();
        assert_eq!(
            cells,
            vec![
                CellId::Score,
                CellId::TimeRemaining,
                CellId::NewBest,
                CellId::Phase
            ]
        );
    }

    #[test]
    fn test_scoring_scenario_with_new_best() {
        let (mut controller, store) = controller_with_best(3);
        controller.add_item(ScorableItem::new(42, Category::Plastics, 5));
        controller.start();

        controller.tick(10.0);
        assert_approx_eq!(controller.time_remaining(), 110.0);

        assert_eq!(
            controller.request_score(42, Category::Plastics),
            Ok(ScoreOutcome::Scored { points: 5 })
        );
        assert_eq!(controller.score(), 5);

        assert_eq!(
            controller.request_score(42, Category::Plastics),
            Ok(ScoreOutcome::Replayed)
        );
        assert_eq!(controller.score(), 5);

        controller.tick(110.0);
        assert_eq!(controller.phase(), RoundPhase::Ended);
        assert_eq!(controller.time_remaining(), 0.0);
        assert_eq!(controller.best_score(), 5);
        assert!(controller.new_best_achieved());
        assert_eq!(store.best(), 5);
        assert_eq!(store.saves(), 1);
    }

    #[test]
    fn test_round_end_without_improvement() {
        let (mut controller, store) = controller_with_best(8);
        controller.add_item(ScorableItem::new(1, Category::Paper, 8));
        controller.start();

        assert_ok!(controller.request_score(1, Category::Paper));
        controller.tick(200.0);

        assert_eq!(controller.phase(), RoundPhase::Ended);
        assert_eq!(controller.best_score(), 8);
        assert!(!controller.new_best_achieved());
        assert_eq!(store.saves(), 0);
    }

    #[test]
    fn test_mismatch_consumes_without_points() {
        let (mut controller, _) = controller_with_best(0);
        controller.add_item(ScorableItem::new(7, Category::Glass, 3));
        controller.start();

        assert_eq!(
            controller.request_score(7, Category::Paper),
            Ok(ScoreOutcome::Mismatched)
        );
        assert_eq!(controller.score(), 0);
        assert!(controller.item(7).is_none());

        // a later correct receptacle cannot resurrect the item
        assert_eq!(
            controller.request_score(7, Category::Glass),
            Ok(ScoreOutcome::Replayed)
        );
        assert_eq!(controller.score(), 0);
    }

    #[test]
    fn test_scoring_rejected_outside_running() {
        let (mut controller, _) = controller_with_best(0);
        controller.add_item(ScorableItem::new(1, Category::Organic, 2));

        assert_eq!(
            controller.request_score(1, Category::Organic),
            Err(RequestError::RoundNotRunning)
        );

        controller.start();
        controller.tick(120.0);
        assert_eq!(controller.phase(), RoundPhase::Ended);

        assert_err!(controller.request_score(1, Category::Organic));
        assert_eq!(controller.score(), 0);
        assert!(controller.item(1).is_some());
    }

    #[test]
    fn test_unknown_item_is_invalid() {
        let (mut controller, _) = controller_with_best(0);
        controller.start();

        assert_eq!(
            controller.request_score(404, Category::Residual),
            Err(RequestError::UnknownObject(404))
        );
    }

    #[test]
    fn test_restart_opens_new_epoch() {
        let (mut controller, _) = controller_with_best(0);
        controller.add_item(ScorableItem::new(5, Category::Paper, 1));
        controller.start();
        assert_ok!(controller.request_score(5, Category::Paper));
        controller.tick(30.0);

        // restart mid-round resets everything
        controller.start();
        assert_eq!(controller.score(), 0);
        assert_approx_eq!(controller.time_remaining(), 120.0);
        assert_eq!(controller.epoch(), 2);

        // ids may be reused across rounds
        controller.add_item(ScorableItem::new(5, Category::Paper, 2));
        assert_eq!(
            controller.request_score(5, Category::Paper),
            Ok(ScoreOutcome::Scored { points: 2 })
        );
    }

    #[test]
    fn test_timer_is_monotonic() {
        let (mut controller, _) = controller_with_best(0);
        controller.start();

        let mut last = controller.time_remaining();
        for dt in [0.5, -3.0, f32::NAN, 0.0, 1.25] {
            controller.tick(dt);
            assert!(controller.time_remaining() <= last);
            last = controller.time_remaining();
        }
        assert_approx_eq!(last, 118.25);
    }

    #[test]
    fn test_tick_outside_running_is_ignored() {
        let (mut controller, _) = controller_with_best(0);
        controller.drain_updates();

        controller.tick(1.0);
        assert!(controller.drain_updates().is_empty());
        assert_eq!(controller.phase(), RoundPhase::Idle);
    }

    #[test]
    fn test_score_frozen_after_end() {
        let (mut controller, _) = controller_with_best(0);
        controller.add_item(ScorableItem::new(1, Category::Paper, 3));
        controller.add_item(ScorableItem::new(2, Category::Paper, 4));
        controller.start();

        assert_ok!(controller.request_score(1, Category::Paper));
        controller.tick(500.0);
        assert_err!(controller.request_score(2, Category::Paper));

        assert_eq!(controller.score(), 3);
        assert_eq!(controller.time_remaining(), 0.0);
        controller.tick(1.0);
        assert_eq!(controller.time_remaining(), 0.0);
    }
}
