//! Server-owned values with versioned replication.
//!
//! A [`ReplicatedCell`] lives on every node. On the authority it is the only
//! place a value may be assigned; each write bumps the version and yields the
//! [`CellUpdate`] that has to be broadcast. Observers feed received updates
//! back through [`ReplicatedCell::apply`] and drop anything not newer than
//! what they already hold, so reordered broadcasts converge.

use crate::{LockState, ObjectId, ReplicationError, RoundPhase};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellId {
    Phase,
    TimeRemaining,
    Score,
    BestScore,
    NewBest,
    Lock(ObjectId),
}

/// Wire form of every cell type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Phase(RoundPhase),
    Float(f32),
    Int(u32),
    Bool(bool),
    Lock(LockState),
}

/// One `(cellId, version, value)` broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellUpdate {
    pub cell: CellId,
    pub version: u64,
    pub value: CellValue,
}

/// Types that can be stored in a cell and carried as a [`CellValue`].
pub trait CellData: Clone + PartialEq + Send + 'static {
    fn to_value(&self) -> CellValue;
    fn from_value(value: &CellValue) -> Option<Self>;
}

impl CellData for RoundPhase {
    fn to_value(&self) -> CellValue {
        CellValue::Phase(*self)
    }

    fn from_value(value: &CellValue) -> Option<Self> {
        match value {
            CellValue::Phase(phase) => Some(*phase),
            _ => None,
        }
    }
}

impl CellData for f32 {
    fn to_value(&self) -> CellValue {
        CellValue::Float(*self)
    }

    fn from_value(value: &CellValue) -> Option<Self> {
        match value {
            CellValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl CellData for u32 {
    fn to_value(&self) -> CellValue {
        CellValue::Int(*self)
    }

    fn from_value(value: &CellValue) -> Option<Self> {
        match value {
            CellValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl CellData for bool {
    fn to_value(&self) -> CellValue {
        CellValue::Bool(*self)
    }

    fn from_value(value: &CellValue) -> Option<Self> {
        match value {
            CellValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl CellData for LockState {
    fn to_value(&self) -> CellValue {
        CellValue::Lock(*self)
    }

    fn from_value(value: &CellValue) -> Option<Self> {
        match value {
            CellValue::Lock(state) => Some(*state),
            _ => None,
        }
    }
}

/// Which side of the replication a cell sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Authority,
    Observer,
}

type ChangeCallback<T> = Box<dyn FnMut(&T, &T) + Send>;

pub struct ReplicatedCell<T: CellData> {
    id: CellId,
    role: Role,
    version: u64,
    value: T,
    observers: Vec<ChangeCallback<T>>,
}

impl<T: CellData> ReplicatedCell<T> {
    /// Creates the writable copy held by the authoritative node.
    pub fn authority(id: CellId, initial: T) -> Self {
        Self::with_role(id, Role::Authority, initial)
    }

    /// Creates a read-only copy that only changes through [`Self::apply`].
    pub fn observer(id: CellId, initial: T) -> Self {
        Self::with_role(id, Role::Observer, initial)
    }

    fn with_role(id: CellId, role: Role, initial: T) -> Self {
        Self {
            id,
            role,
            version: 0,
            value: initial,
            observers: Vec::new(),
        }
    }

    pub fn id(&self) -> CellId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn read(&self) -> &T {
        &self.value
    }

    /// Assigns a new value and returns the update to broadcast.
    ///
    /// Every successful write produces exactly one update, even when the value
    /// is unchanged; change callbacks only fire when it differs.
    pub fn write(&mut self, value: T) -> Result<CellUpdate, ReplicationError> {
        if self.role != Role::Authority {
            return Err(ReplicationError::NotAuthority { cell: self.id });
        }

        self.version += 1;
        self.replace(value);
        Ok(self.update())
    }

    /// Applies a received value if `version` is newer than the held one.
    pub fn apply(&mut self, version: u64, value: T) -> bool {
        if self.role == Role::Authority || version <= self.version {
            return false;
        }

        self.version = version;
        self.replace(value);
        true
    }

    /// Typed wrapper over [`Self::apply`] for updates taken off the wire.
    pub fn apply_update(&mut self, update: &CellUpdate) -> Result<bool, ReplicationError> {
        if update.cell != self.id {
            return Err(ReplicationError::CellMismatch {
                expected: self.id,
                got: update.cell,
            });
        }

        let value =
            T::from_value(&update.value).ok_or(ReplicationError::TypeMismatch { cell: self.id })?;
        Ok(self.apply(update.version, value))
    }

    /// Registers a callback invoked with `(old, new)` whenever the value changes.
    pub fn on_change<F>(&mut self, callback: F)
    where
        F: FnMut(&T, &T) + Send + 'static,
    {
        self.observers.push(Box::new(callback));
    }

    /// Current state as a broadcastable triple.
    pub fn update(&self) -> CellUpdate {
        CellUpdate {
            cell: self.id,
            version: self.version,
            value: self.value.to_value(),
        }
    }

    fn replace(&mut self, value: T) {
        if value == self.value {
            return;
        }

        let old = std::mem::replace(&mut self.value, value);
        for callback in &mut self.observers {
            callback(&old, &self.value);
        }
    }
}

impl<T: CellData + fmt::Debug> fmt::Debug for ReplicatedCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicatedCell")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("version", &self.version)
            .field("value", &self.value)
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_authority_write_bumps_version() {
        let mut cell = ReplicatedCell::authority(CellId::Score, 0u32);

        let first = cell.write(5).unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(first.value, CellValue::Int(5));

        let second = cell.write(5).unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(*cell.read(), 5);
    }

    #[test]
    fn test_observer_write_is_rejected() {
        let mut cell = ReplicatedCell::observer(CellId::TimeRemaining, 120.0f32);

        let result = cell.write(10.0);
        assert_eq!(
            result,
            Err(ReplicationError::NotAuthority {
                cell: CellId::TimeRemaining
            })
        );
        assert_eq!(cell.version(), 0);
        assert_approx_eq!(*cell.read(), 120.0);
    }

    #[test]
    fn test_observer_discards_stale_versions() {
        let mut cell = ReplicatedCell::observer(CellId::Score, 0u32);

        assert!(cell.apply(3, 30));
        assert!(!cell.apply(2, 20));
        assert!(!cell.apply(3, 31));
        assert_eq!(*cell.read(), 30);

        assert!(cell.apply(5, 50));
        assert_eq!(cell.version(), 5);
        assert_eq!(*cell.read(), 50);
    }

    #[test]
    fn test_authority_ignores_applied_updates() {
        let mut cell = ReplicatedCell::authority(CellId::NewBest, false);
        assert!(!cell.apply(10, true));
        assert!(!*cell.read());
    }

    #[test]
    fn test_on_change_fires_only_on_different_value() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut cell = ReplicatedCell::observer(CellId::Phase, RoundPhase::Idle);

        let sink = Arc::clone(&seen);
        cell.on_change(move |old, new| sink.lock().unwrap().push((*old, *new)));

        assert!(cell.apply(1, RoundPhase::Running));
        // version bump without a value change
        assert!(cell.apply(2, RoundPhase::Running));
        assert!(cell.apply(3, RoundPhase::Ended));

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                (RoundPhase::Idle, RoundPhase::Running),
                (RoundPhase::Running, RoundPhase::Ended),
            ]
        );
    }

    #[test]
    fn test_on_change_fires_on_authority_write() {
        let changes = Arc::new(Mutex::new(0));
        let mut cell = ReplicatedCell::authority(CellId::Lock(1), LockState::Free);

        let counter = Arc::clone(&changes);
        cell.on_change(move |_, _| *counter.lock().unwrap() += 1);

        cell.write(LockState::Held(2)).unwrap();
        cell.write(LockState::Held(2)).unwrap();
        cell.write(LockState::Free).unwrap();

        assert_eq!(*changes.lock().unwrap(), 2);
    }

    #[test]
    fn test_apply_update_checks_cell_and_type() {
        let mut cell = ReplicatedCell::observer(CellId::BestScore, 0u32);

        let wrong_cell = CellUpdate {
            cell: CellId::Score,
            version: 1,
            value: CellValue::Int(4),
        };
        assert_eq!(
            cell.apply_update(&wrong_cell),
            Err(ReplicationError::CellMismatch {
                expected: CellId::BestScore,
                got: CellId::Score,
            })
        );

        let wrong_type = CellUpdate {
            cell: CellId::BestScore,
            version: 1,
            value: CellValue::Bool(true),
        };
        assert_eq!(
            cell.apply_update(&wrong_type),
            Err(ReplicationError::TypeMismatch {
                cell: CellId::BestScore
            })
        );

        let good = CellUpdate {
            cell: CellId::BestScore,
            version: 1,
            value: CellValue::Int(9),
        };
        assert_eq!(cell.apply_update(&good), Ok(true));
        assert_eq!(*cell.read(), 9);
    }

    #[test]
    fn test_update_reflects_current_state() {
        let mut cell = ReplicatedCell::authority(CellId::TimeRemaining, 0.0f32);
        cell.write(120.0).unwrap();
        cell.write(119.5).unwrap();

        let update = cell.update();
        assert_eq!(update.cell, CellId::TimeRemaining);
        assert_eq!(update.version, 2);
        assert_eq!(update.value, CellValue::Float(119.5));
    }
}
