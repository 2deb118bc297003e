//! Exclusive grab locks for shared objects.
//!
//! Every registered resource is either `Free` or `Held(holder)`. The arbiter
//! decides grants and denials, and moves primary control of the resource to
//! the holder on grant and back to the authority on release. Only the
//! controlling node's state updates for a resource are canonical.

use crate::error::RequestError;
use log::{debug, error, info};
use shared::{CellId, CellUpdate, ClientId, LockState, ObjectId, ReplicatedCell, SERVER_CLIENT_ID};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrabOutcome {
    /// The lock moved from `Free` to the requester.
    Granted { transferred: bool },
    /// The requester already held the lock; nothing changed.
    AlreadyHeld,
    /// Someone else holds the lock. Reported to the requester only.
    Denied { holder: ClientId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    NotHolder,
    NotHeld,
}

/// Side effects the authority must publish after an arbitration step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArbiterEvent {
    Cell(CellUpdate),
    ControlChanged {
        resource_id: ObjectId,
        controller: ClientId,
    },
}

#[derive(Debug)]
struct Resource {
    lock: ReplicatedCell<LockState>,
    controller: ClientId,
}

#[derive(Debug, Default)]
pub struct OwnershipArbiter {
    resources: HashMap<ObjectId, Resource>,
    events: Vec<ArbiterEvent>,
}

impl OwnershipArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a free lock for `resource_id`, controlled by the authority.
    pub fn register(&mut self, resource_id: ObjectId) {
        self.resources.insert(
            resource_id,
            Resource {
                lock: ReplicatedCell::authority(CellId::Lock(resource_id), LockState::Free),
                controller: SERVER_CLIENT_ID,
            },
        );
    }

    /// Drops the lock of a despawned resource, returning its last state.
    pub fn remove(&mut self, resource_id: ObjectId) -> Option<LockState> {
        self.resources
            .remove(&resource_id)
            .map(|resource| *resource.lock.read())
    }

    pub fn request_grab(
        &mut self,
        resource_id: ObjectId,
        client_id: ClientId,
    ) -> Result<GrabOutcome, RequestError> {
        let resource = self
            .resources
            .get_mut(&resource_id)
            .ok_or(RequestError::UnknownObject(resource_id))?;

        match *resource.lock.read() {
            LockState::Held(holder) if holder == client_id => Ok(GrabOutcome::AlreadyHeld),
            LockState::Held(holder) => {
                debug!(
                    "Denied grab of object {} by client {} (held by {})",
                    resource_id, client_id, holder
                );
                Ok(GrabOutcome::Denied { holder })
            }
            LockState::Free => {
                publish(&mut resource.lock, LockState::Held(client_id), &mut self.events);
                let transferred =
                    transfer_control(resource, resource_id, client_id, &mut self.events);
                info!("Client {} grabbed object {}", client_id, resource_id);
                Ok(GrabOutcome::Granted { transferred })
            }
        }
    }

    /// Releases the lock if `client_id` is its holder; anyone else is ignored.
    pub fn request_release(
        &mut self,
        resource_id: ObjectId,
        client_id: ClientId,
    ) -> Result<ReleaseOutcome, RequestError> {
        let resource = self
            .resources
            .get_mut(&resource_id)
            .ok_or(RequestError::UnknownObject(resource_id))?;

        match *resource.lock.read() {
            LockState::Free => Ok(ReleaseOutcome::NotHeld),
            LockState::Held(holder) if holder != client_id => Ok(ReleaseOutcome::NotHolder),
            LockState::Held(_) => {
                free(resource, resource_id, &mut self.events);
                info!("Client {} released object {}", client_id, resource_id);
                Ok(ReleaseOutcome::Released)
            }
        }
    }

    /// Forced release of everything `client_id` holds.
    ///
    /// Must run in the same event that observes the disconnect so no later
    /// grab can see a lock held by a departed client.
    pub fn client_disconnected(&mut self, client_id: ClientId) -> Vec<ObjectId> {
        let mut released: Vec<ObjectId> = self
            .resources
            .iter()
            .filter(|(_, resource)| resource.lock.read().holder() == Some(client_id))
            .map(|(id, _)| *id)
            .collect();
        released.sort_unstable();

        for resource_id in &released {
            if let Some(resource) = self.resources.get_mut(resource_id) {
                free(resource, *resource_id, &mut self.events);
                info!(
                    "Forced release of object {} after client {} left",
                    resource_id, client_id
                );
            }
        }

        released
    }

    /// True when `sender` controls `resource_id`, i.e. its state updates are canonical.
    pub fn accept_state_update(&self, resource_id: ObjectId, sender: ClientId) -> bool {
        self.resources
            .get(&resource_id)
            .is_some_and(|resource| resource.controller == sender)
    }

    pub fn lock_state(&self, resource_id: ObjectId) -> Option<LockState> {
        self.resources
            .get(&resource_id)
            .map(|resource| *resource.lock.read())
    }

    pub fn controller_of(&self, resource_id: ObjectId) -> Option<ClientId> {
        self.resources
            .get(&resource_id)
            .map(|resource| resource.controller)
    }

    pub fn contains(&self, resource_id: ObjectId) -> bool {
        self.resources.contains_key(&resource_id)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Current state of one lock, for late-joining observers.
    pub fn lock_update(&self, resource_id: ObjectId) -> Option<CellUpdate> {
        self.resources
            .get(&resource_id)
            .map(|resource| resource.lock.update())
    }

    pub fn drain_events(&mut self) -> Vec<ArbiterEvent> {
        std::mem::take(&mut self.events)
    }
}

fn publish(lock: &mut ReplicatedCell<LockState>, state: LockState, events: &mut Vec<ArbiterEvent>) {
    match lock.write(state) {
        Ok(update) => events.push(ArbiterEvent::Cell(update)),
        Err(e) => error!("Lock write rejected: {}", e),
    }
}

fn free(resource: &mut Resource, resource_id: ObjectId, events: &mut Vec<ArbiterEvent>) {
    publish(&mut resource.lock, LockState::Free, events);
    transfer_control(resource, resource_id, SERVER_CLIENT_ID, events);
}

fn transfer_control(
    resource: &mut Resource,
    resource_id: ObjectId,
    controller: ClientId,
    events: &mut Vec<ArbiterEvent>,
) -> bool {
    if resource.controller == controller {
        return false;
    }

    resource.controller = controller;
    events.push(ArbiterEvent::ControlChanged {
        resource_id,
        controller,
    });
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::CellValue;

    const OBJ_A: ObjectId = 10;

    fn arbiter_with(resource_id: ObjectId) -> OwnershipArbiter {
        let mut arbiter = OwnershipArbiter::new();
        arbiter.register(resource_id);
        arbiter
    }

    #[test]
    fn test_grab_deny_release_sequence() {
        let mut arbiter = arbiter_with(OBJ_A);

        assert_eq!(
            arbiter.request_grab(OBJ_A, 1),
            Ok(GrabOutcome::Granted { transferred: true })
        );
        assert_eq!(
            arbiter.request_grab(OBJ_A, 2),
            Ok(GrabOutcome::Denied { holder: 1 })
        );
        assert_eq!(arbiter.lock_state(OBJ_A), Some(LockState::Held(1)));

        assert_eq!(
            arbiter.request_release(OBJ_A, 2),
            Ok(ReleaseOutcome::NotHolder)
        );
        assert_eq!(arbiter.lock_state(OBJ_A), Some(LockState::Held(1)));

        assert_eq!(arbiter.request_release(OBJ_A, 1), Ok(ReleaseOutcome::Released));
        assert_eq!(arbiter.lock_state(OBJ_A), Some(LockState::Free));

        assert_eq!(
            arbiter.request_grab(OBJ_A, 2),
            Ok(GrabOutcome::Granted { transferred: true })
        );
        assert_eq!(arbiter.controller_of(OBJ_A), Some(2));
    }

    #[test]
    fn test_regrab_by_holder_is_noop() {
        let mut arbiter = arbiter_with(OBJ_A);
        arbiter.request_grab(OBJ_A, 1).unwrap();
        arbiter.drain_events();

        assert_eq!(arbiter.request_grab(OBJ_A, 1), Ok(GrabOutcome::AlreadyHeld));
        assert!(arbiter.drain_events().is_empty());
    }

    #[test]
    fn test_deny_emits_no_events() {
        let mut arbiter = arbiter_with(OBJ_A);
        arbiter.request_grab(OBJ_A, 1).unwrap();
        arbiter.drain_events();

        arbiter.request_grab(OBJ_A, 2).unwrap();
        assert!(arbiter.drain_events().is_empty());
    }

    #[test]
    fn test_grant_publishes_lock_and_control() {
        let mut arbiter = arbiter_with(OBJ_A);
        arbiter.request_grab(OBJ_A, 3).unwrap();

        let events = arbiter.drain_events();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            ArbiterEvent::Cell(CellUpdate {
                cell: CellId::Lock(OBJ_A),
                version: 1,
                value: CellValue::Lock(LockState::Held(3)),
            })
        );
        assert_eq!(
            events[1],
            ArbiterEvent::ControlChanged {
                resource_id: OBJ_A,
                controller: 3,
            }
        );
    }

    #[test]
    fn test_release_returns_control_to_authority() {
        let mut arbiter = arbiter_with(OBJ_A);
        arbiter.request_grab(OBJ_A, 3).unwrap();
        arbiter.request_release(OBJ_A, 3).unwrap();

        assert_eq!(arbiter.controller_of(OBJ_A), Some(SERVER_CLIENT_ID));
        let events = arbiter.drain_events();
        assert_eq!(
            events.last(),
            Some(&ArbiterEvent::ControlChanged {
                resource_id: OBJ_A,
                controller: SERVER_CLIENT_ID,
            })
        );
    }

    #[test]
    fn test_release_of_free_lock() {
        let mut arbiter = arbiter_with(OBJ_A);
        assert_eq!(arbiter.request_release(OBJ_A, 1), Ok(ReleaseOutcome::NotHeld));
        assert!(arbiter.drain_events().is_empty());
    }

    #[test]
    fn test_unknown_resource_is_invalid() {
        let mut arbiter = OwnershipArbiter::new();
        assert_eq!(
            arbiter.request_grab(5, 1),
            Err(RequestError::UnknownObject(5))
        );
        assert_eq!(
            arbiter.request_release(5, 1),
            Err(RequestError::UnknownObject(5))
        );
    }

    #[test]
    fn test_disconnect_forces_release_before_next_grab() {
        let mut arbiter = arbiter_with(OBJ_A);
        arbiter.register(11);
        arbiter.register(12);

        arbiter.request_grab(OBJ_A, 1).unwrap();
        arbiter.request_grab(11, 1).unwrap();
        arbiter.request_grab(12, 2).unwrap();

        assert_eq!(arbiter.client_disconnected(1), vec![OBJ_A, 11]);
        assert_eq!(arbiter.lock_state(OBJ_A), Some(LockState::Free));
        assert_eq!(arbiter.lock_state(11), Some(LockState::Free));
        assert_eq!(arbiter.lock_state(12), Some(LockState::Held(2)));

        assert_eq!(
            arbiter.request_grab(OBJ_A, 2),
            Ok(GrabOutcome::Granted { transferred: true })
        );
    }

    #[test]
    fn test_only_controller_updates_are_canonical() {
        let mut arbiter = arbiter_with(OBJ_A);
        assert!(arbiter.accept_state_update(OBJ_A, SERVER_CLIENT_ID));
        assert!(!arbiter.accept_state_update(OBJ_A, 1));

        arbiter.request_grab(OBJ_A, 1).unwrap();
        assert!(arbiter.accept_state_update(OBJ_A, 1));
        assert!(!arbiter.accept_state_update(OBJ_A, 2));
        assert!(!arbiter.accept_state_update(99, 1));
    }

    #[test]
    fn test_remove_drops_lock() {
        let mut arbiter = arbiter_with(OBJ_A);
        arbiter.request_grab(OBJ_A, 4).unwrap();

        assert_eq!(arbiter.remove(OBJ_A), Some(LockState::Held(4)));
        assert!(!arbiter.contains(OBJ_A));
        assert_eq!(arbiter.remove(OBJ_A), None);
    }

    #[test]
    fn test_lock_update_reflects_current_holder() {
        let mut arbiter = arbiter_with(3);
        arbiter.register(1);
        arbiter.request_grab(3, 7).unwrap();

        let free = arbiter.lock_update(1).unwrap();
        assert_eq!(free.cell, CellId::Lock(1));
        assert_eq!(free.value, CellValue::Lock(LockState::Free));

        let held = arbiter.lock_update(3).unwrap();
        assert_eq!(held.version, 1);
        assert_eq!(held.value, CellValue::Lock(LockState::Held(7)));

        assert_eq!(arbiter.lock_update(99), None);
    }
}
