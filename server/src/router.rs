//! Request routing for the authority.
//!
//! Takes a request together with the transport-derived requester id, hands it
//! to the round controller or the lock arbiter, and turns the resulting state
//! changes into outgoing [`Dispatch`]es. Invalid, replayed and ignored
//! requests produce nothing; denials go to the requester only.

use crate::arbiter::{ArbiterEvent, GrabOutcome, ReleaseOutcome};
use crate::round::ScoreOutcome;
use crate::spawner::ItemSpawner;
use crate::world::World;
use log::{debug, info};
use shared::{ClientId, ObjectId, Packet, Request};

/// An outgoing packet and who receives it.
#[derive(Debug, Clone)]
pub enum Dispatch {
    Broadcast {
        packet: Packet,
        exclude: Option<ClientId>,
    },
    Send {
        client_id: ClientId,
        packet: Packet,
    },
}

impl Dispatch {
    pub fn broadcast(packet: Packet) -> Self {
        Dispatch::Broadcast {
            packet,
            exclude: None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RouterStats {
    pub rounds_started: u64,
    pub scored: u64,
    pub mismatched: u64,
    pub replayed: u64,
    pub granted: u64,
    pub denied: u64,
    pub released: u64,
    pub forced_releases: u64,
    pub ignored: u64,
    pub invalid: u64,
}

pub struct RequestRouter {
    spawner: ItemSpawner,
    stats: RouterStats,
}

impl RequestRouter {
    pub fn new(spawner: ItemSpawner) -> Self {
        Self {
            spawner,
            stats: RouterStats::default(),
        }
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }

    /// Handles one request from `requester` in arrival order.
    pub fn route(&mut self, world: &mut World, requester: ClientId, request: Request) -> Vec<Dispatch> {
        match request {
            Request::StartRound => {
                info!("Client {} requested a new round", requester);
                self.start_round(world)
            }
            Request::Score { item_id, category } => {
                let consumed = match world.round_mut().request_score(item_id, category) {
                    Ok(outcome) => {
                        match outcome {
                            ScoreOutcome::Scored { .. } => self.stats.scored += 1,
                            ScoreOutcome::Mismatched => self.stats.mismatched += 1,
                            ScoreOutcome::Replayed => {
                                self.stats.replayed += 1;
                                debug!("Replayed score of item {} from client {}", item_id, requester);
                            }
                        }
                        outcome.consumed()
                    }
                    Err(e) => {
                        self.stats.invalid += 1;
                        debug!("Ignored score request from client {}: {}", requester, e);
                        false
                    }
                };

                let mut out = flush(world);
                if consumed {
                    world.despawn(item_id);
                    out.push(Dispatch::broadcast(Packet::ObjectDespawned { object_id: item_id }));
                }
                out
            }
            Request::Grab { resource_id } => {
                let mut denial = None;
                match world.arbiter_mut().request_grab(resource_id, requester) {
                    Ok(GrabOutcome::Granted { .. }) => self.stats.granted += 1,
                    Ok(GrabOutcome::AlreadyHeld) => self.stats.ignored += 1,
                    Ok(GrabOutcome::Denied { holder }) => {
                        self.stats.denied += 1;
                        denial = Some(Dispatch::Send {
                            client_id: requester,
                            packet: Packet::GrabDenied {
                                resource_id,
                                holder,
                            },
                        });
                    }
                    Err(e) => {
                        self.stats.invalid += 1;
                        debug!("Ignored grab from client {}: {}", requester, e);
                    }
                }

                let mut out = flush(world);
                out.extend(denial);
                out
            }
            Request::Release { resource_id } => {
                match world.arbiter_mut().request_release(resource_id, requester) {
                    Ok(ReleaseOutcome::Released) => self.stats.released += 1,
                    Ok(outcome) => {
                        self.stats.ignored += 1;
                        debug!(
                            "Ignored release of object {} from client {}: {:?}",
                            resource_id, requester, outcome
                        );
                    }
                    Err(e) => {
                        self.stats.invalid += 1;
                        debug!("Ignored release from client {}: {}", requester, e);
                    }
                }
                flush(world)
            }
        }
    }

    /// Starts a round from any phase and replaces leftover objects.
    pub fn start_round(&mut self, world: &mut World) -> Vec<Dispatch> {
        let mut out: Vec<Dispatch> = world
            .object_ids()
            .into_iter()
            .filter(|id| world.despawn(*id))
            .map(|object_id| Dispatch::broadcast(Packet::ObjectDespawned { object_id }))
            .collect();

        world.round_mut().start();
        self.stats.rounds_started += 1;
        out.extend(flush(world));

        out.extend(
            self.spawner
                .populate(world)
                .into_iter()
                .map(|info| Dispatch::broadcast(Packet::ObjectSpawned(info))),
        );
        out
    }

    /// Advances the round timer.
    pub fn tick(&mut self, world: &mut World, dt: f32) -> Vec<Dispatch> {
        world.round_mut().tick(dt);
        flush(world)
    }

    /// Forced release of everything the departed client held.
    pub fn client_disconnected(&mut self, world: &mut World, client_id: ClientId) -> Vec<Dispatch> {
        let released = world.arbiter_mut().client_disconnected(client_id);
        self.stats.forced_releases += released.len() as u64;
        flush(world)
    }

    /// Relays a state update for an object if `sender` controls it.
    pub fn route_object_state(
        &mut self,
        world: &World,
        sender: ClientId,
        object_id: ObjectId,
        position: [f32; 3],
    ) -> Vec<Dispatch> {
        if !world.arbiter().accept_state_update(object_id, sender) {
            self.stats.ignored += 1;
            debug!(
                "Dropped state of object {} from non-controller {}",
                object_id, sender
            );
            return Vec::new();
        }

        vec![Dispatch::Broadcast {
            packet: Packet::ObjectState {
                object_id,
                position,
            },
            exclude: Some(sender),
        }]
    }
}

/// Drains buffered cell writes and control transfers into broadcasts.
fn flush(world: &mut World) -> Vec<Dispatch> {
    let mut out: Vec<Dispatch> = world
        .round_mut()
        .drain_updates()
        .into_iter()
        .map(|update| Dispatch::broadcast(Packet::CellUpdate(update)))
        .collect();

    out.extend(
        world
            .arbiter_mut()
            .drain_events()
            .into_iter()
            .map(|event| match event {
                ArbiterEvent::Cell(update) => Dispatch::broadcast(Packet::CellUpdate(update)),
                ArbiterEvent::ControlChanged {
                    resource_id,
                    controller,
                } => Dispatch::broadcast(Packet::ControlChanged {
                    resource_id,
                    controller,
                }),
            }),
    );
    out
}
