//! Per-frame client loop
//!
//! Network receipt only writes into buffers via
//! [`ClientSession::handle_server_msg`]; [`ClientSession::frame`] consumes
//! them once per animation frame. Presentation reads [`ClientEvent`]s from a
//! queue instead of registering callbacks.

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::game::math::Vec3;
use crate::ws::protocol::{
    ClientMsg, EligiblePlayer, PickupSnapshot, PlayerId, RejectReason, RewardFailure,
    RewardReceipt, RoundEndReason, RoundStatus, ServerMsg, Weapon,
};

use super::collision::{CollisionDetector, CollisionMethod};
use super::connection::{ConnectionManager, ConnectionState, ReconnectPolicy};
use super::interpolation::{InterpolationConfig, RemoteEntities, RemoteTransform};
use super::missiles::{MissileConfig, MissileSystem};
use super::prediction::{InputState, PredictedVehicle, VehicleParams};
use super::throttle::{LocalState, OutboundThrottle, ThrottleConfig};

/// Client tunables
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub interpolation: InterpolationConfig,
    pub throttle: ThrottleConfig,
    pub vehicle: VehicleParams,
    pub missiles: MissileConfig,
    pub collision: CollisionMethod,
    pub reconnect: ReconnectPolicy,
    pub pickup: PickupConfig,
}

#[derive(Debug, Clone, Copy)]
pub struct PickupConfig {
    /// Ground-plane distance within which a pickup is requested
    pub radius: f32,
    /// An unanswered request is forgotten after this long
    pub request_timeout_ms: u64,
}

impl Default for PickupConfig {
    fn default() -> Self {
        Self {
            radius: 2.0,
            request_timeout_ms: 1_000,
        }
    }
}

/// Notifications for the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Joined {
        player_id: PlayerId,
        is_new_player: bool,
    },
    JoinRejected {
        reason: Option<RejectReason>,
    },
    WeaponCollected {
        pickup_id: String,
        weapon: Weapon,
    },
    PickupRejected {
        pickup_id: String,
        reason: Option<RejectReason>,
    },
    Eliminated {
        target_id: PlayerId,
        shooter_id: PlayerId,
        is_local: bool,
    },
    Respawned {
        player_id: PlayerId,
        is_local: bool,
    },
    RoundStarted {
        round_number: u64,
        duration_ms: u64,
    },
    RoundEnded {
        round_number: u64,
        reason: RoundEndReason,
        eligible_players: Vec<EligiblePlayer>,
    },
    Rewards {
        round_number: u64,
        successful: Vec<RewardReceipt>,
        failed: Vec<RewardFailure>,
    },
    Connectivity(ConnectionState),
    SessionReplaced,
}

/// Transform for the render sink
#[derive(Debug, Clone, PartialEq)]
pub struct LocalTransform {
    pub position: Vec3,
    pub rotation: Vec3,
    pub is_alive: bool,
    pub weapon: Weapon,
}

/// Everything one frame produces
#[derive(Debug, Clone, Default)]
pub struct FrameOutput {
    pub local: Option<LocalTransform>,
    pub remotes: Vec<RemoteTransform>,
    pub missiles: Vec<(String, Vec3)>,
    pub outbound: Vec<ClientMsg>,
}

struct PendingPickup {
    pickup_id: String,
    requested_at: u64,
}

/// Client-side game state for one local player
pub struct ClientSession {
    config: SessionConfig,
    identity: String,
    display_name: Option<String>,
    local_id: Option<PlayerId>,
    vehicle: Option<PredictedVehicle>,
    weapon: Weapon,
    is_alive: bool,
    remotes: RemoteEntities,
    pickups: Vec<PickupSnapshot>,
    pending_pickup: Option<PendingPickup>,
    missiles: MissileSystem,
    detector: CollisionDetector,
    throttle: OutboundThrottle,
    round: Option<RoundStatus>,
    latency_ms: Option<u64>,
    connection: ConnectionManager,
    events: VecDeque<ClientEvent>,
}

impl ClientSession {
    pub fn new(
        identity: impl Into<String>,
        display_name: Option<String>,
        config: SessionConfig,
    ) -> Self {
        Self {
            identity: identity.into(),
            display_name,
            local_id: None,
            vehicle: None,
            weapon: Weapon::None,
            is_alive: false,
            remotes: RemoteEntities::new(config.interpolation),
            pickups: Vec::new(),
            pending_pickup: None,
            missiles: MissileSystem::new(config.missiles),
            detector: CollisionDetector::new(config.collision),
            throttle: OutboundThrottle::new(config.throttle),
            round: None,
            latency_ms: None,
            connection: ConnectionManager::new(config.reconnect),
            events: VecDeque::new(),
            config,
        }
    }

    // ========================================================================
    // Transport
    // ========================================================================

    /// Transport opened: (re)send the join request
    pub fn on_transport_open(&mut self) -> ClientMsg {
        self.connection.on_open();
        self.events
            .push_back(ClientEvent::Connectivity(self.connection.state()));
        self.throttle.reset();
        ClientMsg::JoinGame {
            identity: self.identity.clone(),
            display_name: self.display_name.clone(),
        }
    }

    /// Transport closed or failed to open
    pub fn on_transport_closed(&mut self, now: u64) {
        self.connection.on_failure(now);
        self.events
            .push_back(ClientEvent::Connectivity(self.connection.state()));
    }

    /// True when the host should open a new transport now
    pub fn poll_reconnect(&mut self, now: u64) -> bool {
        let due = self.connection.poll(now);
        if due {
            self.events
                .push_back(ClientEvent::Connectivity(self.connection.state()));
        }
        due
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    pub fn handle_server_msg(&mut self, msg: ServerMsg, now: u64) {
        match msg {
            ServerMsg::JoinGameResponse {
                success: true,
                player_id: Some(player_id),
                is_new_player,
                round_snapshot,
                ..
            } => {
                info!(player_id = %player_id, is_new_player, "Joined arena");
                self.local_id = Some(player_id.clone());
                self.is_alive = true;
                self.weapon = Weapon::None;
                self.vehicle = None;
                self.round = round_snapshot.or(self.round);
                self.events.push_back(ClientEvent::Joined {
                    player_id,
                    is_new_player,
                });
            }
            ServerMsg::JoinGameResponse { reason, .. } => {
                warn!(?reason, "Join rejected");
                self.events.push_back(ClientEvent::JoinRejected { reason });
            }
            ServerMsg::GameState {
                players,
                pickups,
                round,
                ..
            } => {
                let local_id = self.local_id.as_deref();
                if let Some(me) = players.iter().find(|p| Some(p.id.as_str()) == local_id) {
                    // First sighting places the predicted vehicle
                    if self.vehicle.is_none() {
                        self.vehicle = Some(PredictedVehicle::new(me.position, me.rotation));
                    }
                    // The server can take a weapon away, never hand one out here
                    if !me.weapon.is_armed() && self.weapon.is_armed() {
                        self.weapon = Weapon::None;
                    }
                }
                self.remotes.apply_snapshot(&players, local_id, now);
                self.pickups = pickups;
                self.round = Some(round);
            }
            ServerMsg::WeaponPickupResponse {
                success,
                pickup_id,
                reason,
                weapon,
            } => {
                self.pending_pickup = None;
                match (success, weapon) {
                    (true, Some(weapon)) => {
                        self.weapon = weapon;
                        self.events
                            .push_back(ClientEvent::WeaponCollected { pickup_id, weapon });
                    }
                    _ => {
                        debug!(pickup_id = %pickup_id, ?reason, "Pickup rejected");
                        self.events
                            .push_back(ClientEvent::PickupRejected { pickup_id, reason });
                    }
                }
            }
            ServerMsg::MissileSpawned {
                missile_id,
                shooter_id,
                position,
                direction,
                ..
            } => {
                if Some(&shooter_id) != self.local_id.as_ref() {
                    self.missiles
                        .spawn_remote(missile_id, shooter_id, position, direction, now);
                }
            }
            ServerMsg::PlayerEliminated {
                target_id,
                shooter_id,
                ..
            } => {
                let is_local = self.is_local(&target_id);
                if is_local {
                    self.is_alive = false;
                    self.weapon = Weapon::None;
                    if let Some(vehicle) = self.vehicle.as_mut() {
                        vehicle.speed = 0.0;
                    }
                } else {
                    self.remotes.mark_dead(&target_id);
                }
                self.events.push_back(ClientEvent::Eliminated {
                    target_id,
                    shooter_id,
                    is_local,
                });
            }
            ServerMsg::PlayerRespawned {
                player_id,
                position,
                rotation,
            } => {
                let is_local = self.is_local(&player_id);
                if is_local {
                    self.is_alive = true;
                    self.weapon = Weapon::None;
                    match self.vehicle.as_mut() {
                        Some(vehicle) => vehicle.snap_to(position, rotation),
                        None => self.vehicle = Some(PredictedVehicle::new(position, rotation)),
                    }
                }
                self.events.push_back(ClientEvent::Respawned {
                    player_id,
                    is_local,
                });
            }
            ServerMsg::RoundStarted {
                round_number,
                duration_ms,
                ..
            } => {
                self.events.push_back(ClientEvent::RoundStarted {
                    round_number,
                    duration_ms,
                });
            }
            ServerMsg::RoundEnded {
                round_number,
                reason,
                eligible_players,
            } => {
                self.events.push_back(ClientEvent::RoundEnded {
                    round_number,
                    reason,
                    eligible_players,
                });
            }
            ServerMsg::RoundRewards {
                round_number,
                successful,
                failed,
            } => {
                self.events.push_back(ClientEvent::Rewards {
                    round_number,
                    successful,
                    failed,
                });
            }
            ServerMsg::Error { code, message } => {
                warn!(%code, %message, "Server error");
                if code == "session-replaced" {
                    self.events.push_back(ClientEvent::SessionReplaced);
                }
            }
            ServerMsg::Pong { t, .. } => {
                self.latency_ms = Some(now.saturating_sub(t));
            }
        }
    }

    // ========================================================================
    // Frame
    // ========================================================================

    /// Advance one animation frame
    pub fn frame(&mut self, now: u64, dt: f32, input: &InputState) -> FrameOutput {
        let mut out = FrameOutput::default();

        if let (Some(local_id), Some(vehicle)) = (self.local_id.clone(), self.vehicle.as_mut()) {
            if self.is_alive {
                vehicle.update(input, dt, &self.config.vehicle);

                if input.shoot && self.weapon.is_armed() {
                    if let Some(fire) =
                        self.missiles
                            .fire_local(&local_id, vehicle.position, vehicle.forward(), now)
                    {
                        self.weapon = Weapon::None;
                        out.outbound.push(fire);
                    }
                }
            }
        }

        if let Some(request) = self.pickup_request(now) {
            out.outbound.push(request);
        }

        out.remotes = self.remotes.sample_all(now);

        self.missiles.advance(dt, now);
        let targets = self.remotes.alive_targets();
        out.outbound
            .extend(self.missiles.detect_hits(&targets, &self.detector));
        out.missiles = self
            .missiles
            .iter()
            .map(|m| (m.id.clone(), m.position))
            .collect();

        if let Some(vehicle) = &self.vehicle {
            let state = LocalState {
                position: vehicle.position,
                rotation: vehicle.rotation(),
                weapon: self.weapon,
                is_alive: self.is_alive,
            };
            if self.connection.is_connected() && self.throttle.should_send(now, &state) {
                out.outbound.push(ClientMsg::PlayerPosition {
                    position: state.position,
                    rotation: state.rotation,
                    weapon: state.weapon,
                    is_alive: state.is_alive,
                });
            }
            out.local = Some(LocalTransform {
                position: state.position,
                rotation: state.rotation,
                is_alive: state.is_alive,
                weapon: state.weapon,
            });
        }

        out
    }

    /// Request the nearest available pickup in reach, one request at a time
    fn pickup_request(&mut self, now: u64) -> Option<ClientMsg> {
        if let Some(pending) = &self.pending_pickup {
            if now.saturating_sub(pending.requested_at) < self.config.pickup.request_timeout_ms {
                return None;
            }
            debug!(pickup_id = %pending.pickup_id, "Pickup request timed out");
            self.pending_pickup = None;
        }

        if !self.is_alive || self.weapon.is_armed() {
            return None;
        }
        let position = self.vehicle.as_ref()?.position;

        let pickup = self
            .pickups
            .iter()
            .filter(|p| p.is_available)
            .map(|p| (p, p.position.distance_xz(&position)))
            .filter(|(_, d)| *d <= self.config.pickup.radius)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(p, _)| p.id.clone())?;

        self.pending_pickup = Some(PendingPickup {
            pickup_id: pickup.clone(),
            requested_at: now,
        });
        Some(ClientMsg::WeaponPickupCollection { pickup_id: pickup })
    }

    pub fn ping(&self, now: u64) -> ClientMsg {
        ClientMsg::Ping { t: now }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn drain_events(&mut self) -> Vec<ClientEvent> {
        self.events.drain(..).collect()
    }

    fn is_local(&self, id: &str) -> bool {
        self.local_id.as_deref() == Some(id)
    }

    pub fn local_id(&self) -> Option<&str> {
        self.local_id.as_deref()
    }

    pub fn weapon(&self) -> Weapon {
        self.weapon
    }

    pub fn is_alive(&self) -> bool {
        self.is_alive
    }

    pub fn round(&self) -> Option<RoundStatus> {
        self.round
    }

    pub fn latency_ms(&self) -> Option<u64> {
        self.latency_ms
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn remotes(&self) -> &RemoteEntities {
        &self.remotes
    }
}
