//! Arena state: event ingest, validation and round orchestration
//!
//! `Arena` is synchronous and owns every piece of authoritative state. It
//! never touches sockets; outbound traffic is queued as [`Effect`]s that the
//! async service drains after each call.

use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::config::GameConfig;
use crate::game::combat::{
    default_spawn_points, CombatSystem, FireOutcome, HitOutcome, RespawnQueue, SpawnSelector,
};
use crate::game::math::Vec3;
use crate::game::pickups::{PickupField, PickupRespawnScheduler};
use crate::game::round::{RoundController, RoundTransition};
use crate::game::snapshot::{SnapshotBuilder, SnapshotStats};
use crate::game::store::{normalize_identity, sanitize_name, ConnectionId, EntityStore};
use crate::settlement::SettlementReport;
use crate::ws::protocol::{
    ClientMsg, EligiblePlayer, PlayerId, RejectReason, RoundStatus, ServerMsg, Weapon,
};

/// Upper bound on chained round transitions in one evaluation
const MAX_TRANSITIONS_PER_EVALUATION: usize = 4;

/// Outbound work produced by the arena
#[derive(Debug, Clone)]
pub enum Effect {
    /// Send to every connection except `except`
    Broadcast {
        except: Option<ConnectionId>,
        msg: ServerMsg,
    },
    /// Send to one connection
    Direct {
        connection: ConnectionId,
        msg: ServerMsg,
    },
    /// Hand a finished round's eligible players to the settlement collaborator
    Settle {
        round: u64,
        players: Vec<EligiblePlayer>,
    },
}

/// The authoritative arena
pub struct Arena {
    store: EntityStore,
    round: RoundController,
    pickup_clock: PickupRespawnScheduler,
    spawns: SpawnSelector,
    respawns: RespawnQueue,
    snapshots: SnapshotBuilder,
    respawn_delay_ms: u64,
    effects: Vec<Effect>,
}

impl Arena {
    pub fn new(config: &GameConfig, now: u64) -> Self {
        let seed = rand::thread_rng().gen::<u64>();
        Self::with_layout(
            config,
            PickupField::default(),
            default_spawn_points(),
            now,
            seed,
        )
    }

    /// Arena with an explicit pickup field, spawn candidates and RNG seed
    pub fn with_layout(
        config: &GameConfig,
        pickups: PickupField,
        spawn_points: Vec<Vec3>,
        now: u64,
        seed: u64,
    ) -> Self {
        Self {
            store: EntityStore::new(pickups, config.max_players),
            round: RoundController::new(config.round_duration),
            pickup_clock: PickupRespawnScheduler::new(config.pickup_respawn_interval, now),
            spawns: SpawnSelector::new(
                spawn_points,
                config.min_spawn_distance,
                config.spawn_max_attempts,
                seed,
            ),
            respawns: RespawnQueue::new(),
            snapshots: SnapshotBuilder::new(),
            respawn_delay_ms: config.respawn_delay.as_millis() as u64,
            effects: Vec::new(),
        }
    }

    /// Take all effects queued since the last drain
    pub fn drain_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// Route one inbound client event
    pub fn handle_client(&mut self, connection: ConnectionId, msg: ClientMsg, now: u64) {
        match msg {
            ClientMsg::JoinGame {
                identity,
                display_name,
            } => self.handle_join(connection, &identity, display_name.as_deref(), now),
            ClientMsg::PlayerPosition {
                position,
                rotation,
                weapon,
                is_alive,
            } => self.handle_position(connection, position, rotation, weapon, is_alive),
            ClientMsg::WeaponPickupCollection { pickup_id } => {
                self.handle_pickup(connection, pickup_id, now)
            }
            ClientMsg::MissileFire {
                missile_id,
                shooter_id,
                position,
                direction,
            } => self.handle_fire(
                connection,
                missile_id,
                shooter_id,
                position,
                direction,
                now,
            ),
            ClientMsg::MissileHit {
                missile_id,
                shooter_id,
                target_id,
                hit_position,
            } => self.handle_hit(
                connection,
                &missile_id,
                &shooter_id,
                &target_id,
                hit_position,
                now,
            ),
            ClientMsg::Ping { t } => self.direct(
                connection,
                ServerMsg::Pong {
                    t,
                    server_time: now,
                },
            ),
        }
    }

    fn handle_join(
        &mut self,
        connection: ConnectionId,
        identity: &str,
        display_name: Option<&str>,
        now: u64,
    ) {
        let id = match normalize_identity(identity) {
            Ok(id) => id,
            Err(reason) => {
                warn!(connection_id = %connection, "Join with malformed identity");
                self.reject_join(connection, reason);
                return;
            }
        };

        // Same socket switching identities: the old identity leaves first
        let previous = self.bound_player(connection).filter(|p| *p != id);
        if let Some(previous) = &previous {
            self.store.disconnect(previous);
        }

        let name = sanitize_name(display_name, &id);
        let spawn = self.spawns.select(&self.store.alive_positions(Some(id.as_str())));

        match self
            .store
            .join(&id, &name, connection, spawn.position, self.round.is_active())
        {
            Ok(outcome) => {
                if let Some(old) = outcome.replaced_connection {
                    self.direct(
                        old,
                        ServerMsg::Error {
                            code: "session-replaced".to_string(),
                            message: "Identity joined from another connection".to_string(),
                        },
                    );
                }

                self.evaluate_round(now);

                info!(
                    player_id = %id,
                    is_new_player = outcome.is_new_player,
                    active_players = self.store.active_count(),
                    "Player joined arena"
                );
                self.direct(
                    connection,
                    ServerMsg::JoinGameResponse {
                        success: true,
                        reason: None,
                        player_id: Some(id),
                        is_new_player: outcome.is_new_player,
                        round_snapshot: Some(self.round.status(now)),
                    },
                );
            }
            Err(reason) => {
                info!(player_id = %id, %reason, "Join rejected");
                self.reject_join(connection, reason);
                if previous.is_some() {
                    self.evaluate_round(now);
                }
            }
        }
    }

    fn reject_join(&mut self, connection: ConnectionId, reason: RejectReason) {
        self.direct(
            connection,
            ServerMsg::JoinGameResponse {
                success: false,
                reason: Some(reason),
                player_id: None,
                is_new_player: false,
                round_snapshot: None,
            },
        );
    }

    fn handle_position(
        &mut self,
        connection: ConnectionId,
        position: Vec3,
        rotation: Vec3,
        weapon: Weapon,
        is_alive: bool,
    ) {
        let Some(id) = self.bound_player(connection) else {
            debug!(connection_id = %connection, "Position from unjoined connection");
            return;
        };

        if !self.store.apply_position(&id, position, rotation) {
            return;
        }

        // Weapon and life flags are server state; the client's copy lags a round trip
        if let Some(player) = self.store.get(&id) {
            if player.weapon != weapon || player.is_alive != is_alive {
                debug!(
                    player_id = %id,
                    ?weapon,
                    is_alive,
                    "Ignoring stale client weapon/alive flags"
                );
            }
        }
    }

    fn handle_pickup(&mut self, connection: ConnectionId, pickup_id: String, now: u64) {
        let result = match self.bound_player(connection) {
            Some(id) => self.store.collect_pickup(&pickup_id, &id, now),
            None => Err(RejectReason::NotJoined),
        };

        let msg = match result {
            Ok(weapon) => ServerMsg::WeaponPickupResponse {
                success: true,
                pickup_id,
                reason: None,
                weapon: Some(weapon),
            },
            Err(reason) => ServerMsg::WeaponPickupResponse {
                success: false,
                pickup_id,
                reason: Some(reason),
                weapon: None,
            },
        };
        self.direct(connection, msg);
    }

    fn handle_fire(
        &mut self,
        connection: ConnectionId,
        missile_id: String,
        shooter_id: PlayerId,
        position: Vec3,
        direction: Vec3,
        now: u64,
    ) {
        if !position.is_finite() || !direction.is_finite() || missile_id.is_empty() {
            warn!(connection_id = %connection, "Dropping malformed missile fire");
            return;
        }
        if !self.reporter_is(connection, &shooter_id, "missileFire") {
            return;
        }

        match CombatSystem::resolve_fire(&mut self.store, &shooter_id) {
            FireOutcome::Launched => {
                debug!(player_id = %shooter_id, missile_id = %missile_id, "Missile launched");
                self.effects.push(Effect::Broadcast {
                    except: Some(connection),
                    msg: ServerMsg::MissileSpawned {
                        missile_id,
                        shooter_id,
                        position,
                        direction,
                        spawned_at: now,
                    },
                });
            }
            outcome => {
                warn!(player_id = %shooter_id, ?outcome, "Dropping missile fire");
            }
        }
    }

    fn handle_hit(
        &mut self,
        connection: ConnectionId,
        missile_id: &str,
        shooter_id: &str,
        target_id: &str,
        hit_position: Vec3,
        now: u64,
    ) {
        if !hit_position.is_finite() {
            warn!(connection_id = %connection, "Dropping hit with non-finite position");
            return;
        }
        if !self.reporter_is(connection, shooter_id, "missileHit") {
            return;
        }

        let award = self.round.is_active();
        match CombatSystem::resolve_hit(&mut self.store, shooter_id, target_id, award) {
            HitOutcome::Eliminated { shooter_score } => {
                info!(
                    shooter_id,
                    target_id,
                    missile_id,
                    shooter_score,
                    "Player eliminated"
                );
                self.effects.push(Effect::Broadcast {
                    except: None,
                    msg: ServerMsg::PlayerEliminated {
                        target_id: target_id.to_string(),
                        shooter_id: shooter_id.to_string(),
                        position: hit_position,
                        shooter_score,
                    },
                });
                self.respawns
                    .schedule(target_id.to_string(), now + self.respawn_delay_ms);
            }
            outcome => {
                debug!(shooter_id, target_id, ?outcome, "Hit report ignored");
            }
        }
    }

    /// Connection closed: soft-delete its player and re-evaluate the round
    pub fn handle_disconnect(&mut self, connection: ConnectionId, now: u64) {
        if let Some(id) = self.bound_player(connection) {
            self.store.disconnect(&id);
            self.evaluate_round(now);
        }
    }

    /// Hard reset: every player removed, pickups restored, round forgotten
    pub fn reset(&mut self, now: u64) {
        self.store.reset();
        self.respawns.clear();
        self.round.reset();
        self.evaluate_round(now);
        warn!("Arena reset");
    }

    /// Round-end checker timer
    pub fn check_round(&mut self, now: u64) {
        self.evaluate_round(now);
    }

    /// Restore collected pickups once the global respawn instant is reached.
    /// The advertised `nextGlobalRespawnAt` is the same instant that fires.
    fn poll_pickup_respawn(&mut self, now: u64) {
        let Some(respawned) = self.pickup_clock.poll(self.store.pickups_mut(), now) else {
            return;
        };
        if !respawned.is_empty() {
            info!(count = respawned.len(), "Pickups respawned");
            self.store.mark_dirty();
        } else if self.store.active_count() > 0 {
            // next_global_respawn_at moved
            self.store.mark_dirty();
        }
    }

    /// Broadcaster tick: process due player and pickup respawns, then return
    /// a snapshot frame if anything changed since the previous one.
    pub fn tick(&mut self, now: u64) -> Option<Arc<str>> {
        self.poll_pickup_respawn(now);
        for id in self.respawns.drain_due(now) {
            self.respawn_player(&id);
        }

        let round = self.round.status(now);
        let next_respawn = self.pickup_clock.next_global_respawn_at();
        self.snapshots
            .build_if_dirty(&mut self.store, round, next_respawn, now)
    }

    fn respawn_player(&mut self, id: &str) {
        let eligible = self
            .store
            .get(id)
            .map(|p| p.is_active && !p.is_alive)
            .unwrap_or(false);
        if !eligible {
            debug!(player_id = %id, "Skipping respawn for departed or living player");
            return;
        }

        let choice = self.spawns.select(&self.store.alive_positions(Some(id)));
        if choice.used_fallback {
            debug!(player_id = %id, "All spawn candidates contested, using centre");
        }
        if self.store.respawn(id, choice.position, choice.rotation) {
            self.effects.push(Effect::Broadcast {
                except: None,
                msg: ServerMsg::PlayerRespawned {
                    player_id: id.to_string(),
                    position: choice.position,
                    rotation: choice.rotation,
                },
            });
        }
    }

    /// Settlement for `round` returned
    pub fn finish_settlement(&mut self, round: u64, report: SettlementReport, now: u64) {
        info!(
            round,
            successful = report.successful.len(),
            failed = report.failed.len(),
            "Round settlement finished"
        );
        self.effects.push(Effect::Broadcast {
            except: None,
            msg: ServerMsg::RoundRewards {
                round_number: round,
                successful: report.successful,
                failed: report.failed,
            },
        });
        self.round.finish_settlement(round);
        self.evaluate_round(now);
    }

    /// Apply round transitions for the current active count
    fn evaluate_round(&mut self, now: u64) {
        for _ in 0..MAX_TRANSITIONS_PER_EVALUATION {
            let Some(transition) = self.round.evaluate(self.store.active_count(), now) else {
                break;
            };

            match transition {
                RoundTransition::Started { number, start_time } => {
                    self.store.reset_active_scores();
                    info!(round = number, "Round started");
                    self.effects.push(Effect::Broadcast {
                        except: None,
                        msg: ServerMsg::RoundStarted {
                            round_number: number,
                            start_time,
                            duration_ms: self.round.duration_ms(),
                        },
                    });
                }
                RoundTransition::Ended { number, reason } => {
                    // Snapshot who is owed, then zero everyone so nothing
                    // can be claimed twice.
                    let eligible = self.store.eligible_players();
                    self.store.clear_all_scores();
                    info!(round = number, ?reason, eligible = eligible.len(), "Round ended");

                    self.effects.push(Effect::Broadcast {
                        except: None,
                        msg: ServerMsg::RoundEnded {
                            round_number: number,
                            reason,
                            eligible_players: eligible.clone(),
                        },
                    });

                    if eligible.is_empty() {
                        self.round.finish_settlement(number);
                    } else {
                        self.effects.push(Effect::Settle {
                            round: number,
                            players: eligible,
                        });
                    }
                }
            }
            self.store.mark_dirty();
        }
    }

    /// Check a claimed identity against the connection's bound player
    fn reporter_is(&self, connection: ConnectionId, claimed: &str, event: &'static str) -> bool {
        match self.bound_player(connection) {
            Some(bound) if bound == claimed => true,
            bound => {
                warn!(
                    connection_id = %connection,
                    bound_player = ?bound,
                    claimed_player = claimed,
                    event,
                    "Suspicious event on behalf of another player, dropping"
                );
                false
            }
        }
    }

    fn bound_player(&self, connection: ConnectionId) -> Option<PlayerId> {
        self.store
            .player_for_connection(connection)
            .map(|p| p.id.clone())
    }

    fn direct(&mut self, connection: ConnectionId, msg: ServerMsg) {
        self.effects.push(Effect::Direct { connection, msg });
    }

    pub fn round_status(&self, now: u64) -> RoundStatus {
        self.round.status(now)
    }

    pub fn active_players(&self) -> usize {
        self.store.active_count()
    }

    pub fn snapshot_stats(&self) -> &SnapshotStats {
        self.snapshots.stats()
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }
}
