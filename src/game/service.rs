//! Arena task: owns the [`Arena`] and drives it from commands and timers

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::config::GameConfig;
use crate::game::store::ConnectionId;
use crate::settlement::{settle_with_timeout, RewardSettlement, SettlementReport};
use crate::util::time::{tick_period, unix_millis};
use crate::ws::protocol::{ClientMsg, EligiblePlayer, RoundStatus, ServerMsg};
use crate::ws::registry::{BroadcastFrame, ConnectionRegistry};

use super::arena::{Arena, Effect};

const COMMAND_CHANNEL_CAPACITY: usize = 1024;
const BROADCAST_CHANNEL_CAPACITY: usize = 128;

/// Work submitted to the arena task
#[derive(Debug)]
pub enum ArenaCommand {
    /// Parsed event from a socket
    Client {
        connection: ConnectionId,
        msg: ClientMsg,
    },
    /// Socket closed
    Disconnect { connection: ConnectionId },
    /// Admin hard reset
    Reset,
    /// Settlement task for `round` returned
    SettlementFinished {
        round: u64,
        report: SettlementReport,
    },
    /// Read-only status query
    Status { reply: oneshot::Sender<ArenaStatus> },
}

/// Point-in-time view for the HTTP surface
#[derive(Debug, Clone)]
pub struct ArenaStatus {
    pub round: RoundStatus,
    pub active_players: usize,
    pub total_players: usize,
    pub snapshots_sent: u64,
}

/// Cloneable handle to the arena task
#[derive(Clone)]
pub struct ArenaHandle {
    pub command_tx: mpsc::Sender<ArenaCommand>,
    pub broadcast_tx: broadcast::Sender<BroadcastFrame>,
    pub player_count: Arc<AtomicUsize>,
}

impl ArenaHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastFrame> {
        self.broadcast_tx.subscribe()
    }

    /// Ask the arena task for its status; None if the task is gone
    pub async fn status(&self) -> Option<ArenaStatus> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(ArenaCommand::Status { reply })
            .await
            .ok()?;
        rx.await.ok()
    }

    pub async fn reset(&self) -> bool {
        self.command_tx.send(ArenaCommand::Reset).await.is_ok()
    }
}

/// The arena task
pub struct ArenaService {
    arena: Arena,
    config: GameConfig,
    command_rx: mpsc::Receiver<ArenaCommand>,
    command_tx: mpsc::Sender<ArenaCommand>,
    broadcast_tx: broadcast::Sender<BroadcastFrame>,
    connections: Arc<ConnectionRegistry>,
    settlement: Arc<dyn RewardSettlement>,
    player_count: Arc<AtomicUsize>,
}

impl ArenaService {
    pub fn new(
        config: GameConfig,
        connections: Arc<ConnectionRegistry>,
        settlement: Arc<dyn RewardSettlement>,
    ) -> (Self, ArenaHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CHANNEL_CAPACITY);
        let player_count = Arc::new(AtomicUsize::new(0));

        let handle = ArenaHandle {
            command_tx: command_tx.clone(),
            broadcast_tx: broadcast_tx.clone(),
            player_count: player_count.clone(),
        };

        let service = Self {
            arena: Arena::new(&config, unix_millis()),
            config,
            command_rx,
            command_tx,
            broadcast_tx,
            connections,
            settlement,
            player_count,
        };

        (service, handle)
    }

    pub async fn run(mut self) {
        info!(
            tick_rate_hz = self.config.tick_rate_hz,
            max_players = self.config.max_players,
            round_secs = self.config.round_duration.as_secs(),
            "Arena started"
        );

        let mut tick_interval = interval(tick_period(self.config.tick_rate_hz));
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut round_interval = interval(self.config.round_check_interval);
        round_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else {
                        info!("Arena command channel closed");
                        break;
                    };
                    self.apply(cmd);
                    // Drain whatever else is queued before the next timer
                    while let Ok(cmd) = self.command_rx.try_recv() {
                        self.apply(cmd);
                    }
                }
                _ = tick_interval.tick() => {
                    if let Some(json) = self.arena.tick(unix_millis()) {
                        let _ = self.broadcast_tx.send(BroadcastFrame { except: None, json });
                    }
                }
                _ = round_interval.tick() => {
                    self.arena.check_round(unix_millis());
                }
            }

            self.flush_effects();
            self.player_count
                .store(self.arena.active_players(), Ordering::Relaxed);
        }
    }

    fn apply(&mut self, cmd: ArenaCommand) {
        let now = unix_millis();
        match cmd {
            ArenaCommand::Client { connection, msg } => {
                self.arena.handle_client(connection, msg, now);
            }
            ArenaCommand::Disconnect { connection } => {
                self.arena.handle_disconnect(connection, now);
            }
            ArenaCommand::Reset => {
                self.arena.reset(now);
            }
            ArenaCommand::SettlementFinished { round, report } => {
                self.arena.finish_settlement(round, report, now);
            }
            ArenaCommand::Status { reply } => {
                let _ = reply.send(ArenaStatus {
                    round: self.arena.round_status(now),
                    active_players: self.arena.active_players(),
                    total_players: self.arena.store().total_count(),
                    snapshots_sent: self.arena.snapshot_stats().total_snapshots,
                });
            }
        }
    }

    fn flush_effects(&mut self) {
        for effect in self.arena.drain_effects() {
            match effect {
                Effect::Broadcast { except, msg } => {
                    if let Some(json) = encode(&msg) {
                        let _ = self.broadcast_tx.send(BroadcastFrame { except, json });
                    }
                }
                Effect::Direct { connection, msg } => {
                    if let Some(json) = encode(&msg) {
                        self.connections.send(connection, json);
                    }
                }
                Effect::Settle { round, players } => self.spawn_settlement(round, players),
            }
        }
    }

    /// Settlement runs off the arena task; its result comes back as a command
    fn spawn_settlement(&self, round: u64, players: Vec<EligiblePlayer>) {
        let settlement = self.settlement.clone();
        let command_tx = self.command_tx.clone();
        let timeout = self.config.settlement_timeout;

        tokio::spawn(async move {
            let report = settle_with_timeout(settlement, round, players, timeout).await;
            if command_tx
                .send(ArenaCommand::SettlementFinished { round, report })
                .await
                .is_err()
            {
                warn!(round, "Arena gone before settlement finished");
            }
        });
    }
}

fn encode(msg: &ServerMsg) -> Option<Arc<str>> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(Arc::from(json)),
        Err(e) => {
            error!(error = %e, "Failed to serialize server message");
            None
        }
    }
}
