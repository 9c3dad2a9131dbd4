//! Snapshot building for the tick broadcaster

use std::sync::Arc;

use crate::ws::protocol::{RoundStatus, ServerMsg};

use super::store::EntityStore;

/// Builds and serializes `gameState` frames.
///
/// A frame is only produced when the store has been marked dirty since the
/// previous one, so an idle arena sends nothing.
pub struct SnapshotBuilder {
    stats: SnapshotStats,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self {
            stats: SnapshotStats::default(),
        }
    }

    /// Build a snapshot message from the current authoritative state
    pub fn build(
        &self,
        store: &EntityStore,
        round: RoundStatus,
        next_global_respawn_at: u64,
        now: u64,
    ) -> ServerMsg {
        ServerMsg::GameState {
            players: store.active_player_snapshots(),
            pickups: store.pickups().snapshots(),
            round,
            next_global_respawn_at,
            server_time: now,
        }
    }

    /// Consume the dirty flag and, if it was set, return the serialized frame
    pub fn build_if_dirty(
        &mut self,
        store: &mut EntityStore,
        round: RoundStatus,
        next_global_respawn_at: u64,
        now: u64,
    ) -> Option<Arc<str>> {
        if !store.take_dirty() {
            return None;
        }

        let msg = self.build(store, round, next_global_respawn_at, now);
        match serde_json::to_string(&msg) {
            Ok(json) => {
                self.stats.record(store.active_count(), json.len());
                Some(Arc::from(json))
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize snapshot");
                None
            }
        }
    }

    pub fn stats(&self) -> &SnapshotStats {
        &self.stats
    }
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot volume stats for debugging
#[derive(Debug, Default, Clone)]
pub struct SnapshotStats {
    pub total_snapshots: u64,
    pub total_bytes: u64,
    pub avg_players_per_snapshot: f32,
}

impl SnapshotStats {
    pub fn record(&mut self, player_count: usize, bytes: usize) {
        self.total_snapshots += 1;
        self.total_bytes += bytes as u64;

        // Running average
        let n = self.total_snapshots as f32;
        self.avg_players_per_snapshot =
            self.avg_players_per_snapshot * ((n - 1.0) / n) + (player_count as f32 / n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::math::Vec3;
    use crate::game::pickups::PickupField;
    use uuid::Uuid;

    fn round() -> RoundStatus {
        RoundStatus {
            number: 1,
            is_active: true,
            remaining_time: 10_000,
        }
    }

    #[test]
    fn idle_store_produces_no_frames() {
        let mut store = EntityStore::new(PickupField::default(), 8);
        let mut builder = SnapshotBuilder::new();
        assert!(builder.build_if_dirty(&mut store, round(), 0, 0).is_none());
        assert_eq!(builder.stats().total_snapshots, 0);
    }

    #[test]
    fn many_writes_collapse_into_one_frame() {
        let mut store = EntityStore::new(PickupField::default(), 8);
        let mut builder = SnapshotBuilder::new();
        store
            .join("0xa", "a", Uuid::new_v4(), Vec3::ZERO, true)
            .unwrap();
        for i in 0..10 {
            store.apply_position("0xa", Vec3::new(i as f32, 0.0, 0.0), Vec3::ZERO);
        }

        let frame = builder
            .build_if_dirty(&mut store, round(), 15_000, 1_000)
            .unwrap();
        assert!(builder.build_if_dirty(&mut store, round(), 15_000, 1_050).is_none());

        let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(json["type"], "gameState");
        assert_eq!(json["players"][0]["position"]["x"], 9.0);
        assert_eq!(json["round"]["isActive"], true);
        assert_eq!(json["nextGlobalRespawnAt"], 15_000);
        assert_eq!(builder.stats().total_snapshots, 1);
    }

    #[test]
    fn inactive_players_are_not_broadcast() {
        let mut store = EntityStore::new(PickupField::default(), 8);
        store
            .join("0xa", "a", Uuid::new_v4(), Vec3::ZERO, true)
            .unwrap();
        store
            .join("0xb", "b", Uuid::new_v4(), Vec3::ZERO, true)
            .unwrap();
        store.disconnect("0xb");

        let builder = SnapshotBuilder::new();
        match builder.build(&store, round(), 0, 0) {
            ServerMsg::GameState { players, pickups, .. } => {
                assert_eq!(players.len(), 1);
                assert_eq!(players[0].id, "0xa");
                assert!(!pickups.is_empty());
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
