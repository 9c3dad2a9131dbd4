//! Remote entity interpolation
//!
//! Every remote player gets a short history of received transforms. Frames
//! render a fixed delay in the past so there is nearly always a bracketing
//! pair of samples to blend between.

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::game::math::Vec3;
use crate::ws::protocol::{PlayerId, PlayerSnapshot};

/// Interpolation tunables
#[derive(Debug, Clone, Copy)]
pub struct InterpolationConfig {
    /// Samples kept per entity
    pub max_samples: usize,
    /// A jump between consecutive samples larger than this is a teleport
    pub teleport_threshold: f32,
    /// How far in the past frames are rendered
    pub render_delay_ms: u64,
    /// Samples older than `renderTime - history_ms` are pruned
    pub history_ms: u64,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            max_samples: 5,
            teleport_threshold: 20.0,
            render_delay_ms: 100,
            history_ms: 1_000,
        }
    }
}

/// One received transform, stamped with its local arrival time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub position: Vec3,
    pub rotation: Vec3,
    pub timestamp: u64,
}

/// Bounded per-entity sample history
#[derive(Debug, Clone)]
pub struct InterpolationBuffer {
    config: InterpolationConfig,
    samples: VecDeque<Sample>,
}

impl InterpolationBuffer {
    pub fn new(config: InterpolationConfig) -> Self {
        Self {
            config,
            samples: VecDeque::with_capacity(config.max_samples + 1),
        }
    }

    /// Append a sample. Returns true when it was a teleport and the history
    /// was discarded.
    pub fn push(&mut self, position: Vec3, rotation: Vec3, timestamp: u64) -> bool {
        self.samples.push_back(Sample {
            position,
            rotation,
            timestamp,
        });
        while self.samples.len() > self.config.max_samples {
            self.samples.pop_front();
        }

        let len = self.samples.len();
        if len >= 2 {
            let jump = self.samples[len - 1]
                .position
                .distance(&self.samples[len - 2].position);
            if jump > self.config.teleport_threshold {
                self.samples.drain(..len - 1);
                return true;
            }
        }
        false
    }

    /// Transform to render at local time `now`
    pub fn sample(&self, now: u64) -> Option<(Vec3, Vec3)> {
        let newest = self.samples.back()?;
        if self.samples.len() == 1 {
            return Some((newest.position, newest.rotation));
        }

        let render_time = now.saturating_sub(self.config.render_delay_ms);

        let bracket = self
            .samples
            .iter()
            .zip(self.samples.iter().skip(1))
            .find(|(from, to)| from.timestamp <= render_time && render_time <= to.timestamp);

        // Too sparse or outside the window: blend the two newest
        let (from, to) = match bracket {
            Some(pair) => pair,
            None => (&self.samples[self.samples.len() - 2], newest),
        };

        let factor = blend_factor(from.timestamp, to.timestamp, render_time);
        Some((
            from.position.lerp(&to.position, factor),
            from.rotation.lerp(&to.rotation, factor),
        ))
    }

    /// Drop samples older than the history window; the newest always stays
    pub fn prune(&mut self, now: u64) {
        let cutoff = now
            .saturating_sub(self.config.render_delay_ms)
            .saturating_sub(self.config.history_ms);
        while self.samples.len() > 1
            && self
                .samples
                .front()
                .map(|s| s.timestamp < cutoff)
                .unwrap_or(false)
        {
            self.samples.pop_front();
        }
    }

    pub fn newest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

fn blend_factor(from: u64, to: u64, render_time: u64) -> f32 {
    if to <= from {
        return 1.0;
    }
    let t = (render_time as f64 - from as f64) / (to - from) as f64;
    t.clamp(0.0, 1.0) as f32
}

/// A remote player as the client knows it
#[derive(Debug, Clone)]
pub struct RemoteEntity {
    pub snapshot: PlayerSnapshot,
    pub buffer: InterpolationBuffer,
    /// Transform produced by the last [`RemoteEntities::sample_all`]
    pub rendered: Option<(Vec3, Vec3)>,
}

/// Interpolated transform handed to the render sink
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTransform {
    pub id: PlayerId,
    pub position: Vec3,
    pub rotation: Vec3,
    pub is_alive: bool,
}

/// All remote players, keyed by id
#[derive(Debug, Clone, Default)]
pub struct RemoteEntities {
    config: InterpolationConfig,
    entities: HashMap<PlayerId, RemoteEntity>,
}

impl RemoteEntities {
    pub fn new(config: InterpolationConfig) -> Self {
        Self {
            config,
            entities: HashMap::new(),
        }
    }

    /// Feed one `gameState` player list. Players missing from it are dropped;
    /// `local_id` is skipped since the local player is predicted.
    pub fn apply_snapshot(&mut self, players: &[PlayerSnapshot], local_id: Option<&str>, now: u64) {
        self.entities
            .retain(|id, _| players.iter().any(|p| &p.id == id));

        for player in players {
            if Some(player.id.as_str()) == local_id {
                continue;
            }

            let config = self.config;
            let entity = self
                .entities
                .entry(player.id.clone())
                .or_insert_with(|| RemoteEntity {
                    snapshot: player.clone(),
                    buffer: InterpolationBuffer::new(config),
                    rendered: None,
                });

            if entity.buffer.push(player.position, player.rotation, now) {
                debug!(player_id = %player.id, "Remote teleport, snapping");
            }
            entity.snapshot = player.clone();
        }
    }

    /// Sample every entity for this frame and prune old history
    pub fn sample_all(&mut self, now: u64) -> Vec<RemoteTransform> {
        let mut out = Vec::with_capacity(self.entities.len());
        for (id, entity) in self.entities.iter_mut() {
            entity.rendered = entity.buffer.sample(now);
            entity.buffer.prune(now);
            if let Some((position, rotation)) = entity.rendered {
                out.push(RemoteTransform {
                    id: id.clone(),
                    position,
                    rotation,
                    is_alive: entity.snapshot.is_alive,
                });
            }
        }
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Alive remote players at their last rendered positions
    pub fn alive_targets(&self) -> Vec<(PlayerId, Vec3)> {
        self.entities
            .iter()
            .filter(|(_, e)| e.snapshot.is_alive)
            .filter_map(|(id, e)| e.rendered.map(|(pos, _)| (id.clone(), pos)))
            .collect()
    }

    pub fn mark_dead(&mut self, id: &str) {
        if let Some(entity) = self.entities.get_mut(id) {
            entity.snapshot.is_alive = false;
        }
    }

    pub fn get(&self, id: &str) -> Option<&RemoteEntity> {
        self.entities.get(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn clear(&mut self) {
        self.entities.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::Weapon;
    use chrono::Utc;

    fn buffer() -> InterpolationBuffer {
        InterpolationBuffer::new(InterpolationConfig::default())
    }

    fn at(x: f32) -> Vec3 {
        Vec3::new(x, 0.0, 0.0)
    }

    #[test]
    fn keeps_only_the_newest_five_in_order() {
        let mut buf = buffer();
        for i in 0..10 {
            buf.push(at(i as f32), Vec3::ZERO, i * 50);
        }
        let xs: Vec<f32> = buf.samples().map(|s| s.position.x).collect();
        assert_eq!(xs, vec![5.0, 6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn teleport_snaps_to_newest_sample() {
        let mut buf = buffer();
        buf.push(at(0.0), Vec3::ZERO, 0);
        buf.push(at(1.0), Vec3::ZERO, 50);
        assert!(buf.push(at(26.0), Vec3::new(0.0, 1.0, 0.0), 100));

        assert_eq!(buf.len(), 1);
        let (pos, rot) = buf.sample(150).unwrap();
        assert_eq!(pos, at(26.0));
        assert_eq!(rot, Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn samples_between_bracketing_pair() {
        let mut buf = buffer();
        buf.push(at(0.0), Vec3::ZERO, 1_000);
        buf.push(at(10.0), Vec3::new(0.0, 1.0, 0.0), 1_100);
        buf.push(at(12.0), Vec3::ZERO, 1_200);

        // renderTime = 1_150 - 100 = 1_050, halfway through the first pair
        let (pos, rot) = buf.sample(1_150).unwrap();
        assert!((pos.x - 5.0).abs() < 1e-4);
        assert!((rot.y - 0.5).abs() < 1e-4);
    }

    #[test]
    fn falls_back_to_two_newest_outside_window() {
        let mut buf = buffer();
        buf.push(at(0.0), Vec3::ZERO, 1_000);
        buf.push(at(4.0), Vec3::ZERO, 1_100);

        // renderTime far ahead: clamps to the newest
        let (pos, _) = buf.sample(5_000).unwrap();
        assert_eq!(pos, at(4.0));

        // renderTime before the oldest: clamps to the older of the two
        let (pos, _) = buf.sample(500).unwrap();
        assert_eq!(pos, at(0.0));
    }

    #[test]
    fn prune_keeps_the_newest_sample() {
        let mut buf = buffer();
        buf.push(at(0.0), Vec3::ZERO, 0);
        buf.push(at(1.0), Vec3::ZERO, 100);
        buf.prune(10_000);
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.newest().unwrap().position, at(1.0));
    }

    fn snapshot(id: &str, x: f32) -> PlayerSnapshot {
        PlayerSnapshot {
            id: id.into(),
            name: id.into(),
            position: at(x),
            rotation: Vec3::ZERO,
            score: 0,
            is_alive: true,
            weapon: Weapon::None,
            joined_at: Utc::now(),
        }
    }

    #[test]
    fn remote_entities_skip_local_and_drop_departed() {
        let mut remotes = RemoteEntities::new(InterpolationConfig::default());
        let players = [snapshot("me", 0.0), snapshot("a", 1.0), snapshot("b", 2.0)];
        remotes.apply_snapshot(&players, Some("me"), 0);
        assert_eq!(remotes.len(), 2);
        assert!(remotes.get("me").is_none());

        remotes.apply_snapshot(&[snapshot("me", 0.0), snapshot("a", 1.5)], Some("me"), 50);
        assert_eq!(remotes.len(), 1);
        assert_eq!(remotes.get("a").unwrap().buffer.len(), 2);

        let frame = remotes.sample_all(60);
        assert_eq!(frame.len(), 1);
        assert_eq!(remotes.alive_targets().len(), 1);

        remotes.mark_dead("a");
        assert!(remotes.alive_targets().is_empty());
    }
}
