//! Live bullet bookkeeping
//!
//! Bullets fly from just right of the face to the right edge of the viewport.
//! The field only tracks which ones are mounted; drawing is the stage's job.

use std::collections::VecDeque;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::stage::FaceOrigin;

pub type BulletId = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulletConfig {
    /// Live bullets before the oldest is evicted
    pub max_live: usize,
    /// Speed at the start of a press (px/s)
    pub base_speed: f32,
    /// Spawn point relative to the face box, as a fraction of its size
    pub origin_offset: Vec2,
    /// Time a bullet stays mounted after its flight ends (ms)
    pub linger_ms: u64,
}

impl Default for BulletConfig {
    fn default() -> Self {
        Self {
            max_live: MAX_BULLETS,
            base_speed: BULLET_BASE_SPEED,
            origin_offset: Vec2::new(0.26, 0.08),
            linger_ms: BULLET_LINGER_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bullet {
    pub id: BulletId,
    pub symbol: char,
    pub origin: Vec2,
    /// Horizontal distance to the viewport edge
    pub travel: f32,
    /// px/s
    pub speed: f32,
    /// Flight time (ms)
    pub duration_ms: u64,
    pub spawned_at_ms: u64,
    /// When the bullet should be unmounted
    pub expires_at_ms: u64,
}

/// Outcome of a spawn
#[derive(Debug, Clone, PartialEq)]
pub struct Spawned {
    pub bullet: Bullet,
    /// Oldest bullet evicted to make room
    pub evicted: Option<BulletId>,
}

#[derive(Debug)]
pub struct BulletField {
    config: BulletConfig,
    live: VecDeque<Bullet>,
    next_id: BulletId,
}

impl BulletField {
    pub fn new(config: BulletConfig) -> Self {
        Self {
            live: VecDeque::with_capacity(config.max_live),
            config,
            next_id: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bullet> {
        self.live.iter()
    }

    /// Where a bullet leaves the face, clamped to the viewport
    pub fn spawn_point(&self, face: Option<FaceOrigin>, viewport: Vec2) -> Vec2 {
        let Some(face) = face else {
            return Vec2::ZERO;
        };
        let mouth = face.size * self.config.origin_offset * face.transform.scale;
        let start = face.center + mouth + face.transform.offset;
        start.clamp(Vec2::ZERO, viewport.max(Vec2::ZERO))
    }

    /// Mount a new bullet, evicting the oldest one first if the field is full
    pub fn spawn(
        &mut self,
        now_ms: u64,
        symbol: char,
        speed_multiplier: f32,
        face: Option<FaceOrigin>,
        viewport: Vec2,
    ) -> Spawned {
        let evicted = if self.config.max_live > 0 && self.live.len() >= self.config.max_live {
            self.live.pop_front().map(|b| b.id)
        } else {
            None
        };

        let origin = self.spawn_point(face, viewport);
        let travel = (viewport.x - origin.x).max(0.0);
        let speed = (self.config.base_speed * speed_multiplier).max(1.0);
        let duration_ms = (travel / speed * 1000.0).round() as u64;

        let bullet = Bullet {
            id: self.next_id,
            symbol,
            origin,
            travel,
            speed,
            duration_ms,
            spawned_at_ms: now_ms,
            expires_at_ms: now_ms + duration_ms + self.config.linger_ms,
        };
        self.next_id += 1;
        self.live.push_back(bullet.clone());

        Spawned { bullet, evicted }
    }

    /// Unmount a finished bullet. `None` if it was already evicted.
    pub fn remove(&mut self, id: BulletId) -> Option<Bullet> {
        let index = self.live.iter().position(|b| b.id == id)?;
        self.live.remove(index)
    }
}
