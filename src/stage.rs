//! Presentation hooks
//!
//! The page never touches the DOM or audio directly. Everything visible or
//! audible goes through a `Stage`, which the browser driver implements on top
//! of web-sys and tests implement with `HeadlessStage`.

use glam::Vec2;
use thiserror::Error;

use crate::bullets::{Bullet, BulletId};

/// Character face states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaceState {
    /// Normal face
    #[default]
    Resting,
    /// Shouting face, shown for a moment per shot
    Shouting,
}

/// Current offset/scale of the face container animation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceTransform {
    pub offset: Vec2,
    pub scale: f32,
}

impl Default for FaceTransform {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            scale: 1.0,
        }
    }
}

/// Where the face currently is on screen
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FaceOrigin {
    /// Centre of the face bounding box (viewport px)
    pub center: Vec2,
    /// Width/height of the face bounding box
    pub size: Vec2,
    pub transform: FaceTransform,
}

/// What the counter widget should show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterDisplay {
    /// `None` until the first load attempt resolves ("Loading...")
    pub value: Option<i64>,
    pub offline: bool,
}

impl CounterDisplay {
    /// Widget text: "Loading..." or the value with thousands separators
    pub fn label(&self) -> String {
        let Some(value) = self.value else {
            return "Loading...".to_string();
        };
        let digits = value.unsigned_abs().to_string();
        let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
        if value < 0 {
            out.push('-');
        }
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                out.push(',');
            }
            out.push(c);
        }
        out
    }
}

/// A presentation side effect that could not be carried out
#[derive(Debug, Error)]
pub enum HookError {
    #[error("{0} is unavailable")]
    Unavailable(&'static str),
    #[error("javascript error: {0}")]
    Js(String),
}

/// Counter widget hooks
pub trait CounterView {
    fn counter_changed(&mut self, display: CounterDisplay) -> Result<(), HookError>;
    fn counter_pulse(&mut self, active: bool) -> Result<(), HookError>;
}

/// Everything the core needs from the page around it
pub trait Stage: CounterView {
    fn set_face(&mut self, face: FaceState) -> Result<(), HookError>;
    fn play_sound(&mut self) -> Result<(), HookError>;
    fn spawn_bullet(&mut self, bullet: &Bullet) -> Result<(), HookError>;
    fn remove_bullet(&mut self, id: BulletId) -> Result<(), HookError>;
    /// `None` when the face is not mounted
    fn face_origin(&self) -> Option<FaceOrigin>;
    /// Viewport size in px
    fn viewport(&self) -> Vec2;
}

/// In-memory stage that records what it was asked to do
#[derive(Debug)]
pub struct HeadlessStage {
    pub face: FaceState,
    pub face_changes: usize,
    pub sounds_played: usize,
    pub bullets_spawned: Vec<Bullet>,
    pub bullets_removed: Vec<BulletId>,
    pub counter: Option<CounterDisplay>,
    /// Every distinct value the counter widget showed, in order
    pub counter_history: Vec<i64>,
    pub counter_pulsing: bool,
    pub origin: Option<FaceOrigin>,
    pub viewport: Vec2,
    /// Simulate a page without working audio
    pub audio_broken: bool,
}

impl Default for HeadlessStage {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessStage {
    pub fn new() -> Self {
        Self {
            face: FaceState::Resting,
            face_changes: 0,
            sounds_played: 0,
            bullets_spawned: Vec::new(),
            bullets_removed: Vec::new(),
            counter: None,
            counter_history: Vec::new(),
            counter_pulsing: false,
            origin: Some(FaceOrigin {
                center: Vec2::new(640.0, 360.0),
                size: Vec2::new(300.0, 300.0),
                transform: FaceTransform::default(),
            }),
            viewport: Vec2::new(1280.0, 720.0),
            audio_broken: false,
        }
    }

    /// Value currently shown by the counter widget
    pub fn shown_value(&self) -> Option<i64> {
        self.counter.and_then(|c| c.value)
    }
}

impl CounterView for HeadlessStage {
    fn counter_changed(&mut self, display: CounterDisplay) -> Result<(), HookError> {
        if let Some(value) = display.value
            && self.counter_history.last() != Some(&value)
        {
            self.counter_history.push(value);
        }
        self.counter = Some(display);
        Ok(())
    }

    fn counter_pulse(&mut self, active: bool) -> Result<(), HookError> {
        self.counter_pulsing = active;
        Ok(())
    }
}

impl Stage for HeadlessStage {
    fn set_face(&mut self, face: FaceState) -> Result<(), HookError> {
        if self.face != face {
            self.face_changes += 1;
        }
        self.face = face;
        Ok(())
    }

    fn play_sound(&mut self) -> Result<(), HookError> {
        if self.audio_broken {
            return Err(HookError::Unavailable("audio"));
        }
        self.sounds_played += 1;
        Ok(())
    }

    fn spawn_bullet(&mut self, bullet: &Bullet) -> Result<(), HookError> {
        self.bullets_spawned.push(bullet.clone());
        Ok(())
    }

    fn remove_bullet(&mut self, id: BulletId) -> Result<(), HookError> {
        self.bullets_removed.push(id);
        Ok(())
    }

    fn face_origin(&self) -> Option<FaceOrigin> {
        self.origin
    }

    fn viewport(&self) -> Vec2 {
        self.viewport
    }
}
