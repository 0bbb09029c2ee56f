use std::time::Duration;

use crate::types::{ChannelId, ChannelLevel, SceneRef};

/// Linear fade of one channel. The start level is held for `delay`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fade {
    pub channel: ChannelId,
    pub start: u8,
    pub end: u8,
    pub delay: Duration,
    pub duration: Duration,
}

impl Fade {
    pub fn level_at(&self, elapsed: Duration) -> u8 {
        if elapsed <= self.delay && !self.is_finished(elapsed) {
            return self.start;
        }
        let running = elapsed.saturating_sub(self.delay);
        if running >= self.duration {
            return self.end;
        }

        let progress = running.as_secs_f64() / self.duration.as_secs_f64();
        let span = self.end as f64 - self.start as f64;
        (self.start as f64 + span * progress).round() as u8
    }

    pub fn is_finished(&self, elapsed: Duration) -> bool {
        elapsed >= self.delay.saturating_add(self.duration)
    }
}

/// A batch of fades launched together by one go. The batch completes when
/// every fade has finished.
#[derive(Clone, Debug)]
pub struct Crossfade {
    pub from: SceneRef,
    pub to: SceneRef,
    fades: Vec<Fade>,
    elapsed: Duration,
    paused: bool,
}

impl Crossfade {
    pub fn new(from: SceneRef, to: SceneRef, fades: Vec<Fade>) -> Self {
        Self {
            from,
            to,
            fades,
            elapsed: Duration::ZERO,
            paused: false,
        }
    }

    pub fn fades(&self) -> &[Fade] {
        &self.fades
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Move the clock forward and return every channel's interpolated level.
    /// A paused crossfade doesn't move.
    pub fn advance(&mut self, delta: Duration) -> Vec<ChannelLevel> {
        if self.paused {
            return Vec::new();
        }
        self.elapsed = self.elapsed.saturating_add(delta);
        self.levels()
    }

    pub fn levels(&self) -> Vec<ChannelLevel> {
        self.fades
            .iter()
            .map(|fade| ChannelLevel::new(fade.channel, fade.level_at(self.elapsed)))
            .collect()
    }

    pub fn level_of(&self, channel: ChannelId) -> Option<u8> {
        self.fades
            .iter()
            .find(|fade| fade.channel == channel)
            .map(|fade| fade.level_at(self.elapsed))
    }

    pub fn references(&self, scene: SceneRef) -> bool {
        self.from == scene || self.to == scene
    }

    /// True once every fade has reached its end level.
    pub fn is_complete(&self) -> bool {
        self.fades.iter().all(|fade| fade.is_finished(self.elapsed))
    }
}
