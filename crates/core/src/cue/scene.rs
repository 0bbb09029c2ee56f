use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{scale_level, ChannelId, ChannelLevel, SceneId, DMX_NULL};

/// Crossfade timing of a cue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CueTiming {
    /// Fade time of channels rising or moving to a non-zero level.
    pub time_in: Duration,
    /// Fade time of channels going out.
    pub time_out: Duration,
    pub delay_in: Duration,
    pub delay_out: Duration,
}

impl Default for CueTiming {
    fn default() -> Self {
        Self {
            time_in: Duration::from_secs(5),
            time_out: Duration::from_secs(5),
            delay_in: Duration::ZERO,
            delay_out: Duration::ZERO,
        }
    }
}

impl CueTiming {
    /// Delay and fade duration for a channel heading to `target`.
    pub fn for_target(&self, target: u8) -> (Duration, Duration) {
        if target == DMX_NULL {
            (self.delay_out, self.time_out)
        } else {
            (self.delay_in, self.time_in)
        }
    }
}

/// A recorded cue: stored channel levels plus crossfade timing. The scene
/// master level scales every stored level while the cue is live.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: SceneId,
    pub name: String,
    pub timing: CueTiming,
    channels: BTreeMap<ChannelId, u8>,
    level: u8,
}

impl Scene {
    pub fn new(id: SceneId, timing: CueTiming) -> Self {
        Self {
            id,
            name: format!("Cue {}", id),
            timing,
            channels: BTreeMap::new(),
            level: DMX_NULL,
        }
    }

    pub fn with_channels(mut self, snapshot: &[(ChannelId, u8)]) -> Self {
        self.set_channels(snapshot);
        self
    }

    /// Replace the stored levels.
    pub fn set_channels(&mut self, snapshot: &[(ChannelId, u8)]) {
        self.channels = snapshot.iter().copied().collect();
    }

    pub fn channels(&self) -> &BTreeMap<ChannelId, u8> {
        &self.channels
    }

    pub fn stored_level(&self, channel: ChannelId) -> Option<u8> {
        self.channels.get(&channel).copied()
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub(crate) fn set_level(&mut self, level: u8) {
        self.level = level;
    }

    /// Contributions of every stored channel at the current scene level.
    pub fn contributions(&self) -> Vec<ChannelLevel> {
        self.channels
            .iter()
            .map(|(channel, stored)| ChannelLevel::new(*channel, scale_level(self.level, *stored)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DMX_MAX;

    #[test]
    fn test_contributions_follow_scene_level() {
        let mut scene = Scene::new(SceneId(1.0), CueTiming::default())
            .with_channels(&[(ChannelId(1), 200), (ChannelId(2), 100)]);
        assert_eq!(
            scene.contributions(),
            vec![ChannelLevel::new(ChannelId(1), 0), ChannelLevel::new(ChannelId(2), 0)]
        );

        scene.set_level(DMX_MAX);
        assert_eq!(
            scene.contributions(),
            vec![ChannelLevel::new(ChannelId(1), 200), ChannelLevel::new(ChannelId(2), 100)]
        );

        scene.set_level(128);
        assert_eq!(scene.contributions()[1].level, 50);
    }

    #[test]
    fn test_timing_for_target() {
        let timing = CueTiming {
            time_in: Duration::from_millis(2000),
            time_out: Duration::from_millis(500),
            delay_in: Duration::from_millis(100),
            delay_out: Duration::ZERO,
        };
        assert_eq!(timing.for_target(0), (Duration::ZERO, Duration::from_millis(500)));
        assert_eq!(
            timing.for_target(1),
            (Duration::from_millis(100), Duration::from_millis(2000))
        );
    }
}
