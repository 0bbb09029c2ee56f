use serde::{Deserialize, Serialize};

use crate::types::{ChannelFlag, ChannelId, DMX_MAX, DMX_NULL};

/// A logical channel and the contributions competing for its level.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    level: u8,
    direct_level: u8,
    /// Relative adjustment beyond 0/255. Positive only while `direct_level`
    /// is 255, negative only while it is 0.
    direct_offset: i16,
    scene_level: u8,
    group_level: u8,
    flag: ChannelFlag,
    selected: bool,
}

impl Channel {
    pub fn new(id: ChannelId) -> Self {
        Self {
            id,
            level: DMX_NULL,
            direct_level: DMX_NULL,
            direct_offset: 0,
            scene_level: DMX_NULL,
            group_level: DMX_NULL,
            flag: ChannelFlag::Unknown,
            selected: false,
        }
    }

    /// Composite output level.
    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn direct_level(&self) -> u8 {
        self.direct_level
    }

    pub fn direct_offset(&self) -> i16 {
        self.direct_offset
    }

    pub fn scene_level(&self) -> u8 {
        self.scene_level
    }

    pub fn group_level(&self) -> u8 {
        self.group_level
    }

    pub fn flag(&self) -> ChannelFlag {
        self.flag
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn is_direct(&self) -> bool {
        self.flag == ChannelFlag::DirectChannel
    }

    pub(crate) fn set_selected(&mut self, selected: bool) {
        self.selected = selected;
    }

    /// Returns true if the composite level changed.
    pub(crate) fn apply_group_level(&mut self, level: u8) -> bool {
        self.group_level = level;
        if self.flag.is_opted_out() {
            return false;
        }
        self.flag = ChannelFlag::ChannelGroup;
        self.set_level(level)
    }

    /// Returns true if the composite level changed.
    pub(crate) fn apply_scene_level(&mut self, level: u8) -> bool {
        self.scene_level = level;
        if self.flag.is_opted_out() {
            return false;
        }
        self.direct_offset = 0;
        self.flag = ChannelFlag::SelectedScene;
        self.set_level(level)
    }

    /// Manual absolute level. Clears any pending relative offset.
    pub(crate) fn set_direct_level(&mut self, level: u8) -> bool {
        self.direct_offset = 0;
        self.direct_level = level;
        self.take_direct_authority();
        self.set_level(level)
    }

    /// Manual relative adjustment. Steps beyond 0/255 accumulate in the
    /// offset until the level is pushed back the other way.
    pub(crate) fn nudge_direct(&mut self, increment: i32) -> bool {
        // The offset only carries over while the channel still sits at its
        // direct level.
        let holds_direct = self.is_direct() || self.flag.is_opted_out();
        if !holds_direct || self.level != self.direct_level {
            self.direct_level = self.level;
            self.direct_offset = 0;
        }

        let virtual_level = self.direct_level as i32 + self.direct_offset as i32 + increment;
        let clamped = virtual_level.clamp(DMX_NULL as i32, DMX_MAX as i32);
        self.direct_level = clamped as u8;
        self.direct_offset = (virtual_level - clamped).clamp(i16::MIN as i32, i16::MAX as i32) as i16;

        self.take_direct_authority();
        self.set_level(self.direct_level)
    }

    /// Hand a direct-driven channel back to playback, returning the level it
    /// was held at.
    pub(crate) fn reclaim_for_scene(&mut self) -> Option<u8> {
        if !self.is_direct() {
            return None;
        }
        self.direct_offset = 0;
        self.flag = ChannelFlag::SelectedScene;
        Some(self.direct_level)
    }

    pub(crate) fn set_parked(&mut self, parked: bool) {
        self.set_opt_out(ChannelFlag::Parked, parked);
    }

    pub(crate) fn set_independent(&mut self, independent: bool) {
        self.set_opt_out(ChannelFlag::Independent, independent);
    }

    fn set_opt_out(&mut self, flag: ChannelFlag, enabled: bool) {
        if enabled {
            self.flag = flag;
        } else if self.flag == flag {
            self.flag = ChannelFlag::Unknown;
        }
    }

    fn take_direct_authority(&mut self) {
        if !self.flag.is_opted_out() {
            self.flag = ChannelFlag::DirectChannel;
        }
    }

    fn set_level(&mut self, level: u8) -> bool {
        let changed = self.level != level;
        self.level = level;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_round_trip() {
        let mut channel = Channel::new(ChannelId(0));
        channel.set_direct_level(250);
        for _ in 0..3 {
            channel.nudge_direct(13);
        }
        assert_eq!(channel.level(), 255);
        assert_eq!(channel.direct_offset(), 34);

        channel.nudge_direct(-40);
        assert_eq!(channel.level(), 249);
        assert_eq!(channel.direct_offset(), 0);
    }

    #[test]
    fn test_negative_offset_folds_back() {
        let mut channel = Channel::new(ChannelId(0));
        channel.set_direct_level(5);
        channel.nudge_direct(-13);
        channel.nudge_direct(-13);
        assert_eq!(channel.level(), 0);
        assert_eq!(channel.direct_offset(), -21);

        channel.nudge_direct(13);
        assert_eq!(channel.level(), 0);
        assert_eq!(channel.direct_offset(), -8);

        channel.nudge_direct(13);
        assert_eq!(channel.level(), 5);
        assert_eq!(channel.direct_offset(), 0);
    }

    #[test]
    fn test_set_level_clears_offset() {
        let mut channel = Channel::new(ChannelId(0));
        channel.set_direct_level(255);
        channel.nudge_direct(20);
        assert_eq!(channel.direct_offset(), 20);
        channel.set_direct_level(100);
        assert_eq!(channel.direct_offset(), 0);
        assert_eq!(channel.flag(), ChannelFlag::DirectChannel);
    }

    #[test]
    fn test_nudge_starts_from_composite_level() {
        let mut channel = Channel::new(ChannelId(0));
        channel.apply_scene_level(120);
        channel.nudge_direct(13);
        assert_eq!(channel.level(), 133);
        assert!(channel.is_direct());
    }

    #[test]
    fn test_scene_level_takes_authority() {
        let mut channel = Channel::new(ChannelId(0));
        channel.set_direct_level(40);
        assert!(channel.apply_scene_level(90));
        assert_eq!(channel.flag(), ChannelFlag::SelectedScene);
        assert_eq!(channel.level(), 90);
    }

    #[test]
    fn test_parked_channel_ignores_playback() {
        let mut channel = Channel::new(ChannelId(0));
        channel.set_direct_level(60);
        channel.set_parked(true);
        assert!(!channel.apply_scene_level(200));
        assert!(!channel.apply_group_level(200));
        assert_eq!(channel.level(), 60);
        assert_eq!(channel.scene_level(), 200);

        channel.set_parked(false);
        assert_eq!(channel.flag(), ChannelFlag::Unknown);
        assert!(channel.apply_group_level(200));
        assert_eq!(channel.flag(), ChannelFlag::ChannelGroup);
    }

    #[test]
    fn test_parked_nudge_starts_from_held_level() {
        let mut channel = Channel::new(ChannelId(0));
        channel.set_direct_level(0);
        channel.apply_scene_level(120);
        channel.set_parked(true);

        assert!(channel.nudge_direct(13));
        assert_eq!(channel.level(), 133);
        assert_eq!(channel.flag(), ChannelFlag::Parked);
    }

    #[test]
    fn test_parked_nudge_keeps_offset() {
        let mut channel = Channel::new(ChannelId(0));
        channel.set_parked(true);
        channel.set_direct_level(250);
        channel.nudge_direct(13);
        assert_eq!(channel.direct_offset(), 8);
        channel.nudge_direct(-13);
        assert_eq!(channel.level(), 250);
    }

    #[test]
    fn test_reclaim_only_direct_channels() {
        let mut channel = Channel::new(ChannelId(0));
        assert_eq!(channel.reclaim_for_scene(), None);
        channel.set_direct_level(77);
        assert_eq!(channel.reclaim_for_scene(), Some(77));
        assert_eq!(channel.flag(), ChannelFlag::SelectedScene);
    }
}
