use std::collections::BTreeSet;

use super::channel::Channel;
use crate::error::{EngineError, Result};
use crate::types::{ChannelId, ChannelLevel, DMX_NULL};

/// Owns every channel of the console and resolves their composite levels.
///
/// Mutators return the composite levels that actually changed so the caller
/// can fan them out to the outputs.
#[derive(Clone, Debug)]
pub struct ChannelRegistry {
    channels: Vec<Channel>,
    selection: BTreeSet<ChannelId>,
}

impl ChannelRegistry {
    pub fn new(channel_count: usize) -> Self {
        let channels = (0..channel_count)
            .map(|index| Channel::new(ChannelId(index as u16)))
            .collect();

        Self {
            channels,
            selection: BTreeSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn contains(&self, id: ChannelId) -> bool {
        (id.0 as usize) < self.channels.len()
    }

    pub fn channel(&self, id: ChannelId) -> Result<&Channel> {
        self.channels
            .get(id.0 as usize)
            .ok_or(EngineError::UnknownChannel(id))
    }

    fn channel_mut(&mut self, id: ChannelId) -> Result<&mut Channel> {
        self.channels
            .get_mut(id.0 as usize)
            .ok_or(EngineError::UnknownChannel(id))
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn level(&self, id: ChannelId) -> Result<u8> {
        self.channel(id).map(Channel::level)
    }

    /// Current composite levels of `ids`, in the given order.
    pub fn snapshot(&self, ids: &[ChannelId]) -> Result<Vec<(ChannelId, u8)>> {
        ids.iter()
            .map(|id| self.level(*id).map(|level| (*id, level)))
            .collect()
    }

    /// Contribution from group blending. The HTP decision has already been
    /// taken by the group engine, so it always overwrites.
    pub fn on_group_level(&mut self, id: ChannelId, level: u8) -> Result<Option<ChannelLevel>> {
        let channel = self.channel_mut(id)?;
        Ok(channel
            .apply_group_level(level)
            .then(|| ChannelLevel::new(id, channel.level())))
    }

    /// Contribution from cue playback.
    pub fn on_scene_level(&mut self, id: ChannelId, level: u8) -> Result<Option<ChannelLevel>> {
        let channel = self.channel_mut(id)?;
        Ok(channel
            .apply_scene_level(level)
            .then(|| ChannelLevel::new(id, channel.level())))
    }

    /// Manual level from a single channel control.
    pub fn set_direct_level(&mut self, id: ChannelId, level: u8) -> Result<Option<ChannelLevel>> {
        let channel = self.channel_mut(id)?;
        Ok(channel
            .set_direct_level(level)
            .then(|| ChannelLevel::new(id, channel.level())))
    }

    /// Manual level applied to every selected channel.
    pub fn set_selected_level(&mut self, level: u8) -> Result<Vec<ChannelLevel>> {
        self.for_each_selected(|channel| channel.set_direct_level(level))
    }

    /// Relative +/- applied to every selected channel.
    pub fn nudge_selected(&mut self, increment: i32) -> Result<Vec<ChannelLevel>> {
        self.for_each_selected(|channel| channel.nudge_direct(increment))
    }

    fn for_each_selected<F>(&mut self, mut apply: F) -> Result<Vec<ChannelLevel>>
    where
        F: FnMut(&mut Channel) -> bool,
    {
        if self.selection.is_empty() {
            return Err(EngineError::NoSelection);
        }

        let mut changed = Vec::new();
        for id in &self.selection {
            let channel = &mut self.channels[id.0 as usize];
            if apply(channel) {
                changed.push(ChannelLevel::new(*id, channel.level()));
            }
        }
        Ok(changed)
    }

    /// Take a direct-driven channel back for playback, returning the level it
    /// was held at.
    pub fn reclaim_for_scene(&mut self, id: ChannelId) -> Result<Option<u8>> {
        Ok(self.channel_mut(id)?.reclaim_for_scene())
    }

    pub fn set_parked(&mut self, id: ChannelId, parked: bool) -> Result<()> {
        self.channel_mut(id)?.set_parked(parked);
        Ok(())
    }

    pub fn set_independent(&mut self, id: ChannelId, independent: bool) -> Result<()> {
        self.channel_mut(id)?.set_independent(independent);
        Ok(())
    }

    // Selection

    pub fn selected(&self) -> Vec<ChannelId> {
        self.selection.iter().copied().collect()
    }

    pub fn has_selection(&self) -> bool {
        !self.selection.is_empty()
    }

    /// Add channels to the selection. Unknown ids reject the whole call.
    /// Returns true if the selection changed.
    pub fn select(&mut self, ids: &[ChannelId]) -> Result<bool> {
        self.validate(ids)?;
        let mut changed = false;
        for id in ids {
            if self.selection.insert(*id) {
                self.channels[id.0 as usize].set_selected(true);
                changed = true;
            }
        }
        Ok(changed)
    }

    /// Remove channels from the selection. Unknown ids reject the whole call.
    pub fn deselect(&mut self, ids: &[ChannelId]) -> Result<bool> {
        self.validate(ids)?;
        let mut changed = false;
        for id in ids {
            if self.selection.remove(id) {
                self.channels[id.0 as usize].set_selected(false);
                changed = true;
            }
        }
        Ok(changed)
    }

    pub fn clear_selection(&mut self) -> bool {
        if self.selection.is_empty() {
            return false;
        }
        for id in std::mem::take(&mut self.selection) {
            self.channels[id.0 as usize].set_selected(false);
        }
        true
    }

    /// Replace the selection with every lit channel that takes part in
    /// playback.
    pub fn select_non_null_channels(&mut self) -> Vec<ChannelId> {
        self.clear_selection();
        for channel in &mut self.channels {
            if channel.level() > DMX_NULL && !channel.flag().is_opted_out() {
                channel.set_selected(true);
                self.selection.insert(channel.id);
            }
        }
        self.selected()
    }

    fn validate(&self, ids: &[ChannelId]) -> Result<()> {
        match ids.iter().find(|id| !self.contains(**id)) {
            Some(id) => Err(EngineError::UnknownChannel(*id)),
            None => Ok(()),
        }
    }
}
