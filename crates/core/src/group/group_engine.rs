use std::collections::{BTreeMap, BTreeSet};

use super::channel_group::ChannelGroup;
use crate::error::{EngineError, Result};
use crate::types::{merge_levels, scale_level, ChannelId, ChannelLevel, GroupId, DMX_NULL};

/// The group contribution currently applied to one channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Contribution {
    pub group: Option<GroupId>,
    pub level: u8,
}

#[derive(Clone, Copy, Debug)]
struct Member {
    stored: u8,
    current: u8,
}

/// Blends group master levels into per-channel contributions using
/// highest-takes-precedence.
///
/// Every mutator returns the channels whose contribution changed; the caller
/// forwards them to the channel registry.
#[derive(Clone, Debug)]
pub struct GroupEngine {
    channel_count: usize,
    groups: BTreeMap<GroupId, ChannelGroup>,
    members: BTreeMap<GroupId, BTreeMap<ChannelId, Member>>,
    contributions: BTreeMap<ChannelId, Contribution>,
    subscriptions: BTreeSet<GroupId>,
}

impl GroupEngine {
    pub fn new(channel_count: usize) -> Self {
        Self {
            channel_count,
            groups: BTreeMap::new(),
            members: BTreeMap::new(),
            contributions: BTreeMap::new(),
            subscriptions: BTreeSet::new(),
        }
    }

    pub fn group(&self, id: GroupId) -> Result<&ChannelGroup> {
        self.groups.get(&id).ok_or(EngineError::UnknownGroup(id))
    }

    pub fn groups(&self) -> impl Iterator<Item = &ChannelGroup> {
        self.groups.values()
    }

    pub fn contains(&self, id: GroupId) -> bool {
        self.groups.contains_key(&id)
    }

    pub fn contribution(&self, channel: ChannelId) -> Option<Contribution> {
        self.contributions.get(&channel).copied()
    }

    pub fn is_subscribed(&self, id: GroupId) -> bool {
        self.subscriptions.contains(&id)
    }

    /// Lowest group id not in use.
    pub fn next_group_id(&self) -> GroupId {
        let mut next = 0;
        while self.groups.contains_key(&GroupId(next)) {
            next += 1;
        }
        GroupId(next)
    }

    /// Register `group` and start following its master level. Members with an
    /// invalid channel id are skipped and reported. A group already known
    /// under the same id is replaced.
    pub fn add_group(&mut self, group: ChannelGroup) -> Vec<ChannelLevel> {
        let mut changes = Vec::new();
        if self.groups.contains_key(&group.id) {
            if let Ok(released) = self.remove_group(group.id) {
                changes = released;
            }
        }

        let id = group.id;
        let mut tracked = BTreeMap::new();
        for (channel, stored) in group.members() {
            if channel.0 as usize >= self.channel_count {
                log::warn!("Group {}: {}", id, EngineError::UnknownChannel(*channel));
                continue;
            }
            tracked.insert(
                *channel,
                Member {
                    stored: *stored,
                    current: DMX_NULL,
                },
            );
            self.contributions.entry(*channel).or_default();
        }

        log::debug!("Group {} added with {} channels", id, tracked.len());
        let master = group.master();
        self.members.insert(id, tracked);
        self.groups.insert(id, group);
        self.subscriptions.insert(id);

        if master > DMX_NULL {
            merge_levels(&mut changes, self.on_group_level_changed(id, master));
        }
        changes
    }

    /// Stop following a group and drop its contributions. Channels the group
    /// was winning fall back to the best remaining group.
    pub fn remove_group(&mut self, id: GroupId) -> Result<Vec<ChannelLevel>> {
        if self.groups.remove(&id).is_none() {
            return Err(EngineError::UnknownGroup(id));
        }
        self.subscriptions.remove(&id);
        let tracked = self.members.remove(&id).unwrap_or_default();

        let mut changes = Vec::new();
        for channel in tracked.keys() {
            let previous = self.contributions.get(channel).copied().unwrap_or_default();
            let still_tracked = self.members.values().any(|m| m.contains_key(channel));

            if !still_tracked {
                self.contributions.remove(channel);
                if previous.level != DMX_NULL {
                    changes.push(ChannelLevel::new(*channel, DMX_NULL));
                }
                continue;
            }

            if previous.group == Some(id) {
                let winner = self.best_contribution(*channel, None);
                self.contributions.insert(*channel, winner);
                if winner.level != previous.level {
                    changes.push(ChannelLevel::new(*channel, winner.level));
                }
            }
        }

        log::debug!("Group {} removed", id);
        Ok(changes)
    }

    /// Replace a known group's members. The current master level is
    /// re-applied to the new members.
    pub fn modify_group(&mut self, mut group: ChannelGroup) -> Result<Vec<ChannelLevel>> {
        let master = self.group(group.id)?.master();
        group.set_master(master);
        let mut changes = self.remove_group(group.id)?;
        merge_levels(&mut changes, self.add_group(group));
        Ok(changes)
    }

    /// Record `snapshot` as a group. Without an id the lowest free id is used;
    /// an existing id is re-recorded.
    pub fn record_group(
        &mut self,
        id: Option<GroupId>,
        name: Option<String>,
        snapshot: &[(ChannelId, u8)],
    ) -> (GroupId, Vec<ChannelLevel>) {
        let id = id.unwrap_or_else(|| self.next_group_id());
        let name = name.unwrap_or_else(|| format!("Group {}", id));
        let group = ChannelGroup::from_snapshot(id, name, snapshot);

        let changes = if self.groups.contains_key(&id) {
            self.modify_group(group).unwrap_or_default()
        } else {
            self.add_group(group)
        };
        log::info!("Recorded group {} ({} channels)", id, snapshot.len());
        (id, changes)
    }

    pub fn delete_group(&mut self, id: GroupId) -> Result<Vec<ChannelLevel>> {
        let changes = self.remove_group(id)?;
        log::info!("Deleted group {}", id);
        Ok(changes)
    }

    /// Move a group's master level.
    pub fn set_group_level(&mut self, id: GroupId, level: u8) -> Result<Vec<ChannelLevel>> {
        self.groups
            .get_mut(&id)
            .ok_or(EngineError::UnknownGroup(id))?
            .set_master(level);
        Ok(self.on_group_level_changed(id, level))
    }

    /// HTP merge of a master level change. A higher contribution always wins;
    /// the owning group may also lower its own contribution, in which case the
    /// channel falls back to the highest remaining group.
    fn on_group_level_changed(&mut self, id: GroupId, level: u8) -> Vec<ChannelLevel> {
        if !self.subscriptions.contains(&id) {
            log::warn!("Ignoring level change of unsubscribed group {}", id);
            return Vec::new();
        }
        let Some(tracked) = self.members.get_mut(&id) else {
            return Vec::new();
        };

        let mut updated = Vec::with_capacity(tracked.len());
        for (channel, member) in tracked.iter_mut() {
            member.current = scale_level(level, member.stored);
            updated.push((*channel, member.current));
        }

        let mut changes = Vec::new();
        for (channel, new_level) in updated {
            let previous = self.contributions.get(&channel).copied().unwrap_or_default();
            let owner = previous.group == Some(id);

            let next = if new_level > previous.level {
                Contribution {
                    group: Some(id),
                    level: new_level,
                }
            } else if owner {
                self.best_contribution(channel, Some(id))
            } else {
                continue;
            };

            self.contributions.insert(channel, next);
            if next.level != previous.level {
                changes.push(ChannelLevel::new(channel, next.level));
            }
        }
        changes
    }

    /// Highest current contribution to `channel` across every group, ties
    /// going to `prefer`.
    fn best_contribution(&self, channel: ChannelId, prefer: Option<GroupId>) -> Contribution {
        let mut best = Contribution::default();
        for (group, tracked) in &self.members {
            let Some(member) = tracked.get(&channel) else {
                continue;
            };
            let wins = member.current > best.level
                || (member.current == best.level && Some(*group) == prefer);
            if wins {
                best = Contribution {
                    group: Some(*group),
                    level: member.current,
                };
            }
        }
        if best.level == DMX_NULL {
            best.group = None;
        }
        best
    }
}
