use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::types::{ChannelId, GroupId, DMX_NULL};

/// A submaster: member channels with levels frozen at record time, scaled by
/// one master level.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelGroup {
    pub id: GroupId,
    pub name: String,
    members: BTreeMap<ChannelId, u8>,
    master: u8,
}

impl ChannelGroup {
    pub fn new(id: GroupId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            members: BTreeMap::new(),
            master: DMX_NULL,
        }
    }

    /// Build a group from `(channel, stored level)` pairs. Repeated channels
    /// keep their first level and are reported.
    pub fn from_snapshot(id: GroupId, name: impl Into<String>, snapshot: &[(ChannelId, u8)]) -> Self {
        let mut group = Self::new(id, name);
        for (channel, level) in snapshot {
            if let Err(err) = group.add_member(*channel, *level) {
                log::warn!("{}", err);
            }
        }
        group
    }

    pub fn add_member(&mut self, channel: ChannelId, level: u8) -> Result<()> {
        if self.members.contains_key(&channel) {
            return Err(EngineError::DuplicateMember {
                group: self.id,
                channel,
            });
        }
        self.members.insert(channel, level);
        Ok(())
    }

    pub fn members(&self) -> &BTreeMap<ChannelId, u8> {
        &self.members
    }

    pub fn stored_level(&self, channel: ChannelId) -> Option<u8> {
        self.members.get(&channel).copied()
    }

    pub fn master(&self) -> u8 {
        self.master
    }

    pub(crate) fn set_master(&mut self, level: u8) {
        self.master = level;
    }
}
