use std::collections::HashMap;

use super::multimap::MultiMap;
use crate::error::{EngineError, Result};
use crate::types::{ChannelId, OutputId};

/// Channel to output routing. A channel may drive any number of outputs but
/// an output is owned by at most one channel.
#[derive(Clone, Debug, Default)]
pub struct PatchTable {
    routes: MultiMap<ChannelId, OutputId>,
    owners: HashMap<OutputId, ChannelId>,
}

impl PatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `output` to `channel`. An output already owned by another channel
    /// is moved; the previous owner is returned.
    pub fn add_output(&mut self, channel: ChannelId, output: OutputId) -> Result<Option<ChannelId>> {
        let previous = self.owners.get(&output).copied();
        if previous == Some(channel) {
            log::warn!("Output {} already patched to channel {}", output, channel);
            return Err(EngineError::AlreadyPatched { channel, output });
        }

        if let Some(owner) = previous {
            self.routes.remove(&owner, &output);
            log::debug!("Output {} moved from channel {} to {}", output, owner, channel);
        }

        self.routes.insert(channel, output);
        self.owners.insert(output, channel);
        Ok(previous)
    }

    /// Route several outputs, returning how many were added.
    pub fn add_outputs(&mut self, channel: ChannelId, outputs: &[OutputId]) -> usize {
        outputs
            .iter()
            .filter(|output| self.add_output(channel, **output).is_ok())
            .count()
    }

    /// Remove `output` from whichever channel owns it.
    pub fn remove_output(&mut self, output: OutputId) -> Result<ChannelId> {
        let Some(channel) = self.owners.remove(&output) else {
            log::warn!("Can't unpatch output {}: not patched", output);
            return Err(EngineError::NotPatched(output));
        };
        self.routes.remove(&channel, &output);
        Ok(channel)
    }

    /// Unpatch several outputs, returning how many were removed.
    pub fn remove_outputs(&mut self, outputs: &[OutputId]) -> usize {
        outputs
            .iter()
            .filter(|output| self.remove_output(**output).is_ok())
            .count()
    }

    /// Remove the routing only if `output` is patched to `channel`.
    pub fn remove_output_from_channel(&mut self, channel: ChannelId, output: OutputId) -> Result<()> {
        if !self.routes.remove(&channel, &output) {
            log::warn!("Can't unpatch output {} from channel {}", output, channel);
            return Err(EngineError::NotPatchedToChannel { channel, output });
        }
        self.owners.remove(&output);
        Ok(())
    }

    /// Remove every routing of `channel`, returning the released outputs.
    pub fn clear_channel(&mut self, channel: ChannelId) -> Vec<OutputId> {
        let released: Vec<OutputId> = self.routes.remove_key(&channel).into_iter().collect();
        for output in &released {
            self.owners.remove(output);
        }
        released
    }

    /// Remove every routing, returning the released outputs.
    pub fn clear_all(&mut self) -> Vec<OutputId> {
        let released: Vec<OutputId> = self.routes.iter().map(|(_, output)| *output).collect();
        self.routes.clear();
        self.owners.clear();
        released
    }

    /// Every output routed to `channel`, in output order.
    pub fn outputs(&self, channel: ChannelId) -> Vec<OutputId> {
        self.routes.values(&channel).copied().collect()
    }

    pub fn channel_for(&self, output: OutputId) -> Option<ChannelId> {
        self.owners.get(&output).copied()
    }

    pub fn patched_channels(&self) -> impl Iterator<Item = &ChannelId> {
        self.routes.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ChannelId, &OutputId)> {
        self.routes.iter()
    }

    /// Number of routed outputs.
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
