use crate::error::{EngineError, Result};
use crate::patch::PatchTable;
use crate::types::{ChannelLevel, OutputId, OutputLevel, DMX_MAX, DMX_NULL};

/// One DMX universe worth of output levels.
#[derive(Clone, Debug)]
pub struct Universe {
    pub id: u16,
    levels: Vec<u8>,
    connected: bool,
    dirty: bool,
}

impl Universe {
    fn new(id: u16, size: usize) -> Self {
        Self {
            id,
            levels: vec![DMX_NULL; size],
            connected: false,
            dirty: true,
        }
    }

    pub fn levels(&self) -> &[u8] {
        &self.levels
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Writes channel levels to every output patched to them, and lets outputs be
/// driven directly for checking the rig.
#[derive(Clone, Debug)]
pub struct OutputEngine {
    universes: Vec<Universe>,
}

impl OutputEngine {
    pub fn new(universe_count: usize, outputs_per_universe: usize) -> Self {
        let universes = (0..universe_count)
            .map(|id| Universe::new(id as u16, outputs_per_universe))
            .collect();
        Self { universes }
    }

    pub fn universes(&self) -> &[Universe] {
        &self.universes
    }

    pub fn universe(&self, id: u16) -> Result<&Universe> {
        self.universes
            .get(id as usize)
            .ok_or(EngineError::UnknownUniverse(id))
    }

    pub fn contains(&self, output: OutputId) -> bool {
        self.universe(output.universe)
            .map(|u| (output.output as usize) < u.levels.len())
            .unwrap_or(false)
    }

    pub fn level(&self, output: OutputId) -> Result<u8> {
        self.universe(output.universe)?
            .levels
            .get(output.output as usize)
            .copied()
            .ok_or(EngineError::UnknownOutput(output))
    }

    fn slot_mut(&mut self, output: OutputId) -> Result<(&mut u8, &mut bool)> {
        let universe = self
            .universes
            .get_mut(output.universe as usize)
            .ok_or(EngineError::UnknownUniverse(output.universe))?;
        let slot = universe
            .levels
            .get_mut(output.output as usize)
            .ok_or(EngineError::UnknownOutput(output))?;
        Ok((slot, &mut universe.dirty))
    }

    /// Fan a channel's composite level out to its patched outputs. Returns
    /// the outputs whose level changed.
    pub fn on_channel_level_changed(&mut self, patch: &PatchTable, change: ChannelLevel) -> Vec<OutputLevel> {
        let mut written = Vec::new();
        for output in patch.outputs(change.channel) {
            match self.set_output_level(output, change.level) {
                Ok(Some(level)) => written.push(level),
                Ok(None) => {}
                Err(err) => log::warn!("Channel {}: {}", change.channel, err),
            }
        }
        written
    }

    /// Absolute level on one output.
    pub fn set_output_level(&mut self, output: OutputId, level: u8) -> Result<Option<OutputLevel>> {
        let (slot, dirty) = self.slot_mut(output)?;
        if *slot == level {
            return Ok(None);
        }
        *slot = level;
        *dirty = true;
        Ok(Some(OutputLevel::new(output, level)))
    }

    /// Relative +/- on one output, clamped to the DMX range.
    pub fn nudge_output(&mut self, output: OutputId, increment: i32) -> Result<Option<OutputLevel>> {
        let current = self.level(output)? as i32;
        let level = (current + increment).clamp(DMX_NULL as i32, DMX_MAX as i32) as u8;
        self.set_output_level(output, level)
    }

    pub fn set_connected(&mut self, universe: u16, connected: bool) -> Result<()> {
        let target = self
            .universes
            .get_mut(universe as usize)
            .ok_or(EngineError::UnknownUniverse(universe))?;
        target.connected = connected;
        // A freshly connected driver needs a full frame.
        target.dirty |= connected;
        Ok(())
    }

    /// Frames of every universe written since the last call.
    pub fn take_dirty_frames(&mut self) -> Vec<(u16, Vec<u8>)> {
        self.universes
            .iter_mut()
            .filter(|u| u.dirty)
            .map(|u| {
                u.dirty = false;
                (u.id, u.levels.clone())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChannelId;

    #[test]
    fn test_channel_level_reaches_every_patched_output() {
        let mut patch = PatchTable::new();
        patch
            .add_outputs(ChannelId(1), &[OutputId::new(0, 4), OutputId::new(1, 9)]);
        let mut outputs = OutputEngine::new(2, 16);

        let written = outputs.on_channel_level_changed(&patch, ChannelLevel::new(ChannelId(1), 77));
        assert_eq!(written.len(), 2);
        assert_eq!(outputs.level(OutputId::new(0, 4)), Ok(77));
        assert_eq!(outputs.level(OutputId::new(1, 9)), Ok(77));

        assert!(outputs
            .on_channel_level_changed(&patch, ChannelLevel::new(ChannelId(2), 77))
            .is_empty());
    }

    #[test]
    fn test_unknown_output_is_rejected() {
        let mut outputs = OutputEngine::new(1, 16);
        assert_eq!(
            outputs.set_output_level(OutputId::new(0, 16), 10),
            Err(EngineError::UnknownOutput(OutputId::new(0, 16)))
        );
        assert_eq!(
            outputs.set_output_level(OutputId::new(3, 0), 10),
            Err(EngineError::UnknownUniverse(3))
        );
    }

    #[test]
    fn test_nudge_output_is_clamped() {
        let mut outputs = OutputEngine::new(1, 4);
        let out = OutputId::new(0, 2);
        outputs.set_output_level(out, 250).unwrap();
        assert_eq!(outputs.nudge_output(out, 13), Ok(Some(OutputLevel::new(out, 255))));
        assert_eq!(outputs.nudge_output(out, 13), Ok(None));
        outputs.set_output_level(out, 5).unwrap();
        outputs.nudge_output(out, -13).unwrap();
        assert_eq!(outputs.level(out), Ok(0));
    }

    #[test]
    fn test_take_dirty_frames() {
        let mut outputs = OutputEngine::new(2, 4);
        assert_eq!(outputs.take_dirty_frames().len(), 2);
        assert!(outputs.take_dirty_frames().is_empty());

        outputs.set_output_level(OutputId::new(1, 0), 9).unwrap();
        assert_eq!(outputs.take_dirty_frames(), vec![(1, vec![9, 0, 0, 0])]);

        outputs.set_connected(0, true).unwrap();
        assert!(outputs.universe(0).unwrap().is_connected());
        assert_eq!(outputs.take_dirty_frames()[0].0, 0);
    }
}
