use std::collections::BTreeSet;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::channel::ChannelRegistry;
use crate::config::ConfigManager;
use crate::cue::CueEngine;
use crate::error::{EngineError, Result};
use crate::group::GroupEngine;
use crate::messages::{EngineCommand, EngineEvent, EngineSettings, HardwareRequest};
use crate::output::OutputEngine;
use crate::patch::PatchTable;
use crate::types::{
    ChannelId, ChannelLevel, GroupId, OutputId, OutputLevel, SceneId, SceneRef, SequenceId,
    DMX_NULL,
};

/// What the level keys currently act on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SelectionType {
    Channel,
    Output,
    #[default]
    Unknown,
}

/// The lighting engine: owns every engine and the patch, and is the only way
/// to change them.
///
/// Commands run to completion one at a time. Every resulting event is sent to
/// the subscribers before the command returns.
pub struct LightingEngine {
    // Fields drop in declaration order: outputs, cues, groups, channels, patch.
    outputs: OutputEngine,
    cues: CueEngine,
    groups: GroupEngine,
    channels: ChannelRegistry,
    patch: PatchTable,

    settings: EngineSettings,
    selection_type: SelectionType,
    output_selection: BTreeSet<OutputId>,
    subscribers: Vec<mpsc::UnboundedSender<EngineEvent>>,
}

impl LightingEngine {
    pub fn new(settings: EngineSettings) -> Result<Self> {
        ConfigManager::validate_settings(&settings)
            .map_err(|errors| EngineError::InvalidSettings(errors.join(", ")))?;

        let mut engine = Self {
            outputs: OutputEngine::new(settings.universe_count, settings.outputs_per_universe),
            cues: CueEngine::new(settings.sequence_count, settings.default_timing()),
            groups: GroupEngine::new(settings.channel_count),
            channels: ChannelRegistry::new(settings.channel_count),
            patch: PatchTable::new(),
            settings,
            selection_type: SelectionType::Unknown,
            output_selection: BTreeSet::new(),
            subscribers: Vec::new(),
        };

        if engine.settings.straight_patch {
            engine.straight_patch(0)?;
        }

        log::info!(
            "Lighting engine ready: {} channels, {} universe(s) of {} outputs",
            engine.settings.channel_count,
            engine.settings.universe_count,
            engine.settings.outputs_per_universe
        );
        Ok(engine)
    }

    /// Receive every event published from now on.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<EngineEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    fn publish(&mut self, event: EngineEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    pub fn groups(&self) -> &GroupEngine {
        &self.groups
    }

    pub fn cues(&self) -> &CueEngine {
        &self.cues
    }

    pub fn patch(&self) -> &PatchTable {
        &self.patch
    }

    pub fn outputs(&self) -> &OutputEngine {
        &self.outputs
    }

    pub fn selection_type(&self) -> SelectionType {
        self.selection_type
    }

    pub fn selected_outputs(&self) -> Vec<OutputId> {
        self.output_selection.iter().copied().collect()
    }

    /// Dispatch a command. A rejected command is logged and reported to the
    /// subscribers as an error event.
    pub fn process_command(&mut self, command: EngineCommand) -> Result<()> {
        use EngineCommand::*;

        log::debug!("Processing command: {:?}", command);

        let result = match command {
            // Channel selection
            SelectChannels { channels } => self.select_channels(&channels),
            DeselectChannels { channels } => self.deselect_channels(&channels),
            SelectNonNullChannels => {
                self.select_non_null_channels();
                Ok(())
            }
            ClearSelection => {
                self.clear_selection();
                Ok(())
            }

            // Output selection
            SelectOutputs { outputs } => self.select_outputs(&outputs),
            DeselectOutputs { outputs } => self.deselect_outputs(&outputs),

            // Levels
            SetLevel { level } => self.set_level(level),
            Plus => self.plus(),
            Minus => self.minus(),
            SetChannelLevel { channel, level } => self.set_channel_level(channel, level),
            SetParked { channel, parked } => self.set_parked(channel, parked),
            SetIndependent {
                channel,
                independent,
            } => self.set_independent(channel, independent),

            // Groups
            RecordGroup { group, name } => self.record_group(group, name).map(|_| ()),
            DeleteGroup { group } => self.delete_group(group),
            SetGroupLevel { group, level } => self.set_group_level(group, level),

            // Cues
            RecordCue { cue, sequence } => self.record_cue(cue, sequence).map(|_| ()),
            UpdateCue { cue } => self.update_cue(cue).map(|_| ()),
            DeleteCue { cue } => self.delete_cue(cue),
            DeleteStep { step } => self.delete_step(step),
            SetTimeIn { time, cue } => self.set_time_in(time, cue),
            SetTimeOut { time, cue } => self.set_time_out(time, cue),
            SetDelayIn { delay, cue } => self.set_delay_in(delay, cue),
            SetDelayOut { delay, cue } => self.set_delay_out(delay, cue),

            // Playback
            GotoCue { cue } => self.goto_cue(cue),
            GotoStep { step } => self.goto_step(step),
            StepPlus => self.step_plus(),
            StepMinus => self.step_minus(),
            Go => self.go(),
            GoBack => self.go_back(),
            GoPause => {
                self.go_pause();
                Ok(())
            }
            SetMainSequence { sequence } => self.set_main_sequence(sequence),
            AddSequence { name } => {
                self.add_sequence(name);
                Ok(())
            }

            // Patch
            Patch { channel, outputs } => self.patch_outputs(channel, &outputs).map(|_| ()),
            Unpatch { outputs } => {
                self.unpatch_outputs(&outputs);
                Ok(())
            }
            UnpatchFromChannel { channel, output } => {
                self.unpatch_output_from_channel(channel, output)
            }
            ClearChannelPatch { channel } => self.clear_channel_patch(channel).map(|_| ()),
            ClearPatch => {
                self.clear_patch();
                Ok(())
            }
            StraightPatch { universe } => self.straight_patch(universe).map(|_| ()),

            // Hardware
            HardwareConnect { universe, driver } => self.hardware_connect(universe, driver),
            HardwareDisconnect { universe } => self.hardware_disconnect(universe),
        };

        if let Err(err) = &result {
            log::warn!("Command rejected: {}", err);
            self.publish(EngineEvent::Error {
                message: err.to_string(),
            });
        }
        result
    }

    // Level pipeline

    fn apply_group_levels(&mut self, contributions: Vec<ChannelLevel>) {
        for contribution in contributions {
            match self
                .channels
                .on_group_level(contribution.channel, contribution.level)
            {
                Ok(Some(change)) => self.publish_channel(change),
                Ok(None) => {}
                Err(err) => log::warn!("Group contribution dropped: {}", err),
            }
        }
    }

    fn apply_scene_levels(&mut self, contributions: Vec<ChannelLevel>) {
        for contribution in contributions {
            match self
                .channels
                .on_scene_level(contribution.channel, contribution.level)
            {
                Ok(Some(change)) => self.publish_channel(change),
                Ok(None) => {}
                Err(err) => log::warn!("Scene contribution dropped: {}", err),
            }
        }
    }

    /// Publish a composite level change and fan it out to the outputs.
    fn publish_channel(&mut self, change: ChannelLevel) {
        self.publish(EngineEvent::ChannelLevelChanged {
            channel: change.channel,
            level: change.level,
        });
        for written in self.outputs.on_channel_level_changed(&self.patch, change) {
            self.publish_output(written);
        }
    }

    fn publish_output(&mut self, written: OutputLevel) {
        self.publish(EngineEvent::OutputLevelChanged {
            output: written.output,
            level: written.level,
        });
    }

    fn publish_selection(&mut self) {
        let channels = self.channels.selected();
        self.publish(EngineEvent::SelectionChanged { channels });
    }

    fn publish_output_selection(&mut self) {
        let outputs = self.selected_outputs();
        self.publish(EngineEvent::OutputSelectionChanged { outputs });
    }

    fn publish_cue_selected(&mut self) {
        let cue = SceneRef::new(self.cues.main_sequence(), self.cues.selected_cue());
        let step = self.cues.selected_step();
        self.publish(EngineEvent::CueSelected { cue, step });
    }

    /// Levels of the selected channels, for recording.
    fn selected_snapshot(&self) -> Result<Vec<(ChannelId, u8)>> {
        let selected = self.channels.selected();
        if selected.is_empty() {
            return Err(EngineError::NoSelection);
        }
        self.channels.snapshot(&selected)
    }

    // Channel selection

    pub fn select_channels(&mut self, channels: &[ChannelId]) -> Result<()> {
        let changed = self.channels.select(channels)?;
        if !self.output_selection.is_empty() {
            self.output_selection.clear();
            self.publish_output_selection();
        }
        if self.channels.has_selection() {
            self.selection_type = SelectionType::Channel;
        }
        if changed {
            self.publish_selection();
        }
        Ok(())
    }

    pub fn deselect_channels(&mut self, channels: &[ChannelId]) -> Result<()> {
        if self.channels.deselect(channels)? {
            self.publish_selection();
        }
        if !self.channels.has_selection() && self.selection_type == SelectionType::Channel {
            self.selection_type = SelectionType::Unknown;
        }
        Ok(())
    }

    pub fn select_non_null_channels(&mut self) -> Vec<ChannelId> {
        self.output_selection.clear();
        let selected = self.channels.select_non_null_channels();
        self.selection_type = if selected.is_empty() {
            SelectionType::Unknown
        } else {
            SelectionType::Channel
        };
        self.publish_selection();
        selected
    }

    /// Drop both the channel and the output selection.
    pub fn clear_selection(&mut self) {
        if self.channels.clear_selection() {
            self.publish_selection();
        }
        if !self.output_selection.is_empty() {
            self.output_selection.clear();
            self.publish_output_selection();
        }
        self.selection_type = SelectionType::Unknown;
    }

    // Output selection

    pub fn select_outputs(&mut self, outputs: &[OutputId]) -> Result<()> {
        if let Some(unknown) = outputs.iter().find(|o| !self.outputs.contains(**o)) {
            return Err(EngineError::UnknownOutput(*unknown));
        }
        if self.channels.clear_selection() {
            self.publish_selection();
        }
        let before = self.output_selection.len();
        self.output_selection.extend(outputs.iter().copied());
        if !self.output_selection.is_empty() {
            self.selection_type = SelectionType::Output;
        }
        if self.output_selection.len() != before {
            self.publish_output_selection();
        }
        Ok(())
    }

    pub fn deselect_outputs(&mut self, outputs: &[OutputId]) -> Result<()> {
        if let Some(unknown) = outputs.iter().find(|o| !self.outputs.contains(**o)) {
            return Err(EngineError::UnknownOutput(*unknown));
        }
        let before = self.output_selection.len();
        for output in outputs {
            self.output_selection.remove(output);
        }
        if self.output_selection.len() != before {
            self.publish_output_selection();
        }
        if self.output_selection.is_empty() && self.selection_type == SelectionType::Output {
            self.selection_type = SelectionType::Unknown;
        }
        Ok(())
    }

    // Levels

    /// Absolute level on the selection.
    pub fn set_level(&mut self, level: u8) -> Result<()> {
        match self.selection_type {
            SelectionType::Channel => {
                for change in self.channels.set_selected_level(level)? {
                    self.publish_channel(change);
                }
                Ok(())
            }
            SelectionType::Output => {
                for output in self.selected_outputs() {
                    if let Some(written) = self.outputs.set_output_level(output, level)? {
                        self.publish_output(written);
                    }
                }
                Ok(())
            }
            SelectionType::Unknown => Err(EngineError::NoSelection),
        }
    }

    pub fn plus(&mut self) -> Result<()> {
        self.nudge_selection(1)
    }

    pub fn minus(&mut self) -> Result<()> {
        self.nudge_selection(-1)
    }

    fn nudge_selection(&mut self, sign: i32) -> Result<()> {
        match self.selection_type {
            SelectionType::Channel => {
                let increment = sign * self.settings.channel_increment as i32;
                for change in self.channels.nudge_selected(increment)? {
                    self.publish_channel(change);
                }
                Ok(())
            }
            SelectionType::Output => {
                let increment = sign * self.settings.output_increment as i32;
                for output in self.selected_outputs() {
                    if let Some(written) = self.outputs.nudge_output(output, increment)? {
                        self.publish_output(written);
                    }
                }
                Ok(())
            }
            SelectionType::Unknown => Err(EngineError::NoSelection),
        }
    }

    pub fn set_channel_level(&mut self, channel: ChannelId, level: u8) -> Result<()> {
        if let Some(change) = self.channels.set_direct_level(channel, level)? {
            self.publish_channel(change);
        }
        Ok(())
    }

    pub fn set_parked(&mut self, channel: ChannelId, parked: bool) -> Result<()> {
        self.channels.set_parked(channel, parked)?;
        log::info!("Channel {} parked: {}", channel, parked);
        Ok(())
    }

    pub fn set_independent(&mut self, channel: ChannelId, independent: bool) -> Result<()> {
        self.channels.set_independent(channel, independent)?;
        log::info!("Channel {} independent: {}", channel, independent);
        Ok(())
    }

    // Groups

    /// Record the selected channels as a group.
    pub fn record_group(&mut self, group: Option<GroupId>, name: Option<String>) -> Result<GroupId> {
        let snapshot = self.selected_snapshot()?;
        let (group, contributions) = self.groups.record_group(group, name, &snapshot);
        self.apply_group_levels(contributions);
        self.publish(EngineEvent::GroupRecorded { group });
        Ok(group)
    }

    pub fn delete_group(&mut self, group: GroupId) -> Result<()> {
        let contributions = self.groups.delete_group(group)?;
        self.apply_group_levels(contributions);
        self.publish(EngineEvent::GroupDeleted { group });
        Ok(())
    }

    pub fn set_group_level(&mut self, group: GroupId, level: u8) -> Result<()> {
        let contributions = self.groups.set_group_level(group, level)?;
        self.apply_group_levels(contributions);
        self.publish(EngineEvent::GroupLevelChanged { group, level });
        Ok(())
    }

    // Cues

    /// Record the selected channels as a cue, after the selected cue unless a
    /// key is given.
    pub fn record_cue(&mut self, cue: Option<SceneId>, sequence: Option<SequenceId>) -> Result<SceneRef> {
        let snapshot = self.selected_snapshot()?;
        let (recorded, contributions) = self.cues.record_cue(&snapshot, cue, sequence)?;
        self.apply_scene_levels(contributions);
        self.publish(EngineEvent::CueRecorded { cue: recorded });
        if recorded.sequence == self.cues.main_sequence() {
            self.publish_cue_selected();
        }
        Ok(recorded)
    }

    /// Re-record a cue of the main sequence, the selected cue by default, from
    /// its own channels plus the selection.
    pub fn update_cue(&mut self, cue: Option<SceneId>) -> Result<SceneRef> {
        let key = cue.unwrap_or(self.cues.selected_cue());
        let mut members: BTreeSet<ChannelId> = self
            .cues
            .main()
            .scene(key)?
            .channels()
            .keys()
            .copied()
            .collect();
        members.extend(self.channels.selected());

        let ids: Vec<ChannelId> = members.into_iter().collect();
        let snapshot = self.channels.snapshot(&ids)?;
        let (updated, contributions) = self.cues.update_cue(&snapshot, Some(key))?;
        self.apply_scene_levels(contributions);
        self.publish(EngineEvent::CueUpdated { cue: updated });
        Ok(updated)
    }

    pub fn delete_cue(&mut self, cue: Option<SceneId>) -> Result<()> {
        let (deleted, contributions) = self.cues.delete_cue(cue)?;
        self.finish_delete(deleted, contributions);
        Ok(())
    }

    pub fn delete_step(&mut self, step: usize) -> Result<()> {
        let (deleted, contributions) = self.cues.delete_step(step)?;
        self.finish_delete(deleted, contributions);
        Ok(())
    }

    fn finish_delete(&mut self, deleted: SceneRef, contributions: Vec<ChannelLevel>) {
        self.apply_scene_levels(contributions);
        self.publish(EngineEvent::CueDeleted { cue: deleted });
        self.publish_cue_selected();
    }

    pub fn set_time_in(&mut self, time: Duration, cue: Option<SceneId>) -> Result<()> {
        let updated = self.cues.set_time_in(time, cue)?;
        self.publish(EngineEvent::CueUpdated { cue: updated });
        Ok(())
    }

    pub fn set_time_out(&mut self, time: Duration, cue: Option<SceneId>) -> Result<()> {
        let updated = self.cues.set_time_out(time, cue)?;
        self.publish(EngineEvent::CueUpdated { cue: updated });
        Ok(())
    }

    pub fn set_delay_in(&mut self, delay: Duration, cue: Option<SceneId>) -> Result<()> {
        let updated = self.cues.set_delay_in(delay, cue)?;
        self.publish(EngineEvent::CueUpdated { cue: updated });
        Ok(())
    }

    pub fn set_delay_out(&mut self, delay: Duration, cue: Option<SceneId>) -> Result<()> {
        let updated = self.cues.set_delay_out(delay, cue)?;
        self.publish(EngineEvent::CueUpdated { cue: updated });
        Ok(())
    }

    // Playback

    pub fn goto_cue(&mut self, cue: SceneId) -> Result<()> {
        let contributions = self.cues.set_selected_cue(cue)?;
        self.finish_selection(contributions);
        Ok(())
    }

    pub fn goto_step(&mut self, step: usize) -> Result<()> {
        let contributions = self.cues.set_selected_cue_step(step)?;
        self.finish_selection(contributions);
        Ok(())
    }

    pub fn step_plus(&mut self) -> Result<()> {
        let contributions = self.cues.step_plus()?;
        self.finish_selection(contributions);
        Ok(())
    }

    pub fn step_minus(&mut self) -> Result<()> {
        let contributions = self.cues.step_minus()?;
        self.finish_selection(contributions);
        Ok(())
    }

    fn finish_selection(&mut self, contributions: Vec<ChannelLevel>) {
        self.apply_scene_levels(contributions);
        self.publish_cue_selected();
    }

    /// Crossfade to the next cue of the main sequence.
    pub fn go(&mut self) -> Result<()> {
        let start = self.cues.go(&mut self.channels)?;
        self.finish_launch(start);
        Ok(())
    }

    /// Crossfade to the previous cue of the main sequence.
    pub fn go_back(&mut self) -> Result<()> {
        let start = self.cues.go_back(&mut self.channels)?;
        self.finish_launch(start);
        Ok(())
    }

    fn finish_launch(&mut self, start: Vec<ChannelLevel>) {
        self.apply_scene_levels(start);
        if let Some(crossfade) = self.cues.crossfade() {
            let (from, to) = (crossfade.from, crossfade.to);
            self.publish(EngineEvent::CrossfadeStarted { from, to });
        }
    }

    pub fn go_pause(&mut self) -> bool {
        if !self.cues.go_pause() {
            return false;
        }
        if let Some(crossfade) = self.cues.crossfade() {
            let to = crossfade.to;
            self.publish(EngineEvent::CrossfadePaused { to });
        }
        true
    }

    /// Advance playback by `delta`. Returns the cue reached if a crossfade
    /// completed on this tick.
    pub fn tick(&mut self, delta: Duration) -> Option<SceneRef> {
        let tick = self.cues.tick(delta);
        self.apply_scene_levels(tick.levels);
        if let Some(cue) = tick.completed {
            let step = self.cues.selected_step();
            self.publish(EngineEvent::CrossfadeCompleted { cue, step });
            self.publish_cue_selected();
        }
        tick.completed
    }

    pub fn set_main_sequence(&mut self, sequence: SequenceId) -> Result<()> {
        let contributions = self.cues.set_main_sequence(sequence)?;
        self.apply_scene_levels(contributions);
        self.publish(EngineEvent::MainSequenceChanged { sequence });
        self.publish_cue_selected();
        Ok(())
    }

    pub fn add_sequence(&mut self, name: Option<String>) -> SequenceId {
        let sequence = self.cues.add_sequence(name);
        self.publish(EngineEvent::SequenceAdded { sequence });
        sequence
    }

    // Patch

    fn publish_patch(&mut self, channel: ChannelId) {
        let outputs = self.patch.outputs(channel);
        self.publish(EngineEvent::PatchChanged { channel, outputs });
    }

    fn write_output(&mut self, output: OutputId, level: u8) {
        match self.outputs.set_output_level(output, level) {
            Ok(Some(written)) => self.publish_output(written),
            Ok(None) => {}
            Err(err) => log::warn!("{}", err),
        }
    }

    /// Route `output` to `channel` and drive it at the channel's level. An
    /// output owned by another channel is moved.
    pub fn patch_output(&mut self, channel: ChannelId, output: OutputId) -> Result<()> {
        let level = self.channels.level(channel)?;
        if !self.outputs.contains(output) {
            self.outputs.universe(output.universe)?;
            return Err(EngineError::UnknownOutput(output));
        }

        if let Some(previous) = self.patch.add_output(channel, output)? {
            self.publish_patch(previous);
        }
        self.write_output(output, level);
        self.publish_patch(channel);
        Ok(())
    }

    /// Patch several outputs, returning how many succeeded.
    pub fn patch_outputs(&mut self, channel: ChannelId, outputs: &[OutputId]) -> Result<usize> {
        self.channels.channel(channel)?;
        let mut patched = 0;
        for output in outputs {
            match self.patch_output(channel, *output) {
                Ok(()) => patched += 1,
                Err(err) => log::warn!("{}", err),
            }
        }
        Ok(patched)
    }

    /// Unpatch an output from whichever channel drives it. The output goes
    /// to zero.
    pub fn unpatch_output(&mut self, output: OutputId) -> Result<ChannelId> {
        let channel = self.patch.remove_output(output)?;
        self.write_output(output, DMX_NULL);
        self.publish_patch(channel);
        Ok(channel)
    }

    /// Unpatch several outputs, returning how many succeeded.
    pub fn unpatch_outputs(&mut self, outputs: &[OutputId]) -> usize {
        outputs
            .iter()
            .filter(|output| self.unpatch_output(**output).is_ok())
            .count()
    }

    pub fn unpatch_output_from_channel(&mut self, channel: ChannelId, output: OutputId) -> Result<()> {
        self.patch.remove_output_from_channel(channel, output)?;
        self.write_output(output, DMX_NULL);
        self.publish_patch(channel);
        Ok(())
    }

    pub fn clear_channel_patch(&mut self, channel: ChannelId) -> Result<usize> {
        self.channels.channel(channel)?;
        let released = self.patch.clear_channel(channel);
        for output in &released {
            self.write_output(*output, DMX_NULL);
        }
        if !released.is_empty() {
            self.publish_patch(channel);
        }
        Ok(released.len())
    }

    pub fn clear_patch(&mut self) -> usize {
        let channels: Vec<ChannelId> = self.patch.patched_channels().copied().collect();
        let released = self.patch.clear_all();
        for output in &released {
            self.write_output(*output, DMX_NULL);
        }
        for channel in channels {
            self.publish_patch(channel);
        }
        log::info!("Patch cleared ({} outputs)", released.len());
        released.len()
    }

    /// Route channel n to output n of `universe`, for every channel that has
    /// a matching output. Existing routes of those outputs are replaced.
    pub fn straight_patch(&mut self, universe: u16) -> Result<usize> {
        let size = self.outputs.universe(universe)?.levels().len();
        let count = size.min(self.channels.len());

        let mut patched = 0;
        for index in 0..count {
            let channel = ChannelId(index as u16);
            let output = OutputId::new(universe, index as u16);
            match self.patch_output(channel, output) {
                Ok(()) => patched += 1,
                Err(EngineError::AlreadyPatched { .. }) => {}
                Err(err) => log::warn!("{}", err),
            }
        }
        log::info!("Straight patch on universe {}: {} outputs", universe, patched);
        Ok(patched)
    }

    // Hardware

    /// Ask the driver layer to connect `universe`.
    pub fn hardware_connect(&mut self, universe: u16, driver: String) -> Result<()> {
        self.outputs.set_connected(universe, true)?;
        log::info!("Universe {} connect requested ({})", universe, driver);
        self.publish(EngineEvent::Hardware(HardwareRequest::Connect { universe, driver }));
        Ok(())
    }

    pub fn hardware_disconnect(&mut self, universe: u16) -> Result<()> {
        self.outputs.set_connected(universe, false)?;
        log::info!("Universe {} disconnect requested", universe);
        self.publish(EngineEvent::Hardware(HardwareRequest::Disconnect { universe }));
        Ok(())
    }

    /// Frames of the universes written since the last call, for the transport.
    pub fn take_frames(&mut self) -> Vec<(u16, Vec<u8>)> {
        self.outputs.take_dirty_frames()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChannelFlag;

    fn small_settings() -> EngineSettings {
        EngineSettings {
            channel_count: 16,
            outputs_per_universe: 16,
            universe_count: 2,
            ..EngineSettings::default()
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<EngineEvent>) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let settings = EngineSettings {
            channel_count: 0,
            ..EngineSettings::default()
        };
        assert!(matches!(
            LightingEngine::new(settings),
            Err(EngineError::InvalidSettings(_))
        ));
    }

    #[test]
    fn test_straight_patch_at_start() {
        let engine = LightingEngine::new(small_settings()).unwrap();
        assert_eq!(engine.patch().len(), 16);
        assert_eq!(
            engine.patch().outputs(ChannelId(3)),
            vec![OutputId::new(0, 3)]
        );
    }

    #[test]
    fn test_level_reaches_outputs_and_subscribers() {
        let mut engine = LightingEngine::new(small_settings()).unwrap();
        let mut rx = engine.subscribe();
        engine.patch_output(ChannelId(3), OutputId::new(1, 0)).unwrap();
        drain(&mut rx);

        engine.select_channels(&[ChannelId(3)]).unwrap();
        engine.set_level(200).unwrap();

        assert_eq!(engine.outputs().level(OutputId::new(0, 3)), Ok(200));
        assert_eq!(engine.outputs().level(OutputId::new(1, 0)), Ok(200));
        assert_eq!(
            drain(&mut rx),
            vec![
                EngineEvent::SelectionChanged {
                    channels: vec![ChannelId(3)]
                },
                EngineEvent::ChannelLevelChanged {
                    channel: ChannelId(3),
                    level: 200
                },
                EngineEvent::OutputLevelChanged {
                    output: OutputId::new(0, 3),
                    level: 200
                },
                EngineEvent::OutputLevelChanged {
                    output: OutputId::new(1, 0),
                    level: 200
                },
            ]
        );
    }

    #[test]
    fn test_rejected_command_reports_error() {
        let mut engine = LightingEngine::new(small_settings()).unwrap();
        let mut rx = engine.subscribe();

        let result = engine.process_command(EngineCommand::SetLevel { level: 10 });
        assert_eq!(result, Err(EngineError::NoSelection));
        assert_eq!(
            drain(&mut rx),
            vec![EngineEvent::Error {
                message: "nothing is selected".to_string()
            }]
        );
    }

    #[test]
    fn test_closed_subscribers_are_dropped() {
        let mut engine = LightingEngine::new(small_settings()).unwrap();
        let rx = engine.subscribe();
        drop(rx);
        engine.set_channel_level(ChannelId(0), 10).unwrap();
        assert!(engine.subscribers.is_empty());
    }

    #[test]
    fn test_output_selection_drives_outputs_directly() {
        let mut engine = LightingEngine::new(small_settings()).unwrap();
        engine.select_channels(&[ChannelId(1)]).unwrap();
        engine
            .select_outputs(&[OutputId::new(1, 4), OutputId::new(1, 4)])
            .unwrap();
        assert_eq!(engine.selection_type(), SelectionType::Output);
        assert!(engine.channels().selected().is_empty());
        assert_eq!(engine.selected_outputs(), vec![OutputId::new(1, 4)]);

        engine.set_level(250).unwrap();
        engine.plus().unwrap();
        assert_eq!(engine.outputs().level(OutputId::new(1, 4)), Ok(255));
        assert_eq!(engine.channels().level(ChannelId(1)), Ok(0));

        assert_eq!(
            engine.select_outputs(&[OutputId::new(5, 0)]),
            Err(EngineError::UnknownOutput(OutputId::new(5, 0)))
        );
        engine.deselect_outputs(&[OutputId::new(1, 4)]).unwrap();
        assert_eq!(engine.selection_type(), SelectionType::Unknown);
    }

    #[test]
    fn test_plus_and_minus_use_channel_increment() {
        let mut engine = LightingEngine::new(small_settings()).unwrap();
        engine.select_channels(&[ChannelId(2)]).unwrap();
        engine.plus().unwrap();
        engine.plus().unwrap();
        assert_eq!(engine.channels().level(ChannelId(2)), Ok(26));
        engine.minus().unwrap();
        assert_eq!(engine.channels().level(ChannelId(2)), Ok(13));
    }

    #[test]
    fn test_group_master_drives_channels() {
        let mut engine = LightingEngine::new(small_settings()).unwrap();
        engine.select_channels(&[ChannelId(4)]).unwrap();
        engine.set_level(200).unwrap();
        let group = engine.record_group(None, Some("Front".into())).unwrap();
        engine.set_channel_level(ChannelId(4), 0).unwrap();

        engine.set_group_level(group, 128).unwrap();
        assert_eq!(engine.channels().level(ChannelId(4)), Ok(100));
        assert_eq!(
            engine.channels().channel(ChannelId(4)).unwrap().flag(),
            ChannelFlag::ChannelGroup
        );

        engine.delete_group(group).unwrap();
        assert_eq!(engine.channels().level(ChannelId(4)), Ok(0));
        assert!(engine.set_group_level(group, 255).is_err());
    }

    #[test]
    fn test_unpatch_zeroes_output_and_patch_writes_level() {
        let mut engine = LightingEngine::new(small_settings()).unwrap();
        engine.set_channel_level(ChannelId(1), 90).unwrap();
        assert_eq!(engine.outputs().level(OutputId::new(0, 1)), Ok(90));

        assert_eq!(engine.unpatch_output(OutputId::new(0, 1)), Ok(ChannelId(1)));
        assert_eq!(engine.outputs().level(OutputId::new(0, 1)), Ok(0));

        engine.patch_output(ChannelId(1), OutputId::new(1, 9)).unwrap();
        assert_eq!(engine.outputs().level(OutputId::new(1, 9)), Ok(90));

        assert_eq!(
            engine.patch_output(ChannelId(1), OutputId::new(1, 9)),
            Err(EngineError::AlreadyPatched {
                channel: ChannelId(1),
                output: OutputId::new(1, 9)
            })
        );
        assert_eq!(
            engine.patch_output(ChannelId(1), OutputId::new(1, 99)),
            Err(EngineError::UnknownOutput(OutputId::new(1, 99)))
        );
        assert_eq!(
            engine.patch_output(ChannelId(1), OutputId::new(7, 0)),
            Err(EngineError::UnknownUniverse(7))
        );
    }

    #[test]
    fn test_clear_patch() {
        let mut engine = LightingEngine::new(small_settings()).unwrap();
        engine.set_channel_level(ChannelId(0), 50).unwrap();
        assert_eq!(engine.clear_patch(), 16);
        assert!(engine.patch().is_empty());
        assert_eq!(engine.outputs().level(OutputId::new(0, 0)), Ok(0));
        assert_eq!(engine.straight_patch(1), Ok(16));
        assert_eq!(engine.outputs().level(OutputId::new(1, 0)), Ok(50));
    }

    #[test]
    fn test_hardware_requests_are_forwarded() {
        let mut engine = LightingEngine::new(small_settings()).unwrap();
        let mut rx = engine.subscribe();
        engine
            .process_command(EngineCommand::HardwareConnect {
                universe: 1,
                driver: "log".into(),
            })
            .unwrap();
        assert!(engine.outputs().universe(1).unwrap().is_connected());
        assert_eq!(
            drain(&mut rx),
            vec![EngineEvent::Hardware(HardwareRequest::Connect {
                universe: 1,
                driver: "log".into()
            })]
        );
        assert_eq!(
            engine.hardware_disconnect(4),
            Err(EngineError::UnknownUniverse(4))
        );
    }

    #[test]
    fn test_take_frames_reports_written_universes() {
        let mut engine = LightingEngine::new(small_settings()).unwrap();
        engine.take_frames();
        engine.set_channel_level(ChannelId(2), 33).unwrap();
        let frames = engine.take_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].0, 0);
        assert_eq!(frames[0].1[2], 33);
    }
}
