use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cue::CueTiming;
use crate::types::{ChannelId, GroupId, OutputId, SceneId, SceneRef, SequenceId};

/// Commands sent from a control surface to the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    // Channel selection
    SelectChannels {
        channels: Vec<ChannelId>,
    },
    DeselectChannels {
        channels: Vec<ChannelId>,
    },
    SelectNonNullChannels,
    ClearSelection,

    // Output selection
    SelectOutputs {
        outputs: Vec<OutputId>,
    },
    DeselectOutputs {
        outputs: Vec<OutputId>,
    },

    // Levels, applied to the current selection
    SetLevel {
        level: u8,
    },
    Plus,
    Minus,
    SetChannelLevel {
        channel: ChannelId,
        level: u8,
    },
    SetParked {
        channel: ChannelId,
        parked: bool,
    },
    SetIndependent {
        channel: ChannelId,
        independent: bool,
    },

    // Groups
    RecordGroup {
        group: Option<GroupId>,
        name: Option<String>,
    },
    DeleteGroup {
        group: GroupId,
    },
    SetGroupLevel {
        group: GroupId,
        level: u8,
    },

    // Cues
    RecordCue {
        cue: Option<SceneId>,
        sequence: Option<SequenceId>,
    },
    UpdateCue {
        cue: Option<SceneId>,
    },
    DeleteCue {
        cue: Option<SceneId>,
    },
    DeleteStep {
        step: usize,
    },
    SetTimeIn {
        time: Duration,
        cue: Option<SceneId>,
    },
    SetTimeOut {
        time: Duration,
        cue: Option<SceneId>,
    },
    SetDelayIn {
        delay: Duration,
        cue: Option<SceneId>,
    },
    SetDelayOut {
        delay: Duration,
        cue: Option<SceneId>,
    },

    // Playback
    GotoCue {
        cue: SceneId,
    },
    GotoStep {
        step: usize,
    },
    StepPlus,
    StepMinus,
    Go,
    GoBack,
    GoPause,
    SetMainSequence {
        sequence: SequenceId,
    },
    AddSequence {
        name: Option<String>,
    },

    // Patch
    Patch {
        channel: ChannelId,
        outputs: Vec<OutputId>,
    },
    Unpatch {
        outputs: Vec<OutputId>,
    },
    UnpatchFromChannel {
        channel: ChannelId,
        output: OutputId,
    },
    ClearChannelPatch {
        channel: ChannelId,
    },
    ClearPatch,
    StraightPatch {
        universe: u16,
    },

    // Hardware
    HardwareConnect {
        universe: u16,
        driver: String,
    },
    HardwareDisconnect {
        universe: u16,
    },
}

/// Requests forwarded to the driver layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareRequest {
    Connect { universe: u16, driver: String },
    Disconnect { universe: u16 },
}

/// Events sent from the engine to its subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    ChannelLevelChanged {
        channel: ChannelId,
        level: u8,
    },
    SelectionChanged {
        channels: Vec<ChannelId>,
    },
    OutputSelectionChanged {
        outputs: Vec<OutputId>,
    },
    PatchChanged {
        channel: ChannelId,
        outputs: Vec<OutputId>,
    },
    OutputLevelChanged {
        output: OutputId,
        level: u8,
    },

    // Playback
    MainSequenceChanged {
        sequence: SequenceId,
    },
    SequenceAdded {
        sequence: SequenceId,
    },
    CueSelected {
        cue: SceneRef,
        step: usize,
    },
    CueRecorded {
        cue: SceneRef,
    },
    CueUpdated {
        cue: SceneRef,
    },
    CueDeleted {
        cue: SceneRef,
    },
    CrossfadeStarted {
        from: SceneRef,
        to: SceneRef,
    },
    CrossfadePaused {
        to: SceneRef,
    },
    CrossfadeCompleted {
        cue: SceneRef,
        step: usize,
    },

    // Groups
    GroupRecorded {
        group: GroupId,
    },
    GroupDeleted {
        group: GroupId,
    },
    GroupLevelChanged {
        group: GroupId,
        level: u8,
    },

    Hardware(HardwareRequest),
    Error {
        message: String,
    },
}

/// Engine settings, persisted by the config manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    // Console
    pub channel_count: usize,
    pub sequence_count: usize,
    /// Step of the channel +/- keys.
    pub channel_increment: u8,

    // Playback defaults for new cues
    pub default_time_in_secs: f64,
    pub default_time_out_secs: f64,
    pub default_delay_in_secs: f64,
    pub default_delay_out_secs: f64,

    // Output
    pub universe_count: usize,
    pub outputs_per_universe: usize,
    /// Step of the output +/- keys.
    pub output_increment: u8,
    pub tick_rate_hz: f64,
    pub straight_patch: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            // Console defaults
            channel_count: 512,
            sequence_count: 1,
            channel_increment: 13,

            // Playback defaults
            default_time_in_secs: 5.0,
            default_time_out_secs: 5.0,
            default_delay_in_secs: 0.0,
            default_delay_out_secs: 0.0,

            // Output defaults
            universe_count: 1,
            outputs_per_universe: 512,
            output_increment: 13,
            tick_rate_hz: 44.0,
            straight_patch: true,
        }
    }
}

impl EngineSettings {
    /// Timing given to newly recorded cues.
    pub fn default_timing(&self) -> CueTiming {
        CueTiming {
            time_in: secs(self.default_time_in_secs),
            time_out: secs(self.default_time_out_secs),
            delay_in: secs(self.default_delay_in_secs),
            delay_out: secs(self.default_delay_out_secs),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        secs(1.0 / self.tick_rate_hz)
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}
