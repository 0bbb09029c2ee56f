use thiserror::Error;

use crate::types::{ChannelId, GroupId, OutputId, SceneId, SequenceId};

/// Reasons an engine command is rejected. A rejected command leaves engine
/// state untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("unknown channel {0}")]
    UnknownChannel(ChannelId),

    #[error("unknown output {0}")]
    UnknownOutput(OutputId),

    #[error("unknown universe {0}")]
    UnknownUniverse(u16),

    #[error("unknown group {0}")]
    UnknownGroup(GroupId),

    #[error("unknown sequence {0}")]
    UnknownSequence(SequenceId),

    #[error("no cue {scene} in sequence {sequence}")]
    UnknownScene { sequence: SequenceId, scene: SceneId },

    #[error("no cue at step {step} in sequence {sequence}")]
    UnknownStep { sequence: SequenceId, step: usize },

    #[error("output {output} is already patched to channel {channel}")]
    AlreadyPatched { channel: ChannelId, output: OutputId },

    #[error("output {0} is not patched")]
    NotPatched(OutputId),

    #[error("output {output} is not patched to channel {channel}")]
    NotPatchedToChannel { channel: ChannelId, output: OutputId },

    #[error("channel {channel} is already a member of group {group}")]
    DuplicateMember { group: GroupId, channel: ChannelId },

    #[error("invalid cue number {0}")]
    InvalidScene(SceneId),

    #[error("cue {scene} already exists in sequence {sequence}")]
    DuplicateScene { sequence: SequenceId, scene: SceneId },

    #[error("nothing is selected")]
    NoSelection,

    #[error("no cue after the selected cue in sequence {0}")]
    NoNextScene(SequenceId),

    #[error("no cue before the selected cue in sequence {0}")]
    NoPreviousScene(SequenceId),

    #[error("sequence {0} must keep at least one cue")]
    LastScene(SequenceId),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
