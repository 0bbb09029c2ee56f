use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Lowest DMX level.
pub const DMX_NULL: u8 = 0;
/// Highest DMX level.
pub const DMX_MAX: u8 = 255;

/// Logical channel identifier (0-based).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub u16);

/// Channel group (submaster) identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupId(pub u16);

/// Sequence identifier, also its index in the cue engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceId(pub u16);

/// Continuous cue key. A new cue can be slotted between 1 and 2 as 1.5
/// without renumbering the rest of the sequence.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SceneId(pub f64);

/// One physical output slot: universe plus output index within it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutputId {
    pub universe: u16,
    pub output: u16,
}

impl OutputId {
    pub fn new(universe: u16, output: u16) -> Self {
        Self { universe, output }
    }
}

/// A cue addressed inside a particular sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SceneRef {
    pub sequence: SequenceId,
    pub scene: SceneId,
}

impl SceneRef {
    pub fn new(sequence: SequenceId, scene: SceneId) -> Self {
        Self { sequence, scene }
    }
}

/// Records which source currently owns a channel's composite level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChannelFlag {
    SelectedScene,
    DirectChannel,
    ChannelGroup,
    /// Frozen: ignores playback and group contributions.
    Parked,
    /// Runs outside of playback: ignores playback and group contributions.
    Independent,
    #[default]
    Unknown,
}

impl ChannelFlag {
    /// Parked and independent channels are left out of bulk selection and
    /// playback.
    pub fn is_opted_out(self) -> bool {
        matches!(self, ChannelFlag::Parked | ChannelFlag::Independent)
    }
}

/// A channel's composite level after a change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelLevel {
    pub channel: ChannelId,
    pub level: u8,
}

impl ChannelLevel {
    pub fn new(channel: ChannelId, level: u8) -> Self {
        Self { channel, level }
    }
}

/// A level written to one physical output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputLevel {
    pub output: OutputId,
    pub level: u8,
}

impl OutputLevel {
    pub fn new(output: OutputId, level: u8) -> Self {
        Self { output, level }
    }
}

/// Fold `later` into `changes`, keeping the last level seen per channel and
/// the position of its first appearance.
pub(crate) fn merge_levels(changes: &mut Vec<ChannelLevel>, later: impl IntoIterator<Item = ChannelLevel>) {
    for change in later {
        match changes.iter_mut().find(|c| c.channel == change.channel) {
            Some(existing) => existing.level = change.level,
            None => changes.push(change),
        }
    }
}

/// Scale a stored level by a master level: `round(master / 255 * stored)`.
pub fn scale_level(master: u8, stored: u8) -> u8 {
    ((master as f32 / DMX_MAX as f32) * stored as f32).round() as u8
}

impl PartialEq for SceneId {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SceneId {}

impl PartialOrd for SceneId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SceneId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl std::hash::Hash for SceneId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.universe, self.output)
    }
}
