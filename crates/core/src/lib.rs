pub use channel::{Channel, ChannelRegistry};
pub use config::{ConfigError, ConfigManager, ConfigSchema};
pub use cue::{CueEngine, CueTick, CueTiming, Scene, Sequence};
pub use engine::{LightingEngine, SelectionType};
pub use error::{EngineError, Result};
pub use group::{ChannelGroup, Contribution, GroupEngine};
pub use messages::{EngineCommand, EngineEvent, EngineSettings, HardwareRequest};
pub use output::{
    DmxDriver, DmxTransport, DriverRegistry, LogDriver, MemoryDriver, OutputEngine,
    TransportMessage,
};
pub use patch::{MultiMap, PatchTable};
pub use types::{
    scale_level, ChannelFlag, ChannelId, ChannelLevel, GroupId, OutputId, OutputLevel, SceneId,
    SceneRef, SequenceId, DMX_MAX, DMX_NULL,
};

pub mod channel;
mod config;
pub mod cue;
mod engine;
mod error;
pub mod group;
pub mod messages;
pub mod output;
pub mod patch;
mod types;
