pub mod channel_group;
pub mod group_engine;

pub use channel_group::ChannelGroup;
pub use group_engine::{Contribution, GroupEngine};
