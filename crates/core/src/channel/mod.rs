pub mod channel;
pub mod channel_registry;

pub use channel::Channel;
pub use channel_registry::ChannelRegistry;
