pub mod events;
pub mod registry;
pub mod traits;

pub use events::{sink_from_config, spawn_forwarder, ChannelEventSink, LogEventSink, NullEventSink};
pub use registry::{RegistryFile, ShareholderRecord, StaticDirectory};
pub use traits::{EventSink, SecurityDirectory, ShareholderDirectory, SplitConfigSource};
