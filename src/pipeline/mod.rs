//! Interceptor chain the host message pipeline drives, and the hooks the
//! reliability layer installs on it.

pub mod chain;
pub mod dispatch;
pub mod hooks;
pub mod layer;

pub use chain::InterceptorChain;
pub use dispatch::{ChannelCommandSink, CommandDispatcher, CommandSink, QueuedCommand};
pub use hooks::{OutboundMessage, PostResponseHook, PreDeliveryHook, PreRequestHook};
pub use layer::{ReliabilityLayer, ReliabilityLayerBuilder};
