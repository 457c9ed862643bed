//! 运行遥测：事件类型、单运行广播通道、带回放的订阅

pub mod channel;
pub mod event;
pub mod subscription;

pub use channel::TelemetryChannel;
pub use event::{SequencedEvent, TelemetryEvent};
pub use subscription::Subscription;
