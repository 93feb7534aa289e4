pub mod context;
pub mod events;
pub mod latch;
pub mod method;
pub mod status;
pub mod strategy;

pub use context::{IndicatorOptions, MethodContext};
pub use events::{AdviceEvent, EventReceiver, EventSender, IndicatorResultEvent, PipelineEvent};
pub use latch::TickLatch;
pub use method::TradingMethod;
pub use status::{Phase, PipelineStatus, StatusHandle};
pub use strategy::Strategy;
