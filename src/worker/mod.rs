pub mod aggregator;
pub mod protocol;
pub mod supervisor;

pub use aggregator::{BacktestResult, IndicatorSeries, ResultAggregator};
pub use protocol::{IndicatorResultMessage, WorkerEmitter, WorkerLine, WorkerMessage};
pub use supervisor::{run_worker, STDERR_TAIL_LINES};
