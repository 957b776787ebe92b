mod async_batch;
mod batch;
mod debug;
mod logging;

pub use async_batch::AsyncBatchConsumer;
pub use batch::BatchConsumer;
pub use debug::DebugConsumer;
pub use logging::LoggingConsumer;
