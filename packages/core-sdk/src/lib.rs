pub mod config;
pub mod error;
pub mod models;
pub mod pipe;
pub mod server;
pub mod sse;
pub mod telemetry;

/**
 * \brief SDK 预导入集合，方便外部引用常用类型。
 */
pub mod prelude {
    pub use crate::config::{PipeConfig, Valves};
    pub use crate::error::PipeError;
    pub use crate::models::{ChatRequest, ChatResponse, Message, ModelDescriptor, TextStream};
    pub use crate::pipe::{OpenRouterPipe, Pipe};
    pub use crate::server;
    pub use crate::telemetry;
}
