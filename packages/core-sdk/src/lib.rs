pub mod codegen;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod registry;
pub mod server;
pub mod session;
pub mod telemetry;
pub mod widget;

/**
 * \brief SDK 预导入集合，方便外部引用常用模块。
 */
pub mod prelude {
    pub use crate::codegen;
    pub use crate::config::Config;
    pub use crate::error::{SessionError, ValidationError};
    pub use crate::llm;
    pub use crate::models::{AIModel, ButtonStyle, ConnectionMode, Message, ModelDraft, Provider};
    pub use crate::registry;
    pub use crate::server;
    pub use crate::session::Session;
    pub use crate::telemetry;
}
