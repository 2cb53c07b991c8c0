//! Generative-AI boundary
//!
//! Normalized content, upstream error classification, the interaction
//! logger and the gateway that runs calls on the primary path.

pub mod backend;
pub mod content;
pub mod gateway;
pub mod logger;
pub mod upstream;

pub use backend::HttpBackend;
pub use content::AiContent;
pub use gateway::{AiBackend, AiGateway, AiResponse, BackendResponse, CallContext, UnconfiguredBackend};
pub use logger::{InteractionLogger, InteractionRecord};
pub use upstream::{classify_upstream, UpstreamCategory, UpstreamError};
