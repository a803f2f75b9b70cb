//! Agent module - LLM client and the gateway every stage calls through

pub mod gateway;
pub mod llm;

pub use gateway::{GatewayRequest, LlmGateway, OpenRouterGateway, ScriptedGateway, SharedGateway};
pub use llm::OpenRouterClient;
