pub mod llm_client;
pub mod prediction_client;

pub use llm_client::{ChatBackend, LlmClient};
pub use prediction_client::PredictionClient;
