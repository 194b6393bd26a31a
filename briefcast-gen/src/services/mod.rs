//! Pipeline services
//!
//! One focused module per collaborator or pipeline stage.

pub mod classifier;
pub mod enricher;
pub mod fetcher;
pub mod llm_client;
pub mod mixer;
pub mod prompt;
pub mod publisher;
pub mod script_parser;
pub mod subprocess;
pub mod synthesis;
pub mod tts_client;
