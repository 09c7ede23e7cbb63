pub mod characters;
pub mod credentials;
pub mod document;
pub mod image;
pub mod llm;
pub mod outline;
pub mod relay;
pub mod session;
pub mod setup;
pub mod workflow;
