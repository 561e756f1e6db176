pub mod attachment;
pub mod chat_stream;
pub mod config;
pub mod constants;
pub mod conversation;
pub mod delta;
pub mod event;
pub mod frame;
pub mod image;
pub mod message;
pub mod orchestrator;
pub mod outcome;
pub mod store;
