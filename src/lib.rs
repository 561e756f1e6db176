//! Sehat is a streaming chat client for health questions asked in plain
//! language, with optional images.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the streaming pipeline (frame splitting, event decoding,
//!   delta extraction), the conversation transcript and its store, and the
//!   request orchestrator that ties them to the network.
//! - [`api`] defines the chat payloads sent to the completion endpoint.
//! - [`auth`] supplies bearer tokens from the environment or the system
//!   keyring.
//! - [`cli`] parses arguments and drives the interactive and one-shot
//!   front ends.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod auth;
pub mod cli;
pub mod core;
pub mod utils;
