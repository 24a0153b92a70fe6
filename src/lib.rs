//! Deepchat is a terminal chat client for the DeepSeek completion API.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the session registry, the configuration snapshot, and
//!   the conversation engine that orchestrates every user-visible
//!   operation, including the completion exchange.
//! - [`api`] defines the completion wire payloads and the gateway that
//!   performs the single request/response exchange with the remote API.
//! - [`cli`] parses command-line arguments and runs the interactive
//!   chat shell.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and
//! route through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
