//! flexgpt is a terminal client for the FlexGPT chat backend.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`api`] defines the wire types exchanged with the backend, including the
//!   event-stream [`api::Frame`].
//! - [`core`] owns the streaming path: the incremental frame decoder, the
//!   session initiator that opens `chat/send`, the channel-based stream
//!   service, the request/response client, and conversation state.
//! - [`auth`] keeps the access token in the system keyring and gates
//!   authenticated commands.
//! - [`cli`] parses arguments and drives one-shot and interactive chats.
//! - [`utils`] holds URL handling and logging setup.
//!
//! The binary (`src/main.rs`) routes straight into [`crate::cli::main`].

pub mod api;
pub mod auth;
pub mod cli;
pub mod core;
pub mod utils;
