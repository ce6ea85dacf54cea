pub mod chat_stream;
pub mod client;
pub mod config;
pub mod conversation;
pub mod frame_decoder;
pub mod keyring;
