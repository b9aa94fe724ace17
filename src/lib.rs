//! Serverless collaborative session shared by co-located peers.
//!
//! Each peer keeps its own replica of the roster, counter, chat log, typing
//! set and theme, and converges with the others by gossiping envelopes over a
//! best-effort fan-out [`transport::Transport`].

pub mod client;
pub mod config;
mod connection;
pub mod error;
pub mod identity;
pub mod protocol_objects;
mod push;
pub mod registry;
pub mod session;
mod session_event;
pub mod store;
mod task;
pub mod transport;
pub mod types;
pub mod utils;
