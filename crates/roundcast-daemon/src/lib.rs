//! roundcast daemon: polls a rendered prediction page, dedups rounds, and
//! fans live updates out to WebSocket subscribers.

pub mod chrome;
pub mod poll_loop;
pub mod snapshot;
pub mod store;
pub mod ws_server;
