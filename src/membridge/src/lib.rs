//! A privileged bridge that copies memory between the address space of a
//! caller and that of another process.
//!
//! Callers send a fixed-size [`protocol::CopyRequest`] tagged with the
//! [`protocol::OP_COPY_MEMORY`] selector. The [`dispatcher::Dispatcher`]
//! validates it, resolves the other process through a [`platform::Host`],
//! and hands the copy to the [`engine::CopyEngine`].

pub mod capabilities;
pub mod cli;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod endpoint;
pub mod engine;
pub mod protocol;
pub mod status;

pub use dispatcher::Dispatcher;
pub use protocol::{CopyRequest, OP_COPY_MEMORY};
pub use status::{Completion, Status};
