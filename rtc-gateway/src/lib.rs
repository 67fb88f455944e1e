#![warn(rust_2018_idioms)]

pub mod codec;
pub mod config;
pub mod dtls;
pub mod ice;
pub mod model;
pub mod pipeline;
pub mod plugin;
pub mod retransmit;
pub mod rewrite;
pub mod rtcp_context;
pub mod scheduler;
pub mod skew;
pub mod srtp;
pub mod state;
pub mod stats;

pub use model::{Component, Handle, MediaLane, Session, SessionRegistry, Stream};
pub use state::StateFlags;
