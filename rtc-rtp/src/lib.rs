#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod extension;
pub mod header;
pub mod packet;

pub use extension::{ExtensionMap, HeaderExtension};
pub use header::Header;
pub use packet::Packet;
