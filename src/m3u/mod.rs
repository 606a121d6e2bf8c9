//! M3U/M3U8 handling that does not touch the network: playlist parsing,
//! HLS manifest rewriting and stream kind detection.

pub mod kind;
pub mod parser;
pub mod rewrite;

pub use kind::StreamKind;
pub use parser::{ParsedChannel, parse_playlist};
pub use rewrite::rewrite_manifest;
