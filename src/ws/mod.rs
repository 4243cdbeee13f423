//! WebSocket transport: wire protocol, session handler, and fan-out

pub mod fanout;
pub mod handler;
pub mod protocol;
