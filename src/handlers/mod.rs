//! Delivery surfaces: live fan-out and the HTTP API.

pub mod fanout;
pub mod http;
