//! eventpipe: broker-backed event ingestion.
//!
//! Events accepted over HTTP are published to a broker topic. A background
//! pipeline consumes the topic, persists each event and fans it out to live
//! stream subscribers.

pub mod bus;
pub mod config;
pub mod event;
pub mod handlers;
pub mod pipeline;
pub mod runtime;
pub mod storage;
pub mod utils;
