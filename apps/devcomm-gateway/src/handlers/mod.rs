//! Handlers 模块

pub mod adapters;
pub mod health;
pub mod metrics;
pub mod push;

pub use adapters::*;
pub use health::*;
pub use metrics::*;
pub use push::*;
