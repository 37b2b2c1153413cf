pub mod chunk_plan;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod failure;
pub mod job;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod result;
pub mod session;
pub mod sink;
pub mod util;
pub mod worker;
