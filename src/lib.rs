/// Host and container telemetry sampler with an embedded web dashboard

pub mod cli;
pub mod core;
pub mod server;
pub mod utils;
