pub mod agent;
pub mod blocker;
pub mod checks;
pub mod config;
pub mod conveyor_config;
pub mod engine;
pub mod errors;
pub mod issue;
pub mod lease;
pub mod logging;
pub mod merge;
pub mod phase;
pub mod session;
pub mod signals;
pub mod store;
pub mod util;
pub mod vcs;
pub mod workspace;

#[cfg(test)]
mod testing;
