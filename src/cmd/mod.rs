//! CLI command implementations.
//!
//! | Module   | Commands handled        |
//! |----------|-------------------------|
//! | `run`    | `Phase`, `Tick`         |
//! | `status` | `Status`, `Phases`      |
//! | `config` | `Config`                |

pub mod config;
pub mod run;
pub mod status;

pub use config::cmd_config;
pub use run::{cmd_phase, cmd_tick};
pub use status::{cmd_phases, cmd_status};
