//! Configuration file parsing for the companion bridge
//!
//! Reads `config.toml` from the platform config directory
//! (`~/.config/companion-bridge/` on Linux) or an explicit path.

pub mod settings;
pub mod types;

pub use settings::{default_config_path, init_config_file, load_config, load_config_from};
pub use types::*;
