//! # cbridge-core - Core Domain Types
//!
//! Foundation crate for the companion bridge. Provides the error taxonomy,
//! logging setup and the display-mode codec.
//!
//! This crate has **zero internal dependencies**.
//!
//! ## Public API
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Closed error enum with `recoverable` vs `permanent` classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ### Display Modes (`display_mode`)
//! - [`DisplayMode`] - Width, height and refresh rate reported by a host
//! - [`first_active_display_mode()`] - Resolve a server-info document to one mode
//! - [`FALLBACK_DISPLAY_MODE`] - 1920x1080@60, used when nothing else is usable
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use cbridge_core::prelude::*;
//! ```

pub mod display_mode;
pub mod error;
pub mod logging;

/// Prelude for common imports used throughout all bridge crates
pub mod prelude {
    pub use super::error::{Error, Result, ResultExt};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

pub use display_mode::{
    first_active_display_mode, primary_display_mode, supported_display_modes, DisplayMode,
    FALLBACK_DISPLAY_MODE,
};
pub use error::{Error, Result, ResultExt};
