//! Typed settings keys.
//!
//! Every persisted preference has one [`SettingKey`] constant carrying its
//! storage name and default. Keys under a reserved prefix (`bridge`,
//! `companion`) are authoritative locally and never accept external writes.

use std::collections::BTreeSet;
use std::fmt;

use cbridge_core::{DisplayMode, FALLBACK_DISPLAY_MODE};

use super::SettingValue;

/// Conversion between a Rust type and its stored [`SettingValue`].
pub trait SettingType: Sized {
    fn from_setting(value: &SettingValue) -> Option<Self>;

    fn to_setting(&self) -> SettingValue;
}

/// A named setting with a typed default.
pub struct SettingKey<T> {
    pub name: &'static str,
    default: fn() -> T,
}

impl<T> SettingKey<T> {
    pub const fn new(name: &'static str, default: fn() -> T) -> Self {
        Self { name, default }
    }

    pub fn default_value(&self) -> T {
        (self.default)()
    }
}

impl<T> fmt::Debug for SettingKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SettingKey").field(&self.name).finish()
    }
}

// ─────────────────────────────────────────────────────────────────
// Keys
// ─────────────────────────────────────────────────────────────────

/// When the local store last pulled the companion's settings (epoch millis).
pub const LAST_SYNC_AT: SettingKey<i64> = SettingKey::new("bridge_last_sync_at", || 0);

/// When the bridge was last used (epoch millis).
pub const LAST_ACTIVE_AT: SettingKey<i64> = SettingKey::new("bridge_last_active_at", || 0);

/// When the companion was last used (epoch millis), as published by the companion.
pub const COMPANION_LAST_ACTIVE_AT: SettingKey<i64> =
    SettingKey::new("companion_last_active_at", || 0);

pub const TOS_ACCEPTED: SettingKey<bool> = SettingKey::new("bridge_tos_accepted", || false);

pub const OOBE_COMPLETED: SettingKey<bool> = SettingKey::new("bridge_oobe_completed", || false);

pub const COMPLETED_OOBE_STEPS: SettingKey<BTreeSet<String>> =
    SettingKey::new("bridge_completed_oobe_steps", BTreeSet::new);

pub const DEV_MODE: SettingKey<bool> = SettingKey::new("bridge_dev_mode", || false);

pub const APP_THEME: SettingKey<AppTheme> =
    SettingKey::new("bridge_app_theme_type", AppTheme::default);

pub const DISPLAY_MODE_OPTION: SettingKey<DisplayModeOption> =
    SettingKey::new("display_mode_option_v2", DisplayModeOption::default);

pub const SEPARATE_SCREEN_DISPLAY: SettingKey<bool> =
    SettingKey::new("separate_screen_display", || false);

/// Seconds before a running game is closed automatically.
pub const AUTO_CLOSE_COUNTDOWN_SEC: SettingKey<i32> =
    SettingKey::new("auto_close_running_game_countdown_sec", || 30);

/// Hosts the user unpaired by hand; they are not re-paired automatically.
pub const MANUALLY_UNPAIRED_HOSTS: SettingKey<BTreeSet<String>> =
    SettingKey::new("manually_unpaired_computers_v2", BTreeSet::new);

/// Display mode chosen for streaming, stored as JSON.
pub const PREFERRED_DISPLAY_MODE: SettingKey<DisplayMode> =
    SettingKey::new("preferred_display_mode", || FALLBACK_DISPLAY_MODE);

// ─────────────────────────────────────────────────────────────────
// Enums
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppTheme {
    #[default]
    Brand,
    System,
    Light,
    Dark,
}

impl AppTheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppTheme::Brand => "Brand",
            AppTheme::System => "System",
            AppTheme::Light => "Light",
            AppTheme::Dark => "Dark",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Brand" => Some(AppTheme::Brand),
            "System" => Some(AppTheme::System),
            "Light" => Some(AppTheme::Light),
            "Dark" => Some(AppTheme::Dark),
            _ => None,
        }
    }
}

/// How the stream is laid out across the host and the phone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayModeOption {
    /// Mirror the host's display.
    Duplicate,
    /// Stream to a second virtual display next to the host's own.
    Separate,
    /// Stream to a virtual display only the phone shows.
    #[default]
    PhoneOnly,
}

impl DisplayModeOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayModeOption::Duplicate => "PcDisplay",
            DisplayModeOption::Separate => "SeparateDisplay",
            DisplayModeOption::PhoneOnly => "PhoneOnlyDisplay",
        }
    }

    /// Parse a stored name, including names written by older versions.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "PcDisplay" => Some(DisplayModeOption::Duplicate),
            "SeparateDisplay" => Some(DisplayModeOption::Separate),
            "PhoneOnlyDisplay" | "VirtualDisplay" => Some(DisplayModeOption::PhoneOnly),
            _ => None,
        }
    }

    pub fn uses_virtual_display(&self) -> bool {
        !matches!(self, DisplayModeOption::Duplicate)
    }
}

// ─────────────────────────────────────────────────────────────────
// SettingType impls
// ─────────────────────────────────────────────────────────────────

impl SettingType for bool {
    fn from_setting(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn to_setting(&self) -> SettingValue {
        SettingValue::Bool(*self)
    }
}

impl SettingType for i32 {
    fn from_setting(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::Int(i) => Some(*i),
            SettingValue::Long(l) => i32::try_from(*l).ok(),
            _ => None,
        }
    }

    fn to_setting(&self) -> SettingValue {
        SettingValue::Int(*self)
    }
}

impl SettingType for i64 {
    fn from_setting(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::Long(l) => Some(*l),
            SettingValue::Int(i) => Some(i64::from(*i)),
            _ => None,
        }
    }

    fn to_setting(&self) -> SettingValue {
        SettingValue::Long(*self)
    }
}

impl SettingType for f32 {
    fn from_setting(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    fn to_setting(&self) -> SettingValue {
        SettingValue::Float(*self)
    }
}

impl SettingType for String {
    fn from_setting(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    fn to_setting(&self) -> SettingValue {
        SettingValue::String(self.clone())
    }
}

/// Stored as one comma-joined string; an empty string is an empty set.
impl SettingType for BTreeSet<String> {
    fn from_setting(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::String(s) => Some(
                s.split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
            _ => None,
        }
    }

    fn to_setting(&self) -> SettingValue {
        let joined: Vec<&str> = self.iter().map(String::as_str).collect();
        SettingValue::String(joined.join(","))
    }
}

impl SettingType for AppTheme {
    fn from_setting(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::String(s) => AppTheme::from_name(s),
            _ => None,
        }
    }

    fn to_setting(&self) -> SettingValue {
        SettingValue::String(self.as_str().to_string())
    }
}

impl SettingType for DisplayModeOption {
    fn from_setting(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::String(s) => DisplayModeOption::from_name(s),
            _ => None,
        }
    }

    fn to_setting(&self) -> SettingValue {
        SettingValue::String(self.as_str().to_string())
    }
}

impl SettingType for DisplayMode {
    fn from_setting(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::String(s) => DisplayMode::from_json(s),
            _ => None,
        }
    }

    fn to_setting(&self) -> SettingValue {
        SettingValue::String(self.to_json().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(AUTO_CLOSE_COUNTDOWN_SEC.default_value(), 30);
        assert_eq!(APP_THEME.default_value(), AppTheme::Brand);
        assert_eq!(
            DISPLAY_MODE_OPTION.default_value(),
            DisplayModeOption::PhoneOnly
        );
        assert!(MANUALLY_UNPAIRED_HOSTS.default_value().is_empty());
        assert_eq!(PREFERRED_DISPLAY_MODE.default_value(), FALLBACK_DISPLAY_MODE);
    }

    #[test]
    fn test_legacy_display_mode_name() {
        assert_eq!(
            DisplayModeOption::from_name("VirtualDisplay"),
            Some(DisplayModeOption::PhoneOnly)
        );
        assert_eq!(DisplayModeOption::PhoneOnly.as_str(), "PhoneOnlyDisplay");
        assert!(!DisplayModeOption::Duplicate.uses_virtual_display());
        assert!(DisplayModeOption::Separate.uses_virtual_display());
        assert_eq!(DisplayModeOption::from_name("Hologram"), None);
    }

    #[test]
    fn test_string_set_encoding() {
        let empty = SettingValue::String(String::new());
        assert_eq!(BTreeSet::<String>::from_setting(&empty), Some(BTreeSet::new()));

        let hosts = SettingValue::String("b-host, a-host,,".to_string());
        let set = BTreeSet::<String>::from_setting(&hosts).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(
            set.to_setting(),
            SettingValue::String("a-host,b-host".to_string())
        );
    }

    #[test]
    fn test_int_and_long_widen() {
        assert_eq!(i64::from_setting(&SettingValue::Int(7)), Some(7));
        assert_eq!(i32::from_setting(&SettingValue::Long(7)), Some(7));
        assert_eq!(i32::from_setting(&SettingValue::Long(i64::MAX)), None);
        assert_eq!(bool::from_setting(&SettingValue::Int(1)), None);
    }

    #[test]
    fn test_display_mode_round_trip() {
        let mode = DisplayMode::new(2560, 1440, 120);
        assert_eq!(DisplayMode::from_setting(&mode.to_setting()), Some(mode));
    }
}
