//! Local controller inspection.
//!
//! One physical controller usually shows up as several input nodes; the
//! node with the most force-feedback effects is the one that represents its
//! vibration motors.

/// USB vendor id of controllers the companion can drive.
pub const ELIGIBLE_VENDOR_ID: u16 = 0x1532;

/// An input device node as seen by the local OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInputDevice {
    pub name: String,
    pub vendor_id: u16,
    pub product_id: u16,
    /// Number of vibration effects the OS can drive directly.
    pub vibrator_count: usize,
}

impl LocalInputDevice {
    pub fn is_eligible(&self) -> bool {
        self.vendor_id == ELIGIBLE_VENDOR_ID
    }

    fn same_hardware(&self, other: &LocalInputDevice) -> bool {
        self.vendor_id == other.vendor_id && self.product_id == other.product_id
    }
}

pub trait LocalHardware: Send + Sync {
    /// All input device nodes currently attached.
    fn input_devices(&self) -> Vec<LocalInputDevice>;

    /// The first attached eligible controller, represented by its node with
    /// the most vibrators.
    fn eligible_device(&self) -> Option<LocalInputDevice> {
        let devices = self.input_devices();
        let first = devices.iter().find(|d| d.is_eligible())?;
        devices
            .iter()
            .filter(|d| d.same_hardware(first))
            .max_by_key(|d| d.vibrator_count)
            .cloned()
    }
}

/// Hardware view for platforms without input inspection.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHardware;

impl LocalHardware for NoHardware {
    fn input_devices(&self) -> Vec<LocalInputDevice> {
        Vec::new()
    }
}

/// Enumerates `/dev/input/event*` through evdev.
///
/// Nodes we lack permission to open are skipped silently.
#[cfg(target_os = "linux")]
#[derive(Debug, Clone, Copy, Default)]
pub struct EvdevHardware;

#[cfg(target_os = "linux")]
impl LocalHardware for EvdevHardware {
    fn input_devices(&self) -> Vec<LocalInputDevice> {
        evdev::enumerate()
            .map(|(path, device)| {
                let id = device.input_id();
                let vibrator_count = device.supported_ff().map_or(0, |ff| ff.iter().count());
                tracing::trace!(
                    device_path = %path.display(),
                    name = ?device.name(),
                    vibrator_count,
                    "Found input device"
                );
                LocalInputDevice {
                    name: device.name().unwrap_or("unknown").to_string(),
                    vendor_id: id.vendor(),
                    product_id: id.product(),
                    vibrator_count,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<LocalInputDevice>);

    impl LocalHardware for Fixed {
        fn input_devices(&self) -> Vec<LocalInputDevice> {
            self.0.clone()
        }
    }

    fn device(vendor_id: u16, product_id: u16, vibrator_count: usize) -> LocalInputDevice {
        LocalInputDevice {
            name: format!("{vendor_id:04x}:{product_id:04x}"),
            vendor_id,
            product_id,
            vibrator_count,
        }
    }

    #[test]
    fn test_no_eligible_device() {
        let hw = Fixed(vec![device(0x045e, 0x0b13, 2)]);
        assert!(hw.eligible_device().is_none());
        assert!(NoHardware.eligible_device().is_none());
    }

    #[test]
    fn test_picks_node_with_most_vibrators() {
        let hw = Fixed(vec![
            device(0x045e, 0x0b13, 4),
            device(ELIGIBLE_VENDOR_ID, 0x0037, 0),
            device(ELIGIBLE_VENDOR_ID, 0x0037, 2),
            device(ELIGIBLE_VENDOR_ID, 0x0099, 8),
        ]);
        let picked = hw.eligible_device().unwrap();
        assert_eq!(picked.product_id, 0x0037);
        assert_eq!(picked.vibrator_count, 2);
    }
}
