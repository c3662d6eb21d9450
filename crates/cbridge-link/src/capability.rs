//! Haptics routing decision.
//!
//! Haptics go over the companion link only when an eligible controller is
//! attached and the companion reports both haptics and manual vibration
//! support at a recent enough capability version. A caller that prefers
//! local delivery keeps haptics local whenever the controller already has
//! working vibration motors.

use cbridge_core::prelude::*;

use crate::hardware::LocalHardware;
use crate::metadata::MetadataSource;
use crate::MIN_CAPABILITY_VERSION;

/// Everything the routing decision depends on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilityInputs {
    pub eligible_device_attached: bool,
    pub local_vibrators: usize,
    pub haptics_supported: bool,
    pub manual_vibration_supported: bool,
    pub capability_version: i64,
}

/// Decide whether haptics should be routed to the companion.
pub fn should_route_haptics(inputs: &CapabilityInputs, prioritize_remote: bool) -> bool {
    if !inputs.eligible_device_attached {
        return false;
    }
    if !prioritize_remote && inputs.local_vibrators > 0 {
        return false;
    }
    inputs.haptics_supported
        && inputs.manual_vibration_supported
        && inputs.capability_version >= MIN_CAPABILITY_VERSION
}

/// Collect inputs from the local hardware and the companion's metadata.
pub async fn gather<M, H>(metadata: &M, hardware: &H) -> CapabilityInputs
where
    M: MetadataSource + Sync,
    H: LocalHardware + ?Sized,
{
    let device = hardware.eligible_device();
    CapabilityInputs {
        eligible_device_attached: device.is_some(),
        local_vibrators: device.map_or(0, |d| d.vibrator_count),
        haptics_supported: metadata.is_haptics_supported().await == Some(true),
        manual_vibration_supported: metadata.is_manual_vibration_supported().await == Some(true),
        capability_version: metadata.capability_version().await.unwrap_or(0),
    }
}

/// Gather inputs and decide.
pub async fn evaluate<M, H>(metadata: &M, hardware: &H, prioritize_remote: bool) -> bool
where
    M: MetadataSource + Sync,
    H: LocalHardware + ?Sized,
{
    let inputs = gather(metadata, hardware).await;
    let route = should_route_haptics(&inputs, prioritize_remote);
    debug!(
        "Haptics routing: remote={} prioritize_remote={} inputs={:?}",
        route, prioritize_remote, inputs
    );
    route
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::ELIGIBLE_VENDOR_ID;
    use crate::test_utils::{FakeMetadata, StaticHardware};

    fn ready() -> CapabilityInputs {
        CapabilityInputs {
            eligible_device_attached: true,
            local_vibrators: 0,
            haptics_supported: true,
            manual_vibration_supported: true,
            capability_version: MIN_CAPABILITY_VERSION,
        }
    }

    #[test]
    fn test_all_conditions_met() {
        assert!(should_route_haptics(&ready(), true));
        assert!(should_route_haptics(&ready(), false));
    }

    #[test]
    fn test_each_condition_is_required() {
        let no_device = CapabilityInputs {
            eligible_device_attached: false,
            ..ready()
        };
        let no_haptics = CapabilityInputs {
            haptics_supported: false,
            ..ready()
        };
        let no_manual = CapabilityInputs {
            manual_vibration_supported: false,
            ..ready()
        };
        let old_version = CapabilityInputs {
            capability_version: MIN_CAPABILITY_VERSION - 1,
            ..ready()
        };
        for inputs in [no_device, no_haptics, no_manual, old_version] {
            assert!(!should_route_haptics(&inputs, true), "{inputs:?}");
        }
    }

    #[test]
    fn test_local_preference_with_working_motors() {
        let with_motors = CapabilityInputs {
            local_vibrators: 2,
            ..ready()
        };
        assert!(!should_route_haptics(&with_motors, false));
        assert!(should_route_haptics(&with_motors, true));
    }

    #[tokio::test]
    async fn test_evaluate_reads_metadata_and_hardware() {
        let hardware = StaticHardware::single(ELIGIBLE_VENDOR_ID, 0x0037, 0);
        assert!(evaluate(&FakeMetadata::haptics_ready(), &hardware, true).await);
        assert!(!evaluate(&FakeMetadata::running(), &hardware, true).await);
        assert!(!evaluate(&FakeMetadata::haptics_ready(), &StaticHardware::default(), true).await);
    }
}
