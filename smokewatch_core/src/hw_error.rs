//! Maps `Box<dyn Error>` from the link seam to a typed `MonitorError`.
//!
//! `smokewatch_traits` keeps its seams boxed; with the `hardware-errors`
//! feature the serial errors from `smokewatch_hardware` are matched exactly,
//! otherwise the message text is inspected.

use crate::error::MonitorError;

/// Map a trait-boundary error to a typed `MonitorError`.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> MonitorError {
    #[cfg(feature = "hardware-errors")]
    {
        use smokewatch_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout => MonitorError::Timeout,
                // Line noise, the link itself is fine
                HwError::Overflow(_) | HwError::Encoding => MonitorError::Hardware(hw.to_string()),
                other => MonitorError::HardwareFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") || s.to_lowercase().contains("timed out") {
        MonitorError::Timeout
    } else {
        MonitorError::Hardware(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_errors_fall_back_to_text() {
        let e = std::io::Error::other("read timed out");
        assert_eq!(map_hw_error(&e), MonitorError::Timeout);
        let e = std::io::Error::other("device unplugged");
        assert_eq!(
            map_hw_error(&e),
            MonitorError::Hardware("device unplugged".into())
        );
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn hardware_errors_are_downcast() {
        use smokewatch_hardware::error::HwError;
        assert_eq!(map_hw_error(&HwError::Timeout), MonitorError::Timeout);
        assert!(matches!(
            map_hw_error(&HwError::Encoding),
            MonitorError::Hardware(_)
        ));
        assert!(matches!(
            map_hw_error(&HwError::Closed),
            MonitorError::HardwareFault(_)
        ));
    }
}
