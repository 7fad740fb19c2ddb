//! Address range validation
//!
//! Every check returns an error instead of clamping. Callers propagate the
//! error with `?` so a bad address aborts the operation before any controller
//! call is made.

use crate::{PodError, Result};

/// Axis numbers are 1-indexed on every controller.
pub const VALID_AXES: [u32; 3] = [1, 2, 3];
/// Highest IO pin index on a digital IO module (pins are 0-indexed).
pub const MAX_IO_PIN: u32 = 3;
/// Highest IO board network id.
pub const MAX_IO_BOARD: u32 = 3;

/// Check a 1-indexed pod number against the configured pod count.
pub fn pod(pod: usize, n_pods: usize) -> Result<()> {
    if pod == 0 || pod > n_pods {
        return Err(PodError::PodOutOfRange { pod, n_pods });
    }
    Ok(())
}

/// Check a 1-indexed machine number and return its 0-indexed position.
pub fn machine(number: u32, connected: usize) -> Result<usize> {
    match (number as usize).checked_sub(1) {
        Some(index) if index < connected => Ok(index),
        _ => Err(PodError::MachineOutOfRange {
            machine: number,
            connected,
        }),
    }
}

pub fn axis(axis: u32) -> Result<()> {
    if !VALID_AXES.contains(&axis) {
        return Err(PodError::AxisOutOfRange { axis });
    }
    Ok(())
}

pub fn io_pin(pin: u32) -> Result<()> {
    if pin > MAX_IO_PIN {
        return Err(PodError::IoPinOutOfRange { pin });
    }
    Ok(())
}

pub fn io_board(board: u32) -> Result<()> {
    if board > MAX_IO_BOARD {
        return Err(PodError::IoBoardOutOfRange { board });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pod_range() {
        assert!(pod(1, 3).is_ok());
        assert!(pod(3, 3).is_ok());
        assert!(matches!(pod(0, 3), Err(PodError::PodOutOfRange { pod: 0, n_pods: 3 })));
        assert!(matches!(pod(4, 3), Err(PodError::PodOutOfRange { pod: 4, .. })));
    }

    #[test]
    fn test_machine_range_returns_index() {
        assert_eq!(machine(1, 2).unwrap(), 0);
        assert_eq!(machine(2, 2).unwrap(), 1);
        assert!(machine(0, 2).is_err());
        assert!(machine(3, 2).is_err());
        assert!(machine(1, 0).is_err());
    }

    #[test]
    fn test_axis_range() {
        for a in VALID_AXES {
            assert!(axis(a).is_ok());
        }
        assert!(axis(0).is_err());
        assert!(axis(4).is_err());
    }

    #[test]
    fn test_io_ranges() {
        for value in 0..=3 {
            assert!(io_pin(value).is_ok());
            assert!(io_board(value).is_ok());
        }
        assert!(matches!(io_pin(4), Err(PodError::IoPinOutOfRange { pin: 4 })));
        assert!(matches!(io_board(9), Err(PodError::IoBoardOutOfRange { board: 9 })));
    }
}
