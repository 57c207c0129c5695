//! Peripheral instances

use crate::messageram::{MessageRam, SRAMCAN_BASE, SRAMCAN_SIZE};
use crate::reg::{ClockDivider, RegisterBlock};

const FDCAN1: usize = 0x4000_6400;
const FDCAN2: usize = 0x4000_6800;
const FDCAN_CONFIG: usize = 0x4000_6500;

/// Which of the two FDCAN blocks a controller drives
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Peripheral {
    /// FDCAN1
    Fdcan1,
    /// FDCAN2
    Fdcan2,
}

impl Peripheral {
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// Everything a controller engine touches on one FDCAN block
#[derive(Copy, Clone)]
pub struct Instance<'a> {
    /// Register block
    pub regs: &'a RegisterBlock,
    /// Message RAM region
    pub ram: &'a MessageRam,
    /// Clock divider shared by both blocks
    pub ckdiv: &'a ClockDivider,
}

impl Instance<'static> {
    /// FDCAN1 at its fixed address
    ///
    /// # Safety
    /// Only one `Instance` per peripheral may be alive, and it must only be
    /// used on a device that has the peripheral at this address.
    pub unsafe fn fdcan1() -> Self {
        Self::at(FDCAN1, SRAMCAN_BASE)
    }

    /// FDCAN2 at its fixed address
    ///
    /// # Safety
    /// See [`Instance::fdcan1`].
    pub unsafe fn fdcan2() -> Self {
        Self::at(FDCAN2, SRAMCAN_BASE + SRAMCAN_SIZE)
    }

    unsafe fn at(regs: usize, ram: usize) -> Self {
        Self {
            regs: &*(regs as *const RegisterBlock),
            ram: &*(ram as *const MessageRam),
            ckdiv: &*(FDCAN_CONFIG as *const ClockDivider),
        }
    }
}
