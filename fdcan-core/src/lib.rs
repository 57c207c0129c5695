#![no_std]
#![warn(missing_docs)]

//! `fdcan-core` provides the set of abstractions that sit between the
//! platform specific [`fdcan`] driver and the layers it talks to: the
//! communication interface above it and the development error tracer beside
//! it.
//!
//! Traits from this crate are implemented by the integrator, not by the
//! driver. The driver calls into them from task context (diagnostics) and
//! from interrupt context (upward notifications).
//!
//! Implementations must not call back into the driver synchronously from
//! any of these hooks.
//!
//! [`fdcan`]: <https://docs.rs/crate/fdcan/>

use embedded_can::{ExtendedId, Id, StandardId};

/// Index of a CAN controller in the driver configuration
pub type ControllerId = u8;

/// Index of a hardware object (Hoh) in the driver configuration
pub type HohId = u16;

/// Identifier of a PDU handed to `write` and returned on confirmation
pub type PduId = u16;

/// AUTOSAR module id of the CAN driver
pub const MODULE_ID: u16 = 80;

/// CAN identifier in the composite format exchanged with the upper layer
///
/// Bits 0..=28 hold the identifier, bit 30 marks a CAN FD frame and bit 31
/// marks an extended (29-bit) identifier. A standard identifier only uses
/// bits 0..=10.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanId(pub u32);

impl CanId {
    /// Flag marking an extended identifier
    pub const EXTENDED: u32 = 1 << 31;
    /// Flag marking a CAN FD frame
    pub const FD: u32 = 1 << 30;

    /// Composite id of a classic frame with a standard identifier
    pub fn standard(id: StandardId) -> Self {
        Self(id.as_raw() as u32)
    }

    /// Composite id of a classic frame with an extended identifier
    pub fn extended(id: ExtendedId) -> Self {
        Self(id.as_raw() | Self::EXTENDED)
    }

    /// Same identifier, flagged as a CAN FD frame
    pub const fn with_fd(self) -> Self {
        Self(self.0 | Self::FD)
    }

    /// `true` if bit 31 is set
    pub const fn is_extended(&self) -> bool {
        self.0 & Self::EXTENDED != 0
    }

    /// `true` if bit 30 is set
    pub const fn is_fd(&self) -> bool {
        self.0 & Self::FD != 0
    }

    /// Identifier bits, masked to the width given by the id kind
    pub fn raw_id(&self) -> u32 {
        if self.is_extended() {
            self.0 & ExtendedId::MAX.as_raw()
        } else {
            self.0 & StandardId::MAX.as_raw() as u32
        }
    }
}

impl From<Id> for CanId {
    fn from(value: Id) -> Self {
        match value {
            Id::Standard(id) => Self::standard(id),
            Id::Extended(id) => Self::extended(id),
        }
    }
}

/// Receive mailbox handed upward with every received frame
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Mailbox {
    /// Receive hardware object the frame was stored for
    pub hoh: HohId,
    /// Controller that received the frame
    pub controller: ControllerId,
    /// Received identifier in composite format
    pub id: CanId,
}

/// Payload of a received frame
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PduInfo<'a> {
    /// Payload length in bytes
    pub length: u8,
    /// Payload, exactly `length` bytes
    pub sdu: &'a [u8],
}

/// A PDU handed to the driver for transmission
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Pdu<'a> {
    /// Identifier in composite format
    pub id: CanId,
    /// Payload length in bytes
    pub length: u8,
    /// Payload; may only be `None` for a zero length PDU
    pub sdu: Option<&'a [u8]>,
    /// Handle returned through [`CanIf::tx_confirmation`]
    pub sw_pdu_handle: PduId,
}

/// Controller mode as seen by the upper layer
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControllerState {
    /// Not initialized
    #[default]
    Uninit,
    /// In init mode, not taking part in bus traffic
    Stopped,
    /// Taking part in bus traffic
    Started,
    /// Clock stopped
    Sleep,
}

/// Fault confinement state of a controller
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorState {
    /// Both error counters below 128
    Active,
    /// An error counter reached 128
    Passive,
    /// Transmit error counter exceeded 255
    BusOff,
}

/// Bus error kinds surfaced through [`CanIf::error_notification`]
///
/// Numeric values follow `Can_ErrorType`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum BusError {
    /// A recessive bit was sent but a dominant bit was read back
    BitMonitoring1 = 0x01,
    /// A dominant bit was sent but a recessive bit was read back
    BitMonitoring0 = 0x02,
    /// Generic bit error
    Bit = 0x03,
    /// No acknowledgement on the bus
    CheckAckFailed = 0x04,
    /// Acknowledge delimiter was not recessive
    AckDelimiter = 0x05,
    /// Arbitration was lost
    ArbitrationLost = 0x06,
    /// The controller could not keep up with incoming or outgoing traffic
    Overload = 0x07,
    /// Fixed-format bit field violated
    CheckFormFailed = 0x08,
    /// More than five equal bits in a row
    CheckStuffingFailed = 0x09,
    /// Received CRC did not match
    CheckCrcFailed = 0x0a,
    /// Bus stuck dominant
    BusLock = 0x0b,
}

/// Upward notifications from the driver to the communication interface
///
/// All methods are called from interrupt context, serialized per controller.
pub trait CanIf {
    /// A frame was received for `mailbox`
    fn rx_indication(&mut self, mailbox: &Mailbox, pdu: &PduInfo<'_>);
    /// The frame written with sw-handle `pdu_id` has been transmitted
    fn tx_confirmation(&mut self, pdu_id: PduId);
    /// The controller entered bus-off and has been stopped by the driver
    fn controller_bus_off(&mut self, controller: ControllerId);
    /// The controller entered error-passive
    fn controller_error_state_passive(
        &mut self,
        controller: ControllerId,
        rx_error_counter: u8,
        tx_error_counter: u8,
    );
    /// A protocol or overload error was detected on the bus
    fn error_notification(&mut self, controller: ControllerId, error: BusError);
}

/// Development error codes, numeric values are reported as-is
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ErrorId {
    /// Missing pointer argument
    ParamPointer = 0x01,
    /// Invalid or wrong-kind hardware object
    ParamHandle = 0x02,
    /// Payload too long for the controller or frame format
    ParamDataLength = 0x03,
    /// Unknown controller index
    ParamController = 0x04,
    /// Driver not initialized
    Uninit = 0x05,
    /// Invalid state transition
    Transition = 0x06,
    /// Unknown baudrate profile
    ParamBaudrate = 0x07,
    /// Peripheral failed to acknowledge a request
    InitFailed = 0x09,
    /// PDU id out of range
    ParamLpdu = 0x0a,
}

/// Runtime error codes
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum RuntimeErrorId {
    /// A FIFO overflowed and a message or event was lost
    DataLost = 0x01,
}

/// Service ids identifying the reporting API
#[allow(missing_docs)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ApiId {
    Init = 0x00,
    SetControllerMode = 0x03,
    DisableControllerInterrupts = 0x04,
    EnableControllerInterrupts = 0x05,
    Write = 0x06,
    CheckWakeup = 0x0b,
    SetBaudrate = 0x0f,
    DeInit = 0x10,
    GetControllerErrorState = 0x11,
    GetControllerMode = 0x12,
    GetControllerRxErrorCounter = 0x30,
    GetControllerTxErrorCounter = 0x31,
    GetCurrentTime = 0x32,
    EnableEgressTimeStamp = 0x33,
    GetEgressTimeStamp = 0x34,
    GetIngressTimeStamp = 0x35,
    Isr = 0x40,
}

/// Development error tracer hook
///
/// Called from task context for precondition violations and from interrupt
/// context for runtime errors.
pub trait Det {
    /// A caller violated a precondition of `api`
    fn report_error(&mut self, api: ApiId, error: ErrorId);
    /// A runtime fault was detected while servicing `api`
    fn report_runtime_error(&mut self, api: ApiId, error: RuntimeErrorId);
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn composite_id_flags() {
        let id = CanId(0x4000_07ff);
        assert!(id.is_fd());
        assert!(!id.is_extended());
        assert_eq!(id.raw_id(), 0x7ff);

        let id = CanId::extended(ExtendedId::MAX);
        assert!(id.is_extended());
        assert_eq!(id.0, 0x9fff_ffff);
        assert_eq!(id.raw_id(), 0x1fff_ffff);
    }

    #[test]
    fn standard_id_ignores_upper_bits() {
        let id = CanId(0x0000_f123);
        assert_eq!(id.raw_id(), 0x123);
        assert!(!id.is_extended());
    }

    #[test]
    fn from_embedded_can_id() {
        let id: CanId = Id::Standard(StandardId::new(0x42).unwrap()).into();
        assert_eq!(id, CanId(0x42));
        assert_eq!(CanId::standard(StandardId::ZERO).with_fd(), CanId(CanId::FD));
    }
}
