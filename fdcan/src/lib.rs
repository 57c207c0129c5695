#![no_std]
#![warn(missing_docs)]
//! # FDCAN
//!
//! ## Overview
//! This crate provides a CAN driver for the dual FDCAN peripheral found on
//! Cortex-M0+ microcontrollers of the STM32G0 family, shaped after the
//! AUTOSAR CAN driver.
//!
//! It provides the following features:
//!
//! - classical CAN and CAN FD with bitrate switching support
//! - a fixed Message RAM layout per controller, checked at compile time
//! - controller lifecycle: init, baudrate switching, start, stop, sleep and
//!   deinit
//! - message transmission through the Tx FIFO or Tx queue, with the PDU
//!   handle carried in the message marker
//! - message reception through two Rx FIFOs and standard/extended filter
//!   lists
//! - dispatch of all 23 interrupt sources with upward notifications
//! - nestable interrupt disabling
//! - optional time stamp services
//!
//! The driver is split in two layers. The [`Driver`] facade validates every
//! request against the driver state and the configuration. A per-controller
//! [`Controller`] engine owns one FDCAN block and its part of the Message
//! RAM.
//!
//! ## Integration
//!
//! The layer above implements [`CanIf`] to receive frames, transmit
//! confirmations and error notifications. A [`Det`] implementation receives
//! development and runtime error reports. Both live inside the [`Driver`] and
//! are reachable through [`Driver::canif`] and [`Driver::det`].
//!
//! ```no_run
//! use fdcan::config::*;
//! use fdcan::fdcan_core::{ApiId, CanIf, ControllerId, Det, ErrorId, Mailbox, PduId};
//! use fdcan::fdcan_core::{BusError, PduInfo, RuntimeErrorId};
//! use fdcan::fugit::RateExtU32;
//! use fdcan::instance::{Instance, Peripheral};
//! use fdcan::interrupt::InterruptSet;
//! use fdcan::Driver;
//!
//! struct Upper;
//! impl CanIf for Upper {
//!     fn rx_indication(&mut self, _: &Mailbox, _: &PduInfo<'_>) {}
//!     fn tx_confirmation(&mut self, _: PduId) {}
//!     fn controller_bus_off(&mut self, _: ControllerId) {}
//!     fn controller_error_state_passive(&mut self, _: ControllerId, _: u8, _: u8) {}
//!     fn error_notification(&mut self, _: ControllerId, _: BusError) {}
//! }
//! struct Tracer;
//! impl Det for Tracer {
//!     fn report_error(&mut self, _: ApiId, _: ErrorId) {}
//!     fn report_runtime_error(&mut self, _: ApiId, _: RuntimeErrorId) {}
//! }
//!
//! static BAUDRATES: [Baudrate; 1] = [Baudrate {
//!     nominal: BitTiming {
//!         sjw: 1,
//!         phase_seg_1: 13,
//!         phase_seg_2: 2,
//!         prescaler: 4,
//!         bitrate: fdcan::fugit::HertzU32::from_raw(500_000),
//!     },
//!     data: None,
//!     bit_rate_switching: false,
//! }];
//! static CONFIG: Config<'static> = Config {
//!     controllers: &[ControllerConfig {
//!         peripheral: Peripheral::Fdcan1,
//!         clock_divider: 0,
//!         operating_mode: OperatingMode::Normal,
//!         frame_format: FrameFormat::Classic,
//!         auto_retransmission: true,
//!         transmit_pause: false,
//!         protocol_exception: true,
//!         default_baudrate: 0,
//!         baudrates: &BAUDRATES,
//!         tx_mode: TxMode::Fifo,
//!         interrupts: InterruptSet(1 << 0 | 1 << 10 | 1 << 19),
//!         line1: InterruptSet::EMPTY,
//!         timestamp_prescaler: 1,
//!     }],
//!     hohs: &[Hoh {
//!         controller: 0,
//!         id_kind: IdKind::Standard,
//!         kind: HohKind::Transmit { padding: 0xcc },
//!     }],
//! };
//!
//! assert!(CONFIG.validate(32.MHz()).is_ok());
//! // Safety: the only handles to both FDCAN blocks
//! let instances = unsafe { [Instance::fdcan1(), Instance::fdcan2()] };
//! let mut driver = Driver::new(General::default(), instances, Upper, Tracer);
//! driver.init(&CONFIG).unwrap();
//! ```
//!
//! ## Interrupts
//!
//! Both interrupt lines of an FDCAN block end up in
//! [`Driver::on_interrupt`] for the controller driving that block. The
//! handler services every source that is both flagged and enabled, in
//! ascending source order, and clears its flag afterwards.
//!
//! ## Logging
//!
//! With the `defmt` or the `log` feature enabled, the driver logs lifecycle
//! events, acknowledge timeouts and bus errors through the respective crate.

#[cfg(test)]
extern crate std;

mod fmt;

pub mod config;
pub mod controller;
pub mod driver;
pub mod filter;
pub mod instance;
pub mod interrupt;
pub mod message;
pub mod messageram;
pub mod reg;
pub mod rx_fifo;
pub mod tx_buffers;
pub mod tx_event_fifo;

pub use crate::controller::Controller;
pub use crate::driver::{Driver, Error, UnitState, VersionInfo};
pub use embedded_can;
pub use fdcan_core;
pub use fdcan_core::{CanIf, Det};
pub use fugit;
pub use nb;
