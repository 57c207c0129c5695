//! Driver configuration
//!
//! Everything here is plain data that can be built in a `static` and is only
//! read by the driver. [`General`] holds the switches that are fixed for a
//! build, [`Config`] the description of controllers and hardware objects.

use crate::instance::Peripheral;
use crate::interrupt::InterruptSet;
use crate::messageram::{EXTENDED_FILTERS, STANDARD_FILTERS};
use core::ops::RangeInclusive;
use fdcan_core::ControllerId;
use fugit::HertzU32;

/// Number of FDCAN blocks on the device
pub const MAX_CONTROLLERS: usize = 2;
/// Hardware objects addressable by the egress time stamp bookkeeping
pub const MAX_HOHS: usize = 64;

/// Build-wide switches
#[derive(Copy, Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct General {
    /// Report precondition violations to [`Det`](fdcan_core::Det)
    pub dev_error_detect: bool,
    /// Surface lost messages as bus overload and route the security relevant
    /// sources to line 1
    pub security_event_reporting: bool,
    /// Enable the time stamp services
    pub time_stamp: bool,
    /// Enable `set_baudrate`
    pub set_baudrate_api: bool,
    /// Enable `get_version_info`
    pub version_info_api: bool,
    /// Polls of a status bit before a pending acknowledge is treated as lost
    pub acknowledge_timeout: u32,
}

impl Default for General {
    fn default() -> Self {
        Self {
            dev_error_detect: true,
            security_event_reporting: false,
            time_stamp: false,
            set_baudrate_api: true,
            version_info_api: true,
            acknowledge_timeout: 10_000,
        }
    }
}

/// Controllers and hardware objects of one integration
#[derive(Copy, Clone, Debug)]
pub struct Config<'a> {
    /// Controllers, indexed by [`ControllerId`]
    pub controllers: &'a [ControllerConfig<'a>],
    /// Hardware objects, indexed by [`HohId`](fdcan_core::HohId)
    pub hohs: &'a [Hoh<'a>],
}

/// Test and restricted modes
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OperatingMode {
    /// Normal operation
    #[default]
    Normal,
    /// Receive and acknowledge only
    Restricted,
    /// Receive only, no acknowledge
    BusMonitoring,
    /// Tx looped back internally, bus not driven
    InternalLoopback,
    /// Tx looped back and driven on the bus
    ExternalLoopback,
}

/// Frame formats a controller handles
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameFormat {
    /// Classic CAN only, at most 8 data bytes
    #[default]
    Classic,
    /// CAN FD enabled
    Fd,
}

/// How the Tx buffers are scheduled
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxMode {
    /// Messages are sent according to the order they are enqueued
    #[default]
    Fifo,
    /// Messages are sent according to their priority, lowest id first
    Queue,
}

impl From<TxMode> for bool {
    fn from(val: TxMode) -> Self {
        match val {
            TxMode::Queue => true,
            TxMode::Fifo => false,
        }
    }
}

/// One controller
#[derive(Copy, Clone, Debug)]
pub struct ControllerConfig<'a> {
    /// FDCAN block driven by this controller
    pub peripheral: Peripheral,
    /// Raw CKDIV value, 0 divides by one, `n` by `2 * n`
    pub clock_divider: u8,
    /// Test and restricted modes
    pub operating_mode: OperatingMode,
    /// Classic or FD
    pub frame_format: FrameFormat,
    /// Retransmit frames that lost arbitration or saw an error
    pub auto_retransmission: bool,
    /// Pause two bit times after each transmitted frame
    pub transmit_pause: bool,
    /// Enter bus integrating on a protocol exception instead of signalling an
    /// error
    pub protocol_exception: bool,
    /// Index into `baudrates` applied on init
    pub default_baudrate: usize,
    /// Selectable baudrate profiles
    pub baudrates: &'a [Baudrate],
    /// Tx FIFO or Tx queue
    pub tx_mode: TxMode,
    /// Enabled interrupt sources
    pub interrupts: InterruptSet,
    /// Sources routed to line 1, the others go to line 0
    pub line1: InterruptSet,
    /// Bit times per time stamp counter tick, 1 to 16
    pub timestamp_prescaler: u8,
}

impl<'a> ControllerConfig<'a> {
    /// Input clock divisor selected by `clock_divider`
    pub fn clock_divisor(&self) -> u32 {
        match self.clock_divider {
            0 => 1,
            n => 2 * u32::from(n),
        }
    }
}

/// A baudrate profile
#[derive(Copy, Clone, Debug)]
pub struct Baudrate {
    /// Arbitration phase, and everything in classic frames
    pub nominal: BitTiming,
    /// Data phase of bit rate switched FD frames
    pub data: Option<BitTiming>,
    /// Send FD frames with bit rate switching
    pub bit_rate_switching: bool,
}

/// Bit-timing parameters
///
/// The bit time is determined by
/// - the time quantum `t_q`, which is `prescaler` periods of the CAN clock
/// - the number of time quanta in a bit time, determined by `phase_seg_1` and
///   `phase_seg_2`
///
/// This struct expects *real* values, the minus one encoding of the registers
/// is applied when they are written.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BitTiming {
    /// Synchronization jump width
    pub sjw: u8,
    /// Propagation time and phase time before sample point
    pub phase_seg_1: u8,
    /// Time after sample point
    pub phase_seg_2: u8,
    /// CAN clock periods per time quantum
    pub prescaler: u16,
    /// The bitrate these values are meant to produce
    pub bitrate: HertzU32,
}

/// Misconfigurations of [`BitTiming`].
#[derive(Debug, PartialEq, Eq)]
pub enum BitTimingError {
    /// SJW is outside the wrapped `RangeInclusive`
    SynchronizationJumpWidthOutOfRange(RangeInclusive<u32>),
    /// Phase segment 1 is outside the wrapped `RangeInclusive`
    PhaseSeg1OutOfRange(RangeInclusive<u32>),
    /// Phase segment 2 is outside the wrapped `RangeInclusive`
    PhaseSeg2OutOfRange(RangeInclusive<u32>),
    /// Total bit time quanta is outside the wrapped `RangeInclusive`
    BitTimeOutOfRange(RangeInclusive<u32>),
    /// Prescaler is outside the wrapped `RangeInclusive`
    PrescalerOutOfRange(RangeInclusive<u32>),
    /// The segments and prescaler do not produce the declared bitrate
    ///
    /// The following requirement must be met:
    /// - `can_clock` must equal `bitrate * bit_time_quanta * prescaler`
    BitrateMismatch {
        /// Peripheral clock after the clock divider
        can_clock: HertzU32,
        /// Bitrate declared in [`BitTiming`]
        bitrate: HertzU32,
        /// Time quanta per bit selected by [`BitTiming`]
        bit_time_quanta: u32,
    },
}

/// Valid values of a BitTiming struct
#[derive(Clone)]
pub(crate) struct BitTimingRanges {
    sjw: RangeInclusive<u32>,
    phase_seg_1: RangeInclusive<u32>,
    phase_seg_2: RangeInclusive<u32>,
    /// The bit time, in time quanta
    time_quanta_per_bit: RangeInclusive<u32>,
    prescaler: RangeInclusive<u32>,
}
pub(crate) const NOMINAL_BIT_TIMING_RANGES: BitTimingRanges = BitTimingRanges {
    sjw: 1..=128,
    phase_seg_1: 1..=256,
    phase_seg_2: 1..=128,
    time_quanta_per_bit: 4..=385,
    prescaler: 1..=512,
};
pub(crate) const DATA_BIT_TIMING_RANGES: BitTimingRanges = BitTimingRanges {
    sjw: 1..=16,
    phase_seg_1: 1..=32,
    phase_seg_2: 1..=16,
    time_quanta_per_bit: 3..=49,
    prescaler: 1..=32,
};

impl BitTiming {
    /// Returns the number of time quanta that make up one bit time, `t_bit /
    /// t_q`
    pub fn time_quanta_per_bit(&self) -> u32 {
        1 + u32::from(self.phase_seg_1) + u32::from(self.phase_seg_2)
    }

    pub(crate) fn check(
        &self,
        can_clock: HertzU32,
        valid: &BitTimingRanges,
    ) -> Result<(), BitTimingError> {
        if !valid.sjw.contains(&self.sjw.into()) {
            Err(BitTimingError::SynchronizationJumpWidthOutOfRange(
                valid.sjw.clone(),
            ))
        } else if !valid.phase_seg_1.contains(&self.phase_seg_1.into()) {
            Err(BitTimingError::PhaseSeg1OutOfRange(
                valid.phase_seg_1.clone(),
            ))
        } else if !valid.phase_seg_2.contains(&self.phase_seg_2.into()) {
            Err(BitTimingError::PhaseSeg2OutOfRange(
                valid.phase_seg_2.clone(),
            ))
        } else if !valid
            .time_quanta_per_bit
            .contains(&self.time_quanta_per_bit())
        {
            Err(BitTimingError::BitTimeOutOfRange(
                valid.time_quanta_per_bit.clone(),
            ))
        } else if !valid.prescaler.contains(&self.prescaler.into()) {
            Err(BitTimingError::PrescalerOutOfRange(valid.prescaler.clone()))
        } else {
            let bit_time_quanta = self.time_quanta_per_bit();
            let produced = u64::from(self.bitrate.to_Hz())
                * u64::from(bit_time_quanta)
                * u64::from(self.prescaler);
            if produced == u64::from(can_clock.to_Hz()) {
                Ok(())
            } else {
                Err(BitTimingError::BitrateMismatch {
                    can_clock,
                    bitrate: self.bitrate,
                    bit_time_quanta,
                })
            }
        }
    }
}

/// Kind of identifiers a hardware object or filter handles
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IdKind {
    /// 11-bit identifiers
    Standard,
    /// 29-bit identifiers
    Extended,
    /// Both; each filter selects its own kind
    Mixed,
}

/// Receive FIFO a frame is stored in
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxFifo {
    /// Rx FIFO 0
    Fifo0,
    /// Rx FIFO 1
    Fifo1,
}

impl RxFifo {
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// How `code` and `mask` of a [`Filter`] are interpreted
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FilterType {
    /// Accept ids from `code` to `mask`, both included
    Range,
    /// Accept `code` and `mask`
    Dual,
    /// Accept ids matching `code` in the bits set in `mask`
    Classic,
    /// The filter element matches nothing
    Disabled,
}

/// Acceptance filter of a receive object
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Filter {
    /// Filter id 1
    pub code: u32,
    /// Filter id 2
    pub mask: u32,
    /// Interpretation of `code` and `mask`
    pub filter_type: FilterType,
    /// Filter list the element goes to. [`IdKind::Mixed`] is not a valid
    /// filter kind and such filters are not installed.
    pub id_kind: IdKind,
}

/// Receive or transmit side of a hardware object
#[derive(Copy, Clone, Debug)]
pub enum HohKind<'a> {
    /// Hrh
    Receive {
        /// FIFO the filters store into
        fifo: RxFifo,
        /// Acceptance filters
        filters: &'a [Filter],
    },
    /// Hth
    Transmit {
        /// Fills FD payloads up to the next valid length
        padding: u8,
    },
}

/// Hardware object
#[derive(Copy, Clone, Debug)]
pub struct Hoh<'a> {
    /// Owning controller
    pub controller: ControllerId,
    /// Identifier kinds handled
    pub id_kind: IdKind,
    /// Receive or transmit
    pub kind: HohKind<'a>,
}

impl<'a> Hoh<'a> {
    /// `true` for a transmit object
    pub fn is_transmit(&self) -> bool {
        matches!(self.kind, HohKind::Transmit { .. })
    }

    /// Target FIFO of a receive object
    pub fn rx_fifo(&self) -> Option<RxFifo> {
        match self.kind {
            HohKind::Receive { fifo, .. } => Some(fifo),
            HohKind::Transmit { .. } => None,
        }
    }

    /// Filters that go to the standard or extended list of the controller
    pub fn installable_filters(&self, kind: IdKind) -> impl Iterator<Item = &'a Filter> + '_ {
        let filters: &'a [Filter] = match self.kind {
            HohKind::Receive { filters, .. } => filters,
            HohKind::Transmit { .. } => &[],
        };
        let hoh_kind = self.id_kind;
        filters.iter().filter(move |f| {
            f.id_kind == kind && (hoh_kind == IdKind::Mixed || hoh_kind == kind)
        })
    }
}

/// Misconfigurations of [`Config`]
#[derive(Debug, PartialEq, Eq)]
pub enum ConfigurationError {
    /// No controllers, or more than the device has
    ControllerCount(usize),
    /// Two controllers drive the same FDCAN block
    DuplicatePeripheral(Peripheral),
    /// CKDIV accepts 0 to 15
    ClockDividerOutOfRange {
        /// Offending controller
        controller: ControllerId,
    },
    /// Controllers sharing CKDIV disagree on its value
    ClockDividerMismatch,
    /// `default_baudrate` does not index `baudrates`
    DefaultBaudrateOutOfRange {
        /// Offending controller
        controller: ControllerId,
    },
    /// A profile has invalid timing
    BitTiming {
        /// Offending controller
        controller: ControllerId,
        /// Index of the profile
        baudrate: usize,
        /// What is wrong
        error: BitTimingError,
    },
    /// Bit rate switching without data phase timing
    MissingDataTiming {
        /// Offending controller
        controller: ControllerId,
        /// Index of the profile
        baudrate: usize,
    },
    /// Time stamp prescaler outside 1 to 16
    TimestampPrescalerOutOfRange {
        /// Offending controller
        controller: ControllerId,
    },
    /// More than [`MAX_HOHS`] hardware objects
    TooManyHohs(usize),
    /// A hardware object names a controller that does not exist
    UnknownController {
        /// Offending hardware object
        hoh: usize,
    },
    /// More standard filters than the message RAM holds
    TooManyStandardFilters {
        /// Offending controller
        controller: ControllerId,
    },
    /// More extended filters than the message RAM holds
    TooManyExtendedFilters {
        /// Offending controller
        controller: ControllerId,
    },
}

impl<'a> Config<'a> {
    /// Checks everything that does not depend on the CAN clock
    pub fn check_structure(&self) -> Result<(), ConfigurationError> {
        let count = self.controllers.len();
        if count == 0 || count > MAX_CONTROLLERS {
            return Err(ConfigurationError::ControllerCount(count));
        }
        if self.hohs.len() > MAX_HOHS {
            return Err(ConfigurationError::TooManyHohs(self.hohs.len()));
        }
        let mut used = [false; MAX_CONTROLLERS];
        for (id, c) in self.controllers.iter().enumerate() {
            let controller = id as ControllerId;
            let slot = &mut used[c.peripheral.index()];
            if *slot {
                return Err(ConfigurationError::DuplicatePeripheral(c.peripheral));
            }
            *slot = true;
            if c.clock_divider > 15 {
                return Err(ConfigurationError::ClockDividerOutOfRange { controller });
            }
            if c.default_baudrate >= c.baudrates.len() {
                return Err(ConfigurationError::DefaultBaudrateOutOfRange { controller });
            }
            if !(1..=16).contains(&c.timestamp_prescaler) {
                return Err(ConfigurationError::TimestampPrescalerOutOfRange { controller });
            }
            for (baudrate, b) in c.baudrates.iter().enumerate() {
                if b.bit_rate_switching && b.data.is_none() {
                    return Err(ConfigurationError::MissingDataTiming {
                        controller,
                        baudrate,
                    });
                }
            }
        }
        if self
            .controllers
            .windows(2)
            .any(|w| w[0].clock_divider != w[1].clock_divider)
        {
            return Err(ConfigurationError::ClockDividerMismatch);
        }
        for (hoh, h) in self.hohs.iter().enumerate() {
            if usize::from(h.controller) >= count {
                return Err(ConfigurationError::UnknownController { hoh });
            }
        }
        for id in 0..count {
            let controller = id as ControllerId;
            let (standard, extended) = self.filter_counts(controller);
            if standard > STANDARD_FILTERS {
                return Err(ConfigurationError::TooManyStandardFilters { controller });
            }
            if extended > EXTENDED_FILTERS {
                return Err(ConfigurationError::TooManyExtendedFilters { controller });
            }
        }
        Ok(())
    }

    /// Checks the whole configuration against the FDCAN kernel clock
    pub fn validate(&self, can_clock: HertzU32) -> Result<(), ConfigurationError> {
        self.check_structure()?;
        for (id, c) in self.controllers.iter().enumerate() {
            let controller = id as ControllerId;
            let clock = can_clock / c.clock_divisor();
            for (baudrate, b) in c.baudrates.iter().enumerate() {
                let error = |error| ConfigurationError::BitTiming {
                    controller,
                    baudrate,
                    error,
                };
                b.nominal
                    .check(clock, &NOMINAL_BIT_TIMING_RANGES)
                    .map_err(error)?;
                if let Some(data) = b.data {
                    data.check(clock, &DATA_BIT_TIMING_RANGES).map_err(error)?;
                }
            }
        }
        Ok(())
    }

    /// Hardware objects owned by `controller`, with their ids
    pub fn hohs_of(
        &self,
        controller: ControllerId,
    ) -> impl Iterator<Item = (usize, &'a Hoh<'a>)> + '_ {
        let hohs: &'a [Hoh<'a>] = self.hohs;
        hohs.iter()
            .enumerate()
            .filter(move |(_, h)| h.controller == controller)
    }

    /// Standard and extended filters installed for `controller`
    pub fn filter_counts(&self, controller: ControllerId) -> (usize, usize) {
        self.hohs_of(controller).fold((0, 0), |(s, e), (_, h)| {
            (
                s + h.installable_filters(IdKind::Standard).count(),
                e + h.installable_filters(IdKind::Extended).count(),
            )
        })
    }
}
