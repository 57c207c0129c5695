//! Interrupt sources and lines of the FDCAN peripheral
use bitfield::bitfield;

bitfield! {
    /// A set of CAN interrupts.
    ///
    /// Bit positions are shared by `IR`, `IE` and `ILS`.
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct InterruptSet(u32);

    /// Protocol Error in Data phase
    pub ped, set_ped:  22;
    /// Protocol Error in Arbitration phase
    pub pea, set_pea:  21;
    /// Watchdog
    pub wdi, set_wdi:  20;
    /// Bus Off
    pub bo, set_bo:   19;
    /// Warning status changed
    pub ew, set_ew:   18;
    /// Error Passive
    pub ep, set_ep:   17;
    /// Error Logging Overflow
    pub elo, set_elo:  16;
    /// Timeout Occurred
    pub too, set_too:  15;
    /// Message Ram Access Failure
    pub mraf, set_mraf: 14;
    /// Timestamp Wraparound
    pub tsw, set_tsw:  13;
    /// Tx Event Fifo Element Lost
    pub tefl, set_tefl: 12;
    /// Tx Event Fifo Full
    pub teff, set_teff: 11;
    /// Tx Event Fifo New Entry
    pub tefn, set_tefn: 10;
    /// Tx Fifo Empty
    pub tfe, set_tfe:  9;
    /// Transmission Cancellation Finished
    pub tcf, set_tcf:  8;
    /// Transmission Completed
    pub tc, set_tc:   7;
    /// High Priority Message
    pub hpm, set_hpm:  6;
    /// Rx Fifo1 Message Lost
    pub rf1l, set_rf1l: 5;
    /// Rx Fifo1 Full
    pub rf1f, set_rf1f: 4;
    /// Rx Fifo1 New Message
    pub rf1n, set_rf1n: 3;
    /// Rx Fifo0 Message Lost
    pub rf0l, set_rf0l: 2;
    /// Rx Fifo0 Full
    pub rf0f, set_rf0f: 1;
    /// Rx Fifo0 New Message
    pub rf0n, set_rf0n: 0;
}

impl InterruptSet {
    /// No interrupts
    pub const EMPTY: Self = Self(0);
    /// Every interrupt source of the peripheral
    pub const ALL: Self = Self(0x007f_ffff);

    /// Sources raised when a message or event is lost, or a protocol error
    /// or error passive state is detected
    pub const SECURITY_EVENTS: Self = Self(
        1 << Interrupt::RxFifo0MessageLost as u32
            | 1 << Interrupt::RxFifo1MessageLost as u32
            | 1 << Interrupt::TxEventFifoElementLost as u32
            | 1 << Interrupt::ErrorPassive as u32
            | 1 << Interrupt::ProtocolErrorArbitration as u32
            | 1 << Interrupt::ProtocolErrorData as u32,
    );

    /// `true` if `interrupt` is in the set
    pub fn contains(&self, interrupt: Interrupt) -> bool {
        self.0 & u32::from(interrupt) != 0
    }

    /// Union of two sets
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Elements of `self` that are also in `other`
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// An iterator visiting the elements in ascending source order.
    pub fn iter(&self) -> Iter {
        Iter {
            flags: *self,
            index: 0,
        }
    }
}

impl FromIterator<Interrupt> for InterruptSet {
    fn from_iter<T: IntoIterator<Item = Interrupt>>(iter: T) -> Self {
        let mut set = 0_u32;
        for int in iter.into_iter() {
            set |= u32::from(int);
        }
        InterruptSet(set)
    }
}

impl core::fmt::Debug for InterruptSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "InterruptSet {{ ")?;
        for int in self.iter() {
            write!(f, "{} ", int.name())?;
        }
        write!(f, "}}")
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for InterruptSet {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "InterruptSet({=u32:#x})", self.0)
    }
}

/// A single interrupt.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Interrupt {
    /// RF0N
    RxFifo0NewMessage = 0,
    /// RF0F
    RxFifo0Full = 1,
    /// RF0L
    RxFifo0MessageLost = 2,
    /// RF1N
    RxFifo1NewMessage = 3,
    /// RF1F
    RxFifo1Full = 4,
    /// RF1L
    RxFifo1MessageLost = 5,
    /// HPM
    HighPriorityMessage = 6,
    /// TC
    TransmissionCompleted = 7,
    /// TCF
    TransmissionCancellationFinished = 8,
    /// TFE
    TxFifoEmpty = 9,
    /// TEFN
    TxEventFifoNewEntry = 10,
    /// TEFF
    TxEventFifoFull = 11,
    /// TEFL
    TxEventFifoElementLost = 12,
    /// TSW
    TimestampWraparound = 13,
    /// MRAF
    MessageRamAccessFailure = 14,
    /// TOO
    TimeoutOccurred = 15,
    /// ELO
    ErrorLoggingOverflow = 16,
    /// EP
    ErrorPassive = 17,
    /// EW
    WarningStatusChanged = 18,
    /// BO
    BusOff = 19,
    /// WDI
    Watchdog = 20,
    /// PEA
    ProtocolErrorArbitration = 21,
    /// PED
    ProtocolErrorData = 22,
}

impl Interrupt {
    fn name(self) -> &'static str {
        use Interrupt::*;
        match self {
            RxFifo0NewMessage => "RF0N",
            RxFifo0Full => "RF0F",
            RxFifo0MessageLost => "RF0L",
            RxFifo1NewMessage => "RF1N",
            RxFifo1Full => "RF1F",
            RxFifo1MessageLost => "RF1L",
            HighPriorityMessage => "HPM",
            TransmissionCompleted => "TC",
            TransmissionCancellationFinished => "TCF",
            TxFifoEmpty => "TFE",
            TxEventFifoNewEntry => "TEFN",
            TxEventFifoFull => "TEFF",
            TxEventFifoElementLost => "TEFL",
            TimestampWraparound => "TSW",
            MessageRamAccessFailure => "MRAF",
            TimeoutOccurred => "TOO",
            ErrorLoggingOverflow => "ELO",
            ErrorPassive => "EP",
            WarningStatusChanged => "EW",
            BusOff => "BO",
            Watchdog => "WDI",
            ProtocolErrorArbitration => "PEA",
            ProtocolErrorData => "PED",
        }
    }
}

impl From<Interrupt> for u32 {
    fn from(x: Interrupt) -> Self {
        1 << x as u32
    }
}

/// Interrupt numbers above 22 do not exist on the peripheral
#[derive(Debug)]
pub struct InvalidInterruptNumber;

impl TryFrom<u8> for Interrupt {
    type Error = InvalidInterruptNumber;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use Interrupt::*;
        let ret = match value {
            0 => RxFifo0NewMessage,
            1 => RxFifo0Full,
            2 => RxFifo0MessageLost,
            3 => RxFifo1NewMessage,
            4 => RxFifo1Full,
            5 => RxFifo1MessageLost,
            6 => HighPriorityMessage,
            7 => TransmissionCompleted,
            8 => TransmissionCancellationFinished,
            9 => TxFifoEmpty,
            10 => TxEventFifoNewEntry,
            11 => TxEventFifoFull,
            12 => TxEventFifoElementLost,
            13 => TimestampWraparound,
            14 => MessageRamAccessFailure,
            15 => TimeoutOccurred,
            16 => ErrorLoggingOverflow,
            17 => ErrorPassive,
            18 => WarningStatusChanged,
            19 => BusOff,
            20 => Watchdog,
            21 => ProtocolErrorArbitration,
            22 => ProtocolErrorData,
            23.. => Err(InvalidInterruptNumber)?,
        };
        Ok(ret)
    }
}

/// An iterator over the items of an [`InterruptSet`].
///
/// This `struct` is created by [`InterruptSet::iter`].
pub struct Iter {
    flags: InterruptSet,
    index: u8,
}

impl Iterator for Iter {
    type Item = Interrupt;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let i = self.index;
            self.index = self.index.saturating_add(1);
            // No gaps in the numbering, so this is `Some` until every source was checked
            let int = Interrupt::try_from(i).ok()?;
            if self.flags.0 & (1 << i) != 0 {
                return Some(int);
            }
        }
    }
}
