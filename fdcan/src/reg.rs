//! FDCAN register block
//!
//! Layout and field positions follow the FDCAN peripheral of the STM32G0
//! family. Every register is a volatile 32-bit cell; the ones with fields the
//! driver interprets are typed with a `bitfield!` value so that reads and
//! writes go through named accessors.

use bitfield::bitfield;
use core::marker::PhantomData;
use vcell::VolatileCell;

/// Value type stored in a [`Reg`]
pub trait RegisterValue: Copy {
    /// Wraps raw register bits
    fn from_bits(bits: u32) -> Self;
    /// Raw register bits
    fn bits(self) -> u32;
}

impl RegisterValue for u32 {
    fn from_bits(bits: u32) -> Self {
        bits
    }

    fn bits(self) -> u32 {
        self
    }
}

macro_rules! register_value {
    ($($ty:ident),* $(,)?) => {
        $(
            impl RegisterValue for $ty {
                fn from_bits(bits: u32) -> Self {
                    Self(bits)
                }

                fn bits(self) -> u32 {
                    self.0
                }
            }
        )*
    };
}

/// A memory-mapped 32-bit register holding a `T`
#[repr(transparent)]
pub struct Reg<T> {
    cell: VolatileCell<u32>,
    _value: PhantomData<T>,
}

impl<T: RegisterValue> Reg<T> {
    /// A register holding zero, for blocks allocated in ordinary memory
    pub const fn new() -> Self {
        Self {
            cell: VolatileCell::new(0),
            _value: PhantomData,
        }
    }

    /// Volatile read
    pub fn read(&self) -> T {
        T::from_bits(self.cell.get())
    }

    /// Volatile write
    pub fn write(&self, value: T) {
        self.cell.set(value.bits())
    }

    /// Read, change with `f`, write back
    pub fn modify<F: FnOnce(&mut T)>(&self, f: F) {
        let mut value = self.read();
        f(&mut value);
        self.write(value);
    }

    /// Raw volatile read
    pub fn bits(&self) -> u32 {
        self.cell.get()
    }

    /// Raw volatile write
    pub fn set_bits(&self, bits: u32) {
        self.cell.set(bits)
    }
}

impl<T: RegisterValue> Default for Reg<T> {
    fn default() -> Self {
        Self::new()
    }
}

bitfield! {
    /// CC control register
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct Cccr(u32);
    impl Debug;
    /// Initialization
    pub init, set_init: 0;
    /// Configuration change enable
    pub cce, set_cce: 1;
    /// Restricted operation mode
    pub asm, set_asm: 2;
    /// Clock stop acknowledge
    pub csa, set_csa: 3;
    /// Clock stop request
    pub csr, set_csr: 4;
    /// Bus monitoring mode
    pub mon, set_mon: 5;
    /// Disable automatic retransmission
    pub dar, set_dar: 6;
    /// Test mode enable
    pub test, set_test: 7;
    /// FD operation enable
    pub fdoe, set_fdoe: 8;
    /// Bit rate switch enable
    pub brse, set_brse: 9;
    /// Protocol exception handling disable
    pub pxhd, set_pxhd: 12;
    /// Edge filtering during bus integration
    pub efbi, set_efbi: 13;
    /// Transmit pause
    pub txp, set_txp: 14;
    /// Non ISO operation
    pub niso, set_niso: 15;
}

bitfield! {
    /// Nominal bit timing and prescaler register
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct Nbtp(u32);
    impl Debug;
    /// Nominal time segment after sample point, minus one
    pub u8, ntseg2, set_ntseg2: 6, 0;
    /// Nominal time segment before sample point, minus one
    pub u8, ntseg1, set_ntseg1: 15, 8;
    /// Nominal bit rate prescaler, minus one
    pub u16, nbrp, set_nbrp: 24, 16;
    /// Nominal resynchronization jump width, minus one
    pub u8, nsjw, set_nsjw: 31, 25;
}

bitfield! {
    /// Data bit timing and prescaler register
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct Dbtp(u32);
    impl Debug;
    /// Data resynchronization jump width, minus one
    pub u8, dsjw, set_dsjw: 3, 0;
    /// Data time segment after sample point, minus one
    pub u8, dtseg2, set_dtseg2: 7, 4;
    /// Data time segment before sample point, minus one
    pub u8, dtseg1, set_dtseg1: 12, 8;
    /// Data bit rate prescaler, minus one
    pub u8, dbrp, set_dbrp: 20, 16;
    /// Transceiver delay compensation
    pub tdc, set_tdc: 23;
}

bitfield! {
    /// Test register
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct Test(u32);
    impl Debug;
    /// Loop back mode
    pub lbck, set_lbck: 4;
}

bitfield! {
    /// Timestamp counter configuration
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct Tscc(u32);
    impl Debug;
    /// Timestamp select
    pub u8, tss, set_tss: 1, 0;
    /// Timestamp counter prescaler, minus one
    pub u8, tcp, set_tcp: 19, 16;
}

bitfield! {
    /// Error counter register
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct Ecr(u32);
    impl Debug;
    /// Transmit error counter
    pub u8, tec, _: 7, 0;
    /// Receive error counter
    pub u8, rec, _: 14, 8;
    /// Receive error passive
    pub rp, _: 15;
    /// CAN error logging
    pub u8, cel, _: 23, 16;
}

bitfield! {
    /// Protocol status register
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct Psr(u32);
    impl Debug;
    /// Last error code
    pub u8, lec, _: 2, 0;
    /// Activity
    pub u8, act, _: 4, 3;
    /// Error passive
    pub ep, _: 5;
    /// Warning status
    pub ew, _: 6;
    /// Bus-off status
    pub bo, _: 7;
    /// Data last error code
    pub u8, dlec, _: 10, 8;
}

bitfield! {
    /// Interrupt line enable register
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct Ile(u32);
    impl Debug;
    /// Enable interrupt line 0
    pub eint0, set_eint0: 0;
    /// Enable interrupt line 1
    pub eint1, set_eint1: 1;
}

bitfield! {
    /// Global filter configuration
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct Rxgfc(u32);
    impl Debug;
    /// Reject remote frames extended
    pub rrfe, set_rrfe: 0;
    /// Reject remote frames standard
    pub rrfs, set_rrfs: 1;
    /// Accept non-matching frames extended
    pub u8, anfe, set_anfe: 3, 2;
    /// Accept non-matching frames standard
    pub u8, anfs, set_anfs: 5, 4;
    /// Number of standard filter elements
    pub u8, lss, set_lss: 20, 16;
    /// Number of extended filter elements
    pub u8, lse, set_lse: 27, 24;
}

bitfield! {
    /// Rx FIFO status
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct Rxfs(u32);
    impl Debug;
    /// Fill level
    pub u8, ffl, set_ffl: 3, 0;
    /// Get index
    pub u8, fgi, set_fgi: 9, 8;
    /// Put index
    pub u8, fpi, set_fpi: 17, 16;
    /// FIFO full
    pub ff, set_ff: 24;
    /// Message lost
    pub rfl, set_rfl: 25;
}

bitfield! {
    /// Tx buffer configuration
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct Txbc(u32);
    impl Debug;
    /// Tx FIFO/queue mode, set for queue
    pub tfqm, set_tfqm: 24;
}

bitfield! {
    /// Tx FIFO/queue status
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct Txfqs(u32);
    impl Debug;
    /// Free level
    pub u8, tffl, set_tffl: 2, 0;
    /// Get index
    pub u8, tfgi, set_tfgi: 9, 8;
    /// Put index
    pub u8, tfqpi, set_tfqpi: 17, 16;
    /// FIFO/queue full
    pub tfqf, set_tfqf: 21;
}

bitfield! {
    /// Tx event FIFO status
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct Txefs(u32);
    impl Debug;
    /// Fill level
    pub u8, effl, set_effl: 2, 0;
    /// Get index
    pub u8, efgi, set_efgi: 9, 8;
    /// Put index
    pub u8, efpi, set_efpi: 17, 16;
    /// FIFO full
    pub eff, set_eff: 24;
    /// Element lost
    pub tefl, set_tefl: 25;
}

register_value!(Cccr, Nbtp, Dbtp, Test, Tscc, Ecr, Psr, Ile, Rxgfc, Rxfs, Txbc, Txfqs, Txefs);

/// Registers of one Rx FIFO
#[repr(C)]
pub struct RxFifoRegs {
    /// Status
    pub s: Reg<Rxfs>,
    /// Acknowledge
    pub a: Reg<u32>,
}

/// Register block of one FDCAN instance
#[repr(C)]
pub struct RegisterBlock {
    /// Core release
    pub crel: Reg<u32>,
    /// Endian
    pub endn: Reg<u32>,
    _reserved0: Reg<u32>,
    /// Data bit timing and prescaler
    pub dbtp: Reg<Dbtp>,
    /// Test
    pub test: Reg<Test>,
    /// RAM watchdog
    pub rwd: Reg<u32>,
    /// CC control
    pub cccr: Reg<Cccr>,
    /// Nominal bit timing and prescaler
    pub nbtp: Reg<Nbtp>,
    /// Timestamp counter configuration
    pub tscc: Reg<Tscc>,
    /// Timestamp counter value
    pub tscv: Reg<u32>,
    /// Timeout counter configuration
    pub tocc: Reg<u32>,
    /// Timeout counter value
    pub tocv: Reg<u32>,
    _reserved1: [Reg<u32>; 4],
    /// Error counter
    pub ecr: Reg<Ecr>,
    /// Protocol status
    pub psr: Reg<Psr>,
    /// Transmitter delay compensation
    pub tdcr: Reg<u32>,
    _reserved2: Reg<u32>,
    /// Interrupt
    pub ir: Reg<u32>,
    /// Interrupt enable
    pub ie: Reg<u32>,
    /// Interrupt line select
    pub ils: Reg<u32>,
    /// Interrupt line enable
    pub ile: Reg<Ile>,
    _reserved3: [Reg<u32>; 8],
    /// Global filter configuration
    pub rxgfc: Reg<Rxgfc>,
    /// Extended ID AND mask
    pub xidam: Reg<u32>,
    /// High priority message status
    pub hpms: Reg<u32>,
    _reserved4: Reg<u32>,
    /// Rx FIFO 0 and 1 status/acknowledge
    pub rxf: [RxFifoRegs; 2],
    _reserved5: [Reg<u32>; 8],
    /// Tx buffer configuration
    pub txbc: Reg<Txbc>,
    /// Tx FIFO/queue status
    pub txfqs: Reg<Txfqs>,
    /// Tx buffer request pending
    pub txbrp: Reg<u32>,
    /// Tx buffer add request
    pub txbar: Reg<u32>,
    /// Tx buffer cancellation request
    pub txbcr: Reg<u32>,
    /// Tx buffer transmission occurred
    pub txbto: Reg<u32>,
    /// Tx buffer cancellation finished
    pub txbcf: Reg<u32>,
    /// Tx buffer transmission interrupt enable
    pub txbtie: Reg<u32>,
    /// Tx buffer cancellation finished interrupt enable
    pub txbcie: Reg<u32>,
    /// Tx event FIFO status
    pub txefs: Reg<Txefs>,
    /// Tx event FIFO acknowledge
    pub txefa: Reg<u32>,
}

const _: () = assert!(core::mem::size_of::<RegisterBlock>() == 0xec);

impl RegisterBlock {
    /// A zeroed register block in ordinary memory.
    ///
    /// Used to drive the controller engine without hardware; the owner of the
    /// block plays the peripheral by writing the status registers.
    pub const fn new() -> Self {
        Self {
            crel: Reg::new(),
            endn: Reg::new(),
            _reserved0: Reg::new(),
            dbtp: Reg::new(),
            test: Reg::new(),
            rwd: Reg::new(),
            cccr: Reg::new(),
            nbtp: Reg::new(),
            tscc: Reg::new(),
            tscv: Reg::new(),
            tocc: Reg::new(),
            tocv: Reg::new(),
            _reserved1: [const { Reg::new() }; 4],
            ecr: Reg::new(),
            psr: Reg::new(),
            tdcr: Reg::new(),
            _reserved2: Reg::new(),
            ir: Reg::new(),
            ie: Reg::new(),
            ils: Reg::new(),
            ile: Reg::new(),
            _reserved3: [const { Reg::new() }; 8],
            rxgfc: Reg::new(),
            xidam: Reg::new(),
            hpms: Reg::new(),
            _reserved4: Reg::new(),
            rxf: [const {
                RxFifoRegs {
                    s: Reg::new(),
                    a: Reg::new(),
                }
            }; 2],
            _reserved5: [const { Reg::new() }; 8],
            txbc: Reg::new(),
            txfqs: Reg::new(),
            txbrp: Reg::new(),
            txbar: Reg::new(),
            txbcr: Reg::new(),
            txbto: Reg::new(),
            txbcf: Reg::new(),
            txbtie: Reg::new(),
            txbcie: Reg::new(),
            txefs: Reg::new(),
            txefa: Reg::new(),
        }
    }
}

impl Default for RegisterBlock {
    fn default() -> Self {
        Self::new()
    }
}

/// Clock divider register shared by both FDCAN instances
#[repr(C)]
pub struct ClockDivider {
    /// Input clock divider, 0 divides by one, `n` divides by `2 * n`
    pub ckdiv: Reg<u32>,
}

impl ClockDivider {
    /// A zeroed divider register in ordinary memory
    pub const fn new() -> Self {
        Self { ckdiv: Reg::new() }
    }
}

impl Default for ClockDivider {
    fn default() -> Self {
        Self::new()
    }
}
