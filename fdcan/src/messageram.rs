//! Layout of the RAM shared between core and peripheral.
//!
//! The FDCAN message RAM has a fixed layout: every zone starts at a fixed
//! offset and holds a fixed number of elements, so the whole region of one
//! controller is overlaid with a single `#[repr(C)]` struct.
use vcell::VolatileCell;

/// One 32-bit word of message RAM
pub type Word = VolatileCell<u32>;

/// Base address of the message RAM of FDCAN1
pub const SRAMCAN_BASE: usize = 0x4000_b400;
/// Size in bytes of the message RAM region of one controller
pub const SRAMCAN_SIZE: usize = 0x350;

/// Standard ID filter elements per controller
pub const STANDARD_FILTERS: usize = 28;
/// Extended ID filter elements per controller
pub const EXTENDED_FILTERS: usize = 8;
/// Elements per Rx FIFO
pub const RX_FIFO_ELEMENTS: usize = 3;
/// Elements in the Tx event FIFO
pub const TX_EVENT_ELEMENTS: usize = 3;
/// Tx buffers used as FIFO or queue
pub const TX_BUFFERS: usize = 3;
/// Payload words of an Rx or Tx element
pub const PAYLOAD_WORDS: usize = 16;

/// Rx FIFO or Tx buffer element: two header words and up to 64 payload bytes
#[repr(C)]
pub struct MessageElement {
    /// R0/T0 and R1/T1
    pub header: [Word; 2],
    /// Payload, little endian byte order within each word
    pub data: [Word; PAYLOAD_WORDS],
}

impl MessageElement {
    const fn new() -> Self {
        Self {
            header: [const { Word::new(0) }; 2],
            data: [const { Word::new(0) }; PAYLOAD_WORDS],
        }
    }

    fn zero(&self) {
        self.header.iter().chain(self.data.iter()).for_each(|w| w.set(0));
    }
}

/// Message RAM region of one controller
#[repr(C)]
pub struct MessageRam {
    /// 11-bit filter list
    pub filters_standard: [Word; STANDARD_FILTERS],
    /// 29-bit filter list, two words per element
    pub filters_extended: [[Word; 2]; EXTENDED_FILTERS],
    /// Rx FIFO 0 and Rx FIFO 1
    pub rx_fifo: [[MessageElement; RX_FIFO_ELEMENTS]; 2],
    /// Tx event FIFO, two words per element
    pub tx_event_fifo: [[Word; 2]; TX_EVENT_ELEMENTS],
    /// Tx buffers
    pub tx_buffers: [MessageElement; TX_BUFFERS],
}

const _: () = assert!(core::mem::size_of::<MessageRam>() == SRAMCAN_SIZE);

impl MessageRam {
    /// A zeroed region in ordinary memory
    pub const fn new() -> Self {
        Self {
            filters_standard: [const { Word::new(0) }; STANDARD_FILTERS],
            filters_extended: [const { [const { Word::new(0) }; 2] }; EXTENDED_FILTERS],
            rx_fifo: [const { [const { MessageElement::new() }; RX_FIFO_ELEMENTS] }; 2],
            tx_event_fifo: [const { [const { Word::new(0) }; 2] }; TX_EVENT_ELEMENTS],
            tx_buffers: [const { MessageElement::new() }; TX_BUFFERS],
        }
    }

    /// Clears every word of the region
    pub fn zero(&self) {
        self.filters_standard.iter().for_each(|w| w.set(0));
        self.filters_extended
            .iter()
            .chain(self.tx_event_fifo.iter())
            .flatten()
            .for_each(|w| w.set(0));
        self.rx_fifo
            .iter()
            .flatten()
            .chain(self.tx_buffers.iter())
            .for_each(MessageElement::zero);
    }
}

impl Default for MessageRam {
    fn default() -> Self {
        Self::new()
    }
}
