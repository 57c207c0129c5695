//! Information about successfully transmitted messages
//!
//! Events are only generated for messages with [`store_tx_event`] set.
//!
//! [`store_tx_event`]: crate::message::tx::MessageBuilder::store_tx_event
use crate::message::TxEvent;
use crate::messageram::{MessageRam, Word, TX_EVENT_ELEMENTS};
use crate::reg::RegisterBlock;

/// Transmit event queue of one controller
pub struct TxEventFifo<'a> {
    regs: &'a RegisterBlock,
    memory: &'a [[Word; 2]; TX_EVENT_ELEMENTS],
}

impl<'a> TxEventFifo<'a> {
    /// Registers and elements of one controller
    pub fn new(regs: &'a RegisterBlock, ram: &'a MessageRam) -> Self {
        Self {
            regs,
            memory: &ram.tx_event_fifo,
        }
    }

    /// Element indices holding unread events, oldest first, bounded by the
    /// fill level at the time of the call
    pub fn pending(&self) -> impl Iterator<Item = usize> {
        let status = self.regs.txefs.read();
        let fill = usize::from(status.effl()).min(TX_EVENT_ELEMENTS);
        let get_index = usize::from(status.efgi());
        (0..fill).map(move |k| (get_index + k) % TX_EVENT_ELEMENTS)
    }

    /// Copies the event at `index`
    pub fn read(&self, index: usize) -> TxEvent {
        TxEvent::read_from(&self.memory[index % TX_EVENT_ELEMENTS])
    }

    /// Marks the event at `index` and every older one as read
    pub fn acknowledge(&self, index: usize) {
        self.regs.txefa.set_bits(index as u32 & 0x3)
    }

}
