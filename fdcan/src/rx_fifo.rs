//! Receive FIFOs
use crate::config::RxFifo as Fifo;
use crate::message::rx;
use crate::messageram::{MessageElement, MessageRam, RX_FIFO_ELEMENTS};
use crate::reg::{RegisterBlock, RxFifoRegs};

/// Receive FIFO 0 or 1 of one controller
pub struct RxFifo<'a> {
    regs: &'a RxFifoRegs,
    memory: &'a [MessageElement; RX_FIFO_ELEMENTS],
}

impl<'a> RxFifo<'a> {
    /// Registers and elements of `fifo`
    pub fn new(regs: &'a RegisterBlock, ram: &'a MessageRam, fifo: Fifo) -> Self {
        Self {
            regs: &regs.rxf[fifo.index()],
            memory: &ram.rx_fifo[fifo.index()],
        }
    }

    /// Element indices holding unread messages, oldest first.
    ///
    /// The status is read once, so the iteration is bounded by the fill level
    /// seen at the time of the call.
    pub fn pending(&self) -> impl Iterator<Item = usize> {
        let status = self.regs.s.read();
        let fill = usize::from(status.ffl()).min(RX_FIFO_ELEMENTS);
        let get_index = usize::from(status.fgi());
        (0..fill).map(move |k| (get_index + k) % RX_FIFO_ELEMENTS)
    }

    /// Copies the message at `index` out of the FIFO
    pub fn read(&self, index: usize) -> rx::Message {
        rx::Message::read_from(&self.memory[index % RX_FIFO_ELEMENTS])
    }

    /// Marks the message at `index` and every older one as read
    pub fn acknowledge(&self, index: usize) {
        self.regs.a.set_bits(index as u32 & 0x7)
    }

}
