//! Transmit FIFO/queue

use crate::message::tx;
use crate::messageram::{MessageElement, MessageRam, TX_BUFFERS};
use crate::reg::RegisterBlock;
use core::convert::Infallible;

/// Set of Tx buffers
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TxBufferSet(pub u32);

impl TxBufferSet {
    /// Every buffer; bits beyond the implemented buffers are ignored by the
    /// peripheral
    pub fn all() -> Self {
        Self(u32::MAX)
    }

    /// The buffers that exist on this peripheral
    pub fn implemented() -> Self {
        Self((1 << TX_BUFFERS) - 1)
    }

    /// Just the buffer at `index`
    pub fn single(index: usize) -> Self {
        Self(1 << index)
    }
}

/// Tx buffers of one controller, used as FIFO or queue
pub struct TxQueue<'a> {
    regs: &'a RegisterBlock,
    memory: &'a [MessageElement; TX_BUFFERS],
}

impl<'a> TxQueue<'a> {
    /// Registers and buffers of one controller
    pub fn new(regs: &'a RegisterBlock, ram: &'a MessageRam) -> Self {
        Self {
            regs,
            memory: &ram.tx_buffers,
        }
    }

    /// Returns the put index if available. `None` if the queue is full.
    pub fn find_put_index(&self) -> Option<usize> {
        let status = self.regs.txfqs.read();
        if status.tfqf() {
            None
        } else {
            Some(usize::from(status.tfqpi()) % TX_BUFFERS)
        }
    }

    /// Puts a frame in the next free buffer and requests its transmission.
    /// Fails with [`nb::Error::WouldBlock`] if the queue is full.
    pub fn transmit(&mut self, message: &tx::Message) -> nb::Result<usize, Infallible> {
        let index = self.find_put_index().ok_or(nb::Error::WouldBlock)?;
        message.write_to(&self.memory[index]);
        self.add_request(index);
        Ok(index)
    }

    fn add_request(&self, index: usize) {
        self.regs.txbar.set_bits(TxBufferSet::single(index).0)
    }

    /// Requests cancellation of the given buffers
    pub fn cancel_multi(&mut self, to_be_canceled: TxBufferSet) {
        self.regs.txbcr.set_bits(to_be_canceled.0)
    }

    /// Enables the per-buffer transmission completed interrupts
    pub fn enable_transmission_completed_interrupt(&mut self, to_be_enabled: TxBufferSet) {
        let r = self.regs.txbtie.bits();
        self.regs.txbtie.set_bits(r | to_be_enabled.0);
    }

    /// Enables the per-buffer cancellation finished interrupts
    pub fn enable_cancellation_interrupt(&mut self, to_be_enabled: TxBufferSet) {
        let r = self.regs.txbcie.bits();
        self.regs.txbcie.set_bits(r | to_be_enabled.0);
    }

    /// Disables every per-buffer interrupt
    pub fn disable_interrupts(&mut self) {
        self.regs.txbtie.set_bits(0);
        self.regs.txbcie.set_bits(0);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::reg::Txfqs;
    use fdcan_core::CanId;

    fn message() -> tx::Message {
        tx::MessageBuilder {
            id: CanId(0x10),
            payload: &[1, 2, 3],
            bit_rate_switching: false,
            padding: 0,
            store_tx_event: Some(7),
        }
        .build()
        .unwrap()
    }

    #[test]
    fn transmit_uses_put_index() {
        let regs = RegisterBlock::new();
        let ram = MessageRam::new();
        let mut status = Txfqs(0);
        status.set_tfqpi(2);
        regs.txfqs.write(status);

        let mut queue = TxQueue::new(&regs, &ram);
        assert_eq!(queue.transmit(&message()).ok(), Some(2));
        assert_eq!(regs.txbar.bits(), 1 << 2);
        assert_eq!(ram.tx_buffers[2].header[0].get(), 0x10 << 18);
        assert_eq!(ram.tx_buffers[2].data[0].get(), 0x0003_0201);
        assert_eq!(ram.tx_buffers[0].header[0].get(), 0);
    }

    #[test]
    fn full_queue_would_block() {
        let regs = RegisterBlock::new();
        let ram = MessageRam::new();
        let mut status = Txfqs(0);
        status.set_tfqf(true);
        regs.txfqs.write(status);

        let mut queue = TxQueue::new(&regs, &ram);
        assert!(matches!(queue.transmit(&message()), Err(nb::Error::WouldBlock)));
        assert_eq!(regs.txbar.bits(), 0);
        assert_eq!(ram.tx_buffers[0].header[1].get(), 0);
    }

    #[test]
    fn cancel_all() {
        let regs = RegisterBlock::new();
        let ram = MessageRam::new();
        let mut queue = TxQueue::new(&regs, &ram);
        queue.cancel_multi(TxBufferSet::all());
        assert_eq!(regs.txbcr.bits(), u32::MAX);
    }
}
