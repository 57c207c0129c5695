//! Events for messages sent on the bus

use super::*;

/// TX event in the peripheral's representation
#[derive(Copy, Clone, Debug)]
pub struct TxEvent(pub(crate) Header);

impl TxEvent {
    /// Copies an element out of the Tx event FIFO
    pub fn read_from(element: &[crate::messageram::Word; 2]) -> Self {
        Self(Header::read(element))
    }

    /// Marker given to the message when it was written
    pub fn message_marker(&self) -> u8 {
        (self.0 .0[1] >> 24) as u8
    }

    /// Timestamp counter value captured on start of frame transmission
    pub fn timestamp(&self) -> u16 {
        self.0.timestamp()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::messageram::MessageRam;

    #[test]
    fn marker_and_timestamp() {
        let ram = MessageRam::new();
        let element = &ram.tx_event_fifo[1];
        element[0].set(0x55 << 18);
        element[1].set(0xa7 << 24 | 2 << 22 | 8 << 16 | 0x1234);

        let event = TxEvent::read_from(element);
        assert_eq!(event.message_marker(), 0xa7);
        assert_eq!(event.timestamp(), 0x1234);
    }
}
