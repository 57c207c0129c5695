//! Messages received from the bus.

use super::*;

/// RX message copied out of an Rx FIFO element
#[derive(Copy, Clone, Debug)]
pub struct Message {
    header: Header,
    data: [u8; MAX_PAYLOAD],
}

impl Message {
    /// Copies the header and the payload words covered by the DLC
    pub fn read_from(element: &MessageElement) -> Self {
        let header = Header::read(&element.header);
        let len = dlc_to_len(header.dlc(), header.fd_format());
        Self {
            header,
            data: read_payload(element, len),
        }
    }

    /// Composite id; bit 31 marks an extended id, bit 30 an FD frame
    pub fn id(&self) -> CanId {
        self.header.can_id()
    }

    fn len(&self) -> usize {
        if self.header.is_remote_frame() {
            0
        } else {
            dlc_to_len(self.header.dlc(), self.header.fd_format())
        }
    }

    /// Data field
    pub fn data(&self) -> &[u8] {
        &self.data[..self.len()]
    }

    /// Timestamp counter value captured on start of frame reception
    pub fn timestamp(&self) -> u16 {
        self.header.timestamp()
    }
}
