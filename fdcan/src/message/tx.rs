//! Messages to be sent on the bus

use super::*;

/// TX message in the peripheral's representation
#[derive(Copy, Clone, Debug)]
pub struct Message {
    pub(crate) header: Header,
    data: [u8; MAX_PAYLOAD],
    len: usize,
}

impl Message {
    /// Copies the message into a Tx buffer element
    pub fn write_to(&self, element: &MessageElement) {
        element.header[0].set(self.header.0[0]);
        element.header[1].set(self.header.0[1]);
        write_payload(element, &self.data, self.len);
    }

    /// Data length code
    pub fn dlc(&self) -> u8 {
        self.header.dlc()
    }

    /// Payload as transmitted, including padding
    pub fn data(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

/// Describes a CAN message/frame that is not yet converted to the
/// representation the peripheral understands.
pub struct MessageBuilder<'a> {
    /// Composite id; bit 31 selects the extended format, bit 30 the FD format
    pub id: CanId,
    /// Payload bytes
    pub payload: &'a [u8],
    /// Set BRS on FD frames
    pub bit_rate_switching: bool,
    /// Fills FD payloads up to the next valid length
    pub padding: u8,
    /// If `Some(marker)`, this message will store an event identified by
    /// `marker` in the TX event queue.
    pub store_tx_event: Option<u8>,
}

impl<'a> MessageBuilder<'a> {
    /// Create the message in the format required by the peripheral.
    pub fn build(self) -> Result<Message, TooMuchData> {
        let fdf = self.id.is_fd();
        let len = self.payload.len();
        let dlc = len_to_dlc(len, fdf)?;
        let frame_len = dlc_to_len(dlc, fdf);

        let mut data = [self.padding; MAX_PAYLOAD];
        data[..len].copy_from_slice(self.payload);

        let (id_field, xtd) = if self.id.is_extended() {
            (self.id.raw_id(), true)
        } else {
            (self.id.raw_id() << 18, false)
        };
        let brs = fdf && self.bit_rate_switching;
        let efc = self.store_tx_event.is_some();
        let mm = self.store_tx_event.unwrap_or(0);

        let t0 = id_field | (xtd as u32) << 30;
        let t1 = (((dlc & 0xf) as u32) << 16)
            | ((brs as u32) << 20)
            | ((fdf as u32) << 21)
            | ((efc as u32) << 23)
            | ((mm as u32) << 24);
        Ok(Message {
            header: Header([t0, t1]),
            data,
            len: frame_len,
        })
    }
}
