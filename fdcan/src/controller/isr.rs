//! Interrupt servicing
//!
//! Each flagged and enabled source is handled, then its flag is cleared.
//! FIFO drains are bounded by the fill level read when the drain starts.

use super::{wait_until, Controller};
use crate::config::RxFifo;
use crate::interrupt::{Interrupt, InterruptSet};
use crate::rx_fifo::RxFifo as RxQueue;
use crate::tx_buffers::{TxBufferSet, TxQueue};
use crate::tx_event_fifo::TxEventFifo;
use fdcan_core::{
    ApiId, BusError, CanIf, ControllerState, Det, ErrorId, Mailbox, PduId, PduInfo,
    RuntimeErrorId,
};

impl<'a> Controller<'a> {
    /// Services every pending interrupt source of this controller
    pub fn on_interrupt<U: CanIf, D: Det>(&mut self, canif: &mut U, det: &mut D) {
        let regs = self.instance.regs;
        let flagged = InterruptSet(regs.ir.bits());
        let enabled = InterruptSet(regs.ie.bits());
        for interrupt in flagged.intersection(enabled).iter() {
            self.dispatch(interrupt, canif, det);
            regs.ir.set_bits(u32::from(interrupt));
        }
    }

    fn dispatch<U: CanIf, D: Det>(&mut self, interrupt: Interrupt, canif: &mut U, det: &mut D) {
        use Interrupt::*;
        match interrupt {
            RxFifo0NewMessage => self.receive(RxFifo::Fifo0, 1, canif),
            RxFifo1NewMessage => self.receive(RxFifo::Fifo1, 1, canif),
            RxFifo0Full => self.receive(RxFifo::Fifo0, usize::MAX, canif),
            RxFifo1Full => self.receive(RxFifo::Fifo1, usize::MAX, canif),
            RxFifo0MessageLost | RxFifo1MessageLost | TxEventFifoElementLost => {
                self.data_lost(canif, det)
            }
            TransmissionCompleted | TxEventFifoNewEntry => self.confirm(1, canif),
            TxEventFifoFull | TxFifoEmpty => self.confirm(usize::MAX, canif),
            ErrorPassive => self.error_passive(canif),
            BusOff => self.bus_off(canif, det),
            ProtocolErrorArbitration => {
                let lec = self.instance.regs.psr.read().lec();
                self.protocol_error(lec, canif)
            }
            ProtocolErrorData => {
                let dlec = self.instance.regs.psr.read().dlec();
                self.protocol_error(dlec, canif)
            }
            HighPriorityMessage
            | TransmissionCancellationFinished
            | TimestampWraparound
            | MessageRamAccessFailure
            | TimeoutOccurred
            | ErrorLoggingOverflow
            | WarningStatusChanged
            | Watchdog => {}
        }
    }

    /// Hands up to `limit` frames of `fifo` to the upper layer
    fn receive<U: CanIf>(&mut self, fifo: RxFifo, limit: usize, canif: &mut U) {
        let queue = RxQueue::new(self.instance.regs, self.instance.ram, fifo);
        for index in queue.pending().take(limit) {
            let message = queue.read(index);
            if self.general.time_stamp {
                self.ingress[fifo.index()] = Some(message.timestamp());
            }
            match self.fifo_hoh[fifo.index()] {
                Some(hoh) => {
                    let mailbox = Mailbox {
                        hoh,
                        controller: self.id,
                        id: message.id(),
                    };
                    let data = message.data();
                    let pdu = PduInfo {
                        length: data.len() as u8,
                        sdu: data,
                    };
                    canif.rx_indication(&mailbox, &pdu);
                }
                None => warn!(
                    "controller {}: no receive object for fifo {}",
                    self.id,
                    fifo.index()
                ),
            }
            queue.acknowledge(index);
        }
    }

    /// Confirms up to `limit` transmitted frames from the Tx event FIFO
    fn confirm<U: CanIf>(&mut self, limit: usize, canif: &mut U) {
        let events = TxEventFifo::new(self.instance.regs, self.instance.ram);
        for index in events.pending().take(limit) {
            let event = events.read(index);
            let pdu = PduId::from(event.message_marker());
            if self.general.time_stamp {
                if let Some(record) = self
                    .egress
                    .iter_mut()
                    .flatten()
                    .find(|r| r.pdu == pdu && r.timestamp.is_none())
                {
                    record.timestamp = Some(event.timestamp());
                }
            }
            canif.tx_confirmation(pdu);
            events.acknowledge(index);
        }
    }

    fn data_lost<U: CanIf, D: Det>(&mut self, canif: &mut U, det: &mut D) {
        warn!("controller {} lost a message", self.id);
        det.report_runtime_error(ApiId::Isr, RuntimeErrorId::DataLost);
        if self.general.security_event_reporting {
            canif.error_notification(self.id, BusError::Overload);
        }
    }

    fn error_passive<U: CanIf>(&mut self, canif: &mut U) {
        let regs = self.instance.regs;
        if !regs.psr.read().ep() {
            return;
        }
        let ecr = regs.ecr.read();
        debug!("controller {} error passive", self.id);
        canif.controller_error_state_passive(self.id, ecr.rec(), ecr.tec());
    }

    /// The peripheral enters init mode by itself on bus-off. Pending
    /// transmissions are dropped and the controller is reported stopped.
    fn bus_off<U: CanIf, D: Det>(&mut self, canif: &mut U, det: &mut D) {
        let regs = self.instance.regs;
        if !regs.psr.read().bo() {
            return;
        }
        TxQueue::new(regs, self.instance.ram).cancel_multi(TxBufferSet::all());
        if wait_until(self.general.acknowledge_timeout, || regs.cccr.read().init()).is_err() {
            error!("controller {} did not enter init mode after bus-off", self.id);
            det.report_error(ApiId::Isr, ErrorId::InitFailed);
            return;
        }
        regs.cccr.modify(|r| r.set_cce(true));
        self.state = ControllerState::Stopped;
        warn!("controller {} bus-off", self.id);
        canif.controller_bus_off(self.id);
    }

    fn protocol_error<U: CanIf>(&mut self, code: u8, canif: &mut U) {
        let error = match code {
            1 => BusError::CheckStuffingFailed,
            2 => BusError::CheckFormFailed,
            3 => BusError::CheckAckFailed,
            4 => BusError::BitMonitoring1,
            5 => BusError::BitMonitoring0,
            6 => BusError::CheckCrcFailed,
            // No error or no change
            _ => return,
        };
        canif.error_notification(self.id, error);
    }
}

#[cfg(test)]
mod test {
    use super::super::test_support::*;
    use super::*;
    use crate::config::General;
    use crate::reg::{Rxfs, Txefs};
    use fdcan_core::{CanId, ErrorState};

    #[test]
    fn new_message_is_indicated_once() {
        let hw = Hw::new();
        let mut c = hw.controller(General::default());
        c.init().unwrap();
        hw.ram.rx_fifo[1][0].header[0].set(0x123 << 18);
        hw.ram.rx_fifo[1][0].header[1].set(2 << 16);
        hw.ram.rx_fifo[1][0].data[0].set(0xbbaa);
        hw.ram.rx_fifo[1][1].header[1].set(1 << 16);
        let mut status = Rxfs(0);
        status.set_ffl(2);
        hw.regs.rxf[1].s.write(status);
        hw.regs.ie.set_bits(1 << 3);
        hw.regs.ir.set_bits(1 << 3);

        let mut up = Upper::default();
        c.on_interrupt(&mut up.canif, &mut up.det);
        assert_eq!(up.canif.rx.len(), 1);
        let (mailbox, data) = &up.canif.rx[0];
        assert_eq!(mailbox.hoh, 0);
        assert_eq!(mailbox.id, CanId(0x123));
        assert_eq!(data.as_slice(), &[0xaa, 0xbb]);
        assert_eq!(hw.regs.rxf[1].a.bits(), 0);
    }

    #[test]
    fn full_fifo_is_drained_once() {
        let hw = Hw::new();
        let mut c = hw.controller(General::default());
        c.init().unwrap();
        let mut status = Rxfs(0);
        status.set_ffl(3);
        status.set_fgi(2);
        hw.regs.rxf[1].s.write(status);
        hw.regs.ie.set_bits(1 << 4);
        hw.regs.ir.set_bits(1 << 4);

        let mut up = Upper::default();
        c.on_interrupt(&mut up.canif, &mut up.det);
        assert_eq!(up.canif.rx.len(), 3);
        // Elements 2, 0, 1
        assert_eq!(hw.regs.rxf[1].a.bits(), 1);
    }

    #[test]
    fn disabled_sources_are_left_flagged() {
        let hw = Hw::new();
        let mut c = hw.controller(General::default());
        c.init().unwrap();
        let mut status = Rxfs(0);
        status.set_ffl(1);
        hw.regs.rxf[0].s.write(status);
        hw.regs.ie.set_bits(0);
        hw.regs.ir.set_bits(1 << 0);

        let mut up = Upper::default();
        c.on_interrupt(&mut up.canif, &mut up.det);
        assert!(up.canif.rx.is_empty());
    }

    #[test]
    fn confirmation_records_egress_time() {
        let hw = Hw::new();
        let general = General {
            time_stamp: true,
            ..General::default()
        };
        let mut c = hw.controller(general);
        c.init().unwrap();
        c.enable_egress_time_stamp(2);
        c.write(2, 0, CanId(0x7), &[], 0x21).unwrap();

        hw.ram.tx_event_fifo[0][1].set(0x21 << 24 | 0x0456);
        let mut status = Txefs(0);
        status.set_effl(1);
        hw.regs.txefs.write(status);
        hw.regs.ie.set_bits(1 << 10);
        hw.regs.ir.set_bits(1 << 10);

        let mut up = Upper::default();
        c.on_interrupt(&mut up.canif, &mut up.det);
        assert_eq!(up.canif.tx, [0x21]);
        assert_eq!(c.egress_time_stamp(0x21, 2), Some(0x0456));
        assert_eq!(c.egress_time_stamp(0x21, 3), None);
    }

    #[test]
    fn lost_message_with_security_reporting() {
        let hw = Hw::new();
        let general = General {
            security_event_reporting: true,
            ..General::default()
        };
        let mut c = hw.controller(general);
        c.init().unwrap();
        assert_eq!(
            hw.regs.ie.bits() & InterruptSet::SECURITY_EVENTS.0,
            InterruptSet::SECURITY_EVENTS.0
        );
        hw.regs.ir.set_bits(1 << 2);

        let mut up = Upper::default();
        c.on_interrupt(&mut up.canif, &mut up.det);
        assert_eq!(up.det.runtime, [(ApiId::Isr, RuntimeErrorId::DataLost)]);
        assert_eq!(up.canif.errors, [(0, BusError::Overload)]);
    }

    #[test]
    fn bus_off_stops_controller() {
        let hw = Hw::new();
        let mut c = hw.controller(General::default());
        c.init().unwrap();
        c.set_mode(ControllerState::Started).unwrap();
        hw.regs.psr.set_bits(1 << 7);
        hw.regs.cccr.modify(|r| r.set_init(true));
        hw.regs.ie.set_bits(1 << 19);
        hw.regs.ir.set_bits(1 << 19);

        let mut up = Upper::default();
        c.on_interrupt(&mut up.canif, &mut up.det);
        assert_eq!(up.canif.bus_off, [0]);
        assert_eq!(c.state(), ControllerState::Stopped);
        assert_eq!(c.error_state(), ErrorState::BusOff);
        assert_eq!(hw.regs.txbcr.bits(), u32::MAX);
    }

    #[test]
    fn bus_off_without_init_acknowledge() {
        let hw = Hw::new();
        let mut c = hw.controller(General::default());
        c.init().unwrap();
        c.set_mode(ControllerState::Started).unwrap();
        hw.regs.psr.set_bits(1 << 7);
        hw.regs.ie.set_bits(1 << 19);
        hw.regs.ir.set_bits(1 << 19);

        let mut up = Upper::default();
        c.on_interrupt(&mut up.canif, &mut up.det);
        assert!(up.canif.bus_off.is_empty());
        assert_eq!(up.det.errors, [(ApiId::Isr, ErrorId::InitFailed)]);
        assert_eq!(c.state(), ControllerState::Started);
    }

    #[test]
    fn error_passive_reports_counters() {
        let hw = Hw::new();
        let mut c = hw.controller(General::default());
        c.init().unwrap();
        hw.regs.psr.set_bits(1 << 5);
        hw.regs.ecr.set_bits(0x12 << 8 | 0x90);
        hw.regs.ie.set_bits(1 << 17);
        hw.regs.ir.set_bits(1 << 17);

        let mut up = Upper::default();
        c.on_interrupt(&mut up.canif, &mut up.det);
        assert_eq!(up.canif.passive, [(0, 0x12, 0x90)]);
    }

    #[test]
    fn protocol_error_codes() {
        let expected = [
            (0u8, None),
            (1, Some(BusError::CheckStuffingFailed)),
            (2, Some(BusError::CheckFormFailed)),
            (3, Some(BusError::CheckAckFailed)),
            (4, Some(BusError::BitMonitoring1)),
            (5, Some(BusError::BitMonitoring0)),
            (6, Some(BusError::CheckCrcFailed)),
            (7, None),
        ];
        for (code, error) in expected {
            let hw = Hw::new();
            let mut c = hw.controller(General::default());
            c.init().unwrap();
            hw.regs.psr.set_bits(u32::from(code) << 8);
            hw.regs.ie.set_bits(1 << 22);
            hw.regs.ir.set_bits(1 << 22);

            let mut up = Upper::default();
            c.on_interrupt(&mut up.canif, &mut up.det);
            let reported: Option<BusError> = up.canif.errors.first().map(|e| e.1);
            assert_eq!(reported, error, "DLEC {code}");
        }
    }
}
