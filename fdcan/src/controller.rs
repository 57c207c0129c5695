//! Controller engine
//!
//! One [`Controller`] owns one FDCAN block and its message RAM region. It
//! drives the peripheral through init, baudrate changes and mode
//! transitions, submits frames and services the interrupt sources. The
//! facade in [`crate::driver`] guards its preconditions.

mod isr;

use crate::config::{
    Baudrate, ControllerConfig, FrameFormat, General, Hoh, IdKind, OperatingMode, RxFifo,
};
use crate::filter::{Element, Filters};
use crate::instance::Instance;
use crate::interrupt::InterruptSet;
use crate::message::tx::MessageBuilder;
use crate::messageram::TX_BUFFERS;
use crate::reg::{Dbtp, Ile, Nbtp, Tscc};
use crate::tx_buffers::{TxBufferSet, TxQueue};
use fdcan_core::{CanId, ControllerId, ControllerState, ErrorState, HohId, PduId};

/// Failures of engine operations
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The requested mode cannot be reached from the current one
    InvalidTransition,
    /// The operation requires the controller to be stopped
    NotStopped,
    /// No baudrate profile with this index
    UnknownBaudrate,
    /// Payload does not fit the frame format
    DataLength,
    /// The peripheral did not acknowledge a request in time
    Timeout,
}

/// A status bit did not reach the expected value within the bound
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AcknowledgeTimeout;

impl From<AcknowledgeTimeout> for Error {
    fn from(_: AcknowledgeTimeout) -> Self {
        Error::Timeout
    }
}

/// Polls `done` at most `limit + 1` times
pub(crate) fn wait_until(
    limit: u32,
    mut done: impl FnMut() -> bool,
) -> Result<(), AcknowledgeTimeout> {
    for _ in 0..=limit {
        if done() {
            return Ok(());
        }
        core::hint::spin_loop();
    }
    Err(AcknowledgeTimeout)
}

/// Frame written by an object with egress time stamping enabled
#[derive(Copy, Clone, Debug)]
struct EgressRecord {
    pdu: PduId,
    hoh: HohId,
    timestamp: Option<u16>,
}

/// Engine of one FDCAN controller
pub struct Controller<'a> {
    id: ControllerId,
    instance: Instance<'a>,
    config: &'a ControllerConfig<'a>,
    hohs: &'a [Hoh<'a>],
    general: General,
    state: ControllerState,
    /// Receive object reported for frames of Rx FIFO 0 and 1
    fifo_hoh: [Option<HohId>; 2],
    egress_enabled: u64,
    /// Indexed by Tx buffer
    egress: [Option<EgressRecord>; TX_BUFFERS],
    ingress: [Option<u16>; 2],
}

impl<'a> Controller<'a> {
    /// An engine for controller `id`, still uninitialized
    pub fn new(
        id: ControllerId,
        instance: Instance<'a>,
        config: &'a ControllerConfig<'a>,
        hohs: &'a [Hoh<'a>],
        general: General,
    ) -> Self {
        Self {
            id,
            instance,
            config,
            hohs,
            general,
            state: ControllerState::Uninit,
            fifo_hoh: [None; 2],
            egress_enabled: 0,
            egress: [None; TX_BUFFERS],
            ingress: [None; 2],
        }
    }

    /// Controller index
    pub fn id(&self) -> ControllerId {
        self.id
    }

    /// Static configuration
    pub fn config(&self) -> &'a ControllerConfig<'a> {
        self.config
    }

    /// Current mode
    pub fn state(&self) -> ControllerState {
        self.state
    }

    fn timeout(&self) -> u32 {
        self.general.acknowledge_timeout
    }

    /// Brings the peripheral from reset into init mode with the configuration
    /// applied. The controller is `Stopped` afterwards.
    pub fn init(&mut self) -> Result<(), Error> {
        let regs = self.instance.regs;
        let limit = self.timeout();
        let config = self.config;

        self.instance
            .ckdiv
            .ckdiv
            .set_bits(u32::from(config.clock_divider & 0xf));
        self.instance.ram.zero();

        // Leave sleep
        regs.cccr.modify(|r| r.set_csr(false));
        wait_until(limit, || !regs.cccr.read().csa()).map_err(|e| {
            error!("controller {} did not leave clock stop", self.id);
            e
        })?;

        regs.cccr.modify(|r| r.set_init(true));
        wait_until(limit, || regs.cccr.read().init()).map_err(|e| {
            error!("controller {} did not enter init mode", self.id);
            e
        })?;
        regs.cccr.modify(|r| r.set_cce(true));

        regs.cccr.modify(|r| {
            r.set_dar(!config.auto_retransmission);
            r.set_txp(config.transmit_pause);
            r.set_pxhd(!config.protocol_exception);
            r.set_fdoe(config.frame_format == FrameFormat::Fd);
        });
        self.apply_operating_mode();

        if let Some(baudrate) = config.baudrates.get(config.default_baudrate) {
            self.apply_baudrate(baudrate);
        }

        regs.txbc.modify(|r| r.set_tfqm(config.tx_mode.into()));
        self.install_filters();
        // Remote frames are never received
        regs.rxgfc.modify(|r| {
            r.set_rrfs(true);
            r.set_rrfe(true);
        });
        self.install_interrupts();

        if self.general.time_stamp {
            let mut tscc = Tscc(0);
            tscc.set_tss(1);
            tscc.set_tcp(config.timestamp_prescaler.saturating_sub(1) & 0xf);
            regs.tscc.write(tscc);
        }

        self.fifo_hoh = [RxFifo::Fifo0, RxFifo::Fifo1].map(|fifo| {
            self.hohs
                .iter()
                .enumerate()
                .find(|(_, h)| h.controller == self.id && h.rx_fifo() == Some(fifo))
                .map(|(i, _)| i as HohId)
        });
        self.egress_enabled = 0;
        self.egress = [None; TX_BUFFERS];
        self.ingress = [None; 2];
        self.state = ControllerState::Stopped;
        info!("controller {} initialized", self.id);
        Ok(())
    }

    /// Returns the peripheral to init mode with every interrupt disabled and
    /// the message RAM cleared. The controller is `Uninit` afterwards.
    pub fn deinit(&mut self) -> Result<(), Error> {
        let regs = self.instance.regs;
        self.silence();
        regs.cccr.modify(|r| r.set_init(true));
        wait_until(self.timeout(), || regs.cccr.read().init())?;
        regs.cccr.modify(|r| r.set_cce(true));
        self.instance.ram.zero();

        self.fifo_hoh = [None; 2];
        self.state = ControllerState::Uninit;
        info!("controller {} deinitialized", self.id);
        Ok(())
    }

    /// Disables every interrupt source and both lines
    pub(crate) fn silence(&self) {
        let regs = self.instance.regs;
        regs.ie.set_bits(0);
        regs.ils.set_bits(0);
        regs.ile.write(Ile(0));
        TxQueue::new(regs, self.instance.ram).disable_interrupts();
    }

    /// Applies baudrate profile `index`. Only allowed while stopped.
    pub fn set_baudrate(&mut self, index: usize) -> Result<(), Error> {
        if self.state != ControllerState::Stopped {
            return Err(Error::NotStopped);
        }
        let baudrate = self
            .config
            .baudrates
            .get(index)
            .ok_or(Error::UnknownBaudrate)?;
        self.apply_baudrate(baudrate);
        debug!("controller {} uses baudrate {}", self.id, index);
        Ok(())
    }

    /// Performs a mode transition.
    ///
    /// Fails without touching the peripheral if `requested` cannot be reached
    /// from the current mode.
    pub fn set_mode(&mut self, requested: ControllerState) -> Result<(), Error> {
        use ControllerState::*;
        let regs = self.instance.regs;
        let limit = self.timeout();
        match (self.state, requested) {
            (Stopped, Started) => regs.cccr.modify(|r| r.set_init(false)),
            (Started, Stopped) => self.stop()?,
            (Stopped, Sleep) => {
                regs.cccr.modify(|r| r.set_csr(true));
                wait_until(limit, || regs.cccr.read().csa())?;
            }
            (Sleep, Stopped) => {
                regs.cccr.modify(|r| r.set_csr(false));
                wait_until(limit, || !regs.cccr.read().csa())?;
                regs.cccr.modify(|r| r.set_cce(true));
            }
            _ => return Err(Error::InvalidTransition),
        }
        debug!("controller {} mode {} -> {}", self.id, self.state as u8, requested as u8);
        self.state = requested;
        Ok(())
    }

    /// Cancels pending transmissions and puts the peripheral in init mode
    fn stop(&mut self) -> Result<(), AcknowledgeTimeout> {
        let regs = self.instance.regs;
        let limit = self.timeout();
        TxQueue::new(regs, self.instance.ram).cancel_multi(TxBufferSet::all());
        regs.cccr.modify(|r| r.set_init(true));
        wait_until(limit, || regs.cccr.read().init())?;
        regs.cccr.modify(|r| r.set_csr(false));
        wait_until(limit, || !regs.cccr.read().csa())?;
        regs.cccr.modify(|r| r.set_cce(true));
        Ok(())
    }

    /// Sets or clears both interrupt line enables
    pub fn set_lines(&self, enabled: bool) {
        let mut ile = Ile(0);
        ile.set_eint0(enabled);
        ile.set_eint1(enabled);
        self.instance.regs.ile.write(ile);
    }

    /// Copies a frame into the next free Tx buffer and requests transmission.
    ///
    /// `sw_pdu_handle` travels in the message marker and comes back with the
    /// Tx event. Fails with [`nb::Error::WouldBlock`] if the Tx FIFO/queue is
    /// full.
    pub fn write(
        &mut self,
        hth: HohId,
        padding: u8,
        id: CanId,
        payload: &[u8],
        sw_pdu_handle: PduId,
    ) -> nb::Result<(), Error> {
        let regs = self.instance.regs;
        let fd = self.config.frame_format == FrameFormat::Fd && id.is_fd();
        let id = if fd { id } else { CanId(id.0 & !CanId::FD) };
        let message = MessageBuilder {
            id,
            payload,
            bit_rate_switching: regs.cccr.read().brse(),
            padding,
            store_tx_event: Some(sw_pdu_handle as u8),
        }
        .build()
        .map_err(|_| nb::Error::Other(Error::DataLength))?;

        let index = TxQueue::new(regs, self.instance.ram)
            .transmit(&message)
            .map_err(|e| match e {
                nb::Error::WouldBlock => {
                    debug!("tx queue of controller {} full", self.id);
                    nb::Error::WouldBlock
                }
                nb::Error::Other(never) => match never {},
            })?;

        self.egress[index] = self.egress_marked(hth).then_some(EgressRecord {
            pdu: sw_pdu_handle,
            hoh: hth,
            timestamp: None,
        });
        trace!("controller {} queued pdu {} in buffer {}", self.id, sw_pdu_handle, index);
        Ok(())
    }

    /// Fault confinement state, bus-off taking precedence over passive
    pub fn error_state(&self) -> ErrorState {
        let psr = self.instance.regs.psr.read();
        if psr.bo() {
            ErrorState::BusOff
        } else if psr.ep() {
            ErrorState::Passive
        } else {
            ErrorState::Active
        }
    }

    /// Receive error counter with the receive error passive flag in bit 7
    pub fn rx_error_counter(&self) -> u8 {
        let ecr = self.instance.regs.ecr.read();
        ecr.rec() | (ecr.rp() as u8) << 7
    }

    /// Transmit error counter
    pub fn tx_error_counter(&self) -> u8 {
        self.instance.regs.ecr.read().tec()
    }

    /// Time stamp counter value
    pub fn current_time(&self) -> u16 {
        self.instance.regs.tscv.bits() as u16
    }

    /// Records Tx time stamps for frames written through `hth`
    pub fn enable_egress_time_stamp(&mut self, hth: HohId) {
        if let Some(bit) = 1u64.checked_shl(u32::from(hth)) {
            self.egress_enabled |= bit;
        }
    }

    fn egress_marked(&self, hth: HohId) -> bool {
        1u64
            .checked_shl(u32::from(hth))
            .is_some_and(|bit| self.egress_enabled & bit != 0)
    }

    /// Tx time stamp of the frame last written with `pdu` through `hth`
    pub fn egress_time_stamp(&self, pdu: PduId, hth: HohId) -> Option<u16> {
        self.egress
            .iter()
            .flatten()
            .find(|r| r.pdu == pdu && r.hoh == hth)
            .and_then(|r| r.timestamp)
    }

    /// Rx time stamp of the last frame taken from `fifo`
    pub fn ingress_time_stamp(&self, fifo: RxFifo) -> Option<u16> {
        self.ingress[fifo.index()]
    }

    fn apply_operating_mode(&self) {
        let regs = self.instance.regs;
        let (test, monitor, loopback, restricted) = match self.config.operating_mode {
            OperatingMode::Normal => (false, false, false, false),
            OperatingMode::Restricted => (false, false, false, true),
            OperatingMode::BusMonitoring => (false, true, false, false),
            OperatingMode::InternalLoopback => (true, true, true, false),
            OperatingMode::ExternalLoopback => (true, false, true, false),
        };
        regs.cccr.modify(|r| {
            r.set_test(test);
            r.set_mon(monitor);
            r.set_asm(restricted);
        });
        regs.test.modify(|r| r.set_lbck(loopback));
    }

    fn apply_baudrate(&self, baudrate: &Baudrate) {
        let regs = self.instance.regs;
        let nominal = &baudrate.nominal;
        let mut nbtp = Nbtp(0);
        nbtp.set_nsjw(nominal.sjw.saturating_sub(1));
        nbtp.set_ntseg1(nominal.phase_seg_1.saturating_sub(1));
        nbtp.set_ntseg2(nominal.phase_seg_2.saturating_sub(1));
        nbtp.set_nbrp(nominal.prescaler.saturating_sub(1));
        regs.nbtp.write(nbtp);

        if let Some(data) = &baudrate.data {
            let mut dbtp = Dbtp(0);
            dbtp.set_dsjw(data.sjw.saturating_sub(1));
            dbtp.set_dtseg1(data.phase_seg_1.saturating_sub(1));
            dbtp.set_dtseg2(data.phase_seg_2.saturating_sub(1));
            dbtp.set_dbrp(data.prescaler.saturating_sub(1) as u8);
            regs.dbtp.write(dbtp);
        }
        let brse = baudrate.bit_rate_switching && baudrate.data.is_some();
        regs.cccr.modify(|r| r.set_brse(brse));
    }

    /// Writes the filters of this controller's receive objects and enables
    /// them in the global filter configuration
    fn install_filters(&self) {
        let regs = self.instance.regs;
        let ram = self.instance.ram;
        let mut standard = Filters::new(&ram.filters_standard[..]);
        let mut extended = Filters::new(&ram.filters_extended[..]);
        for hoh in self.hohs.iter().filter(|h| h.controller == self.id) {
            let Some(fifo) = hoh.rx_fifo() else {
                continue;
            };
            for filter in hoh.installable_filters(IdKind::Standard) {
                if standard.push(Element { filter, fifo }).is_err() {
                    warn!("standard filter list of controller {} full", self.id);
                }
            }
            for filter in hoh.installable_filters(IdKind::Extended) {
                if extended.push(Element { filter, fifo }).is_err() {
                    warn!("extended filter list of controller {} full", self.id);
                }
            }
        }
        regs.rxgfc.modify(|r| {
            r.set_lss(standard.len() as u8);
            r.set_lse(extended.len() as u8);
            // Reject non-matching frames
            r.set_anfs(3);
            r.set_anfe(3);
        });
        debug!(
            "controller {}: {} standard and {} extended filters",
            self.id,
            standard.len(),
            extended.len()
        );
    }

    fn install_interrupts(&self) {
        let regs = self.instance.regs;
        let mut enabled = self.config.interrupts;
        let mut line1 = self.config.line1;
        if self.general.security_event_reporting {
            enabled = enabled.union(InterruptSet::SECURITY_EVENTS);
            line1 = line1.union(InterruptSet::SECURITY_EVENTS);
        }
        regs.ils.set_bits(line1.0);
        regs.ie.set_bits(enabled.0);

        let mut queue = TxQueue::new(regs, self.instance.ram);
        if enabled.tc() {
            queue.enable_transmission_completed_interrupt(TxBufferSet::implemented());
        }
        if enabled.tcf() {
            queue.enable_cancellation_interrupt(TxBufferSet::implemented());
        }
        self.set_lines(true);
    }
}


#[cfg(test)]
mod test {
    use super::test_support::*;
    use super::*;

    fn general() -> General {
        General {
            time_stamp: true,
            acknowledge_timeout: 8,
            ..General::default()
        }
    }

    #[test]
    fn init_programs_peripheral() {
        let hw = Hw::new();
        hw.ram.tx_buffers[0].data[3].set(0xdead);
        let mut c = hw.controller(general());
        c.init().unwrap();

        assert_eq!(c.state(), ControllerState::Stopped);
        assert_eq!(hw.ckdiv.ckdiv.bits(), 1);
        assert_eq!(hw.ram.tx_buffers[0].data[3].get(), 0);

        let cccr = hw.regs.cccr.read();
        assert!(cccr.init() && cccr.cce() && cccr.fdoe());
        assert!(cccr.test() && cccr.mon() && !cccr.asm() && !cccr.dar());
        assert!(hw.regs.test.read().lbck());
        assert!(hw.regs.txbc.read().tfqm());

        let nbtp = hw.regs.nbtp.read();
        assert_eq!(nbtp.nsjw(), 0);
        assert_eq!(nbtp.ntseg1(), 12);
        assert_eq!(nbtp.ntseg2(), 1);
        assert_eq!(nbtp.nbrp(), 3);

        let tscc = hw.regs.tscc.read();
        assert_eq!((tscc.tss(), tscc.tcp()), (1, 3));
    }

    #[test]
    fn init_installs_own_filters_only() {
        let hw = Hw::new();
        hw.controller(general()).init().unwrap();

        let rxgfc = hw.regs.rxgfc.read();
        assert_eq!(rxgfc.lss(), 1);
        assert_eq!(rxgfc.lse(), 1);
        assert_eq!((rxgfc.anfs(), rxgfc.anfe()), (3, 3));
        assert!(rxgfc.rrfs() && rxgfc.rrfe());
        // Range filter to FIFO 1
        assert_eq!(hw.ram.filters_standard[0].get(), 0x1ff | 0x100 << 16 | 2 << 27);
        assert_eq!(hw.ram.filters_standard[1].get(), 0);
        assert_eq!(hw.ram.filters_extended[0][0].get(), 2 << 29 | 0x1234);
        assert_eq!(hw.ram.filters_extended[1][0].get(), 0);
    }

    #[test]
    fn init_routes_interrupts() {
        let hw = Hw::new();
        hw.controller(general()).init().unwrap();
        assert_eq!(hw.regs.ie.bits(), 1 << 7 | 1 << 19);
        assert_eq!(hw.regs.ils.bits(), 1 << 19);
        assert_eq!(hw.regs.txbtie.bits(), 0b111);
        assert_eq!(hw.regs.txbcie.bits(), 0);
        assert_eq!(hw.regs.ile.bits(), 0b11);
    }

    #[test]
    fn init_times_out_in_clock_stop() {
        let hw = Hw::new();
        hw.regs.cccr.modify(|r| r.set_csa(true));
        let mut c = hw.controller(general());
        assert_eq!(c.init(), Err(Error::Timeout));
        assert_eq!(c.state(), ControllerState::Uninit);
    }

    #[test]
    fn baudrate_with_bit_rate_switching() {
        let hw = Hw::new();
        let mut c = hw.controller(general());
        c.init().unwrap();
        c.set_baudrate(1).unwrap();

        let nbtp = hw.regs.nbtp.read();
        assert_eq!((nbtp.nsjw(), nbtp.ntseg1(), nbtp.ntseg2(), nbtp.nbrp()), (15, 62, 15, 0));
        let dbtp = hw.regs.dbtp.read();
        assert_eq!((dbtp.dsjw(), dbtp.dtseg1(), dbtp.dtseg2(), dbtp.dbrp()), (3, 10, 3, 1));
        assert!(hw.regs.cccr.read().brse());

        c.set_baudrate(0).unwrap();
        assert!(!hw.regs.cccr.read().brse());
        assert_eq!(c.set_baudrate(2), Err(Error::UnknownBaudrate));
    }

    #[test]
    fn baudrate_needs_stopped() {
        let hw = Hw::new();
        let mut c = hw.controller(general());
        c.init().unwrap();
        c.set_mode(ControllerState::Started).unwrap();
        assert_eq!(c.set_baudrate(0), Err(Error::NotStopped));
    }

    #[test]
    fn mode_matrix() {
        use ControllerState::*;
        let hw = Hw::new();
        let mut c = hw.controller(general());
        c.init().unwrap();

        assert_eq!(c.set_mode(Stopped), Err(Error::InvalidTransition));
        assert_eq!(c.set_mode(Uninit), Err(Error::InvalidTransition));
        c.set_mode(Started).unwrap();
        assert!(!hw.regs.cccr.read().init());
        assert_eq!(c.set_mode(Sleep), Err(Error::InvalidTransition));
        assert_eq!(c.state(), Started);

        c.set_mode(Stopped).unwrap();
        assert_eq!(hw.regs.txbcr.bits(), u32::MAX);
        assert!(hw.regs.cccr.read().init());
        assert!(hw.regs.cccr.read().cce());

        // The peripheral acknowledges clock stop
        hw.regs.cccr.modify(|r| r.set_csa(true));
        c.set_mode(Sleep).unwrap();
        assert!(hw.regs.cccr.read().csr());
        assert_eq!(c.set_mode(Started), Err(Error::InvalidTransition));

        hw.regs.cccr.modify(|r| r.set_csa(false));
        c.set_mode(Stopped).unwrap();
        assert!(!hw.regs.cccr.read().csr());
        assert_eq!(c.state(), Stopped);
    }

    #[test]
    fn sleep_without_acknowledge_keeps_state() {
        let hw = Hw::new();
        let mut c = hw.controller(general());
        c.init().unwrap();
        assert_eq!(c.set_mode(ControllerState::Sleep), Err(Error::Timeout));
        assert_eq!(c.state(), ControllerState::Stopped);
    }

    #[test]
    fn error_counters() {
        let hw = Hw::new();
        let c = hw.controller(general());
        hw.regs.ecr.set_bits(1 << 15 | 0x7f << 8 | 0x80);
        assert_eq!(c.rx_error_counter(), 0xff);
        assert_eq!(c.tx_error_counter(), 0x80);
        hw.regs.ecr.set_bits(0x05 << 8);
        assert_eq!(c.rx_error_counter(), 0x05);
    }

    #[test]
    fn error_state_priority() {
        let hw = Hw::new();
        let c = hw.controller(general());
        assert_eq!(c.error_state(), ErrorState::Active);
        hw.regs.psr.set_bits(1 << 5);
        assert_eq!(c.error_state(), ErrorState::Passive);
        hw.regs.psr.set_bits(1 << 5 | 1 << 7);
        assert_eq!(c.error_state(), ErrorState::BusOff);
    }

    #[test]
    fn write_records_egress_when_enabled() {
        let hw = Hw::new();
        let mut c = hw.controller(general());
        c.init().unwrap();
        c.write(2, 0, CanId(0x10), &[1], 5).unwrap();
        assert!(c.egress.iter().all(Option::is_none));

        c.enable_egress_time_stamp(2);
        c.write(2, 0, CanId(0x10), &[1], 6).unwrap();
        assert!(matches!(
            c.egress[0],
            Some(EgressRecord {
                pdu: 6,
                hoh: 2,
                timestamp: None
            })
        ));
        assert_eq!(c.egress_time_stamp(6, 2), None);
    }

    #[test]
    fn deinit_clears_everything() {
        let hw = Hw::new();
        let mut c = hw.controller(general());
        c.init().unwrap();
        c.deinit().unwrap();
        assert_eq!(c.state(), ControllerState::Uninit);
        assert_eq!(hw.regs.ie.bits(), 0);
        assert_eq!(hw.regs.ile.bits(), 0);
        assert_eq!(hw.regs.txbtie.bits(), 0);
        assert_eq!(hw.ram.filters_standard[0].get(), 0);
    }

    #[test]
    fn wait_is_bounded() {
        let mut polls = 0;
        assert_eq!(
            wait_until(3, || {
                polls += 1;
                false
            }),
            Err(AcknowledgeTimeout)
        );
        assert_eq!(polls, 4);
        assert_eq!(wait_until(0, || true), Ok(()));
    }
}
