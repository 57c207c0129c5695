//! Driver facade
//!
//! [`Driver`] is the single entry point of the layer above. Every service
//! validates the unit state, the addressed controller or hardware object and
//! its arguments before it reaches the [`Controller`] engine. Rejected calls
//! have no side effect on the peripheral.
//!
//! With [`General::dev_error_detect`] on, a rejected call is reported to the
//! [`Det`] hook and fails with [`Error::Development`]. With it off, the call
//! fails with [`Error::NotOk`] and nothing is reported.

use crate::config::{Config, FrameFormat, General, Hoh, HohKind, MAX_CONTROLLERS};
use crate::controller::{self, Controller};
use crate::instance::Instance;
use crate::message::MAX_PAYLOAD;
use fdcan_core::{
    ApiId, CanIf, ControllerId, ControllerState, Det, ErrorId, ErrorState, HohId, Pdu, PduId,
    MODULE_ID,
};

/// Vendor id reported in [`VersionInfo`]
pub const VENDOR_ID: u16 = 0xffff;

/// Failure of a driver service
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A precondition was violated and reported to the error tracer
    Development(ErrorId),
    /// The request was rejected
    NotOk,
    /// The peripheral did not acknowledge a request in time
    Timeout,
}

/// Lifecycle of the driver as a whole
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UnitState {
    /// `init` has not run, or `deinit` has
    Uninit,
    /// Every configured controller is initialized
    Ready,
}

/// Module and software version of the driver
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VersionInfo {
    /// Vendor id
    pub vendor_id: u16,
    /// Module id
    pub module_id: u16,
    /// Major software version
    pub sw_major_version: u8,
    /// Minor software version
    pub sw_minor_version: u8,
    /// Patch software version
    pub sw_patch_version: u8,
}

/// Control block of the initialized driver
struct HwUnit<'a> {
    state: UnitState,
    config: Option<&'a Config<'a>>,
    controllers: [Option<Controller<'a>>; MAX_CONTROLLERS],
    disable_level: [u8; MAX_CONTROLLERS],
}

impl<'a> HwUnit<'a> {
    fn engine(&mut self, index: usize) -> Option<&mut Controller<'a>> {
        self.controllers.get_mut(index).and_then(Option::as_mut)
    }
}

/// CAN driver for both FDCAN controllers
///
/// `U` receives the upward notifications raised while servicing interrupts,
/// `D` receives development and runtime error reports.
pub struct Driver<'a, U, D> {
    general: General,
    instances: [Instance<'a>; MAX_CONTROLLERS],
    unit: HwUnit<'a>,
    canif: U,
    det: D,
}

impl<'a, U: CanIf, D: Det> Driver<'a, U, D> {
    /// An uninitialized driver over the two FDCAN blocks.
    ///
    /// `instances` is indexed by [`Peripheral`](crate::instance::Peripheral).
    pub fn new(
        general: General,
        instances: [Instance<'a>; MAX_CONTROLLERS],
        canif: U,
        det: D,
    ) -> Self {
        Self {
            general,
            instances,
            unit: HwUnit {
                state: UnitState::Uninit,
                config: None,
                controllers: Default::default(),
                disable_level: [0; MAX_CONTROLLERS],
            },
            canif,
            det,
        }
    }

    /// Upper layer
    pub fn canif(&self) -> &U {
        &self.canif
    }

    /// Upper layer, mutably
    pub fn canif_mut(&mut self) -> &mut U {
        &mut self.canif
    }

    /// Error tracer
    pub fn det(&self) -> &D {
        &self.det
    }

    /// Error tracer, mutably
    pub fn det_mut(&mut self) -> &mut D {
        &mut self.det
    }

    /// Driver lifecycle state
    pub fn unit_state(&self) -> UnitState {
        self.unit.state
    }

    /// Interrupt disable nesting level of `controller`
    pub fn disable_level(&self, controller: ControllerId) -> Option<u8> {
        self.unit.disable_level.get(usize::from(controller)).copied()
    }

    /// Static switches the driver was built with
    pub fn general(&self) -> &General {
        &self.general
    }

    fn report(&mut self, api: ApiId, error: ErrorId) -> Error {
        if self.general.dev_error_detect {
            debug!("api {} rejected with error {}", api as u8, error as u8);
            self.det.report_error(api, error);
            Error::Development(error)
        } else {
            Error::NotOk
        }
    }

    fn timeout(&mut self, api: ApiId) -> Error {
        error!("acknowledge timeout in api {}", api as u8);
        self.det.report_error(api, ErrorId::InitFailed);
        Error::Timeout
    }

    fn engine_error(&mut self, api: ApiId, error: controller::Error) -> Error {
        match error {
            controller::Error::Timeout => self.timeout(api),
            controller::Error::InvalidTransition | controller::Error::NotStopped => {
                self.report(api, ErrorId::Transition)
            }
            controller::Error::UnknownBaudrate => self.report(api, ErrorId::ParamBaudrate),
            controller::Error::DataLength => self.report(api, ErrorId::ParamDataLength),
        }
    }

    fn check_ready(&mut self, api: ApiId) -> Result<(), Error> {
        if self.unit.state == UnitState::Ready {
            Ok(())
        } else {
            Err(self.report(api, ErrorId::Uninit))
        }
    }

    /// Index of an initialized controller
    fn check_controller(&mut self, api: ApiId, controller: ControllerId) -> Result<usize, Error> {
        self.check_ready(api)?;
        let index = usize::from(controller);
        if self.unit.engine(index).is_none() {
            return Err(self.report(api, ErrorId::ParamController));
        }
        Ok(index)
    }

    fn hoh(&self, id: HohId) -> Option<&'a Hoh<'a>> {
        self.unit.config?.hohs.get(usize::from(id))
    }

    /// A configured transmit object and its padding byte
    fn check_hth(&mut self, api: ApiId, hth: HohId) -> Result<(&'a Hoh<'a>, u8), Error> {
        match self.hoh(hth).map(|h| (h, h.kind)) {
            Some((hoh, HohKind::Transmit { padding })) => Ok((hoh, padding)),
            _ => Err(self.report(api, ErrorId::ParamHandle)),
        }
    }

    fn check_time_stamp(&self) -> Result<(), Error> {
        if self.general.time_stamp {
            Ok(())
        } else {
            Err(Error::NotOk)
        }
    }

    /// Initializes every controller of `config`. They are `Stopped`
    /// afterwards.
    pub fn init(&mut self, config: &'a Config<'a>) -> Result<(), Error> {
        const API: ApiId = ApiId::Init;
        if self.unit.state != UnitState::Uninit
            || self.unit.controllers.iter().any(Option::is_some)
        {
            return Err(self.report(API, ErrorId::Transition));
        }
        if config.check_structure().is_err() {
            error!("configuration rejected");
            return Err(self.report(API, ErrorId::ParamPointer));
        }

        for (index, controller_config) in config.controllers.iter().enumerate() {
            let instance = self.instances[controller_config.peripheral.index()];
            let mut engine = Controller::new(
                index as ControllerId,
                instance,
                controller_config,
                config.hohs,
                self.general,
            );
            if let Err(e) = engine.init() {
                engine.silence();
                for initialized in self.unit.controllers.iter().flatten() {
                    initialized.silence();
                }
                self.unit.controllers = Default::default();
                return Err(self.engine_error(API, e));
            }
            self.unit.controllers[index] = Some(engine);
        }
        self.unit.disable_level = [0; MAX_CONTROLLERS];
        self.unit.config = Some(config);
        self.unit.state = UnitState::Ready;
        info!("driver ready with {} controllers", config.controllers.len());
        Ok(())
    }

    /// Returns every controller and the driver to `Uninit`. Every controller
    /// must be stopped.
    pub fn deinit(&mut self) -> Result<(), Error> {
        const API: ApiId = ApiId::DeInit;
        let stopped = self
            .unit
            .controllers
            .iter()
            .flatten()
            .all(|c| c.state() == ControllerState::Stopped);
        if self.unit.state != UnitState::Ready || !stopped {
            return Err(self.report(API, ErrorId::Transition));
        }

        let mut result = Ok(());
        for engine in self.unit.controllers.iter_mut().flatten() {
            if let Err(e) = engine.deinit() {
                result = Err(e);
            }
        }
        self.unit.controllers = Default::default();
        self.unit.disable_level = [0; MAX_CONTROLLERS];
        self.unit.config = None;
        self.unit.state = UnitState::Uninit;
        result.map_err(|e| self.engine_error(API, e))
    }

    /// Applies baudrate profile `baudrate` of `controller`
    pub fn set_baudrate(&mut self, controller: ControllerId, baudrate: u16) -> Result<(), Error> {
        const API: ApiId = ApiId::SetBaudrate;
        if !self.general.set_baudrate_api {
            return Err(Error::NotOk);
        }
        let index = self.check_controller(API, controller)?;
        let profiles = self
            .unit
            .engine(index)
            .map_or(0, |e| e.config().baudrates.len());
        if usize::from(baudrate) >= profiles {
            return Err(self.report(API, ErrorId::ParamBaudrate));
        }
        let result = match self.unit.engine(index) {
            Some(engine) => engine.set_baudrate(usize::from(baudrate)),
            None => return Err(Error::NotOk),
        };
        result.map_err(|e| self.engine_error(API, e))
    }

    /// Requests a mode transition of `controller`
    pub fn set_controller_mode(
        &mut self,
        controller: ControllerId,
        requested: ControllerState,
    ) -> Result<(), Error> {
        const API: ApiId = ApiId::SetControllerMode;
        let index = self.check_controller(API, controller)?;
        if requested == ControllerState::Uninit {
            return Err(self.report(API, ErrorId::Transition));
        }
        let result = match self.unit.engine(index) {
            Some(engine) => engine.set_mode(requested),
            None => return Err(Error::NotOk),
        };
        result.map_err(|e| self.engine_error(API, e))
    }

    /// Disables both interrupt lines of `controller` and increases the
    /// nesting level
    pub fn disable_controller_interrupts(&mut self, controller: ControllerId) -> Result<(), Error> {
        const API: ApiId = ApiId::DisableControllerInterrupts;
        let index = self.check_controller(API, controller)?;
        if let Some(engine) = self.unit.engine(index) {
            engine.set_lines(false);
        }
        let level = &mut self.unit.disable_level[index];
        *level = level.saturating_add(1);
        Ok(())
    }

    /// Decreases the nesting level of `controller` and enables both
    /// interrupt lines when it reaches zero
    pub fn enable_controller_interrupts(&mut self, controller: ControllerId) -> Result<(), Error> {
        const API: ApiId = ApiId::EnableControllerInterrupts;
        let index = self.check_controller(API, controller)?;
        let level = &mut self.unit.disable_level[index];
        if *level == 0 {
            return Ok(());
        }
        *level -= 1;
        if *level == 0 {
            if let Some(engine) = self.unit.engine(index) {
                engine.set_lines(true);
            }
        }
        Ok(())
    }

    /// Always fails: no wake-up source is supported
    pub fn check_wakeup(&mut self, controller: ControllerId) -> Result<(), Error> {
        self.check_controller(ApiId::CheckWakeup, controller)?;
        Err(Error::NotOk)
    }

    /// Fault confinement state of `controller`
    pub fn get_controller_error_state(
        &mut self,
        controller: ControllerId,
    ) -> Result<ErrorState, Error> {
        let index = self.check_controller(ApiId::GetControllerErrorState, controller)?;
        self.unit
            .engine(index)
            .map(|e| e.error_state())
            .ok_or(Error::NotOk)
    }

    /// Last mode reached by `controller`
    pub fn get_controller_mode(
        &mut self,
        controller: ControllerId,
    ) -> Result<ControllerState, Error> {
        let index = self.check_controller(ApiId::GetControllerMode, controller)?;
        self.unit
            .engine(index)
            .map(|e| e.state())
            .ok_or(Error::NotOk)
    }

    /// Receive error counter of `controller`, receive error passive flag in
    /// bit 7
    pub fn get_controller_rx_error_counter(
        &mut self,
        controller: ControllerId,
    ) -> Result<u8, Error> {
        let index = self.check_controller(ApiId::GetControllerRxErrorCounter, controller)?;
        self.unit
            .engine(index)
            .map(|e| e.rx_error_counter())
            .ok_or(Error::NotOk)
    }

    /// Transmit error counter of `controller`
    pub fn get_controller_tx_error_counter(
        &mut self,
        controller: ControllerId,
    ) -> Result<u8, Error> {
        let index = self.check_controller(ApiId::GetControllerTxErrorCounter, controller)?;
        self.unit
            .engine(index)
            .map(|e| e.tx_error_counter())
            .ok_or(Error::NotOk)
    }

    /// Queues `pdu` for transmission through transmit object `hth`.
    ///
    /// Fails with [`nb::Error::WouldBlock`] while the Tx FIFO/queue of the
    /// owning controller is full.
    pub fn write(&mut self, hth: HohId, pdu: &Pdu<'_>) -> nb::Result<(), Error> {
        const API: ApiId = ApiId::Write;
        self.check_ready(API)?;
        let (hoh, padding) = self.check_hth(API, hth)?;

        let length = usize::from(pdu.length);
        let payload = match pdu.sdu {
            Some(sdu) => sdu.get(..length),
            None => (length == 0).then_some(&[][..]),
        };
        let Some(payload) = payload else {
            return Err(nb::Error::Other(self.report(API, ErrorId::ParamPointer)));
        };
        if pdu.sw_pdu_handle > PduId::from(u8::MAX) {
            return Err(nb::Error::Other(self.report(API, ErrorId::ParamLpdu)));
        }

        let index = usize::from(hoh.controller);
        let fd = match self.unit.engine(index) {
            Some(engine) => engine.config().frame_format == FrameFormat::Fd,
            None => return Err(nb::Error::Other(self.report(API, ErrorId::ParamHandle))),
        };
        if length > MAX_PAYLOAD || (length > 8 && !(fd && pdu.id.is_fd())) {
            return Err(nb::Error::Other(self.report(API, ErrorId::ParamDataLength)));
        }

        let result = match self.unit.engine(index) {
            Some(engine) => engine.write(hth, padding, pdu.id, payload, pdu.sw_pdu_handle),
            None => return Err(nb::Error::Other(Error::NotOk)),
        };
        result.map_err(|e| match e {
            nb::Error::WouldBlock => nb::Error::WouldBlock,
            nb::Error::Other(e) => nb::Error::Other(self.engine_error(API, e)),
        })
    }

    /// Time stamp counter of `controller`
    pub fn get_current_time(&mut self, controller: ControllerId) -> Result<u16, Error> {
        self.check_time_stamp()?;
        let index = self.check_controller(ApiId::GetCurrentTime, controller)?;
        self.unit
            .engine(index)
            .map(|e| e.current_time())
            .ok_or(Error::NotOk)
    }

    /// Records transmit time stamps for frames written through `hth`
    pub fn enable_egress_time_stamp(&mut self, hth: HohId) -> Result<(), Error> {
        const API: ApiId = ApiId::EnableEgressTimeStamp;
        self.check_time_stamp()?;
        self.check_ready(API)?;
        let (hoh, _) = self.check_hth(API, hth)?;
        let engine = self
            .unit
            .engine(usize::from(hoh.controller))
            .ok_or(Error::NotOk)?;
        engine.enable_egress_time_stamp(hth);
        Ok(())
    }

    /// Transmit time stamp of the frame written with `pdu` through `hth`
    pub fn get_egress_time_stamp(&mut self, pdu: PduId, hth: HohId) -> Result<u16, Error> {
        const API: ApiId = ApiId::GetEgressTimeStamp;
        self.check_time_stamp()?;
        self.check_ready(API)?;
        let (hoh, _) = self.check_hth(API, hth)?;
        self.unit
            .engine(usize::from(hoh.controller))
            .and_then(|e| e.egress_time_stamp(pdu, hth))
            .ok_or(Error::NotOk)
    }

    /// Receive time stamp of the last frame taken from the FIFO of receive
    /// object `hrh`
    pub fn get_ingress_time_stamp(&mut self, hrh: HohId) -> Result<u16, Error> {
        const API: ApiId = ApiId::GetIngressTimeStamp;
        self.check_time_stamp()?;
        self.check_ready(API)?;
        let Some((controller, fifo)) = self
            .hoh(hrh)
            .and_then(|h| Some((h.controller, h.rx_fifo()?)))
        else {
            return Err(self.report(API, ErrorId::ParamHandle));
        };
        self.unit
            .engine(usize::from(controller))
            .and_then(|e| e.ingress_time_stamp(fifo))
            .ok_or(Error::NotOk)
    }

    /// Version of this driver
    pub fn get_version_info(&self) -> Result<VersionInfo, Error> {
        if !self.general.version_info_api {
            return Err(Error::NotOk);
        }
        Ok(VersionInfo {
            vendor_id: VENDOR_ID,
            module_id: MODULE_ID,
            sw_major_version: 0,
            sw_minor_version: 1,
            sw_patch_version: 0,
        })
    }

    /// Services the interrupt lines of `controller`. Call from both line
    /// handlers of its FDCAN block.
    pub fn on_interrupt(&mut self, controller: ControllerId) {
        if self.unit.state != UnitState::Ready {
            return;
        }
        if let Some(engine) = self.unit.engine(usize::from(controller)) {
            engine.on_interrupt(&mut self.canif, &mut self.det);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::controller::test_support::{RecordingCanIf, RecordingDet, BAUDRATES, CONFIG, HOHS};
    use crate::messageram::MessageRam;
    use crate::reg::{ClockDivider, RegisterBlock};
    use fdcan_core::CanId;

    static SINGLE: Config<'static> = Config {
        controllers: &[CONFIG],
        hohs: &[HOHS[0]],
    };

    struct Hw {
        regs: [RegisterBlock; 2],
        ram: [MessageRam; 2],
        ckdiv: ClockDivider,
    }

    impl Hw {
        fn new() -> Self {
            Self {
                regs: [RegisterBlock::new(), RegisterBlock::new()],
                ram: [MessageRam::new(), MessageRam::new()],
                ckdiv: ClockDivider::new(),
            }
        }

        fn driver(&self, general: General) -> Driver<'_, RecordingCanIf, RecordingDet> {
            let instance = |i: usize| Instance {
                regs: &self.regs[i],
                ram: &self.ram[i],
                ckdiv: &self.ckdiv,
            };
            Driver::new(
                general,
                [instance(0), instance(1)],
                RecordingCanIf::default(),
                RecordingDet::default(),
            )
        }
    }

    #[test]
    fn services_need_init() {
        let hw = Hw::new();
        let mut driver = hw.driver(General::default());
        assert_eq!(
            driver.set_controller_mode(0, ControllerState::Started),
            Err(Error::Development(ErrorId::Uninit))
        );
        assert_eq!(driver.deinit(), Err(Error::Development(ErrorId::Transition)));
        assert_eq!(
            driver.det().errors,
            [
                (ApiId::SetControllerMode, ErrorId::Uninit),
                (ApiId::DeInit, ErrorId::Transition)
            ]
        );
        assert_eq!(hw.regs[0].cccr.bits(), 0);
    }

    #[test]
    fn silent_without_error_detection() {
        let hw = Hw::new();
        let general = General {
            dev_error_detect: false,
            ..General::default()
        };
        let mut driver = hw.driver(general);
        assert_eq!(driver.get_controller_mode(0), Err(Error::NotOk));
        assert!(driver.det().errors.is_empty());
    }

    #[test]
    fn init_twice_is_a_transition_error() {
        let hw = Hw::new();
        let mut driver = hw.driver(General::default());
        driver.init(&SINGLE).unwrap();
        assert_eq!(driver.unit_state(), UnitState::Ready);
        assert_eq!(driver.init(&SINGLE), Err(Error::Development(ErrorId::Transition)));
        assert_eq!(driver.get_controller_mode(0), Ok(ControllerState::Stopped));
        assert_eq!(
            driver.get_controller_mode(1),
            Err(Error::Development(ErrorId::ParamController))
        );
    }

    #[test]
    fn init_rejects_broken_config() {
        static EMPTY: Config<'static> = Config {
            controllers: &[],
            hohs: &[],
        };
        let hw = Hw::new();
        let mut driver = hw.driver(General::default());
        assert_eq!(driver.init(&EMPTY), Err(Error::Development(ErrorId::ParamPointer)));
        assert_eq!(driver.unit_state(), UnitState::Uninit);
    }

    #[test]
    fn init_timeout_reports_init_failed() {
        let hw = Hw::new();
        hw.regs[0].cccr.modify(|r| r.set_csa(true));
        let general = General {
            dev_error_detect: false,
            acknowledge_timeout: 4,
            ..General::default()
        };
        let mut driver = hw.driver(general);
        assert_eq!(driver.init(&SINGLE), Err(Error::Timeout));
        assert_eq!(driver.det().errors, [(ApiId::Init, ErrorId::InitFailed)]);
        assert_eq!(driver.unit_state(), UnitState::Uninit);
    }

    #[test]
    fn deinit_needs_stopped_controllers() {
        let hw = Hw::new();
        let mut driver = hw.driver(General::default());
        driver.init(&SINGLE).unwrap();
        driver.set_controller_mode(0, ControllerState::Started).unwrap();
        assert_eq!(driver.deinit(), Err(Error::Development(ErrorId::Transition)));
        driver.set_controller_mode(0, ControllerState::Stopped).unwrap();
        driver.disable_controller_interrupts(0).unwrap();
        driver.deinit().unwrap();
        assert_eq!(driver.unit_state(), UnitState::Uninit);
        assert_eq!(driver.disable_level(0), Some(0));
        assert_eq!(hw.regs[0].ie.bits(), 0);
        driver.init(&SINGLE).unwrap();
    }

    #[test]
    fn baudrate_checks() {
        let hw = Hw::new();
        let mut driver = hw.driver(General::default());
        driver.init(&SINGLE).unwrap();
        assert_eq!(
            driver.set_baudrate(0, BAUDRATES.len() as u16),
            Err(Error::Development(ErrorId::ParamBaudrate))
        );
        driver.set_baudrate(0, 1).unwrap();
        assert!(hw.regs[0].cccr.read().brse());
        driver.set_controller_mode(0, ControllerState::Started).unwrap();
        assert_eq!(driver.set_baudrate(0, 0), Err(Error::Development(ErrorId::Transition)));

        let hw = Hw::new();
        let general = General {
            set_baudrate_api: false,
            ..General::default()
        };
        let mut driver = hw.driver(general);
        driver.init(&SINGLE).unwrap();
        assert_eq!(driver.set_baudrate(0, 0), Err(Error::NotOk));
    }

    #[test]
    fn failed_transition_keeps_mode() {
        let hw = Hw::new();
        let mut driver = hw.driver(General::default());
        driver.init(&SINGLE).unwrap();
        assert_eq!(
            driver.set_controller_mode(0, ControllerState::Uninit),
            Err(Error::Development(ErrorId::Transition))
        );
        assert_eq!(
            driver.set_controller_mode(0, ControllerState::Stopped),
            Err(Error::Development(ErrorId::Transition))
        );
        assert_eq!(driver.get_controller_mode(0), Ok(ControllerState::Stopped));
    }

    #[test]
    fn write_validation_order() {
        let hw = Hw::new();
        let mut driver = hw.driver(General::default());
        let pdu = Pdu {
            id: CanId(0x10),
            length: 2,
            sdu: Some(&[1, 2]),
            sw_pdu_handle: 1,
        };
        assert!(matches!(
            driver.write(0, &pdu),
            Err(nb::Error::Other(Error::Development(ErrorId::Uninit)))
        ));

        static TX: Config<'static> = Config {
            controllers: &[CONFIG],
            hohs: &[HOHS[0], HOHS[2]],
        };
        driver.init(&TX).unwrap();
        // Receive object
        assert!(matches!(
            driver.write(0, &pdu),
            Err(nb::Error::Other(Error::Development(ErrorId::ParamHandle)))
        ));
        assert!(matches!(
            driver.write(7, &pdu),
            Err(nb::Error::Other(Error::Development(ErrorId::ParamHandle)))
        ));
        let missing = Pdu { sdu: None, ..pdu };
        assert!(matches!(
            driver.write(1, &missing),
            Err(nb::Error::Other(Error::Development(ErrorId::ParamPointer)))
        ));
        let short = Pdu { sdu: Some(&[1]), ..pdu };
        assert!(matches!(
            driver.write(1, &short),
            Err(nb::Error::Other(Error::Development(ErrorId::ParamPointer)))
        ));
        let lpdu = Pdu { sw_pdu_handle: 0x100, ..pdu };
        assert!(matches!(
            driver.write(1, &lpdu),
            Err(nb::Error::Other(Error::Development(ErrorId::ParamLpdu)))
        ));
        let classic_long = Pdu {
            length: 12,
            sdu: Some(&[0; 12]),
            ..pdu
        };
        assert!(matches!(
            driver.write(1, &classic_long),
            Err(nb::Error::Other(Error::Development(ErrorId::ParamDataLength)))
        ));
        assert_eq!(hw.regs[0].txbar.bits(), 0);

        let fd_long = Pdu {
            id: CanId(0x10).with_fd(),
            ..classic_long
        };
        driver.write(1, &fd_long).unwrap();
        assert_eq!(hw.regs[0].txbar.bits(), 1);

        let empty = Pdu {
            length: 0,
            sdu: None,
            ..pdu
        };
        driver.write(1, &empty).unwrap();
    }

    #[test]
    fn write_into_full_queue_would_block() {
        let hw = Hw::new();
        let mut driver = hw.driver(General::default());
        static TX: Config<'static> = Config {
            controllers: &[CONFIG],
            hohs: &[HOHS[2]],
        };
        driver.init(&TX).unwrap();
        hw.regs[0].txfqs.modify(|r| r.set_tfqf(true));
        let pdu = Pdu {
            id: CanId(0x10),
            length: 0,
            sdu: None,
            sw_pdu_handle: 1,
        };
        assert!(matches!(driver.write(0, &pdu), Err(nb::Error::WouldBlock)));
        assert!(driver.det().errors.is_empty());
    }

    #[test]
    fn time_stamp_services_follow_switch() {
        let hw = Hw::new();
        let mut driver = hw.driver(General::default());
        driver.init(&SINGLE).unwrap();
        assert_eq!(driver.get_current_time(0), Err(Error::NotOk));
        assert_eq!(driver.get_ingress_time_stamp(0), Err(Error::NotOk));

        let hw = Hw::new();
        let general = General {
            time_stamp: true,
            ..General::default()
        };
        let mut driver = hw.driver(general);
        driver.init(&SINGLE).unwrap();
        hw.regs[0].tscv.set_bits(0x1234);
        assert_eq!(driver.get_current_time(0), Ok(0x1234));
        // Nothing received yet
        assert_eq!(driver.get_ingress_time_stamp(0), Err(Error::NotOk));
        assert_eq!(
            driver.enable_egress_time_stamp(0),
            Err(Error::Development(ErrorId::ParamHandle))
        );
    }

    #[test]
    fn wakeup_and_version() {
        let hw = Hw::new();
        let mut driver = hw.driver(General::default());
        driver.init(&SINGLE).unwrap();
        assert_eq!(driver.check_wakeup(0), Err(Error::NotOk));
        let version = driver.get_version_info().unwrap();
        assert_eq!(version.module_id, 80);
        assert_eq!(
            (version.sw_major_version, version.sw_minor_version, version.sw_patch_version),
            (0, 1, 0)
        );
    }

    #[test]
    fn interrupt_nesting() {
        let hw = Hw::new();
        let mut driver = hw.driver(General::default());
        driver.init(&SINGLE).unwrap();
        assert_eq!(hw.regs[0].ile.bits(), 0b11);

        driver.enable_controller_interrupts(0).unwrap();
        assert_eq!(driver.disable_level(0), Some(0));

        for _ in 0..300 {
            driver.disable_controller_interrupts(0).unwrap();
        }
        assert_eq!(driver.disable_level(0), Some(255));
        assert_eq!(hw.regs[0].ile.bits(), 0);
        for _ in 0..254 {
            driver.enable_controller_interrupts(0).unwrap();
        }
        assert_eq!(hw.regs[0].ile.bits(), 0);
        driver.enable_controller_interrupts(0).unwrap();
        assert_eq!(hw.regs[0].ile.bits(), 0b11);
    }
}
