//! `hidapi` device source.
//!
//! [`HidInputDevice`] wraps a `hidapi::HidDevice` and a [`ReportParser`]. It
//! opens the handle in non-blocking mode, drains a bounded number of reports
//! per poll and splits `[report_id][payload...]` when the parser expects it.
//!
//! Calibration and dead zones are not applied here; that is the
//! [`DeviceHandler`](crate::device::DeviceHandler)'s job.

use crate::backends::report::ReportParser;
use crate::config::DEFAULT_MAX_REPORTS_PER_TICK;
use crate::device::{Device, ElementInfo, RawSample};
use crate::metadata::{DeviceIdentity, DeviceMeta};
use hidapi::{DeviceInfo, HidApi, HidDevice};
use tracing::{debug, warn};

pub struct HidInputDevice {
    identity: DeviceIdentity,
    id: String,
    name: String,
    raw: HidDevice,
    buf: Vec<u8>,
    parser: Box<dyn ReportParser>,
    meta: DeviceMeta,
    max_reports: usize,
}

impl HidInputDevice {
    /// Open and wrap a HID device entry. `None` if the OS handle cannot be opened.
    pub fn new(info: &DeviceInfo, api: &HidApi, parser: Box<dyn ReportParser>) -> Option<Self> {
        let device = match info.open_device(api) {
            Ok(device) => device,
            Err(e) => {
                debug!(vid = info.vendor_id(), pid = info.product_id(), error = %e, "hid open failed");
                return None;
            }
        };
        // Reads are driven by the host's loop or a reader thread.
        if let Err(e) = device.set_blocking_mode(false) {
            debug!(error = %e, "hid device stays in blocking mode");
        }

        let identity = identity_from_info(info);
        let buf_len = parser.input_report_len().unwrap_or(64);
        Some(Self {
            id: identity.unique_identifier(),
            identity,
            name: info.product_string().unwrap_or("Unknown").to_string(),
            raw: device,
            buf: vec![0u8; buf_len],
            parser,
            meta: meta_from_info(info),
            max_reports: DEFAULT_MAX_REPORTS_PER_TICK,
        })
    }

    pub fn with_max_reports(mut self, max_reports: usize) -> Self {
        self.max_reports = max_reports.max(1);
        self
    }

    #[inline]
    fn split_report(data: &[u8]) -> (u8, &[u8]) {
        match data.split_first() {
            Some((id, payload)) => (*id, payload),
            None => (0, &[]),
        }
    }
}

impl Device for HidInputDevice {
    fn poll(&mut self) -> Vec<RawSample> {
        let mut samples = Vec::new();
        for _ in 0..self.max_reports {
            match self.raw.read(&mut self.buf) {
                Ok(0) => break,
                Ok(n) => {
                    let slice = &self.buf[..n];
                    let (report_id, payload) = if self.parser.expects_report_id_prefix() {
                        Self::split_report(slice)
                    } else {
                        (0, slice)
                    };
                    samples.extend(self.parser.parse(report_id, payload));
                }
                Err(e) => {
                    warn!(device = %self.id, error = %e, "hid read failed");
                    break;
                }
            }
        }
        samples
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn identity(&self) -> DeviceIdentity {
        self.identity.clone()
    }

    fn metadata(&self) -> DeviceMeta {
        self.meta.clone()
    }

    fn describe(&self) -> Vec<ElementInfo> {
        self.parser.describe()
    }
}

/// Whether a `hidapi` entry looks like a game controller.
///
/// Accepts Generic Desktop, Simulation Controls, Physical Interface and
/// vendor-defined pages; rejects plain mice and keyboards.
pub fn accept_device(info: &DeviceInfo) -> bool {
    let up = info.usage_page();
    let u = info.usage();
    let is_generic_desktop = up == 0x01;
    let is_simulation = up == 0x02;
    let is_physical_iface = up == 0x0F;
    let is_vendor_defined = (up & 0xFF00) == 0xFF00;

    if !(is_generic_desktop || is_simulation || is_physical_iface || is_vendor_defined) {
        return false;
    }
    // Mouse = 0x02, Keyboard = 0x06 on Generic Desktop.
    !(is_generic_desktop && matches!(u, 0x02 | 0x06))
}

pub fn identity_from_info(info: &DeviceInfo) -> DeviceIdentity {
    let identity = DeviceIdentity::new(info.vendor_id(), info.product_id());
    match info.serial_number() {
        Some(serial) if !serial.is_empty() => identity.with_serial(serial),
        _ => identity.with_path_location(&info.path().to_string_lossy()),
    }
}

pub fn meta_from_info(info: &DeviceInfo) -> DeviceMeta {
    DeviceMeta {
        bus: None,
        product: info.product_string().map(str::to_string),
        manufacturer: info.manufacturer_string().map(str::to_string),
        usage_page: Some(info.usage_page()),
        usage: Some(info.usage()),
        interface_number: Some(info.interface_number()),
        path: Some(info.path().to_string_lossy().to_string()),
    }
}

/// Open every accepted device `make_parser` has a parser for.
pub fn probe_devices(
    api: &HidApi,
    make_parser: impl Fn(&DeviceInfo) -> Option<Box<dyn ReportParser>>,
) -> Vec<Box<dyn Device>> {
    let mut found: Vec<Box<dyn Device>> = Vec::new();
    for info in api.device_list() {
        if !accept_device(info) {
            continue;
        }
        let Some(parser) = make_parser(info) else {
            debug!(vid = info.vendor_id(), pid = info.product_id(), "no report parser");
            continue;
        };
        if let Some(dev) = HidInputDevice::new(info, api, parser) {
            found.push(Box::new(dev));
        }
    }
    found
}
