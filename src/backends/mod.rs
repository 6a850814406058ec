//! Input backends for `corebind`.
//!
//! Implementations of [`Device`](crate::device::Device) for concrete input sources.
//!
//! # Feature flags
//! - **`hid`**: enables the `hidapi` backend ([`hid`]).
//!
//! The scripted [`virtual_input::VirtualDevice`] and the report decoding in
//! [`report`] are always available.

use crate::device::Device;

#[cfg(feature = "hid")]
#[cfg_attr(docsrs, doc(cfg(feature = "hid")))]
pub mod hid;
pub mod report;
pub mod virtual_input;

/// Unified discovery across enabled backends.
///
/// With `hid` enabled this opens every accepted HID device `make_parser`
/// returns a parser for. Without it the list is empty.
#[allow(unused_variables)]
pub fn probe_devices(
    make_parser: impl Fn(&report::ParserRequest) -> Option<Box<dyn report::ReportParser>>,
) -> Vec<Box<dyn Device>> {
    #[allow(unused_mut)]
    let mut out: Vec<Box<dyn Device>> = Vec::new();

    #[cfg(feature = "hid")]
    {
        match hidapi::HidApi::new() {
            Ok(api) => out.extend(hid::probe_devices(&api, |info| {
                make_parser(&report::ParserRequest::from_hid(info))
            })),
            Err(e) => tracing::warn!(error = %e, "failed to initialize HID API"),
        }
    }

    out
}
