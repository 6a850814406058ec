//! Input report decoding.
//!
//! A [`ReportParser`] turns raw HID input reports into [`RawSample`]s and
//! describes the elements it decodes. [`LayoutParser`] is the portable
//! implementation: each element is a little-endian bit field at a fixed offset
//! in a given report ID, typically built from a device's report descriptor or
//! from a known controller layout.
//!
//! Parsers only emit changes. The first report after construction emits every
//! field it covers so the handler starts from a known state.

use crate::device::{ElementInfo, ElementKind, RawSample};
use crate::hat::HatSwitchType;
use std::collections::HashMap;

/// Decodes input reports for one device.
pub trait ReportParser: Send {
    /// Elements this parser can emit samples for.
    fn describe(&self) -> Vec<ElementInfo>;

    /// Decode one report. `payload` excludes the report ID byte when
    /// [`expects_report_id_prefix`](Self::expects_report_id_prefix) is `true`.
    fn parse(&mut self, report_id: u8, payload: &[u8]) -> Vec<RawSample>;

    /// Whether reads deliver `[report_id][payload...]`.
    fn expects_report_id_prefix(&self) -> bool {
        false
    }

    /// Full read length including the ID byte, when known.
    fn input_report_len(&self) -> Option<usize> {
        None
    }
}

/// What a parser factory gets to decide which layout a device uses.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParserRequest {
    pub vendor_id: u16,
    pub product_id: u16,
    pub usage_page: u16,
    pub usage: u16,
    pub product: Option<String>,
}

impl ParserRequest {
    #[cfg(feature = "hid")]
    pub fn from_hid(info: &hidapi::DeviceInfo) -> Self {
        Self {
            vendor_id: info.vendor_id(),
            product_id: info.product_id(),
            usage_page: info.usage_page(),
            usage: info.usage(),
            product: info.product_string().map(str::to_string),
        }
    }
}

/// Location of one element inside an input report.
#[derive(Clone, Debug, PartialEq)]
pub struct ReportField {
    pub element: ElementInfo,
    pub report_id: u8,
    pub bit_offset: usize,
    pub bit_size: u8,
    /// Sign-extend the extracted value.
    pub signed: bool,
}

/// Bit-field report parser.
#[derive(Clone, Debug, Default)]
pub struct LayoutParser {
    fields: Vec<ReportField>,
    last: HashMap<u32, i64>,
    report_id_prefix: bool,
    report_len: Option<usize>,
}

impl LayoutParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_report_id_prefix(mut self, enabled: bool) -> Self {
        self.report_id_prefix = enabled;
        self
    }

    pub fn with_report_len(mut self, len: usize) -> Self {
        self.report_len = Some(len);
        self
    }

    pub fn field(mut self, element: ElementInfo, report_id: u8, bit_offset: usize, bit_size: u8, signed: bool) -> Self {
        self.fields.push(ReportField {
            element,
            report_id,
            bit_offset,
            bit_size: bit_size.clamp(1, 32),
            signed,
        });
        self
    }

    pub fn fields(&self) -> &[ReportField] {
        &self.fields
    }
}

impl ReportParser for LayoutParser {
    fn describe(&self) -> Vec<ElementInfo> {
        self.fields.iter().map(|f| f.element.clone()).collect()
    }

    fn parse(&mut self, report_id: u8, payload: &[u8]) -> Vec<RawSample> {
        let mut out = Vec::new();
        for field in &self.fields {
            if self.report_id_prefix && field.report_id != report_id {
                continue;
            }
            let Some(value) = read_bits(payload, field.bit_offset, field.bit_size, field.signed) else {
                continue;
            };
            let cookie = field.element.cookie;
            if self.last.insert(cookie, value) == Some(value) {
                continue;
            }
            out.push(match field.element.kind {
                ElementKind::Key => RawSample {
                    cookie,
                    usage: field.element.usage,
                    value,
                },
                _ => RawSample::new(cookie, value),
            });
        }
        out
    }

    fn expects_report_id_prefix(&self) -> bool {
        self.report_id_prefix
    }

    fn input_report_len(&self) -> Option<usize> {
        self.report_len
    }
}

/// Extract `size` bits at `offset` (LSB first). `None` when the report is too short.
pub fn read_bits(data: &[u8], offset: usize, size: u8, signed: bool) -> Option<i64> {
    let size = size as usize;
    if size == 0 || offset + size > data.len() * 8 {
        return None;
    }
    let mut raw: u64 = 0;
    for i in 0..size {
        let bit = offset + i;
        if data[bit / 8] >> (bit % 8) & 1 == 1 {
            raw |= 1 << i;
        }
    }
    if signed && size < 64 && raw >> (size - 1) & 1 == 1 {
        Some(raw as i64 - (1i64 << size))
    } else {
        Some(raw as i64)
    }
}

/// Hat switch shape from a value field's usage and logical range.
///
/// Returns the hat type and whether values are degrees, or `None` for
/// fields that are not hat switches. Ranges of exactly four or eight
/// positions are slots; anything else is treated as an 8-way hat in degrees.
pub fn classify_hat(usage_page: u16, usage: u16, logical_min: i32, logical_max: i32) -> Option<(HatSwitchType, bool)> {
    if usage_page != 0x01 || usage != 0x39 {
        return None;
    }
    match (logical_min, logical_max) {
        (0, 7) | (1, 8) => Some((HatSwitchType::EightWays, false)),
        (0, 3) | (1, 4) => Some((HatSwitchType::FourWays, false)),
        _ => Some((HatSwitchType::EightWays, true)),
    }
}

/// Display name for common usages.
pub fn usage_name(usage_page: u16, usage: u16) -> String {
    match (usage_page, usage) {
        (0x01, 0x30) => "X".into(),
        (0x01, 0x31) => "Y".into(),
        (0x01, 0x32) => "Z".into(),
        (0x01, 0x33) => "Rx".into(),
        (0x01, 0x34) => "Ry".into(),
        (0x01, 0x35) => "Rz".into(),
        (0x01, 0x36) => "Slider".into(),
        (0x01, 0x37) => "Dial".into(),
        (0x01, 0x38) => "Wheel".into(),
        (0x01, 0x39) => "Hat".into(),
        (0x01, u) => format!("GD_{u:#04x}"),
        (0x02, 0xB0) => "Accelerator".into(),
        (0x02, 0xB1) => "Brake".into(),
        (0x02, 0xB2) => "Clutch".into(),
        (0x02, 0xBB) => "Throttle".into(),
        (0x02, _) => "Sim".into(),
        (0x09, n) => format!("Button {n}"),
        (page, u) => format!("{page:#06x}:{u:#06x}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_fields() {
        let data = [0b1010_0101u8, 0xFF, 0x80];
        assert_eq!(read_bits(&data, 0, 4, false), Some(0b0101));
        assert_eq!(read_bits(&data, 4, 4, false), Some(0b1010));
        assert_eq!(read_bits(&data, 8, 8, true), Some(-1));
        assert_eq!(read_bits(&data, 16, 8, false), Some(0x80));
        assert_eq!(read_bits(&data, 20, 8, false), None);
    }

    #[test]
    fn only_changes_are_emitted() {
        let mut p = LayoutParser::new()
            .field(ElementInfo::axis(1, 0x30, -128, 127), 0, 0, 8, true)
            .field(ElementInfo::button(2, 1), 0, 8, 1, false);
        let first = p.parse(0, &[0x10, 0x00]);
        assert_eq!(first, vec![RawSample::new(1, 16), RawSample::new(2, 0)]);
        assert!(p.parse(0, &[0x10, 0x00]).is_empty());
        assert_eq!(p.parse(0, &[0x10, 0x01]), vec![RawSample::new(2, 1)]);
        assert_eq!(p.describe().len(), 2);
    }

    #[test]
    fn report_ids_select_fields() {
        let mut p = LayoutParser::new()
            .with_report_id_prefix(true)
            .field(ElementInfo::button(1, 1), 1, 0, 1, false)
            .field(ElementInfo::button(2, 2), 2, 0, 1, false);
        assert_eq!(p.parse(2, &[1]), vec![RawSample::new(2, 1)]);
    }

    #[test]
    fn hat_classification() {
        assert_eq!(classify_hat(0x01, 0x39, 0, 7), Some((HatSwitchType::EightWays, false)));
        assert_eq!(classify_hat(0x01, 0x39, 0, 3), Some((HatSwitchType::FourWays, false)));
        assert_eq!(classify_hat(0x01, 0x39, 0, 315), Some((HatSwitchType::EightWays, true)));
        assert_eq!(classify_hat(0x01, 0x30, 0, 7), None);
        assert_eq!(usage_name(0x01, 0x33), "Rx");
    }
}
