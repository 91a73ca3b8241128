use tracing::debug;

use super::{Conversion, ConversionInput, DeferredInput, FieldAttributes, FieldMapping};
use crate::application::use_cases::ip_ranges::{parse_ip_value, IpRangeCoalescer, RowRanges};
use crate::domain::lookup::FieldValue;

/// Address field whose CIDR blocks depend on every other row of the batch.
///
/// The immediate pass only queues ranges; the deferred pass hands each row
/// the disjoint blocks it owns after overlapping ranges are split.
#[derive(Debug)]
pub struct IpField {
    attributes: FieldAttributes,
    min_prefix_len: u32,
    coalescer: IpRangeCoalescer,
    row_ranges: Option<RowRanges>,
}

impl IpField {
    pub fn new(attributes: FieldAttributes, min_prefix_len: u32) -> Self {
        Self {
            attributes: attributes.deferring(),
            min_prefix_len: min_prefix_len.min(32),
            coalescer: IpRangeCoalescer::new(),
            row_ranges: None,
        }
    }

    fn tokens<'a>(&self, raw: &'a str) -> Vec<&'a str> {
        let delim = self.attributes.delim().unwrap_or("|");
        raw.split(delim)
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .collect()
    }
}

impl FieldMapping for IpField {
    fn attributes(&self) -> &FieldAttributes {
        &self.attributes
    }

    fn validate(&self, raw: Option<&str>) -> bool {
        self.tokens(raw.unwrap_or(""))
            .into_iter()
            .all(|token| parse_ip_value(token).is_some())
    }

    fn convert(&mut self, input: &ConversionInput<'_>) -> Conversion {
        let tokens = self.tokens(input.raw_trimmed());
        if tokens.is_empty() {
            return Conversion::Converted(FieldValue::empty());
        }
        for token in tokens {
            match parse_ip_value(token) {
                Some(range) => {
                    self.coalescer
                        .add(range.low, range.high, range.priority, input.row_id)
                }
                None => return Conversion::Invalid(format!("not an IPv4 value: {}", token)),
            }
        }
        Conversion::Deferred
    }

    fn discard(&mut self, row_id: usize) {
        self.coalescer.remove_owner(row_id);
    }

    fn postprocess(&mut self) {
        let pending = self.coalescer.len();
        let row_ranges = self.coalescer.coalesce_by_row();
        debug!(
            field = %self.attributes.name,
            pending,
            rows = row_ranges.len(),
            "Built disjoint IP range table"
        );
        self.row_ranges = Some(row_ranges);
    }

    fn convert_deferred(&mut self, input: &DeferredInput) -> Option<FieldValue> {
        let ranges = self.row_ranges.as_ref()?.get(&input.row_id)?;
        Some(FieldValue::Multi(IpRangeCoalescer::cidrs_for(
            ranges,
            self.min_prefix_len,
        )))
    }

    fn reset(&mut self) {
        self.coalescer.reset();
        self.row_ranges = None;
    }
}
