//! IPv4 range handling for lookup generation.
//!
//! - [`cidr`] - parsing address cells and expanding ranges to CIDR blocks
//! - [`coalescer`] - splitting overlapping ranges into disjoint, attributed pieces

mod cidr;
mod coalescer;

pub use cidr::{format_cidr, parse_cidr, parse_ip_value, range_to_cidrs, ParsedRange};
pub use coalescer::{IpRange, IpRangeCoalescer, RowRanges};

/// Priority of an explicit single address
pub const PRIORITY_SINGLE: u32 = 0;

/// Priority of an explicit subnet or dash range
pub const PRIORITY_RANGE: u32 = 1;
