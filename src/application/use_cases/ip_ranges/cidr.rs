use std::net::Ipv4Addr;

use super::{PRIORITY_RANGE, PRIORITY_SINGLE};

/// An address cell parsed into an inclusive integer range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedRange {
    pub low: u64,
    pub high: u64,
    pub priority: u32,
}

fn parse_addr(value: &str) -> Option<u64> {
    value.trim().parse::<Ipv4Addr>().ok().map(|addr| u64::from(u32::from(addr)))
}

fn mask_for(prefix: u32) -> u64 {
    if prefix == 0 {
        0
    } else {
        (u64::from(u32::MAX) << (32 - prefix)) & u64::from(u32::MAX)
    }
}

/// Parse one address token: `a.b.c.d`, `a.b.c.d/n` or `a.b.c.d-e.f.g.h`.
/// Host bits of a subnet are masked off. Returns `None` for anything else.
pub fn parse_ip_value(value: &str) -> Option<ParsedRange> {
    let value = value.trim();
    if let Some((addr, prefix)) = value.split_once('/') {
        let (low, high) = parse_cidr_parts(addr, prefix)?;
        return Some(ParsedRange {
            low,
            high,
            priority: PRIORITY_RANGE,
        });
    }
    if let Some((start, end)) = value.split_once('-') {
        let low = parse_addr(start)?;
        let high = parse_addr(end)?;
        if low > high {
            return None;
        }
        return Some(ParsedRange {
            low,
            high,
            priority: PRIORITY_RANGE,
        });
    }
    let addr = parse_addr(value)?;
    Some(ParsedRange {
        low: addr,
        high: addr,
        priority: PRIORITY_SINGLE,
    })
}

fn parse_cidr_parts(addr: &str, prefix: &str) -> Option<(u64, u64)> {
    let base = parse_addr(addr)?;
    let prefix: u32 = prefix.trim().parse().ok()?;
    if prefix > 32 {
        return None;
    }
    let mask = mask_for(prefix);
    let low = base & mask;
    let high = low | (!mask & u64::from(u32::MAX));
    Some((low, high))
}

/// Parse a CIDR block or plain address back into its inclusive range
pub fn parse_cidr(value: &str) -> Option<(u64, u64)> {
    match value.split_once('/') {
        Some((addr, prefix)) => parse_cidr_parts(addr, prefix),
        None => parse_addr(value).map(|addr| (addr, addr)),
    }
}

/// Render a block; a /32 collapses to the bare address
pub fn format_cidr(base: u64, prefix: u32) -> String {
    let addr = Ipv4Addr::from(base as u32);
    if prefix == 32 {
        addr.to_string()
    } else {
        format!("{}/{}", addr, prefix)
    }
}

/// Cover `low..=high` exactly with the fewest aligned blocks whose prefix
/// length is at least `min_prefix_len`.
pub fn range_to_cidrs(low: u64, high: u64, min_prefix_len: u32) -> Vec<String> {
    let min_prefix_len = min_prefix_len.min(32);
    let max_block = 1u64 << (32 - min_prefix_len);
    let mut blocks = Vec::new();
    let mut cursor = low;

    while cursor <= high {
        // Largest block aligned at `cursor`
        let mut size = if cursor == 0 {
            1u64 << 32
        } else {
            1u64 << cursor.trailing_zeros().min(32)
        };
        while size > max_block || cursor + size - 1 > high {
            size >>= 1;
        }
        let prefix = 32 - size.trailing_zeros();
        blocks.push(format_cidr(cursor, prefix));
        cursor += size;
    }

    blocks
}
