use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use tracing::debug;

use super::range_to_cidrs;

/// An inclusive address range owned by one or more input rows.
///
/// Field order drives the heap ordering: `(low, high, priority, owners)`.
/// Lower `priority` is more authoritative.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct IpRange {
    pub low: u64,
    pub high: u64,
    pub priority: u32,
    pub owners: Vec<usize>,
}

impl IpRange {
    pub fn new(low: u64, high: u64, priority: u32, owner: usize) -> Self {
        Self {
            low,
            high,
            priority,
            owners: vec![owner],
        }
    }

    fn piece(low: u64, high: u64, priority: u32, owners: Vec<usize>) -> Self {
        Self {
            low,
            high,
            priority,
            owners,
        }
    }

    pub fn overlaps(&self, other: &IpRange) -> bool {
        self.low <= other.high && other.low <= self.high
    }
}

fn union_owners(left: &[usize], right: &[usize]) -> Vec<usize> {
    let mut owners: Vec<usize> = left.iter().chain(right.iter()).copied().collect();
    owners.sort_unstable();
    owners.dedup();
    owners
}

/// Disjoint ranges grouped by the row that contributed them
pub type RowRanges = HashMap<usize, Vec<IpRange>>;

/// Accumulates ranges for one batch and splits them into disjoint pieces
#[derive(Debug, Default)]
pub struct IpRangeCoalescer {
    pending: BinaryHeap<Reverse<IpRange>>,
    /// Extent and priority of every range each owner pushed
    claims: HashMap<usize, Vec<(u64, u64, u32)>>,
}

impl IpRangeCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, range: IpRange) {
        for owner in &range.owners {
            self.claims
                .entry(*owner)
                .or_default()
                .push((range.low, range.high, range.priority));
        }
        self.pending.push(Reverse(range));
    }

    pub fn add(&mut self, low: u64, high: u64, priority: u32, owner: usize) {
        self.push(IpRange::new(low, high, priority, owner));
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop every pending range
    pub fn reset(&mut self) {
        self.pending.clear();
        self.claims.clear();
    }

    /// Withdraw every pending range pushed by `owner`
    pub fn remove_owner(&mut self, owner: usize) {
        if self.claims.remove(&owner).is_none() {
            return;
        }
        let pending = std::mem::take(&mut self.pending).into_vec();
        self.pending = pending
            .into_iter()
            .filter_map(|Reverse(mut range)| {
                range.owners.retain(|id| *id != owner);
                (!range.owners.is_empty()).then_some(Reverse(range))
            })
            .collect();
    }

    /// Drain the pending ranges into a sorted, pairwise disjoint set.
    /// An overlapped stretch is owned by the union of the rows that covered it.
    pub fn coalesce(&mut self) -> Vec<IpRange> {
        let mut heap = std::mem::take(&mut self.pending);
        let mut output = Vec::with_capacity(heap.len());
        let mut splits = 0usize;

        while heap.len() > 1 {
            let (Some(Reverse(first)), Some(Reverse(second))) = (heap.pop(), heap.pop()) else {
                break;
            };

            if first.high < second.low {
                output.push(first);
                heap.push(Reverse(second));
                continue;
            }

            if first.low == second.low && first.high == second.high {
                let owners = union_owners(&first.owners, &second.owners);
                let priority = first.priority.min(second.priority);
                heap.push(Reverse(IpRange::piece(first.low, first.high, priority, owners)));
                continue;
            }

            splits += 1;
            for piece in split_overlap(&first, &second) {
                heap.push(Reverse(piece));
            }
        }

        output.extend(heap.into_iter().map(|Reverse(range)| range));
        debug!(ranges = output.len(), splits, "Coalesced IP ranges");
        output
    }

    /// Coalesce and hand each disjoint range to its most authoritative owners.
    ///
    /// An owner's priority on a range is the lowest priority among the ranges
    /// it pushed that cover it. Only the owners at the lowest such priority
    /// keep the range; equal priorities share it.
    pub fn coalesce_by_row(&mut self) -> RowRanges {
        let claims = std::mem::take(&mut self.claims);
        let mut by_row: RowRanges = HashMap::new();
        let mut contested = 0usize;

        for range in self.coalesce() {
            let claimed: Vec<(usize, u32)> = range
                .owners
                .iter()
                .map(|owner| (*owner, claim_priority(&claims, *owner, &range)))
                .collect();
            let Some(best) = claimed.iter().map(|(_, priority)| *priority).min() else {
                continue;
            };
            if claimed.iter().any(|(_, priority)| *priority != best) {
                contested += 1;
            }
            for (owner, priority) in claimed {
                if priority == best {
                    by_row.entry(owner).or_default().push(range.clone());
                }
            }
        }

        if contested > 0 {
            debug!(contested, "Ranges kept by their more specific owners");
        }
        by_row
    }

    /// Expand the ranges of one row to CIDR block strings
    pub fn cidrs_for(ranges: &[IpRange], min_prefix_len: u32) -> Vec<String> {
        ranges
            .iter()
            .flat_map(|range| range_to_cidrs(range.low, range.high, min_prefix_len))
            .collect()
    }
}

fn claim_priority(
    claims: &HashMap<usize, Vec<(u64, u64, u32)>>,
    owner: usize,
    range: &IpRange,
) -> u32 {
    claims
        .get(&owner)
        .into_iter()
        .flatten()
        .filter(|(low, high, _)| *low <= range.high && range.low <= *high)
        .map(|(_, _, priority)| *priority)
        .min()
        .unwrap_or(range.priority)
}

/// Split two overlapping ranges, `first <= second` in heap order.
fn split_overlap(first: &IpRange, second: &IpRange) -> Vec<IpRange> {
    let shared = union_owners(&first.owners, &second.owners);
    let shared_priority = first.priority.min(second.priority) + 1;
    let mut pieces = Vec::with_capacity(3);

    if first.low < second.low {
        pieces.push(IpRange::piece(
            first.low,
            second.low - 1,
            first.priority + 1,
            first.owners.clone(),
        ));
    }

    let overlap_high = first.high.min(second.high);
    pieces.push(IpRange::piece(
        second.low,
        overlap_high,
        shared_priority,
        shared,
    ));

    if first.high > second.high {
        pieces.push(IpRange::piece(
            second.high + 1,
            first.high,
            first.priority + 1,
            first.owners.clone(),
        ));
    } else if second.high > first.high {
        pieces.push(IpRange::piece(
            first.high + 1,
            second.high,
            second.priority + 1,
            second.owners.clone(),
        ));
    }

    pieces
}
