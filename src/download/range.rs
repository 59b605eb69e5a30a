//! Chunk sizing and byte-range planning

use crate::telegram::MAX_CHUNK_SIZE;

const KIB: u64 = 1024;
const MIN_EXPONENT: u32 = 2;
const MAX_EXPONENT: u32 = 10;

/// Request size for a file of `total_size` bytes
///
/// `2^clamp(ceil(log2(size_kib)), 2, 10)` KiB, capped at the protocol
/// maximum. Unknown (zero) sizes get the smallest bucket.
pub fn chunk_size_for(total_size: u64) -> u32 {
    let mut exponent = 0;
    while exponent < MAX_EXPONENT && (KIB << exponent) < total_size {
        exponent += 1;
    }
    let exponent = exponent.max(MIN_EXPONENT);

    ((KIB << exponent) as u32).min(MAX_CHUNK_SIZE)
}

/// Number of `chunk_size` parts covering `total_size` bytes
pub fn part_count(total_size: u64, chunk_size: u32) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    total_size.div_ceil(u64::from(chunk_size))
}

/// Round `offset` down to a chunk boundary
pub fn align_offset(offset: u64, chunk_size: u32) -> u64 {
    offset - offset % u64::from(chunk_size.max(1))
}

/// Request layout for an inclusive byte range `from..=until`
///
/// Requests start at a chunk boundary, so the first chunk is trimmed at
/// `first_part_cut` and the last one at `last_part_cut` (exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangePlan {
    pub offset: u64,
    pub chunk_size: u32,
    pub first_part_cut: usize,
    pub last_part_cut: usize,
    pub part_count: u64,
}

impl RangePlan {
    pub fn new(from: u64, until: u64, chunk_size: u32) -> Self {
        let chunk_size = chunk_size.clamp(1, MAX_CHUNK_SIZE);
        let chunk = u64::from(chunk_size);
        let until = until.max(from);

        let offset = align_offset(from, chunk_size);
        RangePlan {
            offset,
            chunk_size,
            first_part_cut: (from - offset) as usize,
            last_part_cut: (until % chunk + 1) as usize,
            part_count: (until + 1).div_ceil(chunk) - offset / chunk,
        }
    }

    /// Bytes the plan yields once trimmed
    pub fn len(&self) -> u64 {
        let span = self.part_count * u64::from(self.chunk_size);
        span - self.first_part_cut as u64 - (u64::from(self.chunk_size) - self.last_part_cut as u64)
    }

    pub fn is_empty(&self) -> bool {
        self.part_count == 0
    }
}
