//! Splits a file into the byte ranges uploaded as multipart parts.

/// 50 MiB, the default part size.
pub const DEFAULT_PART_SIZE: u64 = 50 * 1024 * 1024;

/// Storage providers reject non-final parts below 5 MiB.
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Storage providers accept at most 10,000 parts per object.
pub const MAX_PARTS: u64 = 10_000;

/// A contiguous byte range of the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartRange {
    /// Part number (1-based).
    pub part_number: u32,
    pub offset: u64,
    pub len: u64,
}

impl PartRange {
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// Number of parts a file of `file_size` bytes is split into.
pub fn part_count(file_size: u64, part_size: u64) -> u64 {
    debug_assert!(part_size > 0);
    file_size.div_ceil(part_size)
}

/// Split `file_size` bytes into `part_size` ranges; the last one may be shorter.
pub fn plan_parts(file_size: u64, part_size: u64) -> Vec<PartRange> {
    debug_assert!(part_size > 0);
    let mut parts = Vec::with_capacity(part_count(file_size, part_size) as usize);
    let mut offset = 0;
    let mut part_number = 1;

    while offset < file_size {
        let len = part_size.min(file_size - offset);
        parts.push(PartRange {
            part_number,
            offset,
            len,
        });
        offset += len;
        part_number += 1;
    }

    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn hundred_twenty_megabytes_make_three_parts() {
        let parts = plan_parts(120 * MB, DEFAULT_PART_SIZE);
        let lens: Vec<u64> = parts.iter().map(|p| p.len).collect();
        assert_eq!(lens, vec![50 * MB, 50 * MB, 20 * MB]);
        assert_eq!(parts[2].offset, 100 * MB);
        assert_eq!(parts[2].part_number, 3);
    }

    #[test]
    fn ranges_cover_file_exactly_once() {
        for file_size in [1, 7, 99, 100, 101, 1000, 4096, 65_537] {
            for part_size in [1, 3, 10, 100, 4096] {
                let parts = plan_parts(file_size, part_size);
                assert_eq!(parts.len() as u64, part_count(file_size, part_size));

                let mut expected_offset = 0;
                for (i, part) in parts.iter().enumerate() {
                    assert_eq!(part.part_number as usize, i + 1);
                    assert_eq!(part.offset, expected_offset);
                    assert!(part.len > 0 && part.len <= part_size);
                    expected_offset = part.end();
                }
                assert_eq!(expected_offset, file_size);
            }
        }
    }

    #[test]
    fn exact_multiple_has_no_short_tail() {
        let parts = plan_parts(100 * MB, DEFAULT_PART_SIZE);
        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(|p| p.len == DEFAULT_PART_SIZE));
    }

    #[test]
    fn empty_file_has_no_parts() {
        assert!(plan_parts(0, DEFAULT_PART_SIZE).is_empty());
        assert_eq!(part_count(0, DEFAULT_PART_SIZE), 0);
    }
}
