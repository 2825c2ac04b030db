//! Slot storage.
//!
//! All slot storage is carved out of one arena allocated at pool creation.
//! Slots refer to their storage by [`Region`] instead of by address, so the
//! bytes behind a slot can be moved without touching the slot API.

/// A fixed window into the arena.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Region {
    offset: usize,
    len: usize,
}

impl Region {
    /// Length of the region in bytes.
    pub fn len(&self) -> usize {
        self.len
    }
}

/// Pre-allocated backing memory for every slot of a pool.
#[derive(Debug)]
pub struct Arena {
    data: Vec<u8>,
}

impl Arena {
    /// Allocate an arena holding one region per entry in `sizes`.
    ///
    /// Regions are laid out back to back in the order given.
    pub fn with_regions(sizes: &[usize]) -> (Self, Vec<Region>) {
        let mut regions = Vec::with_capacity(sizes.len());
        let mut offset = 0;
        for &len in sizes {
            regions.push(Region { offset, len });
            offset += len;
        }

        (
            Self {
                data: vec![0u8; offset],
            },
            regions,
        )
    }

    /// Total size of the arena.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Get a region as a slice.
    pub fn get(&self, region: Region) -> &[u8] {
        &self.data[region.offset..region.offset + region.len]
    }

    /// Get a region as a mutable slice.
    pub fn get_mut(&mut self, region: Region) -> &mut [u8] {
        &mut self.data[region.offset..region.offset + region.len]
    }

    /// Zero a single region.
    pub fn clear(&mut self, region: Region) {
        self.get_mut(region).fill(0);
    }

    /// Zero the whole arena.
    pub fn reset(&mut self) {
        self.data.fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regions_are_disjoint() {
        let (mut arena, regions) = Arena::with_regions(&[4, 4, 2]);
        assert_eq!(arena.capacity(), 10);
        assert_eq!(regions.len(), 3);
        assert_eq!(regions[2].len(), 2);

        arena.get_mut(regions[0]).copy_from_slice(b"abcd");
        arena.get_mut(regions[1]).copy_from_slice(b"efgh");
        arena.get_mut(regions[2]).copy_from_slice(b"ij");

        assert_eq!(arena.get(regions[0]), b"abcd");
        assert_eq!(arena.get(regions[1]), b"efgh");
        assert_eq!(arena.get(regions[2]), b"ij");
    }

    #[test]
    fn test_clear_region() {
        let (mut arena, regions) = Arena::with_regions(&[2, 2]);
        arena.get_mut(regions[0]).copy_from_slice(b"xy");
        arena.get_mut(regions[1]).copy_from_slice(b"zw");

        arena.clear(regions[0]);
        assert_eq!(arena.get(regions[0]), &[0, 0]);
        assert_eq!(arena.get(regions[1]), b"zw");

        arena.reset();
        assert_eq!(arena.get(regions[1]), &[0, 0]);
    }
}
