// Copyright 2026 the Tatami Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Spreading allocations across multiple atlas slices.
//!
//! A single [`AtlasManager`] covers one fixed rectangle. Workloads that
//! outgrow it — typically the layers of a texture array — keep a list of
//! equally sized slices and place each request in the first slice with
//! room, growing the list on demand up to a configured bound.

use alloc::vec::Vec;

use log::{debug, error};
use thiserror::Error;

use crate::manager::AtlasManager;
use crate::region::Region;

/// Identifier of a slice within a [`MultiAtlas`].
///
/// The raw value is the slice's position in creation order and is stable
/// for the lifetime of the atlas, so it can double as a texture array
/// layer index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SliceIndex(u32);

impl SliceIndex {
    /// Create a slice index from its raw value.
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// The raw index value.
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

/// A region together with the slice it was placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlicedRegion {
    /// The slice holding the region.
    pub slice: SliceIndex,
    /// The placed region within that slice.
    pub region: Region,
}

/// Errors that can occur when allocating from a [`MultiAtlas`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AtlasError {
    /// No slice can take the request and no new slice may be created.
    #[error("no space available in any atlas slice")]
    OutOfSpace,
    /// Creating another slice would exceed the configured maximum.
    #[error("maximum atlas slice count ({0}) reached")]
    SliceLimitReached(usize),
    /// The request does not fit a slice even when completely empty.
    #[error("requested region {width}x{height} exceeds the slice extent")]
    RegionTooLarge {
        /// The requested width.
        width: u32,
        /// The requested height.
        height: u32,
    },
    /// The request has a zero dimension.
    #[error("allocation request with a zero dimension")]
    EmptyRequest,
}

/// Configuration for a [`MultiAtlas`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiAtlasConfig {
    /// Width of each slice.
    pub slice_width: u32,
    /// Height of each slice.
    pub slice_height: u32,
    /// Number of slices to create up front.
    pub initial_slice_count: usize,
    /// Upper bound on the number of slices.
    pub max_slices: usize,
    /// Whether a new slice may be created when every existing one is full.
    pub auto_grow: bool,
}

impl Default for MultiAtlasConfig {
    fn default() -> Self {
        Self {
            slice_width: 1024,
            slice_height: 1024,
            initial_slice_count: 1,
            max_slices: 8,
            auto_grow: true,
        }
    }
}

/// Usage statistics for one slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceStats {
    /// Total slice area in pixels.
    pub total_area: u64,
    /// Currently allocated area in pixels.
    pub allocated_area: u64,
    /// Number of live allocations.
    pub allocated_count: usize,
}

impl SliceStats {
    /// Allocated fraction of the slice, from 0.0 to 1.0.
    pub fn usage(&self) -> f32 {
        if self.total_area == 0 {
            0.0
        } else {
            self.allocated_area as f32 / self.total_area as f32
        }
    }
}

/// A growable collection of equally sized atlas slices.
#[derive(Debug)]
pub struct MultiAtlas {
    slices: Vec<AtlasManager>,
    config: MultiAtlasConfig,
}

impl MultiAtlas {
    /// Create a multi-atlas with the given configuration.
    pub fn new(config: MultiAtlasConfig) -> Self {
        let mut multi = Self {
            slices: Vec::new(),
            config,
        };
        for _ in 0..config.initial_slice_count.min(config.max_slices) {
            multi.push_slice();
        }
        multi
    }

    /// The active configuration.
    pub fn config(&self) -> &MultiAtlasConfig {
        &self.config
    }

    /// Number of slices currently in use.
    pub fn slice_count(&self) -> usize {
        self.slices.len()
    }

    /// Whether no slice holds any allocation.
    pub fn is_empty(&self) -> bool {
        self.slices.iter().all(AtlasManager::is_empty)
    }

    /// Create a new slice and return its index.
    ///
    /// # Errors
    ///
    /// Returns [`AtlasError::SliceLimitReached`] when the configured
    /// maximum has been hit.
    pub fn create_slice(&mut self) -> Result<SliceIndex, AtlasError> {
        if self.slices.len() >= self.config.max_slices {
            return Err(AtlasError::SliceLimitReached(self.config.max_slices));
        }
        Ok(self.push_slice())
    }

    /// Allocate a `width x height` region in the first slice with room.
    ///
    /// Slices are tried in creation order; when all are full and
    /// `auto_grow` is set, a new slice is created for the request.
    ///
    /// # Errors
    ///
    /// [`AtlasError::RegionTooLarge`] for requests beyond the slice
    /// extent, [`AtlasError::SliceLimitReached`] when growth is needed but
    /// capped, [`AtlasError::OutOfSpace`] otherwise.
    pub fn allocate(&mut self, width: u32, height: u32) -> Result<SlicedRegion, AtlasError> {
        if width == 0 || height == 0 {
            return Err(AtlasError::EmptyRequest);
        }
        if width > self.config.slice_width || height > self.config.slice_height {
            return Err(AtlasError::RegionTooLarge { width, height });
        }

        for (i, slice) in self.slices.iter_mut().enumerate() {
            if let Some(region) = slice.allocate(width, height) {
                #[expect(clippy::cast_possible_truncation, reason = "slice count fits u32")]
                let slice = SliceIndex(i as u32);
                return Ok(SlicedRegion { slice, region });
            }
        }

        if self.config.auto_grow {
            let slice = self.create_slice()?;
            // A fresh slice always admits an in-extent request.
            if let Some(region) = self.slices[slice.0 as usize].allocate(width, height) {
                return Ok(SlicedRegion { slice, region });
            }
        }

        Err(AtlasError::OutOfSpace)
    }

    /// Return a region obtained from [`allocate`](Self::allocate) to its
    /// slice.
    pub fn free(&mut self, allocation: SlicedRegion) {
        let SlicedRegion { slice, region } = allocation;
        match self.slices.get_mut(slice.0 as usize) {
            Some(manager) => manager.free(region),
            None => error!(
                "free of region {region} names unknown atlas slice {}",
                slice.as_u32()
            ),
        }
    }

    /// Usage statistics for a slice, or `None` for an unknown index.
    pub fn stats(&self, slice: SliceIndex) -> Option<SliceStats> {
        let manager = self.slices.get(slice.0 as usize)?;
        Some(SliceStats {
            total_area: u64::from(manager.width()) * u64::from(manager.height()),
            allocated_area: manager.allocated_area(),
            allocated_count: manager.allocated_region_count(),
        })
    }

    fn push_slice(&mut self) -> SliceIndex {
        #[expect(clippy::cast_possible_truncation, reason = "slice count fits u32")]
        let index = SliceIndex(self.slices.len() as u32);
        debug!(
            "creating atlas slice {} ({}x{})",
            index.as_u32(),
            self.config.slice_width,
            self.config.slice_height
        );
        self.slices.push(AtlasManager::new(
            self.config.slice_width,
            self.config.slice_height,
        ));
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_slices: usize, auto_grow: bool) -> MultiAtlasConfig {
        MultiAtlasConfig {
            slice_width: 64,
            slice_height: 64,
            initial_slice_count: 1,
            max_slices,
            auto_grow,
        }
    }

    #[test]
    fn starts_with_initial_slices() {
        let multi = MultiAtlas::new(MultiAtlasConfig {
            initial_slice_count: 3,
            ..config(8, true)
        });
        assert_eq!(multi.slice_count(), 3);
        assert!(multi.is_empty());
    }

    #[test]
    fn initial_count_is_capped_by_the_limit() {
        let multi = MultiAtlas::new(MultiAtlasConfig {
            initial_slice_count: 5,
            ..config(2, false)
        });
        assert_eq!(multi.slice_count(), 2);
    }

    #[test]
    fn first_fit_prefers_earlier_slices() {
        let mut multi = MultiAtlas::new(MultiAtlasConfig {
            initial_slice_count: 2,
            ..config(2, false)
        });

        let a = multi.allocate(32, 32).unwrap();
        assert_eq!(a.slice, SliceIndex::new(0));

        // Fill the rest of slice 0 so the next request spills over.
        let b = multi.allocate(64, 32).unwrap();
        let c = multi.allocate(32, 32).unwrap();
        assert_eq!(b.slice, SliceIndex::new(0));
        assert_eq!(c.slice, SliceIndex::new(0));

        let d = multi.allocate(64, 64).unwrap();
        assert_eq!(d.slice, SliceIndex::new(1));

        // Freeing in slice 0 makes it the first fit again.
        multi.free(a);
        let e = multi.allocate(32, 32).unwrap();
        assert_eq!(e.slice, SliceIndex::new(0));
    }

    #[test]
    fn auto_grow_creates_slices_on_demand() {
        let mut multi = MultiAtlas::new(config(3, true));
        for expected in 0..3 {
            let allocation = multi.allocate(64, 64).unwrap();
            assert_eq!(allocation.slice, SliceIndex::new(expected));
        }
        assert_eq!(multi.slice_count(), 3);
        assert_eq!(
            multi.allocate(64, 64),
            Err(AtlasError::SliceLimitReached(3))
        );
    }

    #[test]
    fn full_without_growth_is_out_of_space() {
        let mut multi = MultiAtlas::new(config(4, false));
        multi.allocate(64, 64).unwrap();
        assert_eq!(multi.allocate(1, 1), Err(AtlasError::OutOfSpace));
        // Explicit growth is still available.
        multi.create_slice().unwrap();
        assert!(multi.allocate(1, 1).is_ok());
    }

    #[test]
    fn oversized_requests_are_rejected_up_front() {
        let mut multi = MultiAtlas::new(config(8, true));
        assert_eq!(
            multi.allocate(65, 10),
            Err(AtlasError::RegionTooLarge {
                width: 65,
                height: 10
            })
        );
        assert_eq!(multi.allocate(0, 10), Err(AtlasError::EmptyRequest));
        // Nothing was created for the failed requests.
        assert_eq!(multi.slice_count(), 1);
    }

    #[test]
    fn free_routes_to_the_owning_slice() {
        let mut multi = MultiAtlas::new(config(2, true));
        let a = multi.allocate(64, 64).unwrap();
        let b = multi.allocate(16, 16).unwrap();
        assert_eq!(b.slice, SliceIndex::new(1));

        multi.free(a);
        multi.free(b);
        assert!(multi.is_empty());

        // A freed slice is reused rather than hitting the limit.
        let c = multi.allocate(64, 64).unwrap();
        assert_eq!(c.slice, SliceIndex::new(0));
        multi.free(c);
    }

    #[test]
    fn free_with_unknown_slice_does_not_panic() {
        let mut multi = MultiAtlas::new(config(2, true));
        multi.free(SlicedRegion {
            slice: SliceIndex::new(7),
            region: Region::new(0, 0, 8, 8),
        });
        assert!(multi.is_empty());
    }

    #[test]
    fn stats_track_usage() {
        let mut multi = MultiAtlas::new(config(2, true));
        let stats = multi.stats(SliceIndex::new(0)).unwrap();
        assert_eq!(stats.allocated_count, 0);
        assert_eq!(stats.usage(), 0.0);

        let a = multi.allocate(32, 64).unwrap();
        let stats = multi.stats(SliceIndex::new(0)).unwrap();
        assert_eq!(stats.total_area, 64 * 64);
        assert_eq!(stats.allocated_area, 32 * 64);
        assert_eq!(stats.allocated_count, 1);
        assert_eq!(stats.usage(), 0.5);

        assert!(multi.stats(SliceIndex::new(9)).is_none());
        multi.free(a);
    }
}
