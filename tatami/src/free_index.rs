// Copyright 2026 the Tatami Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Ordered lookup of free regions.
//!
//! Two orderings of the same key set are maintained, one led by width and one
//! by height, so that a request can probe for the tightest fit along either
//! dimension. The remaining fields make every key unique: the partition is
//! disjoint, so no two free leaves share an `(x, y, width, height)` tuple.

use alloc::collections::BTreeMap;

use crate::region::Region;
use crate::tree::NodeIndex;

/// Key for the by-width ordering: `(width, height, x, y)` lexicographic.
///
/// The derived `Ord` relies on the field order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct WidthKey {
    width: u32,
    height: u32,
    x: u32,
    y: u32,
}

impl WidthKey {
    fn new(r: Region) -> Self {
        Self {
            width: r.width,
            height: r.height,
            x: r.x,
            y: r.y,
        }
    }

    fn region(self) -> Region {
        Region::new(self.x, self.y, self.width, self.height)
    }
}

/// Key for the by-height ordering: `(height, width, x, y)` lexicographic.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct HeightKey {
    height: u32,
    width: u32,
    x: u32,
    y: u32,
}

impl HeightKey {
    fn new(r: Region) -> Self {
        Self {
            height: r.height,
            width: r.width,
            x: r.x,
            y: r.y,
        }
    }
}

/// The set of free leaves, indexed by both orderings in lockstep.
///
/// Both maps always hold exactly the same `(region, node)` pairs; keeping
/// them behind one type makes that a structural invariant.
#[derive(Clone, Debug, Default)]
pub(crate) struct FreeRegionIndex {
    by_width: BTreeMap<WidthKey, NodeIndex>,
    by_height: BTreeMap<HeightKey, NodeIndex>,
}

impl FreeRegionIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        debug_assert_eq!(self.by_width.len(), self.by_height.len());
        self.by_width.len()
    }

    pub(crate) fn insert(&mut self, region: Region, node: NodeIndex) {
        let prev_w = self.by_width.insert(WidthKey::new(region), node);
        let prev_h = self.by_height.insert(HeightKey::new(region), node);
        debug_assert!(
            prev_w.is_none() && prev_h.is_none(),
            "free region {region} registered twice"
        );
    }

    pub(crate) fn remove(&mut self, region: Region) {
        let node_w = self.by_width.remove(&WidthKey::new(region));
        let node_h = self.by_height.remove(&HeightKey::new(region));
        debug_assert!(
            node_w.is_some() && node_w == node_h,
            "free region {region} was not registered"
        );
    }

    #[cfg(any(test, feature = "checks"))]
    pub(crate) fn contains(&self, region: Region) -> bool {
        let in_w = self.by_width.contains_key(&WidthKey::new(region));
        let in_h = self.by_height.contains_key(&HeightKey::new(region));
        debug_assert_eq!(in_w, in_h, "index orderings disagree on {region}");
        in_w
    }

    pub(crate) fn clear(&mut self) {
        self.by_width.clear();
        self.by_height.clear();
    }

    /// Visit every free region in by-width order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (Region, NodeIndex)> + '_ {
        self.by_width.iter().map(|(k, &node)| (k.region(), node))
    }

    /// Find the free leaf that fits `width x height` with the least waste.
    ///
    /// Each ordering is probed from the lower bound of its leading dimension,
    /// advancing while the trailing dimension is too small; of the two
    /// candidates the one with the smaller area wins, the by-width candidate
    /// taking exact ties so the choice is deterministic.
    pub(crate) fn best_fit(&self, width: u32, height: u32) -> Option<NodeIndex> {
        let lower_w = WidthKey {
            width,
            height: 0,
            x: 0,
            y: 0,
        };
        let candidate_w = self
            .by_width
            .range(lower_w..)
            .find(|(key, _)| key.height >= height);

        let lower_h = HeightKey {
            height,
            width: 0,
            x: 0,
            y: 0,
        };
        let candidate_h = self
            .by_height
            .range(lower_h..)
            .find(|(key, _)| key.width >= width);

        match (candidate_w, candidate_h) {
            (Some((key_w, &node_w)), Some((key_h, &node_h))) => {
                let area_w = u64::from(key_w.width) * u64::from(key_w.height);
                let area_h = u64::from(key_h.width) * u64::from(key_h.height);
                Some(if area_w <= area_h { node_w } else { node_h })
            }
            (Some((_, &node)), None) | (None, Some((_, &node))) => Some(node),
            (None, None) => None,
        }
    }
}
