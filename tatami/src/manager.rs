// Copyright 2026 the Tatami Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The atlas manager: best-fit allocation and merge-on-free over a
//! partition tree.

use hashbrown::HashMap;
use log::error;

use crate::free_index::FreeRegionIndex;
use crate::region::Region;
use crate::tree::{NodeIndex, NodeKind, PartitionTree};

/// A dynamic 2D rectangle allocator over a fixed-size atlas.
///
/// The atlas is subdivided by a hierarchical partition: every node of the
/// tree covers a rectangle, the root covers the whole atlas, and the
/// children of a split node tile their parent exactly. Leaves are either
/// free or allocated, free leaves are indexed by two orderings (width-led
/// and height-led) for best-fit lookup, and freeing a region merges sibling
/// groups of free leaves bottom-up so the free set stays maximal with
/// respect to the split history.
///
/// The structure is strictly single-threaded; wrap it in a lock if it must
/// be shared.
///
/// # Example
///
/// ```
/// use tatami::AtlasManager;
///
/// let mut atlas = AtlasManager::new(256, 256);
/// let region = atlas.allocate(64, 32).unwrap();
/// assert_eq!((region.width, region.height), (64, 32));
/// atlas.free(region);
/// ```
pub struct AtlasManager {
    tree: PartitionTree,
    free: FreeRegionIndex,
    allocated: HashMap<Region, NodeIndex>,
    width: u32,
    height: u32,
}

impl AtlasManager {
    /// Create a manager for a `width x height` atlas, initially one free
    /// region covering everything.
    ///
    /// A zero dimension is accepted but makes the manager permanently
    /// unable to satisfy any allocation.
    pub fn new(width: u32, height: u32) -> Self {
        let bounds = Region::new(0, 0, width, height);
        let mut manager = Self {
            tree: PartitionTree::new(bounds),
            free: FreeRegionIndex::new(),
            allocated: HashMap::new(),
            width,
            height,
        };
        // An empty root stays out of the indices, so every request fails
        // cleanly on a zero-sized atlas.
        if !bounds.is_empty() {
            let root = manager.tree.root();
            manager.register_node(root);
        }
        manager
    }

    /// The atlas width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// The atlas height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whether nothing is currently allocated.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.allocated.is_empty()
    }

    /// Number of free regions.
    pub fn free_region_count(&self) -> usize {
        self.free.len()
    }

    /// Number of allocated regions.
    pub fn allocated_region_count(&self) -> usize {
        self.allocated.len()
    }

    /// Total area currently allocated, in pixels.
    pub fn allocated_area(&self) -> u64 {
        self.allocated.keys().map(Region::area).sum()
    }

    /// Allocate a `width x height` region.
    ///
    /// The candidate free region is the admissible one with the smallest
    /// area; the chosen leaf is carved up so the placed rectangle sits in
    /// its lower-left corner and the remainder stays free. Returns `None`
    /// when no free region is large enough (not an error; callers typically
    /// evict or grow at a higher level). A request with a zero dimension is
    /// a caller bug and also returns `None`.
    pub fn allocate(&mut self, width: u32, height: u32) -> Option<Region> {
        if width == 0 || height == 0 {
            error!("allocation request {width}x{height} has a zero dimension");
            return None;
        }

        let source = self.free.best_fit(width, height)?;
        self.unregister_node(source);

        let r = self.tree.node(source).region;
        let placed = Region::new(r.x, r.y, width, height);

        match (r.width > width, r.height > height) {
            (false, false) => {
                // Exact fit; the leaf itself becomes the allocation.
                self.tree.node_mut(source).kind = NodeKind::Allocated;
                self.register_node(source);
            }
            (true, false) => {
                //   _______ __________
                //  |       |          |
                //  |placed |    A     |
                //  |_______|__________|
                //
                self.split_and_place(
                    source,
                    &[
                        placed,
                        Region::new(r.x + width, r.y, r.width - width, r.height),
                    ],
                );
            }
            (false, true) => {
                //    _______
                //   |       |
                //   |   A   |
                //   |_______|
                //   |placed |
                //   |_______|
                //
                self.split_and_place(
                    source,
                    &[
                        placed,
                        Region::new(r.x, r.y + height, r.width, r.height - height),
                    ],
                );
            }
            (true, true) if r.width > r.height => {
                //    _____________________
                //   |       |             |
                //   |   B   |             |
                //   |_______|      A      |
                //   |       |             |
                //   |placed |             |
                //   |_______|_____________|
                //
                self.split_and_place(
                    source,
                    &[
                        placed,
                        Region::new(r.x + width, r.y, r.width - width, r.height),
                        Region::new(r.x, r.y + height, width, r.height - height),
                    ],
                );
            }
            (true, true) => {
                //   _____________
                //  |             |
                //  |      A      |
                //  |_____ _______|
                //  |     |       |
                //  |plcd |   B   |
                //  |_____|_______|
                //
                self.split_and_place(
                    source,
                    &[
                        placed,
                        Region::new(r.x, r.y + height, r.width, r.height - height),
                        Region::new(r.x + width, r.y, r.width - width, height),
                    ],
                );
            }
        }

        #[cfg(any(test, feature = "checks"))]
        self.verify_consistency();

        Some(placed)
    }

    /// Return a region obtained from [`allocate`](Self::allocate).
    ///
    /// Consumes the region: the caller's handle is gone after the call.
    /// After the owning leaf is released, every ancestor whose children are
    /// all free leaves is merged back into a single free region, so a
    /// fully freed atlas is indistinguishable from a fresh one.
    ///
    /// Freeing a region that is not currently allocated is a caller bug; it
    /// is reported and the state is left untouched.
    pub fn free(&mut self, region: Region) {
        let Some(&leaf) = self.allocated.get(&region) else {
            error!("region {region} is not allocated in this atlas");
            return;
        };
        debug_assert_eq!(self.tree.node(leaf).region, region);

        self.unregister_node(leaf);
        self.tree.node_mut(leaf).kind = NodeKind::Free;
        self.register_node(leaf);

        // Walk toward the root, collapsing every all-free sibling group.
        // The walk continues past the first merge: the merged node may in
        // turn complete its own parent's group.
        let mut ancestor = self.tree.node(leaf).parent;
        while ancestor.is_some() && self.tree.can_merge_children(ancestor) {
            let (children, count) = self.tree.node(ancestor).children_array();
            for &child in &children[..count] {
                self.unregister_node(child);
            }
            self.tree.merge_children(ancestor);
            self.register_node(ancestor);

            ancestor = self.tree.node(ancestor).parent;
        }

        #[cfg(any(test, feature = "checks"))]
        self.verify_consistency();
    }

    /// Drop every allocation, returning to the freshly constructed state.
    pub fn clear(&mut self) {
        self.tree.reset();
        self.free.clear();
        self.allocated.clear();
        if self.width > 0 && self.height > 0 {
            let root = self.tree.root();
            self.register_node(root);
        }

        #[cfg(any(test, feature = "checks"))]
        self.verify_consistency();
    }

    /// Invoke a callback for each free region, in by-width order.
    ///
    /// The callback must not re-enter the manager.
    pub fn for_each_free_region<F>(&self, mut callback: F)
    where
        F: FnMut(&Region),
    {
        for (region, _) in self.free.iter() {
            callback(&region);
        }
    }

    /// Invoke a callback for each allocated region, in no particular order.
    ///
    /// The callback must not re-enter the manager.
    pub fn for_each_allocated_region<F>(&self, mut callback: F)
    where
        F: FnMut(&Region),
    {
        for region in self.allocated.keys() {
            callback(region);
        }
    }

    /// Split a free leaf and mark the first child (the placed rectangle) as
    /// allocated, then index all of the children.
    fn split_and_place(&mut self, source: NodeIndex, regions: &[Region]) {
        self.tree.split(source, regions);
        let (children, count) = self.tree.node(source).children_array();
        self.tree.node_mut(children[0]).kind = NodeKind::Allocated;
        for &child in &children[..count] {
            self.register_node(child);
        }
    }

    /// Place a leaf in the index matching its state.
    ///
    /// Together with [`unregister_node`](Self::unregister_node) this is the
    /// only place the three maps are mutated. Internal nodes are never
    /// registered.
    fn register_node(&mut self, idx: NodeIndex) {
        let node = self.tree.node(idx);
        debug_assert!(node.is_leaf(), "internal nodes are never indexed");
        debug_assert!(!node.region.is_empty(), "empty regions are never indexed");
        match node.kind {
            NodeKind::Allocated => {
                let region = node.region;
                let prev = self.allocated.insert(region, idx);
                debug_assert!(prev.is_none(), "allocated region registered twice");
            }
            NodeKind::Free => {
                let region = node.region;
                self.free.insert(region, idx);
            }
            NodeKind::Internal | NodeKind::Vacant => {
                debug_assert!(false, "only leaves are registered");
            }
        }
    }

    /// Exact inverse of [`register_node`](Self::register_node).
    fn unregister_node(&mut self, idx: NodeIndex) {
        let node = self.tree.node(idx);
        debug_assert!(node.is_leaf(), "internal nodes are never indexed");
        match node.kind {
            NodeKind::Allocated => {
                let region = node.region;
                let prev = self.allocated.remove(&region);
                debug_assert_eq!(prev, Some(idx), "allocated region was not registered");
            }
            NodeKind::Free => {
                let region = node.region;
                self.free.remove(region);
            }
            NodeKind::Internal | NodeKind::Vacant => {
                debug_assert!(false, "only leaves are registered");
            }
        }
    }
}

impl core::fmt::Debug for AtlasManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AtlasManager")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("free_regions", &self.free.len())
            .field("allocated_regions", &self.allocated.len())
            .finish_non_exhaustive()
    }
}

impl Drop for AtlasManager {
    /// Dropping the manager while regions remain allocated is a caller bug;
    /// it is reported, and the memory is released regardless.
    fn drop(&mut self) {
        if !self.allocated.is_empty() {
            error!(
                "atlas manager dropped with {} regions still allocated",
                self.allocated.len()
            );
            return;
        }
        // With nothing allocated the merge walk has restored the initial
        // state: a single free root leaf.
        let root = self.tree.node(self.tree.root());
        let expected_free = usize::from(!root.region.is_empty());
        if !root.is_leaf() || root.kind != NodeKind::Free || self.free.len() != expected_free {
            error!(
                "atlas manager dropped in a non-quiescent state ({} free regions)",
                self.free.len()
            );
        }
    }
}

#[cfg(any(test, feature = "checks"))]
impl AtlasManager {
    /// Walk the whole tree and assert every structural invariant: the
    /// children of each internal node tile its region without overlapping,
    /// each leaf is indexed according to its state, internal nodes are
    /// unindexed, and the leaves cover the atlas exactly.
    pub(crate) fn verify_consistency(&self) {
        let mut leaf_area = 0_u64;
        let mut free_leaves = 0_usize;
        let mut allocated_leaves = 0_usize;
        self.verify_node(
            self.tree.root(),
            &mut leaf_area,
            &mut free_leaves,
            &mut allocated_leaves,
        );
        assert_eq!(
            leaf_area,
            u64::from(self.width) * u64::from(self.height),
            "leaves do not cover the entire atlas"
        );
        assert_eq!(free_leaves, self.free.len(), "free index size mismatch");
        assert_eq!(
            allocated_leaves,
            self.allocated.len(),
            "allocated map size mismatch"
        );
    }

    fn verify_node(
        &self,
        idx: NodeIndex,
        leaf_area: &mut u64,
        free_leaves: &mut usize,
        allocated_leaves: &mut usize,
    ) {
        let node = self.tree.node(idx);
        let children = node.children();

        if children.is_empty() {
            match node.kind {
                NodeKind::Free => {
                    if node.region.is_empty() {
                        // Only the root of a zero-sized atlas may be empty.
                        assert_eq!(idx, self.tree.root(), "empty non-root leaf");
                    } else {
                        assert!(
                            self.free.contains(node.region),
                            "free leaf {} missing from the free indices",
                            node.region
                        );
                        assert!(
                            !self.allocated.contains_key(&node.region),
                            "free leaf {} present in the allocated map",
                            node.region
                        );
                        *free_leaves += 1;
                    }
                }
                NodeKind::Allocated => {
                    assert_eq!(
                        self.allocated.get(&node.region),
                        Some(&idx),
                        "allocated leaf {} missing from the allocated map",
                        node.region
                    );
                    assert!(
                        !self.free.contains(node.region),
                        "allocated leaf {} present in the free indices",
                        node.region
                    );
                    *allocated_leaves += 1;
                }
                NodeKind::Internal | NodeKind::Vacant => {
                    panic!("leaf node with kind {:?}", node.kind);
                }
            }
            *leaf_area += node.region.area();
            return;
        }

        assert_eq!(node.kind, NodeKind::Internal, "split node not internal");
        assert!(children.len() >= 2, "internal node with a single child");
        assert!(
            !self.free.contains(node.region) && !self.allocated.contains_key(&node.region),
            "internal node {} is indexed",
            node.region
        );

        let mut child_area = 0_u64;
        for (i, &child_idx) in children.iter().enumerate() {
            let child = self.tree.node(child_idx);
            assert_eq!(child.parent, idx, "stale parent back-reference");
            assert!(!child.region.is_empty(), "empty child region");
            assert!(
                node.region.contains(&child.region),
                "child {} lies outside parent {}",
                child.region,
                node.region
            );
            child_area += child.region.area();
            for &other_idx in &children[i + 1..] {
                let other = self.tree.node(other_idx);
                assert!(
                    !child.region.intersects(&other.region),
                    "children {} and {} overlap",
                    child.region,
                    other.region
                );
            }
        }
        assert_eq!(
            child_area,
            node.region.area(),
            "children do not cover parent {}",
            node.region
        );

        for &child_idx in children {
            self.verify_node(child_idx, leaf_area, free_leaves, allocated_leaves);
        }
    }
}

/// Dump a visual representation of the atlas in SVG format.
#[cfg(feature = "std")]
pub fn dump_svg(atlas: &AtlasManager, output: &mut dyn std::io::Write) -> std::io::Result<()> {
    use svg_fmt::*;

    writeln!(
        output,
        "{}",
        BeginSvg {
            w: atlas.width() as f32,
            h: atlas.height() as f32,
        }
    )?;
    dump_into_svg(atlas, output)?;
    writeln!(output, "{}", EndSvg)
}

/// Dump the atlas regions as SVG rectangles, without the document envelope,
/// so the output can be embedded in a larger document.
#[cfg(feature = "std")]
pub fn dump_into_svg(atlas: &AtlasManager, output: &mut dyn std::io::Write) -> std::io::Result<()> {
    use svg_fmt::*;

    let mut result = Ok(());
    let mut emit = |region: &Region, color: Color| {
        if result.is_err() {
            return;
        }
        result = writeln!(
            output,
            r#"    {}"#,
            rectangle(
                region.x as f32,
                region.y as f32,
                region.width as f32,
                region.height as f32,
            )
            .fill(color)
            .stroke(Stroke::Color(black(), 1.0))
        );
    };

    atlas.for_each_free_region(|region| emit(region, rgb(40, 40, 40)));
    atlas.for_each_allocated_region(|region| emit(region, rgb(90, 110, 190)));
    result
}
