// Copyright 2026 the Tatami Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A dynamic 2D texture atlas allocator.
//!
//! `tatami` subdivides a fixed rectangular area into non-overlapping,
//! axis-aligned regions on demand and reclaims their space on release,
//! coalescing freed regions so later allocations can reuse them. The
//! subdivision is kept in a hierarchical partition tree whose free leaves
//! are indexed by two orderings (width-led and height-led), giving best-fit
//! lookup by smallest containing area and bottom-up merging on free.
//!
//! The entry points are [`AtlasManager`] for a single atlas and
//! [`MultiAtlas`] for spreading allocations across several equally sized
//! slices, e.g. the layers of a texture array.
//!
//! # Features
//!
//! - `std` (enabled by default): `std`-only conveniences such as the SVG
//!   dump of the current partition.
//! - `checks`: run the full consistency checker after every mutation.
//!   Expensive; intended for tests and for debugging the allocator itself.
// LINEBENDER LINT SET - lib.rs - v3
// See https://linebender.org/wiki/canonical-lints/
// These lints shouldn't apply to examples or tests.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
// These lints shouldn't apply to examples.
#![warn(clippy::print_stdout, clippy::print_stderr)]
// Targeting e.g. 32-bit means structs containing usize can give false positives for 64-bit.
#![cfg_attr(target_pointer_width = "64", warn(clippy::trivially_copy_pass_by_ref))]
// END LINEBENDER LINT SET
#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]
#![no_std]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

mod free_index;
mod manager;
mod multi_atlas;
mod region;
mod tree;

#[cfg(feature = "std")]
pub use manager::{dump_into_svg, dump_svg};
pub use manager::AtlasManager;
pub use multi_atlas::{
    AtlasError, MultiAtlas, MultiAtlasConfig, SliceIndex, SliceStats, SlicedRegion,
};
pub use region::Region;
