// Copyright 2023 Strixpyrr
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! ## How it works
//!
//! Expandable byte streams built on top of this crate don't allocate one
//! large contiguous buffer and copy-and-grow it as they fill; that path
//! dominates allocator time and pressures the large-object heap. Instead,
//! they ask a [`Pool`] for fixed-size *segments*, recycled from *groups*
//! of segments carved out of a handful of large backing blocks, and
//! compose the segments they're handed into a logical stream.
//!
//! ### Groups
//!
//! A [`Group`] is one contiguous backing block plus two bitmaps: `used`
//! marks which segments are on loan, `zeroed` marks which free segments
//! are known to already be all-zero. `get_buffer` scans `used` for the
//! largest run of free segments (or honors a caller-supplied placement
//! hint if that segment happens to be free), zero-fills only the
//! segments that need it, and flips the bitmap in one step while holding
//! the group's lock. The returned [`SegmentBuffer`] handle is then safe
//! to read and write from any thread without further synchronization,
//! because the allocator never hands out two handles over the same
//! segment at once.
//!
//! ### Pools and generations
//!
//! A [`Pool`] holds an ordered list of groups and dispatches `get_buffer`
//! across them in creation order, creating a new group only once every
//! existing one reports itself full. New groups get larger as more
//! generations open — generation 0 starts at
//! [`INITIAL_SEGMENTS_PER_GROUP`] segments and roughly doubles each
//! generation, capped at [`MAX_ALLOWED_GROUP_SEGMENT_COUNT`] — so a
//! long-lived pool backing many small streams doesn't end up with
//! thousands of tiny groups to scan.
//!
//! What this crate does *not* do: compose segments into a `Read`/`Write`
//! stream, seek, track a logical length, or defragment/compact existing
//! allocations. Those are a calling facade's job; this crate's only
//! contract to it is `Pool::get_buffer`/`Pool::release_buffer` and the
//! `SegmentBuffer` handle they produce.

mod backing_store;
mod error;
mod flag_vec;
pub mod buffer;
pub mod group;
pub mod pool;

pub use backing_store::StoreKind;
pub use buffer::{BufferInfo, Placement, PlacementOutcome, SegmentBuffer};
pub use error::{Error, Result};
pub use group::Group;
pub use pool::{Pool, PoolKind, INITIAL_SEGMENTS_PER_GROUP, MAX_ALLOWED_GROUP_SEGMENT_COUNT};

/// Fixed size, in bytes, of every segment an allocator in this crate ever
/// hands out. Chosen to match a page-multiple working set without being
/// so large that small streams waste most of a segment.
pub const SEGMENT_SIZE: usize = 8192;
