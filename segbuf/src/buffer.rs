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

//! The consumer-facing handle produced by [`Group::get_buffer`](crate::group::Group::get_buffer)
//! and [`Pool::get_buffer`](crate::pool::Pool::get_buffer).

use std::slice;
use crate::group::GroupHandle;

/// Identifies a contiguous run of segments within one group.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BufferInfo {
	pub block_id: u64,
	pub first_segment: u32,
	pub segment_count: u32,
}

/// Whether a [`Group`](crate::group::Group)'s placement scan was
/// satisfiable at all.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Placement {
	/// A run was found; the accompanying handle may still be shorter than
	/// requested if the group couldn't fit the full size.
	Available,
	/// Every segment in the group is in use; no handle was produced.
	GroupFull,
}

/// The outcome of a single [`Group::get_buffer`](crate::group::Group::get_buffer) call.
pub struct PlacementOutcome {
	pub buffer: Option<SegmentBuffer>,
	pub placement: Placement,
	/// `true` only when the caller's preferred segment was free and used
	/// as the placement start.
	pub is_preferred: bool,
}

/// A flat, byte-addressable view over a contiguous run of segments owned
/// by a single [`Group`](crate::group::Group). Obtained from `get_buffer`,
/// released exactly once via `release_buffer`; dropping it without
/// releasing leaks the segments (the group never reclaims them) but is
/// not undefined behavior.
pub struct SegmentBuffer {
	pub(crate) info: BufferInfo,
	pub(crate) group: GroupHandle,
}

impl SegmentBuffer {
	pub(crate) fn new(info: BufferInfo, group: GroupHandle) -> Self {
		Self { info, group }
	}

	pub fn len(&self) -> usize {
		self.info.segment_count as usize * self.group.segment_size()
	}

	pub fn is_empty(&self) -> bool { self.len() == 0 }

	pub fn segment_count(&self) -> u32 { self.info.segment_count }

	pub fn buffer_info(&self) -> BufferInfo { self.info }

	/// Direct, immutable access to the run's bytes.
	pub fn as_span(&self) -> &[u8] {
		let (ptr, len) = self.group.span_ptr(self.info);
		// SAFETY: the allocator guarantees no other live handle overlaps
		// this segment run, and `self.group` (an `Arc`) keeps the backing
		// store alive for at least as long as this borrow.
		unsafe { slice::from_raw_parts(ptr, len) }
	}

	/// Direct, mutable access to the run's bytes. Exclusive by
	/// construction: only one `SegmentBuffer` exists per handle, and this
	/// method requires `&mut self`.
	pub fn as_mut_span(&mut self) -> &mut [u8] {
		let (ptr, len) = self.group.span_ptr(self.info);
		// SAFETY: see `as_span`; `&mut self` rules out concurrent access
		// to this handle specifically, and the allocator guarantees no
		// other handle aliases this range.
		unsafe { slice::from_raw_parts_mut(ptr, len) }
	}

	/// Bounds-checked copy out of the run starting at `offset`. Returns
	/// the number of bytes copied.
	pub fn read(&self, offset: usize, dst: &mut [u8]) -> usize {
		let src = &self.as_span()[offset..];
		let n = src.len().min(dst.len());
		dst[..n].copy_from_slice(&src[..n]);
		n
	}

	/// Bounds-checked copy into the run starting at `offset`. Returns the
	/// number of bytes copied.
	pub fn write(&mut self, offset: usize, src: &[u8]) -> usize {
		let dst = &mut self.as_mut_span()[offset..];
		let n = dst.len().min(src.len());
		dst[..n].copy_from_slice(&src[..n]);
		n
	}

	/// `O(len)` scan for whether every byte in the run is `0x00`.
	pub fn is_all_zeroes(&self) -> bool {
		self.as_span().iter().all(|&b| b == 0)
	}
}
