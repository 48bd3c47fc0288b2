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

//! The segmented buffer group: one [`BackingStore`] plus a `used`/`zeroed`
//! bitmap pair, serialized on a group-local lock. This is the core of the
//! allocator; see the module-level docs in `lib.rs` for the placement and
//! zero-fill policy this implements.

use std::sync::{Arc, Mutex};
use log::trace;
use crate::backing_store::{BackingStore, StoreKind};
use crate::buffer::{BufferInfo, Placement, PlacementOutcome, SegmentBuffer};
use crate::error::Result;
use crate::flag_vec::FlagVec;

struct GroupState {
	store: BackingStore,
	used: FlagVec,
	zeroed: FlagVec,
	segments_in_use: u32,
}

struct GroupCore {
	block_id: u64,
	segment_count: u32,
	segment_size: usize,
	state: Mutex<GroupState>,
}

/// A cloneable, `Arc`-backed reference to one group's core state. This is
/// what a [`SegmentBuffer`] carries instead of borrowing a `Group`
/// directly, so handles outlive any particular stack frame holding the
/// `Group`/`Pool`.
#[derive(Clone)]
pub struct GroupHandle(Arc<GroupCore>);

impl GroupHandle {
	pub(crate) fn segment_size(&self) -> usize { self.0.segment_size }

	/// Computes a raw pointer + length for `info`'s segment run. Locks
	/// only long enough to read the backing store's base pointer, which
	/// never changes after construction — the lock is not held across the
	/// resulting borrow.
	pub(crate) fn span_ptr(&self, info: BufferInfo) -> (*mut u8, usize) {
		debug_assert_eq!(info.block_id, self.0.block_id, "segment buffer used with the wrong group");
		let offset = info.first_segment as usize * self.0.segment_size;
		let len = info.segment_count as usize * self.0.segment_size;
		let state = self.0.state.lock().unwrap();
		let base = state.store.base_ptr();
		// SAFETY: offset + len <= block size, checked when the run was
		// allocated; `base` is valid for the store's fixed lifetime.
		(unsafe { base.add(offset) }, len)
	}
}

/// One backing store sliced into `segment_count` fixed-size segments,
/// tracked by a `used`/`zeroed` bitmap pair. Created only by a [`Pool`]
/// (see [`crate::pool`]); never moved or destroyed while any handle
/// derived from it exists.
pub struct Group(GroupHandle);

impl Group {
	pub(crate) fn new(kind: StoreKind, block_id: u64, segment_count: u32, segment_size: usize) -> Result<Self> {
		let block_size = segment_count as usize * segment_size;
		let store = BackingStore::new(kind, block_size)?;
		let zeroed_initially = matches!(kind, StoreKind::Managed);

		let state = GroupState {
			store,
			used: FlagVec::new_clear(segment_count),
			zeroed: if zeroed_initially {
				FlagVec::new_set(segment_count)
			} else {
				FlagVec::new_clear(segment_count)
			},
			segments_in_use: 0,
		};

		Ok(Self(GroupHandle(Arc::new(GroupCore {
			block_id,
			segment_count,
			segment_size,
			state: Mutex::new(state),
		}))))
	}

	pub fn block_id(&self) -> u64 { self.0 .0.block_id }
	pub fn segment_count(&self) -> u32 { self.0 .0.segment_count }
	pub fn segment_size(&self) -> usize { self.0.segment_size() }

	pub fn segments_in_use(&self) -> u32 {
		self.0 .0.state.lock().unwrap().segments_in_use
	}

	/// Clones the `Arc`-backed handle `SegmentBuffer`s and the pool carry
	/// around; cheap (one atomic increment).
	pub(crate) fn handle(&self) -> GroupHandle { self.0.clone() }

	fn desired_segments(&self, size: usize) -> u32 {
		let n = size.div_ceil(self.segment_size()) as u32;
		n.min(self.segment_count())
	}

	/// See the crate's module docs for the full placement/zero-fill
	/// contract this implements (preferred-hint honoring, largest-run
	/// fallback, zero-fill-on-demand).
	pub fn get_buffer(&self, size: usize, require_zeroed: bool, preferred_first_segment: Option<u32>) -> PlacementOutcome {
		assert!(size > 0, "get_buffer size must be greater than zero");
		let desired = self.desired_segments(size);
		let core = &self.0 .0;
		let mut state = core.state.lock().unwrap();

		if state.segments_in_use == core.segment_count {
			trace!("group {} full, no segments available", core.block_id);
			return PlacementOutcome { buffer: None, placement: Placement::GroupFull, is_preferred: false };
		}

		let (start, count, is_preferred) = match preferred_first_segment {
			Some(p) if p < core.segment_count && !state.used.get(p) => {
				let run = state.used.clear_run_at(p);
				(p, run.min(desired), true)
			}
			_ => {
				let run = state.used
					.longest_clear_run(desired)
					.expect("segments_in_use < segment_count implies a clear run exists");
				(run.start, run.len.min(desired), false)
			}
		};

		trace!("group {}: selected run start={start} count={count} preferred={is_preferred}", core.block_id);

		for s in start..start + count {
			if require_zeroed && !state.zeroed.get(s) {
				let offset = s as usize * core.segment_size;
				state.store.zero(offset, core.segment_size);
			}
			if require_zeroed {
				state.zeroed.set(s, true);
			}
			state.used.set(s, true);
		}
		state.segments_in_use += count;

		let info = BufferInfo { block_id: core.block_id, first_segment: start, segment_count: count };
		PlacementOutcome {
			buffer: Some(SegmentBuffer::new(info, self.0.clone())),
			placement: Placement::Available,
			is_preferred,
		}
	}

	/// Releases `handle`'s segments back to the group. Panics (`WrongOwner`)
	/// if `handle` wasn't produced by this group, and panics
	/// (`DoubleRelease`) if any of its segments are already free — both
	/// are programmer errors, not recoverable runtime conditions.
	pub fn release_buffer(&self, handle: SegmentBuffer, zero_on_release: bool) {
		let info = handle.info;
		let core = &self.0 .0;
		assert_eq!(info.block_id, core.block_id, "release_buffer: handle belongs to a different group (WrongOwner)");

		let mut state = core.state.lock().unwrap();
		for s in info.first_segment..info.first_segment + info.segment_count {
			assert!(state.used.get(s), "release_buffer: segment {s} already free (DoubleRelease)");
			if zero_on_release {
				let offset = s as usize * core.segment_size;
				state.store.zero(offset, core.segment_size);
				state.zeroed.set(s, true);
			} else {
				state.zeroed.set(s, false);
			}
			state.used.set(s, false);
		}
		state.segments_in_use -= info.segment_count;
		trace!(
			"group {}: released run start={} count={}",
			core.block_id, info.first_segment, info.segment_count
		);
	}
}

#[cfg(any(test, feature = "test-util"))]
impl Group {
	/// Constructs a standalone `Group`, bypassing `Pool`. Real callers
	/// never do this (spec: groups are created only by a pool); exists so
	/// `tests/group.rs` and `benches/group.rs` can exercise the placement
	/// algorithm directly without a `Pool` in the loop.
	pub fn new_standalone(kind: StoreKind, block_id: u64, segment_count: u32, segment_size: usize) -> Result<Self> {
		Self::new(kind, block_id, segment_count, segment_size)
	}

	/// Marks `[start, start + count)` as used, without zero-fill or bitmap
	/// bookkeeping beyond the `used` bit itself. Test-only; replaces the
	/// source's reflection-based bitmap pokes with a controlled mutator.
	pub fn set_segments_used(&self, start: u32, count: u32) {
		let core = &self.0 .0;
		let mut state = core.state.lock().unwrap();
		let was_used = (start..start + count).filter(|&s| state.used.get(s)).count() as u32;
		state.used.set_range(start, count, true);
        state.segments_in_use += count - was_used;
	}

	/// Marks `[start, start + count)` as free. `zeroed` controls whether
	/// the released segments are also marked clean, without touching the
	/// backing bytes (so tests can construct `Free-Clean` states in Native
	/// stores without paying for a real zero-fill).
	pub fn set_segments_free(&self, start: u32, count: u32, zeroed: bool) {
		let core = &self.0 .0;
		let mut state = core.state.lock().unwrap();
		let was_used = (start..start + count).filter(|&s| state.used.get(s)).count() as u32;
		state.used.set_range(start, count, false);
		state.zeroed.set_range(start, count, zeroed);
		state.segments_in_use -= was_used;
	}

	/// Rebuilds a handle for a previously-returned [`BufferInfo`]. Real
	/// callers never need this (the original `SegmentBuffer` carries its
	/// own group reference); it exists so tests can exercise
	/// `release_buffer`'s fatal paths without fighting move semantics.
	pub fn reconstruct_buffer(&self, info: BufferInfo) -> SegmentBuffer {
		SegmentBuffer::new(info, self.handle())
	}

	/// Replaces the `used` and `zeroed` bitmaps wholesale (as raw 64-bit
	/// words), for scenarios that need an exact, hand-specified pattern.
	pub fn replace_flags(&self, used_words: Vec<u64>, zeroed_words: Vec<u64>) {
		let core = &self.0 .0;
		let mut state = core.state.lock().unwrap();
		state.used.replace_words(used_words);
		state.zeroed.replace_words(zeroed_words);
		state.segments_in_use = state.used.count_ones();
	}
}
