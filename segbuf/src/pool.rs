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

//! The pool: dispatches `get_buffer`/`release_buffer` across an ordered
//! sequence of [`Group`]s, and owns the generation policy that decides how
//! large the next group should be.

use std::sync::{Mutex, RwLock};
use log::debug;
use crate::backing_store::StoreKind;
use crate::buffer::{Placement, SegmentBuffer};
use crate::error::{Error, Result};
use crate::group::Group;
use crate::SEGMENT_SIZE;

/// Which backing-store flavor a [`Pool`]'s groups use. A process typically
/// keeps one `Pool` per flavor, for the lifetime of the process.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PoolKind {
	Managed,
	Native,
}

impl From<PoolKind> for StoreKind {
	fn from(kind: PoolKind) -> Self {
		match kind {
			PoolKind::Managed => StoreKind::Managed,
			PoolKind::Native => StoreKind::Native,
		}
	}
}

/// The initial per-group segment count, used by generation 0.
pub const INITIAL_SEGMENTS_PER_GROUP: u32 = 16;
/// Hard cap on how large a single group's segment count can grow across
/// generations, regardless of how many generations are opened.
pub const MAX_ALLOWED_GROUP_SEGMENT_COUNT: u32 = 1024;
/// How many groups share a generation's segment count before the next,
/// larger generation is opened.
const GROUPS_PER_GENERATION: usize = 4;

/// Sizing policy: generation `g`'s groups each hold
/// `min(INITIAL_SEGMENTS_PER_GROUP << g, MAX_ALLOWED_GROUP_SEGMENT_COUNT)`
/// segments, and a generation holds `GROUPS_PER_GENERATION` groups before
/// the next one opens.
struct GenerationArray {
	/// One entry per opened generation: `(group_segment_count, groups_created_in_generation)`.
	generations: Vec<(u32, usize)>,
}

impl GenerationArray {
	fn new() -> Self {
		Self { generations: vec![(INITIAL_SEGMENTS_PER_GROUP, 0)] }
	}

	/// Segment count for the next group to be created, advancing to a new
	/// generation first if the current one is full.
	fn next_group_segment_count(&mut self) -> u32 {
		let (count, created) = self.generations.last_mut().unwrap();
		if *created >= GROUPS_PER_GENERATION {
			let next_count = (*count << 1).min(MAX_ALLOWED_GROUP_SEGMENT_COUNT);
			self.generations.push((next_count, 0));
			let (count, created) = self.generations.last_mut().unwrap();
			*created += 1;
			*count
		} else {
			*created += 1;
			*count
		}
	}
}

/// Coordinates an ordered sequence of [`Group`]s, creating new ones on
/// demand per the generation policy. A process-wide singleton per
/// `PoolKind` in the stream facade this allocator backs; here it's a
/// plain, independently constructible value so callers control its
/// lifetime and sharing directly.
pub struct Pool {
	kind: PoolKind,
	// Append-only once a group is pushed: reads (group dispatch) take a
	// shared lock, and only new-group creation takes the exclusive lock,
	// matching the "pool-level lock only for group-list mutation" design.
	groups: RwLock<Vec<Group>>,
	generations: Mutex<GenerationArray>,
	next_block_id: Mutex<u64>,
}

impl Pool {
	pub fn new(kind: PoolKind) -> Self {
		Self {
			kind,
			groups: RwLock::new(Vec::new()),
			generations: Mutex::new(GenerationArray::new()),
			next_block_id: Mutex::new(0),
		}
	}

	pub fn kind(&self) -> PoolKind { self.kind }

	/// Number of groups created so far.
	pub fn group_count(&self) -> usize {
		self.groups.read().unwrap().len()
	}

	/// Total segments currently in use across every group.
	pub fn segments_in_use(&self) -> u32 {
		self.groups.read().unwrap().iter().map(Group::segments_in_use).sum()
	}

	fn create_group(&self) -> Result<()> {
		let segment_count = self.generations.lock().unwrap().next_group_segment_count();
		let mut next_id = self.next_block_id.lock().unwrap();
		let block_id = *next_id;
		let group = Group::new(self.kind.into(), block_id, segment_count, SEGMENT_SIZE)?;
		debug!("pool: created group {block_id} with {segment_count} segments");

		// Hold next_block_id until the group is pushed, so block_id always
		// equals the group's index and a concurrent creator can't also
		// claim it.
		self.groups.write().unwrap().push(group);
		*next_id += 1;
		Ok(())
	}

	/// Walks existing groups in creation order, returning the first
	/// `Available` result. Creates a new group (per the generation policy)
	/// and retries if every existing group is full. Returns
	/// `Err(Error::InvalidArgument)` for a zero-size request without
	/// touching any group.
	pub fn get_buffer(&self, size: usize, require_zeroed: bool, preferred: Option<(u64, u32)>) -> Result<SegmentBuffer> {
		if size == 0 {
			return Err(Error::InvalidArgument);
		}
		loop {
			{
				let groups = self.groups.read().unwrap();
				for group in groups.iter() {
					let preferred_here = preferred.and_then(|(block_id, segment)| {
						(block_id == group.block_id()).then_some(segment)
					});
					let outcome = group.get_buffer(size, require_zeroed, preferred_here);
					if let Placement::Available = outcome.placement {
						return Ok(outcome.buffer.expect("Available implies a buffer"));
					}
				}
			}
			self.create_group()?;
		}
	}

	/// Routes to the owning group via `block_id`, which is also the
	/// group's index — an O(1) lookup, no map required.
	pub fn release_buffer(&self, handle: SegmentBuffer, zero_on_release: bool) {
		let block_id = handle.buffer_info().block_id;
		let groups = self.groups.read().unwrap();
		let group = groups.get(block_id as usize).expect("release_buffer: unknown block_id (WrongOwner)");
		group.release_buffer(handle, zero_on_release);
	}
}
