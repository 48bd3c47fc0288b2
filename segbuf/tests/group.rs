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

#[macro_use]
mod common;

use pretty_assertions::assert_eq;
use quickcheck::TestResult;
use quickcheck_macros::quickcheck;
use segbuf::{Group, Placement, PoolKind, SEGMENT_SIZE};
use segbuf::buffer::SegmentBuffer;

const N: usize = SEGMENT_SIZE;

fn fresh_group(segments: u32) -> Group {
	Group::new_standalone(PoolKind::Managed.into(), 0, segments, SEGMENT_SIZE).unwrap()
}

fn native_group(segments: u32) -> Group {
	Group::new_standalone(PoolKind::Native.into(), 0, segments, SEGMENT_SIZE).unwrap()
}

/// Sequential allocation fills a fresh group left-to-right, then reports
/// full.
#[test]
fn sequential_allocation_fills_left_to_right() {
	let group = fresh_group(16);

	let h1 = group.get_buffer(4 * N, false, None).buffer.unwrap();
	assert_eq!(h1.buffer_info().first_segment, 0);
	assert_eq!(h1.buffer_info().segment_count, 4);

	let h2 = group.get_buffer(3 * N, false, None).buffer.unwrap();
	assert_eq!(h2.buffer_info().first_segment, 4);
	assert_eq!(h2.buffer_info().segment_count, 3);

	let h3 = group.get_buffer(9 * N, false, None).buffer.unwrap();
	assert_eq!(h3.buffer_info().first_segment, 7);
	assert_eq!(h3.buffer_info().segment_count, 9);

	let outcome = group.get_buffer(N, false, None);
	assert_eq!(outcome.placement, Placement::GroupFull);
	assert!(outcome.buffer.is_none());
}

/// With every even segment used, a zeroed request lands on the first odd
/// (free) segment and the allocated bytes are all zero; repeated
/// allocations walk the remaining odd segments in order.
#[test]
fn alternating_used_pattern_fills_odd_segments_in_order() {
	let group = fresh_group(16);
	group.set_segments_used(0, 1);
	for s in (2..16).step_by(2) {
		group.set_segments_used(s, 1);
	}

	let mut firsts = Vec::new();
	for _ in 0..8 {
		let outcome = group.get_buffer(N, true, None);
		assert_eq!(outcome.placement, Placement::Available);
		let h = outcome.buffer.unwrap();
		assert!(h.is_all_zeroes());
		firsts.push(h.buffer_info().first_segment);
	}
	assert_eq!(firsts, vec![1, 3, 5, 7, 9, 11, 13, 15]);
}

/// A group with holes near the start satisfies an oversized request with
/// the largest available run, truncated to what's actually free.
#[test]
fn oversized_request_gets_largest_run_truncated() {
	let group = fresh_group(16);
	// 5 free, 2 used, 1 free, 1 used, rest (7) free; the trailing run is
	// the longest one.
	group.set_segments_used(5, 2);
	group.set_segments_used(8, 1);

	let outcome = group.get_buffer(20 * N, true, None);
	let h = outcome.buffer.unwrap();
	assert_eq!(h.buffer_info().first_segment, 9);
	assert_eq!(h.buffer_info().segment_count, 7);
}

/// Zero-fill only happens for dirty segments; a segment released clean is
/// reused without another zero-fill, and a segment released dirty forces
/// one.
#[test]
fn zero_fill_only_happens_for_dirty_segments() {
	let group = native_group(8);
	let mut h = group.get_buffer(2 * N, false, None).buffer.unwrap();
	h.as_mut_span().fill(0xAB);
	group.release_buffer(h, false);

	let h2 = group.get_buffer(2 * N, true, None).buffer.unwrap();
	assert!(h2.is_all_zeroes(), "require_zeroed must zero a dirty segment");
	assert_eq!(h2.buffer_info().first_segment, 0);

	group.release_buffer(h2, true);
	let h3 = group.get_buffer(2 * N, true, None).buffer.unwrap();
	assert!(h3.is_all_zeroes());
}

/// A preferred segment that's free is honored exactly, truncated to the
/// free run starting there; an in-use preferred segment falls back to the
/// ordinary scan and reports `is_preferred = false`.
#[test]
fn preferred_segment_honored_when_free() {
	let group = fresh_group(16);
	for s in (0..16).step_by(2) {
		group.set_segments_used(s, 1);
	}

	let outcome = group.get_buffer(N, true, Some(5));
	let h = outcome.buffer.unwrap();
	assert_eq!(h.buffer_info().first_segment, 5);
	assert!(outcome.is_preferred);

	let outcome2 = group.get_buffer(N, true, Some(2));
	assert!(!outcome2.is_preferred);
	let h2 = outcome2.buffer.unwrap();
	assert_ne!(h2.buffer_info().first_segment, 2);
}

/// Invariant: segments_in_use always equals the popcount of `used`,
/// observable indirectly via a full round trip back to zero in use.
#[quickcheck]
fn round_trip_returns_to_zero_in_use(sizes: Vec<u8>) -> TestResult {
	if sizes.is_empty() || sizes.len() > 64 {
		return TestResult::discard();
	}
	let group = fresh_group(64);
	let mut handles: Vec<SegmentBuffer> = Vec::new();
	for &size in &sizes {
		if size == 0 { continue; }
		let outcome = group.get_buffer(size as usize, false, None);
		if let Some(h) = outcome.buffer {
			handles.push(h);
		}
	}
	for h in handles {
		group.release_buffer(h, false);
	}
	qc_assert_eq!(group.segments_in_use(), 0)
}

/// Invariant: after any sequence of releases, a request for exactly the
/// longest free run succeeds with exactly that many segments (no
/// over-truncation, no under-allocation).
#[test]
fn request_for_exactly_the_longest_run_succeeds_in_full() {
	let group = fresh_group(32);
	group.set_segments_used(10, 5);
	// Longest free run is [15, 32) = 17 segments.
	let outcome = group.get_buffer(17 * N, false, None);
	assert_eq!(outcome.buffer.unwrap().buffer_info().segment_count, 17);
}

/// A fresh, empty group always starts allocating at segment zero.
#[test]
fn first_allocation_on_empty_group_starts_at_zero() {
	let group = fresh_group(16);
	let h = group.get_buffer(3 * N, false, None).buffer.unwrap();
	assert_eq!(h.buffer_info().first_segment, 0);
}

#[test]
#[should_panic(expected = "WrongOwner")]
fn release_with_wrong_block_id_panics() {
	let a = Group::new_standalone(PoolKind::Managed.into(), 0, 4, SEGMENT_SIZE).unwrap();
	let b = Group::new_standalone(PoolKind::Managed.into(), 1, 4, SEGMENT_SIZE).unwrap();
	let h = a.get_buffer(N, false, None).buffer.unwrap();
	b.release_buffer(h, false);
}

#[test]
#[should_panic(expected = "DoubleRelease")]
fn double_release_panics() {
	let group = fresh_group(4);
	let info = group.get_buffer(N, false, None).buffer.unwrap().buffer_info();
	group.release_buffer(group.reconstruct_buffer(info), false);
	// Second release of the same run: every segment is already free.
	group.release_buffer(group.reconstruct_buffer(info), false);
}

#[test]
#[should_panic]
fn zero_size_request_panics() {
	let group = fresh_group(4);
	group.get_buffer(0, false, None);
}
