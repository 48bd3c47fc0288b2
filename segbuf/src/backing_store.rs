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

//! The raw, fixed-size memory region a [`Group`](crate::group::Group) slices
//! into segments.

use std::alloc::{alloc, dealloc, Layout};
use std::ptr::NonNull;
use crate::error::{Error, Result};

/// Which allocator backs a [`BackingStore`]'s bytes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StoreKind {
	/// A managed byte array; zero-filled at creation (a platform guarantee
	/// of `vec![0; n]`).
	Managed,
	/// A region obtained directly from the OS allocator via
	/// [`std::alloc`]; initial contents are unspecified, so it must be
	/// treated as dirty until explicitly zeroed.
	Native,
}

/// A contiguous `len`-byte region, either a managed byte array or memory
/// obtained straight from the OS allocator. `len` is fixed for the
/// lifetime of the store.
pub struct BackingStore {
	ptr: NonNull<u8>,
	len: usize,
}

// Safety: a BackingStore's bytes are accessed only through &self/&mut self
// slice methods, which borrow-check exclusive access the same as any other
// owned buffer; the raw pointer is never aliased outside of this type.
unsafe impl Send for BackingStore {}
unsafe impl Sync for BackingStore {}

impl BackingStore {
	/// Allocates a new `len`-byte region of the given kind.
	pub fn new(kind: StoreKind, len: usize) -> Result<Self> {
		assert!(len > 0, "backing store length must be greater than zero");
		let layout = Layout::array::<u8>(len).expect("backing store length overflows isize");

		let ptr = match kind {
			StoreKind::Managed => {
				// SAFETY: layout has a non-zero size (len > 0 asserted above).
				let raw = unsafe { alloc(layout) };
				let ptr = NonNull::new(raw).ok_or_else(|| Error::allocation_failed(len))?;
				// SAFETY: `raw` was just allocated with `layout` and is valid
				// for `len` bytes.
				unsafe { raw.write_bytes(0, len) };
				ptr
			}
			StoreKind::Native => {
				// SAFETY: layout has a non-zero size.
				let raw = unsafe { alloc(layout) };
				NonNull::new(raw).ok_or_else(|| Error::allocation_failed(len))?
				// Contents are left as returned by the allocator, per StoreKind::Native's contract.
			}
		};

		Ok(Self { ptr, len })
	}

	/// Raw base pointer into the store, valid for `len()` bytes for the
	/// store's lifetime. Used by [`crate::group`] to hand out segment
	/// spans without holding the group lock for the handle's lifetime.
	pub(crate) fn base_ptr(&self) -> *mut u8 { self.ptr.as_ptr() }

	fn layout(&self) -> Layout {
		Layout::array::<u8>(self.len).unwrap()
	}

	/// Borrows `[offset, offset + length)` as a byte slice. Panics if the
	/// range is out of bounds.
	#[cfg(test)]
	fn slice(&self, offset: usize, length: usize) -> &[u8] {
		assert!(offset + length <= self.len, "backing store range out of bounds");
		// SAFETY: the range was just bounds-checked against `self.len`, and
		// the pointer is valid for `self.len` bytes for the store's lifetime.
		unsafe { std::slice::from_raw_parts(self.ptr.as_ptr().add(offset), length) }
	}

	/// Borrows `[offset, offset + length)` as a mutable byte slice. Panics
	/// if the range is out of bounds.
	pub fn slice_mut(&mut self, offset: usize, length: usize) -> &mut [u8] {
		assert!(offset + length <= self.len, "backing store range out of bounds");
		// SAFETY: see `slice`; `&mut self` guarantees exclusive access.
		unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr().add(offset), length) }
	}

	/// Writes zeros to `[offset, offset + length)`.
	pub fn zero(&mut self, offset: usize, length: usize) {
		self.slice_mut(offset, length).fill(0);
	}
}

impl Drop for BackingStore {
	fn drop(&mut self) {
		// SAFETY: `self.ptr` was allocated with `self.layout()` in `new`
		// and hasn't been freed yet.
		unsafe { dealloc(self.ptr.as_ptr(), self.layout()) }
	}
}
