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

use std::error;

/// Recoverable errors surfaced synchronously from the allocator's public
/// API. Programmer errors (double-release, wrong owner, out-of-range
/// access) aren't modeled here; they panic at the call site, since they
/// indicate a contract violation rather than a runtime condition.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("requested size must be greater than zero")]
	InvalidArgument,
	#[error("failed to allocate a backing store of {requested} bytes")]
	AllocationFailed {
		requested: usize,
		#[source]
		source: Option<Box<dyn error::Error + Send + Sync>>,
	},
}

impl Error {
	pub(crate) fn allocation_failed(requested: usize) -> Self {
		Self::AllocationFailed { requested, source: None }
	}
}

pub type Result<T> = std::result::Result<T, Error>;
