use crate::error::{Error, Result};
use crate::pointer::Pointer;
use crate::ring_id::RingId;

/// Fault-tolerance buffer of candidate successors, ordered from the
/// immediate successor at the head to the most distant fallback. If the head
/// fails, the next entry takes over without a fresh lookup.
///
/// The table never contains the node itself, and its head always matches
/// finger table slot 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuccessorTable {
	own: RingId,
	entries: Vec<Pointer>,
	capacity: usize,
}

impl SuccessorTable {
	pub fn new(own: RingId, capacity: usize) -> SuccessorTable {
		assert!(capacity > 0, "successor table needs room for at least one entry");
		SuccessorTable {
			own,
			entries: Vec::new(),
			capacity,
		}
	}

	/// The immediate successor, while one is known.
	pub fn head(&self) -> Option<&Pointer> {
		self.entries.first()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Replace the table wholesale: the confirmed successor first, then the
	/// fallback entries fetched from it. Self-pointers and duplicates are
	/// dropped, and the result is truncated to capacity.
	pub fn update(&mut self, head: Pointer, rest: Vec<Pointer>) {
		let mut entries = Vec::with_capacity(self.capacity);
		for ptr in std::iter::once(head).chain(rest) {
			if ptr.is_internal() || ptr.id() == &self.own {
				continue;
			}
			if entries.contains(&ptr) {
				continue;
			}
			entries.push(ptr);
			if entries.len() == self.capacity {
				break;
			}
		}
		self.entries = entries;
	}

	/// Set just the head, truncating the tail. Used when finger slot 0
	/// changes for reasons other than a full stabilize.
	pub fn update_trim(&mut self, ptr: Pointer) {
		if ptr.is_internal() || ptr.id() == &self.own {
			self.entries.clear();
		} else {
			self.entries = vec![ptr];
		}
	}

	/// Drop the head and promote the next entry. Failing here means the node
	/// has no remaining path back into the ring.
	pub fn move_to_next(&mut self) -> Result<Pointer> {
		if self.entries.is_empty() {
			return Err(Error::SuccessorsExhausted);
		}
		self.entries.remove(0);
		match self.entries.first() {
			Some(head) => Ok(head.clone()),
			None => Err(Error::SuccessorsExhausted),
		}
	}

	pub fn dump(&self) -> Vec<Pointer> {
		self.entries.clone()
	}
}
