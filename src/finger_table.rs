use crate::pointer::Pointer;
use crate::ring_id::RingId;

/// Per-node routing table with one slot per ring bit. Slot `i` approximates
/// the first node at or after `own + 2^i`; a vacant slot points back at the
/// node itself.
///
/// Entries are kept monotonically non-decreasing in ring distance across the
/// slots: every insertion places the closest qualifying candidate, so a
/// higher slot never holds a nearer node than a lower one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerTable {
	own: RingId,
	slots: Vec<Pointer>,
}

impl FingerTable {
	pub fn new(own: RingId) -> FingerTable {
		let slots = (0..own.bits())
			.map(|_| Pointer::Internal { id: own.clone() })
			.collect();
		FingerTable { own, slots }
	}

	pub fn bits(&self) -> u32 {
		self.own.bits()
	}

	/// Expected id of slot `index`: `own + 2^index`.
	pub fn expected_id(&self, index: u32) -> RingId {
		self.own.finger_id(index)
	}

	pub fn get(&self, index: u32) -> &Pointer {
		&self.slots[index as usize]
	}

	/// Slot 0, which mirrors the successor table head.
	pub fn successor(&self) -> &Pointer {
		&self.slots[0]
	}

	/// True if `ptr` can serve slot `index`: the slot's expected id must not
	/// lie past the pointer.
	fn qualifies(&self, index: usize, ptr: &Pointer) -> bool {
		let expected = self.own.finger_id(index as u32);
		expected.is_within(&self.own, false, ptr.id(), true)
	}

	/// Place `ptr` into every slot for which it is a better candidate than
	/// the current entry, tightening the table toward the true successors.
	pub fn put(&mut self, ptr: Pointer) {
		if ptr.is_internal() || ptr.id() == &self.own {
			return;
		}
		let distance = ptr.id().distance_from(&self.own);
		for index in 0..self.slots.len() {
			if !self.qualifies(index, &ptr) {
				continue;
			}
			let better = match &self.slots[index] {
				Pointer::Internal { .. } => true,
				current => distance < current.id().distance_from(&self.own),
			};
			if better {
				self.slots[index] = ptr.clone();
			}
		}
	}

	/// Overwrite slots already pointing at `ptr`'s ring position, for when a
	/// known node's identity changed without its slot assignment changing.
	pub fn replace(&mut self, ptr: Pointer) {
		if ptr.is_internal() || ptr.id() == &self.own {
			return;
		}
		for slot in self.slots.iter_mut() {
			if slot.is_external() && slot.id() == ptr.id() {
				*slot = ptr.clone();
			}
		}
	}

	/// Clear every slot holding exactly `ptr`. Cleared slots revert to the
	/// next-best entry still known at a higher slot, or to the node itself.
	pub fn remove(&mut self, ptr: &Pointer) {
		let mut cleared = Vec::new();
		for (index, slot) in self.slots.iter_mut().enumerate() {
			if slot == ptr {
				*slot = Pointer::Internal {
					id: self.own.clone(),
				};
				cleared.push(index);
			}
		}
		// refill from the top down so cascades see already-refilled slots
		for &index in cleared.iter().rev() {
			let next = self.slots[index + 1..]
				.iter()
				.find(|slot| slot.is_external())
				.cloned();
			if let Some(next) = next {
				self.slots[index] = next;
			}
		}
	}

	/// Vacate slots whose entry lies strictly before `id` (closer to this
	/// node than `id` is).
	pub fn clear_before(&mut self, id: &RingId) {
		for slot in self.slots.iter_mut() {
			if slot.is_external() && slot.id().is_within(&self.own, false, id, false) {
				*slot = Pointer::Internal {
					id: self.own.clone(),
				};
			}
		}
	}

	/// Vacate slots whose entry lies strictly past `id`.
	pub fn clear_after(&mut self, id: &RingId) {
		for slot in self.slots.iter_mut() {
			if slot.is_external() && slot.id().is_within(id, false, &self.own, false) {
				*slot = Pointer::Internal {
					id: self.own.clone(),
				};
			}
		}
	}

	/// Scan from the top slot down for an entry strictly between this node
	/// and `target`, skipping ignored ids. Falls back to the node itself.
	///
	/// A target equal to this node's own id is preceded by every entry: the
	/// walk back to the own id covers the whole ring, so the farthest known
	/// node is the one closest before it.
	pub fn find_closest_preceding(&self, target: &RingId, ignore: &[RingId]) -> Pointer {
		for slot in self.slots.iter().rev() {
			if let Pointer::External { id, .. } = slot {
				let precedes =
					target == &self.own || id.is_within(&self.own, false, target, false);
				if precedes && !ignore.contains(id) {
					return slot.clone();
				}
			}
		}
		Pointer::Internal {
			id: self.own.clone(),
		}
	}

	/// The farthest entry clockwise from this node, if any. Because the
	/// table is monotone this is the last external slot.
	pub fn max_entry(&self) -> Option<Pointer> {
		self.slots.iter().rev().find(|slot| slot.is_external()).cloned()
	}

	pub fn dump(&self) -> Vec<Pointer> {
		self.slots.clone()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::pointer::LinkRef;

	fn id(v: u64) -> RingId {
		RingId::new(3, v)
	}

	fn ext(v: u64) -> Pointer {
		Pointer::External {
			id: id(v),
			link: LinkRef::from_raw(v),
		}
	}

	#[test]
	fn starts_vacant() {
		let table = FingerTable::new(id(0));
		assert_eq!(table.bits(), 3);
		assert!(table.successor().is_internal());
		assert!(table.max_entry().is_none());
		assert_eq!(table.expected_id(0), id(1));
		assert_eq!(table.expected_id(2), id(4));
	}

	#[test]
	fn put_fills_every_qualifying_slot() {
		let mut table = FingerTable::new(id(0));
		table.put(ext(3));
		// expected ids are 1, 2, 4; the node at 3 covers the first two
		assert_eq!(table.get(0), &ext(3));
		assert_eq!(table.get(1), &ext(3));
		assert!(table.get(2).is_internal());
	}

	#[test]
	fn put_only_tightens() {
		let mut table = FingerTable::new(id(0));
		table.put(ext(3));
		table.put(ext(1));
		assert_eq!(table.get(0), &ext(1));
		assert_eq!(table.get(1), &ext(3));
		// a farther candidate never displaces a closer entry
		table.put(ext(6));
		assert_eq!(table.get(0), &ext(1));
		assert_eq!(table.get(1), &ext(3));
		assert_eq!(table.get(2), &ext(6));
	}

	#[test]
	fn put_ignores_the_node_itself() {
		let mut table = FingerTable::new(id(0));
		table.put(Pointer::Internal { id: id(0) });
		table.put(ext(0));
		assert!(table.dump().iter().all(Pointer::is_internal));
	}

	#[test]
	fn replace_only_touches_matching_positions() {
		let mut table = FingerTable::new(id(0));
		table.put(ext(3));
		let renamed = Pointer::External {
			id: id(3),
			link: LinkRef::from_raw(99),
		};
		table.replace(renamed.clone());
		assert_eq!(table.get(0), &renamed);
		assert_eq!(table.get(1), &renamed);
		// replacing an unknown position is a no-op
		table.replace(ext(5));
		assert!(table.get(2).is_internal());
	}

	#[test]
	fn remove_refills_from_higher_slots() {
		let mut table = FingerTable::new(id(0));
		table.put(ext(5));
		table.put(ext(3));
		table.put(ext(1));
		assert_eq!(table.get(0), &ext(1));
		assert_eq!(table.get(1), &ext(3));
		assert_eq!(table.get(2), &ext(5));

		table.remove(&ext(3));
		assert_eq!(table.get(0), &ext(1));
		assert_eq!(table.get(1), &ext(5));
		assert_eq!(table.get(2), &ext(5));
	}

	#[test]
	fn remove_without_fallback_vacates() {
		let mut table = FingerTable::new(id(0));
		table.put(ext(1));
		table.remove(&ext(1));
		assert!(table.dump().iter().all(Pointer::is_internal));
	}

	#[test]
	fn clear_before_and_after() {
		let mut table = FingerTable::new(id(0));
		table.put(ext(5));
		table.put(ext(3));
		table.put(ext(1));

		let mut clipped = table.clone();
		clipped.clear_after(&id(3));
		assert_eq!(clipped.get(0), &ext(1));
		assert_eq!(clipped.get(1), &ext(3));
		assert!(clipped.get(2).is_internal());

		table.clear_before(&id(3));
		assert!(table.get(0).is_internal());
		assert_eq!(table.get(1), &ext(3));
		assert_eq!(table.get(2), &ext(5));
	}

	#[test]
	fn closest_preceding_scans_top_down() {
		let mut table = FingerTable::new(id(0));
		table.put(ext(5));
		table.put(ext(3));
		table.put(ext(1));

		assert_eq!(table.find_closest_preceding(&id(4), &[]), ext(3));
		assert_eq!(table.find_closest_preceding(&id(4), &[id(3)]), ext(1));
		assert_eq!(
			table.find_closest_preceding(&id(1), &[]),
			Pointer::Internal { id: id(0) }
		);
	}

	#[test]
	fn everything_precedes_the_own_id() {
		let mut table = FingerTable::new(id(0));
		table.put(ext(5));
		table.put(ext(3));
		// the ring walk back to our own id passes every known node; the
		// farthest one is the closest predecessor
		assert_eq!(table.find_closest_preceding(&id(0), &[]), ext(5));
		assert_eq!(table.find_closest_preceding(&id(0), &[id(5)]), ext(3));
	}
}
