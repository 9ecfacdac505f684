use crate::error::{Error, Result};
use crate::finger_table::FingerTable;
use crate::pointer::Pointer;
use crate::ring_id::RingId;
use crate::successor_table::SuccessorTable;

/// The authoritative per-node aggregate: finger table, successor table and
/// predecessor. The three structures re-derive each other, so this is the
/// only place allowed to mutate them; every public mutator applies its
/// change and then reconciles the other two structures, keeping the
/// cross-structure invariants true at every observable boundary:
///
/// - finger slot 0 always equals the successor table head,
/// - no entry lies strictly past a confirmed predecessor,
/// - while entries exist but no peer has confirmed itself as predecessor,
///   the farthest entry stands in as the predecessor approximation.
#[derive(Debug)]
pub struct NodeState {
	own: RingId,
	fingers: FingerTable,
	successors: SuccessorTable,
	predecessor: Option<Pointer>,
	// true once a peer claimed the spot through set_predecessor, as opposed
	// to the approximation derived from the table maximum
	predecessor_confirmed: bool,
}

impl NodeState {
	pub fn new(own: RingId, successor_capacity: usize) -> NodeState {
		NodeState {
			fingers: FingerTable::new(own.clone()),
			successors: SuccessorTable::new(own.clone(), successor_capacity),
			predecessor: None,
			predecessor_confirmed: false,
			own,
		}
	}

	pub fn own_id(&self) -> &RingId {
		&self.own
	}

	pub fn predecessor(&self) -> Option<&Pointer> {
		self.predecessor.as_ref()
	}

	pub fn fingers(&self) -> &FingerTable {
		&self.fingers
	}

	/// Current successor pointer; the node itself while no peer is known.
	pub fn successor(&self) -> Pointer {
		self.fingers.successor().clone()
	}

	pub fn successor_list(&self) -> Vec<Pointer> {
		self.successors.dump()
	}

	pub fn closest_preceding(&self, target: &RingId, ignore: &[RingId]) -> Pointer {
		self.fingers.find_closest_preceding(target, ignore)
	}

	/// Adopt `ptr` as the confirmed predecessor. Only candidates strictly
	/// between the current predecessor and this node are accepted: the
	/// predecessor may only ever tighten, a stale or lying peer cannot
	/// widen it.
	pub fn set_predecessor(&mut self, ptr: Pointer) -> Result<()> {
		if ptr.id() == &self.own {
			return Err(Error::InvalidPredecessor {
				candidate: ptr.id().clone(),
			});
		}
		if let Some(current) = &self.predecessor {
			if !ptr.id().is_within(current.id(), false, &self.own, false) {
				return Err(Error::InvalidPredecessor {
					candidate: ptr.id().clone(),
				});
			}
		}
		self.predecessor = Some(ptr);
		self.predecessor_confirmed = true;
		self.clip_fingers_to_predecessor();
		self.sync_successor_head();
		Ok(())
	}

	pub fn remove_predecessor(&mut self) {
		self.predecessor = None;
		self.predecessor_confirmed = false;
		self.sync_successor_head();
	}

	/// Insert a learned node into the finger table. Candidates lying past a
	/// confirmed predecessor are ignored: nothing beyond it is observably
	/// reachable, and such nodes announce themselves through notify instead.
	pub fn put_finger(&mut self, ptr: Pointer) {
		if self.beyond_predecessor(ptr.id()) {
			return;
		}
		self.fingers.put(ptr);
		self.reconcile_after_fingers();
	}

	/// Refresh the link of an already-known ring position, for a node whose
	/// identity changed without its slot assignment changing.
	pub fn replace_finger(&mut self, ptr: Pointer) {
		self.fingers.replace(ptr);
		self.reconcile_after_fingers();
	}

	pub fn remove_finger(&mut self, ptr: &Pointer) {
		self.fingers.remove(ptr);
		self.reconcile_after_fingers();
	}

	/// Adopt a confirmed successor together with its own successor list.
	pub fn set_successor(&mut self, head: Pointer, mut rest: Vec<Pointer>) {
		rest.retain(|ptr| !self.beyond_predecessor(ptr.id()));
		self.successors.update(head, rest);
		self.reconcile_after_successors();
	}

	/// Promote the next fallback successor after the head failed.
	pub fn shift_successor(&mut self) -> Result<Pointer> {
		let old = self.successors.head().cloned();
		let head = self.successors.move_to_next()?;
		if let Some(old) = old {
			self.fingers.remove(&old);
		}
		self.reconcile_after_successors();
		Ok(head)
	}

	fn beyond_predecessor(&self, id: &RingId) -> bool {
		if !self.predecessor_confirmed {
			return false;
		}
		match &self.predecessor {
			Some(pred) => id.is_within(pred.id(), false, &self.own, false),
			None => false,
		}
	}

	fn clip_fingers_to_predecessor(&mut self) {
		if let Some(pred) = self.predecessor.clone() {
			self.fingers.clear_after(pred.id());
			self.fingers.put(pred);
		}
	}

	fn derive_predecessor(&mut self) {
		// the approximation floats with the table maximum until a peer
		// confirms itself; afterwards only notify may move the value
		if !self.predecessor_confirmed {
			self.predecessor = self.fingers.max_entry();
		}
	}

	fn sync_successor_head(&mut self) {
		let slot0 = self.fingers.successor().clone();
		let matches = match (&slot0, self.successors.head()) {
			(Pointer::External { .. }, Some(head)) => &slot0 == head,
			(Pointer::Internal { .. }, None) => true,
			_ => false,
		};
		if !matches {
			self.successors.update_trim(slot0);
		}
	}

	fn reconcile_after_fingers(&mut self) {
		self.derive_predecessor();
		self.sync_successor_head();
	}

	fn reconcile_after_successors(&mut self) {
		if let Some(head) = self.successors.head().cloned() {
			self.fingers.clear_before(head.id());
			self.fingers.put(head);
		}
		self.derive_predecessor();
		self.sync_successor_head();
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

	fn state() -> NodeState {
		NodeState::new(id(0), 3)
	}

	fn assert_mirrored(state: &NodeState) {
		match state.successor() {
			Pointer::External { .. } => {
				assert_eq!(
					Some(&state.successor()),
					state.successor_list().first(),
					"finger slot 0 must mirror the successor table head"
				);
			}
			Pointer::Internal { .. } => {
				assert!(
					state.successor_list().is_empty(),
					"a vacant slot 0 must mean an empty successor table"
				);
			}
		}
	}

	#[test]
	fn fresh_state_is_alone() {
		let state = state();
		assert!(state.predecessor().is_none());
		assert!(state.successor().is_internal());
		assert_mirrored(&state);
	}

	#[test]
	fn put_finger_derives_predecessor_and_successor() {
		let mut state = state();
		state.put_finger(ext(1));
		assert_eq!(state.predecessor(), Some(&ext(1)));

		// the approximation floats outward with the table maximum
		state.put_finger(ext(3));
		assert_eq!(state.predecessor(), Some(&ext(3)));
		assert_eq!(state.successor(), ext(1));
		assert_mirrored(&state);
	}

	#[test]
	fn predecessor_only_tightens_once_confirmed() {
		let mut state = state();
		state.set_predecessor(ext(3)).unwrap();
		// 5 is between 3 and 0, so it is closer to us going backward
		state.set_predecessor(ext(5)).unwrap();
		assert_eq!(state.predecessor(), Some(&ext(5)));

		// widening back to 3 is rejected
		assert!(matches!(
			state.set_predecessor(ext(3)),
			Err(Error::InvalidPredecessor { .. })
		));
		// so is the node itself
		assert!(matches!(
			state.set_predecessor(ext(0)),
			Err(Error::InvalidPredecessor { .. })
		));
		assert_eq!(state.predecessor(), Some(&ext(5)));
		assert_mirrored(&state);
	}

	#[test]
	fn repeated_notify_is_idempotent() {
		let mut state = state();
		state.set_predecessor(ext(5)).unwrap();
		let fingers = state.fingers().dump();
		let successors = state.successor_list();

		// the same candidate again changes nothing
		assert!(state.set_predecessor(ext(5)).is_err());
		assert_eq!(state.predecessor(), Some(&ext(5)));
		assert_eq!(state.fingers().dump(), fingers);
		assert_eq!(state.successor_list(), successors);
	}

	#[test]
	fn fingers_never_pass_a_confirmed_predecessor() {
		let mut state = state();
		state.set_predecessor(ext(3)).unwrap();
		// 5 lies past the predecessor and must be ignored
		state.put_finger(ext(5));
		assert!(state
			.fingers()
			.dump()
			.iter()
			.all(|ptr| ptr.id() != &id(5)));
		assert_mirrored(&state);
	}

	#[test]
	fn successor_entries_respect_the_predecessor_bound() {
		let mut state = state();
		state.set_predecessor(ext(6)).unwrap();
		state.set_successor(ext(1), vec![ext(2), ext(7)]);
		// 7 lies past the confirmed predecessor at 6
		assert_eq!(state.successor_list(), vec![ext(1), ext(2)]);
		assert_mirrored(&state);
	}

	#[test]
	fn set_successor_adopts_head_and_fallbacks() {
		let mut state = state();
		state.set_successor(ext(1), vec![ext(2), ext(3)]);
		assert_eq!(state.successor(), ext(1));
		assert_eq!(state.successor_list(), vec![ext(1), ext(2), ext(3)]);
		assert_mirrored(&state);
	}

	#[test]
	fn shift_successor_promotes_and_cleans_up() {
		let mut state = state();
		state.set_successor(ext(1), vec![ext(2), ext(3)]);
		let head = state.shift_successor().unwrap();
		assert_eq!(head, ext(2));
		assert_eq!(state.successor(), ext(2));
		assert!(state
			.fingers()
			.dump()
			.iter()
			.all(|ptr| ptr.id() != &id(1)));
		assert_mirrored(&state);
	}

	#[test]
	fn shift_on_exhausted_table_fails() {
		let mut state = state();
		state.set_successor(ext(1), vec![]);
		assert!(matches!(
			state.shift_successor(),
			Err(Error::SuccessorsExhausted)
		));
	}

	#[test]
	fn replace_finger_refreshes_links_in_place() {
		let mut state = state();
		state.put_finger(ext(3));
		let renamed = Pointer::External {
			id: id(3),
			link: LinkRef::from_raw(99),
		};
		state.replace_finger(renamed.clone());
		assert_eq!(state.successor(), renamed);
		// the successor table head picks up the refreshed link too
		assert_eq!(state.successor_list().first(), Some(&renamed));
		assert_mirrored(&state);
	}

	#[test]
	fn put_then_get_returns_the_improvement() {
		let mut state = state();
		state.put_finger(ext(3));
		// slot 1 expects id 2; the node at 3 is the best candidate so far
		assert_eq!(state.fingers().get(1), &ext(3));
		state.put_finger(ext(2));
		// a strictly closer candidate takes the slot over
		assert_eq!(state.fingers().get(1), &ext(2));
	}
}
