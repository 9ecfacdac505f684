use tracing::{debug, warn};

use super::message::{entry_to_pointer, Request, Response};
use super::{router, NodeShared};
use crate::error::Result;
use crate::pointer::Pointer;

// The three periodic repair tasks. Each runs on its own timer and recovers
// from peer failures locally: a failed cycle is logged and the next cycle
// tries again. Only an exhausted successor table escapes, because a node
// without any successor has lost the ring.

/// One stabilize cycle.
///
/// Sequence: ask the successor for its predecessor; if that node sits
/// between us and the successor, it is the better successor candidate.
/// Fetch the candidate's successor list, adopt it, then notify the
/// resulting head that we believe we precede it. A successor that fails
/// anywhere in the cycle is shifted away, which is the primary self-healing
/// path; an unconfirmed candidate that fails is merely dropped.
pub(crate) async fn stabilize(node: &NodeShared) -> Result<()> {
	let own = node.own_id();
	let successor = node.state().successor();
	let (succ_id, succ_link) = match &successor {
		Pointer::External { id, link } => (id.clone(), *link),
		// alone on the ring, nothing to stabilize against
		Pointer::Internal { .. } => return Ok(()),
	};

	let reported = match node.request(succ_link, Request::GetPredecessor).await {
		Ok(Response::Predecessor { predecessor }) => predecessor,
		Ok(_) | Err(_) => return shift(node, "successor did not answer get-predecessor"),
	};

	let mut candidate = successor.clone();
	if let Some((id, link)) = reported {
		if own.ensure_same_bits(&id).is_ok() && id.is_within(&own, false, &succ_id, false) {
			candidate = Pointer::External { id, link };
		}
	}

	let candidate_link = match &candidate {
		Pointer::External { link, .. } => *link,
		Pointer::Internal { .. } => return Ok(()),
	};
	let entries = match node.request(candidate_link, Request::GetSuccessor).await {
		Ok(Response::Successors { entries }) => entries,
		Ok(_) | Err(_) if candidate.same_position(&successor) => {
			return shift(node, "successor did not answer get-successor");
		}
		Ok(_) | Err(_) => {
			// the candidate never got adopted; drop it and keep the
			// successor we had
			debug!("successor candidate {candidate:?} did not answer, dropping it");
			node.state().remove_finger(&candidate);
			return Ok(());
		}
	};

	let mut rest = Vec::with_capacity(entries.len());
	for (id, link) in entries {
		if own.ensure_same_bits(&id).is_err() {
			continue;
		}
		rest.push(entry_to_pointer(&candidate, id, link));
	}
	node.state().set_successor(candidate, rest);

	let head = node.state().successor();
	let head_link = match &head {
		Pointer::External { link, .. } => *link,
		Pointer::Internal { .. } => return Ok(()),
	};
	match node
		.request(head_link, Request::Notify { candidate: own })
		.await
	{
		Ok(Response::Notify { .. }) => Ok(()),
		Ok(_) | Err(_) => shift(node, "successor did not answer notify"),
	}
}

fn shift(node: &NodeShared, reason: &str) -> Result<()> {
	warn!("shifting successor: {reason}");
	let head = node.state().shift_successor()?;
	debug!("new successor is {head:?}");
	Ok(())
}

/// One fix-finger cycle: refresh a single slot, walking all slots in turn
/// across cycles.
pub(crate) async fn fix_finger(node: &NodeShared) -> Result<()> {
	let own = node.own_id();
	let index = node.next_finger_index(own.bits());
	let expected = own.finger_id(index);
	let found = router::find_successor(node, &expected).await?;

	if found.id() == &own {
		// the slot correctly reverts toward this node
		let current = node.state().fingers().get(index).clone();
		if current.is_external() {
			debug!(index, "finger resolved to self, dropping {current:?}");
			node.state().remove_finger(&current);
		}
		return Ok(());
	}

	let current = node.state().fingers().get(index).clone();
	if current.is_external()
		&& current.id() != found.id()
		&& current.id().is_within(&own, false, found.id(), false)
	{
		// anything recorded between us and the slot's true successor no
		// longer answers lookups there, so it is stale
		debug!(index, "dropping stale finger {current:?}");
		node.state().remove_finger(&current);
	}
	debug!(index, "refreshing finger with {found:?}");
	node.state().put_finger(found);
	Ok(())
}

/// One check-predecessor cycle: ping the predecessor and clear it when it
/// stops answering or answers as somebody else.
pub(crate) async fn check_predecessor(node: &NodeShared) -> Result<()> {
	let (id, link) = match node.state().predecessor().cloned() {
		Some(Pointer::External { id, link }) => (id, link),
		_ => return Ok(()),
	};

	let alive = match node.request(link, Request::GetId).await {
		Ok(Response::Id { id: reported }) => reported == id,
		Ok(_) | Err(_) => false,
	};
	if !alive {
		warn!("predecessor {id} stopped answering, clearing it");
		node.state().remove_predecessor();
	}
	Ok(())
}
