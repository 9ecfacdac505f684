use tracing::debug;

use super::message::{entry_to_pointer, Request, Response};
use super::NodeShared;
use crate::error::{Error, Result};
use crate::pointer::Pointer;
use crate::ring_id::RingId;

// Iterative lookup over the ring. Each hop costs one or two RPC exchanges;
// in a stable ring with populated fingers the walk finishes within the ring
// bit length, but no hard cap is imposed here, so a misbehaving ring can
// keep a caller walking. A hop that stops answering is put on the ignore
// list and the walk resumes from the hop before it.

/// Find the node responsible for `target`.
pub(crate) async fn find_successor(node: &NodeShared, target: &RingId) -> Result<Pointer> {
	let start = Pointer::Internal { id: node.own_id() };
	find_successor_from(node, start, target).await
}

/// Routing variant that starts the walk at an arbitrary peer. Join uses this
/// with the bootstrap node as the entry point: started from an External
/// pointer the walk is exclusively RPC-driven and never consults the local
/// tables, which are not part of the ring yet.
pub(crate) async fn find_successor_from(
	node: &NodeShared,
	start: Pointer,
	target: &RingId,
) -> Result<Pointer> {
	let predecessor = find_predecessor_from(node, start, target).await?;
	successor_of(node, &predecessor).await
}

/// Find the last node before `target` on the ring.
pub(crate) async fn find_predecessor(node: &NodeShared, target: &RingId) -> Result<Pointer> {
	let start = Pointer::Internal { id: node.own_id() };
	find_predecessor_from(node, start, target).await
}

enum Step {
	Done,
	Advance(Pointer),
}

async fn find_predecessor_from(
	node: &NodeShared,
	start: Pointer,
	target: &RingId,
) -> Result<Pointer> {
	let mut current = start;
	let mut previous: Option<Pointer> = None;
	let mut ignore: Vec<RingId> = Vec::new();

	loop {
		match probe(node, &current, target, &ignore).await {
			Ok(Step::Done) => return Ok(current),
			Ok(Step::Advance(next)) => {
				if next.same_position(&current) {
					// the hop reported itself: its tables know nothing
					// closer, so it is the best answer available
					return Ok(current);
				}
				previous = Some(std::mem::replace(&mut current, next));
			}
			Err(err @ (Error::PeerUnreachable(_) | Error::UnexpectedResponse)) => {
				// route around the dead hop by walking back one step
				match previous.take() {
					Some(prev) => {
						debug!("hop {current:?} failed ({err}), resuming from {prev:?}");
						ignore.push(current.id().clone());
						current = prev;
					}
					None => return Err(err),
				}
			}
			Err(err) => return Err(err),
		}
	}
}

/// One routing step at `current`: done if the target falls into the gap to
/// its successor, otherwise advance to its closest preceding finger.
async fn probe(
	node: &NodeShared,
	current: &Pointer,
	target: &RingId,
	ignore: &[RingId],
) -> Result<Step> {
	let successor = successor_of(node, current).await?;
	if target.is_within(current.id(), false, successor.id(), true) {
		return Ok(Step::Done);
	}
	let next = closest_preceding_of(node, current, target, ignore).await?;
	Ok(Step::Advance(next))
}

/// Successor pointer of `of`: a local table read for this node, one
/// GetSuccessor exchange for a remote.
async fn successor_of(node: &NodeShared, of: &Pointer) -> Result<Pointer> {
	match of {
		Pointer::Internal { .. } => Ok(node.state().successor()),
		Pointer::External { id, link } => {
			match node.request(*link, Request::GetSuccessor).await? {
				Response::Successors { entries } => match entries.into_iter().next() {
					Some((head_id, head_link)) => {
						id.ensure_same_bits(&head_id)?;
						Ok(entry_to_pointer(of, head_id, head_link))
					}
					// an empty list means the peer is its own successor
					None => Ok(of.clone()),
				},
				_ => Err(Error::UnexpectedResponse),
			}
		}
	}
}

async fn closest_preceding_of(
	node: &NodeShared,
	of: &Pointer,
	target: &RingId,
	ignore: &[RingId],
) -> Result<Pointer> {
	match of {
		Pointer::Internal { .. } => Ok(node.state().closest_preceding(target, ignore)),
		Pointer::External { link, .. } => {
			let request = Request::GetClosestPrecedingFinger {
				target: target.clone(),
				ignore: ignore.to_vec(),
			};
			match node.request(*link, request).await? {
				Response::ClosestPrecedingFinger { id, link } => {
					target.ensure_same_bits(&id)?;
					Ok(entry_to_pointer(of, id, link))
				}
				_ => Err(Error::UnexpectedResponse),
			}
		}
	}
}
