use tracing::debug;

use super::message::{Request, Response};
use super::NodeShared;
use crate::error::Result;
use crate::pointer::{LinkRef, Pointer};
use crate::ring_id::RingId;

/// Answer one inbound request straight from the node's tables. Handlers
/// never route and never wait on other peers; lookups are served through the
/// embedding handle instead. A malformed request surfaces as an error and
/// gets no reply, leaving the asker to its timeout.
pub(crate) async fn handle(
	node: &NodeShared,
	origin: LinkRef,
	request: Request<LinkRef>,
) -> Result<Response<LinkRef>> {
	match request {
		Request::GetId => Ok(Response::Id { id: node.own_id() }),

		Request::GetClosestPrecedingFinger { target, ignore } => {
			let state = node.state();
			state.own_id().ensure_same_bits(&target)?;
			let found = state.closest_preceding(&target, &ignore);
			Ok(Response::ClosestPrecedingFinger {
				id: found.id().clone(),
				// no link advertises this node itself
				link: found.link(),
			})
		}

		Request::GetPredecessor => {
			let state = node.state();
			Ok(Response::Predecessor {
				predecessor: external_entry(state.predecessor()),
			})
		}

		Request::GetSuccessor => {
			let entries = node
				.state()
				.successor_list()
				.into_iter()
				.map(|ptr| match ptr {
					Pointer::External { id, link } => (id, Some(link)),
					Pointer::Internal { id } => (id, None),
				})
				.collect();
			Ok(Response::Successors { entries })
		}

		Request::Notify { candidate } => {
			let mut state = node.state();
			state.own_id().ensure_same_bits(&candidate)?;
			let claim = Pointer::External {
				id: candidate,
				link: origin,
			};
			match state.set_predecessor(claim) {
				Ok(()) => debug!("adopted predecessor {:?}", state.predecessor()),
				Err(err) => debug!("keeping current predecessor: {err}"),
			}
			Ok(Response::Notify {
				predecessor: external_entry(state.predecessor()),
			})
		}

		Request::UpdateFingerTable { candidate, link } => {
			let own = node.own_id();
			own.ensure_same_bits(&candidate)?;
			if candidate == own {
				return Ok(Response::UpdateFingerTable);
			}
			let link = link.unwrap_or(origin);
			let claim = Pointer::External {
				id: candidate.clone(),
				link,
			};

			let (became_successor, predecessor) = {
				let mut state = node.state();
				// a known position with a new link gets refreshed in place;
				// a new position competes for slots as usual
				state.replace_finger(claim.clone());
				state.put_finger(claim);
				let became_successor = state.successor().id() == &candidate;
				(became_successor, state.predecessor().cloned())
			};

			if became_successor {
				// the candidate is our new successor; the nodes behind us
				// may want it in their tables too, so pass the news one hop
				// further back
				if let Some(Pointer::External {
					id: pred_id,
					link: pred_link,
				}) = predecessor
				{
					if pred_id != candidate {
						node.adaptor.send_forget(
							pred_link,
							Request::UpdateFingerTable {
								candidate,
								link: Some(link),
							},
						);
					}
				}
			}
			Ok(Response::UpdateFingerTable)
		}
	}
}

fn external_entry(ptr: Option<&Pointer>) -> Option<(RingId, LinkRef)> {
	match ptr {
		Some(Pointer::External { id, link }) => Some((id.clone(), *link)),
		_ => None,
	}
}
