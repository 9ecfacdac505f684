use serde::{Deserialize, Serialize};

use crate::pointer::{LinkRef, Pointer};
use crate::ring_id::RingId;

/// Request half of the peer RPC pairs.
///
/// Both halves are generic over the link parameter `L`: the core speaks
/// [`LinkRef`], while a gateway substitutes concrete network addresses on
/// the wire and resolves them back into its own link table on receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request<L> {
	GetId,
	GetClosestPrecedingFinger {
		target: RingId,
		ignore: Vec<RingId>,
	},
	GetPredecessor,
	GetSuccessor,
	/// The sender believes it is the receiver's predecessor.
	Notify { candidate: RingId },
	/// The candidate may belong in the receiver's finger table. A `link` of
	/// None means the candidate is the sender itself; a propagated update
	/// carries the candidate's link explicitly.
	UpdateFingerTable {
		candidate: RingId,
		link: Option<L>,
	},
}

/// Response half of the peer RPC pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response<L> {
	Id {
		id: RingId,
	},
	/// A `link` of None means the responder reported itself.
	ClosestPrecedingFinger {
		id: RingId,
		link: Option<L>,
	},
	Predecessor {
		predecessor: Option<(RingId, L)>,
	},
	/// Successor-list entries in order; a None link tags the responder
	/// itself.
	Successors {
		entries: Vec<(RingId, Option<L>)>,
	},
	/// The responder's predecessor after considering the notify.
	Notify {
		predecessor: Option<(RingId, L)>,
	},
	UpdateFingerTable,
}

impl<L> Request<L> {
	/// Rewrite every link in place, infallibly.
	pub fn map_link<M>(self, f: impl FnOnce(L) -> M) -> Request<M> {
		match self {
			Request::GetId => Request::GetId,
			Request::GetClosestPrecedingFinger { target, ignore } => {
				Request::GetClosestPrecedingFinger { target, ignore }
			}
			Request::GetPredecessor => Request::GetPredecessor,
			Request::GetSuccessor => Request::GetSuccessor,
			Request::Notify { candidate } => Request::Notify { candidate },
			Request::UpdateFingerTable { candidate, link } => Request::UpdateFingerTable {
				candidate,
				link: link.map(f),
			},
		}
	}

	/// Rewrite every link in place; a failed resolution fails the whole
	/// message.
	pub fn try_map_link<M, E>(
		self,
		f: impl FnOnce(L) -> std::result::Result<M, E>,
	) -> std::result::Result<Request<M>, E> {
		Ok(match self {
			Request::GetId => Request::GetId,
			Request::GetClosestPrecedingFinger { target, ignore } => {
				Request::GetClosestPrecedingFinger { target, ignore }
			}
			Request::GetPredecessor => Request::GetPredecessor,
			Request::GetSuccessor => Request::GetSuccessor,
			Request::Notify { candidate } => Request::Notify { candidate },
			Request::UpdateFingerTable { candidate, link } => Request::UpdateFingerTable {
				candidate,
				link: link.map(f).transpose()?,
			},
		})
	}
}

impl<L> Response<L> {
	/// Rewrite every link in place, infallibly.
	pub fn map_link<M>(self, mut f: impl FnMut(L) -> M) -> Response<M> {
		match self {
			Response::Id { id } => Response::Id { id },
			Response::ClosestPrecedingFinger { id, link } => Response::ClosestPrecedingFinger {
				id,
				link: link.map(&mut f),
			},
			Response::Predecessor { predecessor } => Response::Predecessor {
				predecessor: predecessor.map(|(id, link)| (id, f(link))),
			},
			Response::Successors { entries } => Response::Successors {
				entries: entries
					.into_iter()
					.map(|(id, link)| (id, link.map(&mut f)))
					.collect(),
			},
			Response::Notify { predecessor } => Response::Notify {
				predecessor: predecessor.map(|(id, link)| (id, f(link))),
			},
			Response::UpdateFingerTable => Response::UpdateFingerTable,
		}
	}

	/// Rewrite every link in place; a failed resolution fails the whole
	/// message.
	pub fn try_map_link<M, E>(
		self,
		mut f: impl FnMut(L) -> std::result::Result<M, E>,
	) -> std::result::Result<Response<M>, E> {
		Ok(match self {
			Response::Id { id } => Response::Id { id },
			Response::ClosestPrecedingFinger { id, link } => Response::ClosestPrecedingFinger {
				id,
				link: link.map(&mut f).transpose()?,
			},
			Response::Predecessor { predecessor } => Response::Predecessor {
				predecessor: match predecessor {
					Some((id, link)) => Some((id, f(link)?)),
					None => None,
				},
			},
			Response::Successors { entries } => {
				let mut mapped = Vec::with_capacity(entries.len());
				for (id, link) in entries {
					mapped.push((id, link.map(&mut f).transpose()?));
				}
				Response::Successors { entries: mapped }
			}
			Response::Notify { predecessor } => Response::Notify {
				predecessor: match predecessor {
					Some((id, link)) => Some((id, f(link)?)),
					None => None,
				},
			},
			Response::UpdateFingerTable => Response::UpdateFingerTable,
		})
	}
}

/// Resolve a wire `(id, link)` entry against the peer that reported it; an
/// absent link is the peer advertising itself.
pub(crate) fn entry_to_pointer(responder: &Pointer, id: RingId, link: Option<LinkRef>) -> Pointer {
	match link {
		Some(link) => Pointer::External { id, link },
		None => responder.clone(),
	}
}
