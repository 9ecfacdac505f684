use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ring_id::RingId;

/// Opaque handle for reaching a remote peer. Only the adaptor that issued a
/// link can turn it back into a concrete network destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkRef(u64);

impl LinkRef {
	pub fn from_raw(raw: u64) -> LinkRef {
		LinkRef(raw)
	}

	pub fn raw(&self) -> u64 {
		self.0
	}
}

impl fmt::Display for LinkRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "link#{}", self.0)
	}
}

/// A pointer to a ring position: either this node itself, or a remote node
/// together with the link it is reachable on.
///
/// Ring-position comparisons go by id alone ([`Pointer::same_position`]);
/// the derived equality additionally compares links and is what the tables
/// use for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pointer {
	/// The local node.
	Internal { id: RingId },
	/// A remote node reachable through `link`.
	External { id: RingId, link: LinkRef },
}

impl Pointer {
	pub fn id(&self) -> &RingId {
		match self {
			Pointer::Internal { id } => id,
			Pointer::External { id, .. } => id,
		}
	}

	pub fn link(&self) -> Option<LinkRef> {
		match self {
			Pointer::Internal { .. } => None,
			Pointer::External { link, .. } => Some(*link),
		}
	}

	pub fn is_internal(&self) -> bool {
		matches!(self, Pointer::Internal { .. })
	}

	pub fn is_external(&self) -> bool {
		matches!(self, Pointer::External { .. })
	}

	/// Equality as ring positions, ignoring how the nodes are reached.
	pub fn same_position(&self, other: &Pointer) -> bool {
		self.id() == other.id()
	}
}
