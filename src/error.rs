use crate::pointer::LinkRef;
use crate::ring_id::RingId;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by this crate.
///
/// Peer unreachability is the only transient variant; the maintenance tasks
/// recover from it locally and never let it escape a cycle. Everything else
/// is either a protocol violation or fatal to the node.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	#[error("peer behind {0} is unreachable or timed out")]
	PeerUnreachable(LinkRef),

	#[error("candidate predecessor {candidate} is not between the current predecessor and this node")]
	InvalidPredecessor { candidate: RingId },

	#[error("ring ids of different bit lengths compared: {left} vs {right}")]
	BitLengthMismatch { left: u32, right: u32 },

	#[error("join attempt failed")]
	JoinFailed(#[source] Box<Error>),

	#[error("successor table exhausted, node has lost the ring")]
	SuccessorsExhausted,

	#[error("peer answered with an unexpected response type")]
	UnexpectedResponse,
}
