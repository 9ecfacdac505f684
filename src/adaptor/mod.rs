use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::chord::{Request, Response};
use crate::error::{Error, Result};
use crate::pointer::LinkRef;

pub mod mem_adaptor;
pub mod udp_adaptor;

/// An inbound request handed to the node's responder loop, together with the
/// resolved origin link and the channel its response goes back on.
#[derive(Debug)]
pub struct InboundRequest {
	pub origin: LinkRef,
	pub request: Request<LinkRef>,
	pub reply: oneshot::Sender<Response<LinkRef>>,
}

/// Transport collaborator. An adaptor turns opaque [`LinkRef`] handles into
/// reachable peers and back, carries one request/response exchange at a
/// time, and feeds inbound requests into the node.
#[async_trait]
pub trait ChordAdaptor: Send + Sync + 'static {
	/// One request/response exchange with a bounded wait. Implementations
	/// deliver at most one response per request; duplicates from the network
	/// are dropped.
	async fn request(
		&self,
		link: LinkRef,
		request: Request<LinkRef>,
		timeout: Duration,
	) -> Result<Response<LinkRef>>;

	/// Send a request without waiting for any response.
	fn send_forget(&self, link: LinkRef, request: Request<LinkRef>);

	/// Start feeding inbound requests into `incoming`. The returned handle
	/// owns whatever background work the transport needs.
	fn listen(&self, incoming: mpsc::Sender<InboundRequest>) -> JoinHandle<()>;
}

/// Issue `request` with the given per-attempt timeout, retrying a bounded
/// number of times before surfacing the failure.
pub(crate) async fn request_with_retry(
	adaptor: &dyn ChordAdaptor,
	link: LinkRef,
	request: Request<LinkRef>,
	timeout: Duration,
	retries: u32,
) -> Result<Response<LinkRef>> {
	let mut last = Error::PeerUnreachable(link);
	for attempt in 0..=retries {
		match adaptor.request(link, request.clone(), timeout).await {
			Ok(response) => return Ok(response),
			Err(err @ Error::PeerUnreachable(_)) => {
				debug!(%link, attempt, "request attempt failed: {err}");
				last = err;
			}
			// anything else is a protocol problem, not worth retrying
			Err(err) => return Err(err),
		}
	}
	Err(last)
}
