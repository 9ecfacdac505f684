use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::{ChordAdaptor, InboundRequest};
use crate::chord::{Request, Response};
use crate::error::{Error, Result};
use crate::pointer::LinkRef;

/// An in-process network of nodes: no sockets, just channels between
/// adaptors sharing one registry. Used by the integration tests and example
/// runs, where it also doubles as the failure injector (dropping a node) and
/// the RPC meter (counting exchanges for routing-cost assertions).
#[derive(Debug, Default)]
pub struct MemNetwork {
	routes: Mutex<HashMap<LinkRef, mpsc::Sender<InboundRequest>>>,
	next_link: AtomicU64,
	requests: AtomicUsize,
}

impl MemNetwork {
	pub fn new() -> Arc<MemNetwork> {
		Arc::new(MemNetwork::default())
	}

	/// Create the endpoint for one node on this network.
	pub fn adaptor(network: &Arc<MemNetwork>) -> Arc<MemAdaptor> {
		let link = LinkRef::from_raw(network.next_link.fetch_add(1, Ordering::SeqCst));
		Arc::new(MemAdaptor {
			network: network.clone(),
			link,
		})
	}

	/// Drop a node from the network; requests to it fail from then on.
	pub fn disconnect(&self, link: LinkRef) {
		self.routes
			.lock()
			.expect("network registry poisoned")
			.remove(&link);
	}

	/// Total requests carried so far.
	pub fn request_count(&self) -> usize {
		self.requests.load(Ordering::SeqCst)
	}

	fn route(&self, link: LinkRef) -> Option<mpsc::Sender<InboundRequest>> {
		self.routes
			.lock()
			.expect("network registry poisoned")
			.get(&link)
			.cloned()
	}

	fn register(&self, link: LinkRef, tx: mpsc::Sender<InboundRequest>) {
		self.routes
			.lock()
			.expect("network registry poisoned")
			.insert(link, tx);
	}
}

/// One node's endpoint on a [`MemNetwork`]. The endpoint's own link doubles
/// as the node's address: other nodes bootstrap off it directly.
#[derive(Debug)]
pub struct MemAdaptor {
	network: Arc<MemNetwork>,
	link: LinkRef,
}

impl MemAdaptor {
	/// The link other nodes use to reach this one.
	pub fn link(&self) -> LinkRef {
		self.link
	}
}

#[async_trait]
impl ChordAdaptor for MemAdaptor {
	async fn request(
		&self,
		link: LinkRef,
		request: Request<LinkRef>,
		wait: Duration,
	) -> Result<Response<LinkRef>> {
		self.network.requests.fetch_add(1, Ordering::SeqCst);
		let route = self
			.network
			.route(link)
			.ok_or(Error::PeerUnreachable(link))?;
		let (reply_tx, reply_rx) = oneshot::channel();
		let inbound = InboundRequest {
			origin: self.link,
			request,
			reply: reply_tx,
		};
		route
			.send(inbound)
			.await
			.map_err(|_| Error::PeerUnreachable(link))?;
		match timeout(wait, reply_rx).await {
			Ok(Ok(response)) => Ok(response),
			// the responder dropped the request, or the wait ran out
			Ok(Err(_)) | Err(_) => Err(Error::PeerUnreachable(link)),
		}
	}

	fn send_forget(&self, link: LinkRef, request: Request<LinkRef>) {
		let network = self.network.clone();
		let origin = self.link;
		tokio::spawn(async move {
			network.requests.fetch_add(1, Ordering::SeqCst);
			if let Some(route) = network.route(link) {
				let (reply_tx, _ignored) = oneshot::channel();
				let _ = route
					.send(InboundRequest {
						origin,
						request,
						reply: reply_tx,
					})
					.await;
			}
		});
	}

	fn listen(&self, incoming: mpsc::Sender<InboundRequest>) -> JoinHandle<()> {
		let (tx, mut rx) = mpsc::channel(64);
		self.network.register(self.link, tx);
		tokio::spawn(async move {
			while let Some(inbound) = rx.recv().await {
				if incoming.send(inbound).await.is_err() {
					break;
				}
			}
		})
	}
}
