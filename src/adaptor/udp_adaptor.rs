use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{ChordAdaptor, InboundRequest};
use crate::chord::{Request, Response};
use crate::error::{Error, Result};
use crate::pointer::LinkRef;

/// One serde_json-encoded datagram. On the wire links travel as socket
/// addresses; each gateway swaps them for handles out of its own table at
/// the boundary.
#[derive(Debug, Serialize, Deserialize)]
enum Frame {
	Request {
		request_id: u64,
		request: Request<SocketAddr>,
	},
	Response {
		request_id: u64,
		response: Response<SocketAddr>,
	},
}

#[derive(Debug, Default)]
struct LinkTable {
	by_addr: HashMap<SocketAddr, LinkRef>,
	by_link: HashMap<LinkRef, SocketAddr>,
	next: u64,
}

impl LinkTable {
	fn resolve(&mut self, addr: SocketAddr) -> LinkRef {
		if let Some(link) = self.by_addr.get(&addr) {
			return *link;
		}
		let link = LinkRef::from_raw(self.next);
		self.next += 1;
		self.by_addr.insert(addr, link);
		self.by_link.insert(link, addr);
		link
	}

	fn address(&self, link: LinkRef) -> Option<SocketAddr> {
		self.by_link.get(&link).copied()
	}
}

/// A UDP gateway: one socket per node, requests matched to responses by a
/// request id. The pending-request table delivers at most one response per
/// request; later duplicates find no waiter and fall on the floor.
pub struct UdpAdaptor {
	socket: Arc<UdpSocket>,
	links: Arc<Mutex<LinkTable>>,
	pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Response<SocketAddr>>>>>,
	next_request: AtomicU64,
}

impl UdpAdaptor {
	pub async fn bind(addr: SocketAddr) -> std::io::Result<Arc<UdpAdaptor>> {
		let socket = UdpSocket::bind(addr).await?;
		Ok(Arc::new(UdpAdaptor {
			socket: Arc::new(socket),
			links: Arc::default(),
			pending: Arc::default(),
			next_request: AtomicU64::new(0),
		}))
	}

	/// Turn a raw peer address into the opaque link handle the core stores,
	/// e.g. to obtain a bootstrap link.
	pub fn resolve(&self, addr: SocketAddr) -> LinkRef {
		self.links.lock().expect("link table poisoned").resolve(addr)
	}

	pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
		self.socket.local_addr()
	}

	fn encode(&self, link: LinkRef, request: Request<LinkRef>) -> Result<(SocketAddr, Vec<u8>, u64)> {
		let links = self.links.lock().expect("link table poisoned");
		let addr = links.address(link).ok_or(Error::PeerUnreachable(link))?;
		let request = request.try_map_link(|l| links.address(l).ok_or(Error::PeerUnreachable(l)))?;
		let request_id = self.next_request.fetch_add(1, Ordering::SeqCst);
		let frame = Frame::Request {
			request_id,
			request,
		};
		let bytes = serde_json::to_vec(&frame).expect("frame serialization cannot fail");
		Ok((addr, bytes, request_id))
	}
}

#[async_trait]
impl ChordAdaptor for UdpAdaptor {
	async fn request(
		&self,
		link: LinkRef,
		request: Request<LinkRef>,
		wait: Duration,
	) -> Result<Response<LinkRef>> {
		let (addr, bytes, request_id) = self.encode(link, request)?;
		let (reply_tx, reply_rx) = oneshot::channel();
		self.pending
			.lock()
			.expect("pending table poisoned")
			.insert(request_id, reply_tx);

		if self.socket.send_to(&bytes, addr).await.is_err() {
			self.pending
				.lock()
				.expect("pending table poisoned")
				.remove(&request_id);
			return Err(Error::PeerUnreachable(link));
		}

		let response = match timeout(wait, reply_rx).await {
			Ok(Ok(response)) => response,
			Ok(Err(_)) | Err(_) => {
				self.pending
					.lock()
					.expect("pending table poisoned")
					.remove(&request_id);
				return Err(Error::PeerUnreachable(link));
			}
		};

		let mut links = self.links.lock().expect("link table poisoned");
		Ok(response.map_link(|addr| links.resolve(addr)))
	}

	fn send_forget(&self, link: LinkRef, request: Request<LinkRef>) {
		let encoded = match self.encode(link, request) {
			Ok(encoded) => encoded,
			Err(err) => {
				debug!("dropping fire-and-forget send: {err}");
				return;
			}
		};
		let (addr, bytes, _request_id) = encoded;
		let socket = self.socket.clone();
		tokio::spawn(async move {
			let _ = socket.send_to(&bytes, addr).await;
		});
	}

	fn listen(&self, incoming: mpsc::Sender<InboundRequest>) -> JoinHandle<()> {
		let socket = self.socket.clone();
		let links = self.links.clone();
		let pending = self.pending.clone();
		tokio::spawn(async move {
			let mut buf = vec![0u8; 64 * 1024];
			loop {
				let (len, src) = match socket.recv_from(&mut buf).await {
					Ok(received) => received,
					Err(err) => {
						warn!("udp receive failed: {err}");
						continue;
					}
				};
				let frame: Frame = match serde_json::from_slice(&buf[..len]) {
					Ok(frame) => frame,
					Err(err) => {
						debug!(%src, "dropping malformed datagram: {err}");
						continue;
					}
				};

				match frame {
					Frame::Response {
						request_id,
						response,
					} => {
						let waiter = pending
							.lock()
							.expect("pending table poisoned")
							.remove(&request_id);
						match waiter {
							Some(waiter) => {
								let _ = waiter.send(response);
							}
							// duplicate or expired response
							None => debug!(request_id, "no waiter for response"),
						}
					}

					Frame::Request {
						request_id,
						request,
					} => {
						let (origin, request) = {
							let mut links = links.lock().expect("link table poisoned");
							let origin = links.resolve(src);
							let request = request.map_link(|addr| links.resolve(addr));
							(origin, request)
						};
						let (reply_tx, reply_rx) = oneshot::channel();
						let inbound = InboundRequest {
							origin,
							request,
							reply: reply_tx,
						};
						if incoming.send(inbound).await.is_err() {
							// the node is gone, stop serving the socket
							break;
						}

						// answer asynchronously so a slow handler does not
						// hold up the socket
						let socket = socket.clone();
						let links = links.clone();
						tokio::spawn(async move {
							let response = match reply_rx.await {
								Ok(response) => response,
								// the node dropped the request, no reply
								Err(_) => return,
							};
							let response = {
								let links = links.lock().expect("link table poisoned");
								match response.try_map_link(|l| links.address(l).ok_or(l)) {
									Ok(response) => response,
									Err(link) => {
										warn!(%link, "response referenced an unknown link, dropping");
										return;
									}
								}
							};
							let frame = Frame::Response {
								request_id,
								response,
							};
							let bytes = serde_json::to_vec(&frame)
								.expect("frame serialization cannot fail");
							let _ = socket.send_to(&bytes, src).await;
						});
					}
				}
			}
		})
	}
}
