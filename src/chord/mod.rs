use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

pub(crate) mod message;
mod handlers;
mod join;
mod maintenance;
mod router;
mod state;

pub use message::{Request, Response};

use state::NodeState;

use crate::adaptor::{self, ChordAdaptor, InboundRequest};
use crate::error::{Error, Result};
use crate::pointer::{LinkRef, Pointer};
use crate::ring_id::RingId;

/// Timing and sizing knobs for one node.
#[derive(Debug, Clone)]
pub struct ChordConfig {
	/// Capacity of the successor fallback list.
	pub successor_list_len: usize,
	/// Bound on a single RPC attempt.
	pub rpc_timeout: Duration,
	/// Automatic retries after a failed RPC attempt.
	pub rpc_retries: u32,
	/// Period of each maintenance task. None disables the timer; cycles can
	/// still be driven manually through the handle.
	pub stabilize_interval: Option<Duration>,
	pub fix_finger_interval: Option<Duration>,
	pub check_predecessor_interval: Option<Duration>,
}

impl Default for ChordConfig {
	fn default() -> ChordConfig {
		ChordConfig {
			successor_list_len: 3,
			rpc_timeout: Duration::from_millis(500),
			rpc_retries: 2,
			stabilize_interval: Some(Duration::from_secs(15)),
			fix_finger_interval: Some(Duration::from_secs(15)),
			check_predecessor_interval: Some(Duration::from_secs(15)),
		}
	}
}

/// Everything the per-node tasks share. The state mutex is only ever held
/// across synchronous mutation, never across an await: an outbound RPC is a
/// suspension point between a snapshot read and a re-validating mutation.
pub(crate) struct NodeShared {
	pub(crate) config: ChordConfig,
	pub(crate) adaptor: Arc<dyn ChordAdaptor>,
	state: Mutex<NodeState>,
	next_finger: AtomicU32,
	fault: watch::Sender<bool>,
}

impl NodeShared {
	pub(crate) fn state(&self) -> MutexGuard<'_, NodeState> {
		self.state.lock().expect("node state lock poisoned")
	}

	pub(crate) fn own_id(&self) -> RingId {
		self.state().own_id().clone()
	}

	pub(crate) async fn request(
		&self,
		link: LinkRef,
		request: Request<LinkRef>,
	) -> Result<Response<LinkRef>> {
		adaptor::request_with_retry(
			self.adaptor.as_ref(),
			link,
			request,
			self.config.rpc_timeout,
			self.config.rpc_retries,
		)
		.await
	}

	/// Index for the next fix-finger cycle, walking all slots in turn.
	pub(crate) fn next_finger_index(&self, bits: u32) -> u32 {
		self.next_finger.fetch_add(1, Ordering::SeqCst) % bits
	}

	pub(crate) fn raise_fault(&self) {
		let _ = self.fault.send(true);
	}
}

/// One ring node, before it runs. This struct acts like a builder: it is
/// created and configured, then consumed by [`Chord::start`], which returns
/// a [`ChordHandle`] to the running node.
pub struct Chord {
	id: RingId,
	adaptor: Arc<dyn ChordAdaptor>,
	config: ChordConfig,
}

impl Chord {
	pub fn new(id: RingId, adaptor: Arc<dyn ChordAdaptor>) -> Chord {
		Chord {
			id,
			adaptor,
			config: ChordConfig::default(),
		}
	}

	pub fn set_config(&mut self, config: ChordConfig) {
		self.config = config;
	}

	/// Start the node. With a bootstrap link the node first joins the ring
	/// behind that peer; a failed join means the node does not start at all,
	/// and the caller decides whether to retry. Without a bootstrap the node
	/// hosts a new ring as its sole member.
	pub async fn start(self, bootstrap: Option<LinkRef>) -> Result<ChordHandle> {
		let Chord { id, adaptor, config } = self;
		let (fault, fault_rx) = watch::channel(false);
		let shared = Arc::new(NodeShared {
			state: Mutex::new(NodeState::new(id.clone(), config.successor_list_len)),
			next_finger: AtomicU32::new(0),
			adaptor,
			config,
			fault,
		});

		// the transport must be serving before the join runs: its listener
		// is also what delivers the join's own RPC responses
		let (incoming_tx, incoming_rx) = mpsc::channel(64);
		let listener = shared.adaptor.listen(incoming_tx);
		let responder = spawn_responder(shared.clone(), incoming_rx);
		let mut tasks = vec![listener, responder];

		match bootstrap {
			Some(link) => {
				if let Err(err) = join::join(&shared, link).await {
					for task in &tasks {
						task.abort();
					}
					return Err(err);
				}
				info!(id = %id, "joined ring via bootstrap {link}");
			}
			None => info!(id = %id, "hosting a new ring"),
		}

		tasks.append(&mut spawn_maintenance(shared.clone()));

		Ok(ChordHandle {
			shared,
			fault: fault_rx,
			tasks,
		})
	}
}

fn spawn_responder(
	shared: Arc<NodeShared>,
	mut incoming: mpsc::Receiver<InboundRequest>,
) -> JoinHandle<()> {
	tokio::spawn(async move {
		while let Some(inbound) = incoming.recv().await {
			let InboundRequest {
				origin,
				request,
				reply,
			} = inbound;
			match handlers::handle(&shared, origin, request).await {
				Ok(response) => {
					let _ = reply.send(response);
				}
				Err(err) => warn!("dropping inbound request from {origin}: {err}"),
			}
		}
		debug!("responder loop terminating");
	})
}

fn spawn_maintenance(shared: Arc<NodeShared>) -> Vec<JoinHandle<()>> {
	let mut tasks = Vec::new();

	if let Some(period) = shared.config.stabilize_interval {
		let shared = shared.clone();
		tasks.push(tokio::spawn(async move {
			let mut timer = interval(period);
			loop {
				timer.tick().await;
				match maintenance::stabilize(&shared).await {
					Ok(()) => {}
					Err(Error::SuccessorsExhausted) => {
						warn!("successor table exhausted; node has lost the ring");
						shared.raise_fault();
						break;
					}
					Err(err) => debug!("stabilize cycle failed: {err}"),
				}
			}
		}));
	}

	if let Some(period) = shared.config.fix_finger_interval {
		let shared = shared.clone();
		tasks.push(tokio::spawn(async move {
			let mut timer = interval(period);
			loop {
				timer.tick().await;
				if let Err(err) = maintenance::fix_finger(&shared).await {
					debug!("fix-finger cycle failed: {err}");
				}
			}
		}));
	}

	if let Some(period) = shared.config.check_predecessor_interval {
		let shared = shared.clone();
		tasks.push(tokio::spawn(async move {
			let mut timer = interval(period);
			loop {
				timer.tick().await;
				if let Err(err) = maintenance::check_predecessor(&shared).await {
					debug!("check-predecessor cycle failed: {err}");
				}
			}
		}));
	}

	tasks
}

/// A running ring node.
pub struct ChordHandle {
	shared: Arc<NodeShared>,
	fault: watch::Receiver<bool>,
	tasks: Vec<JoinHandle<()>>,
}

impl ChordHandle {
	pub fn id(&self) -> RingId {
		self.shared.own_id()
	}

	/// Current successor pointer; Internal while the node is alone.
	pub fn successor(&self) -> Pointer {
		self.shared.state().successor()
	}

	pub fn predecessor(&self) -> Option<Pointer> {
		self.shared.state().predecessor().cloned()
	}

	pub fn successor_list(&self) -> Vec<Pointer> {
		self.shared.state().successor_list()
	}

	pub fn fingers(&self) -> Vec<Pointer> {
		self.shared.state().fingers().dump()
	}

	/// Route a lookup for `target` and return the responsible node.
	pub async fn lookup(&self, target: RingId) -> Result<Pointer> {
		router::find_successor(&self.shared, &target).await
	}

	/// Route a lookup for the last node before `target` on the ring.
	pub async fn lookup_predecessor(&self, target: RingId) -> Result<Pointer> {
		router::find_predecessor(&self.shared, &target).await
	}

	/// Run one stabilize cycle now, outside the timer.
	pub async fn run_stabilize(&self) -> Result<()> {
		let result = maintenance::stabilize(&self.shared).await;
		if let Err(Error::SuccessorsExhausted) = &result {
			self.shared.raise_fault();
		}
		result
	}

	/// Run one fix-finger cycle now, refreshing a single slot.
	pub async fn run_fix_finger(&self) -> Result<()> {
		maintenance::fix_finger(&self.shared).await
	}

	/// Run one check-predecessor cycle now.
	pub async fn run_check_predecessor(&self) -> Result<()> {
		maintenance::check_predecessor(&self.shared).await
	}

	/// Resolves once the node has lost ring connectivity for good. The
	/// embedding application decides whether to re-bootstrap or shut down.
	pub async fn ring_fault(&self) {
		let mut fault = self.fault.clone();
		while !*fault.borrow() {
			if fault.changed().await.is_err() {
				return;
			}
		}
	}

	/// Force the node to stop.
	pub async fn stop(self) {
		for task in &self.tasks {
			task.abort();
		}
		for task in self.tasks {
			let _ = task.await;
		}
	}
}
