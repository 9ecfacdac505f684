use std::sync::Arc;
use std::time::Duration;

use chord_ring::{Chord, ChordConfig, ChordHandle, LinkRef, MemNetwork, RingId};

pub const BITS: u32 = 3;

/// Config for test rings: short timeouts, no timers. Maintenance cycles are
/// driven manually so the tests stay deterministic instead of sleeping.
pub fn test_config() -> ChordConfig {
	ChordConfig {
		rpc_timeout: Duration::from_millis(200),
		rpc_retries: 1,
		stabilize_interval: None,
		fix_finger_interval: None,
		check_predecessor_interval: None,
		..ChordConfig::default()
	}
}

pub struct TestNode {
	pub handle: ChordHandle,
	pub link: LinkRef,
}

pub async fn start_node(network: &Arc<MemNetwork>, id: u64, bootstrap: Option<LinkRef>) -> TestNode {
	let adaptor = MemNetwork::adaptor(network);
	let link = adaptor.link();
	let mut chord = Chord::new(RingId::new(BITS, id), adaptor);
	chord.set_config(test_config());
	let handle = chord.start(bootstrap).await.expect("node should start");
	TestNode { handle, link }
}

/// Assemble a ring: the first id hosts, the rest join off it in turn, then
/// maintenance runs until the ring has converged.
pub async fn make_ring(network: &Arc<MemNetwork>, ids: &[u64]) -> Vec<TestNode> {
	let mut nodes: Vec<TestNode> = Vec::new();
	for (index, id) in ids.iter().enumerate() {
		let bootstrap = if index == 0 { None } else { Some(nodes[0].link) };
		nodes.push(start_node(network, *id, bootstrap).await);
	}
	settle(&nodes).await;
	nodes
}

/// Drive stabilize, fix-finger and check-predecessor rounds across every
/// node, enough for a small ring to converge.
pub async fn settle(nodes: &[TestNode]) {
	for _ in 0..nodes.len() + 2 {
		for node in nodes {
			let _ = node.handle.run_stabilize().await;
			for _ in 0..BITS {
				let _ = node.handle.run_fix_finger().await;
			}
			let _ = node.handle.run_check_predecessor().await;
		}
	}
}

pub async fn stop_all(nodes: Vec<TestNode>) {
	for node in nodes {
		node.handle.stop().await;
	}
}
