mod common;

use std::time::Duration;

use chord_ring::{Chord, Error, MemNetwork, RingId};
use common::BITS;

fn id(v: u64) -> RingId {
	RingId::new(BITS, v)
}

#[tokio::test]
async fn sole_node_points_at_itself() {
	let network = MemNetwork::new();
	let node = common::start_node(&network, 0, None).await;

	assert!(node.handle.predecessor().is_none());
	assert!(node.handle.successor().is_internal());
	assert!(node.handle.fingers().iter().all(|f| f.is_internal()));

	// with nobody else around, every key belongs to this node
	let found = node.handle.lookup(id(5)).await.expect("lookup should resolve");
	assert_eq!(found.id(), &id(0));

	node.handle.stop().await;
}

#[tokio::test]
async fn eight_node_ring_converges() {
	let network = MemNetwork::new();
	let ids: Vec<u64> = (0..8).collect();
	let nodes = common::make_ring(&network, &ids).await;

	for (index, node) in nodes.iter().enumerate() {
		let expected_succ = id((index as u64 + 1) % 8);
		let expected_pred = id((index as u64 + 7) % 8);
		assert_eq!(
			node.handle.successor().id(),
			&expected_succ,
			"successor of node {index}"
		);
		let pred = node
			.handle
			.predecessor()
			.expect("every node should know a predecessor");
		assert_eq!(pred.id(), &expected_pred, "predecessor of node {index}");
	}

	// a lookup issued at node 2 resolves to node 5's pointer
	let found = nodes[2]
		.handle
		.lookup(id(5))
		.await
		.expect("lookup should resolve");
	assert_eq!(found.id(), &id(5));

	// and the node before a key answers predecessor lookups
	let before = nodes[2]
		.handle
		.lookup_predecessor(id(5))
		.await
		.expect("predecessor lookup should resolve");
	assert_eq!(before.id(), &id(4));

	common::stop_all(nodes).await;
}

#[tokio::test]
async fn tables_respect_invariants_after_convergence() {
	let network = MemNetwork::new();
	let nodes = common::make_ring(&network, &[0, 2, 4, 6]).await;

	for node in &nodes {
		let own = node.handle.id();
		let pred = node.handle.predecessor().expect("predecessor known");

		// finger slot 0 mirrors the successor table head
		let head = node
			.handle
			.successor_list()
			.first()
			.cloned()
			.expect("successor known");
		assert_eq!(node.handle.successor(), head);

		// no entry lies strictly past the predecessor
		for entry in node
			.handle
			.fingers()
			.into_iter()
			.chain(node.handle.successor_list())
		{
			if entry.is_external() {
				assert!(
					!entry.id().is_within(pred.id(), false, &own, false),
					"entry {:?} of node {} lies past predecessor {}",
					entry,
					own,
					pred.id()
				);
			}
		}
	}

	common::stop_all(nodes).await;
}

#[tokio::test]
async fn lookup_cost_stays_logarithmic() {
	let network = MemNetwork::new();
	let ids: Vec<u64> = (0..8).collect();
	let nodes = common::make_ring(&network, &ids).await;

	let before = network.request_count();
	let found = nodes[1]
		.handle
		.lookup(id(6))
		.await
		.expect("lookup should resolve");
	assert_eq!(found.id(), &id(6));
	let spent = network.request_count() - before;

	// each routing step costs at most two exchanges, plus the final
	// successor fetch
	assert!(
		spent <= (2 * BITS + 2) as usize,
		"lookup used {spent} exchanges"
	);

	common::stop_all(nodes).await;
}

#[tokio::test]
async fn ring_heals_after_node_failure() {
	let network = MemNetwork::new();
	let ids: Vec<u64> = (0..8).collect();
	let mut nodes = common::make_ring(&network, &ids).await;

	// node 3 stops answering
	let dead = nodes.remove(3);
	network.disconnect(dead.link);
	dead.handle.stop().await;

	// one stabilize cycle moves node 2 off the dead successor
	nodes[2]
		.handle
		.run_stabilize()
		.await
		.expect("stabilize should recover");
	assert_eq!(nodes[2].handle.successor().id(), &id(4));

	// one check-predecessor cycle clears the dead predecessor at node 4
	nodes[3]
		.handle
		.run_check_predecessor()
		.await
		.expect("check-predecessor should not fail the node");
	assert!(nodes[3].handle.predecessor().is_none());

	// further cycles repair the remaining fingers
	common::settle(&nodes).await;

	let remaining: Vec<u64> = vec![0, 1, 2, 4, 5, 6, 7];
	for (index, node) in nodes.iter().enumerate() {
		let succ = remaining[(index + 1) % remaining.len()];
		let pred = remaining[(index + remaining.len() - 1) % remaining.len()];
		assert_eq!(
			node.handle.successor().id(),
			&id(succ),
			"successor of node {}",
			remaining[index]
		);
		assert_eq!(
			node.handle.predecessor().expect("predecessor known").id(),
			&id(pred),
			"predecessor of node {}",
			remaining[index]
		);

		// nothing points at the dead node anymore
		for entry in node
			.handle
			.fingers()
			.into_iter()
			.chain(node.handle.successor_list())
		{
			assert!(entry.id() != &id(3), "stale pointer at node {}", remaining[index]);
		}
	}

	// the dead node's keys now belong to its old successor
	let found = nodes[0]
		.handle
		.lookup(id(3))
		.await
		.expect("lookup should resolve");
	assert_eq!(found.id(), &id(4));

	common::stop_all(nodes).await;
}

#[tokio::test]
async fn join_against_dead_bootstrap_fails() {
	let network = MemNetwork::new();
	let host = common::start_node(&network, 0, None).await;
	let dead_link = host.link;
	network.disconnect(dead_link);
	host.handle.stop().await;

	let adaptor = MemNetwork::adaptor(&network);
	let mut chord = Chord::new(id(1), adaptor);
	chord.set_config(common::test_config());
	let err = chord
		.start(Some(dead_link))
		.await
		.err()
		.expect("join should fail");
	assert!(matches!(err, Error::JoinFailed(_)));
}

#[tokio::test]
async fn losing_every_successor_is_fatal() {
	let network = MemNetwork::new();
	let mut nodes = common::make_ring(&network, &[0, 4]).await;

	let dead = nodes.remove(1);
	network.disconnect(dead.link);
	dead.handle.stop().await;

	// the only successor is gone and there is no fallback left
	let err = nodes[0]
		.handle
		.run_stabilize()
		.await
		.err()
		.expect("stabilize should fail for good");
	assert!(matches!(err, Error::SuccessorsExhausted));

	// the fault signal fires for the embedding application
	tokio::time::timeout(Duration::from_secs(1), nodes[0].handle.ring_fault())
		.await
		.expect("fault signal should fire");

	common::stop_all(nodes).await;
}
