use tracing::debug;

use super::message::{Request, Response};
use super::{router, NodeShared};
use crate::error::{Error, Result};
use crate::pointer::{LinkRef, Pointer};

/// Bootstrap this node's tables off an existing ring member.
///
/// Every expected finger id is resolved through the bootstrap peer with the
/// RPC-only routing variant, then inserted. Any RPC failure is fatal to the
/// whole attempt: the node does not partially join, and nothing is retried
/// here. The caller decides whether to try again, with this peer or another.
pub(crate) async fn join(node: &NodeShared, bootstrap: LinkRef) -> Result<()> {
	populate(node, bootstrap)
		.await
		.map_err(|err| Error::JoinFailed(Box::new(err)))
}

async fn populate(node: &NodeShared, bootstrap: LinkRef) -> Result<()> {
	let own = node.own_id();

	let boot_id = match node.request(bootstrap, Request::GetId).await? {
		Response::Id { id } => id,
		_ => return Err(Error::UnexpectedResponse),
	};
	own.ensure_same_bits(&boot_id)?;
	let boot = Pointer::External {
		id: boot_id,
		link: bootstrap,
	};
	debug!("joining via bootstrap {boot:?}");

	for index in 0..own.bits() {
		let expected = own.finger_id(index);
		let finger = router::find_successor_from(node, boot.clone(), &expected).await?;
		if finger.id() != &own {
			node.state().put_finger(finger);
		}
	}

	// Best-effort announcement to the node now behind us: it may want us in
	// its finger table right away, and it forwards the news to the nodes
	// behind it in turn. Stabilize makes this reliable later.
	let predecessor = node.state().predecessor().cloned();
	if let Some(Pointer::External { link, .. }) = predecessor {
		node.adaptor.send_forget(
			link,
			Request::UpdateFingerTable {
				candidate: own,
				link: None,
			},
		);
	}

	Ok(())
}
