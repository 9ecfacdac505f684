//! Chord ring routing: a self-organizing ring of nodes that cooperatively
//! route lookups to the node responsible for any identifier, and that repair
//! themselves as nodes join and leave.

pub mod chord;
pub use chord::{Chord, ChordConfig, ChordHandle};

pub mod adaptor;
pub use adaptor::mem_adaptor::{MemAdaptor, MemNetwork};
pub use adaptor::udp_adaptor::UdpAdaptor;
pub use adaptor::ChordAdaptor;

mod ring_id;
pub use ring_id::RingId;

mod pointer;
pub use pointer::{LinkRef, Pointer};

mod finger_table;
pub use finger_table::FingerTable;

mod successor_table;
pub use successor_table::SuccessorTable;

mod error;
pub use error::{Error, Result};
