use std::fmt;

use num_bigint::{BigUint, RandBigInt};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// A position on the ring: an unsigned integer of a fixed bit length, with
/// all arithmetic taken modulo `2^bits`. Every id in one deployment shares
/// the same bit length; comparing ids of different bit lengths is a
/// programming error and panics.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RingId {
	bits: u32,
	value: BigUint,
}

impl RingId {
	pub fn new(bits: u32, value: impl Into<BigUint>) -> RingId {
		assert!(bits > 0, "ring ids need at least one bit");
		let value = value.into() % Self::modulus(bits);
		RingId { bits, value }
	}

	/// A uniformly random id of the given bit length.
	pub fn random(bits: u32) -> RingId {
		assert!(bits > 0, "ring ids need at least one bit");
		let mut rng = rand::thread_rng();
		let value = rng.gen_biguint_below(&Self::modulus(bits));
		RingId { bits, value }
	}

	fn modulus(bits: u32) -> BigUint {
		BigUint::from(1u8) << bits
	}

	pub fn bits(&self) -> u32 {
		self.bits
	}

	pub fn value(&self) -> &BigUint {
		&self.value
	}

	/// Expected id of finger slot `index`: `self + 2^index`, wrapped.
	pub fn finger_id(&self, index: u32) -> RingId {
		assert!(
			index < self.bits,
			"finger index {} out of range for {} bit ids",
			index,
			self.bits
		);
		let value = (&self.value + (BigUint::from(1u8) << index)) % Self::modulus(self.bits);
		RingId {
			bits: self.bits,
			value,
		}
	}

	/// Clockwise distance walked from `origin` to reach this id.
	pub fn distance_from(&self, origin: &RingId) -> BigUint {
		self.assert_same_bits(origin);
		if self.value >= origin.value {
			&self.value - &origin.value
		} else {
			Self::modulus(self.bits) - &origin.value + &self.value
		}
	}

	/// Checked bit-length comparison for ids arriving from remote peers.
	pub fn ensure_same_bits(&self, other: &RingId) -> Result<()> {
		if self.bits == other.bits {
			Ok(())
		} else {
			Err(Error::BitLengthMismatch {
				left: self.bits,
				right: other.bits,
			})
		}
	}

	fn assert_same_bits(&self, other: &RingId) {
		assert_eq!(
			self.bits, other.bits,
			"ring ids of different bit lengths compared"
		);
	}

	/// Tests whether this id lies on the ring between `start` and `end`,
	/// walking clockwise, with the given inclusivity at each bound. Handles
	/// wraparound when the interval crosses zero.
	///
	/// `start == end` is the degenerate interval: the single point `start`
	/// if either bound is inclusive, and empty if both bounds are exclusive.
	/// It never denotes the full ring.
	pub fn is_within(
		&self,
		start: &RingId,
		start_inclusive: bool,
		end: &RingId,
		end_inclusive: bool,
	) -> bool {
		self.assert_same_bits(start);
		self.assert_same_bits(end);

		if start.value == end.value {
			return (start_inclusive || end_inclusive) && self.value == start.value;
		}

		let above_start = if start_inclusive {
			self.value >= start.value
		} else {
			self.value > start.value
		};
		let below_end = if end_inclusive {
			self.value <= end.value
		} else {
			self.value < end.value
		};

		if start.value < end.value {
			above_start && below_end
		} else {
			// the interval wraps past zero: [start, MAX] joined with [0, end]
			above_start || below_end
		}
	}
}

impl fmt::Debug for RingId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}b", self.value, self.bits)
	}
}

impl fmt::Display for RingId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.value)
	}
}

impl Serialize for RingId {
	fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		(self.bits, self.value.to_u32_digits()).serialize(serializer)
	}
}

impl<'de> Deserialize<'de> for RingId {
	fn deserialize<D>(deserializer: D) -> std::result::Result<RingId, D::Error>
	where
		D: Deserializer<'de>,
	{
		let (bits, digits) = <(u32, Vec<u32>)>::deserialize(deserializer)?;
		if bits == 0 {
			return Err(serde::de::Error::custom("ring id with zero bit length"));
		}
		Ok(RingId::new(bits, BigUint::new(digits)))
	}
}
