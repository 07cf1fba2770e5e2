//! Offer records, hashing, scaling and merging.

use primitive_types::U512;
use serde::{Deserialize, Serialize};

use crate::error::{OfferError, OfferResult};
use crate::primitives::{keccak256, Address, Hash256, U256};

/// A maker's willingness to give `gives_amount` of `gives_token` in exchange
/// for `gets_amount` of `gets_token`.
///
/// The zero address stands for the chain's native currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Offer {
    pub gives_token: Address,
    pub gets_token: Address,
    pub gives_amount: U256,
    pub gets_amount: U256,
}

impl Offer {
    pub fn new(
        gives_token: Address,
        gets_token: Address,
        gives_amount: impl Into<U256>,
        gets_amount: impl Into<U256>,
    ) -> Self {
        Self {
            gives_token,
            gets_token,
            gives_amount: gives_amount.into(),
            gets_amount: gets_amount.into(),
        }
    }

    /// Packed keccak hash over `(gives_token, gets_token, gives_amount, gets_amount)`.
    ///
    /// Matches `keccak256(abi.encodePacked(address, address, uint256, uint256))`.
    pub fn hash(&self) -> Hash256 {
        let mut packed = [0u8; 104];
        packed[..20].copy_from_slice(self.gives_token.as_bytes());
        packed[20..40].copy_from_slice(self.gets_token.as_bytes());
        self.gives_amount.to_big_endian(&mut packed[40..72]);
        self.gets_amount.to_big_endian(&mut packed[72..104]);
        keccak256(&packed)
    }

    /// Pro-rate this offer to a fill of `amount` units of `gets_token`.
    ///
    /// `gives_amount` rounds toward zero. The product is taken in 512 bits so
    /// large amounts never overflow in the intermediate step.
    pub fn scale(&self, amount: U256) -> OfferResult<Offer> {
        if amount > self.gets_amount || self.gets_amount.is_zero() {
            return Err(OfferError::CapacityExceeded {
                requested: amount,
                available: self.gets_amount,
            });
        }

        let product = self.gives_amount.full_mul(amount);
        let quotient = product / U512::from(self.gets_amount);
        let gives_amount = U256::try_from(quotient).map_err(|_| OfferError::Overflow)?;

        Ok(Offer {
            gives_amount,
            gets_amount: amount,
            ..*self
        })
    }

    /// True when both offers trade the same ordered token pair.
    pub fn same_pair(&self, other: &Offer) -> bool {
        self.gives_token == other.gives_token && self.gets_token == other.gets_token
    }

    /// Sum a batch of same-pair offers into the single quantity settled on-chain.
    pub fn merge(offers: &[Offer]) -> OfferResult<Offer> {
        let (first, rest) = offers.split_first().ok_or(OfferError::Empty)?;

        if rest.iter().any(|offer| !offer.same_pair(first)) {
            return Err(OfferError::MixedPair);
        }

        rest.iter().try_fold(*first, |acc, offer| {
            Ok(Offer {
                gives_amount: acc
                    .gives_amount
                    .checked_add(offer.gives_amount)
                    .ok_or(OfferError::Overflow)?,
                gets_amount: acc
                    .gets_amount
                    .checked_add(offer.gets_amount)
                    .ok_or(OfferError::Overflow)?,
                ..acc
            })
        })
    }
}

/// One entry of a batch fill: take `amount` of the referenced offer's
/// `gets_amount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    pub offer_hash: Hash256,
    pub amount: U256,
}

impl Fill {
    pub fn new(offer_hash: Hash256, amount: impl Into<U256>) -> Self {
        Self {
            offer_hash,
            amount: amount.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t1() -> Address {
        Address::repeat_byte(0x11)
    }

    fn t2() -> Address {
        Address::repeat_byte(0x22)
    }

    fn sample() -> Offer {
        Offer::new(t1(), t2(), 100u64, 50u64)
    }

    #[test]
    fn test_hash_reference_vector() {
        assert_eq!(
            hex::encode(sample().hash().as_bytes()),
            "4e7997f78c3c1e946f7bf4328aed494049b6e5917d54a513bafc67e131a5ec5b"
        );
    }

    #[test]
    fn test_hash_stable_and_field_sensitive() {
        let offer = sample();
        assert_eq!(offer.hash(), offer.hash());

        let swapped = Offer::new(t2(), t1(), 100u64, 50u64);
        assert_ne!(offer.hash(), swapped.hash());

        let bumped = Offer::new(t1(), t2(), 101u64, 50u64);
        assert_ne!(offer.hash(), bumped.hash());
    }

    #[test]
    fn test_scale_full_amount_is_identity() {
        let offer = sample();
        assert_eq!(offer.scale(U256::from(50)).unwrap(), offer);
    }

    #[test]
    fn test_scale_partial_fill() {
        let scaled = sample().scale(U256::from(25)).unwrap();
        assert_eq!(scaled.gives_amount, U256::from(50));
        assert_eq!(scaled.gets_amount, U256::from(25));
        assert_eq!(scaled.gives_token, t1());
        assert_eq!(scaled.gets_token, t2());
    }

    #[test]
    fn test_scale_truncates_toward_zero() {
        let offer = Offer::new(t1(), t2(), 10u64, 3u64);
        // 10 * 2 / 3 = 6.66..
        assert_eq!(offer.scale(U256::from(2)).unwrap().gives_amount, U256::from(6));
        assert_eq!(offer.scale(U256::zero()).unwrap().gives_amount, U256::zero());
    }

    #[test]
    fn test_scale_large_amounts_do_not_overflow() {
        let offer = Offer::new(t1(), t2(), U256::MAX, U256::MAX);
        let half = U256::MAX / 2;
        assert_eq!(offer.scale(half).unwrap().gives_amount, half);
    }

    #[test]
    fn test_scale_rejects_excess() {
        let err = sample().scale(U256::from(51)).unwrap_err();
        assert_eq!(
            err,
            OfferError::CapacityExceeded {
                requested: U256::from(51),
                available: U256::from(50),
            }
        );
    }

    #[test]
    fn test_scale_rejects_zero_capacity() {
        let offer = Offer::new(t1(), t2(), 10u64, 0u64);
        assert!(matches!(
            offer.scale(U256::zero()),
            Err(OfferError::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn test_merge_sums_amounts() {
        let merged = Offer::merge(&[
            Offer::new(t1(), t2(), 100u64, 50u64),
            Offer::new(t1(), t2(), 7u64, 3u64),
        ])
        .unwrap();
        assert_eq!(merged, Offer::new(t1(), t2(), 107u64, 53u64));
    }

    #[test]
    fn test_merge_single_offer() {
        assert_eq!(Offer::merge(&[sample()]).unwrap(), sample());
    }

    #[test]
    fn test_merge_rejects_mixed_pair() {
        let offers = [sample(), Offer::new(t1(), Address::repeat_byte(0x33), 1u64, 1u64)];
        let before = offers;
        assert_eq!(Offer::merge(&offers), Err(OfferError::MixedPair));
        assert_eq!(offers, before);
    }

    #[test]
    fn test_merge_rejects_empty() {
        assert_eq!(Offer::merge(&[]), Err(OfferError::Empty));
    }

    #[test]
    fn test_merge_overflow() {
        let big = Offer::new(t1(), t2(), U256::MAX, 1u64);
        assert_eq!(Offer::merge(&[big, big]), Err(OfferError::Overflow));
    }

    #[test]
    fn test_offer_serde() {
        let json = serde_json::to_string(&sample()).unwrap();
        let back: Offer = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample());
    }
}
