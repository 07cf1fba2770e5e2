//! Key material produced by key generation.

use serde::{Deserialize, Serialize};

use crate::error::{TssError, TssResult};

/// Which side of the two-party protocol a share belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Party {
    /// Runs the initiator half of both sub-protocols (the taker).
    One,
    /// Runs the responder half (the maker).
    Two,
}

/// One party's share of a jointly generated secp256k1 key.
#[derive(Clone, Serialize, Deserialize)]
pub struct KeyShare {
    pub party: Party,
    /// Joint public key, compressed SEC1.
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
    /// Scheme-specific secret material.
    #[serde(with = "hex_bytes")]
    pub secret: Vec<u8>,
}

impl KeyShare {
    pub fn to_json(&self) -> TssResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> TssResult<Self> {
        let share: KeyShare = serde_json::from_str(json)?;
        if share.public_key.is_empty() {
            return Err(TssError::InvalidKeyShare("missing public key".into()));
        }
        Ok(share)
    }
}

// Never print secret material.
impl std::fmt::Debug for KeyShare {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyShare")
            .field("party", &self.party)
            .field("public_key", &hex::encode(&self.public_key))
            .finish_non_exhaustive()
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        hex::encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_roundtrip_keeps_hex() {
        let share = KeyShare {
            party: Party::Two,
            public_key: vec![2; 33],
            secret: vec![0xab; 32],
        };
        let json = share.to_json().unwrap();
        assert!(json.contains(&"ab".repeat(32)));
        let back = KeyShare::from_json(&json).unwrap();
        assert_eq!(back.party, Party::Two);
        assert_eq!(back.secret, share.secret);
    }

    #[test]
    fn test_debug_hides_secret() {
        let share = KeyShare {
            party: Party::One,
            public_key: vec![3; 33],
            secret: vec![0xcd; 32],
        };
        assert!(!format!("{:?}", share).contains("cdcd"));
    }

    #[test]
    fn test_rejects_empty_public_key() {
        let json = r#"{"party":"One","public_key":"","secret":"00"}"#;
        assert!(KeyShare::from_json(json).is_err());
    }
}
