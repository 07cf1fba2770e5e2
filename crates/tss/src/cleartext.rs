//! Two-party ECDSA that exchanges share material in the clear.
//!
//! Produces ordinary secp256k1 signatures under an additively shared key
//! (`Q = (x1 + x2)·G`) with a multiplicatively shared nonce
//! (`R = k1·k2·G`). Commitments keep either party from choosing its public
//! contribution after seeing the other's, but the responder learns `x1` and
//! `k1` in message F and so could sign alone afterwards. Suitable for tests
//! and private devnets only.

use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use k256::elliptic_curve::group::Group;
use k256::elliptic_curve::ops::Reduce;
use k256::elliptic_curve::point::AffineCoordinates;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::PrimeField;
use k256::{FieldBytes, NonZeroScalar, ProjectivePoint, PublicKey, Scalar};
use rand::rngs::OsRng;
use sha3::{Digest, Keccak256};
use tracing::debug;

use crate::error::{TssError, TssResult};
use crate::share::{KeyShare, Party};
use crate::traits::{
    KeygenInitiator, KeygenResponder, RawSignature, SignInitiator, SignResponder, TwoPartyEcdsa,
};

const POINT_LEN: usize = 33;
const SCALAR_LEN: usize = 32;

#[derive(Debug, Clone, Copy, Default)]
pub struct CleartextEcdsa;

impl TwoPartyEcdsa for CleartextEcdsa {
    fn keygen_initiator(&self) -> Box<dyn KeygenInitiator> {
        Box::<CleartextKeygenInitiator>::default()
    }

    fn keygen_responder(&self) -> Box<dyn KeygenResponder> {
        Box::<CleartextKeygenResponder>::default()
    }

    fn sign_initiator(&self, share: &KeyShare, hash: [u8; 32]) -> TssResult<Box<dyn SignInitiator>> {
        let (secret, public) = open_share(share, Party::One)?;
        Ok(Box::new(CleartextSignInitiator {
            secret,
            public,
            hash,
            nonce: None,
            signature: None,
        }))
    }

    fn sign_responder(&self, share: &KeyShare, hash: [u8; 32]) -> TssResult<Box<dyn SignResponder>> {
        let (secret, public) = open_share(share, Party::Two)?;
        Ok(Box::new(CleartextSignResponder {
            secret,
            public,
            hash,
            state: None,
        }))
    }
}

fn random_scalar() -> Scalar {
    *NonZeroScalar::random(&mut OsRng)
}

fn commit(bytes: &[u8]) -> [u8; 32] {
    Keccak256::digest(bytes).into()
}

fn encode_point(point: &ProjectivePoint) -> Vec<u8> {
    point.to_affine().to_encoded_point(true).as_bytes().to_vec()
}

fn decode_point(bytes: &[u8], step: &'static str) -> TssResult<ProjectivePoint> {
    PublicKey::from_sec1_bytes(bytes)
        .map(|key| key.to_projective())
        .map_err(|e| TssError::InvalidMessage {
            step,
            reason: format!("bad point: {}", e),
        })
}

fn decode_scalar(bytes: &[u8], step: &'static str) -> TssResult<Scalar> {
    if bytes.len() != SCALAR_LEN {
        return Err(TssError::InvalidMessage {
            step,
            reason: format!("scalar is {} bytes", bytes.len()),
        });
    }
    Option::<Scalar>::from(Scalar::from_repr(*FieldBytes::from_slice(bytes))).ok_or_else(|| {
        TssError::InvalidMessage {
            step,
            reason: "scalar out of range".into(),
        }
    })
}

fn expect_len(bytes: &[u8], len: usize, step: &'static str) -> TssResult<()> {
    if bytes.len() == len {
        Ok(())
    } else {
        Err(TssError::InvalidMessage {
            step,
            reason: format!("expected {} bytes, got {}", len, bytes.len()),
        })
    }
}

fn open_share(share: &KeyShare, party: Party) -> TssResult<(Scalar, ProjectivePoint)> {
    if share.party != party {
        return Err(TssError::InvalidKeyShare(format!(
            "share belongs to {:?}, session needs {:?}",
            share.party, party
        )));
    }
    let secret = decode_scalar(&share.secret, "key share")
        .map_err(|e| TssError::InvalidKeyShare(e.to_string()))?;
    let public = decode_point(&share.public_key, "key share")
        .map_err(|e| TssError::InvalidKeyShare(e.to_string()))?;
    Ok((secret, public))
}

fn export(party: Party, secret: &Scalar, joint: &ProjectivePoint) -> TssResult<KeyShare> {
    if bool::from(joint.is_identity()) {
        return Err(TssError::InconsistentShare);
    }
    Ok(KeyShare {
        party,
        public_key: encode_point(joint),
        secret: secret.to_repr().to_vec(),
    })
}

fn strip_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes[start..].to_vec()
}

#[derive(Default)]
struct CleartextKeygenInitiator {
    secret: Option<Scalar>,
    joint: Option<ProjectivePoint>,
}

impl KeygenInitiator for CleartextKeygenInitiator {
    /// Message A: commitment to `X1`.
    fn step1(&mut self) -> TssResult<Vec<u8>> {
        if self.secret.is_some() {
            return Err(TssError::OutOfOrder("keygen initiator step1"));
        }
        let secret = random_scalar();
        let point = encode_point(&(ProjectivePoint::GENERATOR * secret));
        self.secret = Some(secret);
        Ok(commit(&point).to_vec())
    }

    /// Message C: opens the commitment.
    fn step2(&mut self, msg_b: &[u8]) -> TssResult<Vec<u8>> {
        let secret = self
            .secret
            .ok_or(TssError::OutOfOrder("keygen initiator step2"))?;
        if self.joint.is_some() {
            return Err(TssError::OutOfOrder("keygen initiator step2"));
        }
        expect_len(msg_b, POINT_LEN, "keygen B")?;
        let theirs = decode_point(msg_b, "keygen B")?;
        let ours = ProjectivePoint::GENERATOR * secret;
        self.joint = Some(ours + theirs);
        debug!("keygen initiator derived joint key");
        Ok(encode_point(&ours))
    }

    fn export_key_share(&self) -> TssResult<KeyShare> {
        match (self.secret, self.joint) {
            (Some(secret), Some(joint)) => export(Party::One, &secret, &joint),
            _ => Err(TssError::OutOfOrder("keygen initiator export")),
        }
    }
}

#[derive(Default)]
struct CleartextKeygenResponder {
    commitment: Option<[u8; 32]>,
    secret: Option<Scalar>,
    joint: Option<ProjectivePoint>,
}

impl KeygenResponder for CleartextKeygenResponder {
    /// Message B: `X2` in the clear.
    fn step1(&mut self, msg_a: &[u8]) -> TssResult<Vec<u8>> {
        if self.commitment.is_some() {
            return Err(TssError::OutOfOrder("keygen responder step1"));
        }
        expect_len(msg_a, 32, "keygen A")?;
        let mut commitment = [0u8; 32];
        commitment.copy_from_slice(msg_a);
        let secret = random_scalar();
        self.commitment = Some(commitment);
        self.secret = Some(secret);
        Ok(encode_point(&(ProjectivePoint::GENERATOR * secret)))
    }

    fn step2(&mut self, msg_c: &[u8]) -> TssResult<()> {
        let (commitment, secret) = match (self.commitment, self.secret) {
            (Some(c), Some(s)) if self.joint.is_none() => (c, s),
            _ => return Err(TssError::OutOfOrder("keygen responder step2")),
        };
        expect_len(msg_c, POINT_LEN, "keygen C")?;
        if commit(msg_c) != commitment {
            return Err(TssError::CommitmentMismatch("keygen C"));
        }
        let theirs = decode_point(msg_c, "keygen C")?;
        self.joint = Some(theirs + ProjectivePoint::GENERATOR * secret);
        debug!("keygen responder derived joint key");
        Ok(())
    }

    fn export_key_share(&self) -> TssResult<KeyShare> {
        match (self.secret, self.joint) {
            (Some(secret), Some(joint)) => export(Party::Two, &secret, &joint),
            _ => Err(TssError::OutOfOrder("keygen responder export")),
        }
    }
}

struct CleartextSignInitiator {
    secret: Scalar,
    public: ProjectivePoint,
    hash: [u8; 32],
    nonce: Option<Scalar>,
    signature: Option<(Signature, RecoveryId)>,
}

impl SignInitiator for CleartextSignInitiator {
    /// Message D: commitment to `R1`.
    fn step1(&mut self) -> TssResult<Vec<u8>> {
        if self.nonce.is_some() {
            return Err(TssError::OutOfOrder("sign initiator step1"));
        }
        let nonce = random_scalar();
        self.nonce = Some(nonce);
        Ok(commit(&encode_point(&(ProjectivePoint::GENERATOR * nonce))).to_vec())
    }

    /// Message F: `R1 ‖ k1 ‖ x1`.
    fn step2(&mut self, msg_e: &[u8]) -> TssResult<Vec<u8>> {
        let nonce = self.nonce.ok_or(TssError::OutOfOrder("sign initiator step2"))?;
        expect_len(msg_e, POINT_LEN, "sign E")?;
        decode_point(msg_e, "sign E")?;

        let mut msg_f = encode_point(&(ProjectivePoint::GENERATOR * nonce));
        msg_f.extend_from_slice(&nonce.to_repr());
        msg_f.extend_from_slice(&self.secret.to_repr());
        Ok(msg_f)
    }

    /// Checks the joint signature in message G against the joint key.
    fn step3(&mut self, msg_g: &[u8]) -> TssResult<()> {
        if self.nonce.is_none() || self.signature.is_some() {
            return Err(TssError::OutOfOrder("sign initiator step3"));
        }
        expect_len(msg_g, 65, "sign G")?;
        let signature = Signature::from_slice(&msg_g[..64]).map_err(|e| TssError::InvalidMessage {
            step: "sign G",
            reason: e.to_string(),
        })?;
        let recovery_id = RecoveryId::from_byte(msg_g[64]).ok_or_else(|| TssError::InvalidMessage {
            step: "sign G",
            reason: format!("recovery id {}", msg_g[64]),
        })?;

        let key = VerifyingKey::from_affine(self.public.to_affine())
            .map_err(|e| TssError::InvalidKeyShare(e.to_string()))?;
        key.verify_prehash(&self.hash, &signature)
            .map_err(|e| TssError::InvalidSignature(e.to_string()))?;
        let recovered = VerifyingKey::recover_from_prehash(&self.hash, &signature, recovery_id)
            .map_err(|e| TssError::InvalidSignature(e.to_string()))?;
        if recovered != key {
            return Err(TssError::InvalidSignature("recovery id does not match".into()));
        }
        self.signature = Some((signature, recovery_id));
        Ok(())
    }

    fn export_signature(&self) -> TssResult<RawSignature> {
        let (signature, recovery_id) = self
            .signature
            .ok_or(TssError::OutOfOrder("sign initiator export"))?;
        let bytes = signature.to_bytes();
        Ok(RawSignature {
            r: strip_leading_zeros(&bytes[..32]),
            s: strip_leading_zeros(&bytes[32..]),
            recovery_id: recovery_id.to_byte(),
        })
    }
}

struct SignResponderState {
    commitment: [u8; 32],
    nonce: Scalar,
    done: bool,
}

struct CleartextSignResponder {
    secret: Scalar,
    public: ProjectivePoint,
    hash: [u8; 32],
    state: Option<SignResponderState>,
}

impl SignResponder for CleartextSignResponder {
    /// Message E: `R2` in the clear.
    fn step1(&mut self, msg_d: &[u8]) -> TssResult<Vec<u8>> {
        if self.state.is_some() {
            return Err(TssError::OutOfOrder("sign responder step1"));
        }
        expect_len(msg_d, 32, "sign D")?;
        let mut commitment = [0u8; 32];
        commitment.copy_from_slice(msg_d);
        let nonce = random_scalar();
        self.state = Some(SignResponderState {
            commitment,
            nonce,
            done: false,
        });
        Ok(encode_point(&(ProjectivePoint::GENERATOR * nonce)))
    }

    /// Message G: `r ‖ s ‖ recovery id` with low `s`.
    fn step2(&mut self, msg_f: &[u8]) -> TssResult<Vec<u8>> {
        let state = match self.state.as_mut() {
            Some(state) if !state.done => state,
            _ => return Err(TssError::OutOfOrder("sign responder step2")),
        };
        expect_len(msg_f, POINT_LEN + 2 * SCALAR_LEN, "sign F")?;
        let (r1_bytes, rest) = msg_f.split_at(POINT_LEN);
        if commit(r1_bytes) != state.commitment {
            return Err(TssError::CommitmentMismatch("sign F"));
        }
        let r1 = decode_point(r1_bytes, "sign F")?;
        let k1 = decode_scalar(&rest[..SCALAR_LEN], "sign F")?;
        let x1 = decode_scalar(&rest[SCALAR_LEN..], "sign F")?;
        if ProjectivePoint::GENERATOR * k1 != r1 {
            return Err(TssError::InvalidMessage {
                step: "sign F",
                reason: "nonce does not match its commitment".into(),
            });
        }
        let x = x1 + self.secret;
        if ProjectivePoint::GENERATOR * x != self.public {
            return Err(TssError::InconsistentShare);
        }

        let k = k1 * state.nonce;
        let big_r = (ProjectivePoint::GENERATOR * k).to_affine();
        let r = <Scalar as Reduce<k256::U256>>::reduce_bytes(&big_r.x());
        let m = <Scalar as Reduce<k256::U256>>::reduce_bytes(FieldBytes::from_slice(&self.hash));
        let k_inv = Option::<Scalar>::from(k.invert())
            .ok_or_else(|| TssError::InvalidSignature("zero nonce".into()))?;
        let s = k_inv * (m + r * x);

        let mut rs = [0u8; 64];
        rs[..32].copy_from_slice(&r.to_repr());
        rs[32..].copy_from_slice(&s.to_repr());
        let signature =
            Signature::from_slice(&rs).map_err(|e| TssError::InvalidSignature(e.to_string()))?;
        let signature = signature.normalize_s().unwrap_or(signature);

        let key = VerifyingKey::from_affine(self.public.to_affine())
            .map_err(|e| TssError::InvalidKeyShare(e.to_string()))?;
        let recovery_id = RecoveryId::trial_recovery_from_prehash(&key, &self.hash, &signature)
            .map_err(|e| TssError::InvalidSignature(e.to_string()))?;
        state.done = true;
        debug!(recovery_id = recovery_id.to_byte(), "sign responder produced joint signature");

        let mut msg_g = signature.to_bytes().to_vec();
        msg_g.push(recovery_id.to_byte());
        Ok(msg_g)
    }
}
