//! Binary encodings exchanged between PintSwap peers.
//!
//! - [`messages`]: protobuf wire-compatible schema messages (offer lists,
//!   batch fills, name-service queries)
//! - [`permit`]: fixed-width permit payloads carried inside trade frames
//! - [`frame`]: varint length-prefixed framing over any async byte stream

pub mod error;
pub mod frame;
pub mod messages;
pub mod permit;
mod wire;

pub use error::{CodecError, CodecResult};
pub use frame::{FramedStream, MAX_FRAME_SIZE};
pub use messages::{
    decode_address, decode_amount, encode_address, encode_amount, BatchFill, NameQuery,
    NameQueryResponse, NameRegisterResponse, OfferList, WireMessage,
};
pub use permit::{decode_permit, encode_permit, PERMIT_PAYLOAD_LEN};
