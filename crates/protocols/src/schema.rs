//! Protocol identifiers and the create-trade frame schema.

use std::fmt;

pub const ORDERS_PROTOCOL: &str = "/pintswap/0.1.0/orders";
pub const CREATE_TRADE_PROTOCOL: &str = "/pintswap/0.1.0/create-trade";
pub const NAME_QUERY_PROTOCOL: &str = "/pintswap/0.1.0/ns/query";
pub const NAME_REGISTER_PROTOCOL: &str = "/pintswap/0.1.0/ns/register";

/// Pubsub topic carrying each peer's encoded offer list.
pub const PUBLISH_ORDERS_TOPIC: &str = "/pintswap/0.1.0/publish-orders";

/// Which side of a trade a party plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Listed the offers and answers the fill.
    Maker,
    /// Dials the maker and fills its offers.
    Taker,
}

impl Role {
    pub fn counterpart(self) -> Role {
        match self {
            Role::Maker => Role::Taker,
            Role::Taker => Role::Maker,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Maker => write!(f, "maker"),
            Role::Taker => write!(f, "taker"),
        }
    }
}

/// One frame of the create-trade protocol. Frames carry no tag on the wire;
/// both sides know which one comes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frame {
    BatchFill,
    KeygenA,
    KeygenB,
    MakerAddress,
    KeygenC,
    MakerPermit,
    TakerPermit,
    UnsignedTx,
    CoinbaseAmount,
    TakerAddress,
    SignD,
    SignE,
    SignF,
    SignG,
}

/// Every create-trade frame with its sender, in protocol order.
///
/// Each direction of the stream carries exactly the frames of one sender in
/// this order. The two permit frames cross: each party sends its own before
/// reading the other's.
pub const CREATE_TRADE_FRAMES: [(Frame, Role); 14] = [
    (Frame::BatchFill, Role::Taker),
    (Frame::KeygenA, Role::Taker),
    (Frame::KeygenB, Role::Maker),
    (Frame::MakerAddress, Role::Maker),
    (Frame::KeygenC, Role::Taker),
    (Frame::MakerPermit, Role::Maker),
    (Frame::TakerPermit, Role::Taker),
    (Frame::UnsignedTx, Role::Taker),
    (Frame::CoinbaseAmount, Role::Taker),
    (Frame::TakerAddress, Role::Taker),
    (Frame::SignD, Role::Taker),
    (Frame::SignE, Role::Maker),
    (Frame::SignF, Role::Taker),
    (Frame::SignG, Role::Maker),
];

/// Frames `role` sends, in order.
pub fn frames_sent_by(role: Role) -> Vec<Frame> {
    CREATE_TRADE_FRAMES
        .iter()
        .filter(|(_, sender)| *sender == role)
        .map(|(frame, _)| *frame)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_split() {
        assert_eq!(frames_sent_by(Role::Taker).len(), 8);
        assert_eq!(frames_sent_by(Role::Maker).len(), 6);
        assert_eq!(CREATE_TRADE_FRAMES[0], (Frame::BatchFill, Role::Taker));
        assert_eq!(CREATE_TRADE_FRAMES[13], (Frame::SignG, Role::Maker));
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Maker.to_string(), "maker");
        assert_eq!(Role::Taker.counterpart(), Role::Maker);
    }
}
