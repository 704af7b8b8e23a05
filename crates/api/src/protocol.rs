//! Retrieval transport protocol identifiers.

use crate::*;

/// A multicodec code naming a retrieval transport.
///
/// Only the three transports lassie knows how to drive have named
/// variants. Any other code is carried as [ProtocolCode::Other] so that
/// configuration and candidate metadata can pass it through untouched.
///
/// Equality, ordering and hashing go by [ProtocolCode::code], so
/// `Other(0x0900)` and [ProtocolCode::TransportBitswap] are the same
/// protocol.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
#[serde(from = "u64", into = "u64")]
pub enum ProtocolCode {
    /// `transport-bitswap`, block-by-block exchange with peers.
    TransportBitswap,

    /// `transport-graphsync-filecoinv1`, Filecoin data-transfer.
    TransportGraphsyncFilecoinv1,

    /// `transport-ipfs-gateway-http`, trustless HTTP gateway.
    TransportIpfsGatewayHttp,

    /// Any other multicodec code.
    Other(u64),
}

const BITSWAP: u64 = 0x0900;
const GRAPHSYNC_FILECOINV1: u64 = 0x0910;
const IPFS_GATEWAY_HTTP: u64 = 0x0920;

impl ProtocolCode {
    /// The protocols used when none are configured, in order.
    pub const DEFAULT_PROTOCOLS: [ProtocolCode; 3] = [
        ProtocolCode::TransportBitswap,
        ProtocolCode::TransportGraphsyncFilecoinv1,
        ProtocolCode::TransportIpfsGatewayHttp,
    ];

    /// The numeric multicodec code.
    pub fn code(&self) -> u64 {
        match self {
            Self::TransportBitswap => BITSWAP,
            Self::TransportGraphsyncFilecoinv1 => GRAPHSYNC_FILECOINV1,
            Self::TransportIpfsGatewayHttp => IPFS_GATEWAY_HTTP,
            Self::Other(code) => *code,
        }
    }
}

impl PartialEq for ProtocolCode {
    fn eq(&self, other: &Self) -> bool {
        self.code() == other.code()
    }
}

impl Eq for ProtocolCode {}

impl PartialOrd for ProtocolCode {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ProtocolCode {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.code().cmp(&other.code())
    }
}

impl std::hash::Hash for ProtocolCode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.code().hash(state)
    }
}

impl From<u64> for ProtocolCode {
    fn from(code: u64) -> Self {
        match code {
            BITSWAP => Self::TransportBitswap,
            GRAPHSYNC_FILECOINV1 => Self::TransportGraphsyncFilecoinv1,
            IPFS_GATEWAY_HTTP => Self::TransportIpfsGatewayHttp,
            code => Self::Other(code),
        }
    }
}

impl From<ProtocolCode> for u64 {
    fn from(p: ProtocolCode) -> Self {
        p.code()
    }
}

impl std::fmt::Display for ProtocolCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TransportBitswap => f.write_str("transport-bitswap"),
            Self::TransportGraphsyncFilecoinv1 => {
                f.write_str("transport-graphsync-filecoinv1")
            }
            Self::TransportIpfsGatewayHttp => {
                f.write_str("transport-ipfs-gateway-http")
            }
            Self::Other(code) => write!(f, "0x{code:04x}"),
        }
    }
}

impl std::str::FromStr for ProtocolCode {
    type Err = LassieError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bitswap" | "transport-bitswap" => Ok(Self::TransportBitswap),
            "graphsync" | "transport-graphsync-filecoinv1" => {
                Ok(Self::TransportGraphsyncFilecoinv1)
            }
            "http" | "transport-ipfs-gateway-http" => {
                Ok(Self::TransportIpfsGatewayHttp)
            }
            s => match s.strip_prefix("0x") {
                Some(hex) => u64::from_str_radix(hex, 16)
                    .map(Self::from)
                    .map_err(|e| LassieError::other_src("invalid protocol", e)),
                None => Err(LassieError::other(format!(
                    "unrecognized protocol: {s}"
                ))),
            },
        }
    }
}
