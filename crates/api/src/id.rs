//! Types dealing with content and provider identity.

use crate::*;

macro_rules! imp_deref {
    ($i:ty, $t:ty) => {
        impl std::ops::Deref for $i {
            type Target = $t;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }
    };
}

macro_rules! imp_from {
    ($a:ty, $b:ty, $i:ident => $e:expr) => {
        impl From<$b> for $a {
            fn from($i: $b) -> Self {
                $e
            }
        }
    };
}

/// Base identity type meant for newtyping.
/// You probably want [Cid] or [ProviderId].
#[derive(
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct Id(#[serde(with = "crate::serde_bytes_base64")] pub bytes::Bytes);

imp_deref!(Id, bytes::Bytes);
imp_from!(Id, bytes::Bytes, b => Id(b));

fn encode(b: &bytes::Bytes) -> String {
    use base64::prelude::*;
    BASE64_URL_SAFE_NO_PAD.encode(b)
}

/// The multibase prefix for base64url without padding.
const MULTIBASE_BASE64_URL: char = 'u';

/// A content identifier in its binary form.
///
/// Lassie treats the bytes as opaque, apart from the codecs that need to
/// locate the end of an identifier inside a larger frame. The text form
/// is the multibase base64url (no padding) encoding, which is understood
/// by gateways and indexers alike.
#[derive(
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct Cid(pub Id);

imp_deref!(Cid, Id);
imp_from!(Cid, bytes::Bytes, b => Cid(Id(b)));
imp_from!(Cid, Id, b => Cid(b));

impl std::fmt::Display for Cid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{MULTIBASE_BASE64_URL}{}", encode(&self.0 .0))
    }
}

impl std::fmt::Debug for Cid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

impl std::str::FromStr for Cid {
    type Err = LassieError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use base64::prelude::*;
        let Some(encoded) = s.strip_prefix(MULTIBASE_BASE64_URL) else {
            return Err(LassieError::other(format!(
                "unsupported multibase for cid: {s}"
            )));
        };
        let b = BASE64_URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| LassieError::other_src("invalid cid", e))?;
        if b.is_empty() {
            return Err(LassieError::other("empty cid"));
        }
        Ok(bytes::Bytes::from(b).into())
    }
}

/// Identifies a provider (storage provider or peer) that may be able to
/// serve content.
#[derive(
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct ProviderId(pub Id);

imp_deref!(ProviderId, Id);
imp_from!(ProviderId, bytes::Bytes, b => ProviderId(Id(b)));
imp_from!(ProviderId, Id, b => ProviderId(b));

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&encode(&self.0 .0))
    }
}

impl std::fmt::Debug for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

/// Identifies a single retrieval, used to correlate events.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct RetrievalId(pub u64);

impl RetrievalId {
    /// Generate a new random retrieval id.
    pub fn new() -> Self {
        Self(rand::random())
    }
}

impl Default for RetrievalId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RetrievalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
