#![deny(missing_docs)]
//! Lassie API contains the retrieval client module traits and the basic
//! types required to define the api of those traits.
//!
//! If you want a ready-to-use retrieval client, please see the
//! `lassie_core` crate.

/// Boxed future type.
pub type BoxFut<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

pub(crate) mod serde_bytes_base64 {
    pub fn serialize<S>(
        b: &bytes::Bytes,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use base64::prelude::*;
        serializer.serialize_str(&BASE64_URL_SAFE_NO_PAD.encode(b))
    }

    pub fn deserialize<'de, D, T: From<bytes::Bytes>>(
        deserializer: D,
    ) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use base64::prelude::*;
        let s: String = serde::Deserialize::deserialize(deserializer)?;
        BASE64_URL_SAFE_NO_PAD
            .decode(s)
            .map(|v| bytes::Bytes::copy_from_slice(&v).into())
            .map_err(serde::de::Error::custom)
    }
}

mod error;
pub use error::*;

pub mod id;
pub use id::{Cid, ProviderId, RetrievalId};

mod protocol;
pub use protocol::*;

pub mod context;
pub use context::{CancelHandle, Context};

pub mod config;
pub use config::*;

mod request;
pub use request::*;

pub mod event;
pub use event::*;

pub mod candidate;
pub use candidate::*;

pub mod host;
pub use host::*;

pub mod session;
pub use session::*;

pub mod retriever;
pub use retriever::*;

pub mod builder;
pub use builder::*;

mod fetcher;
pub use fetcher::*;
