//! Factories for generating instances of lassie collaborators.

mod core_session;
pub use core_session::*;

mod core_retriever;
pub use core_retriever::*;

pub mod bitswap_retriever;
pub use bitswap_retriever::BitswapRetrieverFactory;

mod graphsync_retriever;
pub use graphsync_retriever::*;

pub mod http_retriever;
pub use http_retriever::HttpRetrieverFactory;

pub mod car;

mod mem_block_store;
pub use mem_block_store::*;

pub mod mem_host;
pub use mem_host::{MemHost, MemHostConfig, MemHostFactory};

mod mem_candidate_finder;
pub use mem_candidate_finder::*;
