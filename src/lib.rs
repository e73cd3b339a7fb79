//! kvtemplate - typed client facade for a Redis-style data-structure store
//!
//! ```no_run
//! use std::sync::Arc;
//! use kvtemplate::{ClientConfig, KvTemplate, RespClient};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(RespClient::connect(ClientConfig::new("127.0.0.1:6379")).await?);
//! let template = KvTemplate::new(client.clone());
//! template.ops_for_list().push_left("jobs", "build").await?;
//! client.close().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod memory;
pub mod ops;
pub mod record;
pub mod resp;

pub use client::RespClient;
pub use codec::{AbsentFieldMode, CodecConfig, DateTimeMode, JsonCodec, StringCodec, Timestamp, ValueCodec};
pub use config::ClientConfig;
pub use connection::{Command, CommandExecutor, Reply};
pub use error::{CodecError, OpsError, OpsResult, TransportError, TransportResult};
pub use memory::{MemoryServer, MemoryStore};
pub use ops::{
    Aggregate, CombineOptions, HashOperations, Inserted, KvTemplate, LexBound, LexRange, Limit,
    ListOperations, ScanOptions, ScoredMember, SetOperations, Side, ValueOperations, ZSetOperations,
};
pub use record::ValueDto;
