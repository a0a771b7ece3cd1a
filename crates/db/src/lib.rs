#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

#[macro_use]
extern crate tracing;

mod errors;
pub use errors::{DbError, DbResult};

pub mod keys;

pub mod kv;
pub use kv::{DiskKeyValueStore, KeyValueStore, MemoryKeyValueStore, WriteBatch, WriteOp};

mod database;
pub use database::{Database, STATE_CACHE_SIZE};
