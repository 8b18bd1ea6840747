//! Persistence - JSON documents stored next to the launcher

mod json_store;

pub use json_store::{JsonStore, StoreError};
