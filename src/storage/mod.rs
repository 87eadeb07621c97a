//! Storage layer for JSON documents.
//!
//! Every persisted artifact (disk cache entries, model versions, prompt
//! templates, metrics snapshots) is a pretty-printed JSON file inside a
//! directory owned by a [`JsonStore`].

mod json;

pub use json::JsonStore;
