//! Testing utilities for answer pipelines.
//!
//! This module provides:
//! - A scripted transport and a static proxy source for the fetch agent
//! - Canned search, page, LLM and embedding collaborators
//! - HTML fixtures for result and answer pages

pub mod fixtures;
mod mocks;

pub use mocks::{
    HashEmbedder, MockLlm, MockPageFetcher, MockSearchEngine, ScriptedTransport, StaticProxySource,
};
