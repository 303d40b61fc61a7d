//! Observer utilities for canopy behavior trees.
//!
//! This crate is intentionally lightweight and engine-agnostic. It provides ready-made
//! [`TreeObserver`](canopy_core::TreeObserver) implementations for tests, captures and log
//! output; richer integrations (inspectors, live views) should live in adapter crates.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]

pub mod observe;

pub use observe::{EventLog, NullObserver, RecordingObserver, TracingObserver};
