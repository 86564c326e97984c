//! The per-screenshot processing stages, in execution order.
//!
//! [`preprocess`] bounds and re-encodes the image for transport, [`ocr`]
//! extracts on-screen text locally, [`client`] talks to the inference
//! server, [`decode`] recovers JSON from the completion, [`validate`]
//! normalizes it into a [`crate::record::CanonicalRecord`], and [`merge`]
//! folds in capture-time metadata before the record is persisted.

pub mod client;
pub mod decode;
pub mod merge;
pub mod ocr;
pub mod preprocess;
pub mod validate;
