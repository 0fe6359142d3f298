//! Data handling: the in-memory sample buffer and storage writers.
pub mod buffer;
pub mod storage;
