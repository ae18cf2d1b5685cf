//! Download a paper and the papers around it in the citation graph.
//!
//! The pipeline is: resolve a seed paper ([`scholar`]), walk its references
//! and citations breadth-first ([`walker`]), fetch the open access PDFs
//! ([`download`]) and write one metadata file per run ([`store`]). [`app`]
//! strings the steps together.

pub mod app;
pub mod config;
pub mod domain;
pub mod download;
pub mod error;
pub mod output;
pub mod scholar;
pub mod select;
pub mod store;
pub mod walker;
