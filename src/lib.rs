//! Converts a BIDS neuroimaging dataset into ISA-Tab metadata.

pub mod app;
pub mod config;
pub mod dataset;
pub mod domain;
pub mod error;
pub mod isatab;
pub mod mapper;
pub mod metadata;
pub mod nifti;
pub mod ontology;
pub mod output;
pub mod scanner;
pub mod writer;
