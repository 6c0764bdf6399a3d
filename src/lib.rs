pub mod accessions;
pub mod archive;
pub mod bootstrap;
pub mod config;
pub mod datasets;
pub mod domain;
pub mod error;
pub mod joblog;
pub mod layout;
pub mod manifest;
pub mod output;
pub mod pipeline;
pub mod pool;
