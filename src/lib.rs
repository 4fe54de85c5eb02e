pub mod cleaner;
pub mod config;
pub mod error;
pub mod features;
pub mod fetch;
pub mod grid;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod predict;
pub mod publish;
pub mod rank;
pub mod registry;
pub mod source;
pub mod stats;
pub mod store;
