pub mod aggregate;
pub mod app;
pub mod archive;
pub mod classify;
pub mod coerce;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod output;
pub mod parser;
pub mod registry;
pub mod store;
pub mod table;
