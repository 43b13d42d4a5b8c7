//! Compile JOSM-style search expressions and run them over OSM data.
//!
//! The [`search`] module holds the query compiler and evaluator and depends
//! only on the capability traits in [`model`]. Everything else serves the
//! `osmsearch` command line tool.

pub mod app;
pub mod config;
pub mod dataset;
pub mod geometry;
pub mod model;
pub mod search;
pub mod sinks;
