//! Beer price crawler for Vietnamese grocery storefronts.
//!
//! Each storefront module drives a headless Chrome session over its
//! beer category page and flattens the listings into one shared record
//! shape; [`fetcher`] does the same through the BHX listing API without
//! a browser. [`archiver`] writes a combined run out as CSV or JSON,
//! and [`har`] digs the live API parameters out of a browser capture.

pub mod archiver;
pub mod browser;
pub mod fetcher;
pub mod har;
pub mod models;
pub mod parser;
pub mod sites;
