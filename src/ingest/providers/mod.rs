// src/ingest/providers/mod.rs
pub mod cryptocompare;
pub mod rss;
