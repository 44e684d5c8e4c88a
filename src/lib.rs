//! Kasha is a prerender gateway: it serves fully-rendered HTML for
//! client-side-rendered pages so crawlers and static consumers receive
//! hydrated markup. Rendering itself happens in a pool of headless-browser
//! workers reached over a message bus; this crate is the coordination layer
//! in front of them (request normalization, cache lookup, in-flight
//! deduplication, freshness tiers, sitemap/robots aggregation).

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
