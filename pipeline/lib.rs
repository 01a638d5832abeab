#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod config;
pub mod orchestrator;
pub mod report;
pub mod series;
pub mod sources;
pub mod types;

#[path = "../lexicon/mod.rs"]
pub mod lexicon;

#[path = "../dependence/mod.rs"]
pub mod dependence;

#[path = "../forecast/mod.rs"]
pub mod forecast;

#[path = "../spatial/mod.rs"]
pub mod spatial;
