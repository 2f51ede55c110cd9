//! Shot Oracle: deterministic diagnostic readings for espresso shots.
//!
//! Turns a captured shot's telemetry into a short reading card: scalar
//! features, an ordered diagnostic rule match, seeded style selection and
//! template rendering, with an optional paraphrase pass that may never
//! change a number.

pub mod config;
pub mod core;
pub mod schema;
