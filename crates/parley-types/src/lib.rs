//! Wire types shared by the Parley crates.

pub mod api;
pub mod models;
