//! Remote catalog (Rebrickable) access.

pub mod api_types;
pub mod client;
#[cfg(test)]
pub mod testing;
pub mod types;

pub use client::CatalogClient;
