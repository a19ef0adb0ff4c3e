//! Daraja STK push gateway: HTTP client, token cache, phone normalization
//! and callback parsing.

pub mod callback;
pub mod client;
pub mod http;
pub mod phone;
pub mod types;

pub use client::{DarajaClient, StkGateway};
pub use phone::normalize_phone;
