//! Clinic payment service: M-Pesa STK push initiation, callback-driven
//! settlement with exactly-once invoice effects, cash receipts, evidence
//! generation and background recovery of missed callbacks.

pub mod api;
pub mod config;
pub mod database;
pub mod gateway;
pub mod logging;
pub mod payments;
pub mod services;
pub mod workers;
