//! Game Sales - sales team management backend for small Brazilian companies
//!
//! This library provides the core functionality for the Game Sales backend:
//! the multi-tenant company/seller model, the deals pipeline, metas,
//! agendamentos with Google Calendar sync, rankings, and Mercado Pago
//! subscription billing.

pub mod calendar;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod id;
pub mod integrations;
pub mod middleware;
pub mod models;
pub mod pagination;
pub mod plans;
pub mod rate_limit;
pub mod sync;
pub mod util;
