//! Repforge API: personal training log with MFA-capable authentication

pub mod auth;
pub mod config;
pub mod error;
pub mod oidc;
pub mod routes;
pub mod state;
