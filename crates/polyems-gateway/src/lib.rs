//! polyems-gateway — HTTP front door for the PolyEms chat providers
//!
//! Accepts a conversation and a model name, dispatches it to exactly one
//! provider through [`polyems_core::ModelRouter`], and answers with
//! `{ "response": ... }` or `{ "error": ... }`.

pub mod error;
pub mod server;

pub use error::ApiError;
pub use server::{DEFAULT_ALLOWED_ORIGIN, GatewayServer, GatewayState, RouteModels};
