//! Authenticated business API for the ClassHopper client.
//!
//! Every call goes through [`token_auth::TokenManager::with_valid_token`], so
//! a rejected credential is refreshed and the call retried exactly once.

mod client;
mod error;
mod models;

pub use client::ApiClient;
pub use error::{ApiError, ApiResult};
pub use models::{Course, LoginSession, ScheduleOutcome, SignInOutcome, SignInReceipt};
