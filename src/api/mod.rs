//! Client for the one REST call the session core issues.

mod client;

pub use client::{ApiError, HttpSessionApi, LogoutOutcome, SessionApi};
