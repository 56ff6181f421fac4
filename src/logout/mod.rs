//! Exactly-once logout across tabs, and the cancellation scope it resets.

mod executor;
mod navigator;
mod scope;

pub use executor::{
    LogoutContext, LogoutDisposition, LogoutExecutor, LogoutOrigin, LOGOUT_ERROR_MESSAGE,
};
pub use navigator::{LogNavigator, Navigator};
pub use scope::{Cancelled, RequestScope};
