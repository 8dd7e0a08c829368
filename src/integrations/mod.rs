//! External service integrations.

pub mod alert_client {
    pub use crate::alert_client::*;
}

pub mod webhook_models {
    pub use crate::webhook_models::*;
}
