//! Roster core library — domain types, phone normalization, sheet schema,
//! configuration and errors.
//!
//! - [`types`] — newtypes and roster records
//! - [`phone`] — canonical phone keys
//! - [`schema`] — fixed column layout of the dashboard sheet
//! - [`config`] — `~/.roster/config.yaml` plus environment secrets
//! - [`error`] — [`ConfigError`]

pub mod config;
pub mod error;
pub mod phone;
pub mod schema;
pub mod types;

pub use config::{
    DocumentTypeConfig, GoogleCredentials, OAuthToken, RosterConfig, Secrets, ServiceAccountKey,
};
pub use error::ConfigError;
pub use phone::normalize;
pub use schema::SheetSchema;
pub use types::{ClientId, ClientRecord, NormalizedPhone, RosterEntry};
