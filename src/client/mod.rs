//! Google Cloud REST client and authentication.
//!
//! This module provides the [`GoogleClient`] used by the Cloud Storage object
//! store and the BigQuery warehouse, along with [`Auth`].

mod auth;
mod google;

pub use auth::Auth;
pub use google::GoogleClient;
