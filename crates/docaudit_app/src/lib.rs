//! Command-line host for the document-audit client.
pub mod platform;
