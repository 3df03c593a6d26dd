//! Client records and release-notification mailings.
//!
//! Operators create a mailing for a release; a recipient strategy decides who receives it, and
//! the background worker composes templated HTML mail with the release notes and documentation
//! attached, sends it over SMTP and journals every step.

#[macro_use]
extern crate diesel;
#[macro_use]
extern crate log;

#[macro_use]
mod macros;

pub mod config;
pub mod db;
mod errors;
pub mod mail;
mod mailer;
pub mod mailing;
pub mod util;
pub mod web;
pub mod worker;

pub use db::DB;
pub use errors::{Error, ErrorKind, Result};
pub use mailer::Mailer;
