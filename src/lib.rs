//! Client for DAAP music shares.
//!
//! Logs in to a share, pulls its song listing as a tagged binary tree and
//! publishes the songs as a deduplicated [`catalog`] of tracks, artists,
//! albums, genres, composers and years.
//!
//! * [`protocol`] - Wire format and typed responses
//! * [`session`] - The handshake with a share
//! * [`synchronizer`] - Building and publishing catalogs
//! * [`catalog`] - The published catalog and its readers
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;

pub mod catalog;
pub mod config;
pub mod credential;
pub mod error;
pub mod events;
pub mod http;
pub mod protocol;
pub mod session;
pub mod synchronizer;
