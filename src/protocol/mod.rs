//! Protocol types for DAAP music shares.
//!
//! # Submodules
//!
//! * [`content_codes`] - Four byte tags and the types of their payloads
//! * [`dmap`] - Tag-length-value decoding and encoding
//! * [`handshake`] - Responses of the login, update and database requests
//! * [`songs`] - Song listings and the records extracted from them
//!
//! # Shared Functionality
//!
//! [`decode`] turns a response body into a typed [`Response`], logging the
//! decoded tree at TRACE level and the failure at ERROR level.

pub mod content_codes;
pub mod dmap;
pub mod handshake;
pub mod songs;

use std::fmt::Debug;

use crate::error::Result;
use dmap::{Codec, Container};

/// A typed view on a decoded response.
///
/// Implementors pick the fields they need out of the tag tree and fail
/// with [`FailedPrecondition`](crate::error::ErrorKind::FailedPrecondition)
/// when a required field is absent.
pub trait Response: Sized {
    /// Name of the request, for logging.
    const NAME: &'static str;

    /// Extracts the response from a decoded tree.
    ///
    /// # Errors
    ///
    /// Returns an error if a required field is absent.
    fn from_tree(tree: &Container) -> Result<Self>;
}

/// Decodes a response body and extracts a typed response from it.
///
/// # Errors
///
/// Returns error if:
/// * the body is not a well-formed tag stream
/// * a field required by `T` is absent
///
/// # Logging
///
/// * Decoded tree and result at TRACE level
/// * Malformed bodies at ERROR level
pub fn decode<T>(codec: &Codec<'_>, body: &[u8]) -> Result<T>
where
    T: Response + Debug,
{
    let tree = codec.decode(body).inspect_err(|e| {
        error!("{}: failed decoding response ({e})", T::NAME);
    })?;
    trace!("{}: {tree:#?}", T::NAME);

    let result = T::from_tree(&tree)?;
    trace!("{}: {result:?}", T::NAME);
    Ok(result)
}
