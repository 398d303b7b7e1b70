//! Events emitted while connecting to a share.
//!
//! Frontends subscribe to these to refresh their views or to prompt for a
//! password.
//!
//! # Example
//!
//! ```rust
//! use daapr::events::Event;
//!
//! fn handle_event(event: Event) {
//!     match event {
//!         Event::CatalogUpdated { tracks } => println!("{tracks} tracks available"),
//!         Event::AuthenticationRequired => println!("share needs a password"),
//!         Event::ConnectionFailed => println!("could not reach share"),
//!     }
//! }
//! ```

/// Events that can be emitted by a session or synchronizer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    /// A new catalog has been published.
    ///
    /// Emitted once per successful synchronization, after the catalog can
    /// be read.
    CatalogUpdated { tracks: usize },

    /// The share asked for a password.
    ///
    /// Connect again with a credential to proceed.
    AuthenticationRequired,

    /// The handshake failed for any other reason.
    ///
    /// A previously published catalog stays available.
    ConnectionFailed,
}
