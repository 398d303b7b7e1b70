//! In-memory catalog of a remote music share.
//!
//! A [`Catalog`] holds the tracks of one share and their groupings by
//! artist, album, genre, composer and year. Entities and tracks refer to each
//! other by key: tracks name their entities, entities list the item ids of
//! their tracks. Nothing is reference counted, so there are no cycles to
//! break when a catalog is dropped.
//!
//! A [`SharedCatalog`] publishes the current catalog to any number of
//! readers. Publishing swaps in a fully built catalog under the write lock,
//! so readers see either the previous catalog or the new one, never a mix.
//!
//! # Example
//!
//! ```rust
//! use daapr::catalog::SharedCatalog;
//!
//! let shared = SharedCatalog::default();
//! let catalog = shared.read();
//! for artist in catalog.artists.values() {
//!     println!("{}: {} tracks", artist.name, artist.tracks.len());
//! }
//! ```

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard},
    time::Duration,
};

use url::Url;

use crate::error::Result;

/// Item id of a track, unique within one database.
pub type ItemId = u32;

/// Name given to entities whose name the share left out.
pub const UNKNOWN: &str = "(unknown)";

/// The groupings of tracks.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Artist,
    Album,
    Genre,
    Composer,
    Year,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Artist => write!(f, "artist"),
            Self::Album => write!(f, "album"),
            Self::Genre => write!(f, "genre"),
            Self::Composer => write!(f, "composer"),
            Self::Year => write!(f, "year"),
        }
    }
}

/// An artist, album, genre, composer or year with the tracks it groups.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entity {
    pub kind: EntityKind,
    pub name: String,
    /// Item ids of the grouped tracks, in listing order.
    pub tracks: Vec<ItemId>,
}

impl Entity {
    #[must_use]
    pub fn new(kind: EntityKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            tracks: Vec::new(),
        }
    }
}

/// A track of the share.
///
/// Entity fields hold the key of the entity in the matching map of the
/// [`Catalog`], which is [`UNKNOWN`] when the share left the field out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Track {
    pub item_id: ItemId,
    pub title: String,
    pub format: String,
    pub length: Duration,
    pub track_number: u32,
    pub comment: String,
    pub artist: String,
    pub album: String,
    pub genre: String,
    pub composer: String,
    pub year: String,
}

impl Track {
    /// URL to stream the track from.
    ///
    /// The share also expects the session query string of the client that
    /// listed the track. Tracks without a format get no extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be joined onto `base`.
    pub fn url(&self, base: &Url, database_id: &str) -> Result<Url> {
        let mut path = format!("databases/{database_id}/items/{}", self.item_id);
        if !self.format.is_empty() {
            path.push('.');
            path.push_str(&self.format);
        }
        base.join(&path).map_err(Into::into)
    }

    /// Key of the entity of `kind` this track belongs to.
    #[must_use]
    pub fn entity(&self, kind: EntityKind) -> &str {
        match kind {
            EntityKind::Artist => &self.artist,
            EntityKind::Album => &self.album,
            EntityKind::Genre => &self.genre,
            EntityKind::Composer => &self.composer,
            EntityKind::Year => &self.year,
        }
    }
}

/// Tracks and entities of one share.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Catalog {
    pub tracks: HashMap<ItemId, Track>,
    pub artists: HashMap<String, Entity>,
    pub albums: HashMap<String, Entity>,
    pub genres: HashMap<String, Entity>,
    pub composers: HashMap<String, Entity>,
    pub years: HashMap<String, Entity>,
}

impl Catalog {
    /// Entities of `kind`, keyed by name.
    #[must_use]
    pub fn entities(&self, kind: EntityKind) -> &HashMap<String, Entity> {
        match kind {
            EntityKind::Artist => &self.artists,
            EntityKind::Album => &self.albums,
            EntityKind::Genre => &self.genres,
            EntityKind::Composer => &self.composers,
            EntityKind::Year => &self.years,
        }
    }

    pub fn entities_mut(&mut self, kind: EntityKind) -> &mut HashMap<String, Entity> {
        match kind {
            EntityKind::Artist => &mut self.artists,
            EntityKind::Album => &mut self.albums,
            EntityKind::Genre => &mut self.genres,
            EntityKind::Composer => &mut self.composers,
            EntityKind::Year => &mut self.years,
        }
    }

    /// Tracks of an entity, in listing order.
    pub fn tracks_of<'a>(&'a self, entity: &'a Entity) -> impl Iterator<Item = &'a Track> + 'a {
        entity.tracks.iter().filter_map(|id| self.tracks.get(id))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// The published catalog, shared between one writer and many readers.
///
/// Cloning yields another handle to the same catalog.
#[derive(Clone, Debug, Default)]
pub struct SharedCatalog {
    inner: Arc<RwLock<Arc<Catalog>>>,
}

impl SharedCatalog {
    /// Acquires the read lock.
    ///
    /// Hold the guard briefly: a pending [`replace`](Self::replace) waits
    /// for it. Use [`snapshot`](Self::snapshot) for long traversals.
    pub fn read(&self) -> RwLockReadGuard<'_, Arc<Catalog>> {
        // Only whole catalogs are ever swapped in, so a poisoned lock still
        // holds a consistent one.
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// The current catalog, which stays valid after later replacements.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Catalog> {
        Arc::clone(&self.read())
    }

    /// Publishes `catalog`, replacing the previous one.
    ///
    /// The write lock is held only for the swap; the previous catalog is
    /// dropped after the lock is released.
    pub fn replace(&self, catalog: Catalog) {
        let catalog = Arc::new(catalog);
        let previous = {
            let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *guard, catalog)
        };
        drop(previous);
    }
}
