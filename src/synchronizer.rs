//! Turns song records into a published catalog.
//!
//! Synchronizing makes one pass over the records, grouping tracks into
//! artists, albums, genres, composers and years by exact name. The new
//! catalog is built privately and then swapped into the [`SharedCatalog`],
//! so the write lock is held for the swap only.
//!
//! Records without an item id cannot be addressed and are skipped, as are
//! records repeating an item id seen before. Skipped records are counted in
//! the [`Report`].

use std::collections::hash_map::Entry;

use tokio::sync::mpsc::UnboundedSender;

use crate::{
    catalog::{Catalog, Entity, EntityKind, SharedCatalog, Track, UNKNOWN},
    events::Event,
    protocol::songs::SongRecord,
};

/// Counts of one synchronization.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Report {
    pub tracks: usize,
    pub skipped: usize,
    pub artists: usize,
    pub albums: usize,
    pub genres: usize,
    pub composers: usize,
    pub years: usize,
}

/// Publishes catalogs into a [`SharedCatalog`].
#[derive(Clone, Debug)]
pub struct Synchronizer {
    catalog: SharedCatalog,
    event_tx: Option<UnboundedSender<Event>>,
}

impl Synchronizer {
    #[must_use]
    pub fn new(catalog: SharedCatalog) -> Self {
        Self {
            catalog,
            event_tx: None,
        }
    }

    /// Sends [`Event::CatalogUpdated`] to `event_tx` after each publication.
    #[must_use]
    pub fn with_events(mut self, event_tx: UnboundedSender<Event>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    #[must_use]
    pub fn catalog(&self) -> &SharedCatalog {
        &self.catalog
    }

    /// Builds a catalog from `records` and publishes it.
    pub fn synchronize(&self, records: &[SongRecord]) -> Report {
        let (catalog, skipped) = build(records);
        let report = Report {
            tracks: catalog.tracks.len(),
            skipped,
            artists: catalog.artists.len(),
            albums: catalog.albums.len(),
            genres: catalog.genres.len(),
            composers: catalog.composers.len(),
            years: catalog.years.len(),
        };

        self.catalog.replace(catalog);
        info!(
            "published {} tracks by {} artists on {} albums",
            report.tracks, report.artists, report.albums
        );
        if skipped > 0 {
            warn!("skipped {skipped} unusable song records");
        }

        if let Some(event_tx) = &self.event_tx {
            if event_tx
                .send(Event::CatalogUpdated {
                    tracks: report.tracks,
                })
                .is_err()
            {
                debug!("no one is listening for catalog updates");
            }
        }

        report
    }
}

/// Builds a catalog in a single pass. Returns it with the number of skipped
/// records.
#[must_use]
pub fn build(records: &[SongRecord]) -> (Catalog, usize) {
    let mut catalog = Catalog::default();
    let mut skipped = 0;

    for record in records {
        let Some(item_id) = record.item_id else {
            warn!("skipping song record without item id: {:?}", record.title);
            skipped += 1;
            continue;
        };

        let Entry::Vacant(slot) = catalog.tracks.entry(item_id) else {
            warn!("skipping song record repeating item id {item_id}");
            skipped += 1;
            continue;
        };

        let year = if record.year == 0 {
            String::new()
        } else {
            record.year.to_string()
        };
        let track = slot.insert(Track {
            item_id,
            title: record.title.clone(),
            format: record.format.clone(),
            length: record.length,
            track_number: record.track_number,
            comment: record.comment.clone(),
            artist: entity_name(&record.artist),
            album: entity_name(&record.album),
            genre: entity_name(&record.genre),
            composer: entity_name(&record.composer),
            year: entity_name(&year),
        });

        let keys = [
            EntityKind::Artist,
            EntityKind::Album,
            EntityKind::Genre,
            EntityKind::Composer,
            EntityKind::Year,
        ]
        .map(|kind| (kind, track.entity(kind).to_owned()));

        for (kind, name) in keys {
            catalog
                .entities_mut(kind)
                .entry(name)
                .or_insert_with_key(|name| Entity::new(kind, name.clone()))
                .tracks
                .push(item_id);
        }
    }

    (catalog, skipped)
}

/// Entity key for a name as listed; absent names share one bucket.
fn entity_name(name: &str) -> String {
    if name.is_empty() {
        UNKNOWN.to_owned()
    } else {
        name.to_owned()
    }
}
