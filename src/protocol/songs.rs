//! Song listings of a shared music database.
//!
//! # Wire Format
//!
//! ```text
//! adbs {
//!     mstt, muty, mtco, mrco,
//!     mlcl {
//!         mlit { miid, minm, asfm, asar, asal, astm, astn, ascm, ascp, asyr, asgn }
//!         mlit { ... }
//!     }
//! }
//! ```
//!
//! Peers leave out fields a song does not have, so every field but the item
//! id falls back to an empty or zero default.

use std::time::Duration;

use super::{
    content_codes::{Dictionary, Tag},
    dmap::Container,
    Response,
};
use crate::error::{Error, Result};

/// Fields requested with the `meta=` query parameter of a song listing.
pub const SONG_META: &[Tag] = &[
    Tag::ITEM_ID,
    Tag::ITEM_NAME,
    Tag::SONG_FORMAT,
    Tag::SONG_ARTIST,
    Tag::SONG_ALBUM,
    Tag::SONG_TIME,
    Tag::SONG_TRACK_NUMBER,
    Tag::SONG_COMMENT,
    Tag::SONG_COMPOSER,
    Tag::SONG_YEAR,
    Tag::SONG_GENRE,
];

/// Comma-separated semantic names of [`SONG_META`].
#[must_use]
pub fn meta(dictionary: &Dictionary) -> String {
    SONG_META
        .iter()
        .filter_map(|tag| dictionary.name_of(*tag))
        .collect::<Vec<_>>()
        .join(",")
}

/// Flat metadata of one listed song.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SongRecord {
    /// `None` when the peer left it out, which makes the record unusable.
    pub item_id: Option<u32>,
    pub title: String,
    /// File extension of the song, such as `mp3`.
    pub format: String,
    /// Whole seconds; the wire carries milliseconds.
    pub length: Duration,
    pub track_number: u32,
    pub album: String,
    pub artist: String,
    pub composer: String,
    pub comment: String,
    /// Zero when unknown.
    pub year: u32,
    pub genre: String,
}

impl SongRecord {
    /// Reads a record from one `mlit` listing item.
    #[must_use]
    pub fn from_item(item: &Container) -> Self {
        let text = |tag| item.text(tag).unwrap_or_default().to_owned();
        let unsigned = |tag| {
            item.integer(tag)
                .and_then(|value| u32::try_from(value).ok())
                .unwrap_or_default()
        };

        let millis = item
            .integer(Tag::SONG_TIME)
            .and_then(|value| u64::try_from(value).ok())
            .unwrap_or_default();

        Self {
            item_id: item
                .integer(Tag::ITEM_ID)
                .and_then(|value| u32::try_from(value).ok()),
            title: text(Tag::ITEM_NAME),
            format: text(Tag::SONG_FORMAT),
            length: Duration::from_secs(millis / 1000),
            track_number: unsigned(Tag::SONG_TRACK_NUMBER),
            album: text(Tag::SONG_ALBUM),
            artist: text(Tag::SONG_ARTIST),
            composer: text(Tag::SONG_COMPOSER),
            comment: text(Tag::SONG_COMMENT),
            year: unsigned(Tag::SONG_YEAR),
            genre: text(Tag::SONG_GENRE),
        }
    }
}

/// All records of a song listing, in wire order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Songs(pub Vec<SongRecord>);

impl Response for Songs {
    const NAME: &'static str = "songs";

    /// An empty database may come without a listing at all, since an empty
    /// `mlcl` is dropped while decoding.
    fn from_tree(tree: &Container) -> Result<Self> {
        let songs = tree
            .container(Tag::DATABASE_SONGS)
            .ok_or_else(|| Error::failed_precondition("songs response lacks a song listing"))?;

        let records = songs
            .container(Tag::LISTING)
            .map(|listing| {
                listing
                    .all(Tag::LISTING_ITEM)
                    .filter_map(|item| item.as_container())
                    .map(SongRecord::from_item)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self(records))
    }
}
