//! Content codes of the DMAP/DAAP tag protocol.
//!
//! Every element on the wire starts with a four byte [`Tag`]. The tag alone
//! tells a reader how to interpret the payload that follows: as a signed
//! integer of some width, as UTF-8 text, as a timestamp, as a version or as a
//! nested container of more elements. This module holds the well-known codes
//! as a compile-time table and a [`Dictionary`] that can be extended with the
//! codes a peer advertises at `/content-codes`.
//!
//! # Example
//!
//! ```rust
//! use daapr::protocol::content_codes::{Dictionary, Tag, WireType};
//!
//! let dictionary = Dictionary::default();
//! let code = dictionary.lookup(Tag::SESSION_ID).unwrap();
//! assert_eq!(code.name, "dmap.sessionid");
//! assert_eq!(code.wire_type, WireType::Long);
//! ```

use std::{
    borrow::Cow,
    collections::HashMap,
    fmt,
    str::FromStr,
    sync::LazyLock,
};

use self::WireType::{
    Byte, Container, Date, Long, LongLong, Short, String as Text, VersionTriple,
};
use crate::error::Error;

/// A four byte content code, such as `mlog` or `miid`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag(pub [u8; 4]);

impl Tag {
    pub const CONTENT_CODES_RESPONSE: Self = Self(*b"mccr");
    pub const DICTIONARY: Self = Self(*b"mdcl");
    pub const CONTENT_CODES_NUMBER: Self = Self(*b"mcnm");
    pub const CONTENT_CODES_NAME: Self = Self(*b"mcna");
    pub const CONTENT_CODES_TYPE: Self = Self(*b"mcty");

    pub const LOGIN_RESPONSE: Self = Self(*b"mlog");
    pub const SESSION_ID: Self = Self(*b"mlid");
    pub const UPDATE_RESPONSE: Self = Self(*b"mupd");
    pub const SERVER_REVISION: Self = Self(*b"musr");
    pub const SERVER_DATABASES: Self = Self(*b"avdb");
    pub const DATABASE_SONGS: Self = Self(*b"adbs");
    pub const LISTING: Self = Self(*b"mlcl");
    pub const LISTING_ITEM: Self = Self(*b"mlit");
    pub const STATUS: Self = Self(*b"mstt");

    pub const ITEM_ID: Self = Self(*b"miid");
    pub const ITEM_NAME: Self = Self(*b"minm");
    pub const SONG_FORMAT: Self = Self(*b"asfm");
    pub const SONG_ARTIST: Self = Self(*b"asar");
    pub const SONG_ALBUM: Self = Self(*b"asal");
    pub const SONG_TIME: Self = Self(*b"astm");
    pub const SONG_TRACK_NUMBER: Self = Self(*b"astn");
    pub const SONG_COMMENT: Self = Self(*b"ascm");
    pub const SONG_COMPOSER: Self = Self(*b"ascp");
    pub const SONG_YEAR: Self = Self(*b"asyr");
    pub const SONG_GENRE: Self = Self(*b"asgn");

    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

/// Formats the tag as text, escaping the odd non-ASCII byte.
impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.escape_ascii())
    }
}

/// Parses a four character code, as advertised in `mcnm` elements.
impl FromStr for Tag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| Error::invalid_argument(format!("{s} is not a four byte tag")))?;
        Ok(Self(bytes))
    }
}

/// Primitive interpretation of an element payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum WireType {
    /// 1 byte signed integer
    Byte,
    /// 2 byte signed integer
    Short,
    /// 4 byte signed integer
    Long,
    /// 8 byte signed integer
    LongLong,
    /// UTF-8 text of the declared length
    String,
    /// Seconds since the Unix epoch
    Date,
    /// 2 byte major, 1 byte minor, 1 byte patch
    VersionTriple,
    /// Nested elements filling the declared length
    Container,
}

impl WireType {
    /// Fixed payload width of numeric types, `None` for variable width ones.
    #[must_use]
    pub const fn width(self) -> Option<usize> {
        match self {
            Self::Byte => Some(1),
            Self::Short => Some(2),
            Self::Long | Self::VersionTriple => Some(4),
            Self::LongLong => Some(8),
            Self::String | Self::Date | Self::Container => None,
        }
    }

    /// Maps the type numbers used in `mcty` elements.
    ///
    /// Unsigned variants share the width of their signed counterparts.
    #[must_use]
    pub const fn from_type_number(number: i64) -> Option<Self> {
        match number {
            1 | 2 => Some(Self::Byte),
            3 | 4 => Some(Self::Short),
            5 | 6 => Some(Self::Long),
            7 | 8 => Some(Self::LongLong),
            9 => Some(Self::String),
            10 => Some(Self::Date),
            11 => Some(Self::VersionTriple),
            12 => Some(Self::Container),
            _ => None,
        }
    }
}

/// A registered content code: its semantic name and payload type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContentCode {
    pub tag: Tag,
    pub name: Cow<'static, str>,
    pub wire_type: WireType,
}

impl ContentCode {
    const fn known(tag: &[u8; 4], name: &'static str, wire_type: WireType) -> Self {
        Self {
            tag: Tag(*tag),
            name: Cow::Borrowed(name),
            wire_type,
        }
    }
}

/// The well-known content codes.
///
/// `mcnm` is a four character code sent as an integer; reading it as text is
/// what a caller wants when learning new codes.
pub const CONTENT_CODES: &[ContentCode] = &[
    ContentCode::known(b"mtco", "dmap.specifiedtotalcount", Long),
    ContentCode::known(b"mdcl", "dmap.dictionary", Container),
    ContentCode::known(b"aeGI", "com.apple.itunes.itms-genreid", Long),
    ContentCode::known(b"aeNV", "com.apple.itunes.norm-volume", Long),
    ContentCode::known(b"astn", "daap.songtracknumber", Short),
    ContentCode::known(b"abal", "daap.browsealbumlisting", Container),
    ContentCode::known(b"asco", "daap.songcompilation", Byte),
    ContentCode::known(b"aeSP", "com.apple.itunes.smart-playlist", Byte),
    ContentCode::known(b"ascp", "daap.songcomposer", Text),
    ContentCode::known(b"aseq", "daap.songeqpreset", Text),
    ContentCode::known(b"abpl", "daap.baseplaylist", Byte),
    ContentCode::known(b"msqy", "dmap.supportsquery", Byte),
    ContentCode::known(b"aeCI", "com.apple.itunes.itms-composerid", Long),
    ContentCode::known(b"mcnm", "dmap.contentcodesnumber", Text),
    ContentCode::known(b"abro", "daap.databasebrowse", Container),
    ContentCode::known(b"assz", "daap.songsize", Long),
    ContentCode::known(b"abcp", "daap.browsecomposerlisting", Container),
    ContentCode::known(b"aeAI", "com.apple.itunes.itms-artistid", Long),
    ContentCode::known(b"aeHV", "com.apple.itunes.has-video", Byte),
    ContentCode::known(b"msts", "dmap.statusstring", Text),
    ContentCode::known(b"msas", "dmap.authenticationschemes", Long),
    ContentCode::known(b"ascr", "daap.songcontentrating", Byte),
    ContentCode::known(b"aePI", "com.apple.itunes.itms-playlistid", Long),
    ContentCode::known(b"mstt", "dmap.status", Long),
    ContentCode::known(b"msix", "dmap.supportsindex", Byte),
    ContentCode::known(b"msrs", "dmap.supportsresolve", Byte),
    ContentCode::known(b"mccr", "dmap.contentcodesresponse", Container),
    ContentCode::known(b"asdk", "daap.songdatakind", Byte),
    ContentCode::known(b"asar", "daap.songartist", Text),
    ContentCode::known(b"ascs", "daap.songcodecsubtype", Long),
    ContentCode::known(b"msau", "dmap.authenticationmethod", Byte),
    ContentCode::known(b"aeSU", "com.apple.itunes.season-num", Long),
    ContentCode::known(b"arif", "daap.resolveinfo", Container),
    ContentCode::known(b"asct", "daap.songcategory", Text),
    ContentCode::known(b"asfm", "daap.songformat", Text),
    ContentCode::known(b"aeEN", "com.apple.itunes.episode-num-str", Text),
    ContentCode::known(b"apsm", "daap.playlistshufflemode", Byte),
    ContentCode::known(b"abar", "daap.browseartistlisting", Container),
    ContentCode::known(b"mslr", "dmap.loginrequired", Byte),
    ContentCode::known(b"msex", "dmap.supportsextensions", Byte),
    ContentCode::known(b"mudl", "dmap.deletedidlisting", Container),
    ContentCode::known(b"asdm", "daap.songdatemodified", Date),
    ContentCode::known(b"asky", "daap.songkeywords", Text),
    ContentCode::known(b"asul", "daap.songdataurl", Text),
    ContentCode::known(b"aeSV", "com.apple.itunes.music-sharing-version", Long),
    ContentCode::known(b"f\x8dch", "dmap.haschildcontainers", Byte),
    ContentCode::known(b"mlcl", "dmap.listing", Container),
    ContentCode::known(b"msrv", "dmap.serverinforesponse", Container),
    ContentCode::known(b"asdn", "daap.songdiscnumber", Short),
    ContentCode::known(b"astc", "daap.songtrackcount", Short),
    ContentCode::known(b"apso", "daap.playlistsongs", Container),
    ContentCode::known(b"ascd", "daap.songcodectype", Long),
    ContentCode::known(b"minm", "dmap.itemname", Text),
    ContentCode::known(b"mimc", "dmap.itemcount", Long),
    ContentCode::known(b"mctc", "dmap.containercount", Long),
    ContentCode::known(b"aeSF", "com.apple.itunes.itms-storefrontid", Long),
    ContentCode::known(b"asrv", "daap.songrelativevolume", Short),
    ContentCode::known(b"msup", "dmap.supportsupdate", Byte),
    ContentCode::known(b"mcna", "dmap.contentcodesname", Text),
    ContentCode::known(b"agrp", "daap.songgrouping", Text),
    ContentCode::known(b"mikd", "dmap.itemkind", Byte),
    ContentCode::known(b"mupd", "dmap.updateresponse", Container),
    ContentCode::known(b"aeNN", "com.apple.itunes.network-name", Text),
    ContentCode::known(b"asyr", "daap.songyear", Short),
    ContentCode::known(b"aeES", "com.apple.itunes.episode-sort", Long),
    ContentCode::known(b"miid", "dmap.itemid", Long),
    ContentCode::known(b"msbr", "dmap.supportsbrowse", Byte),
    ContentCode::known(b"muty", "dmap.updatetype", Byte),
    ContentCode::known(b"mcty", "dmap.contentcodestype", Short),
    ContentCode::known(b"aply", "daap.databaseplaylists", Container),
    ContentCode::known(b"aePP", "com.apple.itunes.is-podcast-playlist", Byte),
    ContentCode::known(b"aeSI", "com.apple.itunes.itms-songid", Long),
    ContentCode::known(b"assp", "daap.songstoptime", Long),
    ContentCode::known(b"aslc", "daap.songlongcontentdescription", Text),
    ContentCode::known(b"mcon", "dmap.container", Container),
    ContentCode::known(b"mlit", "dmap.listingitem", Container),
    ContentCode::known(b"asur", "daap.songuserrating", Byte),
    ContentCode::known(b"mspi", "dmap.supportspersistentids", Byte),
    ContentCode::known(b"assr", "daap.songsamplerate", Long),
    ContentCode::known(b"asda", "daap.songdateadded", Date),
    ContentCode::known(b"asbr", "daap.songbitrate", Short),
    ContentCode::known(b"mcti", "dmap.containeritemid", Long),
    ContentCode::known(b"mpco", "dmap.parentcontainerid", Long),
    ContentCode::known(b"msdc", "dmap.databasescount", Long),
    ContentCode::known(b"mlog", "dmap.loginresponse", Container),
    ContentCode::known(b"mlid", "dmap.sessionid", Long),
    ContentCode::known(b"musr", "dmap.serverrevision", Long),
    ContentCode::known(b"asdb", "daap.songdisabled", Byte),
    ContentCode::known(b"asdt", "daap.songdescription", Text),
    ContentCode::known(b"mbcl", "dmap.bag", Container),
    ContentCode::known(b"msal", "dmap.supportsautologout", Byte),
    ContentCode::known(b"mstm", "dmap.timeoutinterval", Long),
    ContentCode::known(b"asdc", "daap.songdisccount", Short),
    ContentCode::known(b"asbt", "daap.songbeatsperminute", Short),
    ContentCode::known(b"asgn", "daap.songgenre", Text),
    ContentCode::known(b"aprm", "daap.playlistrepeatmode", Byte),
    ContentCode::known(b"asst", "daap.songstarttime", Long),
    ContentCode::known(b"mper", "dmap.persistentid", LongLong),
    ContentCode::known(b"mrco", "dmap.returnedcount", Long),
    ContentCode::known(b"mpro", "dmap.protocolversion", VersionTriple),
    ContentCode::known(b"ascm", "daap.songcomment", Text),
    ContentCode::known(b"aePC", "com.apple.itunes.is-podcast", Byte),
    ContentCode::known(b"aeSN", "com.apple.itunes.series-name", Text),
    ContentCode::known(b"arsv", "daap.resolve", Container),
    ContentCode::known(b"asal", "daap.songalbum", Text),
    ContentCode::known(b"apro", "daap.protocolversion", VersionTriple),
    ContentCode::known(b"avdb", "daap.serverdatabases", Container),
    ContentCode::known(b"aeMK", "com.apple.itunes.mediakind", Byte),
    ContentCode::known(b"astm", "daap.songtime", Long),
    ContentCode::known(b"adbs", "daap.databasesongs", Container),
    ContentCode::known(b"abgn", "daap.browsegenrelisting", Container),
    ContentCode::known(b"ascn", "daap.songcontentdescription", Text),
    // Needed to talk to iPhoto shares.
    ContentCode::known(b"ppro", "dpap.protocolversion", Long),
    ContentCode::known(b"pret", "dpap.unknown", Container),
];

static WELL_KNOWN: LazyLock<HashMap<Tag, &'static ContentCode>> =
    LazyLock::new(|| CONTENT_CODES.iter().map(|code| (code.tag, code)).collect());

/// Content codes known to one client.
///
/// Starts out with the well-known codes. Codes learned from a peer are kept
/// per dictionary, so clients talking to different peers never share them.
#[derive(Clone, Debug, Default)]
pub struct Dictionary {
    learned: HashMap<Tag, ContentCode>,
}

impl Dictionary {
    /// Looks up the content code registered for `tag`.
    #[must_use]
    pub fn lookup(&self, tag: Tag) -> Option<&ContentCode> {
        WELL_KNOWN
            .get(&tag)
            .copied()
            .or_else(|| self.learned.get(&tag))
    }

    /// Registers a code advertised by a peer.
    ///
    /// Well-known codes are never overridden. Returns whether the code was
    /// added.
    pub fn learn(&mut self, tag: Tag, name: impl Into<String>, wire_type: WireType) -> bool {
        if self.lookup(tag).is_some() {
            return false;
        }

        let name = name.into();
        trace!("learned content code {tag}: {name} ({wire_type:?})");
        self.learned.insert(
            tag,
            ContentCode {
                tag,
                name: Cow::Owned(name),
                wire_type,
            },
        );

        true
    }

    /// Number of codes learned from peers.
    #[must_use]
    pub fn learned(&self) -> usize {
        self.learned.len()
    }

    /// Semantic name of `tag`, as used in `meta=` query parameters.
    #[must_use]
    pub fn name_of(&self, tag: Tag) -> Option<&str> {
        self.lookup(tag).map(|code| code.name.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_codes_are_unique() {
        assert_eq!(WELL_KNOWN.len(), CONTENT_CODES.len());
    }

    #[test]
    fn handshake_codes_have_expected_types() {
        let dictionary = Dictionary::default();
        for (tag, wire_type) in [
            (Tag::LOGIN_RESPONSE, WireType::Container),
            (Tag::SESSION_ID, WireType::Long),
            (Tag::SERVER_REVISION, WireType::Long),
            (Tag::SERVER_DATABASES, WireType::Container),
            (Tag::ITEM_ID, WireType::Long),
            (Tag::SONG_TRACK_NUMBER, WireType::Short),
            (Tag::SONG_ARTIST, WireType::String),
        ] {
            assert_eq!(dictionary.lookup(tag).map(|c| c.wire_type), Some(wire_type));
        }
    }

    #[test]
    fn learning_never_overrides_well_known_codes() {
        let mut dictionary = Dictionary::default();
        assert!(!dictionary.learn(Tag::SESSION_ID, "bogus", WireType::String));
        assert_eq!(dictionary.name_of(Tag::SESSION_ID), Some("dmap.sessionid"));

        let tag = "aeXX".parse().unwrap();
        assert!(dictionary.learn(tag, "com.example.extension", WireType::Short));
        assert!(!dictionary.learn(tag, "com.example.again", WireType::Long));
        assert_eq!(dictionary.learned(), 1);
        assert_eq!(dictionary.lookup(tag).unwrap().wire_type, WireType::Short);
    }

    #[test]
    fn tags_display_escaped() {
        assert_eq!(Tag::new(b"f\x8dch").to_string(), "f\\x8dch");
        assert_eq!(Tag::SESSION_ID.to_string(), "mlid");
        assert!("toolong".parse::<Tag>().is_err());
    }

    #[test]
    fn type_numbers() {
        assert_eq!(WireType::from_type_number(5), Some(WireType::Long));
        assert_eq!(WireType::from_type_number(6), Some(WireType::Long));
        assert_eq!(WireType::from_type_number(12), Some(WireType::Container));
        assert_eq!(WireType::from_type_number(0), None);
    }
}
