//! Responses of the requests that establish a session.
//!
//! # Wire Format
//!
//! ```text
//! /login       mlog { mstt, mlid }
//! /update      mupd { mstt, musr }
//! /databases   avdb { mstt, mlcl { mlit { miid, minm, ... } ... } }
//! /content-codes
//!              mccr { mstt, mdcl { mcnm, mcna, mcty } ... }
//! ```

use super::{
    content_codes::{Tag, WireType},
    dmap::Container,
    Response,
};
use crate::error::{Error, Result};

/// Session issued by `/login`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Login {
    pub session_id: i64,
}

impl Response for Login {
    const NAME: &'static str = "login";

    fn from_tree(tree: &Container) -> Result<Self> {
        tree.container(Tag::LOGIN_RESPONSE)
            .and_then(|login| login.integer(Tag::SESSION_ID))
            .map(|session_id| Self { session_id })
            .ok_or_else(|| Error::failed_precondition("login response lacks a session id"))
    }
}

/// Catalog revision reported by `/update`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Update {
    pub revision: i64,
}

impl Response for Update {
    const NAME: &'static str = "update";

    fn from_tree(tree: &Container) -> Result<Self> {
        tree.container(Tag::UPDATE_RESPONSE)
            .and_then(|update| update.integer(Tag::SERVER_REVISION))
            .map(|revision| Self { revision })
            .ok_or_else(|| Error::failed_precondition("update response lacks a server revision"))
    }
}

/// First database listed by `/databases`.
///
/// Shares publish one music database; further ones are not used.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Databases {
    pub database_id: String,
    pub name: Option<String>,
}

impl Response for Databases {
    const NAME: &'static str = "databases";

    fn from_tree(tree: &Container) -> Result<Self> {
        let item = tree
            .descend(&[Tag::SERVER_DATABASES, Tag::LISTING, Tag::LISTING_ITEM])
            .ok_or_else(|| Error::failed_precondition("databases response lists no database"))?;

        let database_id = item
            .integer(Tag::ITEM_ID)
            .ok_or_else(|| Error::failed_precondition("database lacks an item id"))?;

        Ok(Self {
            database_id: database_id.to_string(),
            name: item.text(Tag::ITEM_NAME).map(ToOwned::to_owned),
        })
    }
}

/// A content code advertised by a peer.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Advertised {
    pub tag: Tag,
    pub name: String,
    pub wire_type: WireType,
}

/// Content codes advertised at `/content-codes`.
///
/// Entries with an empty code, a code that is not four bytes or an unknown
/// type number are left out.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContentCodes(pub Vec<Advertised>);

impl Response for ContentCodes {
    const NAME: &'static str = "content-codes";

    fn from_tree(tree: &Container) -> Result<Self> {
        let response = tree.container(Tag::CONTENT_CODES_RESPONSE).ok_or_else(|| {
            Error::failed_precondition("content codes response lacks a dictionary")
        })?;

        let codes = response
            .all(Tag::DICTIONARY)
            .filter_map(|entry| {
                let entry = entry.as_container()?;
                let tag = entry.text(Tag::CONTENT_CODES_NUMBER)?.parse().ok()?;
                let name = entry.text(Tag::CONTENT_CODES_NAME)?.to_owned();
                let wire_type = entry
                    .integer(Tag::CONTENT_CODES_TYPE)
                    .and_then(WireType::from_type_number)?;

                Some(Advertised {
                    tag,
                    name,
                    wire_type,
                })
            })
            .collect();

        Ok(Self(codes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ErrorKind, protocol::dmap::Value};

    fn nested(outer: Tag, inner: Container) -> Container {
        Container::new().with(outer, Value::Container(inner))
    }

    #[test]
    fn login_reads_session_id() {
        let tree = nested(
            Tag::LOGIN_RESPONSE,
            Container::new()
                .with(Tag::STATUS, Value::Integer(200))
                .with(Tag::SESSION_ID, Value::Integer(1234)),
        );
        assert_eq!(Login::from_tree(&tree).unwrap().session_id, 1234);
    }

    #[test]
    fn login_without_session_id_is_a_protocol_error() {
        let tree = nested(
            Tag::LOGIN_RESPONSE,
            Container::new().with(Tag::STATUS, Value::Integer(200)),
        );
        let err = Login::from_tree(&tree).unwrap_err();
        assert_eq!(err.kind, ErrorKind::FailedPrecondition);
    }

    #[test]
    fn update_reads_revision() {
        let tree = nested(
            Tag::UPDATE_RESPONSE,
            Container::new().with(Tag::SERVER_REVISION, Value::Integer(7)),
        );
        assert_eq!(Update::from_tree(&tree).unwrap().revision, 7);
        assert!(Update::from_tree(&Container::new()).is_err());
    }

    #[test]
    fn databases_reads_first_item() {
        let item = |id: i64| {
            Value::Container(
                Container::new()
                    .with(Tag::ITEM_ID, Value::Integer(id))
                    .with(Tag::ITEM_NAME, Value::Text(format!("Library {id}"))),
            )
        };
        let tree = nested(
            Tag::SERVER_DATABASES,
            nested(
                Tag::LISTING,
                Container::new()
                    .with(Tag::LISTING_ITEM, item(9))
                    .with(Tag::LISTING_ITEM, item(10)),
            ),
        );

        let databases = Databases::from_tree(&tree).unwrap();
        assert_eq!(databases.database_id, "9");
        assert_eq!(databases.name.as_deref(), Some("Library 9"));
    }

    #[test]
    fn content_codes_skip_incomplete_entries() {
        let entry = |code: &str, name: &str, number: i64| {
            Value::Container(
                Container::new()
                    .with(Tag::CONTENT_CODES_NUMBER, Value::Text(code.to_owned()))
                    .with(Tag::CONTENT_CODES_NAME, Value::Text(name.to_owned()))
                    .with(Tag::CONTENT_CODES_TYPE, Value::Integer(number)),
            )
        };
        let tree = nested(
            Tag::CONTENT_CODES_RESPONSE,
            Container::new()
                .with(Tag::STATUS, Value::Integer(200))
                .with(Tag::DICTIONARY, entry("aeXX", "com.example.extension", 3))
                .with(Tag::DICTIONARY, entry("bad", "com.example.short", 1))
                .with(Tag::DICTIONARY, entry("aeYY", "com.example.untyped", 0)),
        );

        let ContentCodes(codes) = ContentCodes::from_tree(&tree).unwrap();
        assert_eq!(
            codes,
            vec![Advertised {
                tag: Tag::new(b"aeXX"),
                name: "com.example.extension".to_owned(),
                wire_type: WireType::Short,
            }]
        );
    }
}
