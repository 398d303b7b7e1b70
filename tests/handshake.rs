use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use http::StatusCode;
use tokio_util::sync::CancellationToken;

use daapr::{
    catalog::{SharedCatalog, UNKNOWN},
    config::Config,
    error::{ErrorKind, Result},
    events::Event,
    protocol::{
        content_codes::{Dictionary, Tag, WireType},
        dmap::{Codec, Container, UnknownTagPolicy, Value},
    },
    session::{Failure, Response, SessionClient, State, Transport},
    synchronizer::Synchronizer,
};

/// A share that answers from a script, keyed by path without query.
#[derive(Default)]
struct ScriptedShare {
    responses: HashMap<&'static str, Response>,
    stalled: Option<&'static str>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedShare {
    fn answer(mut self, path: &'static str, status: StatusCode, body: Vec<u8>) -> Self {
        self.responses.insert(path, Response { status, body });
        self
    }

    fn ok(self, path: &'static str, tree: &Container) -> Self {
        let body = Codec::new(&Dictionary::default()).encode(tree).unwrap();
        self.answer(path, StatusCode::OK, body)
    }

    fn stall(mut self, path: &'static str) -> Self {
        self.stalled = Some(path);
        self
    }

    fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Transport for ScriptedShare {
    async fn get(&self, path_and_query: &str) -> Result<Response> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path_and_query.to_owned());

        let path = path_and_query
            .split_once('?')
            .map_or(path_and_query, |(path, _)| path);
        if self.stalled == Some(path) {
            std::future::pending::<()>().await;
        }

        Ok(self.responses.get(path).cloned().unwrap_or(Response {
            status: StatusCode::NOT_FOUND,
            body: Vec::new(),
        }))
    }
}

fn nested(tag: Tag, inner: Container) -> Container {
    Container::new().with(tag, Value::Container(inner))
}

fn login() -> Container {
    nested(
        Tag::LOGIN_RESPONSE,
        Container::new()
            .with(Tag::STATUS, Value::Integer(200))
            .with(Tag::SESSION_ID, Value::Integer(1234)),
    )
}

fn update() -> Container {
    nested(
        Tag::UPDATE_RESPONSE,
        Container::new()
            .with(Tag::STATUS, Value::Integer(200))
            .with(Tag::SERVER_REVISION, Value::Integer(7)),
    )
}

fn databases() -> Container {
    let database = Container::new()
        .with(Tag::ITEM_ID, Value::Integer(9))
        .with(Tag::ITEM_NAME, Value::Text("Music".to_owned()));
    nested(
        Tag::SERVER_DATABASES,
        Container::new()
            .with(Tag::STATUS, Value::Integer(200))
            .with(
                Tag::LISTING,
                Value::Container(
                    Container::new().with(Tag::LISTING_ITEM, Value::Container(database)),
                ),
            ),
    )
}

fn song(item_id: i64, title: &str, artist: &str, album: &str) -> Container {
    Container::new()
        .with(Tag::ITEM_ID, Value::Integer(item_id))
        .with(Tag::ITEM_NAME, Value::Text(title.to_owned()))
        .with(Tag::SONG_FORMAT, Value::Text("mp3".to_owned()))
        .with(Tag::SONG_ARTIST, Value::Text(artist.to_owned()))
        .with(Tag::SONG_ALBUM, Value::Text(album.to_owned()))
        .with(Tag::SONG_TIME, Value::Integer(238_000))
        .with(Tag::SONG_YEAR, Value::Integer(1997))
}

fn listing(songs: Vec<Container>) -> Container {
    let items = songs.into_iter().fold(Container::new(), |items, song| {
        items.with(Tag::LISTING_ITEM, Value::Container(song))
    });
    nested(
        Tag::DATABASE_SONGS,
        Container::new()
            .with(Tag::STATUS, Value::Integer(200))
            .with(Tag::LISTING, Value::Container(items)),
    )
}

fn two_songs() -> Container {
    listing(vec![
        song(1, "Airbag", "Radiohead", "OK Computer"),
        song(2, "Angel", "Massive Attack", ""),
    ])
}

fn share() -> ScriptedShare {
    ScriptedShare::default()
        .ok("/login", &login())
        .ok("/update", &update())
        .ok("/databases", &databases())
        .ok("/databases/9/items", &two_songs())
}

fn config() -> Config {
    Config::new("jukebox.local")
}

#[tokio::test]
async fn handshake_publishes_catalog() {
    let synchronizer = Synchronizer::new(SharedCatalog::default());
    let mut client = SessionClient::with_transport(&config(), share());

    let report = client.connect(&synchronizer).await.unwrap();

    assert_eq!(client.state(), State::CatalogReady);
    assert_eq!(client.session().session_id, Some(1234));
    assert_eq!(client.session().revision, Some(7));
    assert_eq!(client.session().database_id.as_deref(), Some("9"));
    assert_eq!(
        client.session().login_query,
        "session-id=1234&revision-number=7"
    );

    assert_eq!(report.tracks, 2);
    assert_eq!(report.artists, 2);
    assert_eq!(report.albums, 2);

    let catalog = synchronizer.catalog().snapshot();
    assert_eq!(catalog.tracks.len(), 2);
    assert_eq!(catalog.artists["Radiohead"].tracks, [1]);
    assert_eq!(catalog.albums[UNKNOWN].tracks, [2]);
    assert_eq!(catalog.tracks[&1].length, Duration::from_secs(238));

    let requests = client.transport().requests();
    assert_eq!(requests.len(), 4);
    assert_eq!(requests[0], "/login");
    assert_eq!(requests[1], "/update?session-id=1234");
    assert_eq!(requests[2], "/databases?session-id=1234&revision-number=7");
    assert!(requests[3].starts_with("/databases/9/items?type=music&meta=dmap.itemid,"));
    assert!(requests[3].ends_with("&session-id=1234&revision-number=7"));
}

#[tokio::test]
async fn unauthorized_login_requires_authentication() {
    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
    let catalog = SharedCatalog::default();
    let synchronizer = Synchronizer::new(catalog.clone()).with_events(event_tx.clone());
    let share = ScriptedShare::default().answer("/login", StatusCode::UNAUTHORIZED, Vec::new());
    let mut client = SessionClient::with_transport(&config(), share).with_events(event_tx);

    let err = client
        .run(&synchronizer, CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Unauthenticated);
    assert_eq!(
        client.state(),
        State::Failed(Failure::AuthenticationRequired)
    );
    assert_eq!(client.session().session_id, None);
    assert_eq!(event_rx.try_recv().ok(), Some(Event::AuthenticationRequired));
    assert!(event_rx.try_recv().is_err());
    assert!(catalog.read().is_empty());
}

#[tokio::test]
async fn truncated_listing_publishes_nothing() {
    let catalog = SharedCatalog::default();
    let synchronizer = Synchronizer::new(catalog.clone());

    let mut client = SessionClient::with_transport(&config(), share());
    client.connect(&synchronizer).await.unwrap();
    let published = catalog.snapshot();

    let mut body = Codec::new(&Dictionary::default())
        .encode(&listing(vec![song(3, "Teardrop", "Massive Attack", "Mezzanine")]))
        .unwrap();
    body.truncate(body.len() - 5);
    let truncated = share().answer("/databases/9/items", StatusCode::OK, body);
    let mut client = SessionClient::with_transport(&config(), truncated);

    let err = client.connect(&synchronizer).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::DataLoss);
    assert_eq!(client.state(), State::Failed(Failure::Decode));
    assert_eq!(*catalog.snapshot(), *published);
    assert!(!catalog.read().tracks.contains_key(&3));
}

#[tokio::test]
async fn missing_session_id_is_a_protocol_failure() {
    let without_session_id = nested(
        Tag::LOGIN_RESPONSE,
        Container::new().with(Tag::STATUS, Value::Integer(200)),
    );
    let share = share().ok("/login", &without_session_id);
    let mut client = SessionClient::with_transport(&config(), share);

    let err = client.handshake().await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::FailedPrecondition);
    assert_eq!(client.state(), State::Failed(Failure::Protocol));
    assert_eq!(client.transport().requests(), ["/login"]);
}

#[tokio::test]
async fn error_status_is_a_transport_failure() {
    let share = share().answer("/update", StatusCode::SERVICE_UNAVAILABLE, Vec::new());
    let mut client = SessionClient::with_transport(&config(), share);

    let err = client.handshake().await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Unavailable);
    assert_eq!(client.state(), State::Failed(Failure::Transport));
    assert_eq!(client.session().session_id, Some(1234));
    assert_eq!(client.session().revision, None);
}

#[tokio::test(start_paused = true)]
async fn stalled_request_times_out() {
    let mut config = config();
    config.timeout = Duration::from_secs(5);
    let share = share().stall("/databases");
    let mut client = SessionClient::with_transport(&config, share);

    let err = client.handshake().await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::DeadlineExceeded);
    assert_eq!(client.state(), State::Failed(Failure::Timeout));
}

#[tokio::test]
async fn cancellation_stops_handshake() {
    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
    let catalog = SharedCatalog::default();
    let synchronizer = Synchronizer::new(catalog.clone()).with_events(event_tx.clone());
    let share = share().stall("/databases/9/items");
    let mut client = SessionClient::with_transport(&config(), share).with_events(event_tx);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let handle = tokio::spawn(async move {
        tokio::task::yield_now().await;
        trigger.cancel();
    });

    let err = client.run(&synchronizer, cancel).await.unwrap_err();
    handle.await.unwrap();

    assert_eq!(err.kind, ErrorKind::Cancelled);
    assert_eq!(client.state(), State::Failed(Failure::Cancelled));
    assert!(catalog.read().is_empty());
    assert!(event_rx.try_recv().is_err());
}

#[tokio::test]
async fn learned_content_codes_decode_extensions() {
    let extension = Tag::new(b"aeXX");

    let advertised = Container::new()
        .with(Tag::CONTENT_CODES_NUMBER, Value::Text("aeXX".to_owned()))
        .with(
            Tag::CONTENT_CODES_NAME,
            Value::Text("com.example.rating".to_owned()),
        )
        .with(Tag::CONTENT_CODES_TYPE, Value::Integer(1));
    let content_codes = nested(
        Tag::CONTENT_CODES_RESPONSE,
        Container::new()
            .with(Tag::STATUS, Value::Integer(200))
            .with(Tag::DICTIONARY, Value::Container(advertised)),
    );

    let mut server_dictionary = Dictionary::default();
    server_dictionary.learn(extension, "com.example.rating", WireType::Byte);
    let songs = listing(vec![song(1, "Airbag", "Radiohead", "OK Computer")
        .with(extension, Value::Integer(5))]);
    let songs = Codec::new(&server_dictionary).encode(&songs).unwrap();

    let share = share()
        .ok("/content-codes", &content_codes)
        .answer("/databases/9/items", StatusCode::OK, songs.clone());
    let mut config = config();
    config.learn_content_codes = true;
    let mut client = SessionClient::with_transport(&config, share);

    let records = client.handshake().await.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(client.dictionary().learned(), 1);
    assert_eq!(
        client.dictionary().name_of(extension),
        Some("com.example.rating")
    );
    assert_eq!(client.transport().requests()[0], "/content-codes");
    assert!(client.transport().requests()[4].contains("meta=dmap.itemid,"));

    let listing = Codec::new(client.dictionary())
        .with_unknown_tags(UnknownTagPolicy::Reject)
        .decode(&songs)
        .unwrap();
    let item = listing
        .descend(&[Tag::DATABASE_SONGS, Tag::LISTING, Tag::LISTING_ITEM])
        .unwrap();
    assert_eq!(item.integer(extension), Some(5));
}

#[tokio::test]
async fn logout_closes_session() {
    let share = share().answer("/logout", StatusCode::NO_CONTENT, Vec::new());
    let mut client = SessionClient::with_transport(&config(), share);

    let err = client.logout().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::FailedPrecondition);

    client.handshake().await.unwrap();
    let query = client.session().login_query.clone();
    assert_eq!(query, "session-id=1234&revision-number=7");
    client.logout().await.unwrap();

    assert_eq!(client.state(), State::Idle);
    assert_eq!(client.session().session_id, None);
    assert!(client.session().login_query.is_empty());
    assert_eq!(
        client.transport().requests().last().map(String::as_str),
        Some(&*format!("/logout?{query}"))
    );
}
