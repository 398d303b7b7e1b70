//! Session with a DAAP share.
//!
//! A [`SessionClient`] runs the handshake that makes the catalog of a share
//! available:
//!
//! ```text
//! GET /login                                   -> session id
//! GET /update?session-id=..                    -> server revision
//! GET /databases?session-id=..&revision-number=..
//!                                              -> database id
//! GET /databases/<id>/items?type=music&meta=..&session-id=..&revision-number=..
//!                                              -> song listing
//! ```
//!
//! Every step depends on what the previous one returned. The steps are
//! methods that take the outcome of the previous step by value, so they
//! cannot be called out of order. Any failure moves the client to
//! [`State::Failed`] and stops the handshake; nothing is retried. Connect
//! again with a fresh client, for example after asking for a password.
//!
//! The catalog is published only after the whole listing has been decoded,
//! so a failed or cancelled handshake leaves the previous catalog in place.
//!
//! # Example
//!
//! ```rust
//! use daapr::{
//!     catalog::SharedCatalog, config::Config, session::SessionClient, synchronizer::Synchronizer,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! let synchronizer = Synchronizer::new(SharedCatalog::default());
//! let mut client = SessionClient::new(&Config::new("192.168.1.2"))?;
//! let report = client.run(&synchronizer, CancellationToken::new()).await?;
//! println!("{} tracks", report.tracks);
//! ```

use std::{fmt, future::Future, time::Duration};

use http::StatusCode;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    credential::Credential,
    error::{Error, ErrorKind, Result},
    events::Event,
    protocol::{
        self,
        content_codes::Dictionary,
        dmap::{Codec, UnknownTagPolicy},
        handshake::{ContentCodes, Databases, Login, Update},
        songs::{self, SongRecord, Songs},
    },
    synchronizer::{Report, Synchronizer},
};

/// Status and body of a response from a share.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

/// Carries requests to a share.
pub trait Transport {
    /// Requests `path_and_query` relative to the root of the share.
    ///
    /// Resolves to an error only when no response was received; error
    /// statuses are returned as responses.
    fn get(&self, path_and_query: &str) -> impl Future<Output = Result<Response>> + Send;
}

/// Why a handshake failed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
pub enum Failure {
    /// The share could not be reached or answered with an error status.
    #[error("transport error")]
    Transport,

    #[error("request timed out")]
    Timeout,

    /// The share wants a password, or rejected the one given.
    #[error("authentication required")]
    AuthenticationRequired,

    /// A response was not a well-formed tag stream.
    #[error("malformed response")]
    Decode,

    /// A response lacked a field the handshake needs.
    #[error("unexpected response")]
    Protocol,

    #[error("cancelled")]
    Cancelled,
}

impl From<&Error> for Failure {
    fn from(e: &Error) -> Self {
        match e.kind {
            ErrorKind::Unauthenticated | ErrorKind::PermissionDenied => {
                Self::AuthenticationRequired
            }
            ErrorKind::DeadlineExceeded => Self::Timeout,
            ErrorKind::DataLoss => Self::Decode,
            ErrorKind::FailedPrecondition => Self::Protocol,
            ErrorKind::Cancelled => Self::Cancelled,
            _ => Self::Transport,
        }
    }
}

/// Progress of the handshake.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum State {
    #[default]
    Idle,
    LoggingIn,
    SessionEstablished,
    Updating,
    RevisionKnown,
    ResolvingDatabase,
    DatabaseKnown,
    FetchingCatalog,
    CatalogReady,
    Failed(Failure),
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::LoggingIn => write!(f, "logging in"),
            Self::SessionEstablished => write!(f, "session established"),
            Self::Updating => write!(f, "updating"),
            Self::RevisionKnown => write!(f, "revision known"),
            Self::ResolvingDatabase => write!(f, "resolving database"),
            Self::DatabaseKnown => write!(f, "database known"),
            Self::FetchingCatalog => write!(f, "fetching catalog"),
            Self::CatalogReady => write!(f, "catalog ready"),
            Self::Failed(failure) => write!(f, "failed: {failure}"),
        }
    }
}

/// Connection parameters and what the handshake learned so far.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionState {
    pub host: String,
    pub port: u16,
    pub credential: Option<Credential>,
    pub session_id: Option<i64>,
    /// Query string identifying the session; empty until logged in.
    pub login_query: String,
    pub revision: Option<i64>,
    pub database_id: Option<String>,
}

/// Outcome of a login, needed to update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Established {
    session_id: i64,
}

/// Outcome of an update, needed to resolve the database.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Revisioned {
    session_id: i64,
    revision: i64,
}

/// Outcome of resolving the database, needed to fetch the catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolved {
    session_id: i64,
    revision: i64,
    database_id: String,
}

impl Resolved {
    #[must_use]
    pub fn database_id(&self) -> &str {
        &self.database_id
    }
}

fn login_query(session_id: i64, revision: Option<i64>) -> String {
    match revision {
        Some(revision) => format!("session-id={session_id}&revision-number={revision}"),
        None => format!("session-id={session_id}"),
    }
}

/// Client of one share.
pub struct SessionClient<T> {
    transport: T,
    dictionary: Dictionary,
    unknown_tags: UnknownTagPolicy,
    timeout: Duration,
    learn_content_codes: bool,
    session: SessionState,
    state: State,
    event_tx: Option<UnboundedSender<Event>>,
}

impl SessionClient<crate::http::Client> {
    /// Creates a client that talks HTTP to the share in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self::with_transport(config, crate::http::Client::new(config)?))
    }
}

impl<T> SessionClient<T>
where
    T: Transport,
{
    #[must_use]
    pub fn with_transport(config: &Config, transport: T) -> Self {
        Self {
            transport,
            dictionary: Dictionary::default(),
            unknown_tags: config.unknown_tags,
            timeout: config.timeout,
            learn_content_codes: config.learn_content_codes,
            session: SessionState {
                host: config.host.clone(),
                port: config.port,
                credential: config.credential.clone(),
                ..SessionState::default()
            },
            state: State::Idle,
            event_tx: None,
        }
    }

    /// Sends [`Event::AuthenticationRequired`] or [`Event::ConnectionFailed`]
    /// to `event_tx` when [`run`](Self::run) fails.
    #[must_use]
    pub fn with_events(mut self, event_tx: UnboundedSender<Event>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    #[must_use]
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Content codes known to this client, including learned ones.
    #[must_use]
    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn enter(&mut self, state: State) {
        debug!("{}: {} -> {state}", self.session.host, self.state);
        self.state = state;
    }

    fn codec(&self) -> Codec<'_> {
        Codec::new(&self.dictionary).with_unknown_tags(self.unknown_tags)
    }

    /// Requests `path_and_query` and checks the response status.
    async fn request(&self, path_and_query: &str) -> Result<Response> {
        let response = tokio::time::timeout(self.timeout, self.transport.get(path_and_query))
            .await??;

        match response.status {
            status if status.is_success() => Ok(response),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::unauthenticated(
                format!("{path_and_query}: share answered {}", response.status),
            )),
            status => Err(Error::unavailable(format!(
                "{path_and_query}: share answered {status}"
            ))),
        }
    }

    async fn fetch<R>(&self, path_and_query: &str) -> Result<R>
    where
        R: protocol::Response + fmt::Debug,
    {
        let response = self.request(path_and_query).await?;
        protocol::decode(&self.codec(), &response.body)
    }

    /// Extends the dictionary with the content codes the share advertises.
    ///
    /// Returns the number of newly learned codes. Codes the dictionary
    /// already knows are kept as they are.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    pub async fn learn_content_codes(&mut self) -> Result<usize> {
        let ContentCodes(advertised) = self.fetch("/content-codes").await?;

        let learned = advertised
            .into_iter()
            .filter(|code| self.dictionary.learn(code.tag, code.name.clone(), code.wire_type))
            .count();
        debug!("{}: learned {learned} content codes", self.session.host);

        Ok(learned)
    }

    /// Logs in and opens a session.
    ///
    /// # Errors
    ///
    /// Returns [`Unauthenticated`](ErrorKind::Unauthenticated) if the share
    /// wants a password, or another error if the request fails or the
    /// response carries no session id.
    pub async fn login(&mut self) -> Result<Established> {
        self.enter(State::LoggingIn);
        let Login { session_id } = self.fetch("/login").await?;

        self.session.session_id = Some(session_id);
        self.session.login_query = login_query(session_id, None);
        self.enter(State::SessionEstablished);

        Ok(Established { session_id })
    }

    /// Reads the current revision of the catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response carries no
    /// server revision.
    pub async fn update(&mut self, established: Established) -> Result<Revisioned> {
        let Established { session_id } = established;

        self.enter(State::Updating);
        let path = format!("/update?{}", login_query(session_id, None));
        let Update { revision } = self.fetch(&path).await?;

        self.session.revision = Some(revision);
        self.session.login_query = login_query(session_id, Some(revision));
        self.enter(State::RevisionKnown);

        Ok(Revisioned {
            session_id,
            revision,
        })
    }

    /// Resolves the music database of the share.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response lists no
    /// database.
    pub async fn resolve_database(&mut self, revisioned: Revisioned) -> Result<Resolved> {
        let Revisioned {
            session_id,
            revision,
        } = revisioned;

        self.enter(State::ResolvingDatabase);
        let path = format!("/databases?{}", login_query(session_id, Some(revision)));
        let Databases { database_id, name } = self.fetch(&path).await?;

        debug!(
            "{}: database {database_id} ({})",
            self.session.host,
            name.as_deref().unwrap_or("unnamed")
        );
        self.session.database_id = Some(database_id.clone());
        self.enter(State::DatabaseKnown);

        Ok(Resolved {
            session_id,
            revision,
            database_id,
        })
    }

    /// Fetches the song listing of the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    pub async fn fetch_catalog(&mut self, resolved: &Resolved) -> Result<Vec<SongRecord>> {
        self.enter(State::FetchingCatalog);
        let path = format!(
            "/databases/{}/items?type=music&meta={}&{}",
            resolved.database_id,
            songs::meta(&self.dictionary),
            login_query(resolved.session_id, Some(resolved.revision)),
        );
        let Songs(records) = self.fetch(&path).await?;

        self.enter(State::CatalogReady);
        Ok(records)
    }

    /// Runs all steps of the handshake and returns the song listing.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing step, after moving to
    /// [`State::Failed`].
    pub async fn handshake(&mut self) -> Result<Vec<SongRecord>> {
        let result = self.try_handshake().await;
        if let Err(e) = &result {
            self.fail(e);
        }

        result
    }

    async fn try_handshake(&mut self) -> Result<Vec<SongRecord>> {
        if self.learn_content_codes {
            self.learn_content_codes().await?;
        }

        let established = self.login().await?;
        let revisioned = self.update(established).await?;
        let resolved = self.resolve_database(revisioned).await?;
        self.fetch_catalog(&resolved).await
    }

    fn fail(&mut self, e: &Error) {
        let failure = Failure::from(e);
        if self.state != State::Failed(failure) {
            warn!("{}: {} failed: {e}", self.session.host, self.state);
            self.enter(State::Failed(failure));
        }
    }

    /// Runs the handshake and publishes the listing through `synchronizer`.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing step. Nothing is published
    /// then.
    pub async fn connect(&mut self, synchronizer: &Synchronizer) -> Result<Report> {
        let records = self.handshake().await?;
        Ok(synchronizer.synchronize(&records))
    }

    /// Like [`connect`](Self::connect), but stops when `cancel` fires and
    /// reports failures as events.
    ///
    /// An in-flight request is dropped when cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`](ErrorKind::Cancelled) when cancelled, or the
    /// error of the first failing step.
    pub async fn run(
        &mut self,
        synchronizer: &Synchronizer,
        cancel: CancellationToken,
    ) -> Result<Report> {
        let result = tokio::select! {
            biased;

            () = cancel.cancelled() => Err(Error::cancelled("handshake cancelled")),
            result = self.connect(synchronizer) => result,
        };

        if let Err(e) = &result {
            self.fail(e);
            let event = match self.state {
                State::Failed(Failure::Cancelled) => None,
                State::Failed(Failure::AuthenticationRequired) => {
                    Some(Event::AuthenticationRequired)
                }
                _ => Some(Event::ConnectionFailed),
            };

            if let (Some(event), Some(event_tx)) = (event, &self.event_tx) {
                if event_tx.send(event).is_err() {
                    debug!("no one is listening for connection events");
                }
            }
        }

        result
    }

    /// Closes the session on the share.
    ///
    /// The published catalog is not touched.
    ///
    /// # Errors
    ///
    /// Returns [`FailedPrecondition`](ErrorKind::FailedPrecondition) when
    /// not logged in, or an error if the request fails.
    pub async fn logout(&mut self) -> Result<()> {
        let Some(session_id) = self.session.session_id else {
            return Err(Error::failed_precondition("not logged in"));
        };

        let path = format!("/logout?{}", self.session.login_query);
        self.request(&path).await?;

        debug!("{}: logged out of session {session_id}", self.session.host);
        self.session.session_id = None;
        self.session.login_query.clear();
        self.session.revision = None;
        self.session.database_id = None;
        self.enter(State::Idle);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_follow_error_kinds() {
        let cases = [
            (Error::unauthenticated("401"), Failure::AuthenticationRequired),
            (Error::deadline_exceeded("slow"), Failure::Timeout),
            (Error::data_loss("truncated"), Failure::Decode),
            (Error::failed_precondition("no mlid"), Failure::Protocol),
            (Error::cancelled("stop"), Failure::Cancelled),
            (Error::unavailable("refused"), Failure::Transport),
            (Error::unknown("?"), Failure::Transport),
        ];
        for (error, failure) in cases {
            assert_eq!(Failure::from(&error), failure, "{error}");
        }
    }

    #[test]
    fn login_query_grows_with_revision() {
        assert_eq!(login_query(1234, None), "session-id=1234");
        assert_eq!(
            login_query(1234, Some(7)),
            "session-id=1234&revision-number=7"
        );
    }

    #[test]
    fn states_display() {
        assert_eq!(State::default().to_string(), "idle");
        assert_eq!(
            State::Failed(Failure::AuthenticationRequired).to_string(),
            "failed: authentication required"
        );
    }
}
