//! Connection lifecycle management.
//!
//! The server talks to PostgreSQL over one long-lived connection owned by a
//! [`ConnectionManager`]. Operations borrow it through
//! [`ConnectionManager::with_connection`], which probes it, reconnects with
//! bounded retries when it is gone, and hands it back afterwards. Calls that
//! carry their own connection parameters get a temporary connection instead
//! and never touch the shared one.

use crate::config::{ConnectionProfile, ProfileOverrides};
use crate::error::{ConnectErrorKind, DbError, DbResult, classify_connect_error};
use futures_util::future::BoxFuture;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection as _;
use std::future::Future;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Default base delay for the linear backoff between connect attempts.
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

const APPLICATION_NAME: &str = "pg-mcp-server";

/// Opens, probes and closes connections. The seam between the manager and the driver.
pub trait Connector: Send + Sync + 'static {
    type Connection: Send + 'static;

    /// Make a single connection attempt.
    fn connect(
        &self,
        profile: &ConnectionProfile,
    ) -> impl Future<Output = DbResult<Self::Connection>> + Send;

    /// Check that an established connection still answers.
    fn ping(&self, conn: &mut Self::Connection) -> impl Future<Output = DbResult<()>> + Send;

    /// Close a healthy connection.
    fn close(&self, conn: Self::Connection) -> impl Future<Output = ()> + Send;
}

/// [`Connector`] backed by `sqlx::PgConnection`.
#[derive(Debug, Clone, Default)]
pub struct PgConnector {
    /// Bounds `ping`; a dead peer otherwise blocks until TCP gives up.
    ping_timeout: Option<Duration>,
}

impl PgConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = Some(timeout);
        self
    }

    fn connect_options(profile: &ConnectionProfile) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&profile.host)
            .port(profile.port)
            .username(&profile.user)
            .password(&profile.password)
            .database(&profile.database)
            .application_name(APPLICATION_NAME)
    }
}

impl Connector for PgConnector {
    type Connection = PgConnection;

    async fn connect(&self, profile: &ConnectionProfile) -> DbResult<PgConnection> {
        let options = Self::connect_options(profile);
        let attempt = PgConnection::connect_with(&options);

        let result = match profile.connect_timeout() {
            Some(limit) => tokio::time::timeout(limit, attempt).await.map_err(|_| {
                DbError::connect(
                    ConnectErrorKind::Timeout,
                    format!(
                        "Connecting to {} timed out after {}s",
                        profile.target(),
                        limit.as_secs()
                    ),
                )
            })?,
            None => attempt.await,
        };

        result.map_err(|e| {
            DbError::connect(
                classify_connect_error(&e),
                format!("Connecting to {} failed: {}", profile.target(), e),
            )
        })
    }

    async fn ping(&self, conn: &mut PgConnection) -> DbResult<()> {
        let probe = conn.ping();
        let result = match self.ping_timeout {
            Some(limit) => tokio::time::timeout(limit, probe).await.map_err(|_| {
                DbError::connect(ConnectErrorKind::Timeout, "Liveness probe timed out")
            })?,
            None => probe.await,
        };
        result.map_err(|e| {
            DbError::connect(ConnectErrorKind::Unreachable, format!("Liveness probe failed: {e}"))
        })
    }

    async fn close(&self, conn: PgConnection) {
        if let Err(e) = conn.close().await {
            debug!(error = %e, "Error while closing connection");
        }
    }
}

/// Where the shared connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection; the next operation connects.
    Absent,
    /// First connect in progress.
    Connecting,
    /// A connection exists and passed its last check.
    Established,
    /// The previous connection failed its probe and a replacement is being opened.
    Reconnecting,
    /// Shut down; every later call fails.
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Absent => "absent",
            Self::Connecting => "connecting",
            Self::Established => "established",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Linear backoff: `base_delay * attempt`, capped at the profile's connect timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_RETRY_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32, cap: Option<Duration>) -> Duration {
        let delay = self.base_delay.saturating_mul(attempt);
        match cap {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }
}

/// Resets the shared state to `Absent` unless disarmed, so a dropped or
/// failed operation never leaves a half-initialized `Established` behind.
struct StateReset<'a> {
    state: &'a StdMutex<ConnectionState>,
    armed: bool,
}

impl<'a> StateReset<'a> {
    fn new(state: &'a StdMutex<ConnectionState>) -> Self {
        Self { state, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for StateReset<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state != ConnectionState::Closed {
                *state = ConnectionState::Absent;
            }
        }
    }
}

/// Owns the single shared connection.
pub struct ConnectionManager<C: Connector = PgConnector> {
    connector: C,
    profile: ConnectionProfile,
    retry: RetryPolicy,
    /// Held across network I/O; serializes use of the connection.
    slot: Mutex<Option<C::Connection>>,
    state: StdMutex<ConnectionState>,
}

pub type PgConnectionManager = ConnectionManager<PgConnector>;

impl<C: Connector> std::fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("profile", &self.profile)
            .field("retry", &self.retry)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<C: Connector> ConnectionManager<C> {
    /// Create a manager. No connection is opened until first use.
    pub fn new(connector: C, profile: ConnectionProfile) -> Self {
        Self {
            connector,
            profile,
            retry: RetryPolicy::default(),
            slot: Mutex::new(None),
            state: StdMutex::new(ConnectionState::Absent),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The base profile used for the shared connection.
    pub fn profile(&self) -> &ConnectionProfile {
        &self.profile
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state != next {
            debug!(from = %*state, to = %next, "Connection state change");
            *state = next;
        }
    }

    /// Open a connection for `profile`, retrying transient failures.
    ///
    /// Makes at most `max_retries + 1` attempts. Authentication and
    /// missing-database failures are returned on first occurrence.
    pub async fn connect(&self, profile: &ConnectionProfile) -> DbResult<C::Connection> {
        let max_attempts = profile.max_attempts();
        let mut attempt = 1;
        loop {
            debug!(target_db = %profile.target(), attempt, max_attempts, "Connecting to PostgreSQL");
            match self.connector.connect(profile).await {
                Ok(conn) => {
                    info!(target_db = %profile.target(), attempt, "Connected to PostgreSQL");
                    return Ok(conn);
                }
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = self.retry.delay_for(attempt, profile.connect_timeout());
                    warn!(
                        target_db = %profile.target(),
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Connection attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    warn!(
                        target_db = %profile.target(),
                        attempt,
                        error = %err,
                        "Giving up on connection"
                    );
                    return Err(err.with_attempts(attempt));
                }
            }
        }
    }

    /// Run `f` with a live connection.
    ///
    /// Without overrides this uses the shared connection: it is probed (or
    /// opened) first, and handed back afterwards unless `f` failed with a
    /// connection-level error, in which case it is discarded. With non-empty
    /// overrides a temporary connection is opened for the derived profile and
    /// closed on return.
    pub async fn with_connection<T, F>(
        &self,
        overrides: Option<&ProfileOverrides>,
        f: F,
    ) -> DbResult<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut C::Connection) -> BoxFuture<'c, DbResult<T>> + Send,
    {
        if let Some(overrides) = overrides.filter(|o| !o.is_empty()) {
            return self.with_temporary_connection(overrides, f).await;
        }

        let mut slot = self.slot.lock().await;
        if self.state() == ConnectionState::Closed {
            return Err(DbError::connect(
                ConnectErrorKind::Unreachable,
                "The connection manager has been shut down",
            ));
        }

        let reset = StateReset::new(&self.state);
        let mut conn = match slot.take() {
            Some(mut conn) => match self.connector.ping(&mut conn).await {
                Ok(()) => conn,
                Err(e) => {
                    warn!(error = %e, "Connection lost, reconnecting");
                    drop(conn);
                    self.set_state(ConnectionState::Reconnecting);
                    self.connect(&self.profile).await?
                }
            },
            None => {
                self.set_state(ConnectionState::Connecting);
                self.connect(&self.profile).await?
            }
        };
        self.set_state(ConnectionState::Established);

        let result = f(&mut conn).await;
        match &result {
            Err(e) if e.is_connection_failure() => {
                warn!(error = %e, "Discarding connection after failure");
                drop(conn);
                // `reset` moves the state back to Absent
            }
            _ => {
                *slot = Some(conn);
                reset.disarm();
            }
        }
        result
    }

    async fn with_temporary_connection<T, F>(&self, overrides: &ProfileOverrides, f: F) -> DbResult<T>
    where
        F: for<'c> FnOnce(&'c mut C::Connection) -> BoxFuture<'c, DbResult<T>>,
    {
        let profile = self.profile.overlay(overrides)?;
        debug!(target_db = %profile.target(), "Opening temporary connection");
        let mut conn = self.connect(&profile).await?;
        let result = f(&mut conn).await;
        match &result {
            Err(e) if e.is_connection_failure() => drop(conn),
            _ => self.connector.close(conn).await,
        }
        result
    }

    /// Establish the shared connection now instead of on first use.
    pub async fn warm_up(&self) -> DbResult<()> {
        self.with_connection(None, |_| Box::pin(async { Ok(()) }))
            .await
    }

    /// Close the shared connection. Later calls fail with a connection error.
    pub async fn close(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(conn) = slot.take() {
            info!("Closing PostgreSQL connection");
            self.connector.close(conn).await;
        }
        self.set_state(ConnectionState::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExecErrorKind;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    #[derive(Debug)]
    struct FakeConn {
        id: u32,
    }

    /// Scripted connector: each connect pops the next outcome, succeeding once the script is empty.
    #[derive(Default)]
    struct FakeConnector {
        script: StdMutex<VecDeque<ConnectErrorKind>>,
        always_fail: Option<ConnectErrorKind>,
        connects: AtomicU32,
        pings: AtomicU32,
        closes: AtomicU32,
        ping_fails: AtomicBool,
        hang_on_connect: AtomicBool,
    }

    impl FakeConnector {
        fn failing_first(failures: &[ConnectErrorKind]) -> Self {
            Self {
                script: StdMutex::new(failures.iter().copied().collect()),
                ..Default::default()
            }
        }

        fn always(kind: ConnectErrorKind) -> Self {
            Self {
                always_fail: Some(kind),
                ..Default::default()
            }
        }
    }

    impl Connector for Arc<FakeConnector> {
        type Connection = FakeConn;

        async fn connect(&self, _profile: &ConnectionProfile) -> DbResult<FakeConn> {
            let n = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
            if self.hang_on_connect.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if let Some(kind) = self.always_fail {
                return Err(DbError::connect(kind, "scripted failure"));
            }
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(kind) => Err(DbError::connect(kind, "scripted failure")),
                None => Ok(FakeConn { id: n }),
            }
        }

        async fn ping(&self, _conn: &mut FakeConn) -> DbResult<()> {
            self.pings.fetch_add(1, Ordering::SeqCst);
            if self.ping_fails.swap(false, Ordering::SeqCst) {
                Err(DbError::connect(ConnectErrorKind::Unreachable, "gone"))
            } else {
                Ok(())
            }
        }

        async fn close(&self, _conn: FakeConn) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn profile(max_retries: u32) -> ConnectionProfile {
        ConnectionProfile {
            max_retries,
            connect_timeout_seconds: 1,
            ..Default::default()
        }
    }

    fn manager(connector: &Arc<FakeConnector>, max_retries: u32) -> ConnectionManager<Arc<FakeConnector>> {
        ConnectionManager::new(connector.clone(), profile(max_retries)).with_retry_policy(
            RetryPolicy {
                base_delay: Duration::from_millis(1),
            },
        )
    }

    async fn conn_id(manager: &ConnectionManager<Arc<FakeConnector>>) -> DbResult<u32> {
        manager
            .with_connection(None, |conn| Box::pin(async move { Ok(conn.id) }))
            .await
    }

    #[test]
    fn test_linear_backoff_capped() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(400),
        };
        assert_eq!(policy.delay_for(1, None), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3, None), Duration::from_millis(1200));
        assert_eq!(
            policy.delay_for(5, Some(Duration::from_secs(1))),
            Duration::from_secs(1)
        );
    }

    #[tokio::test]
    async fn test_two_transient_failures_then_success_makes_three_attempts() {
        let connector = Arc::new(FakeConnector::failing_first(&[
            ConnectErrorKind::Unreachable,
            ConnectErrorKind::Timeout,
        ]));
        let manager = manager(&connector, 2);

        let id = conn_id(&manager).await.unwrap();
        assert_eq!(id, 3);
        assert_eq!(connector.connects.load(Ordering::SeqCst), 3);
        assert_eq!(manager.state(), ConnectionState::Established);
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let connector = Arc::new(FakeConnector::always(ConnectErrorKind::AuthFailed));
        let manager = manager(&connector, 5);

        let err = conn_id(&manager).await.unwrap_err();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        assert!(matches!(
            err,
            DbError::Connect {
                reason: ConnectErrorKind::AuthFailed,
                attempts: 1,
                ..
            }
        ));
        assert_eq!(manager.state(), ConnectionState::Absent);
    }

    #[tokio::test]
    async fn test_missing_database_is_not_retried() {
        let connector = Arc::new(FakeConnector::always(ConnectErrorKind::DatabaseMissing));
        let manager = manager(&connector, 3);
        assert!(conn_id(&manager).await.is_err());
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let connector = Arc::new(FakeConnector::always(ConnectErrorKind::Unreachable));
        let manager = manager(&connector, 2);

        let err = conn_id(&manager).await.unwrap_err();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 3);
        assert!(matches!(err, DbError::Connect { attempts: 3, .. }));
        assert_eq!(manager.state(), ConnectionState::Absent);
    }

    #[tokio::test]
    async fn test_zero_retries_fails_fast() {
        let connector = Arc::new(FakeConnector::always(ConnectErrorKind::Timeout));
        let manager = manager(&connector, 0);
        assert!(conn_id(&manager).await.is_err());
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connection_is_reused_after_probe() {
        let connector = Arc::new(FakeConnector::default());
        let manager = manager(&connector, 0);

        assert_eq!(conn_id(&manager).await.unwrap(), 1);
        assert_eq!(conn_id(&manager).await.unwrap(), 1);
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        assert_eq!(connector.pings.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_probe_reconnects() {
        let connector = Arc::new(FakeConnector::default());
        let manager = manager(&connector, 0);

        assert_eq!(conn_id(&manager).await.unwrap(), 1);
        connector.ping_fails.store(true, Ordering::SeqCst);
        assert_eq!(conn_id(&manager).await.unwrap(), 2);
        assert_eq!(manager.state(), ConnectionState::Established);
    }

    #[tokio::test]
    async fn test_connection_failure_in_operation_discards_handle() {
        let connector = Arc::new(FakeConnector::default());
        let manager = manager(&connector, 0);

        let result: DbResult<()> = manager
            .with_connection(None, |_| {
                Box::pin(async {
                    Err(DbError::connect(ConnectErrorKind::Unreachable, "reset by peer"))
                })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(manager.state(), ConnectionState::Absent);

        assert_eq!(conn_id(&manager).await.unwrap(), 2);
        assert_eq!(connector.pings.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exec_error_keeps_connection() {
        let connector = Arc::new(FakeConnector::default());
        let manager = manager(&connector, 0);

        let result: DbResult<()> = manager
            .with_connection(None, |_| {
                Box::pin(async {
                    Err(DbError::exec(ExecErrorKind::Syntax, "syntax error", Some("42601".into())))
                })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(manager.state(), ConnectionState::Established);
        assert_eq!(conn_id(&manager).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_operation_leaves_state_absent() {
        let connector = Arc::new(FakeConnector::default());
        let manager = manager(&connector, 0);
        assert_eq!(conn_id(&manager).await.unwrap(), 1);

        let cancelled = tokio::time::timeout(
            Duration::from_millis(20),
            manager.with_connection(None, |_| {
                Box::pin(async {
                    std::future::pending::<()>().await;
                    Ok(())
                })
            }),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(manager.state(), ConnectionState::Absent);

        assert_eq!(conn_id(&manager).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_connect_leaves_state_absent() {
        let connector = Arc::new(FakeConnector::default());
        connector.hang_on_connect.store(true, Ordering::SeqCst);
        let manager = manager(&connector, 0);

        let cancelled = tokio::time::timeout(Duration::from_millis(20), conn_id(&manager)).await;
        assert!(cancelled.is_err());
        assert_eq!(manager.state(), ConnectionState::Absent);
    }

    #[tokio::test]
    async fn test_override_uses_temporary_connection() {
        let connector = Arc::new(FakeConnector::default());
        let manager = manager(&connector, 0);
        let overrides = ProfileOverrides {
            database: Some("other".to_string()),
            ..Default::default()
        };

        let id = manager
            .with_connection(Some(&overrides), |conn| Box::pin(async move { Ok(conn.id) }))
            .await
            .unwrap();
        assert_eq!(id, 1);
        assert_eq!(connector.closes.load(Ordering::SeqCst), 1);
        assert_eq!(manager.state(), ConnectionState::Absent);
    }

    #[tokio::test]
    async fn test_override_with_bad_values_fails_before_connecting() {
        let connector = Arc::new(FakeConnector::default());
        let manager = manager(&connector, 0);
        let overrides = ProfileOverrides {
            connect_timeout_seconds: Some(-1),
            ..Default::default()
        };

        let err = manager
            .with_connection(Some(&overrides), |conn| Box::pin(async move { Ok(conn.id) }))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Config { .. }));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_close_is_terminal() {
        let connector = Arc::new(FakeConnector::default());
        let manager = manager(&connector, 0);
        manager.warm_up().await.unwrap();
        assert_eq!(manager.state(), ConnectionState::Established);

        manager.close().await;
        assert_eq!(manager.state(), ConnectionState::Closed);
        assert_eq!(connector.closes.load(Ordering::SeqCst), 1);

        let err = conn_id(&manager).await.unwrap_err();
        assert!(matches!(err, DbError::Connect { .. }));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }
}
