//! Trading window gate and exchange session
//!
//! Admission and correlation are allowed only while the session is logged
//! on and the wall clock is inside the trading window. Both window
//! boundaries are inclusive.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapters::SharedExchange;
use crate::auth::{Authenticator, Credentials};
use crate::clock::Clock;
use crate::error::{OmsError, OmsResult};

/// Daily trading window, evaluated against UTC time of day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TradingWindow {
    /// Create a window; `start` must not be after `end`
    pub fn new(start: NaiveTime, end: NaiveTime) -> OmsResult<Self> {
        if start > end {
            return Err(OmsError::ConfigError(format!(
                "Trading window start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Check `start <= now <= end`
    pub fn is_open(&self, now: NaiveTime) -> bool {
        self.start <= now && now <= self.end
    }

    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.is_open(now.time())
    }

    /// Time of day halfway between open and close
    pub fn midpoint(&self) -> NaiveTime {
        self.start + (self.end - self.start) / 2
    }
}

/// Identifier assigned to each successful logon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    LoggedOn {
        session_id: SessionId,
        username: String,
        since: DateTime<Utc>,
    },
}

impl SessionState {
    pub fn is_logged_on(&self) -> bool {
        matches!(self, SessionState::LoggedOn { .. })
    }
}

/// Trading session gate
pub struct TradingSession {
    window: TradingWindow,
    clock: Arc<dyn Clock>,
    authenticator: Arc<dyn Authenticator>,
    exchange: SharedExchange,
    state: Mutex<SessionState>,
}

impl TradingSession {
    pub fn new(
        window: TradingWindow,
        clock: Arc<dyn Clock>,
        authenticator: Arc<dyn Authenticator>,
        exchange: SharedExchange,
    ) -> Self {
        Self {
            window,
            clock,
            authenticator,
            exchange,
            state: Mutex::new(SessionState::LoggedOut),
        }
    }

    /// Check whether the window is open right now
    pub fn is_open(&self) -> bool {
        self.window.is_open_at(self.clock.now())
    }

    pub fn window(&self) -> TradingWindow {
        self.window
    }

    /// Current session state
    pub fn state(&self) -> OmsResult<SessionState> {
        Ok(self.state.lock()?.clone())
    }

    /// Verify credentials and log on
    ///
    /// Allowed only inside the window and while logged out. The exchange is
    /// notified after the state change; a failed notification is logged and
    /// does not undo the logon.
    pub async fn logon(&self, credentials: &Credentials) -> OmsResult<SessionId> {
        let now = self.clock.now();
        if !self.window.is_open_at(now) {
            warn!(user = %credentials.username, "Logon rejected: outside trading window");
            return Err(OmsError::OutsideTradingWindow { order_id: None });
        }

        let session_id = {
            let mut state = self.state.lock()?;
            if state.is_logged_on() {
                return Err(OmsError::AlreadyLoggedOn);
            }
            if !self.authenticator.verify(credentials) {
                warn!(user = %credentials.username, "Logon rejected: authentication failed");
                return Err(OmsError::AuthenticationFailed(credentials.username.clone()));
            }

            let session_id = SessionId::new();
            *state = SessionState::LoggedOn {
                session_id,
                username: credentials.username.clone(),
                since: now,
            };
            session_id
        };

        info!(session = %session_id, user = %credentials.username, "Logged on");

        let mut exchange = self.exchange.lock().await;
        if let Err(e) = exchange.logon(&session_id).await {
            warn!(session = %session_id, exchange = exchange.name(), "Logon notification failed: {}", e);
        }

        Ok(session_id)
    }

    /// Log out of an active session
    pub async fn logout(&self) -> OmsResult<()> {
        let session_id = {
            let mut state = self.state.lock()?;
            let SessionState::LoggedOn { session_id, .. } = *state else {
                return Err(OmsError::NotLoggedOn { order_id: None });
            };
            *state = SessionState::LoggedOut;
            session_id
        };

        info!(session = %session_id, "Logged out");

        let mut exchange = self.exchange.lock().await;
        if let Err(e) = exchange.logout(&session_id).await {
            warn!(session = %session_id, exchange = exchange.name(), "Logout notification failed: {}", e);
        }

        Ok(())
    }

    /// Gate check for a request arriving at `now`
    pub fn check_admission(&self, now: DateTime<Utc>) -> OmsResult<()> {
        if !self.window.is_open_at(now) {
            return Err(OmsError::OutsideTradingWindow { order_id: None });
        }
        if !self.state.lock()?.is_logged_on() {
            return Err(OmsError::NotLoggedOn { order_id: None });
        }
        Ok(())
    }
}
