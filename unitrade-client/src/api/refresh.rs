//! Single-flight token refresh.
//!
//! When a request is rejected with 401 the caller asks the coordinator for a
//! fresh access token. At most one refresh call is in flight per session:
//!
//! 1. The first caller creates the [`RefreshTicket`], moves the session to
//!    `Refreshing` and spawns the refresh call.
//! 2. Every caller (the first one included) is queued as a [`PendingRequest`]
//!    on the ticket and suspends until the refresh settles.
//! 3. On settlement the ticket is cleared and the queue is resolved in FIFO
//!    order: all callers get the new token, or all get
//!    [`ApiFailure::AuthExpired`] after the session has been wiped.
//!
//! A ticket belongs to one session generation. A 401 on a request sent under
//! an ended session is answered with `AuthExpired` and never replayed, and a
//! ticket left over from an ended session is settled as expired before the
//! new session's refresh starts.
//!
//! The refresh call runs on its own task so a caller that gets cancelled cannot
//! strand the callers queued behind it. The refresh request is sent straight
//! through the dispatcher; a 401 on it is a refresh failure, never a new
//! refresh trigger.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument, warn};

use super::dispatcher::RequestDispatcher;
use super::endpoints;
use super::failure::ApiFailure;
use super::request::ApiRequest;
use crate::session::{RefreshGrant, SessionHandle, SessionState, Token};

/// How a refresh settled, as seen by every queued caller.
#[derive(Debug, Clone)]
enum RefreshOutcome {
    Refreshed(Token),
    Expired,
}

/// One caller waiting for the in-flight refresh.
struct PendingRequest {
    tx: oneshot::Sender<RefreshOutcome>,
}

/// Marker for the in-flight refresh call.
struct RefreshTicket {
    id: u64,
    /// Session generation being refreshed.
    generation: u64,
    waiters: VecDeque<PendingRequest>,
}

impl RefreshTicket {
    /// Resolve every queued caller, in arrival order.
    fn settle(self, outcome: &RefreshOutcome) {
        debug!(ticket = self.id, waiters = self.waiters.len(), "Resolving queued requests");
        for waiter in self.waiters {
            // A dropped receiver means that caller was cancelled.
            let _ = waiter.tx.send(outcome.clone());
        }
    }
}

/// What a caller does after the ticket check.
enum Plan {
    Wait(oneshot::Receiver<RefreshOutcome>),
    Retry(Token),
    Expire(u64),
    Reject,
}

/// Token refresh endpoint response.
///
/// `refresh` is only present when the backend rotates refresh tokens.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
    #[serde(default)]
    refresh: Option<String>,
}

struct CoordinatorInner {
    session: SessionHandle,
    dispatcher: Arc<RequestDispatcher>,
    ticket: Mutex<Option<RefreshTicket>>,
    next_ticket_id: AtomicU64,
    refresh_calls: AtomicU64,
}

/// Coordinates token refreshes for one session.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl RefreshCoordinator {
    pub fn new(session: SessionHandle, dispatcher: Arc<RequestDispatcher>) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                session,
                dispatcher,
                ticket: Mutex::new(None),
                next_ticket_id: AtomicU64::new(1),
                refresh_calls: AtomicU64::new(0),
            }),
        }
    }

    /// Whether a refresh call is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        self.inner.ticket.lock().is_some()
    }

    /// Number of callers queued behind the in-flight refresh.
    pub fn pending_requests(&self) -> usize {
        self.inner
            .ticket
            .lock()
            .as_ref()
            .map_or(0, |ticket| ticket.waiters.len())
    }

    /// Number of refresh calls issued so far.
    pub fn refresh_calls(&self) -> u64 {
        self.inner.refresh_calls.load(Ordering::Relaxed)
    }

    /// Obtain an access token to replay a request that was rejected with 401
    /// while carrying `rejected` under session `generation`.
    ///
    /// Joins the in-flight refresh if there is one, starts one otherwise. If the
    /// session already holds a different token (a refresh settled after the
    /// request was sent), that token is returned without a new refresh. A
    /// request from a session that has since ended gets
    /// [`ApiFailure::AuthExpired`].
    #[instrument(skip_all, fields(had_bearer = rejected.is_some(), generation = generation))]
    pub async fn acquire_fresh_token(
        &self,
        rejected: Option<&Token>,
        generation: u64,
    ) -> Result<Token, ApiFailure> {
        // The ticket check-and-set happens entirely under the lock; nothing is
        // awaited while it is held.
        let plan = {
            let mut slot = self.inner.ticket.lock();
            let current = self.inner.session.generation();
            if current != generation {
                debug!(current, "Request belongs to an ended session");
                Plan::Reject
            } else {
                match slot.as_mut() {
                    Some(ticket) if ticket.generation == generation => {
                        let (tx, rx) = oneshot::channel();
                        ticket.waiters.push_back(PendingRequest { tx });
                        debug!(
                            ticket = ticket.id,
                            queued = ticket.waiters.len(),
                            "Joined in-flight token refresh"
                        );
                        Plan::Wait(rx)
                    }
                    _ => {
                        if let Some(stale) = slot.take() {
                            debug!(ticket = stale.id, "Dropping refresh of an ended session");
                            stale.settle(&RefreshOutcome::Expired);
                        }
                        self.start_refresh(&mut slot, rejected, generation)?
                    }
                }
            }
        };

        let rx = match plan {
            Plan::Wait(rx) => rx,
            Plan::Retry(token) => return Ok(token),
            Plan::Expire(generation) => {
                self.inner.session.expire(generation).await;
                return Err(ApiFailure::AuthExpired);
            }
            Plan::Reject => return Err(ApiFailure::AuthExpired),
        };

        match rx.await {
            Ok(RefreshOutcome::Refreshed(token)) => Ok(token),
            Ok(RefreshOutcome::Expired) => Err(ApiFailure::AuthExpired),
            Err(_) => {
                error!("Token refresh task ended without settling");
                Err(ApiFailure::AuthExpired)
            }
        }
    }

    /// Called with the ticket lock held and no ticket present.
    fn start_refresh(
        &self,
        slot: &mut Option<RefreshTicket>,
        rejected: Option<&Token>,
        generation: u64,
    ) -> Result<Plan, ApiFailure> {
        let snapshot = self.inner.session.snapshot();
        if snapshot.generation() != generation {
            return Ok(Plan::Reject);
        }
        if snapshot.state() == SessionState::Authenticated {
            if let Some(current) = snapshot.access_token() {
                if rejected != Some(current) {
                    debug!("Access token already renewed; retrying without refresh");
                    return Ok(Plan::Retry(current.clone()));
                }
            }
        }

        let refresh_token = match self.inner.session.begin_refresh(generation)? {
            RefreshGrant::Granted { refresh_token, .. } => refresh_token,
            RefreshGrant::NoRefreshToken { generation } => {
                warn!("Access token rejected and no refresh token stored");
                return Ok(Plan::Expire(generation));
            }
            RefreshGrant::Unavailable => {
                debug!(state = %snapshot.state(), "No session to refresh");
                return Ok(Plan::Reject);
            }
        };

        let id = self.inner.next_ticket_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let mut waiters = VecDeque::new();
        waiters.push_back(PendingRequest { tx });
        *slot = Some(RefreshTicket {
            id,
            generation,
            waiters,
        });

        info!(ticket = id, "Starting token refresh");
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.run_refresh(id, generation, refresh_token).await;
        });

        Ok(Plan::Wait(rx))
    }

    /// A replayed request was rejected again. If it carried the session's
    /// current token, the credentials are dead and the session is expired.
    pub async fn reject_replayed(&self, bearer: Option<&Token>) {
        let snapshot = self.inner.session.snapshot();
        if bearer.is_some() && snapshot.access_token() == bearer {
            warn!("Fresh access token rejected; expiring session");
            self.inner.session.expire(snapshot.generation()).await;
        }
    }
}

impl CoordinatorInner {
    async fn run_refresh(&self, id: u64, generation: u64, refresh_token: Token) {
        self.refresh_calls.fetch_add(1, Ordering::Relaxed);

        let outcome = match self.call_refresh_endpoint(&refresh_token).await {
            Ok((access, rotated)) => {
                match self
                    .session
                    .complete_refresh(generation, access, rotated)
                    .await
                {
                    Ok(Some(token)) => {
                        info!(ticket = id, "Token refresh successful");
                        RefreshOutcome::Refreshed(token)
                    }
                    Ok(None) => {
                        info!(ticket = id, "Session ended during token refresh; discarding result");
                        RefreshOutcome::Expired
                    }
                    Err(e) => {
                        error!(ticket = id, error = %e, "Failed to adopt refreshed token");
                        self.session.expire(generation).await;
                        RefreshOutcome::Expired
                    }
                }
            }
            Err(failure) => {
                warn!(ticket = id, error = %failure, "Token refresh failed; session expired");
                self.session.expire(generation).await;
                RefreshOutcome::Expired
            }
        };

        // A ticket replaced by a newer session's refresh was settled already.
        let ticket = {
            let mut slot = self.ticket.lock();
            match slot.take() {
                Some(ticket) if ticket.id == id => Some(ticket),
                other => {
                    *slot = other;
                    None
                }
            }
        };

        if let Some(ticket) = ticket {
            ticket.settle(&outcome);
        }
    }

    async fn call_refresh_endpoint(
        &self,
        refresh_token: &Token,
    ) -> Result<(Token, Option<Token>), ApiFailure> {
        let request = ApiRequest::post(endpoints::TOKEN_REFRESH)
            .unauthenticated()
            .with_body(json!({ "refresh": refresh_token.as_str() }));

        let response = self.dispatcher.send(&request).await?;
        let body: RefreshResponse = response.json()?;

        Ok((Token::new(body.access), body.refresh.map(Token::new)))
    }
}
