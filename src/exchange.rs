//! Request/response exchange with an agent.
//!
//! One exchange sends a request, waits for the matching GetResponse and resends on
//! timeout according to a `RetryPolicy`. Each attempt waits on a deadline; a
//! datagram that does not decode, or whose request-id does not match, is
//! dropped and the wait continues until the same deadline.

use std::{fmt, io, time::Duration};

use thiserror::Error;
use tokio::time::{timeout_at, Instant};

use crate::{
    ber::BerError,
    pdu::{ErrorStatus, PduKind, SnmpMessage},
    transport::Transport,
};

/// Errors returned by a get or set operation.
#[derive(Error, Debug)]
pub enum SnmpError {
    /// The response would not fit in a single message.
    #[error("Agent reported tooBig")]
    TooBig,
    /// The requested object does not exist on the agent.
    #[error("Agent reported noSuchName")]
    NoSuchName,
    /// The value type or value does not match the object.
    #[error("Agent reported badValue")]
    BadValue,
    /// The object cannot be written.
    #[error("Agent reported readOnly")]
    ReadOnly,
    /// Any other agent-side failure.
    #[error("Agent reported genErr")]
    GenErr,
    /// No response arrived within the retry budget.
    #[error("Timeout, no response from agent")]
    Timeout,
    /// The response could not be decoded.
    #[error("Malformed response: {0}")]
    MalformedResponse(BerError),
    /// The request could not be encoded.
    #[error("Cannot encode request: {0}")]
    Encoding(BerError),
    /// Sending or receiving failed.
    #[error("Transport error: {0}")]
    Io(#[from] io::Error),
}

impl SnmpError {
    /// Returns the numeric result code: 1-5 for agent errors, 6 for timeout,
    /// 7 and above for local failures.
    pub fn code(&self) -> i32 {
        match self {
            SnmpError::TooBig => 1,
            SnmpError::NoSuchName => 2,
            SnmpError::BadValue => 3,
            SnmpError::ReadOnly => 4,
            SnmpError::GenErr => 5,
            SnmpError::Timeout => 6,
            SnmpError::MalformedResponse(_) => 7,
            SnmpError::Encoding(_) => 8,
            SnmpError::Io(_) => 9,
        }
    }

    /// Maps an agent error-status to an error; `None` for noError.
    pub fn from_status(status: ErrorStatus) -> Option<Self> {
        match status {
            ErrorStatus::NoError => None,
            ErrorStatus::TooBig => Some(SnmpError::TooBig),
            ErrorStatus::NoSuchName => Some(SnmpError::NoSuchName),
            ErrorStatus::BadValue => Some(SnmpError::BadValue),
            ErrorStatus::ReadOnly => Some(SnmpError::ReadOnly),
            ErrorStatus::GenErr => Some(SnmpError::GenErr),
        }
    }
}

/// Per-attempt wait budgets.
///
/// The request is sent once per entry; the default is three attempts waiting
/// 3000, 3000 and 500 ms with no backoff.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    attempt_timeouts: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempt_timeouts: vec![
                Duration::from_millis(3000),
                Duration::from_millis(3000),
                Duration::from_millis(500),
            ],
        }
    }
}

impl RetryPolicy {
    /// Creates a policy from explicit per-attempt waits.
    ///
    /// Returns `None` if the list is empty.
    pub fn new(attempt_timeouts: Vec<Duration>) -> Option<Self> {
        if attempt_timeouts.is_empty() {
            return None;
        }
        Some(Self { attempt_timeouts })
    }

    /// Returns the waits, one per attempt.
    pub fn attempt_timeouts(&self) -> &[Duration] {
        &self.attempt_timeouts
    }

    /// Returns the number of send attempts.
    pub fn attempts(&self) -> usize {
        self.attempt_timeouts.len()
    }

    /// Returns the total time spent waiting when no response ever arrives.
    pub fn total_wait(&self) -> Duration {
        self.attempt_timeouts.iter().sum()
    }
}

/// Exchange progress, logged on each transition.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    Sent { attempt: usize },
    Received,
    TimedOut,
    Done,
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ExchangeState::Idle => write!(f, "idle"),
            ExchangeState::Sent { attempt } => write!(f, "sent (attempt {})", attempt),
            ExchangeState::Received => write!(f, "received"),
            ExchangeState::TimedOut => write!(f, "timed out"),
            ExchangeState::Done => write!(f, "done"),
        }
    }
}

struct StateTracker {
    request_id: i64,
    state: ExchangeState,
}

impl StateTracker {
    fn advance(&mut self, next: ExchangeState) {
        log::trace!("Request {}: {} -> {}", self.request_id, self.state, next);
        self.state = next;
    }
}

/// Runs one exchange and returns the agent's response with error-status noError.
///
/// `datagram` is the encoded request and `request_id` the id it carries. Agent
/// error statuses are returned as the matching `SnmpError` without retrying.
pub async fn exchange<T: Transport>(
    transport: &T,
    datagram: &[u8],
    request_id: i64,
    policy: &RetryPolicy,
) -> Result<SnmpMessage, SnmpError> {
    let mut tracker = StateTracker {
        request_id,
        state: ExchangeState::Idle,
    };

    for (index, wait) in policy.attempt_timeouts().iter().enumerate() {
        let attempt = index + 1;
        if attempt > 1 {
            log::debug!("Request {}: retrying, attempt {}", request_id, attempt);
        }

        transport.send(datagram).await?;
        tracker.advance(ExchangeState::Sent { attempt });

        let deadline = Instant::now() + *wait;
        if let Some(response) = await_response(transport, request_id, deadline).await? {
            tracker.advance(ExchangeState::Received);
            let outcome = check_status(response);
            tracker.advance(ExchangeState::Done);
            return outcome;
        }

        tracker.advance(ExchangeState::TimedOut);
    }

    tracker.advance(ExchangeState::Done);
    log::debug!(
        "Request {}: no response after {} attempts ({:?})",
        request_id,
        policy.attempts(),
        policy.total_wait()
    );
    Err(SnmpError::Timeout)
}

/// Waits until `deadline` for a response carrying `request_id`.
///
/// Datagrams that do not decode are dropped like stale ones. Returns `Ok(None)`
/// when the deadline passes, or `MalformedResponse` if only undecodable
/// datagrams arrived in the meantime.
async fn await_response<T: Transport>(
    transport: &T,
    request_id: i64,
    deadline: Instant,
) -> Result<Option<SnmpMessage>, SnmpError> {
    let mut undecodable = None;
    let mut decoded_any = false;

    loop {
        let datagram = match timeout_at(deadline, transport.recv()).await {
            Ok(received) => received?,
            Err(_) => {
                return match undecodable {
                    Some(e) if !decoded_any => Err(SnmpError::MalformedResponse(e)),
                    _ => Ok(None),
                }
            }
        };

        let message = match SnmpMessage::decode(&datagram) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("Request {}: dropping undecodable datagram: {}", request_id, e);
                undecodable = Some(e);
                continue;
            }
        };
        decoded_any = true;

        if message.pdu.kind != PduKind::GetResponse {
            log::debug!(
                "Request {}: ignoring {:?} PDU",
                request_id,
                message.pdu.kind
            );
            continue;
        }
        if message.pdu.request_id != request_id {
            log::debug!(
                "Request {}: discarding response for request {}",
                request_id,
                message.pdu.request_id
            );
            continue;
        }

        return Ok(Some(message));
    }
}

fn check_status(response: SnmpMessage) -> Result<SnmpMessage, SnmpError> {
    let code = response.pdu.error_status;
    let status = ErrorStatus::from_code(code)
        .ok_or(SnmpError::MalformedResponse(BerError::InvalidErrorStatus(code)))?;

    match SnmpError::from_status(status) {
        Some(err) => {
            log::debug!(
                "Agent returned {} (error-index {})",
                status,
                response.pdu.error_index
            );
            Err(err)
        }
        None => Ok(response),
    }
}
