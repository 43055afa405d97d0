use crate::answer::Answer;
use crate::core::{ErrorKind, ResolveError};
use crate::dns::{MessageId, Name, Question};
use crate::transport::Protocol;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Identifies a submitted query. Handles are never reused by a resolver.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct QueryHandle(u64);

impl QueryHandle {
    pub(crate) fn new(v: u64) -> Self {
        Self(v)
    }
}

impl fmt::Display for QueryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

/// Options changing how a single query is performed.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct QueryFlags {
    /// Apply the search list to relative names.
    pub search: bool,
    /// Send the query over TCP instead of starting with UDP.
    pub use_tcp: bool,
}

impl QueryFlags {
    pub fn search(mut self) -> Self {
        self.search = true;
        self
    }

    pub fn use_tcp(mut self) -> Self {
        self.use_tcp = true;
        self
    }
}

/// Where a query is in its lifecycle.
///
/// ```text
/// Submitted -> Sent -> AwaitingResponse -> Answered
///    |                    |      ^
///    |                    v      |
///    |                 Retrying -+-> Sent
///    v
/// Answered | Failed | Canceled (from any non-terminal state)
/// ```
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum QueryState {
    Submitted,
    Sent,
    AwaitingResponse,
    Retrying,
    Answered,
    Failed(ErrorKind),
    Canceled,
}

impl QueryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Answered | Self::Failed(_) | Self::Canceled)
    }

    fn allows(&self, next: &QueryState) -> bool {
        use QueryState::*;

        match (self, next) {
            (s, _) if s.is_terminal() => false,
            (_, Canceled) => true,
            (_, Failed(_)) => true,
            (Submitted, Sent) | (Submitted, Answered) => true,
            (Sent, AwaitingResponse) => true,
            (AwaitingResponse, Answered) | (AwaitingResponse, Retrying) => true,
            (Retrying, Sent) => true,
            _ => false,
        }
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submitted => write!(f, "submitted"),
            Self::Sent => write!(f, "sent"),
            Self::AwaitingResponse => write!(f, "awaiting-response"),
            Self::Retrying => write!(f, "retrying"),
            Self::Answered => write!(f, "answered"),
            Self::Failed(k) => write!(f, "failed({})", k.abbrev()),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

/// Bookkeeping for a single submitted query, owned by the resolver until the
/// caller collects its result.
#[derive(Debug)]
pub struct Query {
    handle: QueryHandle,
    id: MessageId,
    question: Question,
    candidates: VecDeque<Name>,
    flags: QueryFlags,
    state: QueryState,
    retries: u32,
    retries_used: u32,
    deadline: Option<Instant>,
    endpoint: Option<usize>,
    protocol: Protocol,
    reuse_endpoint: bool,
    last_error: Option<ErrorKind>,
    result: Option<Result<Answer, ResolveError>>,
    notify: Arc<Notify>,
}

impl Query {
    /// Create a query for the first of `candidates` (names to try in order). `candidates`
    /// must not be empty.
    pub fn new(
        handle: QueryHandle,
        id: MessageId,
        template: Question,
        candidates: Vec<Name>,
        flags: QueryFlags,
        retries: u32,
        protocol: Protocol,
    ) -> Result<Self, ResolveError> {
        let mut candidates = VecDeque::from(candidates);
        let first = candidates
            .pop_front()
            .ok_or_else(|| ResolveError::internal("query created without any names to try"))?;

        let question = Question::new(first, template.qtype()).set_qclass(template.qclass());

        Ok(Self {
            handle,
            id,
            question,
            candidates,
            flags,
            state: QueryState::Submitted,
            retries,
            retries_used: 0,
            deadline: None,
            endpoint: None,
            protocol,
            reuse_endpoint: false,
            last_error: None,
            result: None,
            notify: Arc::new(Notify::new()),
        })
    }

    pub fn handle(&self) -> QueryHandle {
        self.handle
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn question(&self) -> &Question {
        &self.question
    }

    pub fn flags(&self) -> QueryFlags {
        self.flags
    }

    pub fn state(&self) -> QueryState {
        self.state
    }

    pub fn retries_used(&self) -> u32 {
        self.retries_used
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn endpoint(&self) -> Option<usize> {
        self.endpoint
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn last_error(&self) -> Option<ErrorKind> {
        self.last_error
    }

    pub fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.state == QueryState::AwaitingResponse && self.deadline.map(|d| d <= now).unwrap_or(false)
    }

    /// Move to `next`, rejecting (and leaving the state unchanged) any transition
    /// not allowed by the query lifecycle.
    pub fn transition(&mut self, next: QueryState) -> Result<(), ResolveError> {
        if !self.state.allows(&next) {
            return Err(ResolveError::internal(format!(
                "illegal query transition for {} (id {}): {} -> {}",
                self.handle, self.id, self.state, next
            )));
        }

        tracing::trace!(
            message = "query transition",
            handle = %self.handle,
            id = %self.id,
            name = %self.question.name(),
            from = %self.state,
            to = %next,
        );

        self.state = next;
        if next != QueryState::AwaitingResponse {
            self.deadline = None;
        }

        if next.is_terminal() {
            self.notify.notify_waiters();
        }

        Ok(())
    }

    /// Nameserver the next attempt must go to, if it can't be picked freely (repeating
    /// a truncated response over TCP).
    pub fn pinned_endpoint(&self) -> Option<usize> {
        if self.reuse_endpoint { self.endpoint } else { None }
    }

    /// Mark the query as sent to `endpoint`.
    pub fn sent(&mut self, endpoint: usize) -> Result<(), ResolveError> {
        self.transition(QueryState::Sent)?;
        self.endpoint = Some(endpoint);
        self.reuse_endpoint = false;
        Ok(())
    }

    /// Start waiting for a response until `deadline`.
    pub fn awaiting(&mut self, deadline: Instant) -> Result<(), ResolveError> {
        self.transition(QueryState::AwaitingResponse)?;
        self.deadline = Some(deadline);
        Ok(())
    }

    /// Note a problem with the current attempt that should be reported if the retry budget runs out.
    pub fn set_last_error(&mut self, kind: ErrorKind) {
        self.last_error = Some(kind);
    }

    /// Use one retry, returning false if none are left.
    pub fn retry(&mut self) -> Result<bool, ResolveError> {
        if self.retries_used >= self.retries {
            return Ok(false);
        }

        self.transition(QueryState::Retrying)?;
        self.retries_used += 1;
        Ok(true)
    }

    /// Repeat the current attempt over TCP to the same nameserver without using a retry.
    pub fn retry_tcp(&mut self) -> Result<(), ResolveError> {
        self.transition(QueryState::Retrying)?;
        self.protocol = Protocol::Tcp;
        self.reuse_endpoint = true;
        Ok(())
    }

    #[cfg(test)]
    pub fn has_candidates(&self) -> bool {
        !self.candidates.is_empty()
    }

    /// Switch to the next name from the search list with a fresh retry budget. Only valid
    /// for a query that is still in the `Submitted` state or waiting on a response.
    pub fn next_candidate(&mut self, initial: Protocol) -> Result<bool, ResolveError> {
        let next = match self.candidates.pop_front() {
            Some(n) => n,
            None => return Ok(false),
        };

        if self.state != QueryState::Submitted {
            self.transition(QueryState::Retrying)?;
        }

        tracing::debug!(
            message = "trying next search candidate",
            handle = %self.handle,
            previous = %self.question.name(),
            next = %next,
        );

        self.question = Question::new(next, self.question.qtype()).set_qclass(self.question.qclass());
        self.retries_used = 0;
        self.endpoint = None;
        self.reuse_endpoint = false;
        self.protocol = initial;
        self.last_error = None;
        Ok(true)
    }

    pub fn complete(&mut self, answer: Answer) -> Result<(), ResolveError> {
        self.transition(QueryState::Answered)?;
        self.result = Some(Ok(answer));
        Ok(())
    }

    pub fn fail(&mut self, err: ResolveError) -> Result<(), ResolveError> {
        self.transition(QueryState::Failed(err.kind()))?;
        self.result = Some(Err(err));
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), ResolveError> {
        self.transition(QueryState::Canceled)?;
        self.result = Some(Err(ResolveError::new(
            ErrorKind::Canceled,
            format!("query {} for {} canceled", self.handle, self.question.name()),
        )));
        Ok(())
    }

    /// Hand out the terminal result of this query. Returns `None` if the query has not
    /// finished or the result was already taken.
    pub fn take_result(&mut self) -> Option<Result<Answer, ResolveError>> {
        if self.state.is_terminal() {
            self.result.take()
        } else {
            None
        }
    }
}

/// Hands out transaction ids that are unique among in-flight queries.
///
/// Released ids are quarantined for a while before they can be handed out again so
/// that a late response to a finished query can't be mistaken for a response to a
/// new one.
#[derive(Debug, Default)]
pub struct IdAllocator {
    in_use: HashSet<MessageId>,
    quarantine: VecDeque<MessageId>,
    quarantined: HashSet<MessageId>,
}

impl IdAllocator {
    const QUARANTINE_SIZE: usize = 1024;
    const RANDOM_TRIES: usize = 32;
    const MAX_IDS: usize = 1 << 16;

    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> Result<MessageId, ResolveError> {
        if self.in_use.len() >= Self::MAX_IDS {
            return Err(ResolveError::new(
                ErrorKind::SystemFailure,
                "all transaction ids are in use",
            ));
        }

        for _ in 0..Self::RANDOM_TRIES {
            let id = MessageId::random();
            if self.is_free(id) {
                self.in_use.insert(id);
                return Ok(id);
            }
        }

        // Nearly exhausted, fall back to scanning from a random starting point. When only
        // quarantined ids are left use one of those rather than failing.
        let start = u16::from(MessageId::random());
        let scan = (0..=u16::MAX).map(|i| MessageId::from(start.wrapping_add(i)));
        let id = scan
            .clone()
            .find(|id| self.is_free(*id))
            .or_else(|| scan.clone().find(|id| !self.in_use.contains(id)))
            .ok_or_else(|| ResolveError::new(ErrorKind::SystemFailure, "all transaction ids are in use"))?;

        self.in_use.insert(id);
        Ok(id)
    }

    pub fn release(&mut self, id: MessageId) {
        if self.in_use.remove(&id) {
            self.quarantine.push_back(id);
            self.quarantined.insert(id);
            if self.quarantine.len() > Self::QUARANTINE_SIZE {
                if let Some(old) = self.quarantine.pop_front() {
                    self.quarantined.remove(&old);
                }
            }
        }
    }

    #[cfg(test)]
    pub fn in_use(&self) -> usize {
        self.in_use.len()
    }

    fn is_free(&self, id: MessageId) -> bool {
        !self.in_use.contains(&id) && !self.quarantined.contains(&id)
    }
}
