use crate::answer::{Answer, AnswerParts};
use crate::cache::Cache;
use crate::config::ResolverConfig;
use crate::core::{ErrorKind, ResolveError};
use crate::dns::{Flags, Message, MessageId, Name, Question, RecordClass, RecordType, ResponseCode};
use crate::query::{IdAllocator, Query, QueryFlags, QueryHandle, QueryState};
use crate::transport::{Protocol, Transport, TransportEvent};
use std::collections::HashMap;
use std::net::IpAddr;
use std::ops::{Deref, DerefMut};
use std::pin::pin;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::time::Instant;

// How long an idle driver sleeps when no query has a deadline. Any submit wakes it early.
const IDLE_WAIT: Duration = Duration::from_secs(3600);

/// Asynchronous DNS resolver.
///
/// Queries are submitted without blocking and get a `QueryHandle` that is later passed
/// to `wait` or `check` to get the result. A single event loop sends every query, reads
/// every response, and handles timeouts and retries. There is no background task running
/// that loop: whichever caller is waiting drives it, and when that caller's query is done
/// another waiting caller (if any) takes over.
///
/// Cloning a `Resolver` is cheap and clones share all queries, sockets, and cached answers.
#[derive(Debug, Clone)]
pub struct Resolver {
    inner: Arc<Inner>,
}

impl Resolver {
    /// Create a resolver that spawns its socket tasks on the current tokio runtime.
    ///
    /// Returns a `Configuration` error if the configuration is invalid (no nameservers,
    /// a zero timeout) or if called outside of a tokio runtime.
    pub fn new(config: ResolverConfig) -> Result<Self, ResolveError> {
        let runtime = Handle::try_current()
            .map_err(|e| ResolveError::configuration_cause("resolver must be created within a tokio runtime", e))?;
        Self::with_runtime(config, runtime)
    }

    /// Create a resolver that spawns its socket tasks on `runtime`.
    pub fn with_runtime(config: ResolverConfig, runtime: Handle) -> Result<Self, ResolveError> {
        config.validate()?;

        let transport = Transport::new(&config, runtime);
        let cache = if config.cache_enabled {
            Some(Cache::new(config.cache_size, config.cache_max_ttl))
        } else {
            None
        };

        tracing::debug!(
            message = "created resolver",
            nameservers = ?config.nameservers,
            timeout = ?config.timeout,
            retries = config.retries,
            cache = config.cache_enabled,
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State::default()),
                driver: tokio::sync::Mutex::new(transport),
                driver_released: Notify::new(),
                wakeup: Notify::new(),
                cache,
            }),
        })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.inner.config
    }

    /// Submit a query for records of type `rtype` in the `INET` class without applying
    /// the search list. Returns as soon as the query is queued.
    pub fn submit(&self, name: &str, rtype: RecordType) -> Result<QueryHandle, ResolveError> {
        self.submit_with(name, rtype, RecordClass::INET, QueryFlags::default())
    }

    /// Submit a query, returning an `InvalidName` error if `name` is not a valid domain name.
    pub fn submit_with(
        &self,
        name: &str,
        rtype: RecordType,
        rclass: RecordClass,
        flags: QueryFlags,
    ) -> Result<QueryHandle, ResolveError> {
        let name = Name::from_str(name)?;
        self.inner.submit(name, rtype, rclass, flags)
    }

    /// Submit a PTR query for the reverse lookup name of `addr`.
    pub fn submit_reverse(&self, addr: IpAddr) -> Result<QueryHandle, ResolveError> {
        self.inner
            .submit(Name::reverse(addr), RecordType::PTR, RecordClass::INET, QueryFlags::default())
    }

    /// Submit a query of type `rtype` for the reversed form of `addr` under `zone`,
    /// the way DNS block lists are queried. `zone` is always treated as fully qualified.
    pub fn submit_reverse_any(&self, addr: IpAddr, zone: &str, rtype: RecordType) -> Result<QueryHandle, ResolveError> {
        let zone = Name::from_str(zone)?;
        let name = Name::reverse_in(addr, &zone)?;
        self.inner.submit(name, rtype, RecordClass::INET, QueryFlags::default())
    }

    /// Wait for a query to finish, driving the event loop if no one else is.
    ///
    /// The result is handed out once. Using `handle` again afterwards returns an
    /// `UnknownQuery` error. If this future is dropped the query keeps going and its
    /// result may still be collected later.
    pub async fn wait(&self, handle: QueryHandle) -> Result<Answer, ResolveError> {
        loop {
            let notify = {
                let mut state = self.inner.state();
                if let Some(res) = state.take_result(handle)? {
                    return res;
                }

                state.notifier(handle)?
            };

            // Register interest before looking at the query again so that a completion or
            // the driver leaving between the check and the wait below isn't missed.
            let mut query_done = pin!(notify.notified());
            let mut released = pin!(self.inner.driver_released.notified());
            query_done.as_mut().enable();
            released.as_mut().enable();

            if self.inner.state().is_finished(handle) {
                continue;
            }

            if let Ok(guard) = self.inner.driver.try_lock() {
                let mut driver = DriverGuard::new(guard, &self.inner.driver_released);
                self.inner.drive(&mut driver, DriveUntil::Query(handle)).await;
                continue;
            }

            tokio::select! {
                _ = query_done => {},
                _ = released => {},
            }
        }
    }

    /// Non-blocking check of a query. Returns `Ok(None)` if the query is still running.
    ///
    /// If no other caller is driving the event loop, one step of it is run first so that
    /// queries make progress even when nothing is waiting on them.
    pub fn check(&self, handle: QueryHandle) -> Result<Option<Answer>, ResolveError> {
        if let Ok(guard) = self.inner.driver.try_lock() {
            let mut driver = DriverGuard::new(guard, &self.inner.driver_released);
            self.inner.run_step(&mut driver, None);
        }

        match self.inner.state().take_result(handle)? {
            Some(res) => res.map(Some),
            None => Ok(None),
        }
    }

    /// Cancel a query that hasn't finished yet. Its result becomes a `Canceled` error and
    /// any socket activity for it stops. Canceling a finished query does nothing.
    pub fn cancel(&self, handle: QueryHandle) -> Result<(), ResolveError> {
        {
            let mut state = self.inner.state();
            state.notifier(handle)?;
            if state.is_finished(handle) {
                return Ok(());
            }

            state.finish(handle, Query::cancel);
        }

        if let Ok(guard) = self.inner.driver.try_lock() {
            let mut driver = DriverGuard::new(guard, &self.inner.driver_released);
            self.inner.flush_forgotten(&mut driver);
        }

        self.inner.wakeup.notify_one();
        Ok(())
    }

    /// Submit a query and wait for its result.
    pub async fn resolve(&self, name: &str, rtype: RecordType) -> Result<Answer, ResolveError> {
        let handle = self.submit(name, rtype)?;
        self.wait(handle).await
    }

    /// Drive the event loop for up to `timeout` (returning early once nothing is outstanding)
    /// then hand out the results of every finished query, in the order they were submitted.
    pub async fn completed_queries(&self, timeout: Duration) -> Vec<(QueryHandle, Result<Answer, ResolveError>)> {
        let deadline = Instant::now() + timeout;

        loop {
            let mut released = pin!(self.inner.driver_released.notified());
            released.as_mut().enable();

            if let Ok(guard) = self.inner.driver.try_lock() {
                let mut driver = DriverGuard::new(guard, &self.inner.driver_released);
                self.inner.drive(&mut driver, DriveUntil::Deadline(deadline)).await;
                break;
            }

            if Instant::now() >= deadline || self.inner.state().num_outstanding() == 0 {
                break;
            }

            tokio::select! {
                _ = released => {},
                _ = tokio::time::sleep_until(deadline) => break,
            }
        }

        self.inner.state().take_completed()
    }

    /// Fail every query that hasn't finished with a `SystemFailure` error and close every
    /// socket. The resolver may still be used afterwards, sockets are opened again as needed.
    pub fn global_system_failure(&self) {
        let failed = {
            let mut state = self.inner.state();
            let failed = state.fail_outstanding(|q| {
                ResolveError::new(
                    ErrorKind::SystemFailure,
                    format!("query {} for {} aborted by system failure", q.handle(), q.question().name()),
                )
            });
            state.shutdown = true;
            failed
        };

        tracing::warn!(message = "global system failure", failed = failed);
        self.shutdown_if_idle();
    }

    /// Cancel every query that hasn't finished and close every socket.
    pub fn finish(&self) {
        let canceled = {
            let mut state = self.inner.state();
            let canceled = state.cancel_outstanding();
            state.shutdown = true;
            canceled
        };

        tracing::debug!(message = "finishing resolver", canceled = canceled);
        self.shutdown_if_idle();
    }

    /// Number of queries that haven't finished.
    pub fn num_outstanding(&self) -> usize {
        self.inner.state().num_outstanding()
    }

    fn shutdown_if_idle(&self) {
        // If another caller is driving it'll see the shutdown flag on its next step.
        if let Ok(guard) = self.inner.driver.try_lock() {
            let mut driver = DriverGuard::new(guard, &self.inner.driver_released);
            self.inner.run_step(&mut driver, None);
        }

        self.inner.wakeup.notify_one();
    }
}

#[derive(Debug, Copy, Clone)]
enum DriveUntil {
    Query(QueryHandle),
    Deadline(Instant),
}

/// Exclusive access to the transport by whichever caller is driving the event loop.
/// Waiters are told the driver left when this is dropped, even if the driving future
/// was dropped part way through.
struct DriverGuard<'a> {
    // Fields drop in order: the lock is released before waiters are woken.
    transport: tokio::sync::MutexGuard<'a, Transport>,
    _released: ReleaseOnDrop<'a>,
}

impl<'a> DriverGuard<'a> {
    fn new(transport: tokio::sync::MutexGuard<'a, Transport>, released: &'a Notify) -> Self {
        Self {
            transport,
            _released: ReleaseOnDrop(released),
        }
    }
}

impl Deref for DriverGuard<'_> {
    type Target = Transport;

    fn deref(&self) -> &Self::Target {
        &self.transport
    }
}

impl DerefMut for DriverGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.transport
    }
}

struct ReleaseOnDrop<'a>(&'a Notify);

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        self.0.notify_waiters();
    }
}

#[derive(Debug)]
struct Inner {
    config: ResolverConfig,
    state: Mutex<State>,
    driver: tokio::sync::Mutex<Transport>,
    driver_released: Notify,
    wakeup: Notify,
    cache: Option<Cache>,
}

impl Inner {
    /// Lock the query bookkeeping. Never held across an `.await` or socket I/O.
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn initial_protocol(&self, flags: QueryFlags) -> Protocol {
        if flags.use_tcp || self.config.use_tcp {
            Protocol::Tcp
        } else {
            Protocol::Udp
        }
    }

    /// Names to try in order for `name`. Relative names are only qualified with the search
    /// list when asked to. Names with at least `ndots` dots are tried as-is first, others
    /// are tried as-is last.
    fn candidates(&self, name: Name, flags: QueryFlags) -> Vec<Name> {
        if name.is_fqdn() || !flags.search || self.config.search.is_empty() {
            return vec![name.to_fqdn()];
        }

        let searched = self.config.search.iter().filter_map(|domain| match name.clone().append(domain) {
            Ok(n) => Some(n.to_fqdn()),
            Err(e) => {
                tracing::debug!(message = "skipping search domain", name = %name, domain = %domain, err = %e);
                None
            }
        });

        let dots = name.num_labels().saturating_sub(1);
        let mut out = Vec::with_capacity(self.config.search.len() + 1);
        if dots >= usize::from(self.config.ndots) {
            out.push(name.clone().to_fqdn());
            out.extend(searched);
        } else {
            out.extend(searched);
            out.push(name.clone().to_fqdn());
        }

        out
    }

    fn submit(&self, name: Name, rtype: RecordType, rclass: RecordClass, flags: QueryFlags) -> Result<QueryHandle, ResolveError> {
        let candidates = self.candidates(name, flags);
        let template = Question::new(Name::root(), rtype).set_qclass(rclass);
        let protocol = self.initial_protocol(flags);

        let handle = {
            let mut state = self.state();
            let id = state.ids.allocate()?;
            state.next_handle += 1;
            let handle = QueryHandle::new(state.next_handle);

            let mut query = match Query::new(handle, id, template, candidates, flags, self.config.retries, protocol) {
                Ok(q) => q,
                Err(e) => {
                    state.ids.release(id);
                    return Err(e);
                }
            };

            tracing::debug!(
                message = "submitted query",
                handle = %handle,
                id = %id,
                name = %query.question().name(),
                rtype = %rtype,
                rclass = %rclass,
            );

            let cached = match self.answer_from_cache(&mut query, protocol) {
                Ok(c) => c,
                Err(e) => {
                    state.ids.release(id);
                    return Err(e);
                }
            };

            state.queries.insert(handle, query);
            if cached {
                state.retire(handle);
            } else {
                state.by_id.insert(id, handle);
            }

            handle
        };

        self.wakeup.notify_one();
        Ok(handle)
    }

    /// Settle a new query from the cache if possible, skipping any search candidates
    /// that are cached as not existing. Returns true if the query is finished.
    fn answer_from_cache(&self, query: &mut Query, protocol: Protocol) -> Result<bool, ResolveError> {
        let cache = match &self.cache {
            Some(c) => c,
            None => return Ok(false),
        };

        loop {
            let answer = match cache.lookup(query.question()) {
                Some(a) => a,
                None => return Ok(false),
            };

            if answer.status() != ResponseCode::NameError {
                query.complete(answer)?;
                return Ok(true);
            }

            if !query.next_candidate(protocol)? {
                let err = nxdomain(query.question());
                query.fail(err)?;
                return Ok(true);
            }
        }
    }

    /// Run the event loop until `until` is reached, the process is asked to shut down,
    /// or the calling future is dropped.
    async fn drive(&self, transport: &mut Transport, until: DriveUntil) {
        let mut event = None;

        loop {
            let next = self.run_step(transport, event.take());
            if self.should_stop(until) {
                return;
            }

            let mut deadline = next.unwrap_or_else(|| Instant::now() + IDLE_WAIT);
            if let DriveUntil::Deadline(d) = until {
                deadline = deadline.min(d);
            }

            tokio::select! {
                ev = transport.readable() => event = ev,
                _ = tokio::time::sleep_until(deadline) => {},
                _ = self.wakeup.notified() => {},
            }
        }
    }

    fn should_stop(&self, until: DriveUntil) -> bool {
        let state = self.state();
        match until {
            DriveUntil::Query(handle) => state.is_finished(handle) || !state.queries.contains_key(&handle),
            DriveUntil::Deadline(d) => Instant::now() >= d || state.num_outstanding() == 0,
        }
    }

    /// One non-blocking step of the event loop: handle whatever has arrived, time out
    /// attempts past their deadline, send anything waiting to be sent, and stop tracking
    /// transactions that finished. Returns the nearest time something needs to happen.
    fn run_step(&self, transport: &mut Transport, first: Option<TransportEvent>) -> Option<Instant> {
        if std::mem::take(&mut self.state().shutdown) {
            transport.shutdown();
        }

        let now = Instant::now();
        let mut events: Vec<TransportEvent> = first.into_iter().collect();
        events.extend(transport.poll());

        {
            let mut state = self.state();
            for ev in events {
                self.dispatch(&mut state, transport, ev, now);
            }

            self.expire(&mut state, transport, now);
        }

        self.send_pending(transport, now);
        self.flush_forgotten(transport);
        self.state().next_deadline()
    }

    fn flush_forgotten(&self, transport: &mut Transport) {
        let ids = std::mem::take(&mut self.state().pending_forget);
        for id in ids {
            transport.forget(id);
        }
    }

    /// Send every query that is new or due for another attempt. Messages are built under
    /// the state lock but written to sockets after it has been released.
    fn send_pending(&self, transport: &mut Transport, now: Instant) {
        let mut outgoing = Vec::new();

        {
            let mut state = self.state();
            for handle in state.handles_in(|s| matches!(s, QueryState::Submitted | QueryState::Retrying)) {
                let Some(query) = state.queries.get_mut(&handle) else {
                    continue;
                };

                let endpoint = query
                    .pinned_endpoint()
                    .unwrap_or_else(|| transport.select(query.endpoint(), now));

                let bytes = match self.encode(query) {
                    Ok(b) => b,
                    Err(e) => {
                        state.finish(handle, |q| q.fail(e));
                        continue;
                    }
                };

                if let Err(e) = query.sent(endpoint) {
                    tracing::error!(message = "unable to send query", handle = %handle, err = %e);
                    continue;
                }

                outgoing.push((handle, query.id(), endpoint, query.protocol(), bytes));
            }
        }

        if outgoing.is_empty() {
            return;
        }

        let mut results = Vec::with_capacity(outgoing.len());
        for (handle, id, endpoint, protocol, bytes) in outgoing {
            tracing::trace!(
                message = "sending query",
                handle = %handle,
                id = %id,
                server = %transport.addr(endpoint),
                protocol = %protocol,
                size = bytes.len(),
            );

            let res = transport.send(id, endpoint, protocol, bytes);
            results.push((handle, endpoint, res));
        }

        let deadline = now + self.config.timeout;
        let mut state = self.state();
        for (handle, endpoint, res) in results {
            let Some(query) = state.queries.get_mut(&handle) else {
                continue;
            };

            // Canceled or failed while the lock wasn't held.
            if query.state() != QueryState::Sent {
                continue;
            }

            // A failed send is handled like an attempt that got no response, on the next step.
            let deadline = match res {
                Ok(()) => deadline,
                Err(e) => {
                    tracing::warn!(message = "unable to send query", handle = %handle, server = %transport.addr(endpoint), err = %e);
                    now
                }
            };

            if let Err(e) = query.awaiting(deadline) {
                tracing::error!(message = "unable to track query", handle = %handle, err = %e);
            }
        }
    }

    fn encode(&self, query: &Query) -> Result<Vec<u8>, ResolveError> {
        let mut msg = Message::new(query.id(), Flags::default().set_query().set_recursion_desired())
            .add_question(query.question().clone());

        if self.config.edns0 {
            msg = msg.set_edns(self.config.udp_payload());
        }

        msg.encode()
    }

    fn dispatch(&self, state: &mut State, transport: &mut Transport, event: TransportEvent, now: Instant) {
        match event {
            TransportEvent::Inbound {
                endpoint,
                protocol,
                bytes,
            } => self.dispatch_response(state, transport, endpoint, protocol, &bytes, now),
            TransportEvent::StreamFailed { id, endpoint, err } => {
                let Some(handle) = state.awaiting(id, endpoint, Protocol::Tcp) else {
                    tracing::trace!(message = "ignoring failure of stale TCP exchange", id = %id, err = %err);
                    return;
                };

                tracing::debug!(message = "TCP exchange failed", handle = %handle, id = %id, server = %transport.addr(endpoint), err = %err);
                transport.record_failure(endpoint, now);
                self.retry_or_fail(state, handle);
            }
        }
    }

    fn dispatch_response(
        &self,
        state: &mut State,
        transport: &mut Transport,
        endpoint: usize,
        protocol: Protocol,
        bytes: &[u8],
        now: Instant,
    ) {
        let server = transport.addr(endpoint);
        let msg = match Message::decode(bytes) {
            Ok(m) => m,
            Err(e) => {
                // Keep track of garbage that claims to be for a query we're waiting on so it
                // can be reported if no good response turns up. The query keeps waiting.
                let id = match bytes {
                    [hi, lo, ..] => MessageId::from(u16::from_be_bytes([*hi, *lo])),
                    _ => {
                        tracing::debug!(message = "dropping runt response", server = %server, size = bytes.len());
                        return;
                    }
                };

                match state.awaiting(id, endpoint, protocol) {
                    Some(handle) => {
                        tracing::debug!(message = "malformed response", handle = %handle, id = %id, server = %server, err = %e);
                        if let Some(q) = state.queries.get_mut(&handle) {
                            q.set_last_error(ErrorKind::MalformedMessage);
                        }
                    }
                    None => {
                        tracing::debug!(message = "dropping malformed response", id = %id, server = %server, err = %e);
                    }
                }

                return;
            }
        };

        let id = msg.id();
        let Some(handle) = state.awaiting(id, endpoint, protocol) else {
            let err = ResolveError::mismatch(format!("id {} from {} over {}", id, server, protocol));
            tracing::debug!(message = "dropping response", err = %err);
            return;
        };

        let Some(query) = state.queries.get_mut(&handle) else {
            return;
        };

        let question = query.question().clone();
        if !msg.flags().is_response() || msg.questions() != std::slice::from_ref(&question) {
            let err = ResolveError::mismatch(format!("id {} from {} does not answer {}", id, server, question.name()));
            tracing::debug!(message = "dropping response", handle = %handle, err = %err);
            return;
        }

        if msg.flags().is_truncated() && protocol == Protocol::Udp {
            tracing::debug!(message = "truncated response, retrying over TCP", handle = %handle, id = %id, server = %server);
            if let Err(e) = query.retry_tcp() {
                tracing::error!(message = "unable to retry query", handle = %handle, err = %e);
            }
            return;
        }

        let code = msg.flags().get_response_code();
        tracing::trace!(message = "received response", handle = %handle, id = %id, server = %server, code = ?code, answers = msg.answers().len());

        match code {
            ResponseCode::NoError => {
                transport.record_success(endpoint);
                let parts = AnswerParts::from_response(&question, &msg);
                self.cache_insert(&question, &parts);

                let expires = now + parts.ttl.min(self.config.cache_max_ttl);
                let answer = Answer::new(&question, parts, expires, false);
                state.finish(handle, |q| q.complete(answer));
            }
            ResponseCode::NameError => {
                transport.record_success(endpoint);
                let parts = AnswerParts::from_response(&question, &msg);
                self.cache_insert(&question, &parts);

                let protocol = self.initial_protocol(query.flags());
                match query.next_candidate(protocol) {
                    Ok(true) => {}
                    Ok(false) => state.finish(handle, |q| q.fail(nxdomain(&question))),
                    Err(e) => tracing::error!(message = "unable to try next name", handle = %handle, err = %e),
                }
            }
            ResponseCode::ServerFailure | ResponseCode::Refused => {
                let kind = if code == ResponseCode::Refused {
                    ErrorKind::Refused
                } else {
                    ErrorKind::ServFail
                };

                tracing::debug!(message = "nameserver failure", handle = %handle, server = %server, code = ?code);
                query.set_last_error(kind);
                transport.record_failure(endpoint, now);
                self.retry_or_fail(state, handle);
            }
            other => {
                transport.record_success(endpoint);
                let err = ResolveError::new(
                    ErrorKind::Remote,
                    format!("{} returned {:?} for {} {}", server, other, question.name(), question.qtype()),
                );
                state.finish(handle, |q| q.fail(err));
            }
        }
    }

    fn cache_insert(&self, question: &Question, parts: &AnswerParts) {
        if let Some(cache) = &self.cache {
            cache.insert(question, parts);
        }
    }

    /// Retry attempts that are past their deadline without a response.
    fn expire(&self, state: &mut State, transport: &mut Transport, now: Instant) {
        let expired: Vec<(QueryHandle, Option<usize>)> = state
            .queries
            .values()
            .filter(|q| q.is_expired(now))
            .map(|q| (q.handle(), q.endpoint()))
            .collect();

        for (handle, endpoint) in expired {
            if let Some(ep) = endpoint {
                tracing::debug!(message = "query attempt timed out", handle = %handle, server = %transport.addr(ep));
                transport.record_failure(ep, now);
            }

            self.retry_or_fail(state, handle);
        }
    }

    /// Use a retry for a query whose attempt failed or fail it if none are left. The error
    /// reported is based on the last problem seen for the query, a timeout if nothing else.
    fn retry_or_fail(&self, state: &mut State, handle: QueryHandle) {
        let Some(query) = state.queries.get_mut(&handle) else {
            return;
        };

        match query.retry() {
            Ok(true) => {
                tracing::debug!(
                    message = "retrying query",
                    handle = %handle,
                    name = %query.question().name(),
                    retry = query.retries_used(),
                    retries = self.config.retries,
                );
            }
            Ok(false) => {
                let err = self.exhausted(query);
                state.finish(handle, |q| q.fail(err));
            }
            Err(e) => tracing::error!(message = "unable to retry query", handle = %handle, err = %e),
        }
    }

    fn exhausted(&self, query: &Query) -> ResolveError {
        let q = query.question();
        match query.last_error() {
            Some(ErrorKind::MalformedMessage) => {
                ResolveError::malformed(format!("only malformed responses for {} {}", q.name(), q.qtype()))
            }
            Some(kind @ (ErrorKind::ServFail | ErrorKind::Refused)) => {
                ResolveError::new(kind, format!("{} {} after {} attempt(s)", q.name(), q.qtype(), self.config.attempts()))
            }
            _ => ResolveError::new(
                ErrorKind::Timeout,
                format!(
                    "no response for {} {} after {} attempt(s) of {:?}",
                    q.name(),
                    q.qtype(),
                    self.config.attempts(),
                    self.config.timeout
                ),
            ),
        }
    }
}

fn nxdomain(question: &Question) -> ResolveError {
    ResolveError::new(ErrorKind::NXDomain, format!("{} does not exist", question.name()))
}

#[derive(Debug, Default)]
struct State {
    next_handle: u64,
    queries: HashMap<QueryHandle, Query>,
    by_id: HashMap<MessageId, QueryHandle>,
    ids: IdAllocator,
    pending_forget: Vec<MessageId>,
    shutdown: bool,
}

impl State {
    fn unknown(handle: QueryHandle) -> ResolveError {
        ResolveError::new(ErrorKind::UnknownQuery, format!("no query for handle {}", handle))
    }

    fn notifier(&self, handle: QueryHandle) -> Result<Arc<Notify>, ResolveError> {
        self.queries
            .get(&handle)
            .map(|q| q.notifier())
            .ok_or_else(|| Self::unknown(handle))
    }

    fn is_finished(&self, handle: QueryHandle) -> bool {
        self.queries.get(&handle).map(|q| q.state().is_terminal()).unwrap_or(false)
    }

    fn num_outstanding(&self) -> usize {
        self.queries.values().filter(|q| !q.state().is_terminal()).count()
    }

    fn handles_in<F>(&self, f: F) -> Vec<QueryHandle>
    where
        F: Fn(QueryState) -> bool,
    {
        let mut out: Vec<QueryHandle> = self
            .queries
            .values()
            .filter(|q| f(q.state()))
            .map(|q| q.handle())
            .collect();

        // Oldest first.
        out.sort();
        out
    }

    /// Query waiting on a response for transaction `id` from `endpoint` over `protocol`.
    fn awaiting(&self, id: MessageId, endpoint: usize, protocol: Protocol) -> Option<QueryHandle> {
        let handle = *self.by_id.get(&id)?;
        let query = self.queries.get(&handle)?;

        if query.state() == QueryState::AwaitingResponse
            && query.endpoint() == Some(endpoint)
            && query.protocol() == protocol
        {
            Some(handle)
        } else {
            None
        }
    }

    /// Apply a terminal transition to a query and stop tracking its transaction.
    fn finish<F>(&mut self, handle: QueryHandle, f: F)
    where
        F: FnOnce(&mut Query) -> Result<(), ResolveError>,
    {
        let Some(query) = self.queries.get_mut(&handle) else {
            return;
        };

        match f(query) {
            Ok(()) => self.retire(handle),
            Err(e) => tracing::error!(message = "unable to finish query", handle = %handle, err = %e),
        }
    }

    fn retire(&mut self, handle: QueryHandle) {
        let Some(query) = self.queries.get(&handle) else {
            return;
        };

        let id = query.id();
        if self.by_id.get(&id) == Some(&handle) {
            self.by_id.remove(&id);
        }

        self.ids.release(id);
        self.pending_forget.push(id);
    }

    /// Hand out the result of a finished query and forget about it.
    fn take_result(&mut self, handle: QueryHandle) -> Result<Option<Result<Answer, ResolveError>>, ResolveError> {
        let query = self.queries.get_mut(&handle).ok_or_else(|| Self::unknown(handle))?;
        match query.take_result() {
            Some(res) => {
                self.queries.remove(&handle);
                Ok(Some(res))
            }
            None if query.state().is_terminal() => {
                self.queries.remove(&handle);
                Err(Self::unknown(handle))
            }
            None => Ok(None),
        }
    }

    fn take_completed(&mut self) -> Vec<(QueryHandle, Result<Answer, ResolveError>)> {
        let mut out = Vec::new();
        for handle in self.handles_in(|s| s.is_terminal()) {
            if let Ok(Some(res)) = self.take_result(handle) {
                out.push((handle, res));
            }
        }

        out
    }

    fn fail_outstanding<F>(&mut self, err: F) -> usize
    where
        F: Fn(&Query) -> ResolveError,
    {
        let handles = self.handles_in(|s| !s.is_terminal());
        for handle in handles.iter() {
            self.finish(*handle, |q| {
                let e = err(q);
                q.fail(e)
            });
        }

        handles.len()
    }

    fn cancel_outstanding(&mut self) -> usize {
        let handles = self.handles_in(|s| !s.is_terminal());
        for handle in handles.iter() {
            self.finish(*handle, Query::cancel);
        }

        handles.len()
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.queries
            .values()
            .filter_map(|q| match q.state() {
                QueryState::AwaitingResponse => q.deadline(),
                QueryState::Submitted | QueryState::Retrying => Some(Instant::now()),
                _ => None,
            })
            .min()
    }
}

#[cfg(test)]
mod test {
    use super::Resolver;
    use crate::answer::AnswerParts;
    use crate::config::ResolverConfig;
    use crate::core::ErrorKind;
    use crate::dns::{Name, Question, Record, RecordClass, RecordData, RecordDataA, RecordType, ResponseCode};
    use crate::query::QueryFlags;
    use std::net::{Ipv4Addr, UdpSocket};
    use std::str::FromStr;
    use std::time::Duration;

    fn name(s: &str) -> Name {
        Name::from_str(s).unwrap()
    }

    // Nameserver that never answers anything sent to it.
    fn silent_server() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0").unwrap()
    }

    fn new_resolver(sock: &UdpSocket) -> Resolver {
        let cfg = ResolverConfig {
            nameservers: vec![sock.local_addr().unwrap()],
            search: vec![name("example.com."), name("example.net.")],
            timeout: Duration::from_millis(50),
            retries: 0,
            ..Default::default()
        };

        Resolver::new(cfg).unwrap()
    }

    fn a_parts(owner: &str, ttl: u32) -> AnswerParts {
        AnswerParts {
            status: ResponseCode::NoError,
            cname: None,
            records: vec![Record::new(
                name(owner),
                RecordType::A,
                RecordClass::INET,
                ttl,
                RecordData::A(RecordDataA::new(Ipv4Addr::new(192, 0, 2, 1))),
            )],
            ttl: Duration::from_secs(u64::from(ttl)),
        }
    }

    fn nxdomain_parts() -> AnswerParts {
        AnswerParts {
            status: ResponseCode::NameError,
            cname: None,
            records: Vec::new(),
            ttl: Duration::from_secs(300),
        }
    }

    #[tokio::test]
    async fn test_new_no_nameservers() {
        let cfg = ResolverConfig {
            nameservers: Vec::new(),
            ..Default::default()
        };

        let err = Resolver::new(cfg).unwrap_err();
        assert_eq!(ErrorKind::Configuration, err.kind());
    }

    #[test]
    fn test_new_outside_runtime() {
        let err = Resolver::new(ResolverConfig::default()).unwrap_err();
        assert_eq!(ErrorKind::Configuration, err.kind());
    }

    #[tokio::test]
    async fn test_submit_invalid_name() {
        let sock = silent_server();
        let resolver = new_resolver(&sock);

        let err = resolver.submit("bad..name", RecordType::A).unwrap_err();
        assert_eq!(ErrorKind::InvalidName, err.kind());
        assert_eq!(0, resolver.num_outstanding());
    }

    #[tokio::test]
    async fn test_candidates_no_search() {
        let sock = silent_server();
        let resolver = new_resolver(&sock);

        let out = resolver.inner.candidates(name("www"), QueryFlags::default());
        assert_eq!(vec![name("www.")], out);
    }

    #[tokio::test]
    async fn test_candidates_below_ndots() {
        let sock = silent_server();
        let resolver = new_resolver(&sock);

        let out = resolver.inner.candidates(name("www"), QueryFlags::default().search());
        assert_eq!(vec![name("www.example.com."), name("www.example.net."), name("www.")], out);
    }

    #[tokio::test]
    async fn test_candidates_at_ndots() {
        let sock = silent_server();
        let resolver = new_resolver(&sock);

        let out = resolver.inner.candidates(name("www.corp"), QueryFlags::default().search());
        assert_eq!(
            vec![name("www.corp."), name("www.corp.example.com."), name("www.corp.example.net.")],
            out
        );
    }

    #[tokio::test]
    async fn test_candidates_fqdn() {
        let sock = silent_server();
        let resolver = new_resolver(&sock);

        let out = resolver.inner.candidates(name("www.corp."), QueryFlags::default().search());
        assert_eq!(vec![name("www.corp.")], out);
    }

    #[tokio::test]
    async fn test_submit_cache_hit() {
        let sock = silent_server();
        let resolver = new_resolver(&sock);
        let q = Question::new(name("www.example.com."), RecordType::A);
        resolver.inner.cache.as_ref().unwrap().insert(&q, &a_parts("www.example.com.", 300));

        let handle = resolver.submit("www.example.com", RecordType::A).unwrap();
        let answer = resolver.check(handle).unwrap().unwrap();

        assert!(answer.from_cache());
        assert_eq!(1, answer.records().len());
        assert_eq!(0, resolver.num_outstanding());
    }

    #[tokio::test]
    async fn test_submit_cache_nxdomain() {
        let sock = silent_server();
        let resolver = new_resolver(&sock);
        let q = Question::new(name("missing.example.com."), RecordType::A);
        resolver.inner.cache.as_ref().unwrap().insert(&q, &nxdomain_parts());

        let handle = resolver.submit("missing.example.com", RecordType::A).unwrap();
        let err = resolver.wait(handle).await.unwrap_err();

        assert_eq!(ErrorKind::NXDomain, err.kind());
    }

    #[tokio::test]
    async fn test_submit_cache_nxdomain_next_candidate() {
        let sock = silent_server();
        let resolver = new_resolver(&sock);
        let cache = resolver.inner.cache.as_ref().unwrap();
        cache.insert(
            &Question::new(name("www.example.com."), RecordType::A),
            &nxdomain_parts(),
        );
        cache.insert(
            &Question::new(name("www.example.net."), RecordType::A),
            &a_parts("www.example.net.", 300),
        );

        let handle = resolver
            .submit_with("www", RecordType::A, RecordClass::INET, QueryFlags::default().search())
            .unwrap();
        let answer = resolver.wait(handle).await.unwrap();

        assert_eq!(&name("www.example.net."), answer.owner());
    }

    #[tokio::test]
    async fn test_handle_consumed_once() {
        let sock = silent_server();
        let resolver = new_resolver(&sock);
        let q = Question::new(name("www.example.com."), RecordType::A);
        resolver.inner.cache.as_ref().unwrap().insert(&q, &a_parts("www.example.com.", 300));

        let handle = resolver.submit("www.example.com.", RecordType::A).unwrap();
        assert!(resolver.wait(handle).await.is_ok());

        assert_eq!(ErrorKind::UnknownQuery, resolver.wait(handle).await.unwrap_err().kind());
        assert_eq!(ErrorKind::UnknownQuery, resolver.check(handle).unwrap_err().kind());
        assert_eq!(ErrorKind::UnknownQuery, resolver.cancel(handle).unwrap_err().kind());
    }

    #[tokio::test]
    async fn test_cancel_then_check() {
        let sock = silent_server();
        let resolver = new_resolver(&sock);

        let handle = resolver.submit("www.example.com.", RecordType::A).unwrap();
        assert!(resolver.check(handle).unwrap().is_none());

        resolver.cancel(handle).unwrap();
        // Second cancel of a finished query is a no-op.
        resolver.cancel(handle).unwrap();

        let err = resolver.check(handle).unwrap_err();
        assert_eq!(ErrorKind::Canceled, err.kind());
        assert_eq!(0, resolver.num_outstanding());
    }

    #[tokio::test]
    async fn test_wait_timeout() {
        let sock = silent_server();
        let resolver = new_resolver(&sock);

        let handle = resolver.submit("www.example.com.", RecordType::A).unwrap();
        let err = resolver.wait(handle).await.unwrap_err();

        assert_eq!(ErrorKind::Timeout, err.kind());
    }

    #[tokio::test]
    async fn test_global_system_failure() {
        let sock = silent_server();
        let resolver = new_resolver(&sock);

        let h1 = resolver.submit("one.example.com.", RecordType::A).unwrap();
        let h2 = resolver.submit("two.example.com.", RecordType::MX).unwrap();
        resolver.global_system_failure();

        assert_eq!(ErrorKind::SystemFailure, resolver.wait(h1).await.unwrap_err().kind());
        assert_eq!(ErrorKind::SystemFailure, resolver.check(h2).unwrap_err().kind());
    }

    #[tokio::test]
    async fn test_finish() {
        let sock = silent_server();
        let resolver = new_resolver(&sock);

        let h1 = resolver.submit("one.example.com.", RecordType::A).unwrap();
        let h2 = resolver.submit("two.example.com.", RecordType::A).unwrap();
        resolver.finish();

        let completed = resolver.completed_queries(Duration::from_millis(10)).await;
        assert_eq!(2, completed.len());
        assert_eq!(h1, completed[0].0);
        assert_eq!(h2, completed[1].0);
        assert!(completed.iter().all(|(_, r)| r.as_ref().unwrap_err().kind() == ErrorKind::Canceled));
    }

    #[tokio::test]
    async fn test_completed_queries_timeout() {
        let sock = silent_server();
        let resolver = new_resolver(&sock);

        let handle = resolver.submit("www.example.com.", RecordType::A).unwrap();
        let completed = resolver.completed_queries(Duration::from_secs(5)).await;

        assert_eq!(1, completed.len());
        assert_eq!(handle, completed[0].0);
        assert_eq!(ErrorKind::Timeout, completed[0].1.as_ref().unwrap_err().kind());
    }
}
