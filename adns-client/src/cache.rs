use crate::answer::{Answer, AnswerParts};
use crate::dns::{Question, ResponseCode};
use moka::Expiry;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct CacheEntry {
    parts: AnswerParts,
    expires: Instant,
}

/// Expire each entry when the TTL of the answer it holds runs out.
struct EntryExpiry;

impl EntryExpiry {
    fn remaining(entry: &CacheEntry) -> Option<Duration> {
        Some(entry.expires.saturating_duration_since(Instant::now()))
    }
}

impl Expiry<Question, Arc<CacheEntry>> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &Question,
        value: &Arc<CacheEntry>,
        _created_at: std::time::Instant,
    ) -> Option<Duration> {
        Self::remaining(value)
    }

    fn expire_after_update(
        &self,
        _key: &Question,
        value: &Arc<CacheEntry>,
        _updated_at: std::time::Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Self::remaining(value)
    }
}

/// Positive and negative answers keyed by the (name, type, class) they answer.
///
/// Entries are evicted in the background once their TTL passes but lookups also
/// check expiry themselves so that an entry is never returned past its TTL.
#[derive(Clone)]
pub(crate) struct Cache {
    inner: moka::sync::Cache<Question, Arc<CacheEntry>>,
    max_ttl: Duration,
}

impl Cache {
    pub(crate) fn new(capacity: u64, max_ttl: Duration) -> Self {
        let inner = moka::sync::Cache::builder()
            .max_capacity(capacity)
            .expire_after(EntryExpiry)
            .build();

        Self { inner, max_ttl }
    }

    pub(crate) fn lookup(&self, question: &Question) -> Option<Answer> {
        self.lookup_at(question, Instant::now())
    }

    pub(crate) fn lookup_at(&self, question: &Question, now: Instant) -> Option<Answer> {
        let entry = self.inner.get(question)?;
        if entry.expires <= now {
            self.inner.invalidate(question);
            return None;
        }

        tracing::trace!(message = "cache hit", name = %question.name(), rtype = %question.qtype(), status = ?entry.parts.status);
        Some(Answer::new(question, entry.parts.clone(), entry.expires, true))
    }

    /// Cache `parts` as the answer to `question`. Only successful answers (including NODATA)
    /// and NXDOMAIN are kept. Answers with a TTL of zero are not cached at all.
    pub(crate) fn insert(&self, question: &Question, parts: &AnswerParts) {
        self.insert_at(question, parts, Instant::now())
    }

    pub(crate) fn insert_at(&self, question: &Question, parts: &AnswerParts, now: Instant) {
        if !matches!(parts.status, ResponseCode::NoError | ResponseCode::NameError) {
            return;
        }

        let ttl = parts.ttl.min(self.max_ttl);
        if ttl.is_zero() {
            return;
        }

        let entry = CacheEntry {
            parts: parts.clone(),
            expires: now + ttl,
        };

        self.inner.insert(question.clone(), Arc::new(entry));
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("entries", &self.inner.entry_count())
            .field("max_ttl", &self.max_ttl)
            .finish()
    }
}
