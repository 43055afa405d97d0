use crate::dns::{Message, Name, Question, Record, RecordClass, RecordData, RecordType, ResponseCode};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

// Longest CNAME chain followed within a single response.
const MAX_CNAME_CHAIN: usize = 16;

/// Successful result of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    owner: Name,
    rtype: RecordType,
    rclass: RecordClass,
    status: ResponseCode,
    cname: Option<Name>,
    records: Vec<Record>,
    expires: Instant,
    from_cache: bool,
}

impl Answer {
    pub(crate) fn new(question: &Question, parts: AnswerParts, expires: Instant, from_cache: bool) -> Self {
        Self {
            owner: question.name().clone(),
            rtype: question.qtype(),
            rclass: question.qclass(),
            status: parts.status,
            cname: parts.cname,
            records: parts.records,
            expires,
            from_cache,
        }
    }

    /// Fully qualified name that was queried, after any search domain was applied.
    pub fn owner(&self) -> &Name {
        &self.owner
    }

    pub fn rtype(&self) -> RecordType {
        self.rtype
    }

    pub fn rclass(&self) -> RecordClass {
        self.rclass
    }

    pub fn status(&self) -> ResponseCode {
        self.status
    }

    /// Canonical name of the owner if the nameserver followed one or more CNAME records.
    pub fn cname(&self) -> Option<&Name> {
        self.cname.as_ref()
    }

    /// Records of the requested type and class, in the order they were received.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn rdata(&self) -> impl Iterator<Item = &RecordData> {
        self.records.iter().map(|r| r.rdata())
    }

    pub fn expires(&self) -> Instant {
        self.expires
    }

    pub fn from_cache(&self) -> bool {
        self.from_cache
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.owner, self.rclass, self.rtype)?;
        if let Some(c) = &self.cname {
            write!(f, " (cname {})", c)?;
        }
        write!(f, ": {} record(s)", self.records.len())
    }
}

/// The parts of a response that are kept for an answer, along with how long they may be cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AnswerParts {
    pub(crate) status: ResponseCode,
    pub(crate) cname: Option<Name>,
    pub(crate) records: Vec<Record>,
    pub(crate) ttl: Duration,
}

impl AnswerParts {
    /// Pick the records answering `question` out of a response, following any CNAME chain
    /// in the answer section that starts at the question name.
    pub(crate) fn from_response(question: &Question, msg: &Message) -> Self {
        let mut target = question.name().clone();
        let mut cname = None;
        let mut ttl: Option<u32> = None;
        let mut min_ttl = |t: u32| ttl = Some(ttl.map_or(t, |cur| cur.min(t)));

        if question.qtype() != RecordType::CNAME {
            for _ in 0..MAX_CNAME_CHAIN {
                let next = msg.answers().iter().find_map(|r| match r.rdata() {
                    RecordData::CNAME(rd) if r.name() == &target && r.rclass() == question.qclass() => {
                        Some((rd.name().clone(), r.ttl()))
                    }
                    _ => None,
                });

                match next {
                    Some((name, t)) => {
                        min_ttl(t);
                        target = name.clone();
                        cname = Some(name);
                    }
                    None => break,
                }
            }
        }

        let records: Vec<Record> = msg
            .answers()
            .iter()
            .filter(|r| r.name() == &target && r.rtype() == question.qtype() && r.rclass() == question.qclass())
            .cloned()
            .collect();

        for r in records.iter() {
            min_ttl(r.ttl());
        }

        // Nothing usable in the answer section (NODATA or NXDOMAIN) so the SOA in the
        // authority section, if any, says how long that negative answer is good for.
        let ttl = if records.is_empty() {
            negative_ttl(msg)
        } else {
            ttl.unwrap_or(0)
        };

        Self {
            status: msg.flags().get_response_code(),
            cname,
            records,
            ttl: Duration::from_secs(u64::from(ttl)),
        }
    }
}

/// Negative caching TTL of a response: the smaller of the SOA record TTL and the SOA
/// minimum field, or zero if there is no SOA in the authority section.
fn negative_ttl(msg: &Message) -> u32 {
    msg.authority()
        .iter()
        .find_map(|r| match r.rdata() {
            RecordData::SOA(soa) => Some(r.ttl().min(soa.minimum())),
            _ => None,
        })
        .unwrap_or(0)
}
