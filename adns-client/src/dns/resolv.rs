use crate::core::ResolveError;
use crate::dns::name::Name;
use std::fmt::Debug;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

const DEFAULT_PORT: u16 = 53;
const MAX_NAMESERVERS: usize = 3;
const MAX_SEARCH_DOMAINS: usize = 6;

/// Configuration for a resolver based on a parsed resolv.conf file.
///
/// The `nameserver`, `search`, and `domain` settings and the subset of `options`
/// understood by `ResolvConfOptions` are supported. Everything else is ignored.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct ResolvConf {
    pub nameservers: Vec<SocketAddr>,
    pub search: Vec<Name>,
    pub options: ResolvConfOptions,
}

/// Options to change the behavior of a resolver based on a resolv.conf file.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct ResolvConfOptions {
    pub timeout: Option<Duration>,
    pub attempts: Option<u8>,
    pub ndots: Option<u8>,
    pub rotate: Option<bool>,
    pub edns0: Option<bool>,
    pub use_vc: Option<bool>,
}

/// Read settings for a resolver from a resolv.conf configuration file.
pub async fn config<R>(read: R) -> Result<ResolvConf, ResolveError>
where
    R: AsyncRead + Send + Sync + Unpin + 'static,
{
    let mut lines = BufReader::new(read).lines();
    let mut conf = ResolvConf::default();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        let mut parts = line.split_whitespace();
        let key = match parts.next() {
            Some(k) => k,
            None => {
                tracing::debug!(message = "skipping malformed resolv.conf line", line = line);
                continue;
            }
        };

        match Token::get(key) {
            Some(Token::NameServer) => {
                if conf.nameservers.len() < MAX_NAMESERVERS {
                    conf.nameservers.push(parse_nameserver(line, parts)?);
                } else {
                    tracing::debug!(message = "skipping extra nameserver", max = MAX_NAMESERVERS, line = line);
                }
            }
            // `domain` and `search` are mutually exclusive, the last one in the file wins.
            Some(Token::Domain) => {
                conf.search = parse_search(parts.take(1));
            }
            Some(Token::Search) => {
                conf.search = parse_search(parts);
                conf.search.truncate(MAX_SEARCH_DOMAINS);
            }
            Some(Token::Options) => {
                for opt in parse_options(parts) {
                    match opt {
                        OptionsToken::Timeout(t) => {
                            conf.options.timeout = Some(Duration::from_secs(u64::from(t)));
                        }
                        OptionsToken::Attempts(n) => {
                            conf.options.attempts = Some(n);
                        }
                        OptionsToken::NDots(n) => {
                            conf.options.ndots = Some(n);
                        }
                        OptionsToken::Rotate => {
                            conf.options.rotate = Some(true);
                        }
                        OptionsToken::Edns0 => {
                            conf.options.edns0 = Some(true);
                        }
                        OptionsToken::UseVc => {
                            conf.options.use_vc = Some(true);
                        }
                    }
                }
            }
            None => {
                tracing::debug!(
                    message = "skipping unknown resolv.conf setting",
                    setting = key,
                    line = line
                );
                continue;
            }
        }
    }

    Ok(conf)
}

/// Parse a single nameserver IP address, adding a default port of 53, from a `nameserver`
/// line in a resolv.conf file, returning an error if the address is malformed.
fn parse_nameserver<'a>(line: &str, mut parts: impl Iterator<Item = &'a str>) -> Result<SocketAddr, ResolveError> {
    if let Some(part) = parts.next() {
        part.parse::<IpAddr>()
            .map(|ip| (ip, DEFAULT_PORT).into())
            .map_err(|e| ResolveError::configuration_cause(format!("malformed nameserver address '{}'", part), e))
    } else {
        Err(ResolveError::configuration(format!(
            "malformed nameserver configuration '{}'",
            line
        )))
    }
}

/// Parse domains from a `search` or `domain` line, treating each as fully qualified
/// and skipping any that aren't valid names.
fn parse_search<'a>(parts: impl Iterator<Item = &'a str>) -> Vec<Name> {
    let mut out = Vec::new();

    for part in parts {
        match Name::from_str(part) {
            Ok(n) => out.push(n.to_fqdn()),
            Err(e) => {
                tracing::debug!(message = "skipping invalid resolv.conf search domain", domain = part, err = %e);
            }
        }
    }

    out
}

/// Parse one or more options from an `option` line in a resolv.conf file, ignoring any
/// malformed or unsupported options.
fn parse_options<'a>(parts: impl Iterator<Item = &'a str>) -> Vec<OptionsToken> {
    let mut out = Vec::new();

    for part in parts {
        let opt = match part.parse() {
            Ok(o) => o,
            Err(e) => {
                tracing::debug!(message = "skipping unknown resolv.conf option", option = part, err = %e);
                continue;
            }
        };

        out.push(opt);
    }
    out
}

/// Top-level configuration setting in a resolv.conf file.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
enum Token {
    NameServer,
    Domain,
    Search,
    Options,
}

impl Token {
    fn get(s: &str) -> Option<Self> {
        match s {
            "nameserver" => Some(Self::NameServer),
            "domain" => Some(Self::Domain),
            "search" => Some(Self::Search),
            "options" => Some(Self::Options),
            _ => None,
        }
    }
}

/// Keyword or key-value pair associated with an option token.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
enum OptionsToken {
    Timeout(u8),
    Attempts(u8),
    NDots(u8),
    Rotate,
    Edns0,
    UseVc,
}

impl OptionsToken {
    const MAX_TIMEOUT: u8 = 30;
    const MAX_ATTEMPTS: u8 = 5;
    const MAX_NDOTS: u8 = 15;

    fn parse(line: &str, val: &str, max: u8) -> Result<u8, ResolveError> {
        let n: u8 = val
            .parse()
            .map_err(|e| ResolveError::configuration_cause(format!("unable to parse {} value '{}'", line, val), e))?;

        Ok(n.min(max))
    }
}

impl FromStr for OptionsToken {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rotate" => Ok(Self::Rotate),
            "edns0" => Ok(Self::Edns0),
            "use-vc" | "usevc" => Ok(Self::UseVc),
            _ => match s.split_once(':') {
                Some(("timeout", v)) => Ok(Self::Timeout(Self::parse(s, v, Self::MAX_TIMEOUT)?)),
                Some(("attempts", v)) => Ok(Self::Attempts(Self::parse(s, v, Self::MAX_ATTEMPTS)?)),
                Some(("ndots", v)) => Ok(Self::NDots(Self::parse(s, v, Self::MAX_NDOTS)?)),
                _ => Err(ResolveError::configuration(format!("unknown option {}", s))),
            },
        }
    }
}
