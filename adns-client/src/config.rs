use crate::core::ResolveError;
use crate::dns::{Name, ResolvConf, config};
use std::io::Cursor;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

const DEFAULT_NAMESERVER: SocketAddr = SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::LOCALHOST), 53);
const DEFAULT_EDNS_PAYLOAD: u16 = 1232;

/// Tunables for a `Resolver`.
///
/// Usually built from a parsed resolv.conf file via `From<ResolvConf>` and then
/// adjusted, but every field may be set directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Nameservers to send queries to, in order of preference.
    pub nameservers: Vec<SocketAddr>,
    /// Domains appended to relative names when a query asks for the search list.
    pub search: Vec<Name>,
    /// Relative names with at least this many dots are tried as-is before the search list.
    pub ndots: u8,
    /// How long to wait for a response to a single attempt.
    pub timeout: Duration,
    /// Attempts allowed after the first before a query fails with a timeout.
    pub retries: u32,
    /// Spread new queries across nameservers instead of always starting with the first.
    pub rotate: bool,
    /// Advertise a larger UDP payload size with an EDNS OPT record.
    pub edns0: bool,
    /// Send every query over TCP.
    pub use_tcp: bool,
    /// Consecutive failures before a nameserver is backed off.
    pub failover_threshold: u32,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
    pub cache_enabled: bool,
    /// Max number of cached (name, type, class) entries.
    pub cache_size: u64,
    /// Upper bound on how long any answer is cached regardless of its TTL.
    pub cache_max_ttl: Duration,
}

impl ResolverConfig {
    /// Build a configuration from resolv.conf formatted text instead of reading
    /// the system resolver configuration.
    pub async fn from_text<S>(text: S) -> Result<Self, ResolveError>
    where
        S: Into<String>,
    {
        let conf = config(Cursor::new(text.into())).await?;
        Ok(Self::from(conf))
    }

    /// Max UDP payload size advertised to (and accepted from) nameservers.
    pub fn udp_payload(&self) -> u16 {
        if self.edns0 {
            DEFAULT_EDNS_PAYLOAD
        } else {
            512
        }
    }

    /// Total number of attempts a query may make against nameservers.
    pub fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    pub(crate) fn validate(&self) -> Result<(), ResolveError> {
        if self.nameservers.is_empty() {
            return Err(ResolveError::configuration("no nameservers configured"));
        }

        if self.timeout.is_zero() {
            return Err(ResolveError::configuration("timeout must be greater than zero"));
        }

        if self.backoff_min > self.backoff_max {
            return Err(ResolveError::configuration(format!(
                "minimum backoff {:?} must not exceed maximum backoff {:?}",
                self.backoff_min, self.backoff_max
            )));
        }

        Ok(())
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            nameservers: vec![DEFAULT_NAMESERVER],
            search: Vec::new(),
            ndots: 1,
            timeout: Duration::from_secs(5),
            retries: 1,
            rotate: false,
            edns0: false,
            use_tcp: false,
            failover_threshold: 2,
            backoff_min: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
            cache_enabled: true,
            cache_size: 10_000,
            cache_max_ttl: Duration::from_secs(86_400),
        }
    }
}

impl From<ResolvConf> for ResolverConfig {
    fn from(value: ResolvConf) -> Self {
        let defaults = Self::default();
        let nameservers = if value.nameservers.is_empty() {
            defaults.nameservers
        } else {
            value.nameservers
        };

        Self {
            nameservers,
            search: value.search,
            ndots: value.options.ndots.unwrap_or(defaults.ndots),
            timeout: value.options.timeout.unwrap_or(defaults.timeout),
            // resolv.conf counts total attempts, a value of zero is treated as one.
            retries: value
                .options
                .attempts
                .map(|a| u32::from(a).saturating_sub(1))
                .unwrap_or(defaults.retries),
            rotate: value.options.rotate.unwrap_or(defaults.rotate),
            edns0: value.options.edns0.unwrap_or(defaults.edns0),
            use_tcp: value.options.use_vc.unwrap_or(defaults.use_tcp),
            ..defaults
        }
    }
}

#[cfg(test)]
mod test {
    use super::ResolverConfig;
    use crate::core::ErrorKind;
    use crate::dns::{Name, ResolvConf, ResolvConfOptions};
    use std::str::FromStr;
    use std::time::Duration;

    #[test]
    fn test_from_resolv_conf_defaults() {
        let cfg = ResolverConfig::from(ResolvConf::default());
        assert_eq!(vec!["127.0.0.1:53".parse::<std::net::SocketAddr>().unwrap()], cfg.nameservers);
        assert_eq!(Duration::from_secs(5), cfg.timeout);
        assert_eq!(1, cfg.retries);
        assert_eq!(2, cfg.attempts());
        assert_eq!(1, cfg.ndots);
        assert_eq!(512, cfg.udp_payload());
    }

    #[test]
    fn test_from_resolv_conf_options() {
        let conf = ResolvConf {
            nameservers: vec!["10.0.0.1:53".parse().unwrap()],
            search: vec![Name::from_str("example.com.").unwrap()],
            options: ResolvConfOptions {
                timeout: Some(Duration::from_secs(2)),
                attempts: Some(4),
                ndots: Some(3),
                rotate: Some(true),
                edns0: Some(true),
                use_vc: Some(true),
            },
        };

        let cfg = ResolverConfig::from(conf);
        assert_eq!(vec!["10.0.0.1:53".parse::<std::net::SocketAddr>().unwrap()], cfg.nameservers);
        assert_eq!(vec![Name::from_str("example.com.").unwrap()], cfg.search);
        assert_eq!(Duration::from_secs(2), cfg.timeout);
        assert_eq!(3, cfg.retries);
        assert_eq!(3, cfg.ndots);
        assert!(cfg.rotate);
        assert!(cfg.use_tcp);
        assert_eq!(1232, cfg.udp_payload());
    }

    #[test]
    fn test_from_resolv_conf_zero_attempts() {
        let conf = ResolvConf {
            options: ResolvConfOptions {
                attempts: Some(0),
                ..Default::default()
            },
            ..Default::default()
        };

        assert_eq!(0, ResolverConfig::from(conf).retries);
    }

    #[test]
    fn test_validate_no_nameservers() {
        let cfg = ResolverConfig {
            nameservers: Vec::new(),
            ..Default::default()
        };

        assert_eq!(ErrorKind::Configuration, cfg.validate().unwrap_err().kind());
    }

    #[test]
    fn test_validate_backoff() {
        let cfg = ResolverConfig {
            backoff_min: Duration::from_secs(10),
            backoff_max: Duration::from_secs(1),
            ..Default::default()
        };

        assert_eq!(ErrorKind::Configuration, cfg.validate().unwrap_err().kind());
    }

    #[tokio::test]
    async fn test_from_text() {
        let cfg = ResolverConfig::from_text("nameserver 192.0.2.53\noptions attempts:3 timeout:1\n")
            .await
            .unwrap();

        assert_eq!(vec!["192.0.2.53:53".parse::<std::net::SocketAddr>().unwrap()], cfg.nameservers);
        assert_eq!(2, cfg.retries);
        assert_eq!(Duration::from_secs(1), cfg.timeout);
    }
}
