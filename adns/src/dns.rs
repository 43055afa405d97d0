use adns_client::dns::ResolvConf;
use adns_client::{ResolveError, Resolver, ResolverConfig};
use clap::{Args, ValueHint};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;

/// Command line options shared by every tool for building a `Resolver`.
#[derive(Debug, Clone, Args)]
pub struct ResolverArgs {
    /// Path to resolv.conf file for loading DNS configuration information. If this file
    /// can't be loaded, default values for DNS configuration are used instead.
    #[arg(long, default_value = default_resolv_conf().into_os_string(), value_hint = ValueHint::FilePath)]
    pub resolv_conf: PathBuf,

    /// Nameserver to use for DNS queries, overriding whatever nameservers are configured
    /// in resolv.conf.
    #[arg(long, value_hint = ValueHint::Hostname)]
    pub nameserver: Option<SocketAddr>,

    /// Timeout for each attempt of a DNS query in seconds, overriding whatever timeout is
    /// configured in resolv.conf.
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

impl ResolverArgs {
    pub async fn new_resolver(&self) -> Result<Resolver, ResolveError> {
        new_resolver(&self.resolv_conf, self.nameserver, self.timeout_secs.map(Duration::from_secs)).await
    }
}

pub fn default_resolv_conf() -> PathBuf {
    PathBuf::from("/etc/resolv.conf")
}

/// Load configuration from the provided resolv.conf file and create a new Resolver
/// based on it, with the nameserver and timeout replaced if given. If the resolv.conf
/// file cannot be opened or is malformed, default configuration values are used. See
/// `man 5 resolv.conf` for more information.
pub async fn new_resolver<P>(
    resolv: P,
    nameserver: Option<SocketAddr>,
    timeout: Option<Duration>,
) -> Result<Resolver, ResolveError>
where
    P: AsRef<Path> + fmt::Debug,
{
    let conf = match load_config(&resolv).await {
        Ok(conf) => conf,
        Err(e) => {
            tracing::warn!(message = "unable to load resolv.conf", path = ?resolv, err = %e);
            ResolvConf::default()
        }
    };

    let cfg = with_overrides(ResolverConfig::from(conf), nameserver, timeout);
    tracing::debug!(message = "resolver configuration", config = ?cfg);
    Resolver::new(cfg)
}

fn with_overrides(mut cfg: ResolverConfig, nameserver: Option<SocketAddr>, timeout: Option<Duration>) -> ResolverConfig {
    if let Some(ns) = nameserver {
        cfg.nameservers = vec![ns];
    }

    if let Some(t) = timeout {
        cfg.timeout = t;
    }

    cfg
}

async fn load_config<P>(resolv: P) -> Result<ResolvConf, ResolveError>
where
    P: AsRef<Path> + fmt::Debug,
{
    let handle = File::open(&resolv)
        .await
        .map_err(|e| ResolveError::configuration_cause(format!("unable to open {:?}", resolv), e))?;
    adns_client::dns::config(handle).await
}

#[cfg(test)]
mod test {
    use super::{new_resolver, with_overrides};
    use adns_client::ResolverConfig;
    use std::net::SocketAddr;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn test_with_overrides_none() {
        let cfg = with_overrides(ResolverConfig::default(), None, None);
        assert_eq!(ResolverConfig::default(), cfg);
    }

    #[test]
    fn test_with_overrides() {
        let ns: SocketAddr = "192.0.2.53:5353".parse().unwrap();
        let cfg = with_overrides(ResolverConfig::default(), Some(ns), Some(Duration::from_secs(9)));

        assert_eq!(vec![ns], cfg.nameservers);
        assert_eq!(Duration::from_secs(9), cfg.timeout);
    }

    #[tokio::test]
    async fn test_new_resolver_missing_file() {
        let path = PathBuf::from("/this/path/does/not/exist/resolv.conf");
        let resolver = new_resolver(&path, None, Some(Duration::from_secs(2))).await.unwrap();

        assert_eq!(vec!["127.0.0.1:53".parse::<SocketAddr>().unwrap()], resolver.config().nameservers);
        assert_eq!(Duration::from_secs(2), resolver.config().timeout);
    }
}
