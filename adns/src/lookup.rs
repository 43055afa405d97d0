use crate::dns::ResolverArgs;
use crate::output;
use adns_client::dns::{RecordClass, RecordType};
use adns_client::{Answer, QueryFlags, QueryHandle, ResolveError, Resolver};
use std::net::IpAddr;
use std::process::ExitCode;
use tokio::io::AsyncWriteExt;
use tracing::{Instrument, Level};

/// What a single lookup asks for.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Target {
    Name(String),
    Reverse(IpAddr),
}

impl Target {
    /// Treat `s` as an address to reverse if it parses as one, otherwise as a name.
    pub fn name_or_addr(s: &str) -> Self {
        match s.parse::<IpAddr>() {
            Ok(addr) => Self::Reverse(addr),
            Err(_) => Self::Name(s.to_owned()),
        }
    }

    pub fn submit(
        &self,
        resolver: &Resolver,
        rtype: RecordType,
        rclass: RecordClass,
        flags: QueryFlags,
    ) -> Result<QueryHandle, ResolveError> {
        match self {
            Self::Name(n) => resolver.submit_with(n, rtype, rclass, flags),
            Self::Reverse(addr) => resolver.submit_reverse(*addr),
        }
    }

    fn describe(&self, rtype: RecordType) -> String {
        match self {
            Self::Name(n) => format!("{} record of domain {}", rtype, n),
            Self::Reverse(addr) => format!("PTR record of address {}", addr),
        }
    }
}

/// Perform one lookup and write the records found followed by the query status to stdout.
pub async fn run(
    args: &ResolverArgs,
    target: &Target,
    rtype: RecordType,
    rclass: RecordClass,
    flags: QueryFlags,
) -> ExitCode {
    let resolver = match args.new_resolver().instrument(tracing::span!(Level::INFO, "dns.new_resolver")).await {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(message = "unable to create resolver", err = %e);
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(message = "resolving", query = %target.describe(rtype));
    let res = match target.submit(&resolver, rtype, rclass, flags) {
        Ok(handle) => resolver
            .wait(handle)
            .instrument(tracing::span!(Level::INFO, "resolver.wait"))
            .await,
        Err(e) => Err(e),
    };

    let code = match &res {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(message = "unable to perform DNS query", query = %target.describe(rtype), err = %e);
            ExitCode::FAILURE
        }
    };

    if write_result(&res).await.is_err() {
        return ExitCode::FAILURE;
    }

    code
}

async fn write_result(res: &Result<Answer, ResolveError>) -> Result<(), ()> {
    let mut buf = String::new();
    if let Ok(answer) = res {
        output::format_answer(&mut buf, answer);
    }

    buf.push_str(&format!("query status: {}\n", output::status_text(res)));

    let mut out = tokio::io::stdout();
    if let Err(e) = out.write_all(buf.as_bytes()).await {
        tracing::error!(message = "unable to write query result to stdout", err = %e);
        return Err(());
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::Target;
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_name_or_addr_v4() {
        assert_eq!(
            Target::Reverse(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1))),
            Target::name_or_addr("192.0.2.1")
        );
    }

    #[test]
    fn test_name_or_addr_v6() {
        assert_eq!(Target::Reverse(IpAddr::V6(Ipv6Addr::LOCALHOST)), Target::name_or_addr("::1"));
    }

    #[test]
    fn test_name_or_addr_name() {
        assert_eq!(
            Target::Name("1.0.0.127.in-addr.arpa".to_owned()),
            Target::name_or_addr("1.0.0.127.in-addr.arpa")
        );
    }
}
