use adns::dns::ResolverArgs;
use adns::lookup::{self, Target};
use adns::{output, sig};
use adns_client::dns::{Flags, Message, MessageId, Name, Question, RecordClass, RecordType};
use adns_client::{QueryFlags, QueryHandle, Resolver};
use clap::{Args, Parser, Subcommand};
use std::collections::HashMap;
use std::net::IpAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::runtime::Handle;
use tracing::{Instrument, Level};

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_RECORD_TYPE: RecordType = RecordType::A;
const DEFAULT_RECORD_CLASS: RecordClass = RecordClass::INET;
const BATCH_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// adns: Make asynchronous DNS queries or read/write binary format DNS messages
#[derive(Debug, Parser)]
#[command(name = "adns", version = clap::crate_version!())]
struct AdnsConfig {
    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case-insensitive).
    #[arg(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    #[command(subcommand)]
    mode: Action,
}

#[derive(Debug, Subcommand)]
enum Action {
    Batch(BatchCommand),
    Query(QueryCommand),
    Read(ReadCommand),
    Reverse(ReverseCommand),
    Write(WriteCommand),
}

/// Read domain names from standard input, one per line, resolve all of them
/// concurrently, and print a line for each as it completes.
#[derive(Debug, Args)]
struct BatchCommand {
    #[command(flatten)]
    resolver: ResolverArgs,

    /// Apply the search list from resolv.conf to relative domain names.
    #[arg(long, default_value_t = false)]
    search: bool,

    /// Type of record to request. Supported: A, AAAA, CNAME, MX, NS, PTR, SOA, SRV, TXT.
    #[arg(long, default_value_t = DEFAULT_RECORD_TYPE)]
    rtype: RecordType,
}

/// Perform a DNS query and display the records found and query status.
#[derive(Debug, Args)]
struct QueryCommand {
    #[command(flatten)]
    resolver: ResolverArgs,

    /// Apply the search list from resolv.conf to relative domain names.
    #[arg(long, default_value_t = false)]
    search: bool,

    /// Send the query over TCP instead of UDP.
    #[arg(long, default_value_t = false)]
    tcp: bool,

    /// Type of record to request. Supported: A, AAAA, CNAME, MX, NS, PTR, SOA, SRV, TXT.
    #[arg(long, default_value_t = DEFAULT_RECORD_TYPE)]
    rtype: RecordType,

    /// Class of record to request. Supported: IN, CH, HS, NONE, ANY.
    #[arg(long, default_value_t = DEFAULT_RECORD_CLASS)]
    rclass: RecordClass,

    /// Domain name to lookup.
    #[arg(required = true)]
    name: String,
}

/// Look up the PTR records of an IP address.
#[derive(Debug, Args)]
struct ReverseCommand {
    #[command(flatten)]
    resolver: ResolverArgs,

    /// IPv4 or IPv6 address to look up.
    #[arg(required = true)]
    address: IpAddr,
}

/// Read a binary format DNS message from standard input and display it as dig-like text output.
#[derive(Debug, Args)]
struct ReadCommand {}

/// Write a binary format DNS query to standard output.
#[derive(Debug, Args)]
struct WriteCommand {
    /// Request a UDP payload size via EDNS.
    #[arg(long)]
    edns_payload: Option<u16>,

    /// Type of record to request. Supported: A, AAAA, CNAME, MX, NS, PTR, SOA, SRV, TXT.
    #[arg(long, default_value_t = DEFAULT_RECORD_TYPE)]
    rtype: RecordType,

    /// Class of record to request. Supported: IN, CH, HS, NONE, ANY.
    #[arg(long, default_value_t = DEFAULT_RECORD_CLASS)]
    rclass: RecordClass,

    /// Domain name to lookup.
    #[arg(required = true)]
    name: Name,
}

#[tokio::main]
async fn main() -> ExitCode {
    let opts = AdnsConfig::parse();

    let console_subscriber =
        adns::tracing::console_subscriber(opts.log_level).expect("failed to setup console logging");
    tracing::subscriber::set_global_default(console_subscriber).expect("failed to initialize console logging");

    match &opts.mode {
        Action::Batch(cmd) => run_batch(cmd).await,
        Action::Query(cmd) => run_query(cmd).await,
        Action::Read(cmd) => run_read(cmd).await,
        Action::Reverse(cmd) => run_reverse(cmd).await,
        Action::Write(cmd) => run_write(cmd).await,
    }
}

async fn run_query(cmd: &QueryCommand) -> ExitCode {
    let flags = QueryFlags {
        search: cmd.search,
        use_tcp: cmd.tcp,
    };

    lookup::run(
        &cmd.resolver,
        &Target::Name(cmd.name.clone()),
        cmd.rtype,
        cmd.rclass,
        flags,
    )
    .await
}

async fn run_reverse(cmd: &ReverseCommand) -> ExitCode {
    lookup::run(
        &cmd.resolver,
        &Target::Reverse(cmd.address),
        RecordType::PTR,
        RecordClass::INET,
        QueryFlags::default(),
    )
    .await
}

async fn run_batch(cmd: &BatchCommand) -> ExitCode {
    let resolver = match new_resolver(&cmd.resolver).await {
        Some(r) => r,
        None => return ExitCode::FAILURE,
    };

    let names = match read_names().await {
        Ok(n) => n,
        Err(e) => {
            tracing::error!(message = "unable to read names from stdin", err = %e);
            return ExitCode::FAILURE;
        }
    };

    let interrupted = Arc::new(AtomicBool::new(false));
    let signal = sig::finish_on_interrupt(&Handle::current(), resolver.clone(), interrupted.clone());

    let flags = QueryFlags {
        search: cmd.search,
        ..Default::default()
    };

    let mut pending: HashMap<QueryHandle, String> = HashMap::with_capacity(names.len());
    let mut failures = 0_usize;
    let mut buf = String::new();

    for name in names {
        match resolver.submit_with(&name, cmd.rtype, RecordClass::INET, flags) {
            Ok(handle) => {
                pending.insert(handle, name);
            }
            Err(e) => {
                failures += 1;
                output::format_result_line(&mut buf, &name, &Err(e));
            }
        }
    }

    tracing::debug!(message = "submitted batch queries", num = pending.len());

    while !pending.is_empty() {
        if write_text(&buf).await != ExitCode::SUCCESS {
            resolver.finish();
            return ExitCode::FAILURE;
        }

        buf.clear();
        for (handle, res) in resolver.completed_queries(BATCH_POLL_INTERVAL).await {
            if let Some(name) = pending.remove(&handle) {
                failures += usize::from(res.is_err());
                output::format_result_line(&mut buf, &name, &res);
            }
        }
    }

    signal.abort();
    let code = write_text(&buf).await;

    if interrupted.load(Ordering::Acquire) || failures > 0 {
        tracing::info!(message = "batch finished with failures", failures = failures);
        ExitCode::FAILURE
    } else {
        code
    }
}

async fn read_names() -> Result<Vec<String>, std::io::Error> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut out = Vec::new();

    while let Some(line) = lines.next_line().await? {
        let name = line.trim();
        if !name.is_empty() && !name.starts_with('#') {
            out.push(name.to_owned());
        }
    }

    Ok(out)
}

async fn run_read(_: &ReadCommand) -> ExitCode {
    let mut buf = Vec::new();
    let mut input = tokio::io::stdin();

    let n = match input.read_to_end(&mut buf).await {
        Ok(n) => n,
        Err(e) => {
            tracing::error!(message = "unable to read message from stdin", err = %e);
            return ExitCode::FAILURE;
        }
    };

    let mut text = String::new();
    if let Err(e) = output::format_wire(&mut text, &buf[..n]) {
        tracing::error!(message = "malformed message", err = %e);
        return ExitCode::FAILURE;
    }

    write_text(&text).await
}

async fn run_write(cmd: &WriteCommand) -> ExitCode {
    let name = cmd.name.clone().to_fqdn();
    let mut msg = Message::new(MessageId::random(), Flags::default().set_query().set_recursion_desired())
        .add_question(Question::new(name, cmd.rtype).set_qclass(cmd.rclass));

    if let Some(payload) = cmd.edns_payload {
        msg = msg.set_edns(payload);
    }

    let mut buf = Vec::new();
    if let Err(e) = msg.write_network_bytes(&mut buf) {
        tracing::error!(message = "unable to encode message to wire format", err = %e);
        return ExitCode::FAILURE;
    }

    let mut out = tokio::io::stdout();
    if let Err(e) = out.write_all(&buf).await {
        tracing::error!(message = "unable to write wire encoded message to stdout", err = %e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn new_resolver(args: &ResolverArgs) -> Option<Resolver> {
    match args.new_resolver().instrument(tracing::span!(Level::INFO, "dns.new_resolver")).await {
        Ok(r) => Some(r),
        Err(e) => {
            tracing::error!(message = "unable to create resolver", err = %e);
            None
        }
    }
}

async fn write_text(text: &str) -> ExitCode {
    if text.is_empty() {
        return ExitCode::SUCCESS;
    }

    let mut out = tokio::io::stdout();
    if let Err(e) = out.write_all(text.as_bytes()).await {
        tracing::error!(message = "unable to write to stdout", err = %e);
        return ExitCode::FAILURE;
    }

    match out.flush().await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(message = "unable to flush stdout", err = %e);
            ExitCode::FAILURE
        }
    }
}
