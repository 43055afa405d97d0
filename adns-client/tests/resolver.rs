#![allow(clippy::uninlined_format_args)]


use adns_client::dns::{
    Message, Question, RecordClass, RecordData, RecordDataA, RecordDataCNAME, RecordDataMX, RecordDataPTR,
    RecordDataSOA, RecordType, ResponseCode,
};
use adns_client::{ErrorKind, QueryFlags, Resolver, ResolverConfig};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use stub_common::{StubServer, Via, name, record, reply};

fn config(servers: &[SocketAddr], retries: u32) -> ResolverConfig {
    ResolverConfig {
        nameservers: servers.to_vec(),
        timeout: Duration::from_millis(200),
        retries,
        ..Default::default()
    }
}

fn answer_a(req: &Message) -> Message {
    let q = &req.questions()[0];
    let owner = q.name().to_string();
    reply(req, ResponseCode::NoError).add_answer(record(
        &owner,
        300,
        RecordData::A(RecordDataA::new(Ipv4Addr::new(192, 0, 2, 10))),
    ))
}

fn nxdomain(req: &Message) -> Message {
    let soa = RecordDataSOA::new(
        name("ns.example.com."),
        name("admin.example.com."),
        1,
        3600,
        600,
        86400,
        300,
    );

    reply(req, ResponseCode::NameError).add_authority(record("example.com.", 3600, RecordData::SOA(soa)))
}

#[tokio::test]
async fn test_mx_answer_then_cached() {
    let server = StubServer::start(|req, _| {
        let mx = RecordDataMX::new(10, name("mail.example.com."));
        Some(reply(req, ResponseCode::NoError).add_answer(record("example.com.", 300, RecordData::MX(mx))))
    })
    .await;

    let resolver = Resolver::new(config(&[server.addr], 1)).unwrap();
    let answer = resolver.resolve("example.com", RecordType::MX).await.unwrap();

    assert!(!answer.from_cache());
    assert_eq!(ResponseCode::NoError, answer.status());
    assert_eq!(1, answer.records().len());
    assert_eq!(300, answer.records()[0].ttl());
    match answer.records()[0].rdata() {
        RecordData::MX(mx) => {
            assert_eq!(10, mx.preference());
            assert_eq!(&name("mail.example.com."), mx.exchange());
        }
        other => panic!("unexpected record data {:?}", other),
    }

    let cached = resolver.resolve("example.com", RecordType::MX).await.unwrap();
    assert!(cached.from_cache());
    assert_eq!(answer.records(), cached.records());
    assert_eq!(1, server.num_requests());
}

#[tokio::test]
async fn test_nxdomain_not_retried() {
    let server = StubServer::start(|req, _| Some(nxdomain(req))).await;
    let resolver = Resolver::new(config(&[server.addr], 3)).unwrap();

    let err = resolver.resolve("nonexistent.invalid", RecordType::A).await.unwrap_err();
    assert_eq!(ErrorKind::NXDomain, err.kind());
    assert_eq!(1, server.num_requests());

    // Negatively cached from the SOA in the authority section.
    let err = resolver.resolve("nonexistent.invalid", RecordType::A).await.unwrap_err();
    assert_eq!(ErrorKind::NXDomain, err.kind());
    assert_eq!(1, server.num_requests());
}

#[tokio::test]
async fn test_cancel_in_flight() {
    let server = StubServer::silent().await;
    let resolver = Resolver::new(config(&[server.addr], 2)).unwrap();

    let handle = resolver.submit("example.com", RecordType::A).unwrap();
    assert!(resolver.check(handle).unwrap().is_none());

    resolver.cancel(handle).unwrap();
    assert_eq!(ErrorKind::Canceled, resolver.check(handle).unwrap_err().kind());

    // Long enough for every retry to have gone out if the query was still running.
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert!(resolver.completed_queries(Duration::from_millis(10)).await.is_empty());
    assert_eq!(1, server.num_requests());
}

#[tokio::test]
async fn test_cancel_in_flight_tcp() {
    let server = StubServer::silent().await;
    // Long enough that the exchange can only end early by being aborted.
    let cfg = ResolverConfig {
        timeout: Duration::from_secs(10),
        ..config(&[server.addr], 2)
    };
    let resolver = Resolver::new(cfg).unwrap();

    let handle = resolver
        .submit_with("example.com", RecordType::A, RecordClass::INET, QueryFlags::default().use_tcp())
        .unwrap();
    assert!(resolver.check(handle).unwrap().is_none());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while server.num_requests() == 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(1, server.num_requests());
    assert_eq!(0, server.num_abandoned());

    resolver.cancel(handle).unwrap();
    assert_eq!(ErrorKind::Canceled, resolver.check(handle).unwrap_err().kind());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while server.num_abandoned() == 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(1, server.num_abandoned());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(resolver.completed_queries(Duration::from_millis(10)).await.is_empty());
    let vias: Vec<Via> = server.requests().into_iter().map(|(v, _)| v).collect();
    assert_eq!(vec![Via::Tcp], vias);
    assert_eq!(0, resolver.num_outstanding());
}

#[tokio::test]
async fn test_timeout_after_retries() {
    let server = StubServer::silent().await;
    let resolver = Resolver::new(config(&[server.addr], 2)).unwrap();

    let err = resolver.resolve("example.com", RecordType::A).await.unwrap_err();
    assert_eq!(ErrorKind::Timeout, err.kind());

    let requests = server.requests();
    assert_eq!(3, requests.len());
    // Every attempt reuses the transaction id of the query.
    let ids: HashSet<_> = requests.iter().map(|(_, m)| m.id()).collect();
    assert_eq!(1, ids.len());
}

#[tokio::test]
async fn test_truncated_retried_over_tcp() {
    let server = StubServer::start(|req, via| match via {
        Via::Udp => {
            let msg = reply(req, ResponseCode::NoError);
            let flags = msg.flags().set_truncated();
            Some(Message::new(msg.id(), flags).add_question(req.questions()[0].clone()))
        }
        Via::Tcp => Some(answer_a(req)),
    })
    .await;

    let resolver = Resolver::new(config(&[server.addr], 0)).unwrap();
    let answer = resolver.resolve("www.example.com", RecordType::A).await.unwrap();
    assert_eq!(1, answer.records().len());

    let vias: Vec<Via> = server.requests().into_iter().map(|(v, _)| v).collect();
    assert_eq!(vec![Via::Udp, Via::Tcp], vias);
}

#[tokio::test]
async fn test_use_tcp_flag() {
    let server = StubServer::start(|req, _| Some(answer_a(req))).await;
    let resolver = Resolver::new(config(&[server.addr], 0)).unwrap();

    let handle = resolver
        .submit_with(
            "www.example.com",
            RecordType::A,
            RecordClass::INET,
            QueryFlags::default().use_tcp(),
        )
        .unwrap();
    resolver.wait(handle).await.unwrap();

    let vias: Vec<Via> = server.requests().into_iter().map(|(v, _)| v).collect();
    assert_eq!(vec![Via::Tcp], vias);
}

#[tokio::test]
async fn test_servfail_fails_over() {
    let first = StubServer::start(|req, _| Some(reply(req, ResponseCode::ServerFailure))).await;
    let second = StubServer::start(|req, _| Some(answer_a(req))).await;

    let resolver = Resolver::new(config(&[first.addr, second.addr], 1)).unwrap();
    let answer = resolver.resolve("www.example.com", RecordType::A).await.unwrap();

    assert_eq!(1, answer.records().len());
    assert_eq!(1, first.num_requests());
    assert_eq!(1, second.num_requests());
}

#[tokio::test]
async fn test_servfail_exhausted() {
    let server = StubServer::start(|req, _| Some(reply(req, ResponseCode::ServerFailure))).await;
    let resolver = Resolver::new(config(&[server.addr], 1)).unwrap();

    let err = resolver.resolve("www.example.com", RecordType::A).await.unwrap_err();
    assert_eq!(ErrorKind::ServFail, err.kind());
    assert_eq!(2, server.num_requests());
}

#[tokio::test]
async fn test_refused_exhausted() {
    let server = StubServer::start(|req, _| Some(reply(req, ResponseCode::Refused))).await;
    let resolver = Resolver::new(config(&[server.addr], 0)).unwrap();

    let err = resolver.resolve("www.example.com", RecordType::A).await.unwrap_err();
    assert_eq!(ErrorKind::Refused, err.kind());
}

#[tokio::test]
async fn test_not_implemented_is_final() {
    let server = StubServer::start(|req, _| Some(reply(req, ResponseCode::NotImplemented))).await;
    let resolver = Resolver::new(config(&[server.addr], 2)).unwrap();

    let err = resolver.resolve("www.example.com", RecordType::A).await.unwrap_err();
    assert_eq!(ErrorKind::Remote, err.kind());
    assert_eq!(1, server.num_requests());
}

#[tokio::test]
async fn test_search_list() {
    let server = StubServer::start(|req, _| {
        if req.questions()[0].name() == &name("www.example.com.") {
            Some(answer_a(req))
        } else {
            Some(nxdomain(req))
        }
    })
    .await;

    let cfg = ResolverConfig {
        search: vec![name("corp.example."), name("example.com.")],
        ..config(&[server.addr], 0)
    };

    let resolver = Resolver::new(cfg).unwrap();
    let handle = resolver
        .submit_with("www", RecordType::A, RecordClass::INET, QueryFlags::default().search())
        .unwrap();
    let answer = resolver.wait(handle).await.unwrap();

    assert_eq!(&name("www.example.com."), answer.owner());
    let asked: Vec<String> = server
        .requests()
        .iter()
        .map(|(_, m)| m.questions()[0].name().to_string())
        .collect();
    assert_eq!(vec!["www.corp.example.", "www.example.com."], asked);
}

#[tokio::test]
async fn test_cname_chain() {
    let server = StubServer::start(|req, _| {
        Some(
            reply(req, ResponseCode::NoError)
                .add_answer(record(
                    "www.example.com.",
                    60,
                    RecordData::CNAME(RecordDataCNAME::new(name("edge.example.net."))),
                ))
                .add_answer(record(
                    "edge.example.net.",
                    300,
                    RecordData::A(RecordDataA::new(Ipv4Addr::new(192, 0, 2, 20))),
                )),
        )
    })
    .await;

    let resolver = Resolver::new(config(&[server.addr], 0)).unwrap();
    let answer = resolver.resolve("www.example.com", RecordType::A).await.unwrap();

    assert_eq!(Some(&name("edge.example.net.")), answer.cname());
    assert_eq!(1, answer.records().len());
}

#[tokio::test]
async fn test_reverse_lookup() {
    let server = StubServer::start(|req, _| {
        let owner = req.questions()[0].name().to_string();
        if owner != "10.2.0.192.in-addr.arpa." {
            return Some(nxdomain(req));
        }

        let ptr = RecordDataPTR::new(name("host.example.com."));
        Some(reply(req, ResponseCode::NoError).add_answer(record(&owner, 300, RecordData::PTR(ptr))))
    })
    .await;

    let resolver = Resolver::new(config(&[server.addr], 0)).unwrap();
    let handle = resolver.submit_reverse(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 10))).unwrap();
    let answer = resolver.wait(handle).await.unwrap();

    match answer.records()[0].rdata() {
        RecordData::PTR(ptr) => assert_eq!(&name("host.example.com."), ptr.name()),
        other => panic!("unexpected record data {:?}", other),
    }
}

#[tokio::test]
async fn test_reverse_any_block_list() {
    let server = StubServer::start(|req, _| {
        let q = &req.questions()[0];
        if q.name() != &name("2.0.0.127.zen.example.") || q.qtype() != RecordType::A {
            return Some(nxdomain(req));
        }

        Some(answer_a(req))
    })
    .await;

    let resolver = Resolver::new(config(&[server.addr], 0)).unwrap();
    let handle = resolver
        .submit_reverse_any(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2)), "zen.example", RecordType::A)
        .unwrap();
    let answer = resolver.wait(handle).await.unwrap();

    assert_eq!(&name("2.0.0.127.zen.example."), answer.owner());
    assert_eq!(1, answer.records().len());

    let err = resolver
        .submit_reverse_any(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2)), "bad..zone", RecordType::A)
        .unwrap_err();
    assert_eq!(ErrorKind::InvalidName, err.kind());
}

#[tokio::test]
async fn test_malformed_response() {
    let server = StubServer::start_raw(|req, _| {
        // Valid header claiming one answer that isn't there.
        let mut bytes = reply(req, ResponseCode::NoError).encode().unwrap();
        bytes[7] = 1;
        Some(bytes)
    })
    .await;

    let resolver = Resolver::new(config(&[server.addr], 1)).unwrap();
    let err = resolver.resolve("www.example.com", RecordType::A).await.unwrap_err();

    assert_eq!(ErrorKind::MalformedMessage, err.kind());
    assert_eq!(2, server.num_requests());
}

#[tokio::test]
async fn test_mismatched_question_ignored() {
    let server = StubServer::start(|req, _| {
        let q = Question::new(name("other.example.com."), RecordType::A);
        Some(Message::new(req.id(), reply(req, ResponseCode::NoError).flags()).add_question(q))
    })
    .await;

    let resolver = Resolver::new(config(&[server.addr], 0)).unwrap();
    let err = resolver.resolve("www.example.com", RecordType::A).await.unwrap_err();

    assert_eq!(ErrorKind::Timeout, err.kind());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_waiters() {
    let server = StubServer::start(|req, _| Some(answer_a(req))).await;
    let resolver = Resolver::new(config(&[server.addr], 1)).unwrap();

    let mut tasks = Vec::new();
    for i in 0..32 {
        let resolver = resolver.clone();
        tasks.push(tokio::spawn(async move {
            let host = format!("host{}.example.com", i);
            let answer = resolver.resolve(&host, RecordType::A).await.unwrap();
            assert_eq!(&name(&format!("{}.", host)), answer.owner());
        }));
    }

    for t in tasks {
        t.await.unwrap();
    }

    // Retries reuse the id of their query so only distinct queries count.
    let requests = server.requests();
    assert!(requests.len() >= 32);
    let ids: HashSet<_> = requests.iter().map(|(_, m)| m.id()).collect();
    assert_eq!(32, ids.len());
    assert_eq!(0, resolver.num_outstanding());
}

#[tokio::test]
async fn test_completed_queries() {
    let server = StubServer::start(|req, _| {
        if req.questions()[0].name() == &name("missing.example.com.") {
            Some(nxdomain(req))
        } else {
            Some(answer_a(req))
        }
    })
    .await;

    let resolver = Resolver::new(config(&[server.addr], 0)).unwrap();
    let h1 = resolver.submit("one.example.com", RecordType::A).unwrap();
    let h2 = resolver.submit("missing.example.com", RecordType::A).unwrap();
    let h3 = resolver.submit("three.example.com", RecordType::A).unwrap();

    let completed = resolver.completed_queries(Duration::from_secs(5)).await;
    let handles: Vec<_> = completed.iter().map(|(h, _)| *h).collect();
    assert_eq!(vec![h1, h2, h3], handles);
    assert!(completed[0].1.is_ok());
    assert_eq!(ErrorKind::NXDomain, completed[1].1.as_ref().unwrap_err().kind());
    assert!(completed[2].1.is_ok());
}

#[tokio::test]
async fn test_from_text_config() {
    let server = StubServer::start(|req, _| Some(answer_a(req))).await;
    let text = format!(
        "nameserver {}\noptions timeout:1 attempts:1\n",
        server.addr.ip()
    );

    let mut cfg = ResolverConfig::from_text(text).await.unwrap();
    // resolv.conf can't express a port so point the parsed nameserver at the stub.
    cfg.nameservers = vec![server.addr];
    assert_eq!(0, cfg.retries);

    let resolver = Resolver::new(cfg).unwrap();
    assert!(resolver.resolve("www.example.com", RecordType::A).await.is_ok());
}
