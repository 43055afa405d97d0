#![no_main]

use adns_client::ResolveError;
use adns_client::dns::Name;
use libfuzzer_sys::{Corpus, fuzz_target};
use std::io::Cursor;
use std::str::FromStr;

fuzz_target!(|data: &[u8]| -> Corpus {
    // Binary form of a name, possibly with compression pointers
    let mut cur = Cursor::new(data);
    if let Ok(n) = Name::read_network_bytes(&mut cur) {
        let n = n.to_fqdn();
        let _ = n.to_string();
        let mut buf = Vec::new();
        n.write_network_bytes(&mut buf).unwrap();
        return Corpus::Keep;
    }

    // Text form of a name, then qualified with a search domain
    if let Ok(n) = str::from_utf8(data)
        .map_err(|e| ResolveError::invalid_name(format!("utf-8: {}", e)))
        .and_then(Name::from_str)
    {
        let _ = n.clone().append(&Name::root());
        let n = n.to_fqdn();
        let mut buf = Vec::new();
        n.write_network_bytes(&mut buf).unwrap();
        return Corpus::Keep;
    }

    Corpus::Reject
});
