#![no_main]

use adns_client::dns::Message;
use libfuzzer_sys::{Corpus, fuzz_target};

fuzz_target!(|data: &[u8]| -> Corpus {
    if let Ok(m) = Message::decode(data) {
        let _ = m.edns_payload();
        let bytes = m.encode().unwrap();
        // Anything we decode must decode again once re-encoded
        Message::decode(&bytes).unwrap();
        Corpus::Keep
    } else {
        Corpus::Reject
    }
});
