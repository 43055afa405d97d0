#![no_main]

use adns_client::ResolverConfig;
use libfuzzer_sys::{Corpus, fuzz_target};
use std::io::Cursor;

fuzz_target!(|data: &[u8]| -> Corpus {
    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
    let res = runtime.block_on(adns_client::dns::config(Cursor::new(data.to_vec())));

    match res {
        Ok(conf) => {
            let cfg = ResolverConfig::from(conf);
            assert!(!cfg.nameservers.is_empty());
            Corpus::Keep
        }
        Err(_) => Corpus::Reject,
    }
});
