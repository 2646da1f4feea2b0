#![no_main]

use std::convert::Infallible;

use formpart::bytes::Bytes;
use formpart::MultipartDecoder;
use futures_util::stream::once;
use libfuzzer_sys::fuzz_target;
use tokio::runtime;

fuzz_target!(|data: &[u8]| {
    let data = data.to_vec();
    let stream = once(async move { Result::<Bytes, Infallible>::Ok(Bytes::from(data)) });

    let decoder = match MultipartDecoder::new(stream, "X-BOUNDARY") {
        Ok(decoder) => decoder,
        Err(_) => return,
    };

    let rt = runtime::Builder::new_current_thread().build().expect("runtime");
    rt.block_on(async {
        // Whatever the bytes look like, decode must terminate without
        // panicking.
        let _ = decoder.decode().await;
    })
});
