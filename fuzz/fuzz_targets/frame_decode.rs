#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use messagebus_client::core::wire::WireWriter;
use messagebus_client::MessageCodec;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // Keep allocations bounded; the decoder must fault, not panic or hang.
    let mut codec = MessageCodec::with_max_field_length(64 * 1024);
    let mut buf = BytesMut::from(data);

    while let Ok(Some(message)) = codec.decode_eof(&mut buf) {
        // Whatever decodes must encode back to a frame that decodes the same.
        let mut encoded = BytesMut::new();
        message
            .encode(&mut WireWriter::new(&mut encoded))
            .expect("decoded message re-encodes");
        let again = codec
            .decode(&mut encoded)
            .expect("re-encoded frame decodes")
            .expect("re-encoded frame is complete");
        assert_eq!(again, message);
    }
});
