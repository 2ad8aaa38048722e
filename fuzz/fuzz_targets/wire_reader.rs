#![no_main]

use libfuzzer_sys::fuzz_target;
use messagebus_client::core::wire::WireReader;

fuzz_target!(|data: &[u8]| {
    let Some((&selector, rest)) = data.split_first() else {
        return;
    };
    let mut reader = WireReader::with_max_field_length(rest, 4096);

    // Read a selector-driven mix of primitives until the buffer runs out.
    for step in 0..64u8 {
        let result = match selector.wrapping_add(step) % 5 {
            0 => reader.read_string().map(drop),
            1 => reader.read_byte_array().map(drop),
            2 => reader.read_int_set().map(drop),
            3 => reader.read_uuid().map(drop),
            _ => reader.read_int().map(drop),
        };
        if result.is_err() {
            break;
        }
        assert!(reader.position() <= rest.len());
    }
});
