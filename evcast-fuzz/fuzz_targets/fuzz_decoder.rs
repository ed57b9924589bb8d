#![no_main]

use libfuzzer_sys::fuzz_target;

use evcast_wire::codec::EventCodec;

fuzz_target!(|data: &[u8]| {
    // Any input must either decode or fail with a format error.
    if let Ok(event) = EventCodec::new().decode(data) {
        // A decoded event must re-encode (limits were enforced on the way in).
        let _ = EventCodec::new().encode(&event);
    }
});
