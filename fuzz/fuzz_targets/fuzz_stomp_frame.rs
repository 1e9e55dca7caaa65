#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // The frame parser only accepts UTF-8 text (WebSocket text frames).
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(buzzer_client::stomp::ParsedFrame::Frame(frame)) =
            buzzer_client::stomp::StompFrame::parse(s)
        {
            // A parsed frame must re-encode without panicking.
            let _ = frame.encode();
        }
    }
});
