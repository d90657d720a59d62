#![no_main]

use libfuzzer_sys::fuzz_target;
use pickup_client::dispatch;
use pickup_client::session::GameSession;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Decoding must classify every input without panicking.
    let _ = dispatch::decode_frame(text);

    // Applying whatever decodes must leave the session usable.
    let mut session = GameSession::new("fuzz", 15);
    dispatch::on_frame(&mut session, text, chrono::Utc::now());
    let _ = session.snapshot();
});
