#![no_main]

use libfuzzer_sys::fuzz_target;
use listening_room_client::protocol::{Command, RoomSnapshot};

fuzz_target!(|data: &[u8]| {
    // Raw bytes, as the receive loop would see a corrupted frame.
    let _ = serde_json::from_slice::<RoomSnapshot>(data);

    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(snapshot) = serde_json::from_str::<RoomSnapshot>(s) {
            // Anything that decodes must encode again.
            let _ = serde_json::to_string(&snapshot);
            let _ = snapshot.is_playing();
        }
        let _ = serde_json::from_str::<Command>(s);
    }
});
