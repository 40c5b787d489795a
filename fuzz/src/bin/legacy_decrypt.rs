#[macro_use]
extern crate afl;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use zealot_relay::LegacyCipher;

fn get_cipher() -> LegacyCipher {
    LegacyCipher::new(&STANDARD.encode([7u8; 52])).expect("Setup failed")
}

fn main() {
    let cipher = get_cipher();

    fuzz!(|data: &[u8]| {
        let _ = cipher.decrypt(data);
    });
}
