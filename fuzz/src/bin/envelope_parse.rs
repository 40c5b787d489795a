#[macro_use]
extern crate afl;
use zealot_relay::{Envelope, IdentityKey};

fn main() {
    fuzz!(|data: &[u8]| {
        let _ = serde_json::from_slice::<Envelope>(data);
        let _ = IdentityKey::from_bytes(data);
    });
}
