mod identity_key;
pub use identity_key::*;

mod pre_key;
pub use pre_key::*;

mod signed_pre_key;
pub use signed_pre_key::*;

use crate::Error;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::TryRngCore;
use rand::rngs::OsRng;
use std::collections::HashSet;

/// Length in bytes of the signaling key before base64 encoding.
pub const SIGNALING_KEY_LEN: usize = 52;

/// Upper bound (inclusive) for one-time pre-key ids; the id above it is reserved.
pub const MAX_PRE_KEY_ID: u32 = LAST_RESORT_PRE_KEY_ID - 1;

/// Generates a cryptographically secure random 32-byte seed.
pub(crate) fn generate_random_seed() -> Result<Box<[u8; 32]>, Error> {
    let mut seed = Box::new([0u8; 32]);
    OsRng
        .try_fill_bytes(seed.as_mut_slice())
        .map_err(|_| Error::Random)?;
    Ok(seed)
}

/// Generates a 14-bit registration id in `1..=16380`.
pub fn generate_registration_id() -> Result<u32, Error> {
    let value = OsRng.try_next_u32().map_err(|_| Error::Random)?;
    Ok(value % 16380 + 1)
}

/// Generates a fresh signaling key, base64 encoded.
pub fn generate_signaling_key() -> Result<String, Error> {
    let mut bytes = [0u8; SIGNALING_KEY_LEN];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|_| Error::Random)?;
    Ok(STANDARD.encode(bytes))
}

/// Picks `count` pre-key ids starting at `start`, skipping ids in `taken`.
///
/// Ids wrap within `1..=MAX_PRE_KEY_ID`, so the last-resort id is never
/// handed out. Returns fewer ids only when the whole range is exhausted.
pub fn allocate_pre_key_ids(start: u32, count: usize, taken: &HashSet<u32>) -> Vec<u32> {
    let mut ids = Vec::with_capacity(count);
    let mut id = if start == 0 || start > MAX_PRE_KEY_ID {
        1
    } else {
        start
    };

    for _ in 0..MAX_PRE_KEY_ID {
        if ids.len() == count {
            break;
        }
        if !taken.contains(&id) {
            ids.push(id);
        }
        id = if id == MAX_PRE_KEY_ID { 1 } else { id + 1 };
    }

    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_id_range() {
        for _ in 0..100 {
            let id = generate_registration_id().unwrap();
            assert!((1..=16380).contains(&id));
        }
    }

    #[test]
    fn test_signaling_key_length() {
        let key = generate_signaling_key().unwrap();
        assert_eq!(STANDARD.decode(key).unwrap().len(), SIGNALING_KEY_LEN);
    }

    #[test]
    fn test_allocation_skips_taken_ids() {
        let taken: HashSet<u32> = [2, 3, 5].into_iter().collect();
        let ids = allocate_pre_key_ids(1, 4, &taken);
        assert_eq!(ids, vec![1, 4, 6, 7]);
    }

    #[test]
    fn test_allocation_wraps_before_last_resort() {
        let taken: HashSet<u32> = [1].into_iter().collect();
        let ids = allocate_pre_key_ids(MAX_PRE_KEY_ID - 1, 4, &taken);
        assert_eq!(ids, vec![MAX_PRE_KEY_ID - 1, MAX_PRE_KEY_ID, 2, 3]);
        assert!(!ids.contains(&LAST_RESORT_PRE_KEY_ID));
    }

    #[test]
    fn test_allocation_from_zero_starts_at_one() {
        let ids = allocate_pre_key_ids(0, 3, &HashSet::new());
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
