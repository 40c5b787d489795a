/// Opaque ratchet state for one remote address, owned by the session cipher.
///
/// A fresh record is a placeholder that was never advanced by a completed
/// handshake. It counts as "no session" everywhere.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionRecord {
    state: Vec<u8>,
    fresh: bool,
}

impl SessionRecord {
    /// An established session carrying the cipher's serialized state.
    pub fn new(state: Vec<u8>) -> Self {
        Self {
            state,
            fresh: false,
        }
    }

    /// A placeholder record with no usable state.
    pub fn fresh() -> Self {
        Self {
            state: Vec::new(),
            fresh: true,
        }
    }

    pub(crate) fn from_parts(state: Vec<u8>, fresh: bool) -> Self {
        Self { state, fresh }
    }

    pub fn state(&self) -> &[u8] {
        &self.state
    }

    pub fn is_fresh(&self) -> bool {
        self.fresh
    }
}

impl Default for SessionRecord {
    fn default() -> Self {
        Self::fresh()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_record() {
        let fresh = SessionRecord::fresh();
        assert!(fresh.is_fresh());
        assert!(fresh.state().is_empty());

        let established = SessionRecord::new(vec![1, 2, 3]);
        assert!(!established.is_fresh());
        assert_eq!(established.state(), &[1, 2, 3]);
    }

    #[test]
    fn test_default_record_is_fresh() {
        assert!(SessionRecord::default().is_fresh());
        assert_eq!(SessionRecord::default(), SessionRecord::fresh());
    }
}
