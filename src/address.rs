use std::fmt;

/// The only device index this account talks to.
pub const DEFAULT_DEVICE_ID: u32 = 1;

/// A remote party's device: username plus device index.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtocolAddress {
    name: String,
    device_id: u32,
}

impl ProtocolAddress {
    pub fn new(name: impl Into<String>, device_id: u32) -> Self {
        Self {
            name: name.into(),
            device_id,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    /// Key used for the address in the session and identity tables.
    pub(crate) fn storage_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ProtocolAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.name, self.device_id)
    }
}

/// A contact as the boundary addresses it.
///
/// `user_id` and `connection_access_token` are forwarded to the relay when
/// both are present; the relay uses them to authorize key fetches and sends
/// between connected users.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Contact {
    pub username: String,
    pub user_id: Option<String>,
    pub connection_access_token: Option<String>,
}

impl Contact {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    pub fn with_connection(
        mut self,
        user_id: impl Into<String>,
        connection_access_token: impl Into<String>,
    ) -> Self {
        self.user_id = Some(user_id.into());
        self.connection_access_token = Some(connection_access_token.into());
        self
    }

    pub fn address(&self) -> ProtocolAddress {
        ProtocolAddress::new(self.username.clone(), DEFAULT_DEVICE_ID)
    }

    /// Returns the connection credentials when both are present and non-empty.
    pub(crate) fn connection(&self) -> Option<(&str, &str)> {
        match (
            self.user_id.as_deref(),
            self.connection_access_token.as_deref(),
        ) {
            (Some(user_id), Some(token)) if !user_id.is_empty() && !token.is_empty() => {
                Some((user_id, token))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_display() {
        let address = ProtocolAddress::new("bob", DEFAULT_DEVICE_ID);
        assert_eq!(address.to_string(), "bob.1");
        assert_eq!(address.storage_key(), "bob.1");
    }

    #[test]
    fn test_contact_connection_requires_both_fields() {
        assert_eq!(Contact::new("bob").connection(), None);
        assert_eq!(
            Contact::new("bob").with_connection("42", "").connection(),
            None
        );
        assert_eq!(
            Contact::new("bob").with_connection("42", "tok").connection(),
            Some(("42", "tok"))
        );
        assert_eq!(Contact::new("bob").address().device_id(), DEFAULT_DEVICE_ID);
    }
}
