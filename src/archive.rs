use crate::store::write_atomically;
use crate::{DEFAULT_DEVICE_ID, Error};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{Span, debug, warn};

/// Directory under the data root holding the message archive.
pub const ARCHIVE_NAMESPACE: &str = "messages";

/// Category whose thread summary carries only the last message.
pub const CHAT_TAG: &str = "chat";

pub const UNDECRYPTABLE_CONTENT: &str = "🔒 You cannot read this message.";
pub const UNDECRYPTABLE_STATUS: &str = "UNDECRYPTABLE_MESSAGE";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Message,
    /// Placeholder for an envelope that could not be decrypted.
    Warning,
}

/// A stored message. Never modified after it is archived.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub content: String,
    pub username: String,
    pub device: u32,
    /// Relay timestamp in milliseconds.
    pub server_timestamp: u64,
    /// Local time the message was archived, in seconds.
    pub saved_timestamp: u64,
    #[serde(default)]
    pub tag: String,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl Message {
    pub fn new(username: &str, content: String, server_timestamp: u64, tag: &str) -> Self {
        Self {
            content,
            username: username.to_string(),
            device: DEFAULT_DEVICE_ID,
            server_timestamp,
            saved_timestamp: unix_seconds(),
            tag: tag.to_string(),
            kind: MessageKind::Message,
            status: None,
        }
    }

    /// Placeholder kept in the thread in place of an unreadable envelope.
    pub fn undecryptable(username: &str, server_timestamp: u64, tag: &str) -> Self {
        Self {
            kind: MessageKind::Warning,
            status: Some(UNDECRYPTABLE_STATUS.to_string()),
            ..Self::new(username, UNDECRYPTABLE_CONTENT.to_string(), server_timestamp, tag)
        }
    }

    pub fn is_undecryptable(&self) -> bool {
        self.kind == MessageKind::Warning
            && self.status.as_deref() == Some(UNDECRYPTABLE_STATUS)
    }
}

pub(crate) fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Per-contact summary returned by [`MessageArchive::threads`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub username: String,
    /// Always zero; kept for clients that still read it.
    pub unread: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
}

/// Append-only message log partitioned by contact and tag.
///
/// Each partition is a JSON array at `<data_dir>/messages/<contact>/<tag>.json`,
/// with contact and tag base64url encoded so any string is a safe file name.
pub struct MessageArchive {
    root: PathBuf,
    lock: Mutex<()>,
    span: Span,
}

impl MessageArchive {
    pub fn open(data_dir: &Path, span: Span) -> Self {
        Self {
            root: data_dir.join(ARCHIVE_NAMESPACE),
            lock: Mutex::new(()),
            span,
        }
    }

    pub fn append(&self, contact: &str, tag: &str, message: Message) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let path = self.partition_path(contact, tag);
        let mut messages = self.read_partition(&path);
        messages.push(message);

        let written = serde_json::to_vec(&messages)
            .map_err(Error::from)
            .and_then(|bytes| {
                write_atomically(&path, &bytes).map_err(|err| Error::Native(err.to_string()))
            });
        if let Err(err) = written {
            warn!(parent: &self.span, contact, tag, error = %err, "Failed to archive message");
        }
    }

    /// All messages of one partition in the order they were appended.
    pub fn messages(&self, contact: &str, tag: &str) -> Vec<Message> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.read_partition(&self.partition_path(contact, tag))
    }

    pub fn delete_contact(&self, contact: &str) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.remove(&self.root.join(encode_name(contact)), true);
    }

    pub fn delete_contact_tag(&self, contact: &str, tag: &str) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.remove(&self.partition_path(contact, tag), false);
    }

    pub fn delete_all(&self) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.remove(&self.root, true);
    }

    /// One summary per contact holding messages under `tag`, sorted by contact.
    ///
    /// For [`CHAT_TAG`] a summary carries the last message, otherwise the
    /// whole partition.
    pub fn threads(&self, tag: &str) -> Vec<Thread> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                warn!(parent: &self.span, error = %err, "Failed to list archive");
                return Vec::new();
            }
        };

        let mut threads: Vec<Thread> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let contact = decode_name(&entry.file_name().to_string_lossy())?;
                let mut messages = self.read_partition(&self.partition_path(&contact, tag));
                if messages.is_empty() {
                    return None;
                }

                let (last_message, messages) = if tag == CHAT_TAG {
                    (messages.pop(), None)
                } else {
                    (None, Some(messages))
                };
                Some(Thread {
                    username: contact,
                    unread: 0,
                    last_message,
                    messages,
                })
            })
            .collect();
        threads.sort_by(|a, b| a.username.cmp(&b.username));

        threads
    }

    fn partition_path(&self, contact: &str, tag: &str) -> PathBuf {
        self.root
            .join(encode_name(contact))
            .join(format!("{}.json", encode_name(tag)))
    }

    fn read_partition(&self, path: &Path) -> Vec<Message> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                warn!(parent: &self.span, path = %path.display(), error = %err, "Failed to read archive partition");
                return Vec::new();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(messages) => messages,
            Err(err) => {
                warn!(parent: &self.span, path = %path.display(), error = %err, "Archive partition is corrupt, treating it as empty");
                Vec::new()
            }
        }
    }

    fn remove(&self, path: &Path, directory: bool) {
        let removed = if directory {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        match removed {
            Ok(()) => debug!(parent: &self.span, path = %path.display(), "Archive entries removed"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(parent: &self.span, path = %path.display(), error = %err, "Failed to remove archive entries"),
        }
    }
}

fn encode_name(name: &str) -> String {
    URL_SAFE_NO_PAD.encode(name.as_bytes())
}

fn decode_name(encoded: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(encoded).ok()?;
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(dir: &Path) -> MessageArchive {
        MessageArchive::open(dir, Span::none())
    }

    #[test]
    fn test_partitions_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let archive = open(dir.path());

        archive.append("bob", "chat", Message::new("bob", "hi".to_string(), 1000, "chat"));
        archive.append("bob", "chat", Message::new("alice", "hey".to_string(), 2000, "chat"));
        archive.append("bob", "tx-note", Message::new("bob", "paid".to_string(), 3000, "tx-note"));
        archive.append("carol/../x", "chat", Message::undecryptable("carol/../x", 4000, "chat"));

        let chat = archive.messages("bob", "chat");
        assert_eq!(chat.len(), 2);
        assert_eq!(chat[0].content, "hi");
        assert_eq!(chat[1].username, "alice");
        assert_eq!(archive.messages("bob", "tx-note").len(), 1);
        assert!(archive.messages("carol/../x", "chat")[0].is_undecryptable());
        assert!(archive.messages("dave", "chat").is_empty());
    }

    #[test]
    fn test_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let archive = open(dir.path());
        archive.append("bob", "chat", Message::new("bob", "1".to_string(), 1, "chat"));
        archive.append("bob", "other", Message::new("bob", "2".to_string(), 2, "other"));
        archive.append("carol", "chat", Message::new("carol", "3".to_string(), 3, "chat"));

        archive.delete_contact_tag("bob", "chat");
        assert!(archive.messages("bob", "chat").is_empty());
        assert_eq!(archive.messages("bob", "other").len(), 1);

        archive.delete_contact("bob");
        assert!(archive.messages("bob", "other").is_empty());
        assert_eq!(archive.messages("carol", "chat").len(), 1);

        archive.delete_all();
        assert!(archive.messages("carol", "chat").is_empty());
        assert!(!dir.path().join(ARCHIVE_NAMESPACE).exists());
    }

    #[test]
    fn test_threads_for_chat_and_other_tags() {
        let dir = tempfile::tempdir().unwrap();
        let archive = open(dir.path());
        archive.append("carol", "chat", Message::new("carol", "c1".to_string(), 1, "chat"));
        archive.append("bob", "chat", Message::new("bob", "b1".to_string(), 1, "chat"));
        archive.append("bob", "chat", Message::new("bob", "b2".to_string(), 2, "chat"));
        archive.append("bob", "invite", Message::new("bob", "i1".to_string(), 3, "invite"));

        let chat = archive.threads(CHAT_TAG);
        assert_eq!(chat.len(), 2);
        assert_eq!(chat[0].username, "bob");
        assert_eq!(chat[0].unread, 0);
        assert_eq!(chat[0].last_message.as_ref().unwrap().content, "b2");
        assert!(chat[0].messages.is_none());

        let invites = archive.threads("invite");
        assert_eq!(invites.len(), 1);
        assert!(invites[0].last_message.is_none());
        assert_eq!(invites[0].messages.as_ref().unwrap().len(), 1);

        let json = serde_json::to_value(&chat[0]).unwrap();
        assert_eq!(json["lastMessage"]["content"], "b2");
        assert_eq!(json["unread"], 0);
    }

    #[test]
    fn test_message_json_layout() {
        let placeholder = Message::undecryptable("bob", 42, "chat");
        let json = serde_json::to_value(&placeholder).unwrap();

        assert_eq!(json["type"], "warning");
        assert_eq!(json["status"], UNDECRYPTABLE_STATUS);
        assert_eq!(json["serverTimestamp"], 42);
        assert_eq!(json["device"], 1);

        let ordinary = serde_json::to_value(Message::new("bob", "x".to_string(), 1, "chat")).unwrap();
        assert_eq!(ordinary["type"], "message");
        assert!(ordinary.get("status").is_none());
    }

    #[test]
    fn test_corrupt_partition_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let archive = open(dir.path());
        archive.append("bob", "chat", Message::new("bob", "1".to_string(), 1, "chat"));
        fs::write(archive.partition_path("bob", "chat"), b"not json").unwrap();

        assert!(archive.messages("bob", "chat").is_empty());
    }
}
