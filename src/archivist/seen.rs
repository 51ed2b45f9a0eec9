use crate::archivist::event::MessageKey;
use std::collections::HashSet;

/// Message identities inspected by this process.
///
/// Lives only as long as the process and is never written to disk, so a
/// restart forgets everything. It only spares the normalizer from formatting
/// a message twice; the content check against the chat log is what keeps
/// duplicates out of the file.
#[derive(Debug, Default)]
pub struct SeenSet {
    keys: HashSet<MessageKey>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the key was not seen before and is now claimed.
    pub fn claim(&mut self, key: MessageKey) -> bool {
        self.keys.insert(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_is_once_per_key() {
        let mut seen = SeenSet::new();
        let key = MessageKey {
            chat_id: 10,
            message_id: 1,
        };
        assert!(seen.claim(key));
        assert!(!seen.claim(key));
        assert!(seen.claim(MessageKey {
            chat_id: 11,
            message_id: 1
        }));
        assert_eq!(seen.len(), 2);
    }
}
