//! The machine inbox.
//!
//! Onchain messages queue in `pending` until an explicit delivery merges
//! them into `delivered`; offchain messages merge directly. The inbox hash
//! commits to `delivered` only, so it can be compared independently of
//! messages that have not yet been committed.

use crate::error::Result;
use crate::message::{chain_messages, Message, Origin};
use crate::value::Digest32;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inbox {
    delivered: Vec<Message>,
    pending: Vec<Message>,
    /// Count of delivered messages already consumed by the program.
    read: u64,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes and queues one onchain message. The queue is untouched if
    /// decoding or shape validation fails.
    pub fn send_onchain(&mut self, payload: &[u8]) -> Result<()> {
        let message = Message::decode(payload, Origin::Onchain)?;
        self.pending.push(message);
        Ok(())
    }

    /// Moves all pending messages into the delivered segment.
    pub fn deliver_onchain(&mut self) {
        self.delivered.append(&mut self.pending);
    }

    /// Decodes a batch of offchain payloads and merges them directly into
    /// the delivered segment. All-or-nothing: one bad payload rejects the
    /// whole batch without mutating the inbox.
    pub fn send_offchain<B: AsRef<[u8]>>(&mut self, payloads: &[B]) -> Result<()> {
        let messages = payloads
            .iter()
            .map(|p| Message::decode(p.as_ref(), Origin::Offchain))
            .collect::<Result<Vec<_>>>()?;
        self.delivered.extend(messages);
        Ok(())
    }

    pub fn pending_count(&self) -> u64 {
        self.pending.len() as u64
    }

    pub fn delivered_count(&self) -> u64 {
        self.delivered.len() as u64
    }

    /// The next delivered message the program has not yet consumed.
    pub fn next_unread(&self) -> Option<&Message> {
        self.delivered.get(self.read as usize)
    }

    pub fn advance_read(&mut self) {
        debug_assert!(self.read < self.delivered.len() as u64);
        self.read += 1;
    }

    pub fn read_cursor(&self) -> u64 {
        self.read
    }

    /// Chained digest over delivered messages only.
    pub fn hash(&self) -> Digest32 {
        chain_messages(&self.delivered)
    }

    /// Chained digest over the pending queue, used by the machine hash.
    pub fn pending_hash(&self) -> Digest32 {
        chain_messages(&self.pending)
    }

    pub(crate) fn delivered(&self) -> &[Message] {
        &self.delivered
    }

    pub(crate) fn pending(&self) -> &[Message] {
        &self.pending
    }

    pub(crate) fn from_parts(delivered: Vec<Message>, pending: Vec<Message>, read: u64) -> Self {
        debug_assert!(read <= delivered.len() as u64);
        Inbox {
            delivered,
            pending,
            read,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn payload(sender: u64, block: u64, body: u64) -> Vec<u8> {
        Value::tuple(vec![
            Value::from_u64(sender),
            Value::from_u64(block),
            Value::from_u64(body),
        ])
        .unwrap()
        .encode()
    }

    #[test]
    fn test_pending_count_tracks_sends_and_delivery() {
        let mut inbox = Inbox::new();
        assert_eq!(inbox.pending_count(), 0);

        inbox.send_onchain(&payload(1, 10, 100)).unwrap();
        assert_eq!(inbox.pending_count(), 1);
        inbox.send_onchain(&payload(2, 10, 200)).unwrap();
        assert_eq!(inbox.pending_count(), 2);
        assert_eq!(inbox.delivered_count(), 0);

        inbox.deliver_onchain();
        assert_eq!(inbox.pending_count(), 0);
        assert_eq!(inbox.delivered_count(), 2);
    }

    #[test]
    fn test_hash_covers_delivered_only() {
        let mut inbox = Inbox::new();
        let empty = inbox.hash();

        inbox.send_onchain(&payload(1, 10, 100)).unwrap();
        assert_eq!(inbox.hash(), empty, "pending must not affect the inbox hash");

        inbox.deliver_onchain();
        assert_ne!(inbox.hash(), empty);
    }

    #[test]
    fn test_malformed_onchain_payload_rejected_without_mutation() {
        let mut inbox = Inbox::new();
        assert!(inbox.send_onchain(&[0xff, 0x01]).is_err());
        assert_eq!(inbox.pending_count(), 0);
    }

    #[test]
    fn test_offchain_batch_is_all_or_nothing() {
        let mut inbox = Inbox::new();
        let batch = vec![payload(1, 10, 100), vec![0xff], payload(2, 10, 200)];
        assert!(inbox.send_offchain(&batch).is_err());
        assert_eq!(inbox.delivered_count(), 0);
        assert_eq!(inbox.pending_count(), 0);

        let good = vec![payload(1, 10, 100), payload(2, 10, 200)];
        inbox.send_offchain(&good).unwrap();
        assert_eq!(inbox.delivered_count(), 2);
        assert_eq!(inbox.pending_count(), 0);
    }

    #[test]
    fn test_read_cursor() {
        let mut inbox = Inbox::new();
        inbox.send_offchain(&[payload(1, 10, 100)]).unwrap();
        assert!(inbox.next_unread().is_some());
        inbox.advance_read();
        assert!(inbox.next_unread().is_none());
        assert_eq!(inbox.read_cursor(), 1);
    }
}
