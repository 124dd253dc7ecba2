//! Connection and task identifiers.
//!
//! A [`ConnectionId`] is the composite `prefix-SEQUENCE-shard` string handed
//! out by the connection state store at accept time. Internally it is kept
//! as its three parsed fields; only the wire boundary (`Display`/`FromStr`)
//! deals with the string form.

use std::fmt;
use std::str::FromStr;

use nanorand::{Rng, WyRand};

use crate::errors::BrokerError;

const PREFIX_LEN: usize = 8;
const PREFIX_CHARS: &[u8] = b"abcdefghijkmnpqrstuvwxyz9876543210";
const HEX_CHARS: &[u8] = b"abcdef9876543210";

fn random_prefix(chars: &[u8]) -> String {
    let mut rng = WyRand::new();
    (0..PREFIX_LEN)
        .map(|_| chars[rng.generate_range(0..chars.len())] as char)
        .collect()
}

/// Opaque, printable connection identifier: `prefix-SEQUENCE-shard`.
///
/// `prefix` is an 8-char random string, `sequence` a process-lifetime
/// monotonic counter rendered as 16 uppercase hex digits, `shard` the
/// 1-based index of the CSS shard holding this connection's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    pub prefix: [u8; PREFIX_LEN],
    pub sequence: u64,
    pub shard: u32,
}

impl ConnectionId {
    pub fn new(sequence: u64, shard: u32) -> Self {
        let prefix_str = random_prefix(PREFIX_CHARS);
        let mut prefix = [0u8; PREFIX_LEN];
        prefix.copy_from_slice(prefix_str.as_bytes());

        Self {
            prefix,
            sequence,
            shard,
        }
    }

    pub fn prefix_str(&self) -> &str {
        // constructed from PREFIX_CHARS, which is all ASCII
        std::str::from_utf8(&self.prefix).unwrap_or("????????")
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{:016X}-{}",
            self.prefix_str(),
            self.sequence,
            self.shard
        )
    }
}

impl FromStr for ConnectionId {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('-');

        let prefix = parts
            .next()
            .filter(|p| p.len() == PREFIX_LEN)
            .ok_or_else(|| BrokerError::CidParse(s.to_string()))?;

        let sequence = parts
            .next()
            .ok_or_else(|| BrokerError::CidParse(s.to_string()))
            .and_then(|seq| {
                u64::from_str_radix(seq, 16).map_err(|_| BrokerError::CidParse(s.to_string()))
            })?;

        let shard = parts
            .next()
            .ok_or_else(|| BrokerError::CidParse(s.to_string()))
            .and_then(|shard| shard.parse::<u32>().map_err(|_| BrokerError::CidParse(s.to_string())))?;

        if parts.next().is_some() {
            return Err(BrokerError::CidParse(s.to_string()));
        }

        let mut prefix_bytes = [0u8; PREFIX_LEN];
        prefix_bytes.copy_from_slice(prefix.as_bytes());

        Ok(Self {
            prefix: prefix_bytes,
            sequence,
            shard,
        })
    }
}

impl serde::Serialize for ConnectionId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for ConnectionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Generates globally-unique (within a process run) task correlation ids:
/// an 8-char random hex prefix plus a 16-digit hex monotonic counter.
#[derive(Debug, Default)]
pub struct TaskIdGenerator {
    counter: std::sync::atomic::AtomicU64,
}

impl TaskIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_task_id(&self) -> String {
        let index = self
            .counter
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            + 1;

        format!("{}-{:016X}", random_prefix(HEX_CHARS), index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn cid_round_trips() {
        let cid = ConnectionId::new(42, 7);
        let rendered = cid.to_string();
        let parsed: ConnectionId = rendered.parse().unwrap();
        assert_eq!(cid, parsed);
        assert_eq!(parsed.sequence, 42);
        assert_eq!(parsed.shard, 7);
    }

    #[test]
    fn cid_parse_rejects_wrong_dash_count() {
        assert!("onlyoneprefix".parse::<ConnectionId>().is_err());
        assert!("abcdefgh-2A-1-extra".parse::<ConnectionId>().is_err());
    }

    #[test]
    fn cid_parse_rejects_bad_prefix_length() {
        assert!("short-2A-1".parse::<ConnectionId>().is_err());
    }

    #[test]
    fn task_ids_are_monotonic_and_unique() {
        let gen = TaskIdGenerator::new();
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let id = gen.next_task_id();
            assert!(seen.insert(id), "task id collided");
        }
    }
}
