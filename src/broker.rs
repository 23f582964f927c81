//! Remote file access via a broker service, with failover across a list of
//! broker addresses.
//!
//! Grounded in `broker_reader.h`/`broker_writer.h`: a reader/writer holds
//! an ordered address list and a monotonic cursor into it, advancing (not
//! randomizing) on failure, and fails permanently once every address has
//! been tried. The broker RPC protocol itself (thrift/protobuf IDL) is out
//! of scope, so the transport is a trait with an in-process fake for tests.

use crate::error::{Result, StorageError};
use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;

/// How many full passes over the address list to attempt, and the backoff
/// between passes, before giving up on a broker operation entirely.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
}

impl RetryPolicy {
    /// Exponential backoff off `base_backoff_ms`, with up to 50% jitter so a
    /// thundering herd of readers doesn't retry in lockstep.
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.base_backoff_ms.saturating_mul(1u64 << attempt.min(16));
        let jitter = rand::rng().random_range(0..=base / 2 + 1);
        Duration::from_millis(base + jitter)
    }
}

#[derive(Debug, Clone)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

impl std::fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// What a real broker RPC client would implement against one address.
pub trait BrokerTransport: Send + Sync {
    fn open_read(&self, address: &BrokerAddress, path: &str, start_offset: u64) -> Result<()>;
    fn read(&self, address: &BrokerAddress, path: &str, len: usize) -> Result<Vec<u8>>;
    fn open_write(&self, address: &BrokerAddress, path: &str) -> Result<()>;
    fn write(&self, address: &BrokerAddress, path: &str, data: &[u8]) -> Result<()>;
    fn close(&self, address: &BrokerAddress, path: &str);
}

/// Reads one file through a broker, failing over to the next address in
/// `_addresses` (here: `addresses`) on any I/O error.
pub struct BrokerReader<'a> {
    transport: &'a dyn BrokerTransport,
    addresses: Vec<BrokerAddress>,
    properties: HashMap<String, String>,
    path: String,
    cur_offset: u64,
    addr_idx: usize,
    is_open: bool,
}

impl<'a> BrokerReader<'a> {
    pub fn new(
        transport: &'a dyn BrokerTransport,
        addresses: Vec<BrokerAddress>,
        properties: HashMap<String, String>,
        path: String,
        start_offset: u64,
    ) -> Self {
        Self { transport, addresses, properties, path, cur_offset: start_offset, addr_idx: 0, is_open: false }
    }

    pub fn open(&mut self) -> Result<()> {
        while self.addr_idx < self.addresses.len() {
            let addr = &self.addresses[self.addr_idx];
            match self.transport.open_read(addr, &self.path, self.cur_offset) {
                Ok(()) => {
                    self.is_open = true;
                    return Ok(());
                }
                Err(_) => {
                    self.addr_idx += 1;
                }
            }
        }
        Err(StorageError::Broker(format!("no reachable broker address for {}", self.path)))
    }

    /// Retry [`BrokerReader::open`] across the whole address list up to
    /// `policy.max_attempts` times, backing off between passes.
    pub fn open_with_retry(&mut self, policy: &RetryPolicy) -> Result<()> {
        let mut last_err = None;
        for attempt in 0..policy.max_attempts {
            self.addr_idx = 0;
            match self.open() {
                Ok(()) => return Ok(()),
                Err(e) => {
                    last_err = Some(e);
                    if attempt + 1 < policy.max_attempts {
                        std::thread::sleep(policy.backoff(attempt));
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| StorageError::Broker(format!("no reachable broker address for {}", self.path))))
    }

    pub fn read(&mut self, len: usize) -> Result<(Vec<u8>, bool)> {
        if !self.is_open {
            return Err(StorageError::NotInitialized("BrokerReader not opened".into()));
        }
        loop {
            let addr = &self.addresses[self.addr_idx];
            match self.transport.read(addr, &self.path, len) {
                Ok(buf) => {
                    self.cur_offset += buf.len() as u64;
                    let eof = buf.len() < len;
                    return Ok((buf, eof));
                }
                Err(_) => {
                    self.addr_idx += 1;
                    if self.addr_idx >= self.addresses.len() {
                        return Err(StorageError::Broker(format!(
                            "all broker addresses exhausted for {}",
                            self.path
                        )));
                    }
                    self.transport.open_read(&self.addresses[self.addr_idx], &self.path, self.cur_offset)?;
                }
            }
        }
    }

    pub fn close(&mut self) {
        if self.is_open {
            self.transport.close(&self.addresses[self.addr_idx], &self.path);
            self.is_open = false;
        }
    }

    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }
}

impl Drop for BrokerReader<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Writes one file through a broker, same failover discipline as the reader.
pub struct BrokerWriter<'a> {
    transport: &'a dyn BrokerTransport,
    addresses: Vec<BrokerAddress>,
    path: String,
    addr_idx: usize,
    is_open: bool,
}

impl<'a> BrokerWriter<'a> {
    pub fn new(transport: &'a dyn BrokerTransport, addresses: Vec<BrokerAddress>, path: String) -> Self {
        Self { transport, addresses, path, addr_idx: 0, is_open: false }
    }

    pub fn open(&mut self) -> Result<()> {
        while self.addr_idx < self.addresses.len() {
            let addr = &self.addresses[self.addr_idx];
            match self.transport.open_write(addr, &self.path) {
                Ok(()) => {
                    self.is_open = true;
                    return Ok(());
                }
                Err(_) => self.addr_idx += 1,
            }
        }
        Err(StorageError::Broker(format!("no reachable broker address for {}", self.path)))
    }

    /// Retry [`BrokerWriter::open`] across the whole address list up to
    /// `policy.max_attempts` times, backing off between passes.
    pub fn open_with_retry(&mut self, policy: &RetryPolicy) -> Result<()> {
        let mut last_err = None;
        for attempt in 0..policy.max_attempts {
            self.addr_idx = 0;
            match self.open() {
                Ok(()) => return Ok(()),
                Err(e) => {
                    last_err = Some(e);
                    if attempt + 1 < policy.max_attempts {
                        std::thread::sleep(policy.backoff(attempt));
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| StorageError::Broker(format!("no reachable broker address for {}", self.path))))
    }

    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if !self.is_open {
            return Err(StorageError::NotInitialized("BrokerWriter not opened".into()));
        }
        let addr = self.addresses[self.addr_idx].clone();
        self.transport.write(&addr, &self.path, data)
    }

    pub fn close(&mut self) {
        if self.is_open {
            self.transport.close(&self.addresses[self.addr_idx], &self.path);
            self.is_open = false;
        }
    }
}

impl Drop for BrokerWriter<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct FakeBroker {
        fail_hosts: Vec<String>,
        store: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl BrokerTransport for FakeBroker {
        fn open_read(&self, address: &BrokerAddress, _path: &str, _start_offset: u64) -> Result<()> {
            if self.fail_hosts.contains(&address.host) {
                return Err(StorageError::Broker("connection refused".into()));
            }
            Ok(())
        }

        fn read(&self, address: &BrokerAddress, path: &str, len: usize) -> Result<Vec<u8>> {
            if self.fail_hosts.contains(&address.host) {
                return Err(StorageError::Broker("connection refused".into()));
            }
            let store = self.store.lock();
            let data = store.get(path).cloned().unwrap_or_default();
            Ok(data.into_iter().take(len).collect())
        }

        fn open_write(&self, address: &BrokerAddress, _path: &str) -> Result<()> {
            if self.fail_hosts.contains(&address.host) {
                return Err(StorageError::Broker("connection refused".into()));
            }
            Ok(())
        }

        fn write(&self, _address: &BrokerAddress, path: &str, data: &[u8]) -> Result<()> {
            self.store.lock().entry(path.to_string()).or_default().extend_from_slice(data);
            Ok(())
        }

        fn close(&self, _address: &BrokerAddress, _path: &str) {}
    }

    fn addr(host: &str) -> BrokerAddress {
        BrokerAddress { host: host.to_string(), port: 8000 }
    }

    #[test]
    fn failover_advances_past_dead_addresses() {
        let broker = FakeBroker { fail_hosts: vec!["a".into()], store: Mutex::new(HashMap::new()) };
        let mut reader = BrokerReader::new(
            &broker,
            vec![addr("a"), addr("b")],
            HashMap::new(),
            "/x/delta.dat".into(),
            0,
        );
        reader.open().unwrap();
        assert_eq!(reader.addr_idx, 1);
    }

    #[test]
    fn exhausting_all_addresses_fails() {
        let broker = FakeBroker { fail_hosts: vec!["a".into(), "b".into()], store: Mutex::new(HashMap::new()) };
        let mut reader =
            BrokerReader::new(&broker, vec![addr("a"), addr("b")], HashMap::new(), "/x".into(), 0);
        assert!(reader.open().is_err());
    }

    #[test]
    fn open_with_retry_gives_up_after_max_attempts() {
        let broker = FakeBroker { fail_hosts: vec!["a".into()], store: Mutex::new(HashMap::new()) };
        let mut reader =
            BrokerReader::new(&broker, vec![addr("a")], HashMap::new(), "/x".into(), 0);
        let policy = RetryPolicy { max_attempts: 2, base_backoff_ms: 0 };
        assert!(reader.open_with_retry(&policy).is_err());
    }

    #[test]
    fn writer_round_trips_through_fake_store() {
        let broker = FakeBroker { fail_hosts: vec![], store: Mutex::new(HashMap::new()) };
        {
            let mut writer = BrokerWriter::new(&broker, vec![addr("a")], "/out.dat".into());
            writer.open().unwrap();
            writer.write(b"hello").unwrap();
        }
        let mut reader = BrokerReader::new(&broker, vec![addr("a")], HashMap::new(), "/out.dat".into(), 0);
        reader.open().unwrap();
        let (data, _eof) = reader.read(5).unwrap();
        assert_eq!(data, b"hello");
    }
}
