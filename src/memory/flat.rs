//! Word-addressed memory model.
//!
//! `FlatMemory` backs both program and data memory in the emulator. Each port
//! must hold its request valid for `latency` consecutive sampled edges before
//! the access is performed and acknowledged; with the default latency of 1 the
//! acknowledge is visible the cycle after the request is first seen.
//!
//! Out-of-range reads return 0 and out-of-range writes are dropped. Both are
//! still acknowledged so the requester never stalls on a bad address.
//!
//! # Usage
//!
//! ```
//! use minigpu_emu::memory::{DataMemory, DataRequest, FlatMemory};
//!
//! let mut mem = FlatMemory::new(128);
//! mem.write_slice(0, &[1, 2, 3]);
//!
//! let rsp = mem.respond(0, &DataRequest::read(2));
//! assert!(rsp.read_ack);
//! assert_eq!(rsp.read_data, 3);
//! ```

use std::collections::HashMap;

use super::{DataMemory, DataRequest, DataResponse, PortId, ProgramMemory, ProgramRequest, ProgramResponse};

/// Flat word-addressed memory with a fixed handshake latency.
#[derive(Debug, Clone)]
pub struct FlatMemory {
    words: Vec<u32>,
    /// Sampled edges before an access is acknowledged (at least 1).
    latency: u32,
    /// Consecutive valid edges seen per port.
    pending: HashMap<PortId, u32>,
    /// Accesses performed (reads, writes).
    reads: u64,
    writes: u64,
}

impl FlatMemory {
    /// Create a zeroed memory of `size` words with latency 1.
    pub fn new(size: usize) -> Self {
        Self::with_latency(size, 1)
    }

    /// Create a zeroed memory with the given handshake latency.
    pub fn with_latency(size: usize, latency: u32) -> Self {
        Self {
            words: vec![0; size],
            latency: latency.max(1),
            pending: HashMap::new(),
            reads: 0,
            writes: 0,
        }
    }

    /// Size in words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Is the memory zero-sized?
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Handshake latency in cycles.
    pub fn latency(&self) -> u32 {
        self.latency
    }

    /// Host read, bypassing the handshake.
    pub fn read_word(&self, addr: u32) -> Option<u32> {
        self.words.get(addr as usize).copied()
    }

    /// Host write, bypassing the handshake. Returns false if out of range.
    pub fn write_word(&mut self, addr: u32, value: u32) -> bool {
        match self.words.get_mut(addr as usize) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Host write of consecutive words starting at `addr`.
    ///
    /// Words past the end are dropped. Returns the number written.
    pub fn write_slice(&mut self, addr: u32, data: &[u32]) -> usize {
        let start = (addr as usize).min(self.words.len());
        let end = (start + data.len()).min(self.words.len());
        self.words[start..end].copy_from_slice(&data[..end - start]);
        end - start
    }

    /// Host view of `len` words starting at `addr` (clamped to the memory).
    pub fn slice(&self, addr: u32, len: usize) -> &[u32] {
        let start = (addr as usize).min(self.words.len());
        let end = (start + len).min(self.words.len());
        &self.words[start..end]
    }

    /// Zero every word and forget in-flight handshakes.
    pub fn clear(&mut self) {
        self.words.fill(0);
        self.pending.clear();
    }

    /// Number of acknowledged reads.
    pub fn read_count(&self) -> u64 {
        self.reads
    }

    /// Number of acknowledged writes.
    pub fn write_count(&self) -> u64 {
        self.writes
    }

    /// Hex dump of `len` words starting at `addr`, eight words per line.
    pub fn hexdump(&self, addr: u32, len: usize) -> String {
        let mut out = String::new();
        for (i, chunk) in self.slice(addr, len).chunks(8).enumerate() {
            out.push_str(&format!("{:04X}:", addr as usize + i * 8));
            for word in chunk {
                out.push_str(&format!(" {:08X}", word));
            }
            out.push('\n');
        }
        out
    }

    /// Track a port's valid line. Returns true when the access should complete.
    fn sample(&mut self, port: PortId, valid: bool) -> bool {
        if !valid {
            self.pending.remove(&port);
            return false;
        }
        let seen = self.pending.entry(port).or_insert(0);
        *seen = seen.saturating_add(1);
        *seen >= self.latency
    }

    fn load(&mut self, addr: u32) -> u32 {
        self.reads += 1;
        self.read_word(addr).unwrap_or_else(|| {
            log::warn!("read from out-of-range address {} (size {})", addr, self.words.len());
            0
        })
    }

    fn store(&mut self, addr: u32, value: u32) {
        self.writes += 1;
        if !self.write_word(addr, value) {
            log::warn!("write to out-of-range address {} (size {}) dropped", addr, self.words.len());
        }
    }
}

impl ProgramMemory for FlatMemory {
    fn respond(&mut self, port: PortId, request: &ProgramRequest) -> ProgramResponse {
        if !self.sample(port, request.valid) {
            return ProgramResponse::default();
        }
        let data = self.load(request.addr);
        log::trace!("prog port {} addr {} -> 0x{:08X}", port, request.addr, data);
        ProgramResponse { ack: true, data }
    }
}

impl DataMemory for FlatMemory {
    fn respond(&mut self, port: PortId, request: &DataRequest) -> DataResponse {
        if !self.sample(port, request.is_active()) {
            return DataResponse::default();
        }

        let mut rsp = DataResponse::default();
        if request.read_valid {
            rsp.read_data = self.load(request.addr);
            rsp.read_ack = true;
        }
        if request.write_valid {
            self.store(request.addr, request.write_data);
            rsp.write_ack = true;
        }
        log::trace!("data port {} {:?} -> {:?}", port, request, rsp);
        rsp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_port_gets_no_ack() {
        let mut mem = FlatMemory::new(16);
        let rsp = DataMemory::respond(&mut mem, 0, &DataRequest::default());
        assert_eq!(rsp, DataResponse::default());
        let rsp = ProgramMemory::respond(&mut mem, 0, &ProgramRequest::default());
        assert!(!rsp.ack);
    }

    #[test]
    fn test_store_then_load() {
        let mut mem = FlatMemory::new(16);

        let rsp = DataMemory::respond(&mut mem, 3, &DataRequest::write(5, 99));
        assert!(rsp.write_ack);
        assert!(!rsp.read_ack);
        assert_eq!(mem.read_word(5), Some(99));

        DataMemory::respond(&mut mem, 3, &DataRequest::default());
        let rsp = DataMemory::respond(&mut mem, 3, &DataRequest::read(5));
        assert!(rsp.read_ack);
        assert_eq!(rsp.read_data, 99);
        assert_eq!(mem.read_count(), 1);
        assert_eq!(mem.write_count(), 1);
    }

    #[test]
    fn test_latency_holds_ack() {
        let mut mem = FlatMemory::with_latency(16, 3);
        mem.write_word(2, 0xABCD);
        let req = ProgramRequest { valid: true, addr: 2 };

        assert!(!ProgramMemory::respond(&mut mem, 0, &req).ack);
        assert!(!ProgramMemory::respond(&mut mem, 0, &req).ack);
        let rsp = ProgramMemory::respond(&mut mem, 0, &req);
        assert!(rsp.ack);
        assert_eq!(rsp.data, 0xABCD);

        // Dropping valid restarts the count.
        ProgramMemory::respond(&mut mem, 0, &ProgramRequest::default());
        assert!(!ProgramMemory::respond(&mut mem, 0, &req).ack);
    }

    #[test]
    fn test_ports_are_independent() {
        let mut mem = FlatMemory::with_latency(16, 2);
        let req = DataRequest::read(1);
        assert!(!DataMemory::respond(&mut mem, 0, &req).read_ack);
        assert!(!DataMemory::respond(&mut mem, 1, &req).read_ack);
        assert!(DataMemory::respond(&mut mem, 0, &req).read_ack);
        assert!(DataMemory::respond(&mut mem, 1, &req).read_ack);
    }

    #[test]
    fn test_out_of_range_is_acked() {
        let mut mem = FlatMemory::new(4);
        let rsp = DataMemory::respond(&mut mem, 0, &DataRequest::read(100));
        assert!(rsp.read_ack);
        assert_eq!(rsp.read_data, 0);

        let rsp = DataMemory::respond(&mut mem, 1, &DataRequest::write(100, 7));
        assert!(rsp.write_ack);
        assert!(mem.slice(0, 4).iter().all(|&w| w == 0));
    }

    #[test]
    fn test_host_slices() {
        let mut mem = FlatMemory::new(8);
        assert_eq!(mem.write_slice(6, &[1, 2, 3]), 2);
        assert_eq!(mem.slice(6, 10), &[1, 2]);
        assert_eq!(mem.slice(20, 4), &[] as &[u32]);
        assert!(mem.hexdump(0, 8).starts_with("0000: 00000000"));

        mem.clear();
        assert_eq!(mem.read_word(6), Some(0));
    }

    #[test]
    fn test_zero_latency_is_clamped() {
        assert_eq!(FlatMemory::with_latency(4, 0).latency(), 1);
    }
}
