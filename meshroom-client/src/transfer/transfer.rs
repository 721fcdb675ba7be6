use crate::error::TransferError;
use meshroom_core::TransferId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Receive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Offered,
    Requested,
    Active,
    Cancelled,
    Completed,
    /// Truncated or corrupted; the partial data is gone.
    Failed,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Cancelled | TransferStatus::Completed | TransferStatus::Failed
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            TransferStatus::Offered => "offered",
            TransferStatus::Requested => "requested",
            TransferStatus::Active => "active",
            TransferStatus::Cancelled => "cancelled",
            TransferStatus::Completed => "completed",
            TransferStatus::Failed => "failed",
        }
    }

    fn allows(&self, next: TransferStatus) -> bool {
        use TransferStatus::*;
        match (self, next) {
            (Offered, Requested) => true,
            (Requested, Active) => true,
            // Empty files complete without a single chunk.
            (Requested, Completed) => true,
            (Active, Completed) => true,
            (from, Cancelled | Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// One file moving in one direction over one link.
#[derive(Debug)]
pub struct Transfer {
    pub transfer_id: TransferId,
    pub direction: Direction,
    pub name: String,
    total_bytes: u64,
    transferred_bytes: u64,
    status: TransferStatus,
    chunk_size: usize,
    next_seq: u32,
    /// Reassembly buffer, receive side only, allocated on request.
    buffer: Option<Vec<u8>>,
}

impl Transfer {
    pub fn new(
        transfer_id: TransferId,
        direction: Direction,
        name: impl Into<String>,
        total_bytes: u64,
        chunk_size: usize,
    ) -> Self {
        Self {
            transfer_id,
            direction,
            name: name.into(),
            total_bytes,
            transferred_bytes: 0,
            status: TransferStatus::Offered,
            chunk_size,
            next_seq: 0,
            buffer: None,
        }
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// floor(100 * transferred / total); an empty transfer counts as done.
    pub fn percent(&self) -> u8 {
        if self.total_bytes == 0 {
            return 100;
        }
        (self.transferred_bytes.saturating_mul(100) / self.total_bytes).min(100) as u8
    }

    pub fn transition(&mut self, next: TransferStatus) -> Result<(), TransferError> {
        if !self.status.allows(next) {
            return Err(TransferError::InvalidTransition {
                id: self.transfer_id,
                from: self.status.name(),
                to: next.name(),
            });
        }

        self.status = next;
        if next.is_terminal() && next != TransferStatus::Completed {
            self.buffer = None;
        }
        Ok(())
    }

    /// Counts bytes handed to the channel on the send side.
    pub fn record_sent(&mut self, bytes: u64) {
        self.transferred_bytes = self.transferred_bytes.max(bytes).min(self.total_bytes);
    }

    pub(crate) fn allocate_buffer(&mut self) {
        self.buffer = Some(Vec::with_capacity(self.total_bytes as usize));
    }

    /// Appends the next chunk of the reassembly.
    pub(crate) fn append_chunk(&mut self, seq: u32, data: &[u8]) -> Result<(), TransferError> {
        if seq != self.next_seq {
            return Err(TransferError::OutOfSequence {
                id: self.transfer_id,
                expected: self.next_seq,
                got: seq,
            });
        }

        let received = self.transferred_bytes + data.len() as u64;
        if received > self.total_bytes {
            return Err(TransferError::Truncated {
                id: self.transfer_id,
                received,
                expected: self.total_bytes,
            });
        }

        let buffer = self.buffer.get_or_insert_with(Vec::new);
        buffer.extend_from_slice(data);
        self.transferred_bytes = received;
        self.next_seq += 1;
        Ok(())
    }

    /// Hands out the reassembled bytes once everything arrived.
    pub(crate) fn finalize(&mut self) -> Result<Vec<u8>, TransferError> {
        if self.transferred_bytes != self.total_bytes {
            return Err(TransferError::Truncated {
                id: self.transfer_id,
                received: self.transferred_bytes,
                expected: self.total_bytes,
            });
        }

        self.transition(TransferStatus::Completed)?;
        Ok(self.buffer.take().unwrap_or_default())
    }
}
