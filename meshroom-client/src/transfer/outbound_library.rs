use crate::error::TransferError;
use bytes::Bytes;
use dashmap::DashMap;
use meshroom_core::{BulkFrame, TransferId};
use std::sync::Arc;
use tracing::info;

/// A file this client has offered to the room.
#[derive(Debug, Clone)]
pub struct OutboundFile {
    pub transfer_id: TransferId,
    pub name: String,
    pub data: Bytes,
}

impl OutboundFile {
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn offer_frame(&self) -> BulkFrame {
        BulkFrame::Offer {
            transfer_id: self.transfer_id,
            name: self.name.clone(),
            size: self.size(),
        }
    }
}

/// Files offered by this client, shared by every link and keyed by transfer id.
#[derive(Debug, Clone)]
pub struct OutboundLibrary {
    files: Arc<DashMap<TransferId, OutboundFile>>,
    max_file_size: u64,
}

impl OutboundLibrary {
    pub fn new(max_file_size: u64) -> Self {
        Self {
            files: Arc::new(DashMap::new()),
            max_file_size,
        }
    }

    /// Registers a file for offering. Oversized input is refused before
    /// anything is stored.
    pub fn register(
        &self,
        name: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Result<OutboundFile, TransferError> {
        let data = data.into();
        let size = data.len() as u64;
        if size > self.max_file_size {
            return Err(TransferError::Oversized {
                size,
                limit: self.max_file_size,
            });
        }

        let file = OutboundFile {
            transfer_id: TransferId::new(),
            name: name.into(),
            data,
        };
        info!(
            transfer_id = %file.transfer_id,
            name = %file.name,
            size,
            "File registered for offer"
        );
        self.files.insert(file.transfer_id, file.clone());
        Ok(file)
    }

    pub fn get(&self, transfer_id: &TransferId) -> Option<OutboundFile> {
        self.files.get(transfer_id).map(|f| f.clone())
    }

    pub fn remove(&self, transfer_id: &TransferId) -> Option<OutboundFile> {
        self.files.remove(transfer_id).map(|(_, f)| f)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
