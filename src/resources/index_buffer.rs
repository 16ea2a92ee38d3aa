//! Index buffers (spec §4.3).

use super::UsageHint;
use crate::error::{GsError, GsResult};
use crate::pool::TransientBufferPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    U16,
    U32,
}

impl IndexFormat {
    pub fn metal_type(self) -> metal::MTLIndexType {
        match self {
            IndexFormat::U16 => metal::MTLIndexType::UInt16,
            IndexFormat::U32 => metal::MTLIndexType::UInt32,
        }
    }

    pub fn stride(self) -> usize {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }
}

enum Storage {
    Static(metal::Buffer),
    Dynamic { pending: Option<Vec<u8>> },
}

pub struct IndexBuffer {
    storage: Storage,
    pub format: IndexFormat,
    pub index_count: usize,
    pub usage: UsageHint,
}

impl IndexBuffer {
    pub fn new_static(
        device: &metal::Device,
        data: &[u8],
        format: IndexFormat,
        index_count: usize,
    ) -> GsResult<Self> {
        if data.is_empty() {
            return Err(GsError::ContractViolation(
                "static index buffer has no data".to_string(),
            ));
        }
        let buffer = device.new_buffer_with_data(
            data.as_ptr() as *const _,
            data.len() as u64,
            metal::MTLResourceOptions::StorageModeShared,
        );
        Ok(IndexBuffer {
            storage: Storage::Static(buffer),
            format,
            index_count,
            usage: UsageHint::Static,
        })
    }

    pub fn new_dynamic(format: IndexFormat, index_count: usize) -> Self {
        IndexBuffer {
            storage: Storage::Dynamic { pending: None },
            format,
            index_count,
            usage: UsageHint::Dynamic,
        }
    }

    pub fn update(&mut self, data: &[u8]) -> GsResult<()> {
        match &mut self.storage {
            Storage::Static(_) => Err(GsError::ContractViolation(
                "cannot update a static index buffer".to_string(),
            )),
            Storage::Dynamic { pending } => {
                self.index_count = data.len() / self.format.stride();
                *pending = Some(data.to_vec());
                Ok(())
            }
        }
    }

    pub fn resolve(&mut self, pool: &TransientBufferPool) -> GsResult<metal::Buffer> {
        match &mut self.storage {
            Storage::Static(buf) => Ok(buf.clone()),
            Storage::Dynamic { pending } => {
                let size = self.index_count * self.format.stride();
                let buffer = pool.get_buffer_for_size(size);
                if let Some(data) = pending.take() {
                    unsafe {
                        std::ptr::copy_nonoverlapping(
                            data.as_ptr(),
                            buffer.contents() as *mut u8,
                            data.len(),
                        );
                    }
                }
                Ok(buffer)
            }
        }
    }
}
