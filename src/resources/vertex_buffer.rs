//! Multi-stream vertex buffers (spec §4.3).

use super::UsageHint;
use crate::error::{GsError, GsResult};
use crate::pool::TransientBufferPool;
use smallvec::SmallVec;

/// One bound stream of a (possibly multi-stream) vertex buffer.
pub enum StreamStorage {
    /// Uploaded once at creation time; never touched again.
    Static(metal::Buffer),
    /// Re-acquired from the transient pool on every draw that uses it
    /// (spec §4.2) after the host calls `update`.
    Dynamic {
        size: usize,
        pending: Option<Vec<u8>>,
    },
}

pub struct VertexStream {
    pub storage: StreamStorage,
    pub stride: usize,
}

/// A vertex buffer object: one or more interleaved or separate streams,
/// bound together at draw time (spec §3 I4: "a vertex buffer may expose
/// more than one stream, each with its own stride").
pub struct VertexBuffer {
    pub streams: SmallVec<[VertexStream; 4]>,
    pub vertex_count: usize,
    pub usage: UsageHint,
}

impl VertexBuffer {
    pub fn new_static(
        device: &metal::Device,
        streams: &[(&[u8], usize)],
        vertex_count: usize,
    ) -> GsResult<Self> {
        let mut built = SmallVec::new();
        for (data, stride) in streams {
            if data.is_empty() {
                return Err(GsError::ContractViolation(
                    "static vertex stream has no data".to_string(),
                ));
            }
            let buffer = device.new_buffer_with_data(
                data.as_ptr() as *const _,
                data.len() as u64,
                metal::MTLResourceOptions::StorageModeShared,
            );
            built.push(VertexStream {
                storage: StreamStorage::Static(buffer),
                stride: *stride,
            });
        }
        Ok(VertexBuffer {
            streams: built,
            vertex_count,
            usage: UsageHint::Static,
        })
    }

    pub fn new_dynamic(strides: &[usize], vertex_count: usize) -> Self {
        let streams = strides
            .iter()
            .map(|&stride| VertexStream {
                storage: StreamStorage::Dynamic {
                    size: stride * vertex_count,
                    pending: None,
                },
                stride,
            })
            .collect();
        VertexBuffer {
            streams,
            vertex_count,
            usage: UsageHint::Dynamic,
        }
    }

    /// Stages new data for stream `index`; actually written into a pool
    /// buffer the next time [`Self::resolve_stream`] is called (spec §4.2:
    /// dynamic writes are deferred to draw time so the buffer is drawn from
    /// the current frame's partition).
    pub fn update(&mut self, index: usize, data: &[u8]) -> GsResult<()> {
        let stream = self
            .streams
            .get_mut(index)
            .ok_or_else(|| GsError::ContractViolation(format!("no vertex stream {index}")))?;
        match &mut stream.storage {
            StreamStorage::Static(_) => Err(GsError::ContractViolation(
                "cannot update a static vertex buffer".to_string(),
            )),
            StreamStorage::Dynamic { pending, size } => {
                *size = data.len();
                *pending = Some(data.to_vec());
                Ok(())
            }
        }
    }

    /// Resolves stream `index` to a concrete Metal buffer for this draw,
    /// acquiring fresh transient storage and copying pending data in for
    /// dynamic streams.
    pub fn resolve_stream(&mut self, index: usize, pool: &TransientBufferPool) -> GsResult<metal::Buffer> {
        let stream = self
            .streams
            .get_mut(index)
            .ok_or_else(|| GsError::ContractViolation(format!("no vertex stream {index}")))?;
        match &mut stream.storage {
            StreamStorage::Static(buf) => Ok(buf.clone()),
            StreamStorage::Dynamic { size, pending } => {
                let buffer = pool.get_buffer_for_size(*size);
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
