//! Indexed geometry uploaded to host-visible buffers.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::memory::GpuBuffer;
use crate::vertex::Vertex;
use ash::vk;
use glam::Vec3;
use gpu_allocator::MemoryLocation;

/// Colored unit quad centered on the origin.
pub fn quad() -> (Vec<Vertex>, Vec<u32>) {
    let vertices = vec![
        Vertex::new(Vec3::new(-0.5, -0.5, 0.0), Vec3::new(1.0, 0.0, 0.0)),
        Vertex::new(Vec3::new(0.5, -0.5, 0.0), Vec3::new(0.0, 1.0, 0.0)),
        Vertex::new(Vec3::new(0.5, 0.5, 0.0), Vec3::new(0.0, 0.0, 1.0)),
        Vertex::new(Vec3::new(-0.5, 0.5, 0.0), Vec3::new(1.0, 1.0, 1.0)),
    ];
    let indices = vec![0, 1, 2, 2, 3, 0];
    (vertices, indices)
}

/// Check that every index refers to an existing vertex.
pub fn validate_indices(vertex_count: usize, indices: &[u32]) -> Result<()> {
    if vertex_count == 0 || indices.is_empty() {
        return Err(GpuError::InvalidState("Mesh has no geometry".to_string()));
    }
    if let Some(&bad) = indices.iter().find(|&&i| i as usize >= vertex_count) {
        return Err(GpuError::InvalidState(format!(
            "Index {bad} out of range for {vertex_count} vertices"
        )));
    }
    Ok(())
}

/// Vertex and index buffers for one draw.
pub struct Mesh {
    vertex_buffer: GpuBuffer,
    index_buffer: GpuBuffer,
    index_count: u32,
}

impl Mesh {
    /// Upload `vertices` and `indices` into new CPU-to-GPU buffers.
    pub fn upload(gpu: &GpuContext, vertices: &[Vertex], indices: &[u32]) -> Result<Self> {
        validate_indices(vertices.len(), indices)?;

        let vertex_bytes: &[u8] = bytemuck::cast_slice(vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(indices);

        let mut allocator = gpu.allocator().lock();

        let mut vertex_buffer = allocator.create_buffer(
            vertex_bytes.len() as u64,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            MemoryLocation::CpuToGpu,
            "mesh_vertices",
        )?;
        if let Err(e) = vertex_buffer.write_bytes(0, vertex_bytes) {
            let _ = allocator.free_buffer(&mut vertex_buffer);
            return Err(e);
        }

        let index_buffer = allocator
            .create_buffer(
                index_bytes.len() as u64,
                vk::BufferUsageFlags::INDEX_BUFFER,
                MemoryLocation::CpuToGpu,
                "mesh_indices",
            )
            .and_then(|mut buffer| match buffer.write_bytes(0, index_bytes) {
                Ok(()) => Ok(buffer),
                Err(e) => {
                    let _ = allocator.free_buffer(&mut buffer);
                    Err(e)
                }
            });
        let index_buffer = match index_buffer {
            Ok(buffer) => buffer,
            Err(e) => {
                let _ = allocator.free_buffer(&mut vertex_buffer);
                return Err(e);
            }
        };

        tracing::debug!(
            "Mesh uploaded: {} vertices, {} indices",
            vertices.len(),
            indices.len()
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        })
    }

    pub const fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Bind the vertex and index buffers.
    ///
    /// # Safety
    /// The command buffer must be recording.
    pub unsafe fn bind(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        unsafe {
            device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer.buffer], &[0]);
            device.cmd_bind_index_buffer(cmd, self.index_buffer.buffer, 0, vk::IndexType::UINT32);
        }
    }

    /// Record an indexed draw of the whole mesh.
    ///
    /// # Safety
    /// The command buffer must be recording with this mesh bound.
    pub unsafe fn draw(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        unsafe { device.cmd_draw_indexed(cmd, self.index_count, 1, 0, 0, 0) };
    }

    /// Release both buffers.
    pub fn destroy(&mut self, gpu: &GpuContext) -> Result<()> {
        let mut allocator = gpu.allocator().lock();
        allocator.free_buffer(&mut self.index_buffer)?;
        allocator.free_buffer(&mut self.vertex_buffer)?;
        Ok(())
    }
}
