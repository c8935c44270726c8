//! GPU buffer provisioning for the stress harness.
//!
//! Five fixed buffers, sized once from the requested test size and never
//! resized. All of them are written exclusively by GPU dispatches between
//! host submissions; the host reads only the readback staging buffer, and
//! only after an explicit queue-completion wait.

use crate::gpu::hazard::protocol;
use wgpu::{Buffer, BufferUsages, Device, Queue};

const WORD: u64 = std::mem::size_of::<u32>() as u64;

/// The fixed buffer set shared by both kernels.
pub struct ResourceSet {
    /// Uniform parameters: `{size, 0, 0, 0}`.
    params: Buffer,
    /// One atomic counter the stress kernel bumps to acquire tile ids.
    scan_bump: Buffer,
    /// Scan state, two status words per tile (low/high 16-bit split).
    scan: Buffer,
    /// Host-readback staging, reused for telemetry and scan shapes.
    readback: Buffer,
    /// Error telemetry, two word pairs per tile.
    err: Buffer,
    /// The validated test size (tile count).
    size: u32,
}

impl ResourceSet {
    /// Allocates all five buffers for `size` tiles.
    ///
    /// wgpu rejects zero-size buffers, so sizing clamps to one element;
    /// `size == 0` still constructs a bindable set (validation is vacuous
    /// and never reads it back).
    pub fn new(device: &Device, size: u32) -> Self {
        let tiles = u64::from(size.max(1));

        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("params"),
            size: 4 * WORD,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let scan_bump = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("scan bump"),
            size: WORD,
            usage: BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        let scan = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("scan"),
            size: tiles * 2 * WORD,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback"),
            size: tiles * 4 * WORD,
            usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let err = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("err"),
            size: tiles * 4 * WORD,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        Self {
            params,
            scan_bump,
            scan,
            readback,
            err,
            size,
        }
    }

    pub fn params(&self) -> &Buffer {
        &self.params
    }

    pub fn scan_bump(&self) -> &Buffer {
        &self.scan_bump
    }

    pub fn scan(&self) -> &Buffer {
        &self.scan
    }

    pub fn readback(&self) -> &Buffer {
        &self.readback
    }

    pub fn err(&self) -> &Buffer {
        &self.err
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Bytes of telemetry one trial records.
    pub fn telemetry_bytes(&self) -> u64 {
        protocol::telemetry_len(self.size) as u64 * WORD
    }

    /// Bytes of scan state (both status words per tile).
    pub fn scan_bytes(&self) -> u64 {
        u64::from(self.size) * 2 * WORD
    }

    /// Writes the uniform parameter block. Done once, before the batch.
    pub fn write_params(&self, queue: &Queue) {
        let info: [u32; 4] = [self.size, 0, 0, 0];
        queue.write_buffer(&self.params, 0, bytemuck::cast_slice(&info));
    }
}
