//! Trial execution and telemetry validation.
//!
//! One trial = one command stream (init dispatch, then stress dispatch),
//! submitted atomically, awaited through the bridge, then validated by
//! reading the telemetry buffer back and decoding it. Trials are strictly
//! serialized; a failing trial never stops the batch.

use std::sync::mpsc;

use crate::error::GpuError;
use crate::gpu::buffers::ResourceSet;
use crate::gpu::device::GpuSession;
use crate::gpu::hazard::{self, protocol};
use crate::gpu::shaders::{KernelPipeline, PipelineSet, INIT_WORKGROUPS};
use crate::gpu::sync;
use wgpu::Buffer;

/// Aggregate outcome of a trial batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub passed: u32,
    pub total: u32,
}

impl BatchReport {
    pub fn unanimous(&self) -> bool {
        self.passed == self.total
    }

    /// The final console line: `<passed>/<total>` plus the annotation.
    pub fn summary(&self) -> String {
        if self.unanimous() {
            format!("{}/{} ALL TESTS PASSED", self.passed, self.total)
        } else {
            format!("{}/{} TEST FAILED", self.passed, self.total)
        }
    }
}

/// Runs the init+stress kernel pair for a batch of trials.
pub struct TrialRunner<'a> {
    session: &'a GpuSession,
    resources: &'a ResourceSet,
    pipelines: &'a PipelineSet,
    verbose: bool,
}

impl<'a> TrialRunner<'a> {
    pub fn new(
        session: &'a GpuSession,
        resources: &'a ResourceSet,
        pipelines: &'a PipelineSet,
        verbose: bool,
    ) -> Self {
        Self {
            session,
            resources,
            pipelines,
            verbose,
        }
    }

    /// Runs every requested trial and reports the aggregate pass count.
    /// There is no short-circuit on failure: the batch always accounts for
    /// all `trials`.
    pub fn run_batch(&self, trials: u32) -> Result<BatchReport, GpuError> {
        let mut passed = 0;
        for trial in 0..trials {
            if self.run_trial(trial)? {
                passed += 1;
            }
        }
        Ok(BatchReport {
            passed,
            total: trials,
        })
    }

    /// One trial: encode, submit, await completion, validate.
    fn run_trial(&self, trial: u32) -> Result<bool, GpuError> {
        let mut encoder =
            self.session
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("trial encoder"),
                });

        // Init resets the shared status/bump state at a fixed workgroup
        // count; the stress dispatch scales with the test size.
        self.encode_pass(&mut encoder, self.pipelines.init(), INIT_WORKGROUPS);
        self.encode_pass(&mut encoder, self.pipelines.stress(), self.resources.size());

        self.session.queue.submit(Some(encoder.finish()));
        sync::wait_queue(&self.session.device, &self.session.queue)?;

        let pass = self.validate(trial)?;
        if self.verbose {
            self.dump_scan(trial)?;
        }
        Ok(pass)
    }

    fn encode_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        kernel: &KernelPipeline,
        workgroups: u32,
    ) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(kernel.label()),
            timestamp_writes: None,
        });
        pass.set_pipeline(kernel.pipeline());
        pass.set_bind_group(0, self.pipelines.bind_group(), &[]);
        pass.dispatch_workgroups(workgroups, 1, 1);
    }

    /// Reads the trial's telemetry back and decodes it.
    fn validate(&self, trial: u32) -> Result<bool, GpuError> {
        let size = self.resources.size();
        if size == 0 {
            return Ok(true);
        }

        let mut words = vec![0u32; protocol::telemetry_len(size)];
        self.read_words(self.resources.err(), &mut words)?;

        match hazard::scan_telemetry(&words, size) {
            Ok(()) => Ok(true),
            Err(found) => {
                log::error!("trial {trial}: {found}");
                Ok(false)
            }
        }
    }

    /// Copies `out.len()` words from `src` into the staging buffer and maps
    /// it for host read, each step gated through the bridge.
    ///
    /// A failed map is logged and leaves `out` untouched (best-effort
    /// diagnostic, not retried); only a dropped bridge callback is fatal.
    fn read_words(&self, src: &Buffer, out: &mut [u32]) -> Result<(), GpuError> {
        let bytes = std::mem::size_of_val(out) as u64;

        let mut encoder =
            self.session
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("readback encoder"),
                });
        encoder.copy_buffer_to_buffer(src, 0, self.resources.readback(), 0, bytes);
        self.session.queue.submit(Some(encoder.finish()));
        sync::wait_queue(&self.session.device, &self.session.queue)?;

        let slice = self.resources.readback().slice(..bytes);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            tx.send(result).ok();
        });

        match sync::wait_signal(&self.session.device, rx, "buffer map")? {
            Ok(()) => {
                let data = slice.get_mapped_range();
                out.copy_from_slice(bytemuck::cast_slice(&data[..]));
                drop(data);
                self.resources.readback().unmap();
            }
            Err(e) => {
                log::error!("{}", GpuError::BufferMapping(e.to_string()));
            }
        }
        Ok(())
    }

    /// Diagnostic dump of the scan state after a trial: rejoins each
    /// tile's low/high 16-bit halves, strips the flag bits, and logs the
    /// per-tile multiple of the contribution, ten tiles per line.
    fn dump_scan(&self, trial: u32) -> Result<(), GpuError> {
        let size = self.resources.size();
        if size == 0 {
            return Ok(());
        }

        let mut words = vec![0u32; (size * 2) as usize];
        self.read_words(self.resources.scan(), &mut words)?;

        let mut line = String::new();
        for tile in 0..size as usize {
            let rejoined = (words[tile * 2] & protocol::VALUE_MASK) | (words[tile * 2 + 1] << 16);
            line.push_str(&format!("{}, ", rejoined / protocol::TILE_CONTRIBUTION));
            if (tile + 1) % 10 == 0 {
                log::info!("trial {trial} scan: {line}");
                line.clear();
            }
        }
        if !line.is_empty() {
            log::info!("trial {trial} scan: {line}");
        }
        Ok(())
    }
}
