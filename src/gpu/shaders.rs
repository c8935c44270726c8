//! Kernel pipeline construction.
//!
//! Both kernels bind the same four buffers in the same order, so one
//! bind-group layout and one bind group are built once and shared by both
//! pipelines. Bindings are baked against concrete buffers at build time,
//! which is why the resource set must exist first.

use crate::error::GpuError;
use crate::gpu::buffers::ResourceSet;
use wgpu::{BindGroup, ComputePipeline, Device, ShaderModule};

/// WGSL source for the init kernel (resets bump + status state).
pub const INIT_WGSL: &str = include_str!("../shaders/init.wgsl");

/// WGSL source for the stress kernel (scan with lookback + telemetry).
pub const STRESS_WGSL: &str = include_str!("../shaders/stress.wgsl");

/// Entry point both kernels expose.
pub const ENTRY_POINT: &str = "main";

/// Workgroups every init dispatch uses, independent of test size.
/// Together with the init kernel's workgroup size this covers the maximum
/// test size of 65535 tiles.
pub const INIT_WORKGROUPS: u32 = 256;

/// Prepends literal `pseudo_args` lines before a WGSL body.
///
/// A text-preprocessor hook that is part of the kernel contract; neither
/// kernel uses it in the current configuration.
pub fn compose_source(pseudo_args: &[&str], body: &str) -> String {
    let mut source = String::with_capacity(body.len());
    for line in pseudo_args {
        source.push_str(line);
        source.push('\n');
    }
    source.push_str(body);
    source
}

/// One compiled kernel bound to the shared resource layout.
pub struct KernelPipeline {
    pipeline: ComputePipeline,
    label: &'static str,
}

impl KernelPipeline {
    pub fn pipeline(&self) -> &ComputePipeline {
        &self.pipeline
    }

    pub fn label(&self) -> &'static str {
        self.label
    }
}

/// The init/stress pipeline pair plus their shared bind group.
pub struct PipelineSet {
    init: KernelPipeline,
    stress: KernelPipeline,
    bind_group: BindGroup,
}

impl PipelineSet {
    /// Compiles both kernels and wires them to `resources`.
    ///
    /// Compilation errors are fatal: each module is created inside a
    /// validation error scope and a captured error aborts the build rather
    /// than letting a broken pipeline fail some later dispatch. Warnings
    /// are logged and ignored.
    pub fn new(device: &Device, resources: &ResourceSet) -> Result<Self, GpuError> {
        let init_module = build_module(device, "init", &compose_source(&[], INIT_WGSL))?;
        let stress_module = build_module(device, "stress", &compose_source(&[], STRESS_WGSL))?;

        let storage = |read_only| wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        };

        // 0 params, 1 bump, 2 scan, 3 err; identical for both kernels.
        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("scan bind group layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: storage(false),
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: storage(false),
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 3,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: storage(false),
                        count: None,
                    },
                ],
            });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("scan bind group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: resources.params().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: resources.scan_bump().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: resources.scan().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: resources.err().as_entire_binding(),
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("scan pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let build = |label, module: &ShaderModule| {
            let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module,
                entry_point: Some(ENTRY_POINT),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            });
            KernelPipeline { pipeline, label }
        };

        Ok(Self {
            init: build("init", &init_module),
            stress: build("stress", &stress_module),
            bind_group,
        })
    }

    pub fn init(&self) -> &KernelPipeline {
        &self.init
    }

    pub fn stress(&self) -> &KernelPipeline {
        &self.stress
    }

    pub fn bind_group(&self) -> &BindGroup {
        &self.bind_group
    }
}

/// Creates a shader module with fail-fast compile diagnostics.
fn build_module(device: &Device, label: &'static str, source: &str) -> Result<ShaderModule, GpuError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });

    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        return Err(GpuError::ShaderCompilation {
            label: label.to_string(),
            message: error.to_string(),
        });
    }

    let info = pollster::block_on(module.get_compilation_info());
    for message in &info.messages {
        match message.message_type {
            wgpu::CompilationMessageType::Error => {
                log::error!("{label}: {}", message.message)
            }
            wgpu::CompilationMessageType::Warning => {
                log::warn!("{label}: {}", message.message)
            }
            _ => log::debug!("{label}: {}", message.message),
        }
    }

    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::device::GpuSession;

    fn setup_session() -> Option<GpuSession> {
        GpuSession::negotiate().ok()
    }

    #[test]
    fn test_compose_source_empty_args() {
        assert_eq!(compose_source(&[], "body"), "body");
    }

    #[test]
    fn test_compose_source_prepends_lines() {
        let source = compose_source(&["const A: u32 = 1u;", "const B: u32 = 2u;"], "fn f() {}");
        assert_eq!(source, "const A: u32 = 1u;\nconst B: u32 = 2u;\nfn f() {}");
    }

    #[test]
    fn test_kernel_sources_declare_entry_point() {
        assert!(INIT_WGSL.contains("fn main"));
        assert!(STRESS_WGSL.contains("fn main"));
    }

    #[test]
    fn test_pipeline_set_builds() {
        let Some(session) = setup_session() else {
            println!("No GPU available, skipping pipeline build test");
            return;
        };

        let resources = ResourceSet::new(&session.device, 64);
        let pipelines = PipelineSet::new(&session.device, &resources);
        assert!(pipelines.is_ok());

        let pipelines = pipelines.unwrap();
        assert_eq!(pipelines.init().label(), "init");
        assert_eq!(pipelines.stress().label(), "stress");
    }

    #[test]
    fn test_bad_shader_fails_build() {
        let Some(session) = setup_session() else {
            println!("No GPU available, skipping bad shader test");
            return;
        };

        let result = build_module(&session.device, "broken", "fn main( {{ not wgsl");
        assert!(matches!(
            result,
            Err(GpuError::ShaderCompilation { .. })
        ));
    }
}
