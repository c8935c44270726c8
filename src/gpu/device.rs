//! GPU device negotiation.
//!
//! Negotiates a runtime instance, an adapter, and a logical device with the
//! subgroup feature the stress kernel needs. There is no fallback search:
//! if the preferred adapter cannot provide a device, the run ends.

use crate::error::GpuError;
use wgpu::{
    Adapter, AdapterInfo, Backends, Device, DeviceType, Features, Instance, InstanceDescriptor,
    Queue,
};

/// A negotiated device session. Created once at startup; owns every GPU
/// object transitively and lives until process exit.
pub struct GpuSession {
    /// The logical device all resources hang off.
    pub device: Device,
    /// The single work-submission queue.
    pub queue: Queue,
    /// Identification for the adapter backing the device.
    pub info: AdapterInfo,
}

impl GpuSession {
    /// Negotiates instance → adapter → device + queue.
    ///
    /// Adapter selection prefers the high-performance profile (discrete
    /// over integrated over virtual), backend auto. The device request
    /// requires subgroup operations for the stress kernel's cross-thread
    /// shuffle; an adapter without them is an error, not a downgrade.
    pub fn negotiate() -> Result<Self, GpuError> {
        let instance = Instance::new(&InstanceDescriptor::default());
        let adapter = pick_adapter(instance.enumerate_adapters(Backends::all()))?;
        let info = adapter.get_info();

        if !adapter.features().contains(Features::SUBGROUP) {
            return Err(GpuError::MissingSubgroups(info.name));
        }

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("scanstress"),
            required_features: Features::SUBGROUP,
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
        }))
        .map_err(|e| GpuError::DeviceRequest(e.to_string()))?;

        // Best-effort diagnostics; neither callback is recoverable.
        device.on_uncaptured_error(std::sync::Arc::new(|error| {
            log::error!("uncaptured device error: {error}");
        }));
        device.set_device_lost_callback(|reason, message| {
            log::error!("device lost: reason={reason:?}, message={message}");
        });

        Ok(Self {
            device,
            queue,
            info,
        })
    }

    /// Prints adapter identification to stdout.
    pub fn print_info(&self) {
        println!("Vendor ID: {:#06X}", self.info.vendor);
        println!("Vendor: {}", vendor_name(self.info.vendor));
        println!("Device ID: {:#06X}", self.info.device);
        println!("Device: {}", self.info.name);
        println!("Device type: {:?}", self.info.device_type);
        println!("Driver: {} {}", self.info.driver, self.info.driver_info);
        println!("Backend: {:?}", self.info.backend);
    }
}

/// Picks the best adapter: discrete > integrated > virtual > anything.
fn pick_adapter(mut adapters: Vec<Adapter>) -> Result<Adapter, GpuError> {
    if adapters.is_empty() {
        return Err(GpuError::NoAdapter);
    }

    fn rank(adapter: &Adapter) -> u32 {
        match adapter.get_info().device_type {
            DeviceType::DiscreteGpu => 0,
            DeviceType::IntegratedGpu => 1,
            DeviceType::VirtualGpu => 2,
            _ => 3,
        }
    }

    let mut best = 0;
    for i in 1..adapters.len() {
        if rank(&adapters[i]) < rank(&adapters[best]) {
            best = i;
        }
    }
    Ok(adapters.swap_remove(best))
}

/// Convert vendor ID to human-readable name.
fn vendor_name(vendor_id: u32) -> String {
    match vendor_id {
        0x1002 => "AMD".to_string(),
        0x1010 => "ImgTec".to_string(),
        0x10DE => "NVIDIA".to_string(),
        0x13B5 => "ARM".to_string(),
        0x5143 => "Qualcomm".to_string(),
        0x8086 => "Intel".to_string(),
        0x106B => "Apple".to_string(),
        _ => format!("Unknown (0x{:04X})", vendor_id),
    }
}
