//! GPU device setup with validation.
//!
//! In debug builds, wgpu validation is enabled to catch GPU errors early.

use terrain_common::BackendError;
use tracing::{error, info};

/// Returns wgpu instance flags with validation enabled for debug builds.
#[must_use]
pub fn gpu_instance_flags() -> wgpu::InstanceFlags {
    if cfg!(debug_assertions) {
        info!("GPU validation layer enabled (debug build)");
        wgpu::InstanceFlags::VALIDATION | wgpu::InstanceFlags::DEBUG
    } else {
        wgpu::InstanceFlags::empty()
    }
}

/// Creates a wgpu instance with appropriate validation settings.
#[must_use]
pub fn create_validated_instance() -> wgpu::Instance {
    wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        flags: gpu_instance_flags(),
        ..Default::default()
    })
}

/// Handles uncaptured wgpu device errors by logging them.
pub fn handle_device_error(error: &wgpu::Error) {
    error!("GPU device error: {error}");
}

/// Requests a device with no surface, blocking until it is ready.
///
/// `force_fallback_adapter` selects a software adapter, which is what CI
/// machines without a GPU usually have.
pub fn request_headless_device(
    force_fallback_adapter: bool,
) -> Result<(wgpu::Device, wgpu::Queue), BackendError> {
    let instance = create_validated_instance();

    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter,
    }))
    .ok_or_else(|| BackendError::InitFailed("no compatible GPU adapter".to_string()))?;

    let adapter_info = adapter.get_info();
    info!("Using GPU adapter: {} ({:?})", adapter_info.name, adapter_info.backend);

    let (device, queue) = pollster::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("Terrain Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults(),
            ..Default::default()
        },
        None,
    ))
    .map_err(|e| BackendError::InitFailed(e.to_string()))?;

    device.on_uncaptured_error(Box::new(|e| handle_device_error(&e)));

    Ok((device, queue))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_flags_follow_build_profile() {
        let flags = gpu_instance_flags();
        assert_eq!(flags.contains(wgpu::InstanceFlags::VALIDATION), cfg!(debug_assertions));
    }
}
