//! wgpu compute backend.
//!
//! Each tile lives in an `Rgba8Uint` texture. A flush records one compute
//! pass with one dispatch per scheduled tile pass, then reads back a flag per
//! pass telling whether any cell changed.

use std::collections::HashMap;
use std::rc::Rc;

use bytemuck::{Pod, Zeroable};
use terrain_common::{BackendError, NeighborSlot, TILE_HEIGHT, TILE_WIDTH};
use tracing::{debug, info, trace, warn};
use wgpu::util::DeviceExt;
use wgpu::{Device, MapMode, Queue};

use crate::backend::{KernelPass, PassReport, PassTicket, SimulationBackend};
use crate::tile_buffer::{TileBuffer, BYTES_PER_ROW, DATA_LENGTH};
use crate::validation;

/// Texture format of tile textures.
pub const TILE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Uint;

/// Workgroup edge length of the simulation kernel.
pub const WORKGROUP_SIZE: u32 = 16;

const OUTPUT_BINDING: u32 = 9;
const PARAMS_BINDING: u32 = 10;
const CHANGED_BINDING: u32 = 11;

/// Simulation kernel in WGSL.
///
/// Mirrors [`crate::rules::next_cell`]; the two must stay in sync.
pub const SIMULATION_SHADER: &str = r"
struct KernelParams {
    seed: u32,
    pass_index: u32,
    _padding: vec2<u32>,
}

@group(0) @binding(0) var center: texture_2d<u32>;
@group(0) @binding(1) var terrain_top_left: texture_2d<u32>;
@group(0) @binding(2) var terrain_top: texture_2d<u32>;
@group(0) @binding(3) var terrain_top_right: texture_2d<u32>;
@group(0) @binding(4) var terrain_left: texture_2d<u32>;
@group(0) @binding(5) var terrain_right: texture_2d<u32>;
@group(0) @binding(6) var terrain_bottom_left: texture_2d<u32>;
@group(0) @binding(7) var terrain_bottom: texture_2d<u32>;
@group(0) @binding(8) var terrain_bottom_right: texture_2d<u32>;
@group(0) @binding(9) var output: texture_storage_2d<rgba8uint, write>;
@group(0) @binding(10) var<uniform> params: KernelParams;
@group(0) @binding(11) var<storage, read_write> changed: array<atomic<u32>>;

const TILE_SIZE: i32 = 256;
const AIR: u32 = 1u;
const SAND: u32 = 6u;
const WATER: u32 = 7u;

fn edge_offset(v: i32) -> i32 {
    if v < 0 {
        return -1;
    }
    if v >= TILE_SIZE {
        return 1;
    }
    return 0;
}

// Unlinked neighbors are bound to a zeroed texture, which reads as Invalid.
fn load_cell(x: i32, y: i32) -> vec4<u32> {
    let dx = edge_offset(x);
    let dy = edge_offset(y);
    let texel = vec2<i32>((x + TILE_SIZE) % TILE_SIZE, (y + TILE_SIZE) % TILE_SIZE);

    if dy < 0 {
        if dx < 0 {
            return textureLoad(terrain_top_left, texel, 0);
        }
        if dx == 0 {
            return textureLoad(terrain_top, texel, 0);
        }
        return textureLoad(terrain_top_right, texel, 0);
    }
    if dy == 0 {
        if dx < 0 {
            return textureLoad(terrain_left, texel, 0);
        }
        if dx == 0 {
            return textureLoad(center, texel, 0);
        }
        return textureLoad(terrain_right, texel, 0);
    }
    if dx < 0 {
        return textureLoad(terrain_bottom_left, texel, 0);
    }
    if dx == 0 {
        return textureLoad(terrain_bottom, texel, 0);
    }
    return textureLoad(terrain_bottom_right, texel, 0);
}

fn material_of(cell: vec4<u32>) -> u32 {
    return cell.r | ((cell.g & 0xFu) << 8u);
}

fn falls(material: u32) -> bool {
    return material == SAND || material == WATER;
}

@compute @workgroup_size(16, 16)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if gid.x >= u32(TILE_SIZE) || gid.y >= u32(TILE_SIZE) {
        return;
    }
    let x = i32(gid.x);
    let y = i32(gid.y);

    let cell = load_cell(x, y);
    let material = material_of(cell);
    var next = cell;

    if material == AIR {
        let above = load_cell(x, y - 1);
        if falls(material_of(above)) {
            next = above;
        }
    } else if falls(material) {
        let below = load_cell(x, y + 1);
        if material_of(below) == AIR {
            next = below;
        }
    }

    textureStore(output, vec2<i32>(x, y), next);
    if any(next != cell) {
        atomicOr(&changed[params.pass_index], 1u);
    }
}
";

/// Uniform block of one kernel pass (16 bytes, matches `KernelParams` in WGSL).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct KernelParams {
    /// Per-pass random seed.
    pub seed: u32,
    /// Slot of this pass in the changed-flags buffer.
    pub pass_index: u32,
    _padding: [u32; 2],
}

impl KernelParams {
    /// Creates parameters for the pass at `pass_index`.
    #[must_use]
    pub const fn new(seed: u32, pass_index: u32) -> Self {
        Self {
            seed,
            pass_index,
            _padding: [0; 2],
        }
    }
}

/// A tile texture on the GPU.
pub struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl GpuTexture {
    fn new(device: &Device, label: &str) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: tile_extent(),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TILE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }

    /// The underlying wgpu texture.
    #[must_use]
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    /// Default view of the texture.
    #[must_use]
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

/// Backend running the simulation kernel as a wgpu compute shader.
pub struct GpuBackend {
    device: Device,
    queue: Queue,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    /// Bound in place of unlinked neighbors.
    placeholder: GpuTexture,
    pending: Vec<KernelPass<GpuTexture>>,
    presentation_enabled: bool,
    passes_executed: u64,
}

impl GpuBackend {
    /// Creates a backend on an existing device.
    pub fn new(device: Device, queue: Queue) -> Self {
        info!("Creating terrain simulation pipeline...");

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Terrain Simulation Shader"),
            source: wgpu::ShaderSource::Wgsl(SIMULATION_SHADER.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Terrain Simulation Bind Group Layout"),
            entries: &layout_entries(),
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Terrain Simulation Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Terrain Simulation Pipeline"),
            layout: Some(&layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        let placeholder = GpuTexture::new(&device, "Terrain Placeholder");
        queue.write_texture(
            copy_target(&placeholder.texture),
            &vec![0; DATA_LENGTH],
            tile_layout(),
            tile_extent(),
        );

        info!("Terrain simulation pipeline created");

        Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            placeholder,
            pending: Vec::new(),
            presentation_enabled: true,
            passes_executed: 0,
        }
    }

    /// Creates a backend without a surface.
    ///
    /// Tries a hardware adapter first, then the software fallback adapter.
    pub fn headless() -> Result<Self, BackendError> {
        let (device, queue) = match validation::request_headless_device(false) {
            Ok(pair) => pair,
            Err(e) => {
                warn!("No hardware adapter ({e}), trying fallback adapter");
                validation::request_headless_device(true)?
            },
        };
        Ok(Self::new(device, queue))
    }

    /// The wgpu device.
    #[must_use]
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Whether the interactive view is currently presented.
    #[must_use]
    pub const fn presentation_enabled(&self) -> bool {
        self.presentation_enabled
    }

    /// Total passes executed since creation.
    #[must_use]
    pub const fn passes_executed(&self) -> u64 {
        self.passes_executed
    }

    fn encode_passes(
        &self,
        passes: &[KernelPass<GpuTexture>],
        flags: &wgpu::Buffer,
    ) -> wgpu::CommandEncoder {
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Terrain Simulation Encoder"),
        });

        // Any texture both written and read during this flush is read from a
        // copy taken before the first dispatch.
        let written: Vec<*const GpuTexture> = passes.iter().map(|p| Rc::as_ptr(&p.output)).collect();
        let mut staged: HashMap<*const GpuTexture, GpuTexture> = HashMap::new();
        for pass in passes {
            let reads = std::iter::once(&pass.input).chain(pass.boundaries.iter().flatten());
            for texture in reads {
                let ptr = Rc::as_ptr(texture);
                if written.contains(&ptr) && !staged.contains_key(&ptr) {
                    let copy = GpuTexture::new(&self.device, "Terrain Staged Input");
                    encoder.copy_texture_to_texture(
                        copy_target(&texture.texture),
                        copy_target(&copy.texture),
                        tile_extent(),
                    );
                    staged.insert(ptr, copy);
                }
            }
        }
        trace!("Staged {} textures for in-place passes", staged.len());

        let bind_groups: Vec<wgpu::BindGroup> = passes
            .iter()
            .enumerate()
            .map(|(index, pass)| {
                let params = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Terrain Kernel Params"),
                    contents: bytemuck::bytes_of(&KernelParams::new(pass.seed, index as u32)),
                    usage: wgpu::BufferUsages::UNIFORM,
                });

                let boundary_views: Vec<&wgpu::TextureView> = NeighborSlot::ALL
                    .iter()
                    .map(|slot| {
                        pass.boundary(*slot)
                            .map_or(&self.placeholder.view, |texture| read_view(&staged, texture))
                    })
                    .collect();

                let mut entries = vec![wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(read_view(&staged, &pass.input)),
                }];
                for (slot, view) in NeighborSlot::ALL.iter().zip(boundary_views) {
                    entries.push(wgpu::BindGroupEntry {
                        binding: slot.index() as u32 + 1,
                        resource: wgpu::BindingResource::TextureView(view),
                    });
                }
                entries.push(wgpu::BindGroupEntry {
                    binding: OUTPUT_BINDING,
                    resource: wgpu::BindingResource::TextureView(&pass.output.view),
                });
                entries.push(wgpu::BindGroupEntry {
                    binding: PARAMS_BINDING,
                    resource: params.as_entire_binding(),
                });
                entries.push(wgpu::BindGroupEntry {
                    binding: CHANGED_BINDING,
                    resource: flags.as_entire_binding(),
                });

                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Terrain Simulation Bind Group"),
                    layout: &self.bind_group_layout,
                    entries: &entries,
                })
            })
            .collect();

        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Terrain Simulation Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.pipeline);
            for bind_group in &bind_groups {
                compute_pass.set_bind_group(0, bind_group, &[]);
                compute_pass.dispatch_workgroups(
                    TILE_WIDTH.div_ceil(WORKGROUP_SIZE),
                    TILE_HEIGHT.div_ceil(WORKGROUP_SIZE),
                    1,
                );
            }
        }

        encoder
    }
}

impl SimulationBackend for GpuBackend {
    type Texture = GpuTexture;

    fn create_texture(&mut self, data: &TileBuffer) -> Result<GpuTexture, BackendError> {
        let texture = GpuTexture::new(&self.device, "Terrain Tile");
        self.upload(&texture, data)?;
        Ok(texture)
    }

    fn upload(&mut self, texture: &GpuTexture, data: &TileBuffer) -> Result<(), BackendError> {
        self.queue.write_texture(
            copy_target(&texture.texture),
            data.as_bytes(),
            tile_layout(),
            tile_extent(),
        );
        Ok(())
    }

    fn read_back(&mut self, texture: &GpuTexture, into: &mut TileBuffer) -> Result<(), BackendError> {
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Terrain Readback Buffer"),
            size: DATA_LENGTH as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Terrain Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            copy_target(&texture.texture),
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: tile_layout(),
            },
            tile_extent(),
        );
        self.queue.submit(Some(encoder.finish()));

        let bytes = map_read(&self.device, &staging)?;
        into.import_from(&bytes)
            .map_err(|e| BackendError::ReadbackFailed(e.to_string()))
    }

    fn schedule(&mut self, pass: KernelPass<GpuTexture>) -> PassTicket {
        let ticket = PassTicket::new(self.pending.len());
        trace!("Scheduled GPU pass {}", ticket.index());
        self.pending.push(pass);
        ticket
    }

    fn flush(&mut self) -> Result<PassReport, BackendError> {
        let passes = std::mem::take(&mut self.pending);
        if passes.is_empty() {
            return Ok(PassReport::default());
        }

        let flags_size = (passes.len() * std::mem::size_of::<u32>()) as u64;
        let flags = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Terrain Changed Flags"),
            size: flags_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let flags_readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Terrain Changed Flags Readback"),
            size: flags_size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = self.encode_passes(&passes, &flags);
        encoder.copy_buffer_to_buffer(&flags, 0, &flags_readback, 0, flags_size);
        self.queue.submit(Some(encoder.finish()));
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BackendError::KernelFailed(error.to_string()));
        }

        let bytes = map_read(&self.device, &flags_readback)?;
        let changed: Vec<bool> = bytes
            .chunks_exact(4)
            .map(|flag| flag.iter().any(|b| *b != 0))
            .collect();

        self.passes_executed += passes.len() as u64;
        debug!("GPU flush executed {} passes", passes.len());
        Ok(PassReport::new(changed))
    }

    fn set_presentation_enabled(&mut self, enabled: bool) {
        self.presentation_enabled = enabled;
    }
}

/// View a pass reads `texture` through: its staged copy if it has one.
fn read_view<'a>(
    staged: &'a HashMap<*const GpuTexture, GpuTexture>,
    texture: &'a Rc<GpuTexture>,
) -> &'a wgpu::TextureView {
    staged
        .get(&Rc::as_ptr(texture))
        .map_or(&texture.view, |copy| &copy.view)
}

fn layout_entries() -> Vec<wgpu::BindGroupLayoutEntry> {
    let sampled = |binding: u32| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Uint,
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    };

    // Center, then one binding per neighbor slot in slot order.
    let mut entries: Vec<_> = (0..=NeighborSlot::ALL.len() as u32).map(sampled).collect();
    entries.push(wgpu::BindGroupLayoutEntry {
        binding: OUTPUT_BINDING,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format: TILE_FORMAT,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    });
    entries.push(wgpu::BindGroupLayoutEntry {
        binding: PARAMS_BINDING,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    });
    entries.push(wgpu::BindGroupLayoutEntry {
        binding: CHANGED_BINDING,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    });
    entries
}

fn copy_target(texture: &wgpu::Texture) -> wgpu::ImageCopyTexture<'_> {
    wgpu::ImageCopyTexture {
        texture,
        mip_level: 0,
        origin: wgpu::Origin3d::ZERO,
        aspect: wgpu::TextureAspect::All,
    }
}

fn tile_layout() -> wgpu::ImageDataLayout {
    wgpu::ImageDataLayout {
        offset: 0,
        bytes_per_row: Some(BYTES_PER_ROW as u32),
        rows_per_image: Some(TILE_HEIGHT),
    }
}

fn tile_extent() -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: TILE_WIDTH,
        height: TILE_HEIGHT,
        depth_or_array_layers: 1,
    }
}

/// Maps a `MAP_READ` buffer and copies its contents out, blocking.
fn map_read(device: &Device, buffer: &wgpu::Buffer) -> Result<Vec<u8>, BackendError> {
    let slice = buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::Maintain::Wait);

    rx.recv()
        .map_err(|e| BackendError::ReadbackFailed(e.to_string()))?
        .map_err(|e| BackendError::ReadbackFailed(e.to_string()))?;

    let data = slice.get_mapped_range().to_vec();
    buffer.unmap();
    Ok(data)
}
