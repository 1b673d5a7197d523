//! wgpu Render Device
//!
//! Executes [`CommandBatch`]es on a headless wgpu device.
//!
//! Every draw of a batch gets its own slot in one dynamic-offset uniform
//! buffer, so the whole batch is recorded into a single command encoder and
//! handed to the queue with one `submit`. Readbacks go through a staging
//! buffer with rows padded to [`wgpu::COPY_BYTES_PER_ROW_ALIGNMENT`] and block
//! on a device poll.

use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};
use rustc_hash::FxHashMap;
use wgpu::util::DeviceExt;

use crate::errors::{PrefilterError, Result};
use crate::renderer::context::{DeviceSettings, GpuContext};
use crate::renderer::mipmap::{MipmapGenerator, layer_view};
use crate::renderer::shader::{ProgramLibrary, VERTEX_ENTRY_POINT};
use crate::renderer::{
    Command, CommandBatch, GlobalState, ProgramId, ProgramPass, RenderDevice, SurfaceDesc,
    SurfaceId, SurfaceKind, TextureId,
};
use crate::resources::cube::{CubeFace, full_mip_count, mip_size};
use crate::resources::format::RenderFormat;
use crate::resources::source::SourceEnvironment;

const SOURCE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Per-draw uniforms, laid out as `Globals` in the prefilter programs.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
struct ConvolutionUniforms {
    lod: f32,
    alpha: f32,
    face: u32,
    cube_size: f32,
    lod_count: f32,
    _pad: [f32; 3],
}

impl From<GlobalState> for ConvolutionUniforms {
    fn from(state: GlobalState) -> Self {
        Self {
            lod: state.mip_level,
            alpha: state.alpha,
            face: state.face,
            cube_size: state.cube_size,
            lod_count: state.lod_count,
            _pad: [0.0; 3],
        }
    }
}

const UNIFORM_SIZE: u64 = std::mem::size_of::<ConvolutionUniforms>() as u64;

struct GpuProgram {
    name: String,
    entry_point: &'static str,
    module: wgpu::ShaderModule,
}

struct GpuSurface {
    desc: SurfaceDesc,
    texture: wgpu::Texture,
}

struct GpuCube {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct RecordedDraw {
    program: ProgramId,
    input: Option<TextureId>,
    surface: SurfaceId,
    mip: u32,
    layer: u32,
    uniforms: ConvolutionUniforms,
}

#[inline]
fn align_to(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

/// A [`RenderDevice`] backed by wgpu.
pub struct GpuDevice {
    context: GpuContext,
    mipmaps: MipmapGenerator,
    layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    placeholder: GpuCube,
    uniform_stride: u64,

    programs: Vec<GpuProgram>,
    program_index: FxHashMap<(String, ProgramPass), ProgramId>,
    pipelines: FxHashMap<(ProgramId, wgpu::TextureFormat), wgpu::RenderPipeline>,
    textures: FxHashMap<TextureId, GpuCube>,
    surfaces: FxHashMap<SurfaceId, GpuSurface>,
}

impl GpuDevice {
    /// Requests an adapter and device and builds the shared pipeline state.
    pub fn new(settings: &DeviceSettings) -> Result<Self> {
        Self::from_context(GpuContext::new_blocking(settings)?)
    }

    pub fn from_context(context: GpuContext) -> Result<Self> {
        let device = &context.device;
        let mipmaps = MipmapGenerator::new(device)?;

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Prefilter Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: NonZeroU64::new(UNIFORM_SIZE),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::Cube,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Prefilter Pipeline Layout"),
            bind_group_layouts: &[Some(&layout)],
            immediate_size: 0,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Environment Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Linear,
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            ..Default::default()
        });

        let placeholder = Self::create_cube(device, "Placeholder Cube", 1, 1);
        let uniform_stride = align_to(
            UNIFORM_SIZE,
            u64::from(device.limits().min_uniform_buffer_offset_alignment),
        );

        Ok(Self {
            context,
            mipmaps,
            layout,
            pipeline_layout,
            sampler,
            placeholder,
            uniform_stride,
            programs: Vec::new(),
            program_index: FxHashMap::default(),
            pipelines: FxHashMap::default(),
            textures: FxHashMap::default(),
            surfaces: FxHashMap::default(),
        })
    }

    fn create_cube(device: &wgpu::Device, label: &str, size: u32, mip_count: u32) -> GpuCube {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 6,
            },
            mip_level_count: mip_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SOURCE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(label),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });
        GpuCube { texture, view }
    }

    fn surface(&self, id: SurfaceId) -> Result<&GpuSurface> {
        self.surfaces
            .get(&id)
            .ok_or(PrefilterError::ResourceNotFound(id.raw()))
    }

    fn ensure_pipeline(&mut self, program: ProgramId, format: wgpu::TextureFormat) -> Result<()> {
        if self.pipelines.contains_key(&(program, format)) {
            return Ok(());
        }
        let gpu_program = self
            .programs
            .get(program.0 as usize)
            .ok_or(PrefilterError::ResourceNotFound(u64::from(program.0)))?;

        log::debug!(
            "Creating pipeline {}::{} for {format:?}",
            gpu_program.name,
            gpu_program.entry_point
        );
        let pipeline = self
            .context
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&format!("{} {format:?}", gpu_program.name)),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &gpu_program.module,
                    entry_point: Some(VERTEX_ENTRY_POINT),
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &gpu_program.module,
                    entry_point: Some(gpu_program.entry_point),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            });
        self.pipelines.insert((program, format), pipeline);
        Ok(())
    }

    /// Walks the batch, tracking globals and render target, and snapshots
    /// the state of every draw.
    fn record(&self, batch: &CommandBatch) -> Result<Vec<RecordedDraw>> {
        let mut state = GlobalState::default();
        let mut target: Option<(SurfaceId, u32, u32)> = None;
        let mut draws = Vec::with_capacity(batch.draw_count());

        for command in batch.commands() {
            match *command {
                Command::SetGlobal { param, value } => state.apply(param, value),
                Command::SetRenderTarget { surface, mip, face } => {
                    let desc = self.surface(surface)?.desc;
                    let layer = match (desc.kind, face) {
                        (SurfaceKind::Cube, Some(face)) => face.index() as u32,
                        (SurfaceKind::Flat, None) => 0,
                        (kind, face) => {
                            return Err(PrefilterError::Configuration(format!(
                                "render target {face:?} does not address a {kind:?} surface"
                            )));
                        }
                    };
                    if mip >= desc.mip_count {
                        return Err(PrefilterError::Configuration(format!(
                            "render target mip {mip} out of range ({} mips)",
                            desc.mip_count
                        )));
                    }
                    target = Some((surface, mip, layer));
                }
                Command::DrawFullscreenTriangle { program, input } => {
                    let (surface, mip, layer) = target.ok_or_else(|| {
                        PrefilterError::Configuration("draw without a render target".to_string())
                    })?;
                    if let Some(texture) = input
                        && !self.textures.contains_key(&texture)
                    {
                        return Err(PrefilterError::ResourceNotFound(texture.raw()));
                    }
                    draws.push(RecordedDraw {
                        program,
                        input,
                        surface,
                        mip,
                        layer,
                        uniforms: state.into(),
                    });
                }
            }
        }
        Ok(draws)
    }

    fn wait_for_map(&self, slice: &wgpu::BufferSlice<'_>) -> Result<()> {
        let (tx, rx) = flume::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.context.wait_idle()?;
        rx.recv()
            .map_err(|e| PrefilterError::SubresourceCopy(format!("map callback dropped: {e}")))?
            .map_err(|e| PrefilterError::SubresourceCopy(format!("buffer map failed: {e}")))
    }
}

impl RenderDevice for GpuDevice {
    fn backend_name(&self) -> &'static str {
        "wgpu"
    }

    fn resolve_program(&mut self, name: &str, pass: ProgramPass) -> Result<ProgramId> {
        let key = (name.to_string(), pass);
        if let Some(id) = self.program_index.get(&key) {
            return Ok(*id);
        }

        let resolved = ProgramLibrary::resolve(name, pass)?;
        let module = self
            .context
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&resolved.name),
                source: wgpu::ShaderSource::Wgsl(resolved.source),
            });

        let id = ProgramId(self.programs.len() as u32);
        self.programs.push(GpuProgram {
            name: resolved.name,
            entry_point: resolved.entry_point,
            module,
        });
        self.program_index.insert(key, id);
        Ok(id)
    }

    fn upload_environment(&mut self, source: &SourceEnvironment) -> Result<TextureId> {
        let size = source.size();
        let cube = Self::create_cube(
            &self.context.device,
            "Source Environment",
            size,
            full_mip_count(size),
        );

        for face in CubeFace::ALL {
            let texels: Vec<half::f16> = source
                .gpu_rows(face)
                .iter()
                .flat_map(|t| t.to_array())
                .map(half::f16::from_f32)
                .collect();
            self.context.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &cube.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d {
                        x: 0,
                        y: 0,
                        z: face.index() as u32,
                    },
                    aspect: wgpu::TextureAspect::All,
                },
                bytemuck::cast_slice(&texels),
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(size * 8),
                    rows_per_image: Some(size),
                },
                wgpu::Extent3d {
                    width: size,
                    height: size,
                    depth_or_array_layers: 1,
                },
            );
        }

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Source Mip Chain"),
            });
        self.mipmaps
            .generate(&self.context.device, &mut encoder, &cube.texture);
        self.context.queue.submit(Some(encoder.finish()));

        let id = TextureId::next();
        log::debug!("Uploaded source environment {size}px as texture {}", id.raw());
        self.textures.insert(id, cube);
        Ok(id)
    }

    fn release_texture(&mut self, texture: TextureId) {
        if let Some(cube) = self.textures.remove(&texture) {
            cube.texture.destroy();
        }
    }

    fn create_surface(&mut self, desc: &SurfaceDesc) -> Result<SurfaceId> {
        if desc.size == 0 {
            return Err(PrefilterError::Configuration(
                "surface size must be non-zero".to_string(),
            ));
        }
        if desc.format == RenderFormat::Rg11b10Ufloat
            && !self
                .context
                .device
                .features()
                .contains(wgpu::Features::RG11B10UFLOAT_RENDERABLE)
        {
            return Err(PrefilterError::UnsupportedFormat(desc.format));
        }
        let texture = self
            .context
            .device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some(match desc.kind {
                    SurfaceKind::Cube => "Working Surface",
                    SurfaceKind::Flat => "Flat Surface",
                }),
                size: wgpu::Extent3d {
                    width: desc.size,
                    height: desc.size,
                    depth_or_array_layers: desc.layer_count(),
                },
                mip_level_count: desc.mip_count,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: desc.format.to_wgpu(desc.srgb),
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC
                    | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });

        let id = SurfaceId::next();
        self.surfaces.insert(id, GpuSurface { desc: *desc, texture });
        Ok(id)
    }

    fn release_surface(&mut self, surface: SurfaceId) {
        if let Some(gpu_surface) = self.surfaces.remove(&surface) {
            gpu_surface.texture.destroy();
        }
    }

    fn submit(&mut self, batch: CommandBatch) -> Result<()> {
        let draws = self.record(&batch)?;
        if draws.is_empty() {
            return Ok(());
        }

        let stride = self.uniform_stride as usize;
        let mut uniform_data = vec![0u8; stride * draws.len()];
        for (slot, draw) in uniform_data.chunks_exact_mut(stride).zip(&draws) {
            slot[..UNIFORM_SIZE as usize].copy_from_slice(bytemuck::bytes_of(&draw.uniforms));
        }

        for draw in &draws {
            let format = self.surface(draw.surface)?.texture.format();
            self.ensure_pipeline(draw.program, format)?;
        }

        let device = &self.context.device;
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Prefilter Uniforms"),
            contents: &uniform_data,
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let mut bind_groups: FxHashMap<Option<TextureId>, wgpu::BindGroup> = FxHashMap::default();
        for draw in &draws {
            if bind_groups.contains_key(&draw.input) {
                continue;
            }
            let view = match draw.input {
                Some(texture) => {
                    &self
                        .textures
                        .get(&texture)
                        .ok_or(PrefilterError::ResourceNotFound(texture.raw()))?
                        .view
                }
                None => &self.placeholder.view,
            };
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Prefilter BG"),
                layout: &self.layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer: &uniform_buffer,
                            offset: 0,
                            size: NonZeroU64::new(UNIFORM_SIZE),
                        }),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ],
            });
            bind_groups.insert(draw.input, bind_group);
        }

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Prefilter Batch"),
        });

        for (i, draw) in draws.iter().enumerate() {
            let surface = self.surface(draw.surface)?;
            let format = surface.texture.format();
            let pipeline = self
                .pipelines
                .get(&(draw.program, format))
                .ok_or(PrefilterError::ResourceNotFound(u64::from(draw.program.0)))?;
            let bind_group = bind_groups
                .get(&draw.input)
                .ok_or(PrefilterError::ResourceNotFound(draw.input.map_or(0, TextureId::raw)))?;
            let view = layer_view(
                &surface.texture,
                draw.mip,
                draw.layer,
                wgpu::TextureUsages::RENDER_ATTACHMENT,
            );

            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Prefilter Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            rpass.set_pipeline(pipeline);
            rpass.set_bind_group(0, bind_group, &[(i * stride) as u32]);
            rpass.draw(0..3, 0..1);
        }

        self.context.queue.submit(Some(encoder.finish()));
        log::debug!("Submitted batch: {} commands, {} draws", batch.len(), draws.len());
        Ok(())
    }

    fn copy_subresource(
        &mut self,
        src: SurfaceId,
        face: CubeFace,
        mip: u32,
        dst: SurfaceId,
    ) -> Result<()> {
        let src_surface = self
            .surfaces
            .get(&src)
            .ok_or_else(|| PrefilterError::SubresourceCopy(format!("unknown source surface {}", src.raw())))?;
        let dst_surface = self.surfaces.get(&dst).ok_or_else(|| {
            PrefilterError::SubresourceCopy(format!("unknown destination surface {}", dst.raw()))
        })?;

        let size = mip_size(src_surface.desc.size, mip);
        if src_surface.desc.kind != SurfaceKind::Cube
            || dst_surface.desc.kind != SurfaceKind::Flat
            || mip >= src_surface.desc.mip_count
            || dst_surface.desc.size != size
            || src_surface.texture.format() != dst_surface.texture.format()
        {
            return Err(PrefilterError::SubresourceCopy(format!(
                "cannot copy {face:?} mip {mip} of {:?} into {:?}",
                src_surface.desc, dst_surface.desc
            )));
        }

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Subresource Copy"),
            });
        encoder.copy_texture_to_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &src_surface.texture,
                mip_level: mip,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: face.index() as u32,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyTextureInfo {
                texture: &dst_surface.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
        );
        self.context.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn read_pixels(&mut self, surface: SurfaceId) -> Result<Vec<u8>> {
        let gpu_surface = self.surfaces.get(&surface).ok_or_else(|| {
            PrefilterError::SubresourceCopy(format!("unknown surface {}", surface.raw()))
        })?;
        if gpu_surface.desc.kind != SurfaceKind::Flat {
            return Err(PrefilterError::SubresourceCopy(
                "only flat surfaces can be read back".to_string(),
            ));
        }

        let size = gpu_surface.desc.size;
        let unpadded_bytes_per_row = size * gpu_surface.desc.format.bytes_per_pixel();
        let padded_bytes_per_row = align_to(
            u64::from(unpadded_bytes_per_row),
            u64::from(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT),
        ) as u32;

        let device = &self.context.device;
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging"),
            size: u64::from(padded_bytes_per_row) * u64::from(size),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &gpu_surface.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(size),
                },
            },
            wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
        );
        self.context.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        self.wait_for_map(&slice)?;

        let mapped = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((unpadded_bytes_per_row * size) as usize);
        for row in mapped.chunks_exact(padded_bytes_per_row as usize) {
            pixels.extend_from_slice(&row[..unpadded_bytes_per_row as usize]);
        }
        drop(mapped);
        staging.unmap();

        Ok(pixels)
    }
}
