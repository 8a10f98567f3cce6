//! Texture compute model: square rgba32float textures, a fullscreen
//! fragment pass per dispatch, ping-pong render targets for in-place
//! iteration (a render target cannot be sampled while bound, so the
//! two-resource swap is real here).

use std::rc::Rc;
use std::sync::Arc;

use wgpu::util::DeviceExt;

use crate::bundle::CompiledBundle;
use crate::codegen::{texture, Backend};
use crate::kir::Type;
use crate::runtime::gpu::{
    pack_scalar_block, pack_texels, padded_bytes_per_row, square_side, strip_row_padding,
    unpack_texels, GpuContext, ScalarValue,
};
use crate::runtime::shaders::FULLSCREEN_VERTEX;
use crate::runtime::{ArrayInit, ResourceHandle, RuntimeError};

struct InputTexture {
    name: String,
    texture: Arc<wgpu::Texture>,
    side: u32,
    len: u32,
    elem: Type,
}

pub struct TextureModel {
    gpu: Rc<GpuContext>,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buf: wgpu::Buffer,
    /// User scalar values, kept so a scalar rebind can repack the block.
    scalar_values: Vec<ScalarValue>,
    inputs: Vec<InputTexture>,
    /// One render target, or two when the kernel iterates in place.
    out_texs: Vec<Arc<wgpu::Texture>>,
    staging: Arc<wgpu::Buffer>,
    out_side: u32,
    out_len: u32,
    out_elem: Type,
    /// Index into `inputs` of the in/out array, when ping-ponging.
    pingpong_input: Option<usize>,
    /// Render target for the next run.
    dst: usize,
    /// After a swap, the in/out array samples this output texture instead
    /// of its uploaded input.
    src_override: Option<usize>,
    last_written: Option<usize>,
    padded_bpr: u32,
}

impl TextureModel {
    pub fn new(
        gpu: Rc<GpuContext>,
        bundle: &CompiledBundle,
        arrays: &[ArrayInit],
        scalars: &[ScalarValue],
    ) -> Result<Self, RuntimeError> {
        let device = &gpu.device;
        let ctx = &bundle.context;

        let output_init = arrays
            .iter()
            .find(|a| a.name == ctx.output.name)
            .ok_or_else(|| {
                RuntimeError::Resource(format!(
                    "output descriptor '{}' has no array data",
                    ctx.output.name
                ))
            })?;
        let out_len = output_init.len;
        let out_elem = output_init.elem;
        let out_side = square_side(out_len);

        let max_side = gpu.limits.max_texture_dimension_2d;
        for init in arrays {
            let side = square_side(init.len);
            if side > max_side {
                return Err(RuntimeError::Resource(format!(
                    "array '{}' needs a {}×{} texture; the device maximum is {}",
                    init.name, side, side, max_side
                )));
            }
        }

        // Input textures: one per readable array, uploaded immediately.
        let mut inputs = Vec::new();
        for init in arrays.iter().filter(|a| !a.writeonly) {
            let side = square_side(init.len);
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&init.name),
                size: wgpu::Extent3d {
                    width: side,
                    height: side,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba32Float,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            if let Some(data) = &init.data {
                upload_texels(&gpu, &texture, data, init.elem, side);
            }
            inputs.push(InputTexture {
                name: init.name.clone(),
                texture: Arc::new(texture),
                side,
                len: init.len,
                elem: init.elem,
            });
        }

        let out_count = if ctx.need_pingpong { 2 } else { 1 };
        let out_texs: Vec<Arc<wgpu::Texture>> = (0..out_count)
            .map(|i| {
                Arc::new(device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(if i == 0 { "out_ping" } else { "out_pong" }),
                    size: wgpu::Extent3d {
                        width: out_side,
                        height: out_side,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: wgpu::TextureFormat::Rgba32Float,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                        | wgpu::TextureUsages::TEXTURE_BINDING
                        | wgpu::TextureUsages::COPY_SRC,
                    view_formats: &[],
                }))
            })
            .collect();

        // Uniform block: user scalars, then side/len per input array, then
        // the output side/len — the same order the generator declares.
        let scalar_values = scalars.to_vec();
        let uniform_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("params"),
            contents: &pack_uniforms(&scalar_values, &inputs, out_side, out_len),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        // Explicit layout: binding 0 is the block, then one non-filterable
        // float texture per input array.
        let mut layout_entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }];
        for i in 0..inputs.len() {
            layout_entries.push(wgpu::BindGroupLayoutEntry {
                binding: texture::texture_binding(i),
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }
        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("riptide_texture_layout"),
                entries: &layout_entries,
            });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("riptide_texture_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("fullscreen_vertex"),
            source: wgpu::ShaderSource::Wgsl(FULLSCREEN_VERTEX.into()),
        });
        let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("riptide_kernel_fragment"),
            source: wgpu::ShaderSource::Wgsl(bundle.shader(Backend::Texture).into()),
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("riptide_texture_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: wgpu::TextureFormat::Rgba32Float,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            multiview: None,
            cache: None,
        });

        let padded_bpr = padded_bytes_per_row(out_side);
        let staging = Arc::new(device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging"),
            size: u64::from(padded_bpr) * u64::from(out_side),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));

        let pingpong_input = if ctx.need_pingpong {
            inputs.iter().position(|t| t.name == ctx.output.name)
        } else {
            None
        };

        Ok(Self {
            gpu,
            pipeline,
            bind_group_layout,
            uniform_buf,
            scalar_values,
            inputs,
            out_texs,
            staging,
            out_side,
            out_len,
            out_elem,
            pingpong_input,
            dst: 0,
            src_override: None,
            last_written: None,
            padded_bpr,
        })
    }

    fn input_index(&self, name: &str) -> Result<usize, RuntimeError> {
        self.inputs
            .iter()
            .position(|t| t.name == name)
            .ok_or_else(|| RuntimeError::Binding(format!("no input texture for '{}'", name)))
    }

    /// One dispatch = one fullscreen pass; the workgroup grid is implicit
    /// in the output texture shape.
    pub fn run(&mut self, _dispatch: [u32; 3]) -> Result<(), RuntimeError> {
        let device = &self.gpu.device;

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: self.uniform_buf.as_entire_binding(),
        }];
        let views: Vec<wgpu::TextureView> = self
            .inputs
            .iter()
            .enumerate()
            .map(|(i, input)| {
                let texture = match (self.pingpong_input, self.src_override) {
                    (Some(p), Some(src)) if p == i => &self.out_texs[src],
                    _ => &input.texture,
                };
                texture.create_view(&wgpu::TextureViewDescriptor::default())
            })
            .collect();
        for (i, view) in views.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: texture::texture_binding(i),
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("riptide_texture_bind_group"),
            layout: &self.bind_group_layout,
            entries: &entries,
        });

        let target = self.out_texs[self.dst].create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("riptide_texture_dispatch"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("riptide_texture_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        self.last_written = Some(self.dst);
        Ok(())
    }

    /// Swap input/output roles before the next dispatch: the texture just
    /// written becomes the in/out array's source, the other becomes the
    /// target.
    pub fn swap_pingpong(&mut self) {
        if self.out_texs.len() < 2 {
            return;
        }
        self.src_override = Some(self.dst);
        self.dst = (self.dst + 1) % self.out_texs.len();
    }

    pub fn confirm_input(
        &mut self,
        name: &str,
        handle: ResourceHandle,
        len: u32,
        elements_per_texel: u32,
    ) -> Result<(), RuntimeError> {
        let index = self.input_index(name)?;
        let input = &mut self.inputs[index];
        if input.len != len || input.elem.elements_per_texel() != elements_per_texel {
            return Err(RuntimeError::Binding(format!(
                "upstream output shape does not match '{}' ({} × {} vs {} × {})",
                name,
                len,
                elements_per_texel,
                input.len,
                input.elem.elements_per_texel()
            )));
        }
        match handle {
            ResourceHandle::Texture(texture) => {
                input.texture = texture;
                Ok(())
            }
            ResourceHandle::Buffer(_) => Err(RuntimeError::Binding(
                "cannot wire a buffer resource into a texture slot".to_string(),
            )),
        }
    }

    /// The latest output texture (zero-valued until the first run).
    pub fn output_resource(&self) -> ResourceHandle {
        let index = self.last_written.unwrap_or(self.dst);
        ResourceHandle::Texture(self.out_texs[index].clone())
    }

    pub fn output_len(&self) -> u32 {
        self.out_len
    }

    pub fn write_array(&mut self, name: &str, data: &[f32]) -> Result<(), RuntimeError> {
        let index = self.input_index(name)?;
        let input = &self.inputs[index];
        upload_texels(&self.gpu, &input.texture, data, input.elem, input.side);
        Ok(())
    }

    pub fn write_scalars(&mut self, values: &[ScalarValue]) -> Result<(), RuntimeError> {
        self.scalar_values = values.to_vec();
        let packed = pack_uniforms(&self.scalar_values, &self.inputs, self.out_side, self.out_len);
        self.gpu.queue.write_buffer(&self.uniform_buf, 0, &packed);
        Ok(())
    }

    /// Submit the output texture → staging copy; the caller maps and awaits.
    pub fn begin_read(&self) -> (Arc<wgpu::Buffer>, u64) {
        let source = &self.out_texs[self.last_written.unwrap_or(self.dst)];
        let size = u64::from(self.padded_bpr) * u64::from(self.out_side);
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("riptide_texture_readback"),
            });
        encoder.copy_texture_to_buffer(
            source.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &self.staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_bpr),
                    rows_per_image: Some(self.out_side),
                },
            },
            wgpu::Extent3d {
                width: self.out_side,
                height: self.out_side,
                depth_or_array_layers: 1,
            },
        );
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        (self.staging.clone(), size)
    }

    /// Reshape padded texel rows into the logical output values.
    pub fn unpack_output(&self, bytes: &[u8]) -> Vec<f32> {
        let texels = strip_row_padding(bytes, self.out_side, self.padded_bpr);
        unpack_texels(&texels, self.out_elem, self.out_len)
    }

    pub fn destroy(&mut self) {
        for input in &self.inputs {
            input.texture.destroy();
        }
        for tex in &self.out_texs {
            tex.destroy();
        }
        self.uniform_buf.destroy();
        self.staging.destroy();
    }
}

fn upload_texels(gpu: &GpuContext, texture: &wgpu::Texture, data: &[f32], elem: Type, side: u32) {
    let texels = pack_texels(data, elem, side);
    gpu.queue.write_texture(
        texture.as_image_copy(),
        bytemuck::cast_slice(&texels),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(side * 16),
            rows_per_image: Some(side),
        },
        wgpu::Extent3d {
            width: side,
            height: side,
            depth_or_array_layers: 1,
        },
    );
}

fn pack_uniforms(
    scalars: &[ScalarValue],
    inputs: &[InputTexture],
    out_side: u32,
    out_len: u32,
) -> Vec<u8> {
    let mut values = scalars.to_vec();
    for input in inputs {
        values.push(ScalarValue::U32(input.side));
        values.push(ScalarValue::U32(input.len));
    }
    values.push(ScalarValue::U32(out_side));
    values.push(ScalarValue::U32(out_len));
    pack_scalar_block(&values)
}
