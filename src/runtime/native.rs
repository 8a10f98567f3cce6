//! Native compute model: storage buffers, compute pipeline, dispatch.

use std::rc::Rc;
use std::sync::Arc;

use wgpu::util::DeviceExt;

use crate::bundle::CompiledBundle;
use crate::codegen::{scalar_params_members, Backend};
use crate::kir::Type;
use crate::runtime::gpu::{
    pack_scalar_block, pack_storage, storage_stride, unpack_storage, GpuContext, ScalarValue,
};
use crate::runtime::{ArrayInit, ResourceHandle, RuntimeError};

struct ArrayResource {
    name: String,
    buffer: Arc<wgpu::Buffer>,
    len: u32,
    elem: Type,
}

pub struct NativeModel {
    gpu: Rc<GpuContext>,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buf: Option<wgpu::Buffer>,
    arrays: Vec<ArrayResource>,
    staging: Arc<wgpu::Buffer>,
    bind_group: Option<wgpu::BindGroup>,
    output_index: usize,
    output_len: u32,
    output_elem: Type,
}

impl NativeModel {
    pub fn new(
        gpu: Rc<GpuContext>,
        bundle: &CompiledBundle,
        arrays: &[ArrayInit],
        scalars: &[ScalarValue],
    ) -> Result<Self, RuntimeError> {
        let device = &gpu.device;
        let ctx = &bundle.context;

        let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("riptide_kernel"),
            source: wgpu::ShaderSource::Wgsl(bundle.shader(Backend::Native).into()),
        });

        // Explicit layout mirroring the generator: uniform block at 0 when
        // scalars exist, one storage buffer per array at its context slot.
        let mut layout_entries = Vec::new();
        if !scalar_params_members(ctx).is_empty() {
            layout_entries.push(wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });
        }
        for descriptor in ctx.arrays() {
            layout_entries.push(wgpu::BindGroupLayoutEntry {
                binding: descriptor.binding_slot,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage {
                        read_only: descriptor.readonly,
                    },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });
        }
        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("riptide_layout"),
                entries: &layout_entries,
            });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("riptide_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("riptide_pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader_module,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let uniform_buf = if scalars.is_empty() {
            None
        } else {
            Some(
                device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("params"),
                    contents: &pack_scalar_block(scalars),
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                }),
            )
        };

        let mut resources = Vec::new();
        for init in arrays {
            let stride = storage_stride(init.elem) as u64;
            let size = (u64::from(init.len.max(1))) * stride * 4;
            let usage = wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC;
            let buffer = match &init.data {
                Some(data) => device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&init.name),
                    contents: bytemuck::cast_slice(&pack_storage(data, init.elem)),
                    usage,
                }),
                None => device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&init.name),
                    size,
                    usage,
                    mapped_at_creation: false,
                }),
            };
            resources.push(ArrayResource {
                name: init.name.clone(),
                buffer: Arc::new(buffer),
                len: init.len,
                elem: init.elem,
            });
        }

        let output_index = resources
            .iter()
            .position(|r| r.name == ctx.output.name)
            .ok_or_else(|| {
                RuntimeError::Resource(format!(
                    "output descriptor '{}' has no buffer",
                    ctx.output.name
                ))
            })?;
        let output_len = resources[output_index].len;
        let output_elem = resources[output_index].elem;

        let staging_size =
            u64::from(output_len.max(1)) * u64::from(storage_stride(output_elem)) * 4;
        let staging = Arc::new(device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging"),
            size: staging_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));

        Ok(Self {
            gpu,
            pipeline,
            bind_group_layout,
            uniform_buf,
            arrays: resources,
            staging,
            bind_group: None,
            output_index,
            output_len,
            output_elem,
        })
    }

    fn array_index(&self, name: &str) -> Result<usize, RuntimeError> {
        self.arrays
            .iter()
            .position(|r| r.name == name)
            .ok_or_else(|| RuntimeError::Binding(format!("no buffer for '{}'", name)))
    }

    fn ensure_bind_group(&mut self) {
        if self.bind_group.is_some() {
            return;
        }
        let mut entries = Vec::new();
        if let Some(uniform) = &self.uniform_buf {
            entries.push(wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform.as_entire_binding(),
            });
        }
        for (i, array) in self.arrays.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: i as u32 + 1,
                resource: array.buffer.as_entire_binding(),
            });
        }
        self.bind_group = Some(self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("riptide_bind_group"),
            layout: &self.bind_group_layout,
            entries: &entries,
        }));
    }

    /// Submit one dispatch over the configured workgroup grid.
    pub fn run(&mut self, dispatch: [u32; 3]) -> Result<(), RuntimeError> {
        self.ensure_bind_group();
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("riptide_dispatch"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("riptide_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, self.bind_group.as_ref().unwrap(), &[]);
            pass.dispatch_workgroups(dispatch[0], dispatch[1], dispatch[2]);
        }
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    /// Iteration on the native backend is in place: the in/out array is a
    /// single read_write binding and queue ordering serializes dispatches,
    /// so swapping is role bookkeeping only.
    pub fn swap_pingpong(&mut self) {}

    /// Alias an upstream kernel's output buffer into one of our input
    /// slots. No copy; the bind group is rebuilt on next run.
    pub fn confirm_input(
        &mut self,
        name: &str,
        handle: ResourceHandle,
        len: u32,
        elements_per_texel: u32,
    ) -> Result<(), RuntimeError> {
        let index = self.array_index(name)?;
        let slot = &mut self.arrays[index];
        if slot.len != len || slot.elem.elements_per_texel() != elements_per_texel {
            return Err(RuntimeError::Binding(format!(
                "upstream output shape does not match '{}' ({} × {} vs {} × {})",
                name,
                len,
                elements_per_texel,
                slot.len,
                slot.elem.elements_per_texel()
            )));
        }
        match handle {
            ResourceHandle::Buffer(buffer) => {
                slot.buffer = buffer;
                self.bind_group = None;
                Ok(())
            }
            ResourceHandle::Texture(_) => Err(RuntimeError::Binding(
                "cannot wire a texture resource into a storage slot".to_string(),
            )),
        }
    }

    /// The latest output resource (zero-valued until the first run).
    pub fn output_resource(&self) -> ResourceHandle {
        ResourceHandle::Buffer(self.arrays[self.output_index].buffer.clone())
    }

    pub fn output_len(&self) -> u32 {
        self.output_len
    }

    /// Re-upload array data in place.
    pub fn write_array(&mut self, name: &str, data: &[f32]) -> Result<(), RuntimeError> {
        let index = self.array_index(name)?;
        let array = &self.arrays[index];
        self.gpu.queue.write_buffer(
            &array.buffer,
            0,
            bytemuck::cast_slice(&pack_storage(data, array.elem)),
        );
        Ok(())
    }

    /// Re-upload the packed uniform block.
    pub fn write_scalars(&mut self, values: &[ScalarValue]) -> Result<(), RuntimeError> {
        match &self.uniform_buf {
            Some(buffer) => {
                self.gpu
                    .queue
                    .write_buffer(buffer, 0, &pack_scalar_block(values));
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Submit the output → staging copy; the caller maps and awaits.
    pub fn begin_read(&self) -> (Arc<wgpu::Buffer>, u64) {
        let size = u64::from(self.output_len.max(1)) * u64::from(storage_stride(self.output_elem)) * 4;
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("riptide_readback"),
            });
        encoder.copy_buffer_to_buffer(
            &self.arrays[self.output_index].buffer,
            0,
            &self.staging,
            0,
            size,
        );
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        (self.staging.clone(), size)
    }

    /// Reshape raw staging bytes into the logical output values.
    pub fn unpack_output(&self, bytes: &[u8]) -> Vec<f32> {
        // pod_collect copies, so the byte slice may be unaligned
        let floats: Vec<f32> = bytemuck::pod_collect_to_vec(bytes);
        unpack_storage(&floats, self.output_elem, self.output_len)
    }

    /// Release GPU memory. The kernel never touches the model afterwards.
    pub fn destroy(&mut self) {
        for array in &self.arrays {
            array.buffer.destroy();
        }
        if let Some(uniform) = &self.uniform_buf {
            uniform.destroy();
        }
        self.staging.destroy();
        self.bind_group = None;
    }
}
