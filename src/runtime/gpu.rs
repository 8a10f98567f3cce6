//! GPU context creation and shared buffer plumbing.
//!
//! Backend selection happens here, once, at context creation: adapters
//! whose downlevel capabilities lack compute shaders fall back to the
//! texture-emulation backend. Everything else in the runtime asks the
//! context which backend it is on.

use crate::codegen::Backend;
use crate::kir::Type;
use crate::runtime::RuntimeError;

pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub backend: Backend,
    pub limits: wgpu::Limits,
}

/// Request an adapter and device; detect the backend unless forced.
pub fn create_context(force: Option<Backend>) -> Result<GpuContext, RuntimeError> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))
    .ok_or_else(|| RuntimeError::Resource("no GPU adapter available".to_string()))?;

    let backend = force.unwrap_or_else(|| {
        let flags = adapter.get_downlevel_capabilities().flags;
        if flags.contains(wgpu::DownlevelFlags::COMPUTE_SHADERS) {
            Backend::Native
        } else {
            Backend::Texture
        }
    });

    let (device, queue) = pollster::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("riptide-gpu"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
        },
        None,
    ))
    .map_err(|e| RuntimeError::Resource(format!("device request failed: {}", e)))?;

    let limits = device.limits();
    Ok(GpuContext {
        device,
        queue,
        backend,
        limits,
    })
}

/// Map a staging buffer and copy its contents out. The suspension point
/// for readback: the caller awaits the map, driven to completion by a
/// device poll.
pub async fn read_buffer(
    device: &wgpu::Device,
    buffer: &wgpu::Buffer,
    size: u64,
) -> Result<Vec<u8>, RuntimeError> {
    let slice = buffer.slice(..size);
    let (tx, rx) = tokio::sync::oneshot::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::Maintain::Wait);
    let result = rx
        .await
        .map_err(|_| RuntimeError::Resource("GPU readback channel closed".to_string()))?;
    result.map_err(|e| RuntimeError::Resource(format!("GPU readback failed: {:?}", e)))?;
    let data = slice.get_mapped_range().to_vec();
    buffer.unmap();
    Ok(data)
}

/// Await completion of all work submitted so far.
pub async fn wait_for_queue(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
) -> Result<(), RuntimeError> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    queue.on_submitted_work_done(move || {
        let _ = tx.send(());
    });
    device.poll(wgpu::Maintain::Wait);
    rx.await
        .map_err(|_| RuntimeError::Resource("GPU queue wait channel closed".to_string()))
}

// ─── Host-side value packing ───────────────────────────────────────

/// A scalar/vector uniform value as bound on the host.
#[derive(Clone, Debug, PartialEq)]
pub enum ScalarValue {
    F32(f32),
    I32(i32),
    U32(u32),
    Bool(bool),
    Vector(Vec<f32>),
}

/// Pack uniform-block members with a 16-byte slot per member, matching the
/// `@align(16)` layout both generators emit.
pub fn pack_scalar_block(values: &[ScalarValue]) -> Vec<u8> {
    let mut words: Vec<u32> = Vec::with_capacity(values.len() * 4);
    for value in values {
        let mut slot = [0u32; 4];
        match value {
            ScalarValue::F32(v) => slot[0] = v.to_bits(),
            ScalarValue::I32(v) => slot[0] = *v as u32,
            ScalarValue::U32(v) => slot[0] = *v,
            ScalarValue::Bool(v) => slot[0] = u32::from(*v),
            ScalarValue::Vector(components) => {
                for (i, c) in components.iter().take(4).enumerate() {
                    slot[i] = c.to_bits();
                }
            }
        }
        words.extend_from_slice(&slot);
    }
    bytemuck::cast_slice(&words).to_vec()
}

/// Host-side stride, in floats, of one array element in a storage buffer.
/// vec3 rounds up to vec4 alignment; everything else is tight.
pub fn storage_stride(elem: Type) -> u32 {
    match elem {
        Type::Vec3 => 4,
        other => other.elements_per_texel(),
    }
}

/// Lay array data out for a storage buffer (padding vec3 elements).
pub fn pack_storage(data: &[f32], elem: Type) -> Vec<f32> {
    let comps = elem.elements_per_texel() as usize;
    let stride = storage_stride(elem) as usize;
    if comps == stride {
        return data.to_vec();
    }
    let mut out = Vec::with_capacity(data.len() / comps * stride);
    for element in data.chunks(comps) {
        out.extend_from_slice(element);
        out.extend(std::iter::repeat(0.0).take(stride - element.len()));
    }
    out
}

/// Inverse of `pack_storage`: strip element padding, keep `len` elements.
pub fn unpack_storage(data: &[f32], elem: Type, len: u32) -> Vec<f32> {
    let comps = elem.elements_per_texel() as usize;
    let stride = storage_stride(elem) as usize;
    let mut out = Vec::with_capacity(len as usize * comps);
    for element in data.chunks(stride).take(len as usize) {
        out.extend_from_slice(&element[..comps.min(element.len())]);
    }
    out
}

/// Side length of the square texture holding `elements` texels (one
/// logical element per texel).
pub fn square_side(elements: u32) -> u32 {
    (f64::from(elements.max(1)).sqrt().ceil()) as u32
}

/// Pack array data into rgba32float texels: one element per texel, its
/// 1–4 floats in the leading channels, zero-padded tail.
pub fn pack_texels(data: &[f32], elem: Type, side: u32) -> Vec<f32> {
    let comps = elem.elements_per_texel() as usize;
    let mut out = vec![0.0f32; side as usize * side as usize * 4];
    for (i, element) in data.chunks(comps).enumerate() {
        let base = i * 4;
        out[base..base + element.len()].copy_from_slice(element);
    }
    out
}

/// Extract `len` logical elements from texel data (discarding padding).
pub fn unpack_texels(texels: &[f32], elem: Type, len: u32) -> Vec<f32> {
    let comps = elem.elements_per_texel() as usize;
    let mut out = Vec::with_capacity(len as usize * comps);
    for i in 0..len as usize {
        let base = i * 4;
        out.extend_from_slice(&texels[base..base + comps]);
    }
    out
}

/// Copy rows out of a padded readback buffer (copy_texture_to_buffer
/// requires 256-byte-aligned rows) into tight texel data.
pub fn strip_row_padding(bytes: &[u8], side: u32, padded_bytes_per_row: u32) -> Vec<f32> {
    let row_bytes = side as usize * 16;
    let mut texels: Vec<f32> = Vec::with_capacity(side as usize * side as usize * 4);
    for row in 0..side as usize {
        let start = row * padded_bytes_per_row as usize;
        // pod_collect copies, so the byte slice may be unaligned
        let row_data: Vec<f32> = bytemuck::pod_collect_to_vec(&bytes[start..start + row_bytes]);
        texels.extend_from_slice(&row_data);
    }
    texels
}

/// Round a row byte count up to wgpu's copy alignment.
pub fn padded_bytes_per_row(side: u32) -> u32 {
    let unpadded = side * 16;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_block_is_16_bytes_per_member() {
        let bytes = pack_scalar_block(&[
            ScalarValue::F32(1.5),
            ScalarValue::U32(7),
            ScalarValue::Vector(vec![1.0, 2.0, 3.0]),
        ]);
        assert_eq!(bytes.len(), 48);
        let words: Vec<u32> = bytemuck::pod_collect_to_vec(&bytes);
        assert_eq!(words[0], 1.5f32.to_bits());
        assert_eq!(words[4], 7);
        assert_eq!(words[8], 1.0f32.to_bits());
        assert_eq!(words[10], 3.0f32.to_bits());
        assert_eq!(words[11], 0);
    }

    #[test]
    fn test_vec3_storage_stride_pads() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let packed = pack_storage(&data, Type::Vec3);
        assert_eq!(packed, vec![1.0, 2.0, 3.0, 0.0, 4.0, 5.0, 6.0, 0.0]);
        assert_eq!(unpack_storage(&packed, Type::Vec3, 2), data.to_vec());
    }

    #[test]
    fn test_scalar_storage_is_tight() {
        let data = [1.0, 2.0, 3.0];
        assert_eq!(pack_storage(&data, Type::F32), data.to_vec());
    }

    #[test]
    fn test_square_side() {
        assert_eq!(square_side(1), 1);
        assert_eq!(square_side(4), 2);
        assert_eq!(square_side(5), 3);
        assert_eq!(square_side(8), 3);
        assert_eq!(square_side(9), 3);
        assert_eq!(square_side(0), 1);
    }

    #[test]
    fn test_texel_packing_round_trip() {
        // the fallback packing property: pack → unpack reproduces the
        // input exactly, padding discarded
        for (elem, len) in [
            (Type::F32, 8u32),
            (Type::Vec2, 5),
            (Type::Vec3, 3),
            (Type::Vec4, 2),
        ] {
            let comps = elem.elements_per_texel();
            let data: Vec<f32> = (0..len * comps).map(|i| i as f32 * 0.25).collect();
            let side = square_side(len);
            let texels = pack_texels(&data, elem, side);
            assert_eq!(texels.len(), (side * side * 4) as usize);
            let back = unpack_texels(&texels, elem, len);
            assert_eq!(back, data, "elem {:?}", elem);
        }
    }

    #[test]
    fn test_row_padding_strips() {
        // a 3-texel-wide texture has 48-byte rows, padded to 256
        let side = 3u32;
        let padded = padded_bytes_per_row(side);
        assert_eq!(padded, 256);
        let mut bytes = vec![0u8; (padded * side) as usize];
        for row in 0..side {
            let value = (row as f32 + 1.0).to_le_bytes();
            let start = (row * padded) as usize;
            bytes[start..start + 4].copy_from_slice(&value);
        }
        let texels = strip_row_padding(&bytes, side, padded);
        assert_eq!(texels.len(), (side * side * 4) as usize);
        assert_eq!(texels[0], 1.0);
        assert_eq!(texels[12], 2.0);
        assert_eq!(texels[24], 3.0);
    }
}
