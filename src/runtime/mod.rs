//! Compute runtime: binds data to compiled bundles and drives execution
//! on whichever backend the device supports.
//!
//! The runtime owns the GPU context and an explicit bundle cache; kernels
//! are cheap handles over a backend-specific compute model. A single
//! control thread drives everything — `execute` and `get_output` are the
//! only suspension points, awaiting GPU completion. Cross-kernel sharing
//! is limited to `set_binding(name, &upstream)` wiring, which aliases the
//! upstream's latest output resource into the downstream's input slot
//! without copying; ordering between chained kernels is the caller's
//! responsibility.

pub mod gpu;
pub(crate) mod native;
pub mod shaders;
pub(crate) mod texture;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::bundle::{source_hash, CompiledBundle};
use crate::codegen::Backend;
use crate::diagnostic::Diagnostic;
use crate::kir::Type;

use gpu::{GpuContext, ScalarValue};
use native::NativeModel;
use texture::TextureModel;

// ─── Errors ────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub enum RuntimeError {
    /// Bound data does not match a descriptor (wrong length, type, or name).
    Binding(String),
    /// Backend resource allocation or readback failure.
    Resource(String),
    /// The kernel was destroyed.
    Destroyed,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::Binding(msg) => write!(f, "binding error: {}", msg),
            RuntimeError::Resource(msg) => write!(f, "resource error: {}", msg),
            RuntimeError::Destroyed => write!(f, "kernel used after destroy()"),
        }
    }
}

impl std::error::Error for RuntimeError {}

// ─── Model capability surface ──────────────────────────────────────

/// A GPU-resident resource aliased between kernels when pipelining.
#[derive(Clone)]
pub enum ResourceHandle {
    Buffer(Arc<wgpu::Buffer>),
    Texture(Arc<wgpu::Texture>),
}

/// Everything a model needs to allocate one array descriptor.
pub(crate) struct ArrayInit {
    pub name: String,
    pub elem: Type,
    pub len: u32,
    pub data: Option<Vec<f32>>,
    pub writeonly: bool,
}

/// The closed set of backend compute models. Backend selection happens
/// once, at kernel construction, never per call.
pub(crate) enum ComputeModel {
    Native(NativeModel),
    Texture(TextureModel),
}

impl ComputeModel {
    fn run(&mut self, dispatch: [u32; 3]) -> Result<(), RuntimeError> {
        match self {
            ComputeModel::Native(m) => m.run(dispatch),
            ComputeModel::Texture(m) => m.run(dispatch),
        }
    }

    fn swap_pingpong(&mut self) {
        match self {
            ComputeModel::Native(m) => m.swap_pingpong(),
            ComputeModel::Texture(m) => m.swap_pingpong(),
        }
    }

    fn confirm_input(
        &mut self,
        name: &str,
        handle: ResourceHandle,
        len: u32,
        elements_per_texel: u32,
    ) -> Result<(), RuntimeError> {
        match self {
            ComputeModel::Native(m) => m.confirm_input(name, handle, len, elements_per_texel),
            ComputeModel::Texture(m) => m.confirm_input(name, handle, len, elements_per_texel),
        }
    }

    fn output_resource(&self) -> ResourceHandle {
        match self {
            ComputeModel::Native(m) => m.output_resource(),
            ComputeModel::Texture(m) => m.output_resource(),
        }
    }

    fn output_len(&self) -> u32 {
        match self {
            ComputeModel::Native(m) => m.output_len(),
            ComputeModel::Texture(m) => m.output_len(),
        }
    }

    fn write_array(&mut self, name: &str, data: &[f32]) -> Result<(), RuntimeError> {
        match self {
            ComputeModel::Native(m) => m.write_array(name, data),
            ComputeModel::Texture(m) => m.write_array(name, data),
        }
    }

    fn write_scalars(&mut self, values: &[ScalarValue]) -> Result<(), RuntimeError> {
        match self {
            ComputeModel::Native(m) => m.write_scalars(values),
            ComputeModel::Texture(m) => m.write_scalars(values),
        }
    }

    fn begin_read(&self) -> (Arc<wgpu::Buffer>, u64) {
        match self {
            ComputeModel::Native(m) => m.begin_read(),
            ComputeModel::Texture(m) => m.begin_read(),
        }
    }

    fn unpack_output(&self, bytes: &[u8]) -> Vec<f32> {
        match self {
            ComputeModel::Native(m) => m.unpack_output(bytes),
            ComputeModel::Texture(m) => m.unpack_output(bytes),
        }
    }

    fn destroy(&mut self) {
        match self {
            ComputeModel::Native(m) => m.destroy(),
            ComputeModel::Texture(m) => m.destroy(),
        }
    }
}

// ─── Bindings ──────────────────────────────────────────────────────

/// A value bound to a descriptor: concrete data, or an upstream kernel
/// whose output feeds this slot (pipeline chaining).
#[derive(Clone)]
pub enum Binding {
    Float(f32),
    Int(i32),
    Uint(u32),
    Bool(bool),
    Vector(Vec<f32>),
    Array(Vec<f32>),
    Kernel(Kernel),
}

impl From<f32> for Binding {
    fn from(v: f32) -> Self {
        Binding::Float(v)
    }
}

impl From<i32> for Binding {
    fn from(v: i32) -> Self {
        Binding::Int(v)
    }
}

impl From<u32> for Binding {
    fn from(v: u32) -> Self {
        Binding::Uint(v)
    }
}

impl From<bool> for Binding {
    fn from(v: bool) -> Self {
        Binding::Bool(v)
    }
}

impl From<Vec<f32>> for Binding {
    fn from(v: Vec<f32>) -> Self {
        Binding::Array(v)
    }
}

impl From<&[f32]> for Binding {
    fn from(v: &[f32]) -> Self {
        Binding::Array(v.to_vec())
    }
}

impl<const N: usize> From<[f32; N]> for Binding {
    fn from(v: [f32; N]) -> Self {
        Binding::Array(v.to_vec())
    }
}

impl From<&Kernel> for Binding {
    fn from(v: &Kernel) -> Self {
        Binding::Kernel(v.clone())
    }
}

// ─── Runtime ───────────────────────────────────────────────────────

/// Owns the GPU device, the detected backend, and the bundle cache.
pub struct ComputeRuntime {
    gpu: Rc<GpuContext>,
    bundles: RefCell<HashMap<[u8; 32], Arc<CompiledBundle>>>,
}

impl ComputeRuntime {
    /// Create a runtime on the detected backend: native compute when the
    /// adapter supports it, texture emulation otherwise.
    pub fn new() -> Result<Self, RuntimeError> {
        Self::create(None)
    }

    /// Create a runtime on a specific backend regardless of detection.
    pub fn with_backend(backend: Backend) -> Result<Self, RuntimeError> {
        Self::create(Some(backend))
    }

    fn create(force: Option<Backend>) -> Result<Self, RuntimeError> {
        let context = gpu::create_context(force)?;
        Ok(Self {
            gpu: Rc::new(context),
            bundles: RefCell::new(HashMap::new()),
        })
    }

    pub fn backend(&self) -> Backend {
        self.gpu.backend
    }

    /// Compile a kernel source, memoized on a content hash of the text.
    pub fn compile(&self, source: &str) -> Result<Arc<CompiledBundle>, Vec<Diagnostic>> {
        let key = source_hash(source);
        if let Some(bundle) = self.bundles.borrow().get(&key) {
            return Ok(bundle.clone());
        }
        let bundle = Arc::new(crate::compile(source)?);
        self.bundles
            .borrow_mut()
            .insert(key, bundle.clone());
        Ok(bundle)
    }

    /// Drop all cached bundles (kernels keep their own references).
    pub fn clear_cache(&self) {
        self.bundles.borrow_mut().clear();
    }

    /// Create a kernel handle. No GPU resources are allocated until the
    /// first execute.
    pub fn create_kernel(&self, bundle: &Arc<CompiledBundle>) -> Kernel {
        Kernel {
            inner: Rc::new(RefCell::new(KernelInner {
                gpu: self.gpu.clone(),
                bundle: bundle.clone(),
                bindings: HashMap::new(),
                dispatch: None,
                iterations_run: 0,
                model: None,
                state: KernelState::Created,
            })),
        }
    }
}

// ─── Kernel ────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum KernelState {
    Created,
    Bound,
    Running,
    Idle,
    Destroyed,
}

struct KernelInner {
    gpu: Rc<GpuContext>,
    bundle: Arc<CompiledBundle>,
    bindings: HashMap<String, Binding>,
    dispatch: Option<[u32; 3]>,
    iterations_run: u32,
    model: Option<ComputeModel>,
    state: KernelState,
}

impl KernelInner {
    fn assert_live(&self) {
        if self.state == KernelState::Destroyed {
            panic!("kernel used after destroy()");
        }
    }

    fn dispatch(&self) -> [u32; 3] {
        self.dispatch.unwrap_or(self.bundle.context.dispatch)
    }
}

/// A runtime handle to one executable kernel. Cheap to clone; clones share
/// the same bindings and compute model (the runtime is single-threaded).
#[derive(Clone)]
pub struct Kernel {
    inner: Rc<RefCell<KernelInner>>,
}

impl Kernel {
    /// Override the bundle's default workgroup count for future dispatches.
    pub fn set_dispatch(&self, x: u32, y: u32, z: u32) {
        let mut inner = self.inner.borrow_mut();
        inner.assert_live();
        inner.dispatch = Some([x, y, z]);
    }

    /// Bind data or an upstream kernel to a descriptor by name.
    pub fn set_binding(&self, name: &str, value: impl Into<Binding>) -> Result<(), RuntimeError> {
        let value = value.into();
        if let Binding::Kernel(upstream) = &value {
            if Rc::ptr_eq(&upstream.inner, &self.inner) {
                return Err(RuntimeError::Binding(
                    "a kernel cannot feed its own input".to_string(),
                ));
            }
        }

        let mut inner = self.inner.borrow_mut();
        inner.assert_live();
        let descriptor = inner
            .bundle
            .context
            .uniform(name)
            .cloned()
            .ok_or_else(|| RuntimeError::Binding(format!("unknown binding '{}'", name)))?;
        validate_binding(&descriptor, &value)?;
        inner.bindings.insert(name.to_string(), value);
        if inner.state == KernelState::Created {
            inner.state = KernelState::Bound;
        }

        // Live update when resources already exist; upstream rewiring is
        // resolved lazily at the next execute.
        let KernelInner {
            model,
            bindings,
            bundle,
            ..
        } = &mut *inner;
        if let Some(model) = model {
            match bindings.get(name) {
                Some(Binding::Array(data)) => model.write_array(name, data)?,
                Some(Binding::Kernel(_)) => {}
                Some(_) => {
                    let scalars = collect_scalars(&bundle.context, bindings)?;
                    model.write_scalars(&scalars)?;
                }
                None => {}
            }
        }
        Ok(())
    }

    /// Run `iterations` dispatches, swapping ping-pong roles between
    /// iterations for in-place kernels, and suspend until the queue has
    /// drained.
    pub async fn execute(&self, iterations: u32) -> Result<(), RuntimeError> {
        let upstreams: Vec<(String, Kernel)> = {
            let inner = self.inner.borrow();
            inner.assert_live();
            inner
                .bindings
                .iter()
                .filter_map(|(name, binding)| match binding {
                    Binding::Kernel(upstream) => Some((name.clone(), upstream.clone())),
                    _ => None,
                })
                .collect()
        };

        // Upstream kernels that never executed still expose their
        // pre-allocated (zero-valued) output; ordering is the caller's
        // responsibility.
        for (_, upstream) in &upstreams {
            upstream.ensure_model()?;
        }
        self.ensure_model()?;

        {
            let mut inner = self.inner.borrow_mut();
            for (name, upstream) in &upstreams {
                let (handle, len, elements_per_texel) = {
                    let up = upstream.inner.borrow();
                    let model = up.model.as_ref().expect("upstream model exists");
                    (
                        model.output_resource(),
                        model.output_len(),
                        up.bundle.context.output.elements_per_texel,
                    )
                };
                inner
                    .model
                    .as_mut()
                    .expect("model exists")
                    .confirm_input(name, handle, len, elements_per_texel)?;
            }
        }

        let (dispatch, need_pingpong, already_run, device_gpu) = {
            let inner = self.inner.borrow();
            (
                inner.dispatch(),
                inner.bundle.context.need_pingpong,
                inner.iterations_run > 0,
                inner.gpu.clone(),
            )
        };

        for i in 0..iterations {
            let mut inner = self.inner.borrow_mut();
            inner.state = KernelState::Running;
            let model = inner.model.as_mut().expect("model exists");
            // every re-dispatch of an in-place kernel swaps input/output
            // roles first, including the first dispatch of a later execute
            if need_pingpong && (i > 0 || already_run) {
                model.swap_pingpong();
            }
            model.run(dispatch)?;
            inner.iterations_run += 1;
        }

        gpu::wait_for_queue(&device_gpu.device, &device_gpu.queue).await?;
        self.inner.borrow_mut().state = KernelState::Idle;
        Ok(())
    }

    /// Read the output resource back and reshape it to the declared
    /// length and element type. Only meaningful once the kernel has
    /// executed; earlier calls see the resource's initial contents.
    pub async fn get_output(&self) -> Result<Vec<f32>, RuntimeError> {
        self.ensure_model()?;
        let (staging, size, device_gpu) = {
            let inner = self.inner.borrow();
            let (staging, size) = inner.model.as_ref().expect("model exists").begin_read();
            (staging, size, inner.gpu.clone())
        };
        let bytes = gpu::read_buffer(&device_gpu.device, &staging, size).await?;
        let inner = self.inner.borrow();
        Ok(inner
            .model
            .as_ref()
            .expect("model exists")
            .unpack_output(&bytes))
    }

    /// Release the compute model's GPU resources. The kernel is unusable
    /// afterwards; further calls are a programming error.
    pub fn destroy(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.assert_live();
        if let Some(model) = &mut inner.model {
            model.destroy();
        }
        inner.model = None;
        inner.bindings.clear();
        inner.state = KernelState::Destroyed;
    }

    /// Total dispatches issued so far.
    pub fn iterations_run(&self) -> u32 {
        self.inner.borrow().iterations_run
    }

    /// The kernel's output length in elements, resolved from the fixed
    /// declaration, the bound data, or the upstream chain.
    fn output_len(&self) -> Result<u32, RuntimeError> {
        let inner = self.inner.borrow();
        if let Some(model) = &inner.model {
            return Ok(model.output_len());
        }
        let ctx = &inner.bundle.context;
        if let Some(len) = ctx.output.length {
            return Ok(len);
        }
        match inner.bindings.get(&ctx.output.name) {
            Some(Binding::Array(data)) => {
                Ok(data.len() as u32 / ctx.output.elements_per_texel)
            }
            Some(Binding::Kernel(upstream)) => upstream.output_len(),
            _ => Err(RuntimeError::Binding(format!(
                "cannot determine output length; bind '{}' first",
                ctx.output.name
            ))),
        }
    }

    /// Allocate GPU resources and compile the backend pipeline, once.
    fn ensure_model(&self) -> Result<(), RuntimeError> {
        // Resolve upstream lengths before borrowing ourselves mutably.
        let upstream_lens: HashMap<String, u32> = {
            let inner = self.inner.borrow();
            inner.assert_live();
            if inner.model.is_some() {
                return Ok(());
            }
            let mut lens = HashMap::new();
            for (name, binding) in &inner.bindings {
                if let Binding::Kernel(upstream) = binding {
                    lens.insert(name.clone(), upstream.output_len()?);
                }
            }
            lens
        };

        let mut inner = self.inner.borrow_mut();
        if inner.model.is_some() {
            return Ok(());
        }
        let ctx = inner.bundle.context.clone();

        let mut arrays = Vec::new();
        for descriptor in ctx.arrays() {
            let comps = descriptor.ty.elements_per_texel();
            let (len, data) = match inner.bindings.get(&descriptor.name) {
                Some(Binding::Array(data)) => (data.len() as u32 / comps, Some(data.clone())),
                Some(Binding::Kernel(_)) => {
                    let len = upstream_lens[&descriptor.name];
                    if let Some(fixed) = descriptor.fixed_length {
                        if fixed != len {
                            return Err(RuntimeError::Binding(format!(
                                "upstream output length {} does not match '{}' (declared {})",
                                len, descriptor.name, fixed
                            )));
                        }
                    }
                    (len, None)
                }
                _ => match descriptor.fixed_length {
                    Some(len) => (len, None),
                    None => {
                        return Err(RuntimeError::Binding(format!(
                            "array '{}' has no binding",
                            descriptor.name
                        )))
                    }
                },
            };
            arrays.push(ArrayInit {
                name: descriptor.name.clone(),
                elem: descriptor.ty,
                len,
                data,
                writeonly: descriptor.writeonly,
            });
        }

        let scalars = collect_scalars(&ctx, &inner.bindings)?;
        let gpu_ctx = inner.gpu.clone();
        let model = match gpu_ctx.backend {
            Backend::Native => {
                ComputeModel::Native(NativeModel::new(gpu_ctx, &inner.bundle, &arrays, &scalars)?)
            }
            Backend::Texture => {
                ComputeModel::Texture(TextureModel::new(gpu_ctx, &inner.bundle, &arrays, &scalars)?)
            }
        };
        inner.model = Some(model);
        Ok(())
    }
}

// ─── Validation ────────────────────────────────────────────────────

fn validate_binding(
    descriptor: &crate::kir::UniformDescriptor,
    value: &Binding,
) -> Result<(), RuntimeError> {
    if descriptor.is_array {
        match value {
            Binding::Array(data) => {
                let comps = descriptor.ty.elements_per_texel() as usize;
                if data.len() % comps != 0 {
                    return Err(RuntimeError::Binding(format!(
                        "'{}' expects multiples of {} floats, got {}",
                        descriptor.name,
                        comps,
                        data.len()
                    )));
                }
                if let Some(fixed) = descriptor.fixed_length {
                    let elements = (data.len() / comps) as u32;
                    if elements != fixed {
                        return Err(RuntimeError::Binding(format!(
                            "'{}' is declared with length {}, got {} elements",
                            descriptor.name, fixed, elements
                        )));
                    }
                }
                Ok(())
            }
            Binding::Kernel(_) => {
                if descriptor.writeonly {
                    return Err(RuntimeError::Binding(format!(
                        "'{}' is the write-only output; it cannot consume an upstream kernel",
                        descriptor.name
                    )));
                }
                Ok(())
            }
            _ => Err(RuntimeError::Binding(format!(
                "'{}' is an array descriptor; bind a Vec<f32> or an upstream kernel",
                descriptor.name
            ))),
        }
    } else {
        let ok = matches!(
            (descriptor.ty, value),
            (Type::F32, Binding::Float(_))
                | (Type::I32, Binding::Int(_))
                | (Type::U32, Binding::Uint(_))
                | (Type::Bool, Binding::Bool(_))
        ) || matches!((descriptor.ty, value),
            (Type::Vec2, Binding::Vector(v)) if v.len() == 2)
            || matches!((descriptor.ty, value),
            (Type::Vec3, Binding::Vector(v)) if v.len() == 3)
            || matches!((descriptor.ty, value),
            (Type::Vec4, Binding::Vector(v)) if v.len() == 4);
        if ok {
            Ok(())
        } else {
            Err(RuntimeError::Binding(format!(
                "'{}' expects a {:?} value",
                descriptor.name, descriptor.ty
            )))
        }
    }
}

fn collect_scalars(
    ctx: &crate::kir::CompilationContext,
    bindings: &HashMap<String, Binding>,
) -> Result<Vec<ScalarValue>, RuntimeError> {
    let mut values = Vec::new();
    for descriptor in ctx.scalars() {
        let value = bindings.get(&descriptor.name).ok_or_else(|| {
            RuntimeError::Binding(format!("scalar '{}' is not bound", descriptor.name))
        })?;
        values.push(match value {
            Binding::Float(v) => ScalarValue::F32(*v),
            Binding::Int(v) => ScalarValue::I32(*v),
            Binding::Uint(v) => ScalarValue::U32(*v),
            Binding::Bool(v) => ScalarValue::Bool(*v),
            Binding::Vector(v) => ScalarValue::Vector(v.clone()),
            _ => {
                return Err(RuntimeError::Binding(format!(
                    "scalar '{}' has a non-scalar binding",
                    descriptor.name
                )))
            }
        });
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kir::UniformDescriptor;

    fn array_descriptor(fixed: Option<u32>, ty: Type) -> UniformDescriptor {
        UniformDescriptor {
            name: "data".to_string(),
            ty,
            is_array: true,
            readonly: false,
            writeonly: false,
            binding_slot: 1,
            fixed_length: fixed,
            elements_per_texel: ty.elements_per_texel(),
        }
    }

    #[test]
    fn test_fixed_length_mismatch_rejected() {
        let descriptor = array_descriptor(Some(8), Type::F32);
        let err = validate_binding(&descriptor, &Binding::Array(vec![0.0; 4])).unwrap_err();
        assert!(matches!(err, RuntimeError::Binding(_)));
        assert!(validate_binding(&descriptor, &Binding::Array(vec![0.0; 8])).is_ok());
    }

    #[test]
    fn test_vector_array_counts_elements_not_floats() {
        let descriptor = array_descriptor(Some(2), Type::Vec4);
        assert!(validate_binding(&descriptor, &Binding::Array(vec![0.0; 8])).is_ok());
        assert!(validate_binding(&descriptor, &Binding::Array(vec![0.0; 7])).is_err());
    }

    #[test]
    fn test_scalar_type_checked() {
        let descriptor = UniformDescriptor {
            name: "alpha".to_string(),
            ty: Type::F32,
            is_array: false,
            readonly: true,
            writeonly: false,
            binding_slot: 0,
            fixed_length: None,
            elements_per_texel: 1,
        };
        assert!(validate_binding(&descriptor, &Binding::Float(1.0)).is_ok());
        assert!(validate_binding(&descriptor, &Binding::Uint(1)).is_err());
        assert!(validate_binding(&descriptor, &Binding::Array(vec![1.0])).is_err());
    }

    #[test]
    fn test_runtime_error_display() {
        let err = RuntimeError::Binding("unknown binding 'x'".to_string());
        assert_eq!(err.to_string(), "binding error: unknown binding 'x'");
        assert_eq!(RuntimeError::Destroyed.to_string(), "kernel used after destroy()");
    }
}
