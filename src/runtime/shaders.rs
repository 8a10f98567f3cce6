//! Constant shader sources for the texture compute model.

/// Fullscreen-triangle vertex stage paired with every generated fragment
/// pass. Three vertices cover the whole render target; the fragment stage
/// derives the thread id from its pixel position, so no varyings are needed.
pub const FULLSCREEN_VERTEX: &str = r#"
@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {
    let x = f32(i32(index) / 2) * 4.0 - 1.0;
    let y = f32(i32(index) % 2) * 4.0 - 1.0;
    return vec4<f32>(x, y, 0.0, 1.0);
}
"#;
