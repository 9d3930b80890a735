//! Built-in shaders for the Corvus viewport.
//!
//! GLSL sources live in `shaders/` and are compiled to SPIR-V at build time
//! with naga, so the default pipeline needs no files on disk at runtime.

use std::sync::OnceLock;

/// Embedded SPIR-V shader bytecode (raw bytes, may not be aligned).
mod spirv_bytes {
    /// Position/color pass-through vertex shader.
    pub static SIMPLE_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/simple_shader_vert.spv"));

    /// Interpolated color fragment shader.
    pub static SIMPLE_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/simple_shader_frag.spv"));
}

/// Convert byte slice to aligned u32 Vec (SPIR-V requires 4-byte alignment).
fn bytes_to_spirv(bytes: &[u8]) -> Vec<u32> {
    assert!(
        bytes.len() % 4 == 0,
        "SPIR-V bytecode must be 4-byte aligned"
    );
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

static SIMPLE_VERT_SPIRV: OnceLock<Vec<u32>> = OnceLock::new();
static SIMPLE_FRAG_SPIRV: OnceLock<Vec<u32>> = OnceLock::new();

/// Vertex shader for the default mesh pipeline.
///
/// Reads `Vertex` position (location 0) and color (location 1).
pub fn simple_vertex_shader() -> &'static [u32] {
    SIMPLE_VERT_SPIRV.get_or_init(|| bytes_to_spirv(spirv_bytes::SIMPLE_VERT))
}

/// Fragment shader for the default mesh pipeline.
pub fn simple_fragment_shader() -> &'static [u32] {
    SIMPLE_FRAG_SPIRV.get_or_init(|| bytes_to_spirv(spirv_bytes::SIMPLE_FRAG))
}
