//! SPIR-V loading and shader modules.

use crate::error::{GpuError, Result, VkResultExt};
use ash::vk;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

/// Read a compiled shader into SPIR-V words.
///
/// The file is treated as opaque bytes; `ash::util::read_spv` checks the
/// length and handles endianness.
pub fn load_spirv(path: impl AsRef<Path>) -> Result<Vec<u32>> {
    let path = path.as_ref();
    let shader_load = |source| GpuError::ShaderLoad {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(shader_load)?;
    let code = read_spirv(file).map_err(shader_load)?;

    tracing::debug!("Loaded {} ({} words)", path.display(), code.len());

    Ok(code)
}

fn read_spirv<R: Read + Seek>(mut reader: R) -> std::io::Result<Vec<u32>> {
    ash::util::read_spv(&mut reader)
}

/// Create a shader module from SPIR-V words.
///
/// # Safety
/// The device must be valid and `code` must be valid SPIR-V.
pub unsafe fn create_shader_module(device: &ash::Device, code: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(code);
    unsafe { device.create_shader_module(&create_info, None) }.fatal("create shader module")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn words_are_read_little_endian() {
        let mut bytes = Vec::new();
        for word in [SPIRV_MAGIC, 0x0001_0000, 7, 42] {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        let words = read_spirv(Cursor::new(bytes)).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0000, 7, 42]);
    }

    #[test]
    fn truncated_binary_is_rejected() {
        let bytes = vec![0x03, 0x02, 0x23, 0x07, 0x00];
        assert!(read_spirv(Cursor::new(bytes)).is_err());
    }

    #[test]
    fn missing_file_is_a_shader_load_error() {
        let path = std::env::temp_dir().join("corvus-missing-shader.spv");
        let err = load_spirv(&path).unwrap_err();
        match err {
            GpuError::ShaderLoad { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn file_round_trip() {
        let path = std::env::temp_dir().join(format!("corvus-shader-{}.spv", std::process::id()));
        let mut bytes = Vec::new();
        for word in [SPIRV_MAGIC, 0x0001_0300, 0, 12, 0] {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        std::fs::write(&path, &bytes).unwrap();

        let words = load_spirv(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(words.len(), 5);
        assert_eq!(words[0], SPIRV_MAGIC);
    }
}
