//! Shader module management.
//!
//! Shaders arrive as compiled SPIR-V; compilation and reflection happen
//! outside the renderer. A file that cannot be read or is not SPIR-V is
//! reported as [`RhiError::ShaderError`] so the caller can keep running
//! without the pipeline that needed it.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::path::Path;
//! use renderer_rhi::device::Device;
//! use renderer_rhi::shader::{Shader, ShaderStage};
//!
//! # fn example(device: Arc<Device>) -> Result<(), renderer_rhi::RhiError> {
//! let vertex_shader = Shader::from_spirv_file(
//!     device.clone(),
//!     Path::new("shaders/textured.vert.spv"),
//!     ShaderStage::Vertex,
//!     "main",
//! )?;
//! let _stage = vertex_shader.stage_create_info();
//! # Ok(())
//! # }
//! ```

use std::ffi::{CStr, CString};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// First word of every SPIR-V module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Shader stage type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    /// Converts to Vulkan shader stage flags.
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    /// Returns a human-readable name for the stage.
    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Decodes SPIR-V bytes into code words.
///
/// Big-endian modules are byte-swapped by `ash::util::read_spv`.
///
/// # Errors
///
/// Returns [`RhiError::ShaderError`] for a length that is not a multiple of
/// four, an empty module, or a missing magic number.
pub fn spirv_words(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    let words = ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| RhiError::ShaderError(format!("Invalid SPIR-V: {}", e)))?;
    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(&word) => Err(RhiError::ShaderError(format!(
            "Invalid SPIR-V magic number {:#010x}",
            word
        ))),
        None => Err(RhiError::ShaderError("Empty SPIR-V module".to_string())),
    }
}

/// Shader module wrapper.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
    entry_point: CString,
}

impl Shader {
    /// Loads a shader from a SPIR-V file.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ShaderError`] if the file cannot be read or is
    /// not valid SPIR-V, or the Vulkan error if module creation fails.
    pub fn from_spirv_file(
        device: Arc<Device>,
        path: &Path,
        stage: ShaderStage,
        entry_point: &str,
    ) -> RhiResult<Self> {
        debug!("Loading {} shader from {:?}", stage, path);

        let bytes = std::fs::read(path).map_err(|e| {
            RhiError::ShaderError(format!("Failed to read shader file {:?}: {}", path, e))
        })?;

        Self::from_spirv_bytes(device, &bytes, stage, entry_point)
    }

    /// Creates a shader from SPIR-V bytes.
    ///
    /// # Errors
    ///
    /// Same as [`from_spirv_file`](Self::from_spirv_file), minus the read.
    pub fn from_spirv_bytes(
        device: Arc<Device>,
        bytes: &[u8],
        stage: ShaderStage,
        entry_point: &str,
    ) -> RhiResult<Self> {
        let code = spirv_words(bytes)?;
        let entry_point = CString::new(entry_point)
            .map_err(|e| RhiError::ShaderError(format!("Invalid entry point name: {}", e)))?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        info!(
            "Created {} shader module ({} words, entry '{}')",
            stage,
            code.len(),
            entry_point.to_string_lossy()
        );

        Ok(Self {
            device,
            module,
            stage,
            entry_point,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    #[inline]
    pub fn entry_point(&self) -> &CStr {
        &self.entry_point
    }

    /// Stage description for pipeline creation.
    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(&self.entry_point)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None);
        }
        debug!("Destroyed {} shader module", self.stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn test_spirv_words_accepts_magic() {
        let bytes = module_bytes(&[SPIRV_MAGIC, 0x0001_0600, 0, 1, 0]);
        let words = spirv_words(&bytes).unwrap();
        assert_eq!(words.len(), 5);
        assert_eq!(words[0], SPIRV_MAGIC);
    }

    #[test]
    fn test_spirv_words_rejects_unaligned() {
        let mut bytes = module_bytes(&[SPIRV_MAGIC]);
        bytes.push(0);
        assert!(matches!(spirv_words(&bytes), Err(RhiError::ShaderError(_))));
    }

    #[test]
    fn test_spirv_words_rejects_text() {
        let err = spirv_words(b"#version 450").unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_spirv_words_rejects_empty() {
        assert!(matches!(spirv_words(&[]), Err(RhiError::ShaderError(_))));
    }

    #[test]
    fn test_shader_stage_to_vk_stage() {
        assert_eq!(ShaderStage::Vertex.to_vk_stage(), vk::ShaderStageFlags::VERTEX);
        assert_eq!(
            ShaderStage::Fragment.to_vk_stage(),
            vk::ShaderStageFlags::FRAGMENT
        );
        assert_eq!(format!("{}", ShaderStage::Fragment), "fragment");
    }
}
