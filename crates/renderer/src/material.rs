//! Per-draw surface parameters.

use glam::Vec4;

use crate::ubo::ObjectUniform;

/// Surface parameters of one draw.
///
/// The shader is chosen by the currently bound pipeline; the material only
/// carries the values written into the draw's object entry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Material {
    /// Slot in the active texture array, or `None` for tint only.
    pub texture: Option<u32>,
    pub tint: Vec4,
    /// Texture coordinate scale.
    pub tiling: f32,
}

impl Material {
    /// Untextured material with the given tint.
    pub fn tinted(tint: Vec4) -> Self {
        Self {
            texture: None,
            tint,
            tiling: 1.0,
        }
    }

    /// Material sampling texture slot `index`.
    pub fn textured(index: u32) -> Self {
        Self {
            texture: Some(index),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_tint(mut self, tint: Vec4) -> Self {
        self.tint = tint;
        self
    }

    #[must_use]
    pub fn with_tiling(mut self, tiling: f32) -> Self {
        self.tiling = tiling;
        self
    }

    /// Object entry written for a draw with this material.
    pub fn object_uniform(&self) -> ObjectUniform {
        ObjectUniform::new(self.tint, self.texture, self.tiling)
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::tinted(Vec4::ONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_object_uniform() {
        let material = Material::textured(2)
            .with_tint(Vec4::new(1.0, 0.0, 0.0, 1.0))
            .with_tiling(4.0);
        let object = material.object_uniform();
        assert_eq!(object.texture_index, 2);
        assert_eq!(object.tiling, 4.0);
        assert_eq!(object.tint.x, 1.0);
    }

    #[test]
    fn test_default_material_is_untextured() {
        let object = Material::default().object_uniform();
        assert_eq!(object.texture_index, ObjectUniform::NO_TEXTURE);
        assert_eq!(object.tint, Vec4::ONE);
    }
}
