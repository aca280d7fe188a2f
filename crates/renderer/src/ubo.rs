//! Uniform and storage buffer structures shared with the shaders.
//!
//! These structures must match the GLSL `std140`/`std430` blocks exactly.
//! All structures use `#[repr(C)]` for predictable memory layout and implement
//! `Pod` and `Zeroable` for safe byte casting.
//!
//! | Set | Binding | Block | Type |
//! |-----|---------|-------|------|
//! | 0 | 0 | [`CameraUniform`] | dynamic uniform buffer |
//! | 0 | 1 | [`SceneUniform`] | dynamic uniform buffer |
//! | 1 | 0 | `ObjectUniform[]` | dynamic storage buffer |
//! | 2 | 0 | sampler | sampler |
//! | 2 | 1 | `texture2D[max_texture_slots]` | sampled images |

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

/// Camera uniform data (set 0, binding 0).
///
/// # Memory Layout
///
/// - Offset 0: view matrix (64 bytes)
/// - Offset 64: projection matrix (64 bytes)
/// - Offset 128: view-projection matrix (64 bytes)
/// - Total size: 192 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct CameraUniform {
    /// View matrix (world to view space).
    pub view: Mat4,
    /// Projection matrix with the Y axis flipped for Vulkan clip space.
    pub projection: Mat4,
    /// Combined `projection * view`.
    pub view_projection: Mat4,
}

impl CameraUniform {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Creates camera data from a right-handed, Y-up projection.
    ///
    /// Vulkan clip space points Y down, so the projection's Y scale is
    /// negated here and the viewport keeps a positive height.
    pub fn new(view: Mat4, projection: Mat4) -> Self {
        let projection = flip_projection_y(projection);
        Self {
            view,
            projection,
            view_projection: projection * view,
        }
    }
}

/// Negates the Y row of a projection matrix.
#[inline]
pub fn flip_projection_y(mut projection: Mat4) -> Mat4 {
    projection.y_axis.y = -projection.y_axis.y;
    projection
}

/// Scene lighting data (set 0, binding 1).
///
/// # Memory Layout
///
/// - Offset 0: ambient color, `w` is intensity (16 bytes)
/// - Offset 16: light direction, `w` unused (16 bytes)
/// - Offset 32: light color, `w` is intensity (16 bytes)
/// - Total size: 48 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct SceneUniform {
    pub ambient_color: Vec4,
    pub light_direction: Vec4,
    pub light_color: Vec4,
}

impl SceneUniform {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Creates scene data with a normalized light direction.
    pub fn new(ambient_color: Vec4, light_direction: Vec3, light_color: Vec4) -> Self {
        Self {
            ambient_color,
            light_direction: light_direction.normalize_or_zero().extend(0.0),
            light_color,
        }
    }
}

impl Default for SceneUniform {
    fn default() -> Self {
        Self::new(
            Vec4::new(1.0, 1.0, 1.0, 0.1),
            Vec3::new(0.0, -1.0, -1.0),
            Vec4::ONE,
        )
    }
}

/// Per-draw data (set 1, binding 0), indexed by `gl_InstanceIndex`.
///
/// # Memory Layout
///
/// - Offset 0: tint color (16 bytes)
/// - Offset 16: texture slot, `-1` for untextured (4 bytes)
/// - Offset 20: tiling factor (4 bytes)
/// - Offset 24: padding (8 bytes)
/// - Total size: 32 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ObjectUniform {
    pub tint: Vec4,
    pub texture_index: i32,
    pub tiling: f32,
    pub _padding: [f32; 2],
}

impl ObjectUniform {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Texture index the shader treats as "sample nothing".
    pub const NO_TEXTURE: i32 = -1;

    pub fn new(tint: Vec4, texture_index: Option<u32>, tiling: f32) -> Self {
        Self {
            tint,
            texture_index: texture_index.map_or(Self::NO_TEXTURE, |i| i as i32),
            tiling,
            _padding: [0.0; 2],
        }
    }
}

impl Default for ObjectUniform {
    fn default() -> Self {
        Self::new(Vec4::ONE, None, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_uniform_size() {
        // 3 Mat4 (3 * 64) = 192 bytes
        assert_eq!(CameraUniform::SIZE, 192);
        assert_eq!(std::mem::align_of::<CameraUniform>(), 16);
    }

    #[test]
    fn test_scene_uniform_size() {
        assert_eq!(SceneUniform::SIZE, 48);
    }

    #[test]
    fn test_object_uniform_size() {
        // std430 array stride of a struct holding a vec4
        assert_eq!(ObjectUniform::SIZE, 32);
        assert_eq!(ObjectUniform::SIZE % 16, 0);
    }

    #[test]
    fn test_camera_uniform_flips_y() {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let projection = Mat4::perspective_rh(45.0_f32.to_radians(), 16.0 / 9.0, 0.1, 1000.0);

        let camera = CameraUniform::new(view, projection);

        assert_eq!(camera.view, view);
        assert_eq!(camera.projection.y_axis.y, -projection.y_axis.y);
        assert_eq!(camera.projection.x_axis, projection.x_axis);
        assert_eq!(camera.view_projection, camera.projection * view);
    }

    #[test]
    fn test_flipped_projection_maps_up_to_negative_clip_y() {
        let projection = flip_projection_y(Mat4::orthographic_rh(-1.0, 1.0, -1.0, 1.0, 0.0, 1.0));
        let clip = projection * Vec4::new(0.0, 1.0, -0.5, 1.0);
        assert!(clip.y < 0.0);
    }

    #[test]
    fn test_scene_uniform_normalizes_direction() {
        let scene = SceneUniform::new(Vec4::ZERO, Vec3::new(0.0, -4.0, 0.0), Vec4::ONE);
        assert_eq!(scene.light_direction, Vec4::new(0.0, -1.0, 0.0, 0.0));
        assert_eq!(SceneUniform::default().ambient_color.w, 0.1);
    }

    #[test]
    fn test_object_uniform_texture_index() {
        assert_eq!(ObjectUniform::new(Vec4::ONE, Some(3), 2.0).texture_index, 3);
        assert_eq!(ObjectUniform::default().texture_index, ObjectUniform::NO_TEXTURE);
    }

    #[test]
    fn test_uniform_pod_zeroable() {
        let camera = CameraUniform::default();
        assert_eq!(bytemuck::bytes_of(&camera).len(), CameraUniform::SIZE);

        let objects = [ObjectUniform::default(); 4];
        assert_eq!(bytemuck::cast_slice::<_, u8>(&objects).len(), 4 * ObjectUniform::SIZE);
    }
}
