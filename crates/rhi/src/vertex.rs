//! Vertex layout shared by meshes and the default pipeline.

use std::mem::{offset_of, size_of};

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};

/// Mesh vertex: position, normal, texture coordinate and per-vertex color.
///
/// The color comes last so the 16-byte aligned `Vec4` starts at offset 32
/// and the struct has no padding.
///
/// Tint, texture index and tiling are per draw and live in the object
/// buffer, not here.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub tex_coord: Vec2,
    pub color: Vec4,
}

impl Vertex {
    #[inline]
    pub const fn new(position: Vec3, normal: Vec3, color: Vec4, tex_coord: Vec2) -> Self {
        Self {
            position,
            normal,
            tex_coord,
            color,
        }
    }

    /// Binding 0, advanced per vertex.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Locations 0..=3 in field order.
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 4] {
        let attribute = |location, format, offset: usize| vk::VertexInputAttributeDescription {
            binding: 0,
            location,
            format,
            offset: offset as u32,
        };
        [
            attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, position)),
            attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, normal)),
            attribute(2, vk::Format::R32G32_SFLOAT, offset_of!(Self, tex_coord)),
            attribute(3, vk::Format::R32G32B32A32_SFLOAT, offset_of!(Self, color)),
        ]
    }
}

/// Vertices and indices of a unit quad facing +Z, for sprites and tests.
pub fn unit_quad(color: Vec4) -> ([Vertex; 4], [u32; 6]) {
    let normal = Vec3::Z;
    let vertices = [
        Vertex::new(Vec3::new(-0.5, -0.5, 0.0), normal, color, Vec2::new(0.0, 1.0)),
        Vertex::new(Vec3::new(0.5, -0.5, 0.0), normal, color, Vec2::new(1.0, 1.0)),
        Vertex::new(Vec3::new(0.5, 0.5, 0.0), normal, color, Vec2::new(1.0, 0.0)),
        Vertex::new(Vec3::new(-0.5, 0.5, 0.0), normal, color, Vec2::new(0.0, 0.0)),
    ];
    (vertices, [0, 1, 2, 2, 3, 0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_size() {
        // 3 + 3 + 2 + 4 floats
        assert_eq!(size_of::<Vertex>(), 48);
        assert_eq!(Vertex::binding_description().stride, 48);
    }

    #[test]
    fn test_attribute_offsets() {
        let attrs = Vertex::attribute_descriptions();
        let offsets: Vec<u32> = attrs.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24, 32]);
        assert_eq!(attrs[2].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(attrs[3].format, vk::Format::R32G32B32A32_SFLOAT);
        assert_eq!(offset_of!(Vertex, color) % 16, 0);
        assert!(attrs.iter().enumerate().all(|(i, a)| a.location == i as u32));
    }

    #[test]
    fn test_unit_quad_is_counter_clockwise() {
        let (vertices, indices) = unit_quad(Vec4::ONE);
        let [a, b, c] = [0, 1, 2].map(|i| vertices[indices[i] as usize].position);
        assert!((b - a).cross(c - a).z > 0.0);
        assert_eq!(bytemuck::cast_slice::<Vertex, u8>(&vertices).len(), 4 * 48);
    }
}
