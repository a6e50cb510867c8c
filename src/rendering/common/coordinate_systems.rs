use glam::{Mat4, Vec2, Vec3, Vec4};

/// Authoring data is LH, Up: +Y, Forward: +Z. The renderer is RH, Up: +Y, Forward: -Z.
/// Converting in either direction flips the Z axis.
#[inline]
pub fn authoring_to_render(source: Vec3) -> Vec3 {
    Vec3::new(source.x, source.y, -source.z)
}

/// Tangents keep their handedness sign in w.
#[inline]
pub fn authoring_to_render_tangent(source: Vec4) -> Vec4 {
    Vec4::new(source.x, source.y, -source.z, source.w)
}

/// Conjugates the matrix with the Z flip, i.e. `S * M * S` with `S = diag(1, 1, -1, 1)`.
#[inline]
pub fn authoring_to_render_matrix(source: Mat4) -> Mat4 {
    let mut result = source;
    result.x_axis.z = -result.x_axis.z;
    result.y_axis.z = -result.y_axis.z;
    result.z_axis.x = -result.z_axis.x;
    result.z_axis.y = -result.z_axis.y;
    result.z_axis.w = -result.z_axis.w;
    result.w_axis.z = -result.w_axis.z;
    result
}

/// Texture space has its origin at the top left for the renderer, at the bottom left for the authoring tool.
#[inline]
pub fn authoring_to_render_uv(source: Vec2) -> Vec2 {
    Vec2::new(source.x, 1.0 - source.y)
}

#[inline]
pub fn authoring_to_render_uv3(source: Vec3) -> Vec3 {
    Vec3::new(source.x, 1.0 - source.y, source.z)
}

#[inline]
pub fn authoring_to_render_uv4(source: Vec4) -> Vec4 {
    Vec4::new(source.x, 1.0 - source.y, source.z, source.w)
}

/// Mirroring an axis inverts the front face, so triangles need their winding reversed.
#[inline]
pub fn flip_winding([i0, i1, i2]: [u32; 3]) -> [u32; 3] {
    [i0, i2, i1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    #[test]
    pub fn matrix_conversion_matches_point_conversion() {
        let transform = Mat4::from_scale_rotation_translation(
            Vec3::new(1.0, 2.0, 0.5),
            Quat::from_euler(glam::EulerRot::XYZ, 0.3, -0.7, 1.1),
            Vec3::new(3.0, -1.0, 4.0),
        );
        let point = Vec3::new(0.25, -2.0, 1.5);

        let converted_then_transformed =
            authoring_to_render_matrix(transform).transform_point3(authoring_to_render(point));
        let transformed_then_converted = authoring_to_render(transform.transform_point3(point));

        assert!(converted_then_transformed.abs_diff_eq(transformed_then_converted, 1e-5));
    }

    #[test]
    pub fn conversion_is_an_involution() {
        let transform = Mat4::from_rotation_y(0.8) * Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        assert!(authoring_to_render_matrix(authoring_to_render_matrix(transform)).abs_diff_eq(transform, 1e-6));
        assert!(authoring_to_render_uv(authoring_to_render_uv(Vec2::new(0.2, 0.3))).abs_diff_eq(Vec2::new(0.2, 0.3), 1e-6));
    }

    #[test]
    pub fn winding_is_reversed() {
        assert_eq!(flip_winding([4, 5, 6]), [4, 6, 5]);
    }
}
