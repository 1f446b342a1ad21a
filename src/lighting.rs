use glam::Vec3;

/// Converts a `0xRRGGBB` sRGB color to linear RGB.
pub fn color_from_hex(hex: u32) -> Vec3 {
    let channel = |shift: u32| {
        let srgb = ((hex >> shift) & 0xff) as f32 / 255.0;
        if srgb <= 0.04045 {
            srgb / 12.92
        } else {
            ((srgb + 0.055) / 1.055).powf(2.4)
        }
    };

    Vec3::new(channel(16), channel(8), channel(0))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientLight {
    pub color: Vec3,
    pub intensity: f32,
}

/// Light shining from `position` towards the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub color: Vec3,
    pub intensity: f32,
    pub position: Vec3,
}

impl DirectionalLight {
    /// Unit vector pointing from the lit surface towards the light.
    pub fn direction_to_light(&self) -> Vec3 {
        self.position.normalize_or(Vec3::Y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lighting {
    pub ambient: AmbientLight,
    pub directional: DirectionalLight,
}

impl Default for Lighting {
    fn default() -> Self {
        Self {
            ambient: AmbientLight {
                color: color_from_hex(0xffffff),
                intensity: 0.5,
            },
            directional: DirectionalLight {
                color: color_from_hex(0xffffff),
                intensity: 0.6,
                position: Vec3::new(0.5, 1.0, -1.5),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_colors_are_linearized() {
        assert!(color_from_hex(0xffffff).abs_diff_eq(Vec3::ONE, 1e-6));
        assert_eq!(color_from_hex(0x000000), Vec3::ZERO);

        let gray = color_from_hex(0x404040);
        assert!((gray.x - 0.0513).abs() < 1e-3);
        assert_eq!(gray.x, gray.y);
        assert!(color_from_hex(0xff0000).abs_diff_eq(Vec3::X, 1e-6));
    }

    #[test]
    fn directional_light_points_back_at_its_position() {
        let lighting = Lighting::default();

        let direction = lighting.directional.direction_to_light();

        assert!((direction.length() - 1.0).abs() < 1e-6);
        assert!(direction.abs_diff_eq(Vec3::new(0.5, 1.0, -1.5).normalize(), 1e-6));
    }
}
