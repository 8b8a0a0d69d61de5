//! Decoded PBR texture sets

use image::{imageops, RgbaImage};

/// Semantic role of one map in a PBR set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapRole {
    Albedo,
    Normal,
    Roughness,
    AmbientOcclusion,
}

impl MapRole {
    /// All roles in binding order
    pub const ALL: [MapRole; 4] = [
        MapRole::Albedo,
        MapRole::Normal,
        MapRole::Roughness,
        MapRole::AmbientOcclusion,
    ];

    /// Key used by the synthesis transport
    pub fn key(self) -> &'static str {
        match self {
            MapRole::Albedo => "albedo",
            MapRole::Normal => "normal",
            MapRole::Roughness => "roughness",
            MapRole::AmbientOcclusion => "ao",
        }
    }

    /// Albedo holds color and is stored sRGB-encoded; the other maps are data
    pub fn is_srgb(self) -> bool {
        matches!(self, MapRole::Albedo)
    }
}

/// Four decoded maps that are always applied together
///
/// Sizes may differ between maps; each one is sampled independently.
#[derive(Debug, Clone, PartialEq)]
pub struct PbrMapSet {
    pub albedo: RgbaImage,
    pub normal: RgbaImage,
    pub roughness: RgbaImage,
    pub ao: RgbaImage,
}

impl PbrMapSet {
    pub fn get(&self, role: MapRole) -> &RgbaImage {
        match role {
            MapRole::Albedo => &self.albedo,
            MapRole::Normal => &self.normal,
            MapRole::Roughness => &self.roughness,
            MapRole::AmbientOcclusion => &self.ao,
        }
    }

    /// Downscales every map whose longer side exceeds `max`, keeping aspect
    ///
    /// Returns the roles that were resized.
    pub fn fit_within(&mut self, max: u32) -> Vec<MapRole> {
        let mut resized = Vec::new();
        for (role, map) in [
            (MapRole::Albedo, &mut self.albedo),
            (MapRole::Normal, &mut self.normal),
            (MapRole::Roughness, &mut self.roughness),
            (MapRole::AmbientOcclusion, &mut self.ao),
        ] {
            let (width, height) = map.dimensions();
            let longest = width.max(height);
            if longest <= max {
                continue;
            }
            let scale = |side: u32| ((side as u64 * max as u64) / longest as u64).max(1) as u32;
            *map = imageops::resize(&*map, scale(width), scale(height), imageops::FilterType::Triangle);
            resized.push(role);
        }
        resized
    }

    /// Maps paired with their roles in binding order
    pub fn iter(&self) -> impl Iterator<Item = (MapRole, &RgbaImage)> {
        MapRole::ALL.into_iter().map(move |role| (role, self.get(role)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(albedo: (u32, u32)) -> PbrMapSet {
        PbrMapSet {
            albedo: RgbaImage::new(albedo.0, albedo.1),
            normal: RgbaImage::new(4, 4),
            roughness: RgbaImage::new(4, 4),
            ao: RgbaImage::new(4, 4),
        }
    }

    #[test]
    fn test_fit_within_shrinks_only_oversized_maps() {
        let mut maps = set((64, 16));
        assert_eq!(maps.fit_within(32), vec![MapRole::Albedo]);
        assert_eq!(maps.albedo.dimensions(), (32, 8));
        assert_eq!(maps.normal.dimensions(), (4, 4));

        assert!(maps.fit_within(32).is_empty());
    }

    #[test]
    fn test_fit_within_keeps_thin_maps_visible() {
        let mut maps = set((100, 1));
        maps.fit_within(10);
        assert_eq!(maps.albedo.dimensions(), (10, 1));
    }
}
