//! Encoded PBR maps as delivered by a synthesizer

use std::collections::BTreeMap;

use crate::{
    error::MaterialError,
    gfx::resources::pbr_maps::{MapRole, PbrMapSet},
};

/// Encoded images (PNG, JPEG, ...) keyed by role name
///
/// Keys follow [`MapRole::key`]: `albedo`, `normal`, `roughness`, `ao`.
/// Unknown keys are kept but ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedMapSet {
    maps: BTreeMap<String, Vec<u8>>,
}

impl EncodedMapSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, bytes: Vec<u8>) {
        self.maps.insert(key.into(), bytes);
    }

    pub fn with(mut self, role: MapRole, bytes: Vec<u8>) -> Self {
        self.insert(role.key(), bytes);
        self
    }

    pub fn get(&self, role: MapRole) -> Option<&[u8]> {
        self.maps.get(role.key()).map(Vec::as_slice)
    }

    pub fn remove(&mut self, role: MapRole) -> Option<Vec<u8>> {
        self.maps.remove(role.key())
    }

    /// First role without an image, in binding order
    pub fn missing_role(&self) -> Option<MapRole> {
        MapRole::ALL.into_iter().find(|role| self.get(*role).is_none())
    }

    /// Decodes all four maps, or none
    pub fn decode(&self) -> Result<PbrMapSet, MaterialError> {
        if let Some(role) = self.missing_role() {
            return Err(MaterialError::MissingMap(role.key()));
        }
        let decode = |role: MapRole| {
            let bytes = self.get(role).ok_or(MaterialError::MissingMap(role.key()))?;
            image::load_from_memory(bytes)
                .map(|image| image.to_rgba8())
                .map_err(|e| MaterialError::Decode {
                    role: role.key(),
                    reason: e.to_string(),
                })
        };
        Ok(PbrMapSet {
            albedo: decode(MapRole::Albedo)?,
            normal: decode(MapRole::Normal)?,
            roughness: decode(MapRole::Roughness)?,
            ao: decode(MapRole::AmbientOcclusion)?,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::{fixtures::*, *};

    #[test]
    fn test_decode_full_set() {
        let maps = full_set().decode().unwrap();
        assert_eq!(maps.albedo.get_pixel(0, 0).0, [200, 120, 80, 255]);
        assert_eq!(maps.ao.dimensions(), (4, 4));
    }

    #[test]
    fn test_missing_role() {
        let mut set = full_set();
        set.remove(MapRole::Roughness);
        assert_eq!(set.missing_role(), Some(MapRole::Roughness));
        assert_eq!(set.decode(), Err(MaterialError::MissingMap("roughness")));
    }

    #[test]
    fn test_corrupt_image() {
        let mut set = full_set();
        set.insert("normal", b"not an image".to_vec());
        assert!(matches!(
            set.decode(),
            Err(MaterialError::Decode { role: "normal", .. })
        ));
    }
}
