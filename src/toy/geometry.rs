//! Telescope geometry: parallel detector planes along `z`

use crate::gsf::types::{Surface, SurfaceKind};

/// Parallel planes at fixed `z`, plus an optional calorimeter plane
///
/// Detector surface `i` is the plane at `planes[i]`; the calorimeter, when
/// present, has id `planes.len()`.
#[derive(Debug, Clone, PartialEq)]
pub struct TelescopeGeometry {
    planes: Vec<f64>,
    /// Thickness of each plane in radiation lengths
    thickness: f64,
    calorimeter_z: Option<f64>,
}

impl TelescopeGeometry {
    /// Create a geometry from explicit plane positions (mm)
    pub fn new(planes: Vec<f64>) -> Self {
        Self {
            planes,
            thickness: 0.0,
            calorimeter_z: None,
        }
    }

    /// `n` equally spaced planes starting at `first_z`
    pub fn uniform(n: usize, first_z: f64, spacing: f64) -> Self {
        Self::new((0..n).map(|i| first_z + spacing * i as f64).collect())
    }

    /// Set the plane thickness in radiation lengths
    pub fn with_material(mut self, thickness: f64) -> Self {
        self.thickness = thickness;
        self
    }

    pub fn with_calorimeter(mut self, z: f64) -> Self {
        self.calorimeter_z = Some(z);
        self
    }

    pub fn num_planes(&self) -> usize {
        self.planes.len()
    }

    #[inline]
    pub fn thickness(&self) -> f64 {
        self.thickness
    }

    /// Surface of plane `index`
    pub fn detector(&self, index: usize) -> Surface {
        Surface::detector(index as u32)
    }

    /// All detector surfaces, innermost first
    pub fn detectors(&self) -> Vec<Surface> {
        (0..self.planes.len()).map(|i| self.detector(i)).collect()
    }

    /// Calorimeter surface, if configured
    pub fn calorimeter(&self) -> Option<Surface> {
        self.calorimeter_z
            .map(|_| Surface::calorimeter(self.planes.len() as u32))
    }

    /// Position of a surface along `z`; `None` for unknown surfaces
    pub fn z_of(&self, surface: &Surface) -> Option<f64> {
        let index = surface.id().0 as usize;
        match surface.kind() {
            SurfaceKind::Perigee => Some(0.0),
            SurfaceKind::Detector => self.planes.get(index).copied(),
            SurfaceKind::Calorimeter => self
                .calorimeter_z
                .filter(|_| index == self.planes.len()),
        }
    }

    /// Material crossed when arriving on `surface`, in radiation lengths
    pub fn material_at(&self, surface: &Surface) -> f64 {
        match surface.kind() {
            SurfaceKind::Detector => self.thickness,
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_lookup() {
        let geometry = TelescopeGeometry::uniform(4, 50.0, 25.0).with_calorimeter(500.0);
        assert_eq!(geometry.z_of(&geometry.detector(0)), Some(50.0));
        assert_eq!(geometry.z_of(&geometry.detector(3)), Some(125.0));
        assert_eq!(geometry.z_of(&Surface::detector(4)), None);
        assert_eq!(geometry.z_of(&Surface::perigee()), Some(0.0));

        let calo = geometry.calorimeter().unwrap();
        assert_eq!(geometry.z_of(&calo), Some(500.0));
        assert_eq!(geometry.z_of(&Surface::calorimeter(9)), None);
    }

    #[test]
    fn test_material_only_on_planes() {
        let geometry = TelescopeGeometry::uniform(2, 50.0, 50.0).with_material(0.02);
        assert_eq!(geometry.material_at(&geometry.detector(1)), 0.02);
        assert_eq!(geometry.material_at(&Surface::perigee()), 0.0);
    }
}
