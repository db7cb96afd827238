use anyhow::Result;
use geo::{coord, Geometry, LineString, Polygon, Rect};
#[cfg(feature = "proj")]
use anyhow::Context;
#[cfg(feature = "proj")]
use geo::MapCoords;
#[cfg(feature = "proj")]
use proj::Proj;

use crate::collect::global_variables::DEFAULT_EPSG;
use crate::error::HdError;

/// Base struct for geospatial operations
/// Handles CRS (Coordinate Reference System) and bounding box
#[derive(Debug, Clone)]
pub struct GeoCore {
    /// EPSG code of the working CRS
    pub epsg: i32,
    /// Bounding box in the working CRS
    pub bbox: Option<BoundingBox>,
}

impl Default for GeoCore {
    /// Defaults to EPSG:3034 (ETRS89 / LCC Europe), the CRS of the NWE maps
    fn default() -> Self {
        GeoCore::new(DEFAULT_EPSG)
    }
}

impl GeoCore {
    pub fn new(epsg: i32) -> Self {
        GeoCore {
            epsg,
            bbox: None,
        }
    }

    pub fn get_epsg(&self) -> i32 {
        self.epsg
    }

    pub fn set_epsg(&mut self, epsg: i32) {
        self.epsg = epsg;
    }

    pub fn get_bbox(&self) -> Option<BoundingBox> {
        self.bbox
    }

    pub fn set_bbox(&mut self, bbox: Option<BoundingBox>) {
        self.bbox = bbox;
    }

    /// Transform coordinates from one CRS to another
    #[cfg(feature = "proj")]
    pub fn transform_coords(from_epsg: i32, to_epsg: i32, x: f64, y: f64) -> Result<(f64, f64)> {
        if from_epsg == to_epsg {
            return Ok((x, y));
        }
        let proj = Self::get_proj(from_epsg, to_epsg)?;
        let result = proj
            .convert((x, y))
            .context("Failed to transform coordinates")?;
        Ok(result)
    }

    /// Transform coordinates from one CRS to another
    #[cfg(not(feature = "proj"))]
    pub fn transform_coords(from_epsg: i32, to_epsg: i32, x: f64, y: f64) -> Result<(f64, f64)> {
        if from_epsg == to_epsg {
            return Ok((x, y));
        }
        Err(HdError::ReprojectionUnavailable {
            from: from_epsg,
            to: to_epsg,
        }
        .into())
    }

    /// Reproject a whole geometry; a no-op when both codes are equal
    #[cfg(feature = "proj")]
    pub fn reproject_geometry(
        from_epsg: i32,
        to_epsg: i32,
        geometry: &Geometry<f64>,
    ) -> Result<Geometry<f64>> {
        if from_epsg == to_epsg {
            return Ok(geometry.clone());
        }
        let proj = Self::get_proj(from_epsg, to_epsg)?;
        let projected = geometry
            .try_map_coords(|c| proj.convert((c.x, c.y)).map(|(x, y)| coord! { x: x, y: y }))
            .context(format!(
                "Failed to reproject geometry from EPSG:{} to EPSG:{}",
                from_epsg, to_epsg
            ))?;
        Ok(projected)
    }

    /// Reproject a whole geometry; a no-op when both codes are equal
    #[cfg(not(feature = "proj"))]
    pub fn reproject_geometry(
        from_epsg: i32,
        to_epsg: i32,
        geometry: &Geometry<f64>,
    ) -> Result<Geometry<f64>> {
        if from_epsg == to_epsg {
            return Ok(geometry.clone());
        }
        Err(HdError::ReprojectionUnavailable {
            from: from_epsg,
            to: to_epsg,
        }
        .into())
    }

    #[cfg(feature = "proj")]
    fn get_proj(from_epsg: i32, to_epsg: i32) -> Result<Proj> {
        let from_crs = format!("EPSG:{}", from_epsg);
        let to_crs = format!("EPSG:{}", to_epsg);
        Proj::new_known_crs(&from_crs, &to_crs, None).context(format!(
            "Failed to create Proj transformation {} -> {}",
            from_crs, to_crs
        ))
    }
}

/// Bounding box structure, in the units of the CRS it was built in
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn from_rect(rect: Rect<f64>) -> Self {
        BoundingBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }

    /// Parse `min_x,min_y,max_x,max_y`
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        match values {
            [min_x, min_y, max_x, max_y] => {
                let bbox = BoundingBox::new(*min_x, *min_y, *max_x, *max_y);
                bbox.validate()?;
                Ok(bbox)
            }
            _ => Err(HdError::InvalidGrid(format!(
                "bounds need 4 values (min_x, min_y, max_x, max_y), got {}",
                values.len()
            ))
            .into()),
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Finite and ordered (degenerate boxes are allowed)
    pub fn validate(&self) -> Result<()> {
        let finite = [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(HdError::InvalidGrid("bounds must be finite".to_string()).into());
        }
        if self.min_x > self.max_x || self.min_y > self.max_y {
            return Err(HdError::InvalidGrid(format!(
                "bounds are not ordered: [{}, {}, {}, {}]",
                self.min_x, self.min_y, self.max_x, self.max_y
            ))
            .into());
        }
        Ok(())
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    /// Snap the lower-left corner down to a multiple of `step`
    pub fn aligned_to(&self, step: f64) -> BoundingBox {
        BoundingBox::new(
            (self.min_x / step).floor() * step,
            (self.min_y / step).floor() * step,
            self.max_x,
            self.max_y,
        )
    }

    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            coord! { x: self.min_x, y: self.min_y },
            coord! { x: self.max_x, y: self.max_y },
        )
    }

    pub fn to_polygon(&self) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                (self.min_x, self.min_y),
                (self.max_x, self.min_y),
                (self.max_x, self.max_y),
                (self.min_x, self.max_y),
                (self.min_x, self.min_y),
            ]),
            vec![],
        )
    }

    /// Transform bounding box to another CRS
    pub fn transform(&self, from_epsg: i32, to_epsg: i32) -> Result<Self> {
        let (min_x, min_y) = GeoCore::transform_coords(from_epsg, to_epsg, self.min_x, self.min_y)?;
        let (max_x, max_y) = GeoCore::transform_coords(from_epsg, to_epsg, self.max_x, self.max_y)?;

        Ok(BoundingBox::new(min_x, min_y, max_x, max_y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Area;

    #[test]
    fn test_geo_core_default() {
        let gc = GeoCore::default();
        assert_eq!(gc.get_epsg(), 3034);
        assert!(gc.get_bbox().is_none());
    }

    #[test]
    fn test_bounding_box() {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 2.0);
        assert_eq!(bbox.width(), 1.0);
        assert_eq!(bbox.height(), 2.0);
        assert!((bbox.to_polygon().unsigned_area() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_bounding_box_from_slice() {
        assert!(BoundingBox::from_slice(&[0.0, 0.0, 10.0, 10.0]).is_ok());
        assert!(BoundingBox::from_slice(&[0.0, 0.0, 10.0]).is_err());
        assert!(BoundingBox::from_slice(&[10.0, 0.0, 0.0, 10.0]).is_err());
        assert!(BoundingBox::from_slice(&[0.0, f64::NAN, 10.0, 10.0]).is_err());
    }

    #[test]
    fn test_union_and_alignment() {
        let a = BoundingBox::new(120.0, 50.0, 300.0, 180.0);
        let b = BoundingBox::new(0.0, 75.0, 250.0, 420.0);
        let u = a.union(&b);
        assert_eq!(u, BoundingBox::new(0.0, 50.0, 300.0, 420.0));

        let aligned = BoundingBox::new(155.0, -30.0, 400.0, 400.0).aligned_to(100.0);
        assert_eq!(aligned.min_x, 100.0);
        assert_eq!(aligned.min_y, -100.0);
        assert_eq!(aligned.max_x, 400.0);
    }

    #[test]
    fn test_same_crs_is_identity() {
        let (x, y) = GeoCore::transform_coords(3034, 3034, 12.5, -3.0).unwrap();
        assert_eq!((x, y), (12.5, -3.0));
        let geom = Geometry::Point(geo::Point::new(1.0, 2.0));
        assert_eq!(GeoCore::reproject_geometry(3035, 3035, &geom).unwrap(), geom);
    }

    #[cfg(not(feature = "proj"))]
    #[test]
    fn test_reprojection_unavailable_without_proj() {
        let err = GeoCore::transform_coords(4326, 3034, 2.0, 48.0).unwrap_err();
        let hd = err.downcast_ref::<HdError>().unwrap();
        assert_eq!(
            *hd,
            HdError::ReprojectionUnavailable {
                from: 4326,
                to: 3034
            }
        );
    }

    #[cfg(feature = "proj")]
    #[test]
    fn test_transform_coords() {
        // Needs PROJ data for EPSG:3034
        let result = GeoCore::transform_coords(4326, 3034, 5.0, 51.0);
        if let Ok((x, y)) = result {
            assert!(x.is_finite());
            assert!(y.is_finite());
        }
    }
}
