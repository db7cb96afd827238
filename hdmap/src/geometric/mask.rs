use anyhow::{Context, Result};
use geo::{coord, Polygon, Rect};
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, Value};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, AABB};
use std::ops::Range;
use std::path::Path;
use tracing::info;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::commons::basic_functions::polygon_rect_area;
use crate::error::HdError;
use crate::geo_core::{BoundingBox, GeoCore};

type BoundaryEnvelope = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// Study-area polygons indexed by their envelopes
struct BoundaryIndex {
    tree: RTree<BoundaryEnvelope>,
    polygons: Vec<Polygon<f64>>,
}

impl BoundaryIndex {
    fn new(polygons: Vec<Polygon<f64>>) -> Self {
        use geo::BoundingRect;

        let envelopes: Vec<BoundaryEnvelope> = polygons
            .iter()
            .enumerate()
            .filter_map(|(idx, polygon)| {
                let rect = polygon.bounding_rect()?;
                Some(GeomWithData::new(
                    Rectangle::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                    idx,
                ))
            })
            .collect();

        BoundaryIndex {
            tree: RTree::bulk_load(envelopes),
            polygons,
        }
    }

    /// True when the cell overlaps a study-area polygon with a positive area
    fn overlaps(&self, cell: &Rect<f64>) -> bool {
        let envelope = AABB::from_corners([cell.min().x, cell.min().y], [cell.max().x, cell.max().y]);
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .any(|candidate| polygon_rect_area(&self.polygons[candidate.data], cell) > 0.0)
    }
}

/// One square of the mask
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridCell {
    pub id: usize,
    pub col: usize,
    pub row: usize,
    pub rect: Rect<f64>,
}

/// Regular mask of squares with a fixed stepsize, the common grid every
/// dataset is harmonized onto.
///
/// Column origins are `min_x + i * stepsize` for every value strictly below
/// `max_x` (same for rows), so the last column/row may extend past the
/// bounds. Cell ids are column-major: `id = col * n_rows + row`.
#[derive(Debug, Clone)]
pub struct PolygonMask {
    /// GeoCore holding the CRS and the requested bounds
    pub geo_core: GeoCore,
    pub stepsize: f64,
    pub origin_x: f64,
    pub origin_y: f64,
    pub n_cols: usize,
    pub n_rows: usize,
    /// Per-cell study-area flags, indexed by cell id
    active: Option<Vec<bool>>,
}

/// Create a mask of squares with a defined stepsize over `bounds`
pub fn create_polygon_mask(bounds: &BoundingBox, stepsize: f64, epsg: i32) -> Result<PolygonMask> {
    if !stepsize.is_finite() || stepsize <= 0.0 {
        return Err(HdError::InvalidGrid(format!(
            "stepsize must be a positive number, got {}",
            stepsize
        ))
        .into());
    }
    bounds.validate()?;

    let n_cols = steps(bounds.width(), stepsize);
    let n_rows = steps(bounds.height(), stepsize);
    n_cols.checked_mul(n_rows).ok_or_else(|| {
        HdError::InvalidGrid(format!("{} x {} cells is too large", n_cols, n_rows))
    })?;

    let mut geo_core = GeoCore::new(epsg);
    geo_core.set_bbox(Some(*bounds));

    info!(
        "Created mask of {} x {} cells ({} m) in EPSG:{}",
        n_cols, n_rows, stepsize, epsg
    );

    Ok(PolygonMask {
        geo_core,
        stepsize,
        origin_x: bounds.min_x,
        origin_y: bounds.min_y,
        n_cols,
        n_rows,
        active: None,
    })
}

/// Number of values in `arange(0, extent, step)`
fn steps(extent: f64, step: f64) -> usize {
    if extent <= 0.0 {
        0
    } else {
        (extent / step).ceil() as usize
    }
}

impl PolygonMask {
    pub fn epsg(&self) -> i32 {
        self.geo_core.get_epsg()
    }

    pub fn len(&self) -> usize {
        self.n_cols * self.n_rows
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cell_area_m2(&self) -> f64 {
        self.stepsize * self.stepsize
    }

    pub fn cell_id(&self, col: usize, row: usize) -> usize {
        col * self.n_rows + row
    }

    pub fn col_row(&self, id: usize) -> (usize, usize) {
        (id / self.n_rows, id % self.n_rows)
    }

    pub fn cell_rect(&self, col: usize, row: usize) -> Rect<f64> {
        let x = self.origin_x + col as f64 * self.stepsize;
        let y = self.origin_y + row as f64 * self.stepsize;
        Rect::new(
            coord! { x: x, y: y },
            coord! { x: x + self.stepsize, y: y + self.stepsize },
        )
    }

    pub fn cell(&self, id: usize) -> Option<GridCell> {
        if id >= self.len() {
            return None;
        }
        let (col, row) = self.col_row(id);
        Some(GridCell {
            id,
            col,
            row,
            rect: self.cell_rect(col, row),
        })
    }

    /// All cells in id order
    pub fn cells(&self) -> impl Iterator<Item = GridCell> + '_ {
        (0..self.len()).filter_map(move |id| self.cell(id))
    }

    /// Area actually covered by the cells
    pub fn extent(&self) -> BoundingBox {
        BoundingBox::new(
            self.origin_x,
            self.origin_y,
            self.origin_x + self.n_cols as f64 * self.stepsize,
            self.origin_y + self.n_rows as f64 * self.stepsize,
        )
    }

    /// Cell holding a point. Cells are half-open, `[x0, x0 + step)`, so a
    /// point on a shared edge belongs to the cell on its upper/right side.
    pub fn locate(&self, x: f64, y: f64) -> Option<usize> {
        let col = self.axis_index(x, self.origin_x, self.n_cols)?;
        let row = self.axis_index(y, self.origin_y, self.n_rows)?;
        Some(self.cell_id(col, row))
    }

    fn axis_index(&self, value: f64, origin: f64, count: usize) -> Option<usize> {
        if !value.is_finite() {
            return None;
        }
        let idx = ((value - origin) / self.stepsize).floor();
        if idx < 0.0 || idx >= count as f64 {
            None
        } else {
            Some(idx as usize)
        }
    }

    /// Column and row ranges of the cells touching `rect`
    pub fn cell_range(&self, rect: &Rect<f64>) -> Option<(Range<usize>, Range<usize>)> {
        let cols = Self::clamped_range(
            rect.min().x,
            rect.max().x,
            self.origin_x,
            self.stepsize,
            self.n_cols,
        )?;
        let rows = Self::clamped_range(
            rect.min().y,
            rect.max().y,
            self.origin_y,
            self.stepsize,
            self.n_rows,
        )?;
        Some((cols, rows))
    }

    fn clamped_range(min: f64, max: f64, origin: f64, step: f64, count: usize) -> Option<Range<usize>> {
        if count == 0 || !min.is_finite() || !max.is_finite() {
            return None;
        }
        let first = ((min - origin) / step).floor();
        let last = ((max - origin) / step).floor();
        if last < 0.0 || first >= count as f64 {
            return None;
        }
        let first = first.max(0.0) as usize;
        let last = (last as usize).min(count - 1);
        Some(first..last + 1)
    }

    /// Restrict the mask to the cells overlapping the given study-area polygons.
    /// Every cell is tested once here; later lookups are a flag read.
    pub fn restrict_to_boundary(&mut self, polygons: Vec<Polygon<f64>>) {
        info!("Restricting mask to {} boundary polygons", polygons.len());
        let index = BoundaryIndex::new(polygons);
        let overlaps = |id: usize| {
            let (col, row) = self.col_row(id);
            index.overlaps(&self.cell_rect(col, row))
        };

        #[cfg(feature = "rayon")]
        let active: Vec<bool> = (0..self.len()).into_par_iter().map(overlaps).collect();

        #[cfg(not(feature = "rayon"))]
        let active: Vec<bool> = (0..self.len()).map(overlaps).collect();

        info!(
            "{} of {} cells inside the study area",
            active.iter().filter(|a| **a).count(),
            active.len()
        );
        self.active = Some(active);
    }

    pub fn has_boundary(&self) -> bool {
        self.active.is_some()
    }

    /// Cells outside the study area are inactive, every cell is active otherwise
    pub fn is_active(&self, id: usize) -> bool {
        if id >= self.len() {
            return false;
        }
        match &self.active {
            Some(active) => active.get(id).copied().unwrap_or(false),
            None => true,
        }
    }

    /// Export the active cells as a GeoJSON FeatureCollection
    pub fn to_geojson(&self) -> GeoJson {
        let features: Vec<Feature> = self
            .cells()
            .filter(|cell| self.is_active(cell.id))
            .map(|cell| {
                let polygon = cell.rect.to_polygon();
                let mut feature = Feature::from(Geometry::new(Value::from(&polygon)));
                feature.set_property("cell_id", cell.id as u64);
                feature.set_property("col", cell.col as u64);
                feature.set_property("row", cell.row as u64);
                feature
            })
            .collect();

        GeoJson::from(FeatureCollection {
            bbox: None,
            foreign_members: None,
            features,
        })
    }

    /// Save the mask to a GeoJSON file
    pub fn to_geojson_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .context(format!("Failed to create output directory: {:?}", parent))?;
            }
        }
        std::fs::write(path, self.to_geojson().to_string())
            .context(format!("Failed to write GeoJSON file: {:?}", path))?;
        info!("Mask saved to: {:?}", path);
        Ok(())
    }
}
