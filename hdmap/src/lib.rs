pub mod collect;
pub mod commons;
pub mod config;
pub mod error;
pub mod geo_core;
pub mod geometric;
pub mod pipeline;
pub mod render;

pub use collect::dataset::{DatasetMeta, HeatDemandDataset, Sector};
pub use config::ProjectConfig;
pub use error::HdError;
pub use geo_core::{BoundingBox, GeoCore};
pub use geometric::combine::OverlapPolicy;
pub use geometric::heat_demand::{data_intersect, AllocationMethod, HeatDemandLayer};
pub use geometric::mask::{create_polygon_mask, PolygonMask};
pub use pipeline::{HeatDemandPipeline, PipelineOutput};
pub use render::{MapFormat, OutputMap};
