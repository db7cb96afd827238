pub const DEFAULT_OUTPUT_PATH: &str = "./output";

/// ETRS89 / LCC Europe
pub const DEFAULT_EPSG: i32 = 3034;

/// Cell edge in metres; 100 m cells are one hectare
pub const DEFAULT_STEPSIZE: f64 = 100.0;

pub const SQUARE_METRES_PER_HECTARE: f64 = 10_000.0;

pub const NODATA_VALUE: f64 = -9999.0;
