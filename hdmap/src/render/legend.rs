use anyhow::Result;

use crate::error::HdError;

/// Upper class bounds in MWh/ha of the default legend
pub const DEFAULT_CLASS_BOUNDS: [f64; 6] = [10.0, 25.0, 50.0, 100.0, 250.0, 500.0];

/// Yellow to dark red, one colour per class (bounds + the open top class)
pub const DEFAULT_COLORS: [&str; 7] = [
    "#ffffb2", "#fed976", "#feb24c", "#fd8d3c", "#fc4e2a", "#e31a1c", "#b10026",
];

/// Colour table mapping heat-demand densities to map classes
#[derive(Debug, Clone, PartialEq)]
pub struct Legend {
    upper_bounds: Vec<f64>,
    colors: Vec<String>,
}

impl Default for Legend {
    fn default() -> Self {
        Legend {
            upper_bounds: DEFAULT_CLASS_BOUNDS.to_vec(),
            colors: DEFAULT_COLORS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl Legend {
    /// Bounds must be strictly ascending, with one more colour than bounds
    pub fn new(upper_bounds: Vec<f64>, colors: Vec<String>) -> Result<Self> {
        if upper_bounds.windows(2).any(|w| w[0] >= w[1])
            || upper_bounds.iter().any(|b| !b.is_finite())
        {
            return Err(HdError::config(
                "render.classes",
                "class bounds must be finite and strictly ascending",
            )
            .into());
        }
        if colors.len() != upper_bounds.len() + 1 {
            return Err(HdError::config(
                "render.colors",
                format!(
                    "expected {} colours for {} class bounds, got {}",
                    upper_bounds.len() + 1,
                    upper_bounds.len(),
                    colors.len()
                ),
            )
            .into());
        }
        Ok(Legend {
            upper_bounds,
            colors,
        })
    }

    /// First class whose upper bound is >= the density
    pub fn classify(&self, density: f64) -> usize {
        self.upper_bounds
            .iter()
            .position(|bound| density <= *bound)
            .unwrap_or(self.upper_bounds.len())
    }

    pub fn color(&self, class: usize) -> &str {
        let idx = class.min(self.colors.len() - 1);
        &self.colors[idx]
    }

    /// Density range of a class; classes past the last bound are the open top class
    pub fn label(&self, class: usize) -> String {
        let class = class.min(self.upper_bounds.len());
        let lower = class
            .checked_sub(1)
            .and_then(|i| self.upper_bounds.get(i))
            .copied()
            .unwrap_or(0.0);
        match self.upper_bounds.get(class) {
            Some(upper) => format!("{} - {} MWh/ha", lower, upper),
            None => format!("> {} MWh/ha", lower),
        }
    }

    pub fn class_count(&self) -> usize {
        self.colors.len()
    }
}
