//! Evaluation masks and the reference no-data ignore mask.
//!
//! Classification codes follow the ASPRS LAS convention and occupy 0–255.
//! The value 256 can therefore never be a real class; a `CLSMatchValue` of
//! exactly `[256]` means "every labeled (non-zero) pixel".

use crate::types::{Grid, Mask, is_no_data};
use ndarray::Zip;

/// Match value reserved for "any non-zero classification".
pub const ANY_LABELED: i64 = 256;

/// Which classification values count toward evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassMatch {
    /// Every pixel with a non-zero class.
    AnyLabeled,
    /// Pixels whose class equals one of the listed values.
    Values(Vec<i64>),
}

impl ClassMatch {
    /// Interpret a configured `CLSMatchValue` list.
    ///
    /// `[256]` becomes [`ClassMatch::AnyLabeled`]. An empty list, or 256 mixed
    /// with other values, is rejected.
    pub fn from_values(values: &[i64]) -> Result<Self, String> {
        match values {
            [] => Err("CLSMatchValue must list at least one class".into()),
            [ANY_LABELED] => Ok(Self::AnyLabeled),
            _ if values.contains(&ANY_LABELED) => Err(format!(
                "CLSMatchValue {ANY_LABELED} means \"any labeled class\" and must be the only value"
            )),
            _ => Ok(Self::Values(values.to_vec())),
        }
    }

    pub fn matches(&self, class: f64) -> bool {
        match self {
            Self::AnyLabeled => class != 0.0,
            Self::Values(values) => values.iter().any(|&v| class == v as f64),
        }
    }
}

/// Build an evaluation mask from a classification grid.
pub fn build_mask(classification: &Grid, class_match: &ClassMatch) -> Mask {
    classification.mapv(|class| class_match.matches(class))
}

/// Union of reference no-data pixels across DSM, DTM and classification.
///
/// Sources without a declared sentinel contribute nothing. All grids must share
/// the classification grid's shape.
pub fn build_ignore_mask(
    dsm: &Grid,
    dsm_no_data: Option<f64>,
    dtm: &Grid,
    dtm_no_data: Option<f64>,
    cls: &Grid,
    cls_no_data: Option<f64>,
) -> Mask {
    let mut ignore = Mask::from_elem(cls.raw_dim(), false);

    for (grid, sentinel) in [(dsm, dsm_no_data), (dtm, dtm_no_data), (cls, cls_no_data)] {
        let Some(sentinel) = sentinel else { continue };
        Zip::from(&mut ignore).and(grid).for_each(|ignored, &value| {
            if is_no_data(value, sentinel) {
                *ignored = true;
            }
        });
    }

    ignore
}
