//! Preprocessing recipes
//!
//! Steps learn their parameters from the training subset only and replay
//! them unchanged on every other table.

mod encoder;
mod feature_selection;
mod interactions;
mod recipe;
mod scaler;

pub use encoder::DummyEncoder;
pub use feature_selection::{ColumnDrop, CorrelationFilter, NzvFilter};
pub use interactions::{FeatureInteractions, InteractionTerm};
pub use recipe::{DesignMatrix, FittedStep, PreparedRecipe, Recipe, Selector, Step};
pub use scaler::Normalizer;

pub(crate) use feature_selection::pearson_correlation;
