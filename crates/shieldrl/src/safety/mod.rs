//! Safety shield: index evaluation, ensemble classification, and
//! boundary-seeking action correction.

mod boundary;
mod classifier;
mod ensemble;
mod index;

pub use boundary::{BoundarySearch, Correction, CorrectionConfig, CorrectionOutcome};
pub use classifier::{ActionClassifier, EnsembleClassifier, SafetyVerdict};
pub use ensemble::Ensemble;
pub use index::SafetyIndex;
