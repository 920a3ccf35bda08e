//! Per-iteration comparison metrics
//!
//! Pure functions over two snapshots. The semantic metric is not here: it
//! needs the external oracle, see [`crate::oracle`].

pub mod lexical;
pub mod score;
pub mod style;

pub use lexical::{edit_distance, length_delta, lexical_similarity, normalize};
pub use score::{gate_threshold, quality_gate_passed, score_delta};
pub use style::{style_delta, StyleProfile};
