//! # adkit-vis
//!
//! Side-by-side qualitative comparison of anomaly maps. Every method
//! directory holds an `(original, mask, amp)` triplet per sample; the
//! triplets are resized, optionally framed and cropped, and laid out on a
//! single canvas.

pub mod error;
pub mod layout;
pub mod tiling;
pub mod triplet;

pub use error::{VisError, VisResult};
pub use layout::{concat_images, Grid, DEFAULT_GAP_RATIO};
pub use tiling::{discover_sample_names, plot_qualitative_results, TilingConfig, DEFAULT_OUTPUT};
pub use triplet::{add_black_border, load_triplet, CropWindow, LoadedTriplet, Triplet, TripletPaths};
