//! Pipeline algorithms.
//!
//! Each stage is a free function taking an options struct:
//!
//! - **Alignment** ([`align`]): symmetry-axis estimation and rigid alignment to +Z
//! - **Profiling** ([`profile`]): per-height-bin radius statistics
//! - **Body extraction** ([`body`]): longest stable-radius run, cropped with [`crop`]
//! - **Seam search** ([`seam`]): straightest vertical cut on the body
//! - **Resampling** ([`resample`]): texture transfer between UV layouts
//!
//! Data-parallel work goes through [`partition`], which keeps results
//! independent of the number of threads.

pub mod align;
pub mod body;
pub mod crop;
pub mod partition;
pub mod profile;
pub mod resample;
pub mod seam;

pub use align::{align, estimate_axis, AlignOptions, Alignment, AxisEstimate, AxisFit, Orientation};
pub use body::{extract_body, select_region, stable_runs, Body, BodyOptions, StableRegion};
pub use crop::crop_to_height;
pub use profile::{BinCount, RadiusBin, RadiusProfile};
pub use resample::{resample_texture, ResampleOptions, Resampled};
pub use seam::{find_seam, LevelCount, Seam, SeamOptions};
