//! Facade crate for the `mas-perception-*` workspace.
//!
//! Re-exports the message schemas (`msgs`) and the perception routines
//! (`core`), and adds file-based jobs on top of them (`io`). The
//! `mas-perception` binary (feature `cli`) drives those jobs from the
//! command line.
//!
//! ## Quickstart
//!
//! ```no_run
//! use mas_perception::io::{run_crop_job, CropJobConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = CropJobConfig::load_json("crop_job.json")?;
//! let report = run_crop_job(&cfg)?;
//! println!("wrote {} crops", report.crops.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Python bindings
//!
//! `crates/mas-perception-py` builds the `mas_perception` extension module
//! with the same routines over numpy arrays and JSON-serialized messages.

pub use mas_perception_core as core;
pub use mas_perception_msgs as msgs;

pub use mas_perception_core::{
    crop_image, draw_labeled_boxes, fit_box_to_image, get_crops_and_bounding_boxes,
    BoundingBox2D, BoundingBox3D, Detection, DrawStyle, PerceptionError, PipelineParams,
    PixelRect,
};

pub mod io;
