//! Score file output.
//!
//! # Submodules
//!
//! - [`json`]: writes collected rounds to a timestamped JSON file and reads
//!   such files back for reporting
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── scores_20250428091500.json
//! └── scores_20250601180212.json
//! ```

pub mod json;
