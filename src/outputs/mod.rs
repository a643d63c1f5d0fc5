//! Output files written by the pipeline.
//!
//! # Submodules
//!
//! - [`json`]: pretty JSON I/O for article batches and bookkeeping files
//! - [`digest`]: the daily `all.json` digest and the upload manifest
//!
//! # Output Structure
//!
//! ```text
//! news_p/20250601/
//! ├── all.json
//! ├── new_articles0.json
//! └── bbc0/news_results.json, news_results_processed.json
//!
//! final_videos/
//! ├── 20250601_0_final.mp4
//! └── 20250601_uploads.json
//! ```

pub mod digest;
pub mod json;
