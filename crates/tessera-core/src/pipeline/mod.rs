//! Ingestion pipeline components.
//!
//! - **validate**: Allow-list, size limit and magic-byte checks
//! - **hash**: Streaming BLAKE3 content digest
//! - **dedup**: Digest lookup with byte-for-byte confirmation
//! - **decode**: Content-sniffed decoding with dimension limits
//! - **features**: Average colour, palette and luminance grid
//! - **thumbnail**: Center-crop thumbnails at an exact size
//! - **files**: Originals, thumbnails and temp upload placement
//! - **ingest**: Orchestrates the stages above

pub mod decode;
pub mod dedup;
pub mod features;
pub mod files;
pub mod hash;
pub mod ingest;
pub mod thumbnail;
pub mod validate;

pub use decode::{DecodedImage, ImageDecoder};
pub use dedup::{DedupIndex, DedupOutcome};
pub use features::FeatureExtractor;
pub use files::FileLayout;
pub use hash::Hasher;
pub use ingest::{IngestPipeline, IngestState};
pub use thumbnail::{CropRegion, ThumbnailRenderer, THUMBNAIL_EXTENSIONS};
pub use validate::{AcceptedFormat, Validator};
