// Engine stdout protocol
//
// - decoder.rs: incremental `::progress::<pct>::<message>` line decoder
// - extractor.rs: recovers the final JSON payload once the process exits

pub mod decoder;
pub mod extractor;



pub use decoder::{is_progress_line, parse_progress_line, ProgressDecoder, ProgressEvent};
pub use extractor::{extract_outcome, extract_payload, strip_progress_lines};
