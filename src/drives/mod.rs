// Drive snapshots and scan records
//
// Organized structure:
// - classification.rs: drive attributes and erasure level selection
// - location.rs: physical location variants (legacy and LCN schemas)
// - records.rs: scan tree, file records and search results

pub mod classification;
pub mod location;
pub mod records;



pub use classification::{select_level, DriveAttributes, DriveDescriptor, MediaType};
pub use location::{Addressing, PhysicalLocation};
pub use records::{
    drive_root_for, file_name_of, listed_drives, search_results, CategoryStats, FileAnalysis,
    FileRecord, ScanResult, ScannedDrive,
};
