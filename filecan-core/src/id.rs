//! Object id generation
//!
//! Generated ids are `<UTC timestamp, microseconds>-<12 random hex chars>`,
//! e.g. `20240311094512123456-3f9c0a7be21d`. They are valid object
//! identifiers and filenames, and sort in creation order.

use chrono::Utc;
use uuid::Uuid;

/// Length of the random suffix in hex characters
const RANDOM_SUFFIX_LEN: usize = 12;

/// Generate a fresh object id / file name
pub fn generate_file_name() -> String {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S%6f");
    let random = Uuid::new_v4().simple().to_string();
    format!("{}-{}", timestamp, &random[..RANDOM_SUFFIX_LEN])
}
