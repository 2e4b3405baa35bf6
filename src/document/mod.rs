mod doc;
mod id;
mod path;
mod value;

pub use doc::{Document, ID_FIELD, LEGACY_ID_FIELD, extract_id, write_id};
pub use id::{DocumentId, IdKind, IntIdGenerator, INT_ID_GENERATOR};
pub use path::{get_path, remove_path, set_path};
pub use value::{compare_values, from_canonical_json, looks_like_object_id_hex, to_canonical_json};
