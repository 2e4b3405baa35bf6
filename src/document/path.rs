//! Dotted-path read/write/remove over a document tree. A numeric segment
//! addresses an array slot; every other segment addresses a map field.
use bson::{Bson, Document};

#[must_use]
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut cur = doc.get(first)?;
    for part in parts {
        cur = get_child(cur, part)?;
    }
    Some(cur)
}

fn get_child<'a>(value: &'a Bson, segment: &str) -> Option<&'a Bson> {
    match value {
        Bson::Document(d) => d.get(segment),
        Bson::Array(a) => segment.parse::<usize>().ok().and_then(|i| a.get(i)),
        _ => None,
    }
}

/// Set the value at `path`, auto-creating intermediate maps. An existing
/// intermediate that is not itself a map is replaced by a new empty map.
pub fn set_path(doc: &mut Document, path: &str, value: Bson) {
    let segments: Vec<&str> = path.split('.').collect();
    set_segments(doc, &segments, value);
}

fn set_segments(doc: &mut Document, segments: &[&str], value: Bson) {
    match segments {
        [] => {}
        [last] => {
            doc.insert((*last).to_string(), value);
        }
        [head, rest @ ..] => {
            let entry =
                doc.entry((*head).to_string()).or_insert_with(|| Bson::Document(Document::new()));
            if !matches!(entry, Bson::Document(_)) {
                *entry = Bson::Document(Document::new());
            }
            if let Bson::Document(inner) = entry {
                set_segments(inner, rest, value);
            }
        }
    }
}

/// Remove the leaf at `path`. Intermediates are left intact even if they
/// become empty.
pub fn remove_path(doc: &mut Document, path: &str) -> Option<Bson> {
    let segments: Vec<&str> = path.split('.').collect();
    remove_segments(doc, &segments)
}

fn remove_segments(doc: &mut Document, segments: &[&str]) -> Option<Bson> {
    match segments {
        [] => None,
        [last] => doc.remove(*last),
        [head, rest @ ..] => match doc.get_mut(*head) {
            Some(Bson::Document(inner)) => remove_segments(inner, rest),
            _ => None,
        },
    }
}
