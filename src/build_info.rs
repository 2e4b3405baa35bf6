//! Cargo feature flags baked in at compile time by `build.rs`, surfaced so
//! an opened database can log what it was built with.
include!(concat!(env!("OUT_DIR"), "/compiled_features.rs"));

#[cfg(test)]
mod tests {
    use super::COMPILED_FEATURES;

    #[test]
    fn feature_list_is_sorted() {
        let mut sorted = COMPILED_FEATURES.to_vec();
        sorted.sort_unstable();
        assert_eq!(COMPILED_FEATURES, sorted.as_slice());
    }
}
