//! Property tests over document ids and numeric filter comparisons,
//! grounded on the teacher's top-level `tests/prop_sort.rs` shape.
use bson::Bson;
use minileaf::document::{DocumentId, IdKind, compare_values};
use minileaf::query::{FieldOp, Filter, eval_filter};
use proptest::prelude::*;

fn any_bson_number() -> impl Strategy<Value = Bson> {
    prop_oneof![any::<i32>().prop_map(Bson::Int32), any::<i64>().prop_map(Bson::Int64), (-1.0e6f64..1.0e6f64).prop_map(Bson::Double),]
}

proptest! {
    #![proptest_config(proptest::test_runner::Config { cases: 64, .. proptest::test_runner::Config::default() })]

    #[test]
    fn int_id_round_trips_through_text(n in any::<i64>()) {
        let id = DocumentId::Int(n);
        let parsed = DocumentId::parse_text(IdKind::Int, &id.to_text()).unwrap();
        prop_assert_eq!(id, parsed);
    }

    #[test]
    fn compare_values_is_a_strict_total_order_over_numbers(a in any_bson_number(), b in any_bson_number()) {
        let ord_ab = compare_values(&a, &b);
        let ord_ba = compare_values(&b, &a);
        prop_assert_eq!(ord_ab, ord_ba.reverse());
        prop_assert_eq!(compare_values(&a, &a), std::cmp::Ordering::Equal);
    }

    #[test]
    fn gt_and_lte_on_a_numeric_field_are_mutually_exclusive(a in any_bson_number(), b in any_bson_number()) {
        let doc = bson::doc! { "x": a.clone() };
        let gt = eval_filter(&Filter::FieldConds("x".to_string(), vec![FieldOp::Gt(b.clone())]), &doc);
        let lte = eval_filter(&Filter::FieldConds("x".to_string(), vec![FieldOp::Lte(b)]), &doc);
        prop_assert_ne!(gt, lte);
    }
}
