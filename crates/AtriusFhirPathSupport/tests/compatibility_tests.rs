use atrius_fhirpath_support::conversion::{
    evaluates_to_true, has_boolean_value, has_date_value, has_number_value, has_string_value,
    is_false, is_true,
};
use atrius_fhirpath_support::{Collection, Node, SystemValueKind};
use rust_decimal::Decimal;

#[test]
fn compatibility_table_covers_every_pair() {
    use SystemValueKind::*;
    let expected = |a: SystemValueKind, b: SystemValueKind| -> bool {
        matches!(
            (a, b),
            (Boolean, Boolean)
                | (Integer, Integer)
                | (Integer, Decimal)
                | (Decimal, Decimal)
                | (Decimal, Integer)
                | (Decimal, Quantity)
                | (Quantity, Quantity)
                | (Quantity, Decimal)
                | (String, String)
                | (Date, Date)
                | (Date, DateTime)
                | (DateTime, DateTime)
                | (DateTime, Date)
                | (Time, Time)
        )
    };
    for a in SystemValueKind::ALL {
        assert!(a.is_compatible_with(a), "{a:?} must be compatible with itself");
        for b in SystemValueKind::ALL {
            assert_eq!(a.is_compatible_with(b), expected(a, b), "{a:?} vs {b:?}");
        }
    }
}

#[test]
fn promotion_pairs_are_bidirectional() {
    use SystemValueKind::*;
    for (a, b) in [(Integer, Decimal), (Date, DateTime), (Decimal, Quantity)] {
        assert!(a.is_compatible_with(b) && b.is_compatible_with(a));
    }
    for other in SystemValueKind::ALL {
        if other != Time {
            assert!(!Time.is_compatible_with(other));
        }
        if other != String {
            assert!(!String.is_compatible_with(other));
        }
    }
}

#[test]
fn singleton_law() {
    let singletons = [
        Node::boolean(true),
        Node::integer(7),
        Node::decimal(Decimal::new(15, 1)),
        Node::string("anything"),
        Node::string("yes"),
    ];
    for node in singletons {
        let c = Collection::singleton(node);
        assert!(evaluates_to_true(&c), "{c:?}");
    }
    for falsy in [Node::boolean(false), Node::string("N"), Node::integer(0)] {
        let c = Collection::singleton(falsy);
        assert!(!evaluates_to_true(&c));
        assert!(is_false(&c));
    }

    let empty = Collection::empty();
    let pair = Collection::from_nodes(vec![Node::boolean(true), Node::boolean(true)]);
    for c in [&empty, &pair] {
        assert!(!has_boolean_value(c));
        assert!(!has_number_value(c));
        assert!(!has_string_value(c));
        assert!(!has_date_value(c));
        assert!(!is_true(c));
        assert!(!is_false(c));
        assert!(!evaluates_to_true(c));
    }
    let falsy_pair = Collection::from_nodes(vec![Node::boolean(false), Node::boolean(false)]);
    assert!(!evaluates_to_true(&falsy_pair));
}
