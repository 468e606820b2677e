use pixio::{Aggregate, BaseType, RawTypeDesc, TypeDesc, VecSemantics};
use proptest::prelude::*;

const BASETYPES: [BaseType; 15] = [
    BaseType::Unknown,
    BaseType::None,
    BaseType::UInt8,
    BaseType::Int8,
    BaseType::UInt16,
    BaseType::Int16,
    BaseType::UInt32,
    BaseType::Int32,
    BaseType::UInt64,
    BaseType::Int64,
    BaseType::Half,
    BaseType::Float,
    BaseType::Double,
    BaseType::String,
    BaseType::Ptr,
];

const AGGREGATES: [Aggregate; 6] = [
    Aggregate::Scalar,
    Aggregate::Vec2,
    Aggregate::Vec3,
    Aggregate::Vec4,
    Aggregate::Matrix33,
    Aggregate::Matrix44,
];

const SEMANTICS: [VecSemantics; 8] = [
    VecSemantics::NoSemantics,
    VecSemantics::Color,
    VecSemantics::Point,
    VecSemantics::Vector,
    VecSemantics::Normal,
    VecSemantics::Timecode,
    VecSemantics::Keycode,
    VecSemantics::Rational,
];

fn valid_typedesc() -> impl Strategy<Value = TypeDesc> {
    (
        prop::sample::select(BASETYPES.to_vec()),
        prop::sample::select(AGGREGATES.to_vec()),
        prop::sample::select(SEMANTICS.to_vec()),
        -1i32..=32,
    )
        .prop_map(|(basetype, aggregate, vecsemantics, arraylen)| TypeDesc {
            basetype,
            aggregate,
            vecsemantics,
            reserved: 0,
            arraylen,
        })
}

proptest! {
    #[test]
    fn raw_round_trip_is_identity(td in valid_typedesc()) {
        let raw = td.to_raw();
        prop_assert_eq!(TypeDesc::from_raw(raw).expect("valid descriptor"), td);
    }

    #[test]
    fn out_of_range_basetype_rejected(b in 15u8.., len in -1i32..=4) {
        let raw = RawTypeDesc { basetype: b, aggregate: 1, vecsemantics: 0, reserved: 0, arraylen: len };
        prop_assert!(TypeDesc::from_raw(raw).is_err());
    }

    #[test]
    fn out_of_range_vecsemantics_rejected(v in 8u8..) {
        let raw = RawTypeDesc { basetype: 11, aggregate: 1, vecsemantics: v, reserved: 0, arraylen: 0 };
        prop_assert!(TypeDesc::from_raw(raw).is_err());
    }
}

#[test]
fn every_enum_value_round_trips() {
    for &basetype in &BASETYPES {
        for &aggregate in &AGGREGATES {
            for &vecsemantics in &SEMANTICS {
                for arraylen in [-1, 0, 1, 7] {
                    let td = TypeDesc {
                        basetype,
                        aggregate,
                        vecsemantics,
                        reserved: 0,
                        arraylen,
                    };
                    assert_eq!(TypeDesc::from_raw(td.to_raw()).expect("valid"), td);
                }
            }
        }
    }
}

#[test]
fn invalid_aggregate_values_rejected() {
    for bad in [0u8, 5, 8, 10, 15, 17, 255] {
        let raw = RawTypeDesc {
            basetype: 11,
            aggregate: bad,
            vecsemantics: 0,
            reserved: 0,
            arraylen: 0,
        };
        assert!(TypeDesc::from_raw(raw).is_err(), "aggregate {bad} accepted");
    }
}

#[test]
fn negative_arraylen_below_unsized_rejected() {
    let raw = RawTypeDesc {
        basetype: 11,
        aggregate: 1,
        vecsemantics: 0,
        reserved: 0,
        arraylen: -2,
    };
    assert!(TypeDesc::from_raw(raw).is_err());
}

#[test]
fn reserved_byte_is_normalized() {
    let raw = RawTypeDesc {
        basetype: 2,
        aggregate: 3,
        vecsemantics: 1,
        reserved: 0xAB,
        arraylen: 0,
    };
    let td = TypeDesc::from_raw(raw).expect("valid apart from reserved");
    assert_eq!(td.reserved, 0);
}

#[test]
fn byte_sizes() {
    assert_eq!(TypeDesc::FLOAT.total_bytes(), 4);
    assert_eq!(TypeDesc::DOUBLE.total_bytes(), 8);
    assert_eq!(TypeDesc::UINT8.total_bytes(), 1);
    assert_eq!(TypeDesc::COLOR.total_bytes(), 12);
    assert_eq!(TypeDesc::TIMECODE.total_bytes(), 8);
    assert_eq!(TypeDesc::KEYCODE.total_bytes(), 28);

    let unsized_array = TypeDesc {
        arraylen: -1,
        ..TypeDesc::FLOAT
    };
    assert_eq!(unsized_array.total_bytes(), 0);
    assert!(unsized_array.is_array());
    assert_eq!(unsized_array.num_elements(), 0);
}

#[test]
fn display_names() {
    assert_eq!(TypeDesc::FLOAT.to_string(), "float");
    assert_eq!(TypeDesc::COLOR.to_string(), "float[3]");
    assert_eq!(TypeDesc::KEYCODE.to_string(), "int32x7");
}

#[test]
fn struct_layout_matches_the_declared_abi() {
    assert_eq!(std::mem::size_of::<RawTypeDesc>(), 8);
    assert_eq!(std::mem::size_of::<TypeDesc>(), 8);
    assert_eq!(std::mem::align_of::<RawTypeDesc>(), 4);
}
