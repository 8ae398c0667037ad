use test_case::test_case;

use crate::DType;

#[test_case(&[DType::Float16, DType::Float32], DType::Float32 ; "float widening")]
#[test_case(&[DType::Int8, DType::UInt8], DType::Int16 ; "mixed sign bytes")]
#[test_case(&[DType::Int32, DType::Float16], DType::Float16 ; "int joins float")]
#[test_case(&[DType::Float16, DType::BFloat16], DType::Float32 ; "half and bfloat")]
#[test_case(&[DType::Bool, DType::Bool], DType::Bool ; "same type")]
fn test_least_upper_dtype(dtypes: &[DType], expected: DType) {
    assert_eq!(DType::least_upper_dtype(dtypes), Some(expected));
}

#[test]
fn test_least_upper_dtype_empty() {
    assert_eq!(DType::least_upper_dtype(&[]), None);
}

#[test_case(DType::Float16, DType::Float32, true)]
#[test_case(DType::Float32, DType::Float16, false)]
#[test_case(DType::Int8, DType::Float16, true)]
#[test_case(DType::Int32, DType::Float32, false)]
#[test_case(DType::UInt8, DType::Int8, false)]
#[test_case(DType::Bool, DType::Int8, true)]
fn test_can_safe_cast(from: DType, to: DType, expected: bool) {
    assert_eq!(from.can_safe_cast(to), expected);
}
