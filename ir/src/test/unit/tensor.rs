use crate::axis::AxisId;
use crate::expr::SizeExpr;
use crate::tensor::{Tensor, contiguous_strides};
use crate::{DType, Error};

fn c(v: i64) -> SizeExpr {
    SizeExpr::constant(v)
}

#[test]
fn contiguous_strides_are_row_major() {
    let strides = contiguous_strides(&[c(2), c(3), c(4)]);
    assert_eq!(strides.as_slice(), &[c(12), c(4), c(1)]);
}

#[test]
fn unit_extent_gets_zero_stride() {
    let strides = contiguous_strides(&[c(8), c(1), c(4)]);
    assert_eq!(strides.as_slice(), &[c(4), c(0), c(1)]);
}

#[test]
fn symbolic_strides() {
    let s0 = SizeExpr::symbol("s0");
    let s1 = SizeExpr::symbol("s1");
    let strides = contiguous_strides(&[s0, s1.clone()]);
    assert_eq!(strides.as_slice(), &[s1, c(1)]);
}

#[test]
fn view_lengths_must_agree() {
    let err = Tensor::new(DType::Float32, [AxisId(0), AxisId(1)], [c(2), c(3)], [c(3)]).unwrap_err();
    assert_eq!(err, Error::ViewLengthMismatch { axis: 2, repeats: 2, strides: 1 });
}

#[test]
fn set_view_replaces_all_three_lists() {
    let mut tensor = Tensor::contiguous(DType::Float16, [AxisId(0)], [c(8)]);
    tensor.set_view([AxisId(0), AxisId(1)], [c(2), c(4)], [c(4), c(1)]).unwrap();
    assert_eq!(tensor.rank(), 2);
    assert!(tensor.is_contiguous());
    assert_eq!(tensor.size_bytes(), c(16));
    assert!(tensor.set_view([AxisId(0)], [c(2), c(4)], [c(1)]).is_err());
    assert_eq!(tensor.rank(), 2);
}

#[test]
fn degenerate_and_broadcast_dims() {
    let tensor = Tensor::new(DType::Float32, [AxisId(0), AxisId(1)], [c(1), c(1)], [c(0), c(0)]).unwrap();
    assert!(tensor.is_degenerate());
    assert!(tensor.is_broadcast_dim(0));
    assert!(!tensor.is_broadcast_dim(5));
    assert!(Tensor::scalar(DType::Int32).is_degenerate());
}
