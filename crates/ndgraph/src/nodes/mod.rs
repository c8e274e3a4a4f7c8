//! Node kinds.
//!
//! - [`ConstantNode`]: fixed values held on the node.
//! - [`IntegerNode`], [`ListNode`], [`DynamicArrayNode`]: decision variables with a mutation API.
//! - [`BasicIndexingNode`], [`AdvancedIndexingNode`]: derived arrays selecting elements of a
//!   source array.
//! - [`ArrayValidationNode`]: consistency checker for tests.

mod collections;
mod constants;
mod dynamic;
mod indexing;
mod numbers;
mod testing;

pub use collections::ListNode;
pub use constants::ConstantNode;
pub use dynamic::DynamicArrayNode;
pub use indexing::{AdvancedIndexingNode, BasicIndexingNode, BasicTerm, IndexTerm, Slice};
pub use numbers::IntegerNode;
pub use testing::ArrayValidationNode;

use crate::array::ArrayView;
use crate::shape::Shape;
use crate::state::ArrayBuffer;

/// Contiguous view over a node's own buffer.
pub(crate) fn buffer_view<'a>(shape: &Shape, buffer: &'a ArrayBuffer) -> ArrayView<'a> {
    ArrayView::contiguous(buffer.as_slice(), &shape.resolve(buffer.len()))
}

/// Whether `value` is a whole number.
#[inline]
pub(crate) fn is_integer(value: f64) -> bool {
    value.is_finite() && value.fract() == 0.0
}
