//! Array shapes with an optional dynamic leading dimension.
//!
//! A [`Shape`] is an ordered list of [`Dim`]s. Only the leading (outermost) dimension may be
//! [`Dim::Dynamic`]; its extent is then read from a [`State`](crate::State).

use smallvec::SmallVec;
use std::fmt;

use crate::error::{GraphError, Result};
use crate::strides::compute_strides;

/// One dimension extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dim {
    /// Extent known at construction.
    Fixed(usize),
    /// Extent only known at runtime, may grow and shrink.
    Dynamic,
}

impl Dim {
    /// The fixed extent, if any.
    #[inline]
    pub fn fixed(self) -> Option<usize> {
        match self {
            Dim::Fixed(n) => Some(n),
            Dim::Dynamic => None,
        }
    }

    #[inline]
    pub fn is_dynamic(self) -> bool {
        matches!(self, Dim::Dynamic)
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Fixed(n) => write!(f, "{n}"),
            Dim::Dynamic => write!(f, "-1"),
        }
    }
}

/// Shape of an array node.
///
/// # Examples
///
/// ```
/// use ndgraph::{Dim, Shape};
///
/// let s = Shape::fixed(&[2, 3]);
/// assert_eq!(s.size(), Some(6));
///
/// let d = Shape::dynamic(&[3]);
/// assert!(d.is_dynamic());
/// assert_eq!(d.dims(), &[Dim::Dynamic, Dim::Fixed(3)]);
/// assert_eq!(d.size(), None);
/// assert_eq!(d.resolve(12), vec![4, 3]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape {
    dims: SmallVec<[Dim; 4]>,
}

impl Shape {
    /// Build a shape, checking that only the leading dimension is dynamic.
    pub fn new(dims: &[Dim]) -> Result<Self> {
        if dims.iter().skip(1).any(|d| d.is_dynamic()) {
            return Err(GraphError::InvalidShape {
                message: "only the leading dimension may be dynamic".to_string(),
            });
        }
        Ok(Self {
            dims: dims.iter().copied().collect(),
        })
    }

    /// A fully static shape.
    pub fn fixed(extents: &[usize]) -> Self {
        Self {
            dims: extents.iter().map(|&n| Dim::Fixed(n)).collect(),
        }
    }

    /// A shape with a dynamic leading dimension followed by `trailing` fixed extents.
    pub fn dynamic(trailing: &[usize]) -> Self {
        let mut dims = SmallVec::with_capacity(trailing.len() + 1);
        dims.push(Dim::Dynamic);
        dims.extend(trailing.iter().map(|&n| Dim::Fixed(n)));
        Self { dims }
    }

    /// Zero-dimensional (scalar) shape.
    pub fn scalar() -> Self {
        Self::default()
    }

    #[inline]
    pub fn dims(&self) -> &[Dim] {
        &self.dims
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.dims.first().is_some_and(|d| d.is_dynamic())
    }

    /// Number of elements for a static shape, `None` when dynamic.
    pub fn size(&self) -> Option<usize> {
        self.dims.iter().map(|d| d.fixed()).product()
    }

    /// Product of all dimensions except the leading one (the size of one "row").
    ///
    /// For a 0-d or 1-d shape this is 1.
    pub fn row_size(&self) -> usize {
        self.dims
            .iter()
            .skip(1)
            .map(|d| d.fixed().unwrap_or(1))
            .product()
    }

    /// Concrete extents given the current number of elements.
    ///
    /// For static shapes `size` is ignored.
    pub fn resolve(&self, size: usize) -> Vec<usize> {
        let rows = size.checked_div(self.row_size()).unwrap_or(0);
        self.dims
            .iter()
            .map(|d| match d {
                Dim::Fixed(n) => *n,
                Dim::Dynamic => rows,
            })
            .collect()
    }

    /// Row-major element strides. The dynamic dimension does not affect strides.
    pub fn strides(&self) -> Vec<usize> {
        compute_strides(&self.resolve(0))
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        if self.dims.len() == 1 {
            write!(f, ",")?;
        }
        write!(f, ")")
    }
}

impl From<&[usize]> for Shape {
    fn from(extents: &[usize]) -> Self {
        Shape::fixed(extents)
    }
}

/// Broadcast a set of index-array shapes to their common shape.
///
/// Shapes broadcast when they are identical or 0-d. Scalars broadcast to anything.
/// Returns `None` for an empty input.
pub fn broadcast_shapes<'a, I>(shapes: I) -> Result<Option<Shape>>
where
    I: IntoIterator<Item = &'a Shape>,
{
    let mut common: Option<&Shape> = None;
    for shape in shapes {
        common = match common {
            None => Some(shape),
            Some(c) if c.ndim() == 0 => Some(shape),
            Some(c) if shape.ndim() == 0 || c == shape => Some(c),
            Some(c) => {
                return Err(GraphError::BroadcastMismatch {
                    lhs: c.to_string(),
                    rhs: shape.to_string(),
                });
            }
        };
    }
    Ok(common.cloned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_must_lead() {
        assert!(Shape::new(&[Dim::Dynamic, Dim::Fixed(2)]).is_ok());
        assert!(matches!(
            Shape::new(&[Dim::Fixed(2), Dim::Dynamic]),
            Err(GraphError::InvalidShape { .. })
        ));
    }

    #[test]
    fn test_dynamic_row_size() {
        let s = Shape::dynamic(&[3, 5, 4]);
        assert!(s.is_dynamic());
        assert_eq!(s.row_size(), 60);
        assert_eq!(s.resolve(120), vec![2, 3, 5, 4]);
    }

    #[test]
    fn test_size() {
        assert_eq!(Shape::fixed(&[2, 3, 5, 4]).size(), Some(120));
        assert_eq!(Shape::scalar().size(), Some(1));
        assert_eq!(Shape::fixed(&[0]).size(), Some(0));
        assert_eq!(Shape::dynamic(&[]).size(), None);
    }

    #[test]
    fn test_resolve() {
        let s = Shape::dynamic(&[3, 4]);
        assert_eq!(s.resolve(0), vec![0, 3, 4]);
        assert_eq!(s.resolve(24), vec![2, 3, 4]);
        assert_eq!(Shape::fixed(&[2, 2]).resolve(99), vec![2, 2]);
    }

    #[test]
    fn test_strides_ignore_dynamic() {
        assert_eq!(Shape::dynamic(&[3, 5, 4]).strides(), vec![60, 20, 4, 1]);
        assert_eq!(Shape::fixed(&[2, 3]).strides(), vec![3, 1]);
    }

    #[test]
    fn test_display() {
        assert_eq!(Shape::dynamic(&[2]).to_string(), "(-1, 2)");
        assert_eq!(Shape::fixed(&[3]).to_string(), "(3,)");
        assert_eq!(Shape::scalar().to_string(), "()");
    }

    #[test]
    fn test_broadcast_equal_and_scalar() {
        let a = Shape::fixed(&[3]);
        let s = Shape::scalar();
        let b = broadcast_shapes([&s, &a, &s]).unwrap().unwrap();
        assert_eq!(b, a);

        let only_scalars = broadcast_shapes([&s, &s]).unwrap().unwrap();
        assert_eq!(only_scalars, s);

        assert_eq!(broadcast_shapes(std::iter::empty()).unwrap(), None);
    }

    #[test]
    fn test_broadcast_mismatch() {
        let a = Shape::fixed(&[3]);
        let b = Shape::fixed(&[2]);
        assert!(matches!(
            broadcast_shapes([&a, &b]),
            Err(GraphError::BroadcastMismatch { .. })
        ));

        let c = Shape::fixed(&[2, 3]);
        assert!(broadcast_shapes([&a, &c]).is_err());
    }
}
