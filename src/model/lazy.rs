use crate::error::{Error, Result};
use ndarray::{Array, ArrayView, ArrayViewMut, Axis, CowArray, Dimension, RemoveAxis};

/// Fixed-shape array slot that is only allocated on first access.
///
/// The shape is decided when the owning container is built. Until the slot is
/// read or written it holds nothing, and [`is_set`](Self::is_set) reports
/// `false`. Callers never get a handle that could change the shape.
#[derive(Debug, Clone)]
pub(crate) struct LazyArray<A, D: Dimension> {
    name: &'static str,
    dim: D,
    init: fn(D) -> Array<A, D>,
    data: Option<Array<A, D>>,
}

impl<A: Clone, D: Dimension> LazyArray<A, D> {
    pub(crate) fn new(name: &'static str, dim: D, init: fn(D) -> Array<A, D>) -> Self {
        Self {
            name,
            dim,
            init,
            data: None,
        }
    }

    #[inline]
    pub(crate) fn is_set(&self) -> bool {
        self.data.is_some()
    }

    pub(crate) fn view(&mut self) -> ArrayView<'_, A, D> {
        self.ensure().view()
    }

    pub(crate) fn view_mut(&mut self) -> ArrayViewMut<'_, A, D> {
        self.ensure().view_mut()
    }

    pub(crate) fn peek(&self) -> Option<ArrayView<'_, A, D>> {
        self.data.as_ref().map(|a| a.view())
    }

    /// Current values, or a freshly built default that is not stored.
    pub(crate) fn or_default(&self) -> CowArray<'_, A, D> {
        match &self.data {
            Some(a) => CowArray::from(a.view()),
            None => CowArray::from((self.init)(self.dim.clone())),
        }
    }

    pub(crate) fn set(&mut self, value: Array<A, D>) -> Result<()> {
        if value.raw_dim() != self.dim {
            return Err(Error::shape(self.name, self.dim.slice(), value.shape()));
        }
        self.data = Some(value);
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.data = None;
    }

    fn ensure(&mut self) -> &mut Array<A, D> {
        let init = self.init;
        let dim = &self.dim;
        self.data.get_or_insert_with(|| init(dim.clone()))
    }
}

impl<A: Clone, D: RemoveAxis> LazyArray<A, D> {
    /// Permutes rows of an allocated slot; unset slots stay unset.
    pub(crate) fn reorder(&mut self, order: &[usize]) {
        if let Some(a) = self.data.as_mut() {
            *a = a.select(Axis(0), order);
        }
    }
}

/// Generates the public accessor family for one [`LazyArray`] field.
macro_rules! lazy_accessors {
    (
        $(#[$meta:meta])*
        $field:ident: $elem:ty, $dim:ty;
        $has:ident, $get_mut:ident, $set:ident, $clear:ident, $if_set:ident, $or_default:ident
    ) => {
        $(#[$meta])*
        ///
        /// Reading allocates the field with its default on first access.
        pub fn $field(&mut self) -> ndarray::ArrayView<'_, $elem, $dim> {
            self.$field.view()
        }

        #[doc = concat!("Mutable view of `", stringify!($field), "`, allocating it if needed.")]
        pub fn $get_mut(&mut self) -> ndarray::ArrayViewMut<'_, $elem, $dim> {
            self.$field.view_mut()
        }

        #[doc = concat!("Replaces `", stringify!($field), "`; the shape must match the container.")]
        pub fn $set(
            &mut self,
            value: impl Into<ndarray::Array<$elem, $dim>>,
        ) -> $crate::error::Result<()> {
            self.$field.set(value.into())
        }

        #[doc = concat!("Returns `", stringify!($field), "` to the unset state.")]
        pub fn $clear(&mut self) {
            self.$field.clear();
        }

        #[doc = concat!("Whether `", stringify!($field), "` has been allocated. Never allocates.")]
        #[inline]
        pub fn $has(&self) -> bool {
            self.$field.is_set()
        }

        #[doc = concat!("View of `", stringify!($field), "` only if it is already allocated.")]
        pub fn $if_set(&self) -> Option<ndarray::ArrayView<'_, $elem, $dim>> {
            self.$field.peek()
        }

        #[doc = concat!("`", stringify!($field), "` or its default, without allocating the field.")]
        pub fn $or_default(&self) -> ndarray::CowArray<'_, $elem, $dim> {
            self.$field.or_default()
        }
    };
}

pub(crate) use lazy_accessors;

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Ix1, Ix2, array};

    fn ones() -> LazyArray<f64, Ix1> {
        LazyArray::new("mass", Ix1(4), |d| Array::from_elem(d, 1.0))
    }

    #[test]
    fn unset_slot_does_not_allocate_on_peek() {
        let slot = ones();
        assert!(!slot.is_set());
        assert!(slot.peek().is_none());
        assert!(!slot.is_set());
    }

    #[test]
    fn or_default_builds_without_storing() {
        let slot = ones();
        let values = slot.or_default();
        assert_eq!(values.to_vec(), vec![1.0; 4]);
        assert!(!slot.is_set());
    }

    #[test]
    fn view_allocates_default() {
        let mut slot = ones();
        assert_eq!(slot.view().len(), 4);
        assert!(slot.is_set());
    }

    #[test]
    fn set_rejects_wrong_shape() {
        let mut slot = ones();
        let err = slot.set(Array1::from(vec![1.0, 2.0])).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
        assert!(!slot.is_set());
    }

    #[test]
    fn reorder_permutes_rows() {
        let mut slot: LazyArray<i64, Ix2> =
            LazyArray::new("image", Ix2(3, 3), |d| Array::zeros(d));
        slot.set(array![[1, 1, 1], [2, 2, 2], [3, 3, 3]]).unwrap();
        slot.reorder(&[2, 0, 1]);
        assert_eq!(slot.peek().unwrap(), array![[3, 3, 3], [1, 1, 1], [2, 2, 2]]);
    }

    #[test]
    fn reorder_leaves_unset_slot_alone() {
        let mut slot = ones();
        slot.reorder(&[3, 2, 1, 0]);
        assert!(!slot.is_set());
    }
}
