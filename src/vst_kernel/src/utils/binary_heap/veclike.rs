use arrayvec::ArrayVec;
use core::ops;

/// A growable array type usable as a heap's backing store.
pub trait VecLike: ops::Deref<Target = [<Self as VecLike>::Element]> + ops::DerefMut {
    type Element;
    fn is_empty(&self) -> bool;
    fn len(&self) -> usize;
    fn is_full(&self) -> bool;
    fn pop(&mut self) -> Option<Self::Element>;
    /// Append an element. Returns the element back if the array is full.
    fn try_push(&mut self, x: Self::Element) -> Result<(), Self::Element>;
}

impl<T, const N: usize> VecLike for ArrayVec<T, N> {
    type Element = T;
    fn is_empty(&self) -> bool {
        self.is_empty()
    }
    fn len(&self) -> usize {
        self.len()
    }
    fn is_full(&self) -> bool {
        self.is_full()
    }
    fn pop(&mut self) -> Option<Self::Element> {
        self.pop()
    }
    fn try_push(&mut self, x: Self::Element) -> Result<(), Self::Element> {
        self.try_push(x).map_err(|e| e.element())
    }
}

#[cfg(test)]
impl<T> VecLike for Vec<T> {
    type Element = T;
    fn is_empty(&self) -> bool {
        self.is_empty()
    }
    fn len(&self) -> usize {
        self.len()
    }
    fn is_full(&self) -> bool {
        false
    }
    fn pop(&mut self) -> Option<Self::Element> {
        self.pop()
    }
    fn try_push(&mut self, x: Self::Element) -> Result<(), Self::Element> {
        self.push(x);
        Ok(())
    }
}
